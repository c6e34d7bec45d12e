//! 连接注册表
//!
//! 网关进程内唯一的共享内存状态，维护两张并发映射：
//! `conn_id → Connection` 用于按连接查找，`user_id → Connection`
//! 用于消息路由。对本网关而言注册表是权威的在线依据。

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::protocol::Frame;
use crate::server::connection::Connection;

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<u64, Arc<Connection>>,
    user_conns: DashMap<String, Arc<Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, conn: Arc<Connection>) {
        self.connections.insert(conn.id(), conn);
    }

    /// 移除连接（连接关闭时调用）
    ///
    /// 用户表只在条目仍指向该连接时才删除：同一用户重新认证会
    /// 顶掉旧绑定，旧连接随后的清理不能误删新绑定。
    pub fn remove(&self, conn: &Arc<Connection>) {
        self.connections.remove(&conn.id());
        if let Some(user_id) = conn.user_id() {
            self.user_conns
                .remove_if(&user_id, |_, bound| bound.id() == conn.id());
        }
    }

    /// 绑定用户到连接（认证成功后调用）
    ///
    /// 同一用户再次绑定时原子替换旧条目。
    pub fn bind_user(&self, user_id: &str, conn: &Arc<Connection>) {
        conn.bind_user(user_id);
        if let Some(prev) = self.user_conns.insert(user_id.to_string(), conn.clone()) {
            if prev.id() != conn.id() {
                debug!(
                    user_id,
                    old_conn = prev.id(),
                    new_conn = conn.id(),
                    "user rebound to a new connection"
                );
            }
        }
    }

    /// 根据用户 ID 查找连接（消息路由的核心）
    pub fn by_user(&self, user_id: &str) -> Option<Arc<Connection>> {
        self.user_conns.get(user_id).map(|e| e.value().clone())
    }

    pub fn by_conn(&self, conn_id: u64) -> Option<Arc<Connection>> {
        self.connections.get(&conn_id).map(|e| e.value().clone())
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// 广播消息给所有连接（尽力而为，忽略单连接失败）
    pub fn broadcast(&self, frame: &Frame) {
        for entry in self.connections.iter() {
            let _ = entry.value().send(frame);
        }
    }
}
