//! 会话目录：用户在线状态与位置路由
//!
//! 回答两个问题：用户是否在线、用户连接在哪个网关。前者决定
//! 在线推送还是离线存储，后者是跨网关转发的依据。记录带 TTL，
//! 由心跳续期，停止心跳即自动离线。
//!
//! 注意：目的用户在本网关时不查目录，进程内注册表才是本地权威。

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub use memory::{InMemorySessionDirectory, SessionTable};
pub use redis::RedisSessionDirectory;

/// 会话过期时间：客户端需在此时间内发送心跳续期
pub const SESSION_TTL: Duration = Duration::from_secs(300);

/// 用户会话记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub user_id: String,
    pub gateway_id: String,
    pub conn_id: u64,
    /// 登录时间（Unix 秒）
    pub login_time: i64,
}

/// 会话目录操作
#[async_trait]
pub trait SessionDirectory: Send + Sync {
    /// 用户登录：原子写入会话记录与位置记录（单次流水线）
    async fn login(&self, user_id: &str, conn_id: u64) -> Result<()>;

    /// 用户登出：原子删除两条记录
    async fn logout(&self, user_id: &str) -> Result<()>;

    /// 心跳续期：刷新两条记录的 TTL
    async fn heartbeat(&self, user_id: &str) -> Result<()>;

    /// 查询用户所在网关；`None` 表示不在线
    async fn gateway_of(&self, user_id: &str) -> Result<Option<String>>;

    /// 用户是否在线
    async fn is_online(&self, user_id: &str) -> Result<bool>;

    /// 全部在线用户（诊断用）
    async fn online_users(&self) -> Result<Vec<String>>;
}
