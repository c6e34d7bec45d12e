//! 会话目录的内存实现（测试用）
//!
//! [`SessionTable`] 可克隆共享：多网关测试中让两个目录实例
//! 指向同一张表，各自以自己的网关 ID 写入。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::session::{SessionDirectory, SessionRecord};

/// 多网关共享的会话表
#[derive(Clone, Default)]
pub struct SessionTable {
    inner: Arc<RwLock<HashMap<String, SessionRecord>>>,
}

pub struct InMemorySessionDirectory {
    gateway_id: String,
    table: SessionTable,
}

impl InMemorySessionDirectory {
    pub fn new(gateway_id: impl Into<String>) -> Self {
        Self::with_table(gateway_id, SessionTable::default())
    }

    pub fn with_table(gateway_id: impl Into<String>, table: SessionTable) -> Self {
        Self {
            gateway_id: gateway_id.into(),
            table,
        }
    }
}

#[async_trait]
impl SessionDirectory for InMemorySessionDirectory {
    async fn login(&self, user_id: &str, conn_id: u64) -> Result<()> {
        let mut guard = self.table.inner.write().await;
        guard.insert(
            user_id.to_string(),
            SessionRecord {
                user_id: user_id.to_string(),
                gateway_id: self.gateway_id.clone(),
                conn_id,
                login_time: chrono::Utc::now().timestamp(),
            },
        );
        Ok(())
    }

    async fn logout(&self, user_id: &str) -> Result<()> {
        let mut guard = self.table.inner.write().await;
        guard.remove(user_id);
        Ok(())
    }

    async fn heartbeat(&self, user_id: &str) -> Result<()> {
        // 内存实现没有 TTL，心跳为空操作
        let _ = user_id;
        Ok(())
    }

    async fn gateway_of(&self, user_id: &str) -> Result<Option<String>> {
        let guard = self.table.inner.read().await;
        Ok(guard.get(user_id).map(|r| r.gateway_id.clone()))
    }

    async fn is_online(&self, user_id: &str) -> Result<bool> {
        let guard = self.table.inner.read().await;
        Ok(guard.contains_key(user_id))
    }

    async fn online_users(&self) -> Result<Vec<String>> {
        let guard = self.table.inner.read().await;
        Ok(guard.keys().cloned().collect())
    }
}
