//! 离线信箱的内存实现（测试用）
//!
//! 每个用户一棵按序列号排序的 BTreeMap，容量与裁剪语义与
//! Redis 实现一致。克隆共享同一底层存储。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::mailbox::{MAILBOX_CAP, OfflineMailbox};
use crate::message::ChatMessage;

#[derive(Clone, Default)]
pub struct InMemoryMailbox {
    inner: Arc<RwLock<HashMap<String, BTreeMap<i64, ChatMessage>>>>,
}

impl InMemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OfflineMailbox for InMemoryMailbox {
    async fn store(&self, user_id: &str, msg: &ChatMessage) -> Result<()> {
        let mut guard = self.inner.write().await;
        let mailbox = guard.entry(user_id.to_string()).or_default();
        mailbox.insert(msg.seq_id, msg.clone());

        // 超出容量时淘汰序列号最小的
        while mailbox.len() > MAILBOX_CAP {
            let Some(&oldest) = mailbox.keys().next() else {
                break;
            };
            mailbox.remove(&oldest);
        }
        Ok(())
    }

    async fn fetch(&self, user_id: &str, from_seq: i64, count: i64) -> Result<Vec<ChatMessage>> {
        let guard = self.inner.read().await;
        Ok(guard
            .get(user_id)
            .map(|mailbox| {
                mailbox
                    .range(from_seq..)
                    .take(count.max(0) as usize)
                    .map(|(_, msg)| msg.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch_latest(&self, user_id: &str, count: i64) -> Result<Vec<ChatMessage>> {
        let guard = self.inner.read().await;
        Ok(guard
            .get(user_id)
            .map(|mailbox| {
                mailbox
                    .iter()
                    .rev()
                    .take(count.max(0) as usize)
                    .map(|(_, msg)| msg.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn remove(&self, user_id: &str, max_seq: i64) -> Result<()> {
        let mut guard = self.inner.write().await;
        if let Some(mailbox) = guard.get_mut(user_id) {
            mailbox.retain(|&seq, _| seq > max_seq);
        }
        Ok(())
    }

    async fn count(&self, user_id: &str) -> Result<i64> {
        let guard = self.inner.read().await;
        Ok(guard.get(user_id).map(|m| m.len() as i64).unwrap_or(0))
    }

    async fn clear(&self, user_id: &str) -> Result<()> {
        let mut guard = self.inner.write().await;
        guard.remove(user_id);
        Ok(())
    }
}
