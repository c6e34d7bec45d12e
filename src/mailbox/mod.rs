//! 离线消息信箱
//!
//! 用户离线期间的消息按序列号排序暂存，上线后推送，客户端 ACK
//! 之后裁剪。每个用户的信箱按最高序列号保留最新 [`MAILBOX_CAP`]
//! 条，整箱 TTL 七天，每次写入时续期。

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::message::ChatMessage;

pub use memory::InMemoryMailbox;
pub use redis::RedisMailbox;

/// 单用户最多暂存的离线消息数，超出时淘汰序列号最小的
pub const MAILBOX_CAP: usize = 1000;

/// 离线消息过期时间
pub const MAILBOX_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

/// 离线信箱操作
#[async_trait]
pub trait OfflineMailbox: Send + Sync {
    /// 按 `msg.seq_id` 写入，随后裁剪到容量上限并续期 TTL
    async fn store(&self, user_id: &str, msg: &ChatMessage) -> Result<()>;

    /// 拉取 `seq_id >= from_seq` 的消息，升序，最多 `count` 条
    async fn fetch(&self, user_id: &str, from_seq: i64, count: i64) -> Result<Vec<ChatMessage>>;

    /// 拉取最新 `count` 条消息，从新到旧
    async fn fetch_latest(&self, user_id: &str, count: i64) -> Result<Vec<ChatMessage>>;

    /// 删除 `seq_id <= max_seq` 的全部消息（ACK 后调用，幂等）
    async fn remove(&self, user_id: &str, max_seq: i64) -> Result<()>;

    /// 信箱内消息数（诊断用）
    async fn count(&self, user_id: &str) -> Result<i64>;

    /// 清空信箱（诊断用）
    async fn clear(&self, user_id: &str) -> Result<()>;
}
