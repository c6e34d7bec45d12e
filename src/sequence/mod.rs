//! 消息序列号分配
//!
//! 每个会话一个单调递增计数器，消息发送时取号。序列号用于接收端
//! 排序、ACK 裁剪与断点续传；原子自增保证并发取号不重复。

pub mod memory;
pub mod redis;

use async_trait::async_trait;

use crate::error::Result;

pub use memory::InMemorySequenceAllocator;
pub use redis::RedisSequenceAllocator;

/// 序列号分配操作
#[async_trait]
pub trait SequenceAllocator: Send + Sync {
    /// 生成下一个序列号，首次调用返回 1
    async fn next(&self, conversation_id: &str) -> Result<i64>;

    /// 批量预留 `count` 个连续序列号，返回 `(start, end)`
    async fn next_batch(&self, conversation_id: &str, count: i64) -> Result<(i64, i64)>;

    /// 当前序列号（不自增），计数器不存在时返回 0
    async fn current(&self, conversation_id: &str) -> Result<i64>;

    /// 重置计数器。仅测试使用，生产环境会导致序号重复
    async fn reset(&self, conversation_id: &str) -> Result<()>;
}
