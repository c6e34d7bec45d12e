//! 序列号分配的 Redis 实现
//!
//! `INCR seq:<conversation>` 原子自增：Key 不存在时自动从 1 开始，
//! 多网关并发取号由 Redis 保证不重不漏。

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crate::error::Result;
use crate::sequence::SequenceAllocator;

const SEQUENCE_PREFIX: &str = "seq:";

pub struct RedisSequenceAllocator {
    conn: ConnectionManager,
}

impl RedisSequenceAllocator {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn key(conversation_id: &str) -> String {
        format!("{}{}", SEQUENCE_PREFIX, conversation_id)
    }
}

#[async_trait]
impl SequenceAllocator for RedisSequenceAllocator {
    async fn next(&self, conversation_id: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        let seq: i64 = conn.incr(Self::key(conversation_id), 1i64).await?;
        Ok(seq)
    }

    async fn next_batch(&self, conversation_id: &str, count: i64) -> Result<(i64, i64)> {
        let mut conn = self.conn.clone();
        let end: i64 = conn.incr(Self::key(conversation_id), count).await?;
        Ok((end - count + 1, end))
    }

    async fn current(&self, conversation_id: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        let seq: Option<i64> = conn.get(Self::key(conversation_id)).await?;
        Ok(seq.unwrap_or(0))
    }

    async fn reset(&self, conversation_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(Self::key(conversation_id)).await?;
        Ok(())
    }
}
