//! 离线信箱的 Redis 实现
//!
//! ZSet `mbox:<uid>`，Score 为序列号，Member 为消息 JSON：
//! - 写入：ZADD + ZREMRANGEBYRANK 保留最新 N 条 + EXPIRE，单次流水线
//! - 按序拉取：ZRANGEBYSCORE（升序）
//! - 最新拉取：ZREVRANGE（降序）
//! - ACK 裁剪：ZREMRANGEBYSCORE -inf..=seq

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{debug, warn};

use crate::error::Result;
use crate::mailbox::{MAILBOX_CAP, MAILBOX_TTL, OfflineMailbox};
use crate::message::ChatMessage;

const MAILBOX_PREFIX: &str = "mbox:";

pub struct RedisMailbox {
    conn: ConnectionManager,
}

impl RedisMailbox {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn key(user_id: &str) -> String {
        format!("{}{}", MAILBOX_PREFIX, user_id)
    }

    fn decode_entries(raw: Vec<String>) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(raw.len());
        for data in raw {
            match serde_json::from_str::<ChatMessage>(&data) {
                Ok(msg) => messages.push(msg),
                Err(err) => {
                    // 坏条目跳过，不让一条脏数据毁掉整次拉取
                    warn!(error = %err, "failed to decode mailbox entry");
                }
            }
        }
        messages
    }
}

#[async_trait]
impl OfflineMailbox for RedisMailbox {
    async fn store(&self, user_id: &str, msg: &ChatMessage) -> Result<()> {
        let key = Self::key(user_id);
        let payload = serde_json::to_string(msg)?;
        let mut conn = self.conn.clone();

        redis::pipe()
            .zadd(&key, payload, msg.seq_id)
            .ignore()
            .zremrangebyrank(&key, 0, -(MAILBOX_CAP as isize) - 1)
            .ignore()
            .expire(&key, MAILBOX_TTL.as_secs() as i64)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        debug!(user_id, seq_id = msg.seq_id, "stored offline message");
        Ok(())
    }

    async fn fetch(&self, user_id: &str, from_seq: i64, count: i64) -> Result<Vec<ChatMessage>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn
            .zrangebyscore_limit(Self::key(user_id), from_seq, "+inf", 0, count as isize)
            .await?;
        Ok(Self::decode_entries(raw))
    }

    async fn fetch_latest(&self, user_id: &str, count: i64) -> Result<Vec<ChatMessage>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn
            .zrevrange(Self::key(user_id), 0, count as isize - 1)
            .await?;
        Ok(Self::decode_entries(raw))
    }

    async fn remove(&self, user_id: &str, max_seq: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .zrembyscore(Self::key(user_id), "-inf", max_seq)
            .await?;
        Ok(())
    }

    async fn count(&self, user_id: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        let count: i64 = conn.zcard(Self::key(user_id)).await?;
        Ok(count)
    }

    async fn clear(&self, user_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(Self::key(user_id)).await?;
        Ok(())
    }
}
