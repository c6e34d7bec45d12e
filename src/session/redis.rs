//! 会话目录的 Redis 实现
//!
//! 数据结构：
//! - `session:<uid>` Hash：gateway_id / conn_id / login_time，TTL 5 分钟
//! - `location:<uid>` String：网关 ID，TTL 同上
//!
//! 位置记录是路由快路径：一次 GET 即可决定投递方式。
//! 所有操作走流水线，减少网络往返。

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::info;

use crate::error::Result;
use crate::session::{SESSION_TTL, SessionDirectory};

const SESSION_PREFIX: &str = "session:";
const LOCATION_PREFIX: &str = "location:";

pub struct RedisSessionDirectory {
    gateway_id: String,
    conn: ConnectionManager,
    ttl_secs: i64,
}

impl RedisSessionDirectory {
    pub fn new(gateway_id: impl Into<String>, conn: ConnectionManager) -> Self {
        Self {
            gateway_id: gateway_id.into(),
            conn,
            ttl_secs: SESSION_TTL.as_secs() as i64,
        }
    }

    fn session_key(user_id: &str) -> String {
        format!("{}{}", SESSION_PREFIX, user_id)
    }

    fn location_key(user_id: &str) -> String {
        format!("{}{}", LOCATION_PREFIX, user_id)
    }
}

#[async_trait]
impl SessionDirectory for RedisSessionDirectory {
    async fn login(&self, user_id: &str, conn_id: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let session_key = Self::session_key(user_id);
        let location_key = Self::location_key(user_id);
        let login_time = chrono::Utc::now().timestamp();

        redis::pipe()
            .hset_multiple(
                &session_key,
                &[
                    ("gateway_id", self.gateway_id.clone()),
                    ("conn_id", conn_id.to_string()),
                    ("login_time", login_time.to_string()),
                ],
            )
            .ignore()
            .expire(&session_key, self.ttl_secs)
            .ignore()
            .set_ex(&location_key, &self.gateway_id, self.ttl_secs as u64)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        info!(user_id, gateway_id = %self.gateway_id, "user logged in");
        Ok(())
    }

    async fn logout(&self, user_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::pipe()
            .del(Self::session_key(user_id))
            .ignore()
            .del(Self::location_key(user_id))
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        info!(user_id, "user logged out");
        Ok(())
    }

    async fn heartbeat(&self, user_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::pipe()
            .expire(Self::session_key(user_id), self.ttl_secs)
            .ignore()
            .expire(Self::location_key(user_id), self.ttl_secs)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn gateway_of(&self, user_id: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let gateway: Option<String> = conn.get(Self::location_key(user_id)).await?;
        Ok(gateway)
    }

    async fn is_online(&self, user_id: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(Self::session_key(user_id)).await?;
        Ok(exists)
    }

    async fn online_users(&self) -> Result<Vec<String>> {
        // SCAN 游标遍历，避免 KEYS 阻塞存储
        let mut conn = self.conn.clone();
        let mut users = Vec::new();
        let mut iter: redis::AsyncIter<String> =
            conn.scan_match(format!("{}*", SESSION_PREFIX)).await?;
        while let Some(key) = iter.next_item().await {
            users.push(key[SESSION_PREFIX.len()..].to_string());
        }
        Ok(users)
    }
}
