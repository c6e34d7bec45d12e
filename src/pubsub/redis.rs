//! 跨网关路由的 Redis Pub/Sub 实现
//!
//! 订阅用专用连接（Pub/Sub 连接进入订阅态后不能复用于普通命令），
//! 发布复用共享的多路复用连接。处理器只被移动进接收任务，
//! 路由器结构上不持有它，分发器与路由器之间不形成引用环。

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::message::ChatMessage;
use crate::pubsub::{PubSubRouter, RoutedMessageHandler, channel_name};

pub struct RedisPubSubRouter {
    channel: String,
    client: redis::Client,
    publish_conn: ConnectionManager,
    stop: CancellationToken,
}

impl RedisPubSubRouter {
    pub fn new(gateway_id: &str, client: redis::Client, publish_conn: ConnectionManager) -> Self {
        Self {
            channel: channel_name(gateway_id),
            client,
            publish_conn,
            stop: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl PubSubRouter for RedisPubSubRouter {
    async fn start(&self, handler: Arc<dyn RoutedMessageHandler>) -> Result<()> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        // subscribe 返回即代表存储已确认订阅
        pubsub.subscribe(&self.channel).await?;
        info!(channel = %self.channel, "subscribed to gateway channel");

        let stop = self.stop.clone();
        let channel = self.channel.clone();
        tokio::spawn(async move {
            let stream = pubsub.into_on_message();
            tokio::pin!(stream);
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    delivered = stream.next() => match delivered {
                        Some(msg) => {
                            let payload: Vec<u8> = match msg.get_payload() {
                                Ok(payload) => payload,
                                Err(err) => {
                                    warn!(error = %err, "failed to read pub/sub payload");
                                    continue;
                                }
                            };
                            match serde_json::from_slice::<ChatMessage>(&payload) {
                                Ok(routed) => handler.handle_routed(routed).await,
                                Err(err) => {
                                    warn!(error = %err, "failed to decode routed message");
                                }
                            }
                        }
                        // 订阅被切断：终止接收循环，跨网关消息将静默失败直至重启
                        None => {
                            warn!(channel = %channel, "pub/sub stream severed");
                            break;
                        }
                    }
                }
            }
            debug!(channel = %channel, "pub/sub receive loop terminated");
        });

        Ok(())
    }

    async fn publish(&self, target_gateway_id: &str, msg: &ChatMessage) -> Result<()> {
        let payload = serde_json::to_vec(msg)?;
        let mut conn = self.publish_conn.clone();
        let _: i64 = conn.publish(channel_name(target_gateway_id), payload).await?;
        Ok(())
    }

    fn stop(&self) {
        self.stop.cancel();
    }
}
