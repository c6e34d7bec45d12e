//! 跨网关路由的进程内实现（测试用）
//!
//! [`InMemoryPubSubHub`] 扮演共享的消息分发中心：同一进程里的
//! 多个网关各自注册频道，即可测试完整的跨网关投递链路。

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Result;
use crate::message::ChatMessage;
use crate::pubsub::{PubSubRouter, RoutedMessageHandler, channel_name};

/// 进程内的发布/订阅中心
#[derive(Clone, Default)]
pub struct InMemoryPubSubHub {
    channels: Arc<DashMap<String, mpsc::UnboundedSender<ChatMessage>>>,
}

impl InMemoryPubSubHub {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct InMemoryPubSubRouter {
    gateway_id: String,
    hub: InMemoryPubSubHub,
    stop: CancellationToken,
}

impl InMemoryPubSubRouter {
    pub fn new(gateway_id: impl Into<String>, hub: InMemoryPubSubHub) -> Self {
        Self {
            gateway_id: gateway_id.into(),
            hub,
            stop: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl PubSubRouter for InMemoryPubSubRouter {
    async fn start(&self, handler: Arc<dyn RoutedMessageHandler>) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.hub
            .channels
            .insert(channel_name(&self.gateway_id), tx);

        let stop = self.stop.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    delivered = rx.recv() => match delivered {
                        Some(msg) => handler.handle_routed(msg).await,
                        None => break,
                    }
                }
            }
        });
        Ok(())
    }

    async fn publish(&self, target_gateway_id: &str, msg: &ChatMessage) -> Result<()> {
        let channel = channel_name(target_gateway_id);
        match self.hub.channels.get(&channel) {
            Some(sender) => {
                // 订阅端已退出时静默丢弃，与真实发布/订阅一致
                let _ = sender.send(msg.clone());
            }
            None => {
                debug!(channel = %channel, "no subscriber for channel, message dropped");
            }
        }
        Ok(())
    }

    fn stop(&self) {
        self.stop.cancel();
        self.hub.channels.remove(&channel_name(&self.gateway_id));
    }
}
