//! 跨网关消息路由（发布/订阅）
//!
//! 每个网关订阅自己的频道 `channel:gateway_<id>`；发往其他网关的
//! 消息发布到目标频道，由目标网关的接收循环投递给本地连接。
//!
//! 投递是尽力而为的：发布/订阅不持久化，目标网关恰好不在线时
//! 消息丢失且不重试（离线用户的正确性由 ACK 驱动的离线信箱兜底）。

pub mod memory;
pub mod redis;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::message::ChatMessage;

pub use memory::{InMemoryPubSubHub, InMemoryPubSubRouter};
pub use redis::RedisPubSubRouter;

/// 网关频道名
pub fn channel_name(gateway_id: &str) -> String {
    format!("channel:gateway_{}", gateway_id)
}

/// 路由消息处理器（由消息分发器实现）
#[async_trait]
pub trait RoutedMessageHandler: Send + Sync {
    async fn handle_routed(&self, msg: ChatMessage);
}

/// 跨网关路由操作
#[async_trait]
pub trait PubSubRouter: Send + Sync {
    /// 订阅本网关频道并启动接收循环；返回时订阅已生效
    async fn start(&self, handler: Arc<dyn RoutedMessageHandler>) -> Result<()>;

    /// 发布消息到目标网关的频道
    async fn publish(&self, target_gateway_id: &str, msg: &ChatMessage) -> Result<()>;

    /// 取消订阅并终止接收循环
    fn stop(&self);
}
