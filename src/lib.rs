//! ember-gateway：分布式 IM 接入网关
//!
//! 无状态网关节点终结客户端长连接，通过共享存储（Redis）完成
//! 会话定位、序列号分配、跨网关转发与离线消息暂存。
//!
//! 消息 `A → B` 的数据流：A 的连接 → 分发器 → 取序列号 →
//! 查 B 的位置 → {本地推送 | 发布到 B 所在网关的频道 | 写 B 的
//! 离线信箱}，B 下次认证时回放信箱。

pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod mailbox;
pub mod message;
pub mod protocol;
pub mod pubsub;
pub mod sequence;
pub mod server;
pub mod session;
pub mod store;

pub use bootstrap::{GatewayApp, GatewayStores};
pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
