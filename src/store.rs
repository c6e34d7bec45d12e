//! 共享存储（Redis）客户端初始化
//!
//! 存储句柄通过显式构造传递给各组件，不使用进程级全局状态。

use std::time::Duration;

use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use tracing::info;

use crate::error::Result;

/// 建连超时
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// 单次请求（读/写）超时
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(3);

/// 共享存储句柄
///
/// [`ConnectionManager`] 是可克隆的多路复用连接，断线自动重连；
/// `client` 保留用于建立 Pub/Sub 专用连接。
#[derive(Clone)]
pub struct Store {
    pub client: redis::Client,
    pub conn: ConnectionManager,
}

/// 连接共享存储并探活
pub async fn connect(url: &str) -> Result<Store> {
    let client = redis::Client::open(url)?;

    let config = ConnectionManagerConfig::new()
        .set_connection_timeout(DIAL_TIMEOUT)
        .set_response_timeout(RESPONSE_TIMEOUT);
    let mut conn = client.get_connection_manager_with_config(config).await?;

    // PING 验证可达性，失败时让启动流程尽早退出
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;
    info!(url = %url, "connected to shared store");

    Ok(Store { client, conn })
}
