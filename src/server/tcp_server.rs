//! TCP 服务器：监听、接入与连接生命周期
//!
//! 每条连接两个任务：读循环同步驱动分发器，写循环消费出站队列。
//! 关停是协作式的：取消信号在每个循环边界被检查，监听器关闭用于
//! 解除 accept 阻塞，全部任务退出后关停才算完成。

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::protocol::{CmdType, Frame};
use crate::server::connection::{Connection, write_loop};
use crate::server::registry::ConnectionRegistry;

/// 读空闲超时：超过此时间没有任何数据（含心跳）视为连接死亡
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// 服务器关停时发给客户端的重连指令体
const KICK_BODY: &[u8] = br#"{"reason":"server_restart","reconnect":true}"#;

/// 消息处理器接口
///
/// TCP 层与业务层解耦的缝隙：传输层只负责网络 I/O，解码后的消息
/// 交给实现方处理。测试中可用内存实现替换。
#[async_trait]
pub trait FrameHandler: Send + Sync {
    async fn handle_frame(&self, conn: &Arc<Connection>, frame: Frame);
}

/// TCP 网关服务器
pub struct TcpGateway {
    addr: String,
    gateway_id: String,
    registry: Arc<ConnectionRegistry>,
    handler: Arc<dyn FrameHandler>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    next_conn_id: Arc<AtomicU64>,
}

impl TcpGateway {
    pub fn new(
        addr: String,
        gateway_id: String,
        registry: Arc<ConnectionRegistry>,
        handler: Arc<dyn FrameHandler>,
    ) -> Self {
        Self {
            addr,
            gateway_id,
            registry,
            handler,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            next_conn_id: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        self.registry.clone()
    }

    /// 绑定端口并启动接入循环，返回实际监听地址
    pub async fn start(&self) -> Result<SocketAddr> {
        let listener = TcpListener::bind(&self.addr)
            .await
            .map_err(|err| anyhow::anyhow!("failed to listen on {}: {}", self.addr, err))?;
        let local_addr = listener
            .local_addr()
            .map_err(|err| anyhow::anyhow!("failed to read local addr: {}", err))?;
        info!(gateway_id = %self.gateway_id, addr = %local_addr, "gateway listening");

        let registry = self.registry.clone();
        let handler = self.handler.clone();
        let shutdown = self.shutdown.clone();
        let tracker = self.tracker.clone();
        let conn_ids = self.next_conn_id.clone();

        self.tracker.spawn(accept_loop(
            listener, registry, handler, shutdown, tracker, conn_ids,
        ));
        Ok(local_addr)
    }

    /// 优雅关停：停止接入，通知所有连接重连，等待全部任务退出
    pub async fn stop(&self) {
        info!(gateway_id = %self.gateway_id, "initiating graceful shutdown");
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!(gateway_id = %self.gateway_id, "gateway stopped");
    }
}

async fn accept_loop(
    listener: TcpListener,
    registry: Arc<ConnectionRegistry>,
    handler: Arc<dyn FrameHandler>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    conn_ids: Arc<AtomicU64>,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    let conn_id = conn_ids.fetch_add(1, Ordering::Relaxed) + 1;
                    tracker.spawn(handle_connection(
                        stream,
                        peer_addr,
                        conn_id,
                        registry.clone(),
                        handler.clone(),
                        shutdown.clone(),
                        tracker.clone(),
                    ));
                }
                Err(err) => {
                    // 非关停导致的错误：记录并继续接入
                    warn!(error = %err, "accept error");
                }
            }
        }
    }
    debug!("accept loop terminated");
}

/// 单连接主循环
///
/// 每次解码前套上 [`IDLE_TIMEOUT`]；超时或解码错误即关闭连接。
/// 关停信号到达时向客户端发送 Kick 重连指令后退出。
async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    conn_id: u64,
    registry: Arc<ConnectionRegistry>,
    handler: Arc<dyn FrameHandler>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
) {
    debug!(conn_id, peer = %peer_addr, "new connection");

    let (read_half, write_half) = stream.into_split();
    let (conn, outbound_rx) = Connection::new(conn_id, peer_addr);
    registry.add(conn.clone());

    // 写循环也纳入任务跟踪，关停要等 Kick 真正写出去
    tracker.spawn(write_loop(conn.clone(), outbound_rx, write_half));

    let mut reader = BufReader::new(read_half);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = conn.send(&Frame::new(CmdType::Kick, KICK_BODY.to_vec()));
                break;
            }
            _ = conn.close_token().cancelled() => break,
            decoded = timeout(IDLE_TIMEOUT, Frame::decode(&mut reader)) => match decoded {
                Err(_) => {
                    debug!(conn_id, "read timeout, closing connection");
                    break;
                }
                Ok(Err(err)) => {
                    if err.is_disconnect() {
                        debug!(conn_id, "peer closed connection");
                    } else {
                        warn!(conn_id, error = %err, "read error, closing connection");
                    }
                    break;
                }
                Ok(Ok(frame)) => {
                    conn.touch();
                    handler.handle_frame(&conn, frame).await;
                }
            }
        }
    }

    registry.remove(&conn);
    conn.close();
    debug!(conn_id, "connection closed");
}
