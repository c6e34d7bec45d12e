//! 客户端连接抽象
//!
//! 每个连接读写分离：读循环在 `tcp_server` 中驱动分发器，写循环
//! 消费出站队列后写入网络。发送方从不等待网络 I/O，慢客户端
//! 不会阻塞读路径。

use std::net::SocketAddr;
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{GatewayError, Result};
use crate::protocol::Frame;

/// 出站队列容量：允许短时间积累的待发消息数
pub const OUTBOUND_QUEUE_CAP: usize = 256;

/// 单次网络写入的超时时间
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// 一个客户端连接
///
/// 连接本身不持有套接字：读半部由读循环独占，写半部由写循环独占，
/// 两者通过关闭信号与出站队列和本结构关联。
pub struct Connection {
    id: u64,
    peer_addr: SocketAddr,
    /// 认证成功后绑定，且仅绑定一次语义上有效的用户
    user_id: RwLock<Option<String>>,
    outbound: mpsc::Sender<Vec<u8>>,
    /// 关闭信号，cancel 幂等，二次关闭为空操作
    closed: CancellationToken,
    last_active: Mutex<Instant>,
}

impl Connection {
    /// 创建连接包装器，返回连接与出站队列的消费端
    pub fn new(id: u64, peer_addr: SocketAddr) -> (std::sync::Arc<Self>, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAP);
        let conn = std::sync::Arc::new(Self {
            id,
            peer_addr,
            user_id: RwLock::new(None),
            outbound: tx,
            closed: CancellationToken::new(),
            last_active: Mutex::new(Instant::now()),
        });
        (conn, rx)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// 绑定用户 ID（认证成功后调用）
    pub fn bind_user(&self, user_id: &str) {
        *self.user_id.write().unwrap() = Some(user_id.to_string());
    }

    /// 已绑定的用户 ID，未认证时为 None
    pub fn user_id(&self) -> Option<String> {
        self.user_id.read().unwrap().clone()
    }

    /// 更新最后活跃时间（每次成功解码后调用）
    pub fn touch(&self) {
        *self.last_active.lock().unwrap() = Instant::now();
    }

    pub fn last_active(&self) -> Instant {
        *self.last_active.lock().unwrap()
    }

    /// 发送消息（异步、非阻塞）
    ///
    /// 入队成功不代表已写入网络。队列满说明客户端消费不过来，
    /// 丢弃本条并返回成功，绝不阻塞发送方；连接已关闭时返回
    /// [`GatewayError::ConnectionClosed`]。
    pub fn send(&self, frame: &Frame) -> Result<()> {
        let data = frame.encode()?;

        if self.closed.is_cancelled() {
            return Err(GatewayError::ConnectionClosed);
        }

        match self.outbound.try_send(data) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(conn_id = self.id, "outbound queue full, dropping frame");
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(GatewayError::ConnectionClosed),
        }
    }

    /// 关闭连接（幂等），读写循环在下一个循环边界退出
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub(crate) fn close_token(&self) -> &CancellationToken {
        &self.closed
    }
}

/// 写循环：消费出站队列并写入网络
///
/// 每次写入带 [`WRITE_TIMEOUT`] 截止时间，写失败即关闭连接。
/// 收到关闭信号后先把队列中剩余的数据冲刷出去（保证关停时的
/// Kick 通知能到达客户端）再退出。
pub async fn write_loop<W>(
    conn: std::sync::Arc<Connection>,
    mut rx: mpsc::Receiver<Vec<u8>>,
    mut writer: W,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            biased;

            maybe = rx.recv() => match maybe {
                Some(data) => {
                    if !write_with_deadline(&mut writer, &data, conn.id()).await {
                        break;
                    }
                }
                None => break,
            },
            _ = conn.close_token().cancelled() => {
                // 冲刷剩余队列
                while let Ok(data) = rx.try_recv() {
                    if !write_with_deadline(&mut writer, &data, conn.id()).await {
                        break;
                    }
                }
                break;
            }
        }
    }

    conn.close();
    let _ = writer.shutdown().await;
    debug!(conn_id = conn.id(), "write loop terminated");
}

async fn write_with_deadline<W>(writer: &mut W, data: &[u8], conn_id: u64) -> bool
where
    W: AsyncWrite + Unpin,
{
    match timeout(WRITE_TIMEOUT, writer.write_all(data)).await {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            warn!(conn_id, error = %err, "write error, closing connection");
            false
        }
        Err(_) => {
            warn!(conn_id, "write deadline exceeded, closing connection");
            false
        }
    }
}
