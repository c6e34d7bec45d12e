//! 网络层：连接抽象、连接注册表与 TCP 服务器

pub mod connection;
pub mod registry;
pub mod tcp_server;

pub use connection::{Connection, OUTBOUND_QUEUE_CAP, WRITE_TIMEOUT};
pub use registry::ConnectionRegistry;
pub use tcp_server::{FrameHandler, IDLE_TIMEOUT, TcpGateway};
