//! 网关统一错误类型定义

use thiserror::Error;

use crate::auth::AuthError;
use crate::protocol::CodecError;

/// 网关错误类型
#[derive(Debug, Error)]
pub enum GatewayError {
    /// 协议编解码错误
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Token 认证错误
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// 连接已关闭
    #[error("connection closed")]
    ConnectionClosed,

    /// 共享存储错误
    #[error("store error: {0}")]
    Store(#[from] redis::RedisError),

    /// JSON 编解码错误
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// 其他错误
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// 网关结果类型
pub type Result<T> = std::result::Result<T, GatewayError>;
