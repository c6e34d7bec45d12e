//! 自定义二进制协议（长度前缀帧）
//!
//! TCP 是流式协议，没有消息边界，会出现粘包与拆包。
//! 消息格式：`Length(u32) | Version(u16) | CmdType(u16) | Body(N)`，
//! 全部大端序。先精确读 8 字节头部，再按 `Length - 4` 精确读消息体，
//! 从而把字节流切分为离散消息。

use std::io;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// 协议头部固定长度：Length(4) + Version(2) + CmdType(2)
pub const HEADER_LEN: usize = 8;

/// 消息体最大长度（1MB），防止恶意大包导致 OOM
pub const MAX_PAYLOAD_LEN: usize = 1024 * 1024;

/// 当前协议版本号
pub const PROTOCOL_VERSION: u16 = 1;

/// 命令类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CmdType {
    /// 心跳包（保活与探活）
    Heartbeat = 1,
    /// 认证请求（C→S，携带 token）
    Auth = 2,
    /// 认证响应（S→C）
    AuthAck = 3,
    /// 聊天消息（双向）
    Message = 4,
    /// 消息确认（C→S）
    MessageAck = 5,
    /// 踢出通知（S→C，如服务器重启）
    Kick = 6,
}

impl CmdType {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(CmdType::Heartbeat),
            2 => Some(CmdType::Auth),
            3 => Some(CmdType::AuthAck),
            4 => Some(CmdType::Message),
            5 => Some(CmdType::MessageAck),
            6 => Some(CmdType::Kick),
            _ => None,
        }
    }
}

/// 编解码错误
#[derive(Debug, Error)]
pub enum CodecError {
    /// 流在头部或消息体中途结束
    #[error("unexpected end of stream")]
    ShortRead(#[source] io::Error),

    /// 无效的消息头（长度或版本非法）
    #[error("invalid message header")]
    InvalidHeader,

    /// 消息体超过上限
    #[error("payload exceeds maximum allowed size")]
    PayloadTooLarge,

    /// 其他 I/O 错误
    #[error("read error: {0}")]
    Io(#[source] io::Error),
}

impl CodecError {
    /// 是否为对端关闭/中断导致的读错误（日志降级用）
    pub fn is_disconnect(&self) -> bool {
        matches!(self, CodecError::ShortRead(_))
    }
}

fn map_read_err(err: io::Error) -> CodecError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        CodecError::ShortRead(err)
    } else {
        CodecError::Io(err)
    }
}

/// 一条完整的协议消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// 命令类型原始值，未知命令由上层丢弃
    pub cmd: u16,
    /// 消息体（通常为 JSON）
    pub body: Vec<u8>,
}

impl Frame {
    pub fn new(cmd: CmdType, body: Vec<u8>) -> Self {
        Self {
            cmd: cmd as u16,
            body,
        }
    }

    pub fn cmd_type(&self) -> Option<CmdType> {
        CmdType::from_u16(self.cmd)
    }

    /// 封包：序列化为字节数组
    ///
    /// `Length = Version(2) + CmdType(2) + len(Body)`，大端序写入。
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        if self.body.len() > MAX_PAYLOAD_LEN {
            return Err(CodecError::PayloadTooLarge);
        }

        let length = (4 + self.body.len()) as u32;
        let mut buf = Vec::with_capacity(HEADER_LEN + self.body.len());
        buf.extend_from_slice(&length.to_be_bytes());
        buf.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
        buf.extend_from_slice(&self.cmd.to_be_bytes());
        buf.extend_from_slice(&self.body);
        Ok(buf)
    }

    /// 解包：从 Reader 中读取并解析一条完整消息
    ///
    /// `read_exact` 保证精确读取指定字节数，这是解决粘包/拆包的关键。
    /// 消息体长度在分配缓冲区之前校验。
    pub async fn decode<R>(reader: &mut R) -> Result<Frame, CodecError>
    where
        R: AsyncRead + Unpin,
    {
        let mut header = [0u8; HEADER_LEN];
        reader.read_exact(&mut header).await.map_err(map_read_err)?;

        let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        let version = u16::from_be_bytes([header[4], header[5]]);
        let cmd = u16::from_be_bytes([header[6], header[7]]);

        if length < 4 || version != PROTOCOL_VERSION {
            return Err(CodecError::InvalidHeader);
        }

        let body_len = (length - 4) as usize;
        if body_len > MAX_PAYLOAD_LEN {
            return Err(CodecError::PayloadTooLarge);
        }

        let mut body = vec![0u8; body_len];
        if body_len > 0 {
            reader.read_exact(&mut body).await.map_err(map_read_err)?;
        }

        Ok(Frame { cmd, body })
    }
}
