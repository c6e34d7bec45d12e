//! 业务层消息结构与会话标识

use serde::{Deserialize, Serialize};

use crate::protocol::{CmdType, Frame};

/// 单聊消息
pub const MSG_TYPE_PRIVATE: i32 = 1;
/// 群聊消息（预留）
pub const MSG_TYPE_GROUP: i32 = 2;
/// 系统消息（预留）
pub const MSG_TYPE_SYSTEM: i32 = 3;

/// 聊天消息
///
/// 业务层的消息格式，区别于协议层的 [`Frame`]。本地投递、跨网关转发
/// 与离线存储共用同一结构，JSON 编码。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// 发送者
    pub from_user_id: String,
    /// 接收者
    pub to_user_id: String,
    /// 消息内容
    pub content: String,
    /// 消息类型
    pub msg_type: i32,
    /// 序列号（会话内单调递增）
    pub seq_id: i64,
    /// 发送时间（Unix 秒）
    #[serde(default)]
    pub timestamp: i64,
}

impl ChatMessage {
    /// 封装为协议消息
    pub fn to_frame(&self) -> Result<Frame, serde_json::Error> {
        Ok(Frame::new(CmdType::Message, serde_json::to_vec(self)?))
    }
}

/// 认证请求体
#[derive(Debug, Deserialize)]
pub struct AuthRequest {
    pub token: String,
}

/// 认证响应体
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthAck {
    pub success: bool,
    pub message: String,
}

/// 客户端上行的聊天消息体（仅接收者与内容）
#[derive(Debug, Deserialize)]
pub struct MessageIngress {
    pub to_user_id: String,
    pub content: String,
}

/// 消息确认体
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageAck {
    pub seq_id: i64,
}

/// 踢出通知体
#[derive(Debug, Serialize, Deserialize)]
pub struct KickNotice {
    pub reason: String,
    pub reconnect: bool,
}

/// 生成会话标识
///
/// 私聊会话由两个用户 ID 按字典序拼接而成，保证 A→B 与 B→A 落在
/// 同一会话：`conversation_id("bob", "alice") == "alice:bob"`。
pub fn conversation_id(user1: &str, user2: &str) -> String {
    if user1 <= user2 {
        format!("{}:{}", user1, user2)
    } else {
        format!("{}:{}", user2, user1)
    }
}
