//! 消息分发器
//!
//! 协调注册表、会话目录、序列号、离线信箱与跨网关路由，
//! 实现认证与消息的完整投递协议。
//!
//! 路由决策（`A → B`）：取号后先查本地注册表，本网关命中即直接
//! 推送，不查目录；否则查会话目录，不在线或查询失败存离线信箱，
//! 在其他网关则发布到对方频道。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::auth::TokenValidator;
use crate::error::{GatewayError, Result};
use crate::mailbox::OfflineMailbox;
use crate::message::{
    AuthRequest, ChatMessage, MSG_TYPE_PRIVATE, MessageAck, MessageIngress, conversation_id,
};
use crate::protocol::{CmdType, Frame};
use crate::pubsub::{PubSubRouter, RoutedMessageHandler};
use crate::sequence::SequenceAllocator;
use crate::server::connection::Connection;
use crate::server::registry::ConnectionRegistry;
use crate::server::tcp_server::FrameHandler;
use crate::session::SessionDirectory;

/// 用户上线时单次回放的离线消息上限
pub const OFFLINE_REPLAY_BATCH: i64 = 100;

pub struct MessageDispatcher {
    gateway_id: String,
    registry: Arc<ConnectionRegistry>,
    validator: TokenValidator,
    directory: Arc<dyn SessionDirectory>,
    sequence: Arc<dyn SequenceAllocator>,
    mailbox: Arc<dyn OfflineMailbox>,
    router: Arc<dyn PubSubRouter>,
}

impl MessageDispatcher {
    pub fn new(
        gateway_id: impl Into<String>,
        registry: Arc<ConnectionRegistry>,
        validator: TokenValidator,
        directory: Arc<dyn SessionDirectory>,
        sequence: Arc<dyn SequenceAllocator>,
        mailbox: Arc<dyn OfflineMailbox>,
        router: Arc<dyn PubSubRouter>,
    ) -> Self {
        Self {
            gateway_id: gateway_id.into(),
            registry,
            validator,
            directory,
            sequence,
            mailbox,
            router,
        }
    }

    pub fn gateway_id(&self) -> &str {
        &self.gateway_id
    }

    /// 处理认证请求
    ///
    /// 验证通过后绑定用户、写入会话目录、回复成功，并异步回放
    /// 离线消息（不阻塞认证流程）。验证失败回复失败原因，连接
    /// 保持未认证状态。
    pub async fn handle_auth(&self, conn: &Arc<Connection>, body: &[u8]) {
        let request: AuthRequest = match serde_json::from_slice(body) {
            Ok(request) => request,
            Err(_) => {
                self.send_auth_ack(conn, false, "invalid request");
                return;
            }
        };

        let claims = match self.validator.validate(&request.token) {
            Ok(claims) => claims,
            Err(err) => {
                debug!(conn_id = conn.id(), error = %err, "authentication failed");
                self.send_auth_ack(conn, false, &err.to_string());
                return;
            }
        };

        self.registry.bind_user(&claims.user_id, conn);

        // 目录写入失败不拒绝认证：客户端可通过心跳自愈
        if let Err(err) = self.directory.login(&claims.user_id, conn.id()).await {
            error!(user_id = %claims.user_id, error = %err, "failed to create session");
        }

        self.send_auth_ack(conn, true, &claims.user_id);
        info!(
            user_id = %claims.user_id,
            conn_id = conn.id(),
            "user authenticated"
        );

        let mailbox = self.mailbox.clone();
        let conn = conn.clone();
        let user_id = claims.user_id;
        tokio::spawn(async move {
            if let Err(err) = replay_mailbox(mailbox.as_ref(), &user_id, &conn).await {
                warn!(user_id = %user_id, error = %err, "offline replay failed");
            }
        });
    }

    fn send_auth_ack(&self, conn: &Arc<Connection>, success: bool, message: &str) {
        let body = json!({ "success": success, "message": message })
            .to_string()
            .into_bytes();
        if let Err(err) = conn.send(&Frame::new(CmdType::AuthAck, body)) {
            debug!(conn_id = conn.id(), error = %err, "failed to send auth ack");
        }
    }

    /// 发送私聊消息（路由入口）
    pub async fn send_private(&self, from_user_id: &str, to_user_id: &str, content: String) -> Result<()> {
        let conversation = conversation_id(from_user_id, to_user_id);
        let seq_id = self.sequence.next(&conversation).await?;

        let msg = ChatMessage {
            from_user_id: from_user_id.to_string(),
            to_user_id: to_user_id.to_string(),
            content,
            msg_type: MSG_TYPE_PRIVATE,
            seq_id,
            timestamp: chrono::Utc::now().timestamp(),
        };

        // 本地快路径：接收者就在本网关时注册表是权威，不查目录
        if self.registry.by_user(to_user_id).is_some() {
            return self.deliver_local(&msg).await;
        }

        match self.directory.gateway_of(to_user_id).await {
            Ok(Some(gateway_id)) if gateway_id == self.gateway_id => {
                // 目录说在本网关但注册表没有：连接刚断开，走离线
                self.deliver_local(&msg).await
            }
            Ok(Some(gateway_id)) => {
                debug!(
                    to_user_id,
                    target = %gateway_id,
                    seq_id,
                    "routing message via pub/sub"
                );
                self.router.publish(&gateway_id, &msg).await
            }
            Ok(None) => {
                debug!(to_user_id, seq_id, "user offline, storing message");
                self.mailbox.store(to_user_id, &msg).await
            }
            Err(err) => {
                // 目录不可达视为离线，消息落盒
                warn!(to_user_id, error = %err, "session lookup failed, storing message");
                self.mailbox.store(to_user_id, &msg).await
            }
        }
    }

    /// 本地投递：注册表查连接并推送；连接缺失或已关闭则落离线信箱
    async fn deliver_local(&self, msg: &ChatMessage) -> Result<()> {
        let Some(conn) = self.registry.by_user(&msg.to_user_id) else {
            debug!(to_user_id = %msg.to_user_id, "connection not found, storing message");
            return self.mailbox.store(&msg.to_user_id, msg).await;
        };

        let frame = msg.to_frame()?;
        match conn.send(&frame) {
            Ok(()) => {
                debug!(to_user_id = %msg.to_user_id, seq_id = msg.seq_id, "delivered locally");
                Ok(())
            }
            Err(GatewayError::ConnectionClosed) => {
                debug!(to_user_id = %msg.to_user_id, "connection closed, storing message");
                self.mailbox.store(&msg.to_user_id, msg).await
            }
            Err(err) => Err(err),
        }
    }

    /// 处理消息确认：删除该序列号及之前的离线消息
    pub async fn handle_ack(&self, user_id: &str, seq_id: i64) {
        if let Err(err) = self.mailbox.remove(user_id, seq_id).await {
            warn!(user_id, seq_id, error = %err, "failed to trim mailbox");
        }
    }

    /// 回放离线消息（认证成功后调用）
    pub async fn deliver_offline(&self, user_id: &str, conn: &Arc<Connection>) -> Result<()> {
        replay_mailbox(self.mailbox.as_ref(), user_id, conn).await
    }

    async fn handle_heartbeat(&self, conn: &Arc<Connection>) {
        if let Err(err) = conn.send(&Frame::new(CmdType::Heartbeat, b"pong".to_vec())) {
            debug!(conn_id = conn.id(), error = %err, "failed to send pong");
        }
        if let Some(user_id) = conn.user_id() {
            if let Err(err) = self.directory.heartbeat(&user_id).await {
                warn!(user_id = %user_id, error = %err, "failed to refresh session");
            }
        }
    }

    async fn handle_message(&self, conn: &Arc<Connection>, body: &[u8]) {
        let Some(user_id) = conn.user_id() else {
            debug!(conn_id = conn.id(), "dropping message from unauthenticated connection");
            return;
        };

        let ingress: MessageIngress = match serde_json::from_slice(body) {
            Ok(ingress) => ingress,
            Err(err) => {
                debug!(conn_id = conn.id(), error = %err, "invalid message body");
                return;
            }
        };

        if let Err(err) = self
            .send_private(&user_id, &ingress.to_user_id, ingress.content)
            .await
        {
            error!(
                from_user_id = %user_id,
                to_user_id = %ingress.to_user_id,
                error = %err,
                "failed to send message"
            );
        }
    }

    async fn handle_message_ack(&self, conn: &Arc<Connection>, body: &[u8]) {
        let Some(user_id) = conn.user_id() else {
            debug!(conn_id = conn.id(), "dropping ack from unauthenticated connection");
            return;
        };

        let ack: MessageAck = match serde_json::from_slice(body) {
            Ok(ack) => ack,
            Err(err) => {
                debug!(conn_id = conn.id(), error = %err, "invalid ack body");
                return;
            }
        };

        self.handle_ack(&user_id, ack.seq_id).await;
    }
}

#[async_trait]
impl FrameHandler for MessageDispatcher {
    async fn handle_frame(&self, conn: &Arc<Connection>, frame: Frame) {
        match frame.cmd_type() {
            Some(CmdType::Heartbeat) => self.handle_heartbeat(conn).await,
            Some(CmdType::Auth) => self.handle_auth(conn, &frame.body).await,
            Some(CmdType::Message) => self.handle_message(conn, &frame.body).await,
            Some(CmdType::MessageAck) => self.handle_message_ack(conn, &frame.body).await,
            Some(CmdType::AuthAck) | Some(CmdType::Kick) => {
                // 服务端专属命令不接受上行
                debug!(conn_id = conn.id(), cmd = frame.cmd, "dropping server-only command");
            }
            None => {
                debug!(conn_id = conn.id(), cmd = frame.cmd, "unknown command type");
            }
        }
    }
}

#[async_trait]
impl RoutedMessageHandler for MessageDispatcher {
    /// 处理从其他网关路由来的消息：尝试本地投递，用户已断开
    /// 则落离线信箱，不再二次发布
    async fn handle_routed(&self, msg: ChatMessage) {
        if let Err(err) = self.deliver_local(&msg).await {
            warn!(
                to_user_id = %msg.to_user_id,
                seq_id = msg.seq_id,
                error = %err,
                "failed to deliver routed message"
            );
        }
    }
}

/// 回放离线信箱：拉取最新一批并按序列号升序推送
///
/// 拉取本身不删除，裁剪由客户端随后的 ACK 驱动，
/// 消息在确认之前不会丢。
async fn replay_mailbox(
    mailbox: &dyn OfflineMailbox,
    user_id: &str,
    conn: &Arc<Connection>,
) -> Result<()> {
    let mut messages = mailbox.fetch_latest(user_id, OFFLINE_REPLAY_BATCH).await?;
    if messages.is_empty() {
        return Ok(());
    }

    // fetch_latest 从新到旧，反转后按升序投递
    messages.reverse();
    let total = messages.len();
    for msg in &messages {
        let frame = msg.to_frame()?;
        conn.send(&frame)?;
    }

    info!(user_id, count = total, "delivered offline messages");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::InMemoryMailbox;
    use crate::pubsub::{InMemoryPubSubHub, InMemoryPubSubRouter};
    use crate::sequence::InMemorySequenceAllocator;
    use crate::session::InMemorySessionDirectory;
    use tokio::sync::mpsc;

    const SECRET: &[u8] = b"dispatcher-test-secret";

    struct Harness {
        dispatcher: Arc<MessageDispatcher>,
        registry: Arc<ConnectionRegistry>,
        directory: Arc<InMemorySessionDirectory>,
        mailbox: InMemoryMailbox,
        validator: TokenValidator,
    }

    fn harness(gateway_id: &str) -> Harness {
        let registry = Arc::new(ConnectionRegistry::new());
        let directory = Arc::new(InMemorySessionDirectory::new(gateway_id));
        let mailbox = InMemoryMailbox::new();
        let router = Arc::new(InMemoryPubSubRouter::new(
            gateway_id,
            InMemoryPubSubHub::new(),
        ));
        let dispatcher = Arc::new(MessageDispatcher::new(
            gateway_id,
            registry.clone(),
            TokenValidator::new(SECRET),
            directory.clone(),
            Arc::new(InMemorySequenceAllocator::new()),
            Arc::new(mailbox.clone()),
            router,
        ));
        Harness {
            dispatcher,
            registry,
            directory,
            mailbox,
            validator: TokenValidator::new(SECRET),
        }
    }

    fn new_conn(id: u64) -> (Arc<Connection>, mpsc::Receiver<Vec<u8>>) {
        Connection::new(id, "127.0.0.1:0".parse().unwrap())
    }

    async fn recv_frame(rx: &mut mpsc::Receiver<Vec<u8>>) -> Frame {
        let data = rx.recv().await.expect("expected a frame");
        Frame::decode(&mut &data[..]).await.expect("decodable frame")
    }

    #[tokio::test]
    async fn test_auth_success_binds_and_acks() {
        let h = harness("gateway_1");
        let (conn, mut rx) = new_conn(1);

        let token = h.validator.issue("alice", "Alice", crate::auth::DEFAULT_TOKEN_TTL).unwrap();
        let body = serde_json::to_vec(&json!({ "token": token })).unwrap();
        h.dispatcher
            .handle_frame(&conn, Frame::new(CmdType::Auth, body))
            .await;

        let ack = recv_frame(&mut rx).await;
        assert_eq!(ack.cmd_type(), Some(CmdType::AuthAck));
        let ack: crate::message::AuthAck = serde_json::from_slice(&ack.body).unwrap();
        assert!(ack.success);
        assert_eq!(ack.message, "alice");

        assert_eq!(h.registry.by_user("alice").unwrap().id(), 1);
        assert!(h.directory.is_online("alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_auth_failure_leaves_connection_unbound() {
        let h = harness("gateway_1");
        let (conn, mut rx) = new_conn(1);

        let body = serde_json::to_vec(&json!({ "token": "garbage" })).unwrap();
        h.dispatcher
            .handle_frame(&conn, Frame::new(CmdType::Auth, body))
            .await;

        let ack = recv_frame(&mut rx).await;
        let ack: crate::message::AuthAck = serde_json::from_slice(&ack.body).unwrap();
        assert!(!ack.success);
        assert_eq!(conn.user_id(), None);
        assert!(h.registry.by_user("alice").is_none());
    }

    #[tokio::test]
    async fn test_local_delivery_with_sequence() {
        let h = harness("gateway_1");
        let (bob_conn, mut bob_rx) = new_conn(2);
        h.registry.add(bob_conn.clone());
        h.registry.bind_user("bob", &bob_conn);
        h.directory.login("bob", 2).await.unwrap();

        h.dispatcher
            .send_private("alice", "bob", "hi".into())
            .await
            .unwrap();

        let frame = recv_frame(&mut bob_rx).await;
        assert_eq!(frame.cmd_type(), Some(CmdType::Message));
        let msg: ChatMessage = serde_json::from_slice(&frame.body).unwrap();
        assert_eq!(msg.from_user_id, "alice");
        assert_eq!(msg.content, "hi");
        assert_eq!(msg.seq_id, 1);
        // 本地投递不落离线信箱
        assert_eq!(h.mailbox.count("bob").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_offline_recipient_goes_to_mailbox() {
        let h = harness("gateway_1");

        for _ in 0..3 {
            h.dispatcher
                .send_private("alice", "bob", "hi".into())
                .await
                .unwrap();
        }

        assert_eq!(h.mailbox.count("bob").await.unwrap(), 3);
        let stored = h.mailbox.fetch("bob", 0, 10).await.unwrap();
        let seqs: Vec<i64> = stored.iter().map(|m| m.seq_id).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_stale_session_falls_back_to_mailbox() {
        // 测试：目录仍记录本网关，但连接已不在注册表（刚断开）
        let h = harness("gateway_1");
        h.directory.login("bob", 9).await.unwrap();

        h.dispatcher
            .send_private("alice", "bob", "hi".into())
            .await
            .unwrap();

        assert_eq!(h.mailbox.count("bob").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_closed_connection_falls_back_to_mailbox() {
        let h = harness("gateway_1");
        let (bob_conn, _bob_rx) = new_conn(2);
        h.registry.add(bob_conn.clone());
        h.registry.bind_user("bob", &bob_conn);
        bob_conn.close();

        h.dispatcher
            .send_private("alice", "bob", "hi".into())
            .await
            .unwrap();

        assert_eq!(h.mailbox.count("bob").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unauthenticated_message_dropped() {
        let h = harness("gateway_1");
        let (conn, _rx) = new_conn(3);

        let body = serde_json::to_vec(&json!({ "to_user_id": "bob", "content": "hi" })).unwrap();
        h.dispatcher
            .handle_frame(&conn, Frame::new(CmdType::Message, body))
            .await;

        // 没有任何副作用
        assert_eq!(h.mailbox.count("bob").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ack_trims_mailbox() {
        let h = harness("gateway_1");
        for _ in 0..3 {
            h.dispatcher
                .send_private("alice", "bob", "hi".into())
                .await
                .unwrap();
        }

        let (conn, _rx) = new_conn(4);
        h.registry.add(conn.clone());
        h.registry.bind_user("bob", &conn);

        let body = serde_json::to_vec(&MessageAck { seq_id: 2 }).unwrap();
        h.dispatcher
            .handle_frame(&conn, Frame::new(CmdType::MessageAck, body))
            .await;
        assert_eq!(h.mailbox.count("bob").await.unwrap(), 1);

        let body = serde_json::to_vec(&MessageAck { seq_id: 3 }).unwrap();
        h.dispatcher
            .handle_frame(&conn, Frame::new(CmdType::MessageAck, body))
            .await;
        assert_eq!(h.mailbox.count("bob").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_offline_replay_is_ascending() {
        let h = harness("gateway_1");
        for _ in 0..3 {
            h.dispatcher
                .send_private("alice", "bob", "hi".into())
                .await
                .unwrap();
        }

        let (conn, mut rx) = new_conn(5);
        h.dispatcher.deliver_offline("bob", &conn).await.unwrap();

        let mut seqs = Vec::new();
        for _ in 0..3 {
            let frame = recv_frame(&mut rx).await;
            let msg: ChatMessage = serde_json::from_slice(&frame.body).unwrap();
            seqs.push(msg.seq_id);
        }
        assert_eq!(seqs, vec![1, 2, 3]);
        // 回放不删除，裁剪由 ACK 驱动
        assert_eq!(h.mailbox.count("bob").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_heartbeat_replies_pong_in_any_state() {
        let h = harness("gateway_1");
        let (conn, mut rx) = new_conn(6);

        h.dispatcher
            .handle_frame(&conn, Frame::new(CmdType::Heartbeat, b"ping".to_vec()))
            .await;

        let pong = recv_frame(&mut rx).await;
        assert_eq!(pong.cmd_type(), Some(CmdType::Heartbeat));
        assert_eq!(pong.body, b"pong");
    }

    #[tokio::test]
    async fn test_routed_message_delivers_or_stores() {
        let h = harness("gateway_1");
        let msg = ChatMessage {
            from_user_id: "alice".into(),
            to_user_id: "bob".into(),
            content: "cross".into(),
            msg_type: MSG_TYPE_PRIVATE,
            seq_id: 5,
            timestamp: 0,
        };

        // 用户不在本地：落离线信箱
        h.dispatcher.handle_routed(msg.clone()).await;
        assert_eq!(h.mailbox.count("bob").await.unwrap(), 1);

        // 用户在本地：直接投递
        let (conn, mut rx) = new_conn(7);
        h.registry.add(conn.clone());
        h.registry.bind_user("bob", &conn);
        h.dispatcher.handle_routed(msg).await;
        let frame = recv_frame(&mut rx).await;
        let delivered: ChatMessage = serde_json::from_slice(&frame.body).unwrap();
        assert_eq!(delivered.content, "cross");
    }
}
