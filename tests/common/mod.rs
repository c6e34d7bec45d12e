//! 集成测试辅助：进程内集群与测试客户端
//!
//! 用内存存储实现拉起真实的 TCP 网关，多个网关共享同一张会话表
//! 与发布/订阅中心即构成一个"集群"。

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

use ember_gateway::auth::{DEFAULT_TOKEN_TTL, TokenValidator};
use ember_gateway::mailbox::InMemoryMailbox;
use ember_gateway::message::{AuthAck, ChatMessage, MessageAck};
use ember_gateway::protocol::{CmdType, Frame};
use ember_gateway::pubsub::InMemoryPubSubHub;
use ember_gateway::sequence::InMemorySequenceAllocator;
use ember_gateway::session::SessionTable;
use ember_gateway::{GatewayApp, GatewayConfig, GatewayStores};

pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// 进程内网关集群
pub struct TestCluster {
    pub table: SessionTable,
    pub hub: InMemoryPubSubHub,
    pub mailbox: InMemoryMailbox,
    pub sequence: InMemorySequenceAllocator,
}

impl TestCluster {
    pub fn new() -> Self {
        Self {
            table: SessionTable::default(),
            hub: InMemoryPubSubHub::new(),
            mailbox: InMemoryMailbox::new(),
            sequence: InMemorySequenceAllocator::new(),
        }
    }

    /// 启动一个网关节点，返回应用句柄与实际监听地址
    pub async fn spawn_gateway(&self, gateway_id: &str) -> (Arc<GatewayApp>, SocketAddr) {
        let config = test_config(gateway_id);
        let stores = GatewayStores::in_memory(
            gateway_id,
            self.table.clone(),
            self.hub.clone(),
            self.mailbox.clone(),
            self.sequence.clone(),
        );
        let app = Arc::new(GatewayApp::new(&config, stores));
        let addr = app.start().await.expect("gateway start");
        (app, addr)
    }

    /// 与网关同密钥的签发器
    pub fn validator(&self) -> TokenValidator {
        TokenValidator::new(&test_config("gateway_test").token_secret())
    }

    pub fn token_for(&self, user_id: &str) -> String {
        self.validator()
            .issue(user_id, user_id, DEFAULT_TOKEN_TTL)
            .expect("issue token")
    }
}

fn test_config(gateway_id: &str) -> GatewayConfig {
    GatewayConfig {
        gateway_id: gateway_id.to_string(),
        listen_addr: "127.0.0.1:0".to_string(),
        store_addr: "127.0.0.1:6379".to_string(),
    }
}

/// 测试客户端：一条真实的 TCP 连接
pub struct TestClient {
    pub stream: TcpStream,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        Self { stream }
    }

    pub async fn send(&mut self, frame: &Frame) {
        let data = frame.encode().expect("encode");
        self.stream.write_all(&data).await.expect("write frame");
    }

    pub async fn send_raw(&mut self, data: &[u8]) {
        self.stream.write_all(data).await.expect("write raw");
    }

    pub async fn recv(&mut self) -> Frame {
        timeout(RECV_TIMEOUT, Frame::decode(&mut self.stream))
            .await
            .expect("recv timeout")
            .expect("decode frame")
    }

    /// 在窗口期内不应再收到任何帧
    pub async fn expect_silence(&mut self, window: Duration) {
        let result = timeout(window, Frame::decode(&mut self.stream)).await;
        assert!(result.is_err(), "expected no further frames, got {:?}", result);
    }

    /// 发送认证请求并返回响应
    pub async fn authenticate(&mut self, token: &str) -> AuthAck {
        let body = serde_json::json!({ "token": token }).to_string().into_bytes();
        self.send(&Frame::new(CmdType::Auth, body)).await;

        let frame = self.recv().await;
        assert_eq!(frame.cmd_type(), Some(CmdType::AuthAck));
        serde_json::from_slice(&frame.body).expect("auth ack body")
    }

    pub async fn send_message(&mut self, to_user_id: &str, content: &str) {
        let body = serde_json::json!({ "to_user_id": to_user_id, "content": content })
            .to_string()
            .into_bytes();
        self.send(&Frame::new(CmdType::Message, body)).await;
    }

    pub async fn recv_message(&mut self) -> ChatMessage {
        let frame = self.recv().await;
        assert_eq!(frame.cmd_type(), Some(CmdType::Message));
        serde_json::from_slice(&frame.body).expect("chat message body")
    }

    pub async fn ack(&mut self, seq_id: i64) {
        let body = serde_json::to_vec(&MessageAck { seq_id }).expect("ack body");
        self.send(&Frame::new(CmdType::MessageAck, body)).await;
    }
}
