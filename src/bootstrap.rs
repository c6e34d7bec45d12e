//! 网关装配
//!
//! 各组件通过显式构造注入依赖，不使用进程级全局句柄；
//! 测试可以用内存实现替换整套存储。
//!
//! 所有权关系：注册表持有连接句柄，分发器持有注册表引用，
//! 连接不反向持有任何一方。关停顺序：停接入、等连接退出、
//! 停发布/订阅。

use std::net::SocketAddr;
use std::sync::Arc;

use crate::auth::TokenValidator;
use crate::config::GatewayConfig;
use crate::dispatcher::MessageDispatcher;
use crate::error::Result;
use crate::mailbox::{InMemoryMailbox, OfflineMailbox, RedisMailbox};
use crate::pubsub::{InMemoryPubSubHub, InMemoryPubSubRouter, PubSubRouter, RedisPubSubRouter};
use crate::sequence::{InMemorySequenceAllocator, RedisSequenceAllocator, SequenceAllocator};
use crate::server::registry::ConnectionRegistry;
use crate::server::tcp_server::TcpGateway;
use crate::session::{
    InMemorySessionDirectory, RedisSessionDirectory, SessionDirectory, SessionTable,
};
use crate::store;

/// 一套后端存储实现
pub struct GatewayStores {
    pub directory: Arc<dyn SessionDirectory>,
    pub sequence: Arc<dyn SequenceAllocator>,
    pub mailbox: Arc<dyn OfflineMailbox>,
    pub router: Arc<dyn PubSubRouter>,
}

impl GatewayStores {
    /// 连接共享存储（Redis）并构建全套实现
    pub async fn redis(config: &GatewayConfig) -> Result<Self> {
        let store = store::connect(&config.store_url()).await?;
        Ok(Self {
            directory: Arc::new(RedisSessionDirectory::new(
                &config.gateway_id,
                store.conn.clone(),
            )),
            sequence: Arc::new(RedisSequenceAllocator::new(store.conn.clone())),
            mailbox: Arc::new(RedisMailbox::new(store.conn.clone())),
            router: Arc::new(RedisPubSubRouter::new(
                &config.gateway_id,
                store.client,
                store.conn,
            )),
        })
    }

    /// 进程内实现（测试用）
    ///
    /// 会话表与发布/订阅中心可在多个网关实例之间共享，
    /// 用于单进程内的跨网关场景。
    pub fn in_memory(
        gateway_id: &str,
        table: SessionTable,
        hub: InMemoryPubSubHub,
        mailbox: InMemoryMailbox,
        sequence: InMemorySequenceAllocator,
    ) -> Self {
        Self {
            directory: Arc::new(InMemorySessionDirectory::with_table(gateway_id, table)),
            sequence: Arc::new(sequence),
            mailbox: Arc::new(mailbox),
            router: Arc::new(InMemoryPubSubRouter::new(gateway_id, hub)),
        }
    }
}

/// 网关应用：持有全部组件并管理生命周期
pub struct GatewayApp {
    dispatcher: Arc<MessageDispatcher>,
    server: TcpGateway,
    router: Arc<dyn PubSubRouter>,
}

impl GatewayApp {
    pub fn new(config: &GatewayConfig, stores: GatewayStores) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let validator = TokenValidator::new(&config.token_secret());

        let dispatcher = Arc::new(MessageDispatcher::new(
            config.gateway_id.clone(),
            registry.clone(),
            validator,
            stores.directory,
            stores.sequence,
            stores.mailbox,
            stores.router.clone(),
        ));

        let server = TcpGateway::new(
            config.listen_addr.clone(),
            config.gateway_id.clone(),
            registry,
            dispatcher.clone(),
        );

        Self {
            dispatcher,
            server,
            router: stores.router,
        }
    }

    /// 启动：先订阅（保证能收到其他节点的消息），再开始接入
    pub async fn start(&self) -> Result<SocketAddr> {
        self.router.start(self.dispatcher.clone()).await?;
        self.server.start().await
    }

    /// 优雅关停：停止接入并等连接退出，再停发布/订阅
    pub async fn stop(&self) {
        self.server.stop().await;
        self.router.stop();
    }

    pub fn dispatcher(&self) -> Arc<MessageDispatcher> {
        self.dispatcher.clone()
    }
}
