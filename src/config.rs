//! 网关配置（命令行参数 + 环境变量）

use clap::Parser;
use tracing::warn;

/// Token 签名密钥环境变量；未设置时退回不安全的内置默认值
pub const TOKEN_SECRET_ENV: &str = "EMBER_TOKEN_SECRET";

const DEFAULT_TOKEN_SECRET: &str = "ember-im-secret-change-in-production";

/// 网关配置
#[derive(Debug, Clone, Parser)]
#[command(name = "ember-gateway", about = "分布式 IM 接入网关", version)]
pub struct GatewayConfig {
    /// 网关唯一标识
    #[arg(long = "id", default_value = "gateway_1")]
    pub gateway_id: String,

    /// TCP 监听地址
    #[arg(long = "addr", default_value = "0.0.0.0:8080")]
    pub listen_addr: String,

    /// 共享存储（Redis）地址
    #[arg(long = "store", default_value = "127.0.0.1:6379")]
    pub store_addr: String,
}

impl GatewayConfig {
    /// 共享存储连接 URL
    pub fn store_url(&self) -> String {
        if self.store_addr.starts_with("redis://") {
            self.store_addr.clone()
        } else {
            format!("redis://{}", self.store_addr)
        }
    }

    /// Token 签名密钥
    ///
    /// 优先读取环境变量；内置默认值仅供本地开发，启动时会告警。
    pub fn token_secret(&self) -> Vec<u8> {
        match std::env::var(TOKEN_SECRET_ENV) {
            Ok(secret) if !secret.is_empty() => secret.into_bytes(),
            _ => {
                warn!(
                    env = TOKEN_SECRET_ENV,
                    "token secret not configured, using insecure built-in default"
                );
                DEFAULT_TOKEN_SECRET.as_bytes().to_vec()
            }
        }
    }
}
