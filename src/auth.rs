//! 用户认证（JWT Token 验证）
//!
//! 无状态认证：任何网关用同一对称密钥即可本地验证签名，
//! 无需查询共享存储，天然支持水平扩展。

use std::time::Duration;

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Token 默认有效期
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(24 * 3600);

/// Token 签发者
pub const TOKEN_ISSUER: &str = "ember-im";

/// 认证错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Token 格式错误或签名不匹配
    #[error("invalid token")]
    InvalidToken,

    /// Token 已过期
    #[error("token expired")]
    TokenExpired,
}

/// Token 载荷
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// 用户唯一标识
    pub user_id: String,
    /// 用户名（展示用）
    #[serde(default)]
    pub username: String,
    /// 过期时间（Unix 秒）
    pub exp: i64,
    /// 签发时间（Unix 秒）
    pub iat: i64,
    /// 签发者
    pub iss: String,
}

/// Token 验证器
pub struct TokenValidator {
    decoding_key: DecodingKey,
    encoding_key: EncodingKey,
    validation: Validation,
}

impl TokenValidator {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            decoding_key: DecodingKey::from_secret(secret),
            encoding_key: EncodingKey::from_secret(secret),
            validation,
        }
    }

    /// 验证 Token：校验签名与过期时间，返回载荷
    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        match decode::<Claims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => Ok(data.claims),
            Err(err) => match err.kind() {
                ErrorKind::ExpiredSignature => Err(AuthError::TokenExpired),
                _ => Err(AuthError::InvalidToken),
            },
        }
    }

    /// 签发 Token
    ///
    /// 核心层只负责验证；签发提供给测试与运维工具，使用同一密钥。
    pub fn issue(&self, user_id: &str, username: &str, ttl: Duration) -> Result<String, AuthError> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            user_id: user_id.to_string(),
            username: username.to_string(),
            exp: now + ttl.as_secs() as i64,
            iat: now,
            iss: TOKEN_ISSUER.to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|_| AuthError::InvalidToken)
    }
}
