use crate::{
    config::Config,
    error::{AppError, Result},
    models::subscriber::PushSubscription,
};
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// 待投递的推送消息
/// 同样的结构也写进应用内通知记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub url: Option<String>,
    #[serde(rename = "type")]
    pub notification_type: String,
    /// 端点侧去重标记 (作为 Web Push 的 Topic 头)
    pub tag: Option<String>,
}

/// 推送发送器 — 对单个端点做一次尽力而为的投递
/// 协议不确认接收; 失败由调用方记录, 不重试
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, subscription: &PushSubscription, message: &PushMessage) -> Result<()>;
}

/// VAPID JWT claims (RFC 8292)
#[derive(Debug, Serialize)]
struct VapidClaims {
    aud: String,
    exp: i64,
    sub: String,
}

/// Web Push 生产实现
///
/// 发送的是 VAPID 签名的无载荷唤醒推送 (TTL + Topic 头):
/// service worker 被唤醒后拉取通知列表, 耐久记录才是内容的来源。
/// 载荷加密 (RFC 8291) 的发送器可以通过 PushSender 接口替换进来。
pub struct WebPushSender {
    http: reqwest::Client,
    vapid_private_key: Option<String>,
    vapid_public_key: Option<String>,
    vapid_subject: String,
}

impl WebPushSender {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            // 单次发送的短超时; 超时只算该候选者失败
            .timeout(Duration::from_secs(config.push_send_timeout))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create push HTTP client: {}", e)))?;

        if config.vapid_private_key.is_none() {
            tracing::warn!("VAPID keys not configured, push delivery disabled");
        }

        Ok(Self {
            http,
            vapid_private_key: config.vapid_private_key.clone(),
            vapid_public_key: config.vapid_public_key.clone(),
            vapid_subject: config.vapid_subject.clone(),
        })
    }

    /// 为端点 origin 签发 VAPID JWT
    fn vapid_token(&self, endpoint: &str) -> Result<String> {
        let private_pem = self
            .vapid_private_key
            .as_deref()
            .ok_or_else(|| AppError::ServiceUnavailable("Push is not configured".to_string()))?;

        let parsed = Url::parse(endpoint)
            .map_err(|e| AppError::validation(&format!("Invalid push endpoint: {}", e)))?;
        let audience = format!(
            "{}://{}",
            parsed.scheme(),
            parsed
                .host_str()
                .ok_or_else(|| AppError::validation("Push endpoint has no host"))?
        );

        let claims = VapidClaims {
            aud: audience,
            // 推送服务要求 exp 不超过 24h
            exp: (Utc::now() + chrono::Duration::hours(12)).timestamp(),
            sub: self.vapid_subject.clone(),
        };

        let key = EncodingKey::from_ec_pem(private_pem.as_bytes())?;
        let token = encode(&Header::new(Algorithm::ES256), &claims, &key)?;
        Ok(token)
    }
}

#[async_trait]
impl PushSender for WebPushSender {
    async fn send(&self, subscription: &PushSubscription, message: &PushMessage) -> Result<()> {
        let token = self.vapid_token(&subscription.endpoint)?;
        let public_key = self
            .vapid_public_key
            .as_deref()
            .ok_or_else(|| AppError::ServiceUnavailable("Push is not configured".to_string()))?;

        let mut request = self
            .http
            .post(&subscription.endpoint)
            .header("Authorization", format!("vapid t={}, k={}", token, public_key))
            .header("TTL", "86400")
            .header("Urgency", "high")
            .header("Content-Length", "0");

        if let Some(tag) = &message.tag {
            request = request.header("Topic", tag.as_str());
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            // 404/410 表示订阅已失效 (用户注销或浏览器清理)
            return Err(AppError::ExternalService(format!(
                "Push service returned {} for endpoint",
                response.status()
            )));
        }

        debug!("Push delivered to endpoint (status {})", response.status());
        Ok(())
    }
}
