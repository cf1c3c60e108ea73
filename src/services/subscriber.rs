use crate::{
    config::Config,
    error::{AppError, Result},
    models::subscriber::*,
    services::Database,
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};
use validator::Validate;

/// 订阅者通讯录 — 只读查询某用户的推送端点
///
/// 推广与警报服务只需要这个窄接口, 不需要整个档案服务。
#[async_trait]
pub trait SubscriberDirectory: Send + Sync {
    async fn push_endpoint(&self, user_id: &str) -> Result<Option<PushSubscription>>;
}

/// 订阅者档案服务 — 家位置、警报半径、推送订阅
#[derive(Clone)]
pub struct SubscriberService {
    db: Arc<Database>,
    config: Arc<Config>,
}

impl SubscriberService {
    pub fn new(db: Arc<Database>, config: Arc<Config>) -> Self {
        Self { db, config }
    }

    /// 获取档案, 不存在时懒创建 (半径取配置默认值)
    pub async fn get_profile(&self, user_id: &str) -> Result<SubscriberProfile> {
        if let Some(profile) = self.db.get_by_id::<SubscriberProfile>("subscriber_profile", user_id).await? {
            return Ok(profile);
        }

        let now = Utc::now();
        let profile = SubscriberProfile {
            user_id: user_id.to_string(),
            location: None,
            location_city: None,
            notification_radius_km: self.config.default_alert_radius_km,
            push_endpoint: None,
            created_at: now,
            updated_at: now,
        };

        debug!("Creating subscriber profile for {}", user_id);
        self.db.create_with_id("subscriber_profile", user_id, profile).await
    }

    /// 更新家位置 (GeoJSON 点, 经度在前)
    pub async fn update_location(
        &self,
        user_id: &str,
        request: UpdateLocationRequest,
    ) -> Result<SubscriberProfile> {
        request.validate()?;
        crate::utils::geo::validate_coordinates(request.lat, request.lng)?;

        self.get_profile(user_id).await?;
        let location = GeoPoint::new(request.lat, request.lng);
        self.db
            .update_by_id_with_json(
                "subscriber_profile",
                user_id,
                json!({
                    "location": location,
                    "location_city": request.city,
                    "updated_at": Utc::now(),
                }),
            )
            .await?
            .ok_or_else(|| AppError::not_found("Subscriber profile"))
    }

    pub async fn update_alert_radius(
        &self,
        user_id: &str,
        request: UpdateAlertRadiusRequest,
    ) -> Result<SubscriberProfile> {
        request.validate()?;

        self.get_profile(user_id).await?;
        self.db
            .update_by_id_with_json(
                "subscriber_profile",
                user_id,
                json!({
                    "notification_radius_km": request.radius_km,
                    "updated_at": Utc::now(),
                }),
            )
            .await?
            .ok_or_else(|| AppError::not_found("Subscriber profile"))
    }

    /// 注册浏览器推送订阅; 同一用户换设备时覆盖 (最新的赢)
    pub async fn set_push_subscription(
        &self,
        user_id: &str,
        request: UpdatePushSubscriptionRequest,
    ) -> Result<SubscriberProfile> {
        if request.endpoint.is_empty() {
            return Err(AppError::validation("Push endpoint cannot be empty"));
        }

        self.get_profile(user_id).await?;
        let subscription = PushSubscription {
            endpoint: request.endpoint,
            p256dh: request.keys.p256dh,
            auth: request.keys.auth,
        };

        info!("Registering push subscription for {}", user_id);
        self.db
            .update_by_id_with_json(
                "subscriber_profile",
                user_id,
                json!({
                    "push_endpoint": subscription,
                    "updated_at": Utc::now(),
                }),
            )
            .await?
            .ok_or_else(|| AppError::not_found("Subscriber profile"))
    }

    pub async fn clear_push_subscription(&self, user_id: &str) -> Result<SubscriberProfile> {
        self.get_profile(user_id).await?;
        self.db
            .update_by_id_with_json(
                "subscriber_profile",
                user_id,
                json!({
                    "push_endpoint": null,
                    "updated_at": Utc::now(),
                }),
            )
            .await?
            .ok_or_else(|| AppError::not_found("Subscriber profile"))
    }
}

#[async_trait]
impl SubscriberDirectory for SubscriberService {
    async fn push_endpoint(&self, user_id: &str) -> Result<Option<PushSubscription>> {
        let profile: Option<SubscriberProfile> =
            self.db.get_by_id("subscriber_profile", user_id).await?;
        Ok(profile.and_then(|p| p.push_endpoint))
    }
}
