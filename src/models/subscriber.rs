use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// 订阅者档案
/// 位置与通知半径由用户自行维护; 对告警子系统只读
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberProfile {
    pub user_id: String,
    /// GeoJSON Point { type: "Point", coordinates: [lng, lat] }
    /// 未授权定位的用户没有位置
    pub location: Option<GeoPoint>,
    pub location_city: Option<String>,
    pub notification_radius_km: f64,
    /// 推送端点与订阅者 1:1; 重新订阅时整体替换
    pub push_endpoint: Option<PushSubscription>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// GeoJSON 点 (SurrealDB 按 GeoJSON 识别几何类型)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(rename = "type")]
    pub kind: String,
    /// [经度, 纬度]
    pub coordinates: [f64; 2],
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            kind: "Point".to_string(),
            coordinates: [lng, lat],
        }
    }

    pub fn lat(&self) -> f64 {
        self.coordinates[1]
    }

    pub fn lng(&self) -> f64 {
        self.coordinates[0]
    }
}

/// 浏览器推送订阅描述符 (端点 URL + 客户端密钥材料)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushSubscription {
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateLocationRequest {
    pub lat: f64,
    pub lng: f64,
    #[validate(length(max = 100, message = "City name too long"))]
    pub city: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateAlertRadiusRequest {
    #[validate(range(min = 1.0, max = 50.0, message = "Radius must be between 1 and 50 km"))]
    pub radius_km: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePushSubscriptionRequest {
    pub endpoint: String,
    pub keys: PushSubscriptionKeys,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushSubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}
