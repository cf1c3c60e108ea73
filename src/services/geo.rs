use crate::{
    error::Result,
    models::subscriber::{GeoPoint, PushSubscription},
    services::Database,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

/// 告警扇出候选: 在事件半径内且注册过推送端点的订阅者
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertCandidate {
    pub user_id: String,
    pub push_endpoint: PushSubscription,
}

/// 邻近索引 — 回答 "事件点落在哪些订阅者自己配置的半径内"
///
/// 注意这不是 "以 P 为圆心查 X km" 的全局半径查询:
/// 每一行用自己的 notification_radius_km 做阈值,
/// 比较下推到存储层, 不在应用侧全表过滤。
#[async_trait]
pub trait ProximityIndex: Send + Sync {
    async fn find_within_radius(
        &self,
        origin: &GeoPoint,
        excluding: &str,
    ) -> Result<Vec<AlertCandidate>>;
}

/// 生产实现: SurrealDB geo::distance (大圆距离, 单位米)
#[derive(Clone)]
pub struct SurrealProximityIndex {
    db: Arc<Database>,
}

impl SurrealProximityIndex {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProximityIndex for SurrealProximityIndex {
    async fn find_within_radius(
        &self,
        origin: &GeoPoint,
        excluding: &str,
    ) -> Result<Vec<AlertCandidate>> {
        debug!(
            "Proximity query at ({}, {}) excluding {}",
            origin.lat(),
            origin.lng(),
            excluding
        );

        // 没有端点或没有位置的订阅者对这个查询不可见
        let mut response = self
            .db
            .query_with_params(
                r#"
                    SELECT user_id, push_endpoint FROM subscriber_profile
                    WHERE user_id != $exclude
                    AND location != NONE
                    AND push_endpoint != NONE
                    AND geo::distance(location, $origin) <= notification_radius_km * 1000.0
                "#,
                json!({
                    "exclude": excluding,
                    "origin": origin,
                }),
            )
            .await?;

        let candidates: Vec<AlertCandidate> = response.take(0)?;
        debug!("Proximity query matched {} subscribers", candidates.len());

        Ok(candidates)
    }
}
