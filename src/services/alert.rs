use crate::{
    error::{AppError, Result},
    models::alert::*,
    models::notification::NotificationType,
    models::subscriber::GeoPoint,
    services::dispatcher::{FanoutOutcome, NotificationDispatcher},
    services::geo::ProximityIndex,
    services::push::PushMessage,
    services::subscriber::SubscriberDirectory,
    services::Database,
    utils::geo::{haversine_km, validate_coordinates},
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

/// 走失报告创建的结果: 报告本身 + 扇出统计
#[derive(Debug, Clone)]
pub struct ReportOutcome {
    pub lost_cat: LostCat,
    pub notifications_sent: usize,
}

/// 走失猫告警编排器
///
/// report_lost_cat 是系统的主路径:
/// 落报告 → 构造事件 → 邻近查询 → 扇出。
/// 报告一旦落库就算成功; 扇出内部的失败只影响统计数字。
#[derive(Clone)]
pub struct AlertService {
    db: Arc<Database>,
    index: Arc<dyn ProximityIndex>,
    dispatcher: NotificationDispatcher,
    subscribers: Arc<dyn SubscriberDirectory>,
    frontend_url: String,
}

impl AlertService {
    pub fn new(
        db: Arc<Database>,
        index: Arc<dyn ProximityIndex>,
        dispatcher: NotificationDispatcher,
        subscribers: Arc<dyn SubscriberDirectory>,
        frontend_url: String,
    ) -> Self {
        Self {
            db,
            index,
            dispatcher,
            subscribers,
            frontend_url,
        }
    }

    /// 报告走失 + 邻近扇出
    pub async fn report_lost_cat(
        &self,
        reporter_id: &str,
        request: ReportLostCatRequest,
    ) -> Result<ReportOutcome> {
        request.validate()?;
        validate_coordinates(request.last_seen_lat, request.last_seen_lng)?;

        let lost_cat = LostCat {
            id: Uuid::new_v4().to_string(),
            reporter_id: reporter_id.to_string(),
            name: request.name,
            breed: request.breed,
            color: request.color,
            description: request.description,
            last_seen_lat: request.last_seen_lat,
            last_seen_lng: request.last_seen_lng,
            last_seen_address: request.last_seen_address,
            contact_phone: request.contact_phone,
            reward_amount: request.reward_amount,
            status: "missing".to_string(),
            is_boosted: false,
            boost_expires_at: None,
            created_at: Utc::now(),
        };

        let id = lost_cat.id.clone();
        let lost_cat: LostCat = self.db.create_with_id("lost_cat", &id, lost_cat).await?;

        let event = AlertEvent {
            subject_id: lost_cat.id.clone(),
            origin: GeoPoint::new(lost_cat.last_seen_lat, lost_cat.last_seen_lng),
            label: lost_cat.name.clone(),
            excluded_subscriber: reporter_id.to_string(),
            created_at: lost_cat.created_at,
        };

        let outcome = self.fan_out_alert(&event).await;
        info!(
            "Lost cat {} reported; alerted {}/{} nearby subscribers",
            lost_cat.id, outcome.delivered, outcome.attempted
        );

        Ok(ReportOutcome {
            lost_cat,
            notifications_sent: outcome.delivered,
        })
    }

    async fn fan_out_alert(&self, event: &AlertEvent) -> FanoutOutcome {
        // 邻近查询失败: 报告已落库, 降级为零扇出
        let candidates = match self
            .index
            .find_within_radius(&event.origin, &event.excluded_subscriber)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("Proximity query failed for alert {}: {}", event.subject_id, e);
                return FanoutOutcome { attempted: 0, delivered: 0 };
            }
        };

        let message = PushMessage {
            title: format!("Lost Cat Alert: {}", event.label),
            body: format!(
                "{} was reported missing near your area. Keep an eye out!",
                event.label
            ),
            url: Some(format!("{}/lost-cats/{}", self.frontend_url, event.subject_id)),
            notification_type: "lost_cat_nearby".to_string(),
            tag: Some(format!("lost-cat-{}", event.subject_id)),
        };

        self.dispatcher
            .fanout(event, candidates, NotificationType::LostCatNearby, &message)
            .await
    }

    /// 目击上报; 通知原报告人 (1:1, 不做地理扇出)
    pub async fn report_sighting(
        &self,
        reporter_id: &str,
        lost_cat_id: &str,
        request: ReportSightingRequest,
    ) -> Result<CatSighting> {
        request.validate()?;
        validate_coordinates(request.lat, request.lng)?;

        let lost_cat: LostCat = self
            .db
            .get_by_id("lost_cat", lost_cat_id)
            .await?
            .ok_or_else(|| AppError::not_found("Lost cat report"))?;

        let sighting = CatSighting {
            id: Uuid::new_v4().to_string(),
            lost_cat_id: lost_cat_id.to_string(),
            reporter_id: reporter_id.to_string(),
            lat: request.lat,
            lng: request.lng,
            address: request.address,
            note: request.note,
            created_at: Utc::now(),
        };

        let id = sighting.id.clone();
        let sighting: CatSighting = self.db.create_with_id("cat_sighting", &id, sighting).await?;

        // 自己目击自己的报告不必自我通知
        if lost_cat.reporter_id != reporter_id {
            self.send_sighting_notice(&lost_cat, &sighting).await;
        }

        Ok(sighting)
    }

    async fn send_sighting_notice(&self, lost_cat: &LostCat, sighting: &CatSighting) {
        let endpoint = match self.subscribers.push_endpoint(&lost_cat.reporter_id).await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!("Failed to load push endpoint for {}: {}", lost_cat.reporter_id, e);
                None
            }
        };

        let message = PushMessage {
            title: format!("Possible sighting of {}", lost_cat.name),
            body: "Someone reported seeing your cat. Check the sighting details.".to_string(),
            url: Some(format!("{}/lost-cats/{}", self.frontend_url, lost_cat.id)),
            notification_type: "sighting".to_string(),
            tag: Some(format!("sighting-{}", sighting.id)),
        };

        if let Err(e) = self
            .dispatcher
            .notify_user(
                &lost_cat.reporter_id,
                endpoint.as_ref(),
                NotificationType::Sighting,
                &message,
                json!({
                    "lost_cat_id": lost_cat.id,
                    "sighting_id": sighting.id,
                }),
            )
            .await
        {
            warn!("Failed to record sighting notice for {}: {}", lost_cat.reporter_id, e);
        }
    }

    /// 公开的走失报告列表 (最新在前)
    pub async fn list_lost_cats(&self, page: usize, limit: usize) -> Result<Vec<LostCat>> {
        let page = page.max(1);
        let offset = (page - 1) * limit;
        let mut response = self.db.query_with_params(
            r#"
                SELECT * FROM lost_cat
                WHERE status = 'missing'
                ORDER BY is_boosted DESC, created_at DESC
                LIMIT $limit START $offset
            "#,
            json!({ "limit": limit, "offset": offset }),
        ).await?;
        let cats: Vec<LostCat> = response.take(0)?;
        Ok(cats)
    }

    pub async fn get_lost_cat(&self, id: &str) -> Result<LostCat> {
        self.db
            .get_by_id("lost_cat", id)
            .await?
            .ok_or_else(|| AppError::not_found("Lost cat report"))
    }

    /// 某个点附近仍未找到的报告 (半径 km)
    pub async fn nearby_reports(&self, lat: f64, lng: f64, radius_km: f64) -> Result<Vec<LostCat>> {
        validate_coordinates(lat, lng)?;
        let origin = GeoPoint::new(lat, lng);

        let mut response = self.db.query_with_params(
            r#"
                SELECT * FROM lost_cat
                WHERE status = 'missing'
                AND geo::distance((last_seen_lng, last_seen_lat), $origin) <= $radius_m
            "#,
            json!({ "origin": origin, "radius_m": radius_km * 1000.0 }),
        ).await?;
        let mut cats: Vec<LostCat> = response.take(0)?;

        // 近的排前面
        cats.sort_by(|a, b| {
            let da = haversine_km(lat, lng, a.last_seen_lat, a.last_seen_lng);
            let db = haversine_km(lat, lng, b.last_seen_lat, b.last_seen_lng);
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(cats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{
        FixedProximityIndex, MemoryNotificationStore, MemorySubscriberDirectory,
        ScriptedPushSender,
    };
    use crate::services::geo::AlertCandidate;
    use crate::models::subscriber::PushSubscription;

    fn candidate(user_id: &str) -> AlertCandidate {
        AlertCandidate {
            user_id: user_id.to_string(),
            push_endpoint: PushSubscription {
                endpoint: format!("https://push.example/{}", user_id),
                p256dh: "key".to_string(),
                auth: "auth".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_fan_out_alert_counts_deliveries() {
        let store = Arc::new(MemoryNotificationStore::new());
        let sender = Arc::new(ScriptedPushSender::failing_for(vec![
            "https://push.example/u2".to_string(),
        ]));
        let dispatcher = NotificationDispatcher::new(store.clone(), sender, 4);
        let index = Arc::new(FixedProximityIndex::new(vec![
            candidate("u1"),
            candidate("u2"),
            candidate("u3"),
        ]));
        let service = AlertService::new(
            Arc::new(Database::detached_for_tests()),
            index,
            dispatcher,
            Arc::new(MemorySubscriberDirectory::new()),
            "http://localhost:3001".to_string(),
        );

        let event = AlertEvent {
            subject_id: "cat-1".to_string(),
            origin: GeoPoint::new(3.1390, 101.6869),
            label: "Oyen".to_string(),
            excluded_subscriber: "reporter-1".to_string(),
            created_at: Utc::now(),
        };

        let outcome = service.fan_out_alert(&event).await;
        assert_eq!(outcome.attempted, 3);
        assert_eq!(outcome.delivered, 2);

        // 每个候选者都有应用内记录, 失败的那个也有
        let records = store.records().await;
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.title == "Lost Cat Alert: Oyen"));
    }

    #[tokio::test]
    async fn test_fan_out_alert_survives_index_failure() {
        let store = Arc::new(MemoryNotificationStore::new());
        let dispatcher =
            NotificationDispatcher::new(store.clone(), Arc::new(ScriptedPushSender::always_ok()), 4);
        let service = AlertService::new(
            Arc::new(Database::detached_for_tests()),
            Arc::new(FixedProximityIndex::failing()),
            dispatcher,
            Arc::new(MemorySubscriberDirectory::new()),
            "http://localhost:3001".to_string(),
        );

        let event = AlertEvent {
            subject_id: "cat-1".to_string(),
            origin: GeoPoint::new(3.1390, 101.6869),
            label: "Oyen".to_string(),
            excluded_subscriber: "reporter-1".to_string(),
            created_at: Utc::now(),
        };

        let outcome = service.fan_out_alert(&event).await;
        assert_eq!(outcome.attempted, 0);
        assert_eq!(outcome.delivered, 0);
        assert!(store.records().await.is_empty());
    }

    #[test]
    fn test_report_request_coordinate_validation() {
        // 越界坐标在进数据库之前就被拒绝
        assert!(validate_coordinates(91.0, 101.0).is_err());
        assert!(validate_coordinates(3.14, 181.0).is_err());
        assert!(validate_coordinates(f64::NAN, 101.0).is_err());
        assert!(validate_coordinates(3.1390, 101.6869).is_ok());
    }
}
