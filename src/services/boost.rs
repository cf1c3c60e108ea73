use crate::{
    error::{AppError, Result},
    models::boost::*,
    models::notification::NotificationType,
    services::push::PushMessage,
    services::subscriber::SubscriberDirectory,
    services::{Database, NotificationDispatcher},
    utils::cache::{FeedCache, FEED_NAMESPACE},
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 推广台账存储接口
///
/// 台账只追加; pending->paid 是对 payment_state 的比较交换,
/// 不是盲写 — 支付网关重试 webhook 时重复激活必须是无操作。
#[async_trait]
pub trait BoostStore: Send + Sync {
    async fn create_boost(&self, boost: Boost) -> Result<Boost>;
    async fn get_boost(&self, id: &str) -> Result<Option<Boost>>;
    async fn list_boosts_for(&self, user_id: &str) -> Result<Vec<Boost>>;
    /// CAS: 只在 pending 状态下激活, 否则返回 None
    async fn activate_if_pending(
        &self,
        id: &str,
        reference: &str,
        starts_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Boost>>;
    /// CAS: 只在 pending 状态下标记失败, 否则返回 None
    async fn fail_if_pending(&self, id: &str) -> Result<Option<Boost>>;
    /// 条件写冗余标记: 仅当新的 expires_at 晚于已存的才抬升
    /// (保证激活与清扫两个写者可交换)
    async fn apply_promotion(
        &self,
        target_type: BoostTargetType,
        target_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;
    /// 清除所有已过期的推广标记, 返回清除行数
    async fn clear_expired_promotions(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// SurrealDB 实现
#[derive(Clone)]
pub struct SurrealBoostStore {
    db: Arc<Database>,
}

impl SurrealBoostStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl BoostStore for SurrealBoostStore {
    async fn create_boost(&self, boost: Boost) -> Result<Boost> {
        let id = boost.id.clone();
        self.db.create_with_id("paid_boost", &id, boost).await
    }

    async fn get_boost(&self, id: &str) -> Result<Option<Boost>> {
        self.db.get_by_id("paid_boost", id).await
    }

    async fn list_boosts_for(&self, user_id: &str) -> Result<Vec<Boost>> {
        let mut response = self.db.query_with_params(
            r#"
                SELECT * FROM paid_boost
                WHERE purchaser_id = $user_id
                ORDER BY created_at DESC
            "#,
            json!({ "user_id": user_id }),
        ).await?;
        let boosts: Vec<Boost> = response.take(0)?;
        Ok(boosts)
    }

    async fn activate_if_pending(
        &self,
        id: &str,
        reference: &str,
        starts_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Boost>> {
        // WHERE 条件让重复的 webhook 变成空更新
        let mut response = self.db.query_with_params(
            r#"
                UPDATE type::thing('paid_boost', $id)
                SET payment_state = 'paid',
                    payment_reference = $reference,
                    starts_at = $starts_at,
                    expires_at = $expires_at
                WHERE payment_state = 'pending'
                RETURN AFTER
            "#,
            json!({
                "id": id,
                "reference": reference,
                "starts_at": starts_at,
                "expires_at": expires_at,
            }),
        ).await?;
        let updated: Vec<Boost> = response.take(0)?;
        Ok(updated.into_iter().next())
    }

    async fn fail_if_pending(&self, id: &str) -> Result<Option<Boost>> {
        let mut response = self.db.query_with_params(
            r#"
                UPDATE type::thing('paid_boost', $id)
                SET payment_state = 'failed'
                WHERE payment_state = 'pending'
                RETURN AFTER
            "#,
            json!({ "id": id }),
        ).await?;
        let updated: Vec<Boost> = response.take(0)?;
        Ok(updated.into_iter().next())
    }

    async fn apply_promotion(
        &self,
        target_type: BoostTargetType,
        target_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.db.query_with_params(
            r#"
                UPDATE type::thing($table, $target_id)
                SET is_boosted = true, boost_expires_at = $expires_at
                WHERE boost_expires_at = NONE OR boost_expires_at < $expires_at
            "#,
            json!({
                "table": target_type.table(),
                "target_id": target_id,
                "expires_at": expires_at,
            }),
        ).await?;
        Ok(())
    }

    async fn clear_expired_promotions(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut cleared: u64 = 0;

        // 冗余标记分散在各目标表上, 逐表做条件清除
        // boost_expires_at 保留作历史时间戳
        for table in ["post", "lost_cat", "memorial"] {
            let query = format!(
                r#"
                    UPDATE {}
                    SET is_boosted = false
                    WHERE is_boosted = true AND boost_expires_at != NONE AND boost_expires_at < $now
                    RETURN AFTER
                "#,
                table
            );
            let mut response = self.db.query_with_params(&query, json!({ "now": now })).await?;
            let rows: Vec<Value> = response.take(0)?;
            cleared += rows.len() as u64;
        }

        Ok(cleared)
    }
}

/// 推广服务 — 台账操作与激活/过期的副作用编排
#[derive(Clone)]
pub struct BoostService {
    store: Arc<dyn BoostStore>,
    cache: Arc<dyn FeedCache>,
    dispatcher: NotificationDispatcher,
    subscribers: Arc<dyn SubscriberDirectory>,
}

impl BoostService {
    pub fn new(
        store: Arc<dyn BoostStore>,
        cache: Arc<dyn FeedCache>,
        dispatcher: NotificationDispatcher,
        subscribers: Arc<dyn SubscriberDirectory>,
    ) -> Self {
        Self {
            store,
            cache,
            dispatcher,
            subscribers,
        }
    }

    /// 创建 pending 状态的推广
    /// amount = 每小时价格 * 小时数, 不做取整 (与定价表保持一致)
    pub async fn create_boost(&self, user_id: &str, request: CreateBoostRequest) -> Result<Boost> {
        let amount = request.target_type.price_per_hour() * request.duration_hours as f64;

        let boost = Boost {
            id: Uuid::new_v4().to_string(),
            purchaser_id: user_id.to_string(),
            target_type: request.target_type,
            target_id: request.target_id,
            amount,
            currency: "MYR".to_string(),
            duration_hours: request.duration_hours,
            payment_state: PaymentState::Pending,
            payment_reference: None,
            starts_at: None,
            expires_at: None,
            created_at: Utc::now(),
        };

        debug!(
            "Creating {} boost for {} ({}h, RM{})",
            boost.target_type, boost.target_id, boost.duration_hours, boost.amount
        );

        self.store.create_boost(boost).await
    }

    /// 支付确认 → 激活
    ///
    /// 只有购买者可以激活自己的 pending 推广。
    /// 窗口 [starts_at, expires_at) 恰好写入一次; 重复激活是无操作,
    /// 不会把窗口续期 (防止 webhook 重投多记时长)。
    pub async fn activate_boost(
        &self,
        user_id: &str,
        request: ActivateBoostRequest,
    ) -> Result<Boost> {
        let boost = self
            .store
            .get_boost(&request.boost_id)
            .await?
            .ok_or_else(|| AppError::not_found("Boost"))?;

        if boost.purchaser_id != user_id {
            return Err(AppError::forbidden("Not authorized"));
        }

        match boost.payment_state {
            PaymentState::Paid => {
                // 幂等无操作: 返回第一次激活写下的窗口
                debug!("Boost {} already paid, activation is a no-op", boost.id);
                return Ok(boost);
            }
            PaymentState::Failed => {
                return Err(AppError::bad_request("Boost is no longer pending payment"));
            }
            PaymentState::Pending => {}
        }

        let now = Utc::now();
        let expires_at = now + Duration::hours(boost.duration_hours);

        let activated = match self
            .store
            .activate_if_pending(&boost.id, &request.payment_reference, now, expires_at)
            .await?
        {
            Some(updated) => updated,
            None => {
                // CAS 输给了并发的重复激活; 重新读取并按无操作处理
                let current = self
                    .store
                    .get_boost(&boost.id)
                    .await?
                    .ok_or_else(|| AppError::not_found("Boost"))?;
                if current.payment_state == PaymentState::Paid {
                    debug!("Boost {} activated concurrently, no-op", boost.id);
                    return Ok(current);
                }
                return Err(AppError::internal("Boost activation lost an unexpected race"));
            }
        };

        info!(
            "Boost {} activated for {} {} until {}",
            activated.id, activated.target_type, activated.target_id, expires_at
        );

        // 副作用: 冗余标记 + feed 缓存失效 + 购买者通知 — 都不该让激活本身失败
        if let Err(e) = self
            .store
            .apply_promotion(activated.target_type, &activated.target_id, expires_at)
            .await
        {
            warn!("Failed to apply promotion flag for boost {}: {}", activated.id, e);
        }

        self.cache.invalidate(FEED_NAMESPACE).await;

        self.send_activation_notice(&activated).await;

        Ok(activated)
    }

    /// 支付失败/会话过期 → failed; 无标记与缓存副作用
    pub async fn fail_boost(&self, user_id: &str, boost_id: &str) -> Result<Boost> {
        let boost = self
            .store
            .get_boost(boost_id)
            .await?
            .ok_or_else(|| AppError::not_found("Boost"))?;

        if boost.purchaser_id != user_id {
            return Err(AppError::forbidden("Not authorized"));
        }

        match boost.payment_state {
            PaymentState::Failed => Ok(boost),
            PaymentState::Paid => Err(AppError::bad_request("Boost is already paid")),
            PaymentState::Pending => {
                match self.store.fail_if_pending(boost_id).await? {
                    Some(updated) => Ok(updated),
                    // 并发激活抢先了 — 按已支付冲突处理
                    None => Err(AppError::conflict("Boost state changed concurrently")),
                }
            }
        }
    }

    pub async fn list_boosts_for(&self, user_id: &str) -> Result<Vec<Boost>> {
        self.store.list_boosts_for(user_id).await
    }

    async fn send_activation_notice(&self, boost: &Boost) {
        let endpoint = match self.subscribers.push_endpoint(&boost.purchaser_id).await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!("Failed to load push endpoint for {}: {}", boost.purchaser_id, e);
                None
            }
        };

        let message = PushMessage {
            title: "Boost activated!".to_string(),
            body: format!(
                "Your {} boost is now active for {} hours.",
                boost.target_type, boost.duration_hours
            ),
            url: None,
            notification_type: "boost_activated".to_string(),
            tag: Some(format!("boost-{}", boost.id)),
        };

        if let Err(e) = self
            .dispatcher
            .notify_user(
                &boost.purchaser_id,
                endpoint.as_ref(),
                NotificationType::BoostActivated,
                &message,
                json!({
                    "boost_id": boost.id,
                    "target_type": boost.target_type,
                    "target_id": boost.target_id,
                    "expires_at": boost.expires_at,
                }),
            )
            .await
        {
            warn!("Failed to create activation notice for boost {}: {}", boost.id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{
        MemoryBoostStore, MemoryNotificationStore, MemorySubscriberDirectory, ScriptedPushSender,
    };
    use crate::utils::cache::MemoryFeedCache;
    use std::time::Duration as StdDuration;

    fn service_with(store: Arc<MemoryBoostStore>, cache: Arc<MemoryFeedCache>) -> BoostService {
        let notifications = Arc::new(MemoryNotificationStore::new());
        let dispatcher = NotificationDispatcher::new(
            notifications,
            Arc::new(ScriptedPushSender::always_ok()),
            4,
        );
        BoostService::new(store, cache, dispatcher, Arc::new(MemorySubscriberDirectory::new()))
    }

    fn create_request(hours: i64) -> CreateBoostRequest {
        CreateBoostRequest {
            target_type: BoostTargetType::Post,
            target_id: "post-1".to_string(),
            duration_hours: hours,
        }
    }

    #[tokio::test]
    async fn test_create_boost_pricing() {
        let store = Arc::new(MemoryBoostStore::new());
        let service = service_with(store, Arc::new(MemoryFeedCache::new()));

        // post -> 2.0/hr, 2 小时 = 4.0
        let boost = service.create_boost("u1", create_request(2)).await.unwrap();
        assert_eq!(boost.amount, 4.0);
        assert_eq!(boost.currency, "MYR");
        assert_eq!(boost.payment_state, PaymentState::Pending);
        assert!(boost.starts_at.is_none());
        assert!(boost.expires_at.is_none());

        let lost_cat = service
            .create_boost("u1", CreateBoostRequest {
                target_type: BoostTargetType::LostCat,
                target_id: "cat-1".to_string(),
                duration_hours: 4,
            })
            .await
            .unwrap();
        assert_eq!(lost_cat.amount, 6.0);
    }

    #[tokio::test]
    async fn test_activation_sets_window_once() {
        let store = Arc::new(MemoryBoostStore::new());
        let service = service_with(store.clone(), Arc::new(MemoryFeedCache::new()));

        let boost = service.create_boost("u1", create_request(2)).await.unwrap();

        let activated = service
            .activate_boost("u1", ActivateBoostRequest {
                boost_id: boost.id.clone(),
                payment_reference: "ref1".to_string(),
            })
            .await
            .unwrap();

        let starts = activated.starts_at.unwrap();
        let expires = activated.expires_at.unwrap();
        assert_eq!(expires - starts, Duration::hours(2));
        assert_eq!(activated.payment_state, PaymentState::Paid);

        // 目标的冗余标记被抬起
        let (is_boosted, flag_expiry) = store.promoted_flag("post", "post-1").await.unwrap();
        assert!(is_boosted);
        assert_eq!(flag_expiry, Some(expires));

        // 不同的 reference 重复激活: 窗口不变
        let again = service
            .activate_boost("u1", ActivateBoostRequest {
                boost_id: boost.id.clone(),
                payment_reference: "ref2".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(again.starts_at, Some(starts));
        assert_eq!(again.expires_at, Some(expires));
        assert_eq!(again.payment_reference, Some("ref1".to_string()));
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_activation() {
        let store = Arc::new(MemoryBoostStore::new());
        let service = service_with(store.clone(), Arc::new(MemoryFeedCache::new()));

        let boost = service.create_boost("u1", create_request(3)).await.unwrap();

        let a = service.activate_boost("u1", ActivateBoostRequest {
            boost_id: boost.id.clone(),
            payment_reference: "ref-a".to_string(),
        });
        let b = service.activate_boost("u1", ActivateBoostRequest {
            boost_id: boost.id.clone(),
            payment_reference: "ref-b".to_string(),
        });

        let (ra, rb) = tokio::join!(a, b);
        let (ra, rb) = (ra.unwrap(), rb.unwrap());

        // 两个调用都成功, 但只有一个窗口
        assert_eq!(ra.starts_at, rb.starts_at);
        assert_eq!(ra.expires_at, rb.expires_at);

        let stored = store.get_boost(&boost.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_state, PaymentState::Paid);
        assert!(stored.expires_at.is_some());
    }

    #[tokio::test]
    async fn test_activation_requires_purchaser() {
        let store = Arc::new(MemoryBoostStore::new());
        let service = service_with(store, Arc::new(MemoryFeedCache::new()));

        let boost = service.create_boost("u1", create_request(1)).await.unwrap();

        let err = service
            .activate_boost("u2", ActivateBoostRequest {
                boost_id: boost.id.clone(),
                payment_reference: "ref1".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Authorization(_)));
    }

    #[tokio::test]
    async fn test_activation_invalidates_feed_cache() {
        let store = Arc::new(MemoryBoostStore::new());
        let cache = Arc::new(MemoryFeedCache::new());
        let service = service_with(store, cache.clone());

        cache
            .set("feed:anon:1", "cached-page".to_string(), StdDuration::from_secs(60))
            .await;

        let boost = service.create_boost("u1", create_request(1)).await.unwrap();
        service
            .activate_boost("u1", ActivateBoostRequest {
                boost_id: boost.id,
                payment_reference: "ref1".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(cache.get("feed:anon:1").await, None);
    }

    #[tokio::test]
    async fn test_fail_boost_transitions() {
        let store = Arc::new(MemoryBoostStore::new());
        let service = service_with(store, Arc::new(MemoryFeedCache::new()));

        let boost = service.create_boost("u1", create_request(1)).await.unwrap();

        let failed = service.fail_boost("u1", &boost.id).await.unwrap();
        assert_eq!(failed.payment_state, PaymentState::Failed);

        // failed 不是可激活状态
        let err = service
            .activate_boost("u1", ActivateBoostRequest {
                boost_id: boost.id.clone(),
                payment_reference: "ref1".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        // 重复 fail 是无操作
        let again = service.fail_boost("u1", &boost.id).await.unwrap();
        assert_eq!(again.payment_state, PaymentState::Failed);
    }
}
