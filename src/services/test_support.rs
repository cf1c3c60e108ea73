//! 单元测试用的内存替身 — 走 trait 接缝注入, 不碰数据库和推送服务

use crate::{
    error::{AppError, Result},
    models::boost::{Boost, BoostTargetType, PaymentState},
    models::notification::{CreateNotificationRequest, Notification},
    models::subscriber::{GeoPoint, PushSubscription},
    services::boost::BoostStore,
    services::dispatcher::NotificationStore,
    services::geo::{AlertCandidate, ProximityIndex},
    services::push::{PushMessage, PushSender},
    services::subscriber::SubscriberDirectory,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

/// 内存通知记录
pub struct MemoryNotificationStore {
    records: Mutex<Vec<Notification>>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    pub async fn records(&self) -> Vec<Notification> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn create_record(&self, request: CreateNotificationRequest) -> Result<Notification> {
        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            recipient_id: request.recipient_id,
            notification_type: request.notification_type,
            title: request.title,
            message: request.message,
            data: request.data,
            delivery: request.delivery,
            is_read: false,
            read_at: None,
            created_at: Utc::now(),
        };
        self.records.lock().await.push(notification.clone());
        Ok(notification)
    }
}

/// 写入永远失败的通知存储 (模拟落库故障)
pub struct FailingNotificationStore;

#[async_trait]
impl NotificationStore for FailingNotificationStore {
    async fn create_record(&self, _request: CreateNotificationRequest) -> Result<Notification> {
        Err(AppError::Internal("scripted store failure".to_string()))
    }
}

/// 按端点脚本化成败的推送替身
pub struct ScriptedPushSender {
    failing_endpoints: Vec<String>,
    fail_all: bool,
}

impl ScriptedPushSender {
    pub fn always_ok() -> Self {
        Self {
            failing_endpoints: Vec::new(),
            fail_all: false,
        }
    }

    pub fn failing_for(endpoints: Vec<String>) -> Self {
        Self {
            failing_endpoints: endpoints,
            fail_all: false,
        }
    }

    pub fn always_failing() -> Self {
        Self {
            failing_endpoints: Vec::new(),
            fail_all: true,
        }
    }
}

#[async_trait]
impl PushSender for ScriptedPushSender {
    async fn send(&self, subscription: &PushSubscription, _message: &PushMessage) -> Result<()> {
        if self.fail_all || self.failing_endpoints.contains(&subscription.endpoint) {
            return Err(AppError::ExternalService("scripted push failure".to_string()));
        }
        Ok(())
    }
}

/// 内存推广台账 — CAS 和条件标记语义与存储实现一致
pub struct MemoryBoostStore {
    boosts: Mutex<HashMap<String, Boost>>,
    /// (表名, 目标 id) -> (is_boosted, boost_expires_at)
    flags: Mutex<HashMap<(String, String), (bool, Option<DateTime<Utc>>)>>,
}

impl MemoryBoostStore {
    pub fn new() -> Self {
        Self {
            boosts: Mutex::new(HashMap::new()),
            flags: Mutex::new(HashMap::new()),
        }
    }

    pub async fn promoted_flag(&self, table: &str, target_id: &str) -> Option<(bool, Option<DateTime<Utc>>)> {
        self.flags
            .lock()
            .await
            .get(&(table.to_string(), target_id.to_string()))
            .copied()
    }
}

#[async_trait]
impl BoostStore for MemoryBoostStore {
    async fn create_boost(&self, boost: Boost) -> Result<Boost> {
        self.boosts.lock().await.insert(boost.id.clone(), boost.clone());
        Ok(boost)
    }

    async fn get_boost(&self, id: &str) -> Result<Option<Boost>> {
        Ok(self.boosts.lock().await.get(id).cloned())
    }

    async fn list_boosts_for(&self, user_id: &str) -> Result<Vec<Boost>> {
        let mut boosts: Vec<Boost> = self
            .boosts
            .lock()
            .await
            .values()
            .filter(|b| b.purchaser_id == user_id)
            .cloned()
            .collect();
        boosts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(boosts)
    }

    async fn activate_if_pending(
        &self,
        id: &str,
        reference: &str,
        starts_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Boost>> {
        let mut boosts = self.boosts.lock().await;
        match boosts.get_mut(id) {
            Some(boost) if boost.payment_state == PaymentState::Pending => {
                boost.payment_state = PaymentState::Paid;
                boost.payment_reference = Some(reference.to_string());
                boost.starts_at = Some(starts_at);
                boost.expires_at = Some(expires_at);
                Ok(Some(boost.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn fail_if_pending(&self, id: &str) -> Result<Option<Boost>> {
        let mut boosts = self.boosts.lock().await;
        match boosts.get_mut(id) {
            Some(boost) if boost.payment_state == PaymentState::Pending => {
                boost.payment_state = PaymentState::Failed;
                Ok(Some(boost.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn apply_promotion(
        &self,
        target_type: BoostTargetType,
        target_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let key = (target_type.table().to_string(), target_id.to_string());
        let mut flags = self.flags.lock().await;
        let entry = flags.entry(key).or_insert((false, None));
        // 只往更晚抬升
        if entry.1.map_or(true, |existing| existing < expires_at) {
            *entry = (true, Some(expires_at));
        }
        Ok(())
    }

    async fn clear_expired_promotions(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut cleared = 0;
        let mut flags = self.flags.lock().await;
        for (flag, expires_at) in flags.values_mut() {
            if *flag && expires_at.map_or(false, |e| e < now) {
                *flag = false;
                cleared += 1;
            }
        }
        Ok(cleared)
    }
}

/// 内存订阅者档案条目 (位置 + 自己配置的半径 + 可选端点)
pub struct IndexedSubscriber {
    pub user_id: String,
    pub location: Option<GeoPoint>,
    pub radius_km: f64,
    pub push_endpoint: Option<PushSubscription>,
}

/// 用 haversine 逐行套用每个订阅者自己半径的内存邻近索引
pub struct MemoryProximityIndex {
    subscribers: Vec<IndexedSubscriber>,
}

impl MemoryProximityIndex {
    pub fn new(subscribers: Vec<IndexedSubscriber>) -> Self {
        Self { subscribers }
    }
}

#[async_trait]
impl ProximityIndex for MemoryProximityIndex {
    async fn find_within_radius(
        &self,
        origin: &GeoPoint,
        excluding: &str,
    ) -> Result<Vec<AlertCandidate>> {
        Ok(self
            .subscribers
            .iter()
            .filter(|s| s.user_id != excluding)
            .filter_map(|s| {
                let location = s.location.as_ref()?;
                let endpoint = s.push_endpoint.as_ref()?;
                let distance = crate::utils::geo::haversine_km(
                    location.lat(),
                    location.lng(),
                    origin.lat(),
                    origin.lng(),
                );
                (distance <= s.radius_km).then(|| AlertCandidate {
                    user_id: s.user_id.clone(),
                    push_endpoint: endpoint.clone(),
                })
            })
            .collect())
    }
}

/// 固定候选列表的邻近索引
pub struct FixedProximityIndex {
    candidates: Vec<AlertCandidate>,
    fail: bool,
}

impl FixedProximityIndex {
    pub fn new(candidates: Vec<AlertCandidate>) -> Self {
        Self { candidates, fail: false }
    }

    pub fn failing() -> Self {
        Self {
            candidates: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl ProximityIndex for FixedProximityIndex {
    async fn find_within_radius(
        &self,
        _origin: &GeoPoint,
        excluding: &str,
    ) -> Result<Vec<AlertCandidate>> {
        if self.fail {
            return Err(AppError::internal("scripted index failure"));
        }
        Ok(self
            .candidates
            .iter()
            .filter(|c| c.user_id != excluding)
            .cloned()
            .collect())
    }
}

/// 内存订阅者通讯录
pub struct MemorySubscriberDirectory {
    endpoints: Mutex<HashMap<String, PushSubscription>>,
}

impl MemorySubscriberDirectory {
    pub fn new() -> Self {
        Self {
            endpoints: Mutex::new(HashMap::new()),
        }
    }

    pub async fn register(&self, user_id: &str, subscription: PushSubscription) {
        self.endpoints
            .lock()
            .await
            .insert(user_id.to_string(), subscription);
    }
}

#[async_trait]
impl SubscriberDirectory for MemorySubscriberDirectory {
    async fn push_endpoint(&self, user_id: &str) -> Result<Option<PushSubscription>> {
        Ok(self.endpoints.lock().await.get(user_id).cloned())
    }
}
