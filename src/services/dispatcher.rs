use crate::{
    error::Result,
    models::alert::AlertEvent,
    models::notification::{CreateNotificationRequest, DeliveryOutcome, Notification, NotificationType},
    models::subscriber::PushSubscription,
    services::geo::AlertCandidate,
    services::push::{PushMessage, PushSender},
};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 通知记录存储接口
/// 生产实现是 NotificationService; 测试注入内存实现
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create_record(&self, request: CreateNotificationRequest) -> Result<Notification>;
}

#[async_trait]
impl NotificationStore for crate::services::NotificationService {
    async fn create_record(&self, request: CreateNotificationRequest) -> Result<Notification> {
        self.create_notification(request).await
    }
}

/// 一次扇出的结果
/// delivered 只是尽力而为的指标 — 推送协议不确认接收
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FanoutOutcome {
    pub attempted: usize,
    pub delivered: usize,
}

/// 通知分发器
///
/// 扇出语义:
/// - 每个候选者的发送相互独立, 单个失败不中止也不拖慢其余投递
/// - 无论推送结果如何, 每个候选者恰好落一条应用内通知记录,
///   且在 fanout 返回前全部落库
/// - 候选者级别的失败只记日志, 不向调用方传播
#[derive(Clone)]
pub struct NotificationDispatcher {
    store: Arc<dyn NotificationStore>,
    sender: Arc<dyn PushSender>,
    concurrency: usize,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn NotificationStore>, sender: Arc<dyn PushSender>, concurrency: usize) -> Self {
        Self {
            store,
            sender,
            concurrency: concurrency.max(1),
        }
    }

    /// 把同一条告警扇出给一组候选订阅者
    pub async fn fanout(
        &self,
        event: &AlertEvent,
        candidates: Vec<AlertCandidate>,
        notification_type: NotificationType,
        message: &PushMessage,
    ) -> FanoutOutcome {
        let attempted = candidates.len();
        if attempted == 0 {
            debug!("No candidates for alert {}", event.subject_id);
            return FanoutOutcome { attempted: 0, delivered: 0 };
        }

        info!(
            "Fanning out alert {} to {} subscribers",
            event.subject_id, attempted
        );

        // 并发发送, 上限避免压垮推送服务
        let delivered = stream::iter(candidates)
            .map(|candidate| {
                let notification_type = notification_type.clone();
                async move {
                    self.dispatch_one(event, &candidate, notification_type, message)
                        .await
                }
            })
            .buffer_unordered(self.concurrency)
            .filter(|delivered| futures::future::ready(*delivered))
            .count()
            .await;

        FanoutOutcome { attempted, delivered }
    }

    /// 单个候选者: 先推送, 再落耐久记录 (带投递结果)
    async fn dispatch_one(
        &self,
        event: &AlertEvent,
        candidate: &AlertCandidate,
        notification_type: NotificationType,
        message: &PushMessage,
    ) -> bool {
        let outcome = match self.sender.send(&candidate.push_endpoint, message).await {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(e) => {
                warn!(
                    "Push send failed for subscriber {} on alert {}: {}",
                    candidate.user_id, event.subject_id, e
                );
                DeliveryOutcome::Failed
            }
        };

        // 推送成败都要留应用内记录
        let record = CreateNotificationRequest {
            recipient_id: candidate.user_id.clone(),
            notification_type,
            title: message.title.clone(),
            message: message.body.clone(),
            data: json!({
                "subject_id": event.subject_id,
                "url": message.url,
            }),
            delivery: outcome,
        };

        // delivered 只统计记录已落库的接收者;
        // 推送成功但记录写失败的候选者不计入, 计数反映已提交状态
        if let Err(e) = self.store.create_record(record).await {
            warn!(
                "Failed to persist notification record for subscriber {}: {}",
                candidate.user_id, e
            );
            return false;
        }

        outcome == DeliveryOutcome::Delivered
    }

    /// 1:1 通知 (点赞/评论/关注/悼念/推广激活等), 调用方已经知道接收者
    pub async fn notify_user(
        &self,
        recipient_id: &str,
        endpoint: Option<&PushSubscription>,
        notification_type: NotificationType,
        message: &PushMessage,
        data: serde_json::Value,
    ) -> Result<Notification> {
        let outcome = match endpoint {
            Some(subscription) => match self.sender.send(subscription, message).await {
                Ok(()) => DeliveryOutcome::Delivered,
                Err(e) => {
                    warn!("Push send failed for user {}: {}", recipient_id, e);
                    DeliveryOutcome::Failed
                }
            },
            None => DeliveryOutcome::Attempted,
        };

        self.store
            .create_record(CreateNotificationRequest {
                recipient_id: recipient_id.to_string(),
                notification_type,
                title: message.title.clone(),
                message: message.body.clone(),
                data,
                delivery: outcome,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::subscriber::GeoPoint;
    use crate::services::test_support::{
        FailingNotificationStore, MemoryNotificationStore, ScriptedPushSender,
    };
    use chrono::Utc;

    fn test_event() -> AlertEvent {
        AlertEvent {
            subject_id: "cat-1".to_string(),
            origin: GeoPoint::new(3.1450, 101.6700),
            label: "Oyen".to_string(),
            excluded_subscriber: "reporter-1".to_string(),
            created_at: Utc::now(),
        }
    }

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

    fn test_message() -> PushMessage {
        PushMessage {
            title: "Lost Cat Alert: Oyen".to_string(),
            body: "A cat named Oyen was reported missing near your area.".to_string(),
            url: Some("/lost-cats/cat-1".to_string()),
            notification_type: "lost_cat_nearby".to_string(),
            tag: Some("lost-cat-cat-1".to_string()),
        }
    }

    #[tokio::test]
    async fn test_fanout_creates_record_per_candidate() {
        let store = Arc::new(MemoryNotificationStore::new());
        let sender = Arc::new(ScriptedPushSender::always_ok());
        let dispatcher = NotificationDispatcher::new(store.clone(), sender, 8);

        let candidates = vec![candidate("u1"), candidate("u2"), candidate("u3")];
        let outcome = dispatcher
            .fanout(&test_event(), candidates, NotificationType::LostCatNearby, &test_message())
            .await;

        assert_eq!(outcome.attempted, 3);
        assert_eq!(outcome.delivered, 3);
        assert_eq!(store.records().await.len(), 3);
    }

    #[tokio::test]
    async fn test_failed_sends_still_create_records() {
        let store = Arc::new(MemoryNotificationStore::new());
        // u2 的端点发送失败
        let sender = Arc::new(ScriptedPushSender::failing_for(vec![
            "https://push.example/u2".to_string(),
        ]));
        let dispatcher = NotificationDispatcher::new(store.clone(), sender, 8);

        let candidates = vec![candidate("u1"), candidate("u2"), candidate("u3")];
        let outcome = dispatcher
            .fanout(&test_event(), candidates, NotificationType::LostCatNearby, &test_message())
            .await;

        assert_eq!(outcome.attempted, 3);
        assert_eq!(outcome.delivered, 2);

        // 投递失败不影响记录创建
        let records = store.records().await;
        assert_eq!(records.len(), 3);
        let failed: Vec<_> = records
            .iter()
            .filter(|r| r.delivery == DeliveryOutcome::Failed)
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].recipient_id, "u2");
    }

    #[tokio::test]
    async fn test_total_push_outage_never_errors() {
        let store = Arc::new(MemoryNotificationStore::new());
        let sender = Arc::new(ScriptedPushSender::always_failing());
        let dispatcher = NotificationDispatcher::new(store.clone(), sender, 8);

        let candidates = vec![candidate("u1"), candidate("u2")];
        let outcome = dispatcher
            .fanout(&test_event(), candidates, NotificationType::LostCatNearby, &test_message())
            .await;

        assert_eq!(outcome.attempted, 2);
        assert_eq!(outcome.delivered, 0);
        assert_eq!(store.records().await.len(), 2);
    }

    #[tokio::test]
    async fn test_record_failure_excluded_from_delivered_count() {
        // 推送全部成功, 但记录落库全部失败:
        // delivered 必须是 0, 计数只反映已提交的记录
        let store = Arc::new(FailingNotificationStore);
        let sender = Arc::new(ScriptedPushSender::always_ok());
        let dispatcher = NotificationDispatcher::new(store, sender, 8);

        let candidates = vec![candidate("u1"), candidate("u2")];
        let outcome = dispatcher
            .fanout(&test_event(), candidates, NotificationType::LostCatNearby, &test_message())
            .await;

        assert_eq!(outcome.attempted, 2);
        assert_eq!(outcome.delivered, 0);
    }

    #[tokio::test]
    async fn test_fanout_empty_candidates() {
        let store = Arc::new(MemoryNotificationStore::new());
        let sender = Arc::new(ScriptedPushSender::always_ok());
        let dispatcher = NotificationDispatcher::new(store.clone(), sender, 8);

        let outcome = dispatcher
            .fanout(&test_event(), vec![], NotificationType::LostCatNearby, &test_message())
            .await;

        assert_eq!(outcome.attempted, 0);
        assert_eq!(outcome.delivered, 0);
        assert!(store.records().await.is_empty());
    }

    #[tokio::test]
    async fn test_notify_user_without_endpoint() {
        let store = Arc::new(MemoryNotificationStore::new());
        let sender = Arc::new(ScriptedPushSender::always_ok());
        let dispatcher = NotificationDispatcher::new(store.clone(), sender, 8);

        let notification = dispatcher
            .notify_user(
                "u1",
                None,
                NotificationType::BoostActivated,
                &test_message(),
                json!({}),
            )
            .await
            .unwrap();

        // 没有端点也要留应用内记录
        assert_eq!(notification.delivery, DeliveryOutcome::Attempted);
        assert_eq!(store.records().await.len(), 1);
    }
}
