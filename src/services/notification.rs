use crate::{
    error::{AppError, Result},
    models::notification::*,
    services::Database,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// 通知服务 — 应用内通知记录的耐久存储与读取
#[derive(Clone)]
pub struct NotificationService {
    db: Arc<Database>,
}

impl NotificationService {
    pub async fn new(db: Arc<Database>) -> Result<Self> {
        Ok(Self { db })
    }

    /// 创建一条通知记录
    /// 扇出路径依赖这里的写入在响应前落库
    pub async fn create_notification(&self, request: CreateNotificationRequest) -> Result<Notification> {
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

        let id = notification.id.clone();
        self.db.create_with_id("notification", &id, notification).await
    }

    /// 分页读取用户的通知列表
    pub async fn list_notifications(
        &self,
        user_id: &str,
        page: usize,
        limit: usize,
    ) -> Result<(Vec<Notification>, i64, i64)> {
        debug!("Listing notifications for user: {}", user_id);

        let offset = (page.max(1) - 1) * limit;

        let mut response = self.db.query_with_params(
            r#"
                SELECT * FROM notification
                WHERE recipient_id = $user_id
                ORDER BY created_at DESC
                LIMIT $limit
                START $offset
            "#,
            json!({
                "user_id": user_id,
                "limit": limit,
                "offset": offset,
            })
        ).await?;
        let notifications: Vec<Notification> = response.take(0)?;

        let total = self.count_notifications(user_id, None).await?;
        let unread = self.count_notifications(user_id, Some(false)).await?;

        Ok((notifications, total, unread))
    }

    async fn count_notifications(&self, user_id: &str, is_read: Option<bool>) -> Result<i64> {
        let query = match is_read {
            Some(_) => r#"
                SELECT count() AS count FROM notification
                WHERE recipient_id = $user_id AND is_read = $is_read
                GROUP ALL
            "#,
            None => r#"
                SELECT count() AS count FROM notification
                WHERE recipient_id = $user_id
                GROUP ALL
            "#,
        };

        let mut response = self.db.query_with_params(query, json!({
            "user_id": user_id,
            "is_read": is_read,
        })).await?;
        let counts: Vec<Value> = response.take(0)?;

        Ok(counts
            .first()
            .and_then(|v| v.get("count"))
            .and_then(|v| v.as_i64())
            .unwrap_or(0))
    }

    /// 标记单条已读 — 只有接收者本人可以
    pub async fn mark_read(&self, user_id: &str, notification_id: &str) -> Result<()> {
        let existing: Option<Notification> = self.db.get_by_id("notification", notification_id).await?;
        let notification = existing.ok_or_else(|| AppError::not_found("Notification"))?;

        if notification.recipient_id != user_id {
            return Err(AppError::forbidden("Not your notification"));
        }

        self.db.query_with_params(
            r#"
                UPDATE type::thing('notification', $id)
                SET is_read = true, read_at = $now
            "#,
            json!({
                "id": notification_id,
                "now": Utc::now(),
            })
        ).await?;

        Ok(())
    }

    /// 全部标记已读
    pub async fn mark_all_read(&self, user_id: &str) -> Result<()> {
        self.db.query_with_params(
            r#"
                UPDATE notification
                SET is_read = true, read_at = $now
                WHERE recipient_id = $user_id AND is_read = false
            "#,
            json!({
                "user_id": user_id,
                "now": Utc::now(),
            })
        ).await?;

        Ok(())
    }
}
