use crate::{
    error::Result,
    services::auth::User,
    state::AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, put},
    Extension, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/:id/read", put(mark_read))
        .route("/read-all", put(mark_all_read))
}

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

/// 应用内通知列表
/// GET /api/paws/notifications
pub async fn list_notifications(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<Value>> {
    let page = query.page.unwrap_or(1);
    let limit = query
        .limit
        .unwrap_or(app_state.config.default_page_size)
        .min(app_state.config.max_page_size);

    let (notifications, total, unread) = app_state
        .notification_service
        .list_notifications(&user.id, page, limit)
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": notifications,
        "pagination": {
            "page": page,
            "limit": limit,
            "total": total,
        },
        "unread_count": unread,
    })))
}

/// 标记单条已读
/// PUT /api/paws/notifications/:id/read
pub async fn mark_read(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    app_state.notification_service.mark_read(&user.id, &id).await?;

    Ok(Json(json!({ "success": true })))
}

/// 全部标记已读
/// PUT /api/paws/notifications/read-all
pub async fn mark_all_read(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>> {
    app_state.notification_service.mark_all_read(&user.id).await?;

    Ok(Json(json!({ "success": true })))
}
