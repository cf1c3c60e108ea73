use crate::{
    error::Result,
    models::subscriber::{
        UpdateAlertRadiusRequest, UpdateLocationRequest, UpdatePushSubscriptionRequest,
    },
    services::auth::User,
    state::AppState,
};
use axum::{
    extract::State,
    response::Json,
    routing::{get, put},
    Extension, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/me", get(get_me))
        .route("/me/location", put(update_location))
        .route("/me/alert-radius", put(update_alert_radius))
        .route(
            "/me/push-subscription",
            put(set_push_subscription).delete(clear_push_subscription),
        )
}

/// 当前用户 + 订阅者档案
/// GET /api/paws/users/me
pub async fn get_me(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>> {
    let profile = app_state.subscriber_service.get_profile(&user.id).await?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "user": user,
            "profile": profile,
        }
    })))
}

/// 更新家位置
/// PUT /api/paws/users/me/location
pub async fn update_location(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateLocationRequest>,
) -> Result<Json<Value>> {
    let profile = app_state
        .subscriber_service
        .update_location(&user.id, request)
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": profile,
    })))
}

/// 更新告警半径
/// PUT /api/paws/users/me/alert-radius
pub async fn update_alert_radius(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateAlertRadiusRequest>,
) -> Result<Json<Value>> {
    let profile = app_state
        .subscriber_service
        .update_alert_radius(&user.id, request)
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": profile,
    })))
}

/// 注册浏览器推送订阅
/// PUT /api/paws/users/me/push-subscription
pub async fn set_push_subscription(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdatePushSubscriptionRequest>,
) -> Result<Json<Value>> {
    let profile = app_state
        .subscriber_service
        .set_push_subscription(&user.id, request)
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": profile,
    })))
}

/// 退订推送
/// DELETE /api/paws/users/me/push-subscription
pub async fn clear_push_subscription(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>> {
    let profile = app_state
        .subscriber_service
        .clear_push_subscription(&user.id)
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": profile,
    })))
}
