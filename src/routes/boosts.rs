use crate::{
    error::Result,
    models::boost::{ActivateBoostRequest, CreateBoostRequest},
    services::auth::User,
    state::AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Extension, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;
use validator::Validate;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_boost))
        .route("/activate", post(activate_boost))
        .route("/:id/fail", post(fail_boost))
        .route("/me", get(my_boosts))
}

/// 创建待支付的推广
/// POST /api/paws/boosts
pub async fn create_boost(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateBoostRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    request.validate()?;
    debug!("User {} creating boost for {:?}", user.id, request.target_type);

    let boost = app_state.boost_service.create_boost(&user.id, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "data": boost,
        })),
    ))
}

/// 支付确认回调, 幂等
/// POST /api/paws/boosts/activate
pub async fn activate_boost(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(request): Json<ActivateBoostRequest>,
) -> Result<Json<Value>> {
    let boost = app_state.boost_service.activate_boost(&user.id, request).await?;

    Ok(Json(json!({
        "success": true,
        "data": boost,
    })))
}

/// 支付失败/放弃
/// POST /api/paws/boosts/:id/fail
pub async fn fail_boost(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let boost = app_state.boost_service.fail_boost(&user.id, &id).await?;

    Ok(Json(json!({
        "success": true,
        "data": boost,
    })))
}

/// 我购买过的推广
/// GET /api/paws/boosts/me
pub async fn my_boosts(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>> {
    let boosts = app_state.boost_service.list_boosts_for(&user.id).await?;

    Ok(Json(json!({
        "success": true,
        "data": boosts,
    })))
}
