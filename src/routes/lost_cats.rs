use crate::{
    error::Result,
    models::alert::{ReportLostCatRequest, ReportSightingRequest},
    services::auth::User,
    state::AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Extension, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        // 公开路由（不需要认证）
        .route("/", get(list_lost_cats).post(report_lost_cat))
        .route("/nearby", get(nearby_lost_cats))
        .route("/:id", get(get_lost_cat))
        .route("/:id/sightings", post(report_sighting))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct NearbyQuery {
    pub lat: f64,
    pub lng: f64,
    pub radius_km: Option<f64>,
}

/// 获取走失报告列表
/// GET /api/paws/lost-cats
pub async fn list_lost_cats(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>> {
    let page = query.page.unwrap_or(1);
    let limit = query
        .limit
        .unwrap_or(app_state.config.default_page_size)
        .min(app_state.config.max_page_size);

    let cats = app_state.alert_service.list_lost_cats(page, limit).await?;

    Ok(Json(json!({
        "success": true,
        "data": cats,
    })))
}

/// 报告走失的猫并向附近订阅者扇出告警
/// POST /api/paws/lost-cats
pub async fn report_lost_cat(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(request): Json<ReportLostCatRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    debug!("User {} reporting lost cat", user.id);

    let outcome = app_state
        .alert_service
        .report_lost_cat(&user.id, request)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "data": {
                "lost_cat": outcome.lost_cat,
                "notifications_sent": outcome.notifications_sent,
            }
        })),
    ))
}

/// 某个坐标附近仍未找到的报告
/// GET /api/paws/lost-cats/nearby?lat=..&lng=..&radius_km=..
pub async fn nearby_lost_cats(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<NearbyQuery>,
) -> Result<Json<Value>> {
    let radius_km = query
        .radius_km
        .unwrap_or(app_state.config.default_alert_radius_km);

    let cats = app_state
        .alert_service
        .nearby_reports(query.lat, query.lng, radius_km)
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": cats,
    })))
}

/// 单个走失报告
/// GET /api/paws/lost-cats/:id
pub async fn get_lost_cat(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let cat = app_state.alert_service.get_lost_cat(&id).await?;

    Ok(Json(json!({
        "success": true,
        "data": cat,
    })))
}

/// 目击上报, 通知原报告人
/// POST /api/paws/lost-cats/:id/sightings
pub async fn report_sighting(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    Json(request): Json<ReportSightingRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let sighting = app_state
        .alert_service
        .report_sighting(&user.id, &id, request)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "data": sighting,
        })),
    ))
}
