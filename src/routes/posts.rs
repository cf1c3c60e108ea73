use crate::{
    error::Result,
    models::feed::CreatePostRequest,
    services::auth::User,
    state::AppState,
    utils::middleware::OptionalAuth,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Extension, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(get_feed).post(create_post))
}

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

/// 社区 feed, 被提升的内容排前面
/// GET /api/paws/posts
pub async fn get_feed(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<FeedQuery>,
    OptionalAuth(user): OptionalAuth,
) -> Result<Json<Value>> {
    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(app_state.config.default_page_size);
    let viewer = user.as_ref().map(|u| u.id.as_str());

    debug!("Fetching feed page {} for {:?}", page, viewer);

    let feed_page = app_state.feed_service.get_feed(viewer, page, limit).await?;

    Ok(Json(json!({
        "success": true,
        "data": feed_page.data,
        "pagination": {
            "page": feed_page.page,
            "limit": feed_page.limit,
            "total": feed_page.total,
        }
    })))
}

/// 发帖
/// POST /api/paws/posts
pub async fn create_post(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let post = app_state.feed_service.create_post(&user.id, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "data": post,
        })),
    ))
}
