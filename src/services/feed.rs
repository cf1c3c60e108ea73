use crate::{
    config::Config,
    error::Result,
    models::feed::*,
    services::Database,
    utils::cache::{feed_key, FeedCache, FEED_NAMESPACE},
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;
use validator::Validate;

/// 社区 feed 服务 — 被提升内容优先 + 短 TTL 页缓存
#[derive(Clone)]
pub struct FeedService {
    db: Arc<Database>,
    cache: Arc<dyn FeedCache>,
    config: Arc<Config>,
}

impl FeedService {
    pub fn new(db: Arc<Database>, cache: Arc<dyn FeedCache>, config: Arc<Config>) -> Self {
        Self { db, cache, config }
    }

    /// 读一页 feed
    ///
    /// 缓存键按观看者区分 (登录用户各自一份, 匿名共享一份)。
    /// 缓存损坏时按 miss 处理, 绝不让坏载荷打断请求。
    pub async fn get_feed(&self, viewer: Option<&str>, page: usize, limit: usize) -> Result<FeedPage> {
        let page = page.max(1);
        let limit = limit.clamp(1, self.config.max_page_size);
        let key = feed_key(viewer, page);

        if let Some(cached) = self.cache.get(&key).await {
            match serde_json::from_str::<FeedPage>(&cached) {
                Ok(feed_page) if feed_page.limit == limit => {
                    debug!("Feed cache hit: {}", key);
                    return Ok(feed_page);
                }
                Ok(_) => debug!("Feed cache limit mismatch for {}, refetching", key),
                Err(e) => warn!("Discarding corrupt feed cache entry {}: {}", key, e),
            }
        }

        let offset = (page - 1) * limit;
        let mut response = self.db.query_with_params(
            r#"
                SELECT * FROM post
                ORDER BY is_boosted DESC, created_at DESC
                LIMIT $limit START $offset;
                SELECT count() AS count FROM post GROUP ALL;
            "#,
            json!({ "limit": limit, "offset": offset }),
        ).await?;

        let posts: Vec<Post> = response.take(0)?;
        let count: Option<serde_json::Value> = response.take(1)?;
        let total = count
            .and_then(|v| v.get("count").and_then(|c| c.as_u64()))
            .unwrap_or(0) as usize;

        let feed_page = FeedPage {
            data: posts,
            page,
            limit,
            total,
        };

        match serde_json::to_string(&feed_page) {
            Ok(payload) => {
                self.cache
                    .set(&key, payload, Duration::from_secs(self.config.feed_cache_ttl))
                    .await;
            }
            Err(e) => warn!("Failed to serialize feed page for cache: {}", e),
        }

        Ok(feed_page)
    }

    /// 发帖; 新内容让整个 feed 命名空间失效
    pub async fn create_post(&self, author_id: &str, request: CreatePostRequest) -> Result<Post> {
        request.validate()?;

        let post = Post {
            id: Uuid::new_v4().to_string(),
            author_id: author_id.to_string(),
            caption: request.caption,
            media_urls: request.media_urls,
            hashtags: request.hashtags.unwrap_or_default(),
            is_boosted: false,
            boost_expires_at: None,
            created_at: Utc::now(),
        };

        let id = post.id.clone();
        let created = self.db.create_with_id("post", &id, post).await?;

        self.cache.invalidate(FEED_NAMESPACE).await;

        Ok(created)
    }
}
