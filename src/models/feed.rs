use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// 帖子行 (post 表) — 只保留 feed 读取需要的字段
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub author_id: String,
    pub caption: Option<String>,
    pub media_urls: Vec<String>,
    pub hashtags: Vec<String>,
    pub is_boosted: bool,
    pub boost_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePostRequest {
    #[validate(length(max = 2000, message = "Caption too long"))]
    pub caption: Option<String>,
    pub media_urls: Vec<String>,
    pub hashtags: Option<Vec<String>>,
}

/// 一页缓存好的 feed 载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedPage {
    pub data: Vec<Post>,
    pub page: usize,
    pub limit: usize,
    pub total: usize,
}
