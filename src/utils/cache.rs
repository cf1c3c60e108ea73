use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Feed 读缓存接口
///
/// 结构上不可能向外抛错: 后端不可用一律退化为 miss,
/// feed 读取永远不因缓存失败而失败 (只是变慢)。
/// 启动时根据配置选择实现, 调用点不做任何 null 判断。
#[async_trait]
pub trait FeedCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: String, ttl: Duration);
    /// 按前缀使整个命名空间失效 (如 "feed:")
    async fn invalidate(&self, prefix: &str);
}

/// 缓存项
#[derive(Debug, Clone)]
struct CacheItem {
    value: String,
    expires_at: Instant,
}

/// 进程内 TTL 缓存
#[derive(Clone)]
pub struct MemoryFeedCache {
    data: Arc<RwLock<HashMap<String, CacheItem>>>,
}

impl MemoryFeedCache {
    pub fn new() -> Self {
        let cache = Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        };

        // 启动后台清理任务
        let data_ref = cache.data.clone();
        tokio::spawn(async move {
            loop {
                sleep(Duration::from_secs(60)).await;
                let now = Instant::now();
                data_ref.write().retain(|_, item| item.expires_at > now);
            }
        });

        cache
    }
}

impl Default for MemoryFeedCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedCache for MemoryFeedCache {
    async fn get(&self, key: &str) -> Option<String> {
        let data = self.data.read();
        match data.get(key) {
            Some(item) if item.expires_at > Instant::now() => Some(item.value.clone()),
            _ => None,
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) {
        let item = CacheItem {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.data.write().insert(key.to_string(), item);
    }

    async fn invalidate(&self, prefix: &str) {
        let mut data = self.data.write();
        let before = data.len();
        data.retain(|key, _| !key.starts_with(prefix));
        debug!("Invalidated {} cache entries under '{}'", before - data.len(), prefix);
    }
}

/// 空缓存 — Redis 未配置时的实现, 永远 miss
pub struct NullFeedCache;

#[async_trait]
impl FeedCache for NullFeedCache {
    async fn get(&self, _key: &str) -> Option<String> {
        None
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) {}

    async fn invalidate(&self, _prefix: &str) {}
}

/// Redis 缓存实现 (redis-cache feature)
/// 所有 Redis 错误降级为 miss/skip 并记录日志
#[cfg(feature = "redis-cache")]
pub struct RedisFeedCache {
    conn: redis::aio::ConnectionManager,
}

#[cfg(feature = "redis-cache")]
impl RedisFeedCache {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        info!("Redis feed cache connected");
        Ok(Self { conn })
    }
}

#[cfg(feature = "redis-cache")]
#[async_trait]
impl FeedCache for RedisFeedCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.conn.clone();
        match redis::cmd("GET").arg(key).query_async::<_, Option<String>>(&mut conn).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Redis GET failed for {}: {}", key, e);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) {
        let mut conn = self.conn.clone();
        if let Err(e) = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async::<_, ()>(&mut conn)
            .await
        {
            warn!("Redis SET failed for {}: {}", key, e);
        }
    }

    async fn invalidate(&self, prefix: &str) {
        let mut conn = self.conn.clone();
        let pattern = format!("{}*", prefix);
        let keys: Vec<String> = match redis::cmd("KEYS").arg(&pattern).query_async(&mut conn).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Redis KEYS failed for {}: {}", pattern, e);
                return;
            }
        };
        if keys.is_empty() {
            return;
        }
        if let Err(e) = redis::cmd("DEL").arg(&keys).query_async::<_, ()>(&mut conn).await {
            warn!("Redis DEL failed: {}", e);
        }
    }
}

/// 根据配置选择缓存实现
pub async fn build_feed_cache(redis_url: Option<&str>) -> Arc<dyn FeedCache> {
    match redis_url {
        #[cfg(feature = "redis-cache")]
        Some(url) => match RedisFeedCache::connect(url).await {
            Ok(cache) => Arc::new(cache),
            Err(e) => {
                warn!("Redis unavailable ({}), feed cache degraded to in-memory", e);
                Arc::new(MemoryFeedCache::new())
            }
        },
        #[cfg(not(feature = "redis-cache"))]
        Some(_) => {
            warn!("REDIS_URL set but binary built without redis-cache feature, using in-memory cache");
            Arc::new(MemoryFeedCache::new())
        }
        None => {
            info!("No REDIS_URL configured, feed cache disabled");
            Arc::new(NullFeedCache)
        }
    }
}

/// 生成 feed 缓存键: feed:{viewer|anon}:{page}
pub fn feed_key(viewer_id: Option<&str>, page: usize) -> String {
    format!("feed:{}:{}", viewer_id.unwrap_or("anon"), page)
}

pub const FEED_NAMESPACE: &str = "feed:";

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_cache_basic_operations() {
        let cache = MemoryFeedCache::new();

        cache.set("key1", "value1".to_string(), Duration::from_secs(5)).await;
        assert_eq!(cache.get("key1").await, Some("value1".to_string()));

        assert_eq!(cache.get("nonexistent").await, None);
    }

    #[tokio::test]
    async fn test_cache_expiration() {
        let cache = MemoryFeedCache::new();

        cache.set("temp_key", "temp_value".to_string(), Duration::from_millis(100)).await;
        assert_eq!(cache.get("temp_key").await, Some("temp_value".to_string()));

        sleep(Duration::from_millis(150)).await;
        assert_eq!(cache.get("temp_key").await, None);
    }

    #[tokio::test]
    async fn test_namespace_invalidation() {
        let cache = MemoryFeedCache::new();
        let ttl = Duration::from_secs(60);

        cache.set("feed:anon:1", "a".to_string(), ttl).await;
        cache.set("feed:user1:1", "b".to_string(), ttl).await;
        cache.set("profile:user1", "c".to_string(), ttl).await;

        cache.invalidate(FEED_NAMESPACE).await;

        assert_eq!(cache.get("feed:anon:1").await, None);
        assert_eq!(cache.get("feed:user1:1").await, None);
        // 其他命名空间不受影响
        assert_eq!(cache.get("profile:user1").await, Some("c".to_string()));
    }

    #[tokio::test]
    async fn test_null_cache_always_misses() {
        let cache = NullFeedCache;
        cache.set("key", "value".to_string(), Duration::from_secs(60)).await;
        assert_eq!(cache.get("key").await, None);
    }

    #[test]
    fn test_feed_key() {
        assert_eq!(feed_key(Some("user123"), 2), "feed:user123:2");
        assert_eq!(feed_key(None, 1), "feed:anon:1");
    }
}
