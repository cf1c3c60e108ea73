use crate::{
    config::Config,
    error::Result,
    services::boost::BoostStore,
    utils::cache::{FeedCache, FEED_NAMESPACE},
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 过期清扫器 — 周期性把过期推广的冗余标记放下
///
/// 清扫只动 boost_expires_at 已过去的行; 激活只往更晚抬升。
/// 两个写者因此可交换, 清扫与激活并发也不会把活跃推广误清。
#[derive(Clone)]
pub struct BoostSweeper {
    store: Arc<dyn BoostStore>,
    cache: Arc<dyn FeedCache>,
    config: Arc<Config>,
}

impl BoostSweeper {
    pub fn new(store: Arc<dyn BoostStore>, cache: Arc<dyn FeedCache>, config: Arc<Config>) -> Self {
        Self { store, cache, config }
    }

    /// 单次清扫; 返回清除的标记数
    pub async fn run_once(&self) -> Result<u64> {
        let now = Utc::now();
        let cleared = self.store.clear_expired_promotions(now).await?;

        if cleared > 0 {
            info!("Boost sweep cleared {} expired promotion flags", cleared);
            // 标记变了, 排序会变, feed 缓存作废
            self.cache.invalidate(FEED_NAMESPACE).await;
        } else {
            debug!("Boost sweep found nothing to clear");
        }

        Ok(cleared)
    }

    /// 后台任务: 固定间隔, 单次超时保护, 不重叠
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        let interval = Duration::from_secs(self.config.boost_sweep_interval);
        let timeout = Duration::from_secs(self.config.boost_sweep_timeout);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!("Boost sweeper started (every {}s)", interval.as_secs());

            loop {
                ticker.tick().await;
                match tokio::time::timeout(timeout, self.run_once()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => error!("Boost sweep failed: {}", e),
                    Err(_) => warn!("Boost sweep timed out after {}s", timeout.as_secs()),
                }
            }
        })
    }
}
