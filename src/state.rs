use crate::{
    config::Config,
    services::{
        alert::AlertService,
        auth::AuthService,
        boost::BoostService,
        feed::FeedService,
        notification::NotificationService,
        subscriber::SubscriberService,
    },
};
use std::sync::Arc;

/// 应用程序的共享状态
/// 包含所有服务和配置的引用
#[derive(Clone)]
pub struct AppState {
    /// 应用配置
    pub config: Arc<Config>,

    /// 认证服务
    pub auth_service: AuthService,

    /// 订阅者档案服务
    pub subscriber_service: Arc<SubscriberService>,

    /// 通知服务
    pub notification_service: Arc<NotificationService>,

    /// 走失告警编排
    pub alert_service: AlertService,

    /// 推广服务
    pub boost_service: BoostService,

    /// Feed 服务
    pub feed_service: FeedService,
}

impl AppState {
    /// 检查是否为生产环境
    pub fn is_production(&self) -> bool {
        self.config.is_production()
    }

    /// 检查是否为开发环境
    pub fn is_development(&self) -> bool {
        self.config.is_development()
    }
}
