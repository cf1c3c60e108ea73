pub mod database;
pub mod auth;
pub mod geo;
pub mod push;
pub mod dispatcher;
pub mod notification;
pub mod subscriber;
pub mod boost;
pub mod sweeper;
pub mod feed;
pub mod alert;

#[cfg(test)]
pub mod test_support;

// 重新导出常用类型
pub use database::Database;
pub use auth::AuthService;
pub use dispatcher::NotificationDispatcher;
pub use notification::NotificationService;
pub use subscriber::SubscriberService;
pub use boost::BoostService;
pub use sweeper::BoostSweeper;
pub use feed::FeedService;
pub use alert::AlertService;
