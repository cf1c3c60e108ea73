pub mod boosts;
pub mod lost_cats;
pub mod notifications;
pub mod posts;
pub mod users;
