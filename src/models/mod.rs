pub mod alert;
pub mod boost;
pub mod feed;
pub mod notification;
pub mod subscriber;
