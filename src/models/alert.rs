use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::subscriber::GeoPoint;

/// 告警事件 — 一次性产生的不可变事实
/// 每份走失报告产生一条; 之后不再修改
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    /// 走失报告 ID
    pub subject_id: String,
    pub origin: GeoPoint,
    /// 展示用标签 (猫的名字)
    pub label: String,
    /// 被排除的订阅者 (报告人自己)
    pub excluded_subscriber: String,
    pub created_at: DateTime<Utc>,
}

/// 走失猫报告行 (lost_cat 表)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LostCat {
    pub id: String,
    pub reporter_id: String,
    pub name: String,
    pub breed: Option<String>,
    pub color: Option<String>,
    pub description: String,
    pub last_seen_lat: f64,
    pub last_seen_lng: f64,
    pub last_seen_address: Option<String>,
    pub contact_phone: Option<String>,
    pub reward_amount: Option<f64>,
    pub status: String,
    pub is_boosted: bool,
    pub boost_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReportLostCatRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    pub breed: Option<String>,
    pub color: Option<String>,
    #[validate(length(min = 1, max = 2000, message = "Description must be 1-2000 characters"))]
    pub description: String,
    pub last_seen_lat: f64,
    pub last_seen_lng: f64,
    pub last_seen_address: Option<String>,
    pub contact_phone: Option<String>,
    pub reward_amount: Option<f64>,
}

/// 目击记录 (cat_sighting 表)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatSighting {
    pub id: String,
    pub lost_cat_id: String,
    pub reporter_id: String,
    pub lat: f64,
    pub lng: f64,
    pub address: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReportSightingRequest {
    pub lat: f64,
    pub lng: f64,
    pub address: Option<String>,
    #[validate(length(max = 500, message = "Note too long"))]
    pub note: Option<String>,
}
