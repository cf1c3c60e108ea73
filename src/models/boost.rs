use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

/// 付费推广目标类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoostTargetType {
    Post,
    LostCat,
    Memorial,
}

impl BoostTargetType {
    /// 目标实体所在的表名 (承载 is_boosted 冗余标记)
    pub fn table(&self) -> &'static str {
        match self {
            BoostTargetType::Post => "post",
            BoostTargetType::LostCat => "lost_cat",
            BoostTargetType::Memorial => "memorial",
        }
    }

    /// 每小时价格 (RM)
    pub fn price_per_hour(&self) -> f64 {
        match self {
            BoostTargetType::Post => 2.0,
            // 走失猫打折 — 公益性质
            BoostTargetType::LostCat => 1.5,
            BoostTargetType::Memorial => 3.0,
        }
    }
}

impl fmt::Display for BoostTargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Pending,
    Paid,
    Failed,
}

/// 付费推广台账行 (paid_boost 表, 只追加的历史)
/// starts_at/expires_at 只在 pending->paid 时写入一次, 之后不变
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Boost {
    pub id: String,
    pub purchaser_id: String,
    pub target_type: BoostTargetType,
    pub target_id: String,
    pub amount: f64,
    pub currency: String,
    pub duration_hours: i64,
    pub payment_state: PaymentState,
    pub payment_reference: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Boost {
    /// 逻辑过期是派生读, 不是存储状态
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.payment_state == PaymentState::Paid
            && self.expires_at.map_or(false, |exp| exp > now)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateBoostRequest {
    pub target_type: BoostTargetType,
    pub target_id: String,
    #[validate(range(min = 1, max = 168, message = "Duration must be 1-168 hours"))]
    pub duration_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActivateBoostRequest {
    pub boost_id: String,
    pub payment_reference: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_table() {
        assert_eq!(BoostTargetType::Post.price_per_hour(), 2.0);
        assert_eq!(BoostTargetType::LostCat.price_per_hour(), 1.5);
        assert_eq!(BoostTargetType::Memorial.price_per_hour(), 3.0);
    }

    #[test]
    fn test_target_type_serde() {
        let t: BoostTargetType = serde_json::from_str("\"lost_cat\"").unwrap();
        assert_eq!(t, BoostTargetType::LostCat);
        assert!(serde_json::from_str::<BoostTargetType>("\"banner\"").is_err());
    }

    #[test]
    fn test_is_active_derived_from_time() {
        let now = Utc::now();
        let boost = Boost {
            id: "b1".to_string(),
            purchaser_id: "u1".to_string(),
            target_type: BoostTargetType::Post,
            target_id: "p1".to_string(),
            amount: 4.0,
            currency: "MYR".to_string(),
            duration_hours: 2,
            payment_state: PaymentState::Paid,
            payment_reference: Some("ref1".to_string()),
            starts_at: Some(now - chrono::Duration::hours(1)),
            expires_at: Some(now + chrono::Duration::hours(1)),
            created_at: now - chrono::Duration::hours(1),
        };
        assert!(boost.is_active(now));
        assert!(!boost.is_active(now + chrono::Duration::hours(2)));

        let pending = Boost { payment_state: PaymentState::Pending, ..boost };
        assert!(!pending.is_active(now));
    }
}
