use chrono::{DateTime, Utc};

use super::{cell, cell_i64, cell_ts, fmt_ts};
use crate::sheets::table::{RowModel, TableSpec};

pub const SUBSCRIPTIONS: TableSpec = TableSpec {
    name: "Subscriptions",
    headers: &[
        "telegram_id",
        "username",
        "subscription_type",
        "status",
        "activated_at",
        "expires_at",
        "payment_method",
    ],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Normal,
    Premium,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Normal => "normal",
            Tier::Premium => "premium",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "normal" => Some(Tier::Normal),
            "premium" => Some(Tier::Premium),
            _ => None,
        }
    }
}

/// One logical row per user; renewals overwrite in place.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub telegram_id: i64,
    pub username: String,
    pub tier: Tier,
    pub status: String,
    pub activated_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub payment_method: String,
}

impl Subscription {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == "active" && self.expires_at.map(|e| e > now).unwrap_or(false)
    }
}

impl RowModel for Subscription {
    fn spec() -> &'static TableSpec {
        &SUBSCRIPTIONS
    }

    fn from_row(row: &[String]) -> Self {
        Self {
            telegram_id: cell_i64(row, 0),
            username: cell(row, 1).to_string(),
            tier: Tier::parse(cell(row, 2)).unwrap_or(Tier::Normal),
            status: cell(row, 3).to_string(),
            activated_at: cell_ts(row, 4),
            expires_at: cell_ts(row, 5),
            payment_method: cell(row, 6).to_string(),
        }
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.telegram_id.to_string(),
            self.username.clone(),
            self.tier.as_str().to_string(),
            self.status.clone(),
            self.activated_at.map(fmt_ts).unwrap_or_default(),
            self.expires_at.map(fmt_ts).unwrap_or_default(),
            self.payment_method.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn active_requires_status_and_future_expiry() {
        let now = Utc::now();
        let mut sub = Subscription {
            telegram_id: 1,
            username: String::new(),
            tier: Tier::Normal,
            status: "active".to_string(),
            activated_at: Some(now),
            expires_at: Some(now + Duration::days(1)),
            payment_method: "card".to_string(),
        };
        assert!(sub.is_active_at(now));
        sub.status = "expired".to_string();
        assert!(!sub.is_active_at(now));
        sub.status = "active".to_string();
        sub.expires_at = Some(now - Duration::seconds(1));
        assert!(!sub.is_active_at(now));
    }
}
