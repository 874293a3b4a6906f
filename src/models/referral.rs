use chrono::{DateTime, Utc};

use super::{cell, cell_f64, cell_i64, cell_ts, fmt_ts, fmt_usd};
use crate::sheets::table::{RowModel, TableSpec};

pub const REFERRALS: TableSpec = TableSpec {
    name: "Referrals",
    headers: &[
        "referrer_id",
        "referred_id",
        "level",
        "commission_usd",
        "status",
        "purchase_id",
        "created_at",
        "paid_at",
    ],
};

/// Append-only commission ledger; at most two rows per approved purchase.
#[derive(Debug, Clone)]
pub struct ReferralEntry {
    pub referrer_id: i64,
    pub referred_id: i64,
    pub level: u8,
    pub commission_usd: f64,
    pub status: String,
    pub purchase_id: String,
    pub created_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl ReferralEntry {
    pub fn paid(
        referrer_id: i64,
        referred_id: i64,
        level: u8,
        commission_usd: f64,
        purchase_id: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            referrer_id,
            referred_id,
            level,
            commission_usd,
            status: "paid".to_string(),
            purchase_id: purchase_id.to_string(),
            created_at: Some(now),
            paid_at: Some(now),
        }
    }
}

impl RowModel for ReferralEntry {
    fn spec() -> &'static TableSpec {
        &REFERRALS
    }

    fn from_row(row: &[String]) -> Self {
        Self {
            referrer_id: cell_i64(row, 0),
            referred_id: cell_i64(row, 1),
            level: cell_i64(row, 2) as u8,
            commission_usd: cell_f64(row, 3),
            status: cell(row, 4).to_string(),
            purchase_id: cell(row, 5).to_string(),
            created_at: cell_ts(row, 6),
            paid_at: cell_ts(row, 7),
        }
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.referrer_id.to_string(),
            self.referred_id.to_string(),
            self.level.to_string(),
            fmt_usd(self.commission_usd),
            self.status.clone(),
            self.purchase_id.clone(),
            self.created_at.map(fmt_ts).unwrap_or_default(),
            self.paid_at.map(fmt_ts).unwrap_or_default(),
        ]
    }
}
