use chrono::{DateTime, Utc};

use super::{cell, cell_f64, cell_i64, cell_ts, fmt_ts, Product};
use crate::sheets::table::{RowModel, TableSpec};

pub const DISCOUNT_CODES: TableSpec = TableSpec {
    name: "DiscountCodes",
    headers: &[
        "code",
        "percent",
        "max_uses",
        "used_count",
        "valid_until",
        "status",
        "created_by",
        "created_at",
    ],
};

pub const GIFT_CARDS: TableSpec = TableSpec {
    name: "GiftCards",
    headers: &[
        "code",
        "product",
        "status",
        "purchased_by",
        "redeemed_by",
        "created_at",
        "redeemed_at",
    ],
};

pub const BOOST_CODES: TableSpec = TableSpec {
    name: "BoostCodes",
    headers: &[
        "code",
        "level1_percent",
        "level2_percent",
        "max_uses",
        "used_count",
        "valid_until",
        "status",
        "created_by",
        "created_at",
    ],
};

/// Quota check shared by all three registries: `max_uses == 0` means
/// unlimited.
fn quota_remaining(max_uses: i64, used_count: i64) -> bool {
    max_uses == 0 || used_count < max_uses
}

fn not_expired(valid_until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    valid_until.map(|v| v > now).unwrap_or(true)
}

#[derive(Debug, Clone)]
pub struct DiscountCode {
    pub code: String,
    pub percent: f64,
    pub max_uses: i64,
    pub used_count: i64,
    pub valid_until: Option<DateTime<Utc>>,
    pub status: String,
    pub created_by: i64,
    pub created_at: Option<DateTime<Utc>>,
}

impl DiscountCode {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.status == "active"
            && not_expired(self.valid_until, now)
            && quota_remaining(self.max_uses, self.used_count)
    }
}

impl RowModel for DiscountCode {
    fn spec() -> &'static TableSpec {
        &DISCOUNT_CODES
    }

    fn from_row(row: &[String]) -> Self {
        Self {
            code: cell(row, 0).to_string(),
            percent: cell_f64(row, 1),
            max_uses: cell_i64(row, 2),
            used_count: cell_i64(row, 3),
            valid_until: cell_ts(row, 4),
            status: cell(row, 5).to_string(),
            created_by: cell_i64(row, 6),
            created_at: cell_ts(row, 7),
        }
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.code.clone(),
            format!("{}", self.percent),
            self.max_uses.to_string(),
            self.used_count.to_string(),
            self.valid_until.map(fmt_ts).unwrap_or_default(),
            self.status.clone(),
            self.created_by.to_string(),
            self.created_at.map(fmt_ts).unwrap_or_default(),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct GiftCard {
    pub code: String,
    pub product: Product,
    pub status: String,
    pub purchased_by: i64,
    pub redeemed_by: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub redeemed_at: Option<DateTime<Utc>>,
}

impl GiftCard {
    pub fn is_redeemable(&self) -> bool {
        self.status == "pending"
    }
}

impl RowModel for GiftCard {
    fn spec() -> &'static TableSpec {
        &GIFT_CARDS
    }

    fn from_row(row: &[String]) -> Self {
        let redeemed_by = match cell_i64(row, 4) {
            0 => None,
            id => Some(id),
        };
        Self {
            code: cell(row, 0).to_string(),
            product: Product::parse(cell(row, 1)).unwrap_or(Product::GiftNormal),
            status: cell(row, 2).to_string(),
            purchased_by: cell_i64(row, 3),
            redeemed_by,
            created_at: cell_ts(row, 5),
            redeemed_at: cell_ts(row, 6),
        }
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.code.clone(),
            self.product.as_str().to_string(),
            self.status.clone(),
            self.purchased_by.to_string(),
            self.redeemed_by.map(|v| v.to_string()).unwrap_or_default(),
            self.created_at.map(fmt_ts).unwrap_or_default(),
            self.redeemed_at.map(fmt_ts).unwrap_or_default(),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct BoostCode {
    pub code: String,
    pub level1_percent: f64,
    pub level2_percent: f64,
    pub max_uses: i64,
    pub used_count: i64,
    pub valid_until: Option<DateTime<Utc>>,
    pub status: String,
    pub created_by: i64,
    pub created_at: Option<DateTime<Utc>>,
}

impl BoostCode {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.status == "active"
            && not_expired(self.valid_until, now)
            && quota_remaining(self.max_uses, self.used_count)
    }
}

impl RowModel for BoostCode {
    fn spec() -> &'static TableSpec {
        &BOOST_CODES
    }

    fn from_row(row: &[String]) -> Self {
        Self {
            code: cell(row, 0).to_string(),
            level1_percent: cell_f64(row, 1),
            level2_percent: cell_f64(row, 2),
            max_uses: cell_i64(row, 3),
            used_count: cell_i64(row, 4),
            valid_until: cell_ts(row, 5),
            status: cell(row, 6).to_string(),
            created_by: cell_i64(row, 7),
            created_at: cell_ts(row, 8),
        }
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.code.clone(),
            format!("{}", self.level1_percent),
            format!("{}", self.level2_percent),
            self.max_uses.to_string(),
            self.used_count.to_string(),
            self.valid_until.map(fmt_ts).unwrap_or_default(),
            self.status.clone(),
            self.created_by.to_string(),
            self.created_at.map(fmt_ts).unwrap_or_default(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn discount(max_uses: i64, used: i64) -> DiscountCode {
        DiscountCode {
            code: "SAVE20".to_string(),
            percent: 20.0,
            max_uses,
            used_count: used,
            valid_until: Some(Utc::now() + Duration::days(7)),
            status: "active".to_string(),
            created_by: 1,
            created_at: Some(Utc::now()),
        }
    }

    #[test]
    fn quota_zero_means_unlimited() {
        assert!(discount(0, 9_999).is_valid_at(Utc::now()));
    }

    #[test]
    fn quota_exhaustion_invalidates() {
        assert!(discount(1, 0).is_valid_at(Utc::now()));
        assert!(!discount(1, 1).is_valid_at(Utc::now()));
    }

    #[test]
    fn expiry_invalidates() {
        let mut d = discount(0, 0);
        d.valid_until = Some(Utc::now() - Duration::seconds(1));
        assert!(!d.is_valid_at(Utc::now()));
    }

    #[test]
    fn inactive_status_invalidates() {
        let mut d = discount(0, 0);
        d.status = "disabled".to_string();
        assert!(!d.is_valid_at(Utc::now()));
    }
}
