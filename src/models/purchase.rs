use chrono::{DateTime, Utc};

use super::{cell, cell_f64, cell_i64, cell_ts, fmt_ts, fmt_usd, Tier};
use crate::sheets::table::{RowModel, TableSpec};

pub const PURCHASES: TableSpec = TableSpec {
    name: "Purchases",
    headers: &[
        "purchase_id",
        "telegram_id",
        "username",
        "product",
        "amount_usd",
        "amount_irr",
        "payment_method",
        "transaction_id",
        "status",
        "admin_action",
        "created_at",
        "approved_at",
        "approved_by",
        "notes",
    ],
};

pub const WITHDRAWALS: TableSpec = TableSpec {
    name: "Withdrawals",
    headers: &[
        "withdrawal_id",
        "telegram_id",
        "amount_usd",
        "method",
        "destination",
        "status",
        "admin_action",
        "requested_at",
        "processed_at",
        "processed_by",
        "notes",
    ],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Product {
    Normal,
    Premium,
    GiftNormal,
    GiftPremium,
    Trial,
}

impl Product {
    pub fn as_str(&self) -> &'static str {
        match self {
            Product::Normal => "normal",
            Product::Premium => "premium",
            Product::GiftNormal => "gift_normal",
            Product::GiftPremium => "gift_premium",
            Product::Trial => "trial",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "normal" => Some(Product::Normal),
            "premium" => Some(Product::Premium),
            "gift_normal" => Some(Product::GiftNormal),
            "gift_premium" => Some(Product::GiftPremium),
            "trial" => Some(Product::Trial),
            _ => None,
        }
    }

    pub fn is_gift(&self) -> bool {
        matches!(self, Product::GiftNormal | Product::GiftPremium)
    }

    /// The tier the purchase grants (to the buyer, or to the gift redeemer).
    pub fn tier(&self) -> Tier {
        match self {
            Product::Premium | Product::GiftPremium => Tier::Premium,
            _ => Tier::Normal,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Product::Normal => "Normal channel",
            Product::Premium => "Premium (both channels)",
            Product::GiftNormal => "Gift: Normal channel",
            Product::GiftPremium => "Gift: Premium",
            Product::Trial => "Free trial",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayMethod {
    Card,
    Usdt,
}

impl PayMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayMethod::Card => "card",
            PayMethod::Usdt => "usdt",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "card" => Some(PayMethod::Card),
            "usdt" => Some(PayMethod::Usdt),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Purchase {
    pub purchase_id: String,
    pub telegram_id: i64,
    pub username: String,
    pub product: Product,
    pub amount_usd: f64,
    pub amount_irr: f64,
    pub payment_method: String,
    pub transaction_id: String,
    pub status: String,
    pub admin_action: String,
    pub created_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: String,
    pub notes: String,
}

/// Marker written into `notes` once an approve/reject has been applied, so the
/// reconciliation poller never double-credits a purchase it already handled.
pub const PROCESSED_MARKER: &str = "[processed]";
/// Marker written once the admin has been pinged about a pending row.
pub const NOTIFIED_MARKER: &str = "[notified]";

impl Purchase {
    pub fn is_processed(&self) -> bool {
        self.notes.contains(PROCESSED_MARKER)
    }

    pub fn is_admin_notified(&self) -> bool {
        self.notes.contains(NOTIFIED_MARKER)
    }
}

impl RowModel for Purchase {
    fn spec() -> &'static TableSpec {
        &PURCHASES
    }

    fn from_row(row: &[String]) -> Self {
        Self {
            purchase_id: cell(row, 0).to_string(),
            telegram_id: cell_i64(row, 1),
            username: cell(row, 2).to_string(),
            product: Product::parse(cell(row, 3)).unwrap_or(Product::Normal),
            amount_usd: cell_f64(row, 4),
            amount_irr: cell_f64(row, 5),
            payment_method: cell(row, 6).to_string(),
            transaction_id: cell(row, 7).to_string(),
            status: cell(row, 8).to_string(),
            admin_action: cell(row, 9).to_string(),
            created_at: cell_ts(row, 10),
            approved_at: cell_ts(row, 11),
            approved_by: cell(row, 12).to_string(),
            notes: cell(row, 13).to_string(),
        }
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.purchase_id.clone(),
            self.telegram_id.to_string(),
            self.username.clone(),
            self.product.as_str().to_string(),
            fmt_usd(self.amount_usd),
            format!("{:.0}", self.amount_irr),
            self.payment_method.clone(),
            self.transaction_id.clone(),
            self.status.clone(),
            self.admin_action.clone(),
            self.created_at.map(fmt_ts).unwrap_or_default(),
            self.approved_at.map(fmt_ts).unwrap_or_default(),
            self.approved_by.clone(),
            self.notes.clone(),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct Withdrawal {
    pub withdrawal_id: String,
    pub telegram_id: i64,
    pub amount_usd: f64,
    pub method: PayMethod,
    pub destination: String,
    pub status: String,
    pub admin_action: String,
    pub requested_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub processed_by: String,
    pub notes: String,
}

impl RowModel for Withdrawal {
    fn spec() -> &'static TableSpec {
        &WITHDRAWALS
    }

    fn from_row(row: &[String]) -> Self {
        Self {
            withdrawal_id: cell(row, 0).to_string(),
            telegram_id: cell_i64(row, 1),
            amount_usd: cell_f64(row, 2),
            method: PayMethod::parse(cell(row, 3)).unwrap_or(PayMethod::Card),
            destination: cell(row, 4).to_string(),
            status: cell(row, 5).to_string(),
            admin_action: cell(row, 6).to_string(),
            requested_at: cell_ts(row, 7),
            processed_at: cell_ts(row, 8),
            processed_by: cell(row, 9).to_string(),
            notes: cell(row, 10).to_string(),
        }
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.withdrawal_id.clone(),
            self.telegram_id.to_string(),
            fmt_usd(self.amount_usd),
            self.method.as_str().to_string(),
            self.destination.clone(),
            self.status.clone(),
            self.admin_action.clone(),
            self.requested_at.map(fmt_ts).unwrap_or_default(),
            self.processed_at.map(fmt_ts).unwrap_or_default(),
            self.processed_by.clone(),
            self.notes.clone(),
        ]
    }
}

/// Short, sheet-friendly id with a type prefix, e.g. `P-3F2A9C81D0`.
pub fn generate_id(prefix: char) -> String {
    let raw = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, raw[..10].to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_tier_mapping() {
        assert_eq!(Product::GiftPremium.tier(), Tier::Premium);
        assert_eq!(Product::GiftNormal.tier(), Tier::Normal);
        assert_eq!(Product::Trial.tier(), Tier::Normal);
        assert!(Product::GiftNormal.is_gift());
        assert!(!Product::Normal.is_gift());
    }

    #[test]
    fn processed_marker_detection() {
        let mut row = vec![String::new(); PURCHASES.width()];
        row[13] = format!("{} approved by 1", PROCESSED_MARKER);
        assert!(Purchase::from_row(&row).is_processed());
    }

    #[test]
    fn generated_ids_are_distinct() {
        assert_ne!(generate_id('P'), generate_id('P'));
        assert!(generate_id('W').starts_with("W-"));
    }
}
