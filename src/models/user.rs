use chrono::{DateTime, Utc};

use super::{cell, cell_f64, cell_i64, cell_ts, fmt_ts, fmt_usd};
use crate::sheets::table::{RowModel, TableSpec};

pub const USERS: TableSpec = TableSpec {
    name: "Users",
    headers: &[
        "telegram_id",
        "username",
        "full_name",
        "email",
        "referral_code",
        "referred_by",
        "wallet_balance",
        "status",
        "created_at",
        "last_seen",
        "active_boost",
    ],
};

/// Boosted commission rates unlocked by a hidden code. Stored in a single
/// cell as `boost:<code>:<level1>:<level2>` so the sheet stays one column
/// wide; parsing lives here and nowhere else.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveBoost {
    pub code: String,
    pub level1_percent: f64,
    pub level2_percent: f64,
}

impl ActiveBoost {
    pub fn parse(cell: &str) -> Option<Self> {
        let mut parts = cell.trim().split(':');
        if parts.next()? != "boost" {
            return None;
        }
        let code = parts.next()?.to_string();
        let level1_percent: f64 = parts.next()?.parse().ok()?;
        let level2_percent: f64 = parts.next()?.parse().ok()?;
        if code.is_empty() {
            return None;
        }
        Some(Self {
            code,
            level1_percent,
            level2_percent,
        })
    }

    pub fn encode(&self) -> String {
        format!(
            "boost:{}:{}:{}",
            self.code, self.level1_percent, self.level2_percent
        )
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub telegram_id: i64,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub referral_code: String,
    pub referred_by: Option<i64>,
    pub wallet_balance: f64,
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub active_boost: Option<ActiveBoost>,
}

impl User {
    pub fn new(telegram_id: i64, username: &str, full_name: &str, email: &str) -> Self {
        let now = Utc::now();
        Self {
            telegram_id,
            username: username.to_string(),
            full_name: full_name.to_string(),
            email: email.to_string(),
            referral_code: generate_referral_code(),
            referred_by: None,
            wallet_balance: 0.0,
            status: "active".to_string(),
            created_at: Some(now),
            last_seen: Some(now),
            active_boost: None,
        }
    }
}

impl RowModel for User {
    fn spec() -> &'static TableSpec {
        &USERS
    }

    fn from_row(row: &[String]) -> Self {
        let referred_by = match cell_i64(row, 5) {
            0 => None,
            id => Some(id),
        };
        Self {
            telegram_id: cell_i64(row, 0),
            username: cell(row, 1).to_string(),
            full_name: cell(row, 2).to_string(),
            email: cell(row, 3).to_string(),
            referral_code: cell(row, 4).to_string(),
            referred_by,
            wallet_balance: cell_f64(row, 6),
            status: cell(row, 7).to_string(),
            created_at: cell_ts(row, 8),
            last_seen: cell_ts(row, 9),
            active_boost: ActiveBoost::parse(cell(row, 10)),
        }
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.telegram_id.to_string(),
            self.username.clone(),
            self.full_name.clone(),
            self.email.clone(),
            self.referral_code.clone(),
            self.referred_by.map(|v| v.to_string()).unwrap_or_default(),
            fmt_usd(self.wallet_balance),
            self.status.clone(),
            self.created_at.map(fmt_ts).unwrap_or_default(),
            self.last_seen.map(fmt_ts).unwrap_or_default(),
            self.active_boost
                .as_ref()
                .map(|b| b.encode())
                .unwrap_or_default(),
        ]
    }
}

const REFERRAL_PREFIX: &str = "REF-";
const REFERRAL_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// 6 uppercase alphanumerics behind a fixed prefix. No collision retry; at
/// the row counts a single spreadsheet holds, collisions are negligible.
pub fn generate_referral_code() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| REFERRAL_CHARSET[rng.gen_range(0..REFERRAL_CHARSET.len())] as char)
        .collect();
    format!("{}{}", REFERRAL_PREFIX, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boost_parse_round_trip() {
        let boost = ActiveBoost {
            code: "VIP10".to_string(),
            level1_percent: 15.0,
            level2_percent: 20.0,
        };
        assert_eq!(ActiveBoost::parse(&boost.encode()), Some(boost));
    }

    #[test]
    fn boost_parse_rejects_garbage() {
        assert_eq!(ActiveBoost::parse(""), None);
        assert_eq!(ActiveBoost::parse("VIP10"), None);
        assert_eq!(ActiveBoost::parse("boost::8:12"), None);
        assert_eq!(ActiveBoost::parse("boost:VIP:x:y"), None);
    }

    #[test]
    fn referral_code_shape() {
        let code = generate_referral_code();
        assert!(code.starts_with("REF-"));
        assert_eq!(code.len(), 10);
        assert!(code[4..]
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn user_row_round_trip_preserves_referrer() {
        let mut u = User::new(42, "alice", "Alice A", "a@example.com");
        u.referred_by = Some(7);
        u.wallet_balance = 3.5;
        let back = User::from_row(&u.to_row());
        assert_eq!(back.telegram_id, 42);
        assert_eq!(back.referred_by, Some(7));
        assert_eq!(back.wallet_balance, 3.5);
        assert_eq!(back.referral_code, u.referral_code);
    }
}
