use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

pub mod codes;
pub mod job;
pub mod purchase;
pub mod referral;
pub mod subscription;
pub mod ticket;
pub mod user;

pub use codes::{BoostCode, DiscountCode, GiftCard};
pub use job::{JobKind, ScheduledJob};
pub use purchase::{
    generate_id, PayMethod, Product, Purchase, Withdrawal, NOTIFIED_MARKER, PROCESSED_MARKER,
};
pub use referral::ReferralEntry;
pub use subscription::{Subscription, Tier};
pub use ticket::Ticket;
pub use user::{ActiveBoost, User};

use crate::sheets::table::TableSpec;

/// Every worksheet the bot touches; headers are created/repaired at startup.
pub const ALL_TABLES: &[&TableSpec] = &[
    &user::USERS,
    &subscription::SUBSCRIPTIONS,
    &purchase::PURCHASES,
    &referral::REFERRALS,
    &crate::models::codes::DISCOUNT_CODES,
    &crate::models::codes::GIFT_CARDS,
    &crate::models::codes::BOOST_CODES,
    &ticket::TICKETS,
    &crate::models::job::SCHEDULED_JOBS,
    &crate::models::purchase::WITHDRAWALS,
];

pub fn fmt_ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Tolerant timestamp parse: RFC 3339 first, then the bare ISO form
/// older rows were written with.
pub fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|n| n.and_utc())
}

pub fn fmt_usd(v: f64) -> String {
    format!("{:.2}", v)
}

pub(crate) fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(|s| s.as_str()).unwrap_or("")
}

pub(crate) fn cell_i64(row: &[String], idx: usize) -> i64 {
    cell(row, idx).trim().parse().unwrap_or(0)
}

pub(crate) fn cell_f64(row: &[String], idx: usize) -> f64 {
    cell(row, idx).trim().parse().unwrap_or(0.0)
}

pub(crate) fn cell_ts(row: &[String], idx: usize) -> Option<DateTime<Utc>> {
    parse_ts(cell(row, idx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ts_accepts_both_forms() {
        assert!(parse_ts("2025-06-01T10:00:00Z").is_some());
        assert!(parse_ts("2025-06-01T10:00:00").is_some());
        assert!(parse_ts("").is_none());
        assert!(parse_ts("not a date").is_none());
    }

    #[test]
    fn ts_round_trip() {
        let now = Utc::now();
        let parsed = parse_ts(&fmt_ts(now)).unwrap();
        assert_eq!(parsed.timestamp(), now.timestamp());
    }
}
