use chrono::{DateTime, Utc};

use super::{cell, cell_i64, cell_ts, fmt_ts};
use crate::sheets::table::{RowModel, TableSpec};

pub const TICKETS: TableSpec = TableSpec {
    name: "Tickets",
    headers: &[
        "ticket_id",
        "telegram_id",
        "username",
        "subject",
        "message",
        "status",
        "created_at",
        "response",
        "responded_at",
    ],
};

#[derive(Debug, Clone)]
pub struct Ticket {
    pub ticket_id: String,
    pub telegram_id: i64,
    pub username: String,
    pub subject: String,
    pub message: String,
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
    pub response: String,
    pub responded_at: Option<DateTime<Utc>>,
}

impl Ticket {
    pub fn open(telegram_id: i64, username: &str, subject: &str, message: &str) -> Self {
        Self {
            ticket_id: super::purchase::generate_id('T'),
            telegram_id,
            username: username.to_string(),
            subject: subject.to_string(),
            message: message.to_string(),
            status: "open".to_string(),
            created_at: Some(Utc::now()),
            response: String::new(),
            responded_at: None,
        }
    }
}

impl RowModel for Ticket {
    fn spec() -> &'static TableSpec {
        &TICKETS
    }

    fn from_row(row: &[String]) -> Self {
        Self {
            ticket_id: cell(row, 0).to_string(),
            telegram_id: cell_i64(row, 1),
            username: cell(row, 2).to_string(),
            subject: cell(row, 3).to_string(),
            message: cell(row, 4).to_string(),
            status: cell(row, 5).to_string(),
            created_at: cell_ts(row, 6),
            response: cell(row, 7).to_string(),
            responded_at: cell_ts(row, 8),
        }
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.ticket_id.clone(),
            self.telegram_id.to_string(),
            self.username.clone(),
            self.subject.clone(),
            self.message.clone(),
            self.status.clone(),
            self.created_at.map(fmt_ts).unwrap_or_default(),
            self.response.clone(),
            self.responded_at.map(fmt_ts).unwrap_or_default(),
        ]
    }
}
