use chrono::{DateTime, Utc};

use super::{cell, cell_i64, cell_ts, fmt_ts};
use crate::sheets::table::{RowModel, TableSpec};

pub const SCHEDULED_JOBS: TableSpec = TableSpec {
    name: "ScheduledJobs",
    headers: &[
        "job_id",
        "telegram_id",
        "job_type",
        "due_at",
        "status",
        "created_at",
        "note",
    ],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Expire,
    Remind7d,
    Remind3d,
    Remind1d,
    TrialKick,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Expire => "expire",
            JobKind::Remind7d => "remind_7d",
            JobKind::Remind3d => "remind_3d",
            JobKind::Remind1d => "remind_1d",
            JobKind::TrialKick => "trial_kick",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "expire" => Some(JobKind::Expire),
            "remind_7d" => Some(JobKind::Remind7d),
            "remind_3d" => Some(JobKind::Remind3d),
            "remind_1d" => Some(JobKind::Remind1d),
            "trial_kick" => Some(JobKind::TrialKick),
            _ => None,
        }
    }
}

/// Durable timer row. Expiry and reminder work survives restarts because the
/// due timestamps and the fired state live in the sheet, not in tokio tasks.
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    pub job_id: String,
    pub telegram_id: i64,
    pub kind: JobKind,
    pub due_at: Option<DateTime<Utc>>,
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
    pub note: String,
}

impl ScheduledJob {
    pub fn pending(telegram_id: i64, kind: JobKind, due_at: DateTime<Utc>, note: &str) -> Self {
        Self {
            job_id: super::purchase::generate_id('J'),
            telegram_id,
            kind,
            due_at: Some(due_at),
            status: "pending".to_string(),
            created_at: Some(Utc::now()),
            note: note.to_string(),
        }
    }

    pub fn is_due_at(&self, now: DateTime<Utc>) -> bool {
        self.status == "pending" && self.due_at.map(|d| d <= now).unwrap_or(false)
    }
}

impl RowModel for ScheduledJob {
    fn spec() -> &'static TableSpec {
        &SCHEDULED_JOBS
    }

    fn from_row(row: &[String]) -> Self {
        Self {
            job_id: cell(row, 0).to_string(),
            telegram_id: cell_i64(row, 1),
            kind: JobKind::parse(cell(row, 2)).unwrap_or(JobKind::Expire),
            due_at: cell_ts(row, 3),
            status: cell(row, 4).to_string(),
            created_at: cell_ts(row, 5),
            note: cell(row, 6).to_string(),
        }
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.job_id.clone(),
            self.telegram_id.to_string(),
            self.kind.as_str().to_string(),
            self.due_at.map(fmt_ts).unwrap_or_default(),
            self.status.clone(),
            self.created_at.map(fmt_ts).unwrap_or_default(),
            self.note.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn due_only_when_pending_and_past() {
        let now = Utc::now();
        let mut job = ScheduledJob::pending(1, JobKind::Expire, now - Duration::seconds(5), "");
        assert!(job.is_due_at(now));
        job.status = "done".to_string();
        assert!(!job.is_due_at(now));
        let future = ScheduledJob::pending(1, JobKind::Remind7d, now + Duration::days(1), "");
        assert!(!future.is_due_at(now));
    }
}
