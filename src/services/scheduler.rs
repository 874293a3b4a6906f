use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::models::{JobKind, ScheduledJob};
use crate::sheets::table::{Keyed, Store};

/// Durable timers. Due times and fired state live in the ScheduledJobs
/// worksheet, so a restart neither loses reminders nor fires them twice.
#[derive(Clone)]
pub struct Scheduler {
    store: Store,
}

impl Scheduler {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn enqueue(
        &self,
        tg_id: i64,
        kind: JobKind,
        due_at: DateTime<Utc>,
        note: &str,
    ) -> Result<()> {
        self.store
            .insert(&ScheduledJob::pending(tg_id, kind, due_at, note))
            .await?;
        Ok(())
    }

    /// Cancels the user's pending lifecycle jobs, typically before a
    /// renewal re-enqueues a fresh set. Trial kicks are left alone: test
    /// access always ends on time, even when the user buys mid-trial.
    pub async fn cancel_pending_for(&self, tg_id: i64) -> Result<()> {
        for mut job in self.store.scan::<ScheduledJob>().await? {
            if job.value.telegram_id == tg_id
                && job.value.status == "pending"
                && job.value.kind != JobKind::TrialKick
            {
                job.value.status = "cancelled".to_string();
                self.store.update(job.row_index, &job.value).await?;
            }
        }
        Ok(())
    }

    pub async fn pending_kinds_for(&self, tg_id: i64) -> Result<Vec<JobKind>> {
        Ok(self
            .store
            .scan::<ScheduledJob>()
            .await?
            .into_iter()
            .filter(|j| j.value.telegram_id == tg_id && j.value.status == "pending")
            .map(|j| j.value.kind)
            .collect())
    }

    pub async fn due_jobs(&self, now: DateTime<Utc>) -> Result<Vec<Keyed<ScheduledJob>>> {
        Ok(self
            .store
            .scan::<ScheduledJob>()
            .await?
            .into_iter()
            .filter(|j| j.value.is_due_at(now))
            .collect())
    }

    pub async fn mark_done(&self, job: &mut Keyed<ScheduledJob>) -> Result<()> {
        job.value.status = "done".to_string();
        self.store.update(job.row_index, &job.value).await?;
        Ok(())
    }
}
