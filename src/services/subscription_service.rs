use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::config::Config;
use crate::gateway::{MembershipGateway, Notifier};
use crate::models::{JobKind, Subscription, Tier};
use crate::services::scheduler::Scheduler;
use crate::sheets::table::Store;

const INVITE_TTL: StdDuration = StdDuration::from_secs(24 * 3600);
const TRIAL_TTL: StdDuration = StdDuration::from_secs(600);

/// Result of an activation. Invite failures do not undo the activation;
/// the caller records them for manual follow-up.
pub struct Activation {
    pub expires_at: DateTime<Utc>,
    pub invite_links: Vec<String>,
    pub failed_channels: Vec<i64>,
}

/// Subscription state machine: none, active, expired, active again on
/// renewal. One Subscription row per user, overwritten in place.
#[derive(Clone)]
pub struct SubscriptionService {
    store: Store,
    config: Arc<Config>,
    scheduler: Scheduler,
    gateway: Arc<dyn MembershipGateway>,
    notifier: Arc<dyn Notifier>,
}

/// Lifecycle slots relative to the expiry instant; reminders before, the
/// expiry itself at T.
fn lifecycle_slots(expires_at: DateTime<Utc>) -> [(JobKind, DateTime<Utc>); 4] {
    [
        (JobKind::Remind7d, expires_at - Duration::days(7)),
        (JobKind::Remind3d, expires_at - Duration::days(3)),
        (JobKind::Remind1d, expires_at - Duration::days(1)),
        (JobKind::Expire, expires_at),
    ]
}

impl SubscriptionService {
    pub fn new(
        store: Store,
        config: Arc<Config>,
        scheduler: Scheduler,
        gateway: Arc<dyn MembershipGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            config,
            scheduler,
            gateway,
            notifier,
        }
    }

    /// Activates (or renews) a subscription. Overwrites the existing row,
    /// replaces the user's pending jobs, and sends one fresh single-use
    /// 24-hour invite per granted channel.
    pub async fn activate(
        &self,
        tg_id: i64,
        username: &str,
        tier: Tier,
        payment_method: &str,
    ) -> Result<Activation> {
        let now = Utc::now();
        let expires_at = now + Duration::days(self.config.subscription_days);
        let sub = Subscription {
            telegram_id: tg_id,
            username: username.to_string(),
            tier,
            status: "active".to_string(),
            activated_at: Some(now),
            expires_at: Some(expires_at),
            payment_method: payment_method.to_string(),
        };
        match self
            .store
            .find_by::<Subscription, _>(|s| s.telegram_id == tg_id)
            .await?
        {
            Some(existing) => self.store.update(existing.row_index, &sub).await?,
            None => self.store.insert(&sub).await?,
        }

        self.scheduler.cancel_pending_for(tg_id).await?;
        for (kind, due) in lifecycle_slots(expires_at) {
            if due > now {
                self.scheduler.enqueue(tg_id, kind, due, tier.as_str()).await?;
            }
        }

        let mut invite_links = Vec::new();
        let mut failed_channels = Vec::new();
        for channel in self.config.channels_for(tier) {
            match self.gateway.create_invite(channel, INVITE_TTL, 1).await {
                Some(link) => {
                    self.notifier
                        .send(
                            tg_id,
                            &format!("Your invite link (valid 24 hours, single use):\n{}", link),
                        )
                        .await;
                    invite_links.push(link);
                }
                None => {
                    self.notifier
                        .send(
                            tg_id,
                            "Could not create your invite link. Please contact an admin.",
                        )
                        .await;
                    failed_channels.push(channel);
                }
            }
        }
        info!(
            "activated {} subscription for {} until {}",
            tier.as_str(),
            tg_id,
            expires_at
        );
        Ok(Activation {
            expires_at,
            invite_links,
            failed_channels,
        })
    }

    /// Removes the user from their channels and marks the row expired.
    /// Returns false when there was nothing active to expire.
    pub async fn expire(&self, tg_id: i64) -> Result<bool> {
        let Some(mut sub) = self
            .store
            .find_by::<Subscription, _>(|s| s.telegram_id == tg_id)
            .await?
        else {
            return Ok(false);
        };
        if sub.value.status != "active" {
            return Ok(false);
        }
        for channel in self.config.channels_for(sub.value.tier) {
            if self.gateway.is_member(channel, tg_id).await {
                self.gateway.remove_member(channel, tg_id).await;
            }
        }
        sub.value.status = "expired".to_string();
        self.store.update(sub.row_index, &sub.value).await?;
        self.notifier
            .send(
                tg_id,
                "Your subscription has expired. Open Buy Subscription to renew your access.",
            )
            .await;
        info!("expired subscription for {}", tg_id);
        Ok(true)
    }

    /// Creates the 10-minute test-channel invite and schedules the removal.
    /// `None` when the test channel is not configured or the invite failed.
    pub async fn grant_trial(&self, tg_id: i64) -> Result<Option<String>> {
        let Some(channel) = self.config.test_channel_id else {
            return Ok(None);
        };
        let Some(link) = self.gateway.create_invite(channel, TRIAL_TTL, 1).await else {
            return Ok(None);
        };
        let due = Utc::now() + Duration::seconds(TRIAL_TTL.as_secs() as i64);
        self.scheduler
            .enqueue(tg_id, JobKind::TrialKick, due, "trial")
            .await?;
        Ok(Some(link))
    }

    /// One sweep of the durable job table. Returns how many jobs fired.
    pub async fn run_due_jobs(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut fired = 0;
        for mut job in self.scheduler.due_jobs(now).await? {
            let tg_id = job.value.telegram_id;
            match job.value.kind {
                JobKind::Expire => {
                    if let Err(e) = self.expire(tg_id).await {
                        // Left pending; the next sweep retries.
                        warn!("expire job for {} failed: {:#}", tg_id, e);
                        continue;
                    }
                }
                JobKind::Remind7d => self.remind(tg_id, 7).await,
                JobKind::Remind3d => self.remind(tg_id, 3).await,
                JobKind::Remind1d => self.remind(tg_id, 1).await,
                JobKind::TrialKick => {
                    if let Some(channel) = self.config.test_channel_id {
                        if self.gateway.is_member(channel, tg_id).await {
                            self.gateway.remove_member(channel, tg_id).await;
                        }
                    }
                    self.notifier
                        .send(
                            tg_id,
                            "Your test access has ended. Open Buy Subscription to keep going.",
                        )
                        .await;
                }
            }
            self.scheduler.mark_done(&mut job).await?;
            fired += 1;
        }
        Ok(fired)
    }

    async fn remind(&self, tg_id: i64, days_left: i64) {
        let plural = if days_left == 1 { "day" } else { "days" };
        self.notifier
            .send(
                tg_id,
                &format!(
                    "Your subscription expires in {} {}. Renew from the menu to keep your access.",
                    days_left, plural
                ),
            )
            .await;
    }

    /// Startup pass: expire anything already past due, and re-enqueue
    /// lifecycle jobs lost before the durable table existed.
    pub async fn reconcile_on_startup(&self) -> Result<()> {
        let now = Utc::now();
        for sub in self.store.scan::<Subscription>().await? {
            if sub.value.status != "active" {
                continue;
            }
            let tg_id = sub.value.telegram_id;
            match sub.value.expires_at {
                Some(expires_at) if expires_at <= now => {
                    self.scheduler.cancel_pending_for(tg_id).await?;
                    self.expire(tg_id).await?;
                }
                Some(expires_at) => {
                    let pending = self.scheduler.pending_kinds_for(tg_id).await?;
                    for (kind, due) in lifecycle_slots(expires_at) {
                        if due > now && !pending.contains(&kind) {
                            self.scheduler
                                .enqueue(tg_id, kind, due, sub.value.tier.as_str())
                                .await?;
                        }
                    }
                }
                None => {}
            }
        }
        Ok(())
    }

    pub async fn active_subscribers(&self) -> Result<Vec<i64>> {
        let now = Utc::now();
        Ok(self
            .store
            .scan::<Subscription>()
            .await?
            .into_iter()
            .filter(|s| s.value.is_active_at(now))
            .map(|s| s.value.telegram_id)
            .collect())
    }
}
