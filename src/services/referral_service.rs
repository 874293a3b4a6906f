use std::sync::Arc;

use anyhow::Result;
use chrono::{Datelike, Utc};
use tracing::info;

use crate::config::Config;
use crate::gateway::Notifier;
use crate::models::{fmt_usd, ActiveBoost, ReferralEntry, User};
use crate::services::promo_service::PromoService;
use crate::services::user_service::UserService;
use crate::sheets::table::Store;

/// Two-level commission engine over the append-only Referrals ledger.
#[derive(Clone)]
pub struct ReferralService {
    store: Store,
    config: Arc<Config>,
    users: UserService,
    promos: PromoService,
    notifier: Arc<dyn Notifier>,
}

/// Wallet and ledger figures behind the wallet menu and the monthly report.
pub struct EarningsSummary {
    pub total_usd: f64,
    pub month_usd: f64,
    pub level1_count: usize,
    pub level2_count: usize,
}

pub enum BoostOutcome {
    Applied(ActiveBoost),
    AlreadyBoosted,
    Invalid,
}

impl ReferralService {
    pub fn new(
        store: Store,
        config: Arc<Config>,
        users: UserService,
        promos: PromoService,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            config,
            users,
            promos,
            notifier,
        }
    }

    /// Pays out up to two levels of commission for an approved purchase.
    /// Level 1 is the buyer's referrer, level 2 that referrer's own referrer
    /// unless it loops back to the buyer. Returns how many levels were paid.
    pub async fn process_commission(
        &self,
        purchase_id: &str,
        buyer_id: i64,
        amount_usd: f64,
    ) -> Result<u8> {
        let Some(buyer) = self.users.find(buyer_id).await? else {
            return Ok(0);
        };
        let Some(level1_id) = buyer.value.referred_by else {
            return Ok(0);
        };
        let Some(level1) = self.users.find(level1_id).await? else {
            return Ok(0);
        };

        let rate1 = level1
            .value
            .active_boost
            .as_ref()
            .map(|b| b.level1_percent)
            .unwrap_or(self.config.level1_percent);
        self.pay(purchase_id, &level1.value, buyer_id, 1, amount_usd * rate1 / 100.0)
            .await?;
        let mut levels = 1;

        if let Some(level2_id) = level1.value.referred_by {
            // Cycle guard: the buyer never earns from their own purchase.
            if level2_id != buyer_id {
                if let Some(level2) = self.users.find(level2_id).await? {
                    let rate2 = level2
                        .value
                        .active_boost
                        .as_ref()
                        .map(|b| b.level2_percent)
                        .unwrap_or(self.config.level2_percent);
                    self.pay(purchase_id, &level2.value, buyer_id, 2, amount_usd * rate2 / 100.0)
                        .await?;
                    levels = 2;
                }
            }
        }
        Ok(levels)
    }

    async fn pay(
        &self,
        purchase_id: &str,
        referrer: &User,
        referred_id: i64,
        level: u8,
        commission_usd: f64,
    ) -> Result<()> {
        self.users
            .adjust_balance(referrer.telegram_id, commission_usd)
            .await?;
        self.store
            .insert(&ReferralEntry::paid(
                referrer.telegram_id,
                referred_id,
                level,
                commission_usd,
                purchase_id,
            ))
            .await?;
        self.notifier
            .send(
                referrer.telegram_id,
                &format!(
                    "You earned ${} commission (level {}) from a referral purchase.",
                    fmt_usd(commission_usd),
                    level
                ),
            )
            .await;
        info!(
            "paid ${} level-{} commission to {} for purchase {}",
            fmt_usd(commission_usd),
            level,
            referrer.telegram_id,
            purchase_id
        );
        Ok(())
    }

    /// Redeems a boost code into the user's active_boost field. One boost
    /// per user, ever.
    pub async fn redeem_boost(&self, tg_id: i64, code: &str) -> Result<BoostOutcome> {
        let Some(user) = self.users.find(tg_id).await? else {
            return Ok(BoostOutcome::Invalid);
        };
        if user.value.active_boost.is_some() {
            return Ok(BoostOutcome::AlreadyBoosted);
        }
        let Some(boost) = self.promos.validate_boost(code).await? else {
            return Ok(BoostOutcome::Invalid);
        };
        self.promos.consume_boost(&boost.code).await?;
        let active = ActiveBoost {
            code: boost.code.clone(),
            level1_percent: boost.level1_percent,
            level2_percent: boost.level2_percent,
        };
        self.users.set_boost(tg_id, active.clone()).await?;
        info!("boost {} applied to user {}", boost.code, tg_id);
        Ok(BoostOutcome::Applied(active))
    }

    pub async fn earnings_summary(&self, tg_id: i64) -> Result<EarningsSummary> {
        let now = Utc::now();
        let mut summary = EarningsSummary {
            total_usd: 0.0,
            month_usd: 0.0,
            level1_count: 0,
            level2_count: 0,
        };
        for entry in self.store.scan::<ReferralEntry>().await? {
            let e = entry.value;
            if e.referrer_id != tg_id {
                continue;
            }
            summary.total_usd += e.commission_usd;
            if e.created_at
                .map(|t| t.year() == now.year() && t.month() == now.month())
                .unwrap_or(false)
            {
                summary.month_usd += e.commission_usd;
            }
            match e.level {
                1 => summary.level1_count += 1,
                _ => summary.level2_count += 1,
            }
        }
        Ok(summary)
    }
}
