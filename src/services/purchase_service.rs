use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::Config;
use crate::gateway::Notifier;
use crate::models::{
    fmt_usd, generate_id, PayMethod, Product, Purchase, Subscription, Ticket, Tier, User,
    NOTIFIED_MARKER, PROCESSED_MARKER,
};
use crate::pricing::PriceFeed;
use crate::services::promo_service::PromoService;
use crate::services::referral_service::ReferralService;
use crate::services::subscription_service::SubscriptionService;
use crate::services::user_service::UserService;
use crate::sheets::table::{Keyed, Store};

/// Purchase workflow: pending rows created at checkout, approved or
/// rejected exactly once (guarded by a processed marker in notes), with
/// activation, gift minting, and commissions as approval side effects.
#[derive(Clone)]
pub struct PurchaseService {
    store: Store,
    config: Arc<Config>,
    pricing: PriceFeed,
    users: UserService,
    subs: SubscriptionService,
    referrals: ReferralService,
    promos: PromoService,
    notifier: Arc<dyn Notifier>,
    bot_username: String,
}

pub enum ApproveOutcome {
    Activated {
        tier: Tier,
        expires_at: DateTime<Utc>,
    },
    GiftMinted {
        code: String,
        deep_link: String,
    },
    AlreadyProcessed,
    NotFound,
}

pub enum RejectOutcome {
    Rejected,
    AlreadyProcessed,
    NotFound,
}

pub enum TrialOutcome {
    Granted { invite_link: String },
    AlreadyUsed,
    Unavailable,
}

pub enum GiftRedeemOutcome {
    Activated {
        tier: Tier,
        expires_at: DateTime<Utc>,
    },
    Invalid,
}

pub struct Stats {
    pub users: usize,
    pub active_subscriptions: usize,
    pub pending_purchases: usize,
    pub approved_purchases: usize,
    pub revenue_usd: f64,
    pub open_tickets: usize,
}

impl PurchaseService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Store,
        config: Arc<Config>,
        pricing: PriceFeed,
        users: UserService,
        subs: SubscriptionService,
        referrals: ReferralService,
        promos: PromoService,
        notifier: Arc<dyn Notifier>,
        bot_username: String,
    ) -> Self {
        Self {
            store,
            config,
            pricing,
            users,
            subs,
            referrals,
            promos,
            notifier,
            bot_username,
        }
    }

    pub async fn find(&self, purchase_id: &str) -> Result<Option<Keyed<Purchase>>> {
        Ok(self
            .store
            .find_by::<Purchase, _>(|p| p.purchase_id == purchase_id)
            .await?)
    }

    /// Creates the pending row for a checkout. The discount percent has
    /// already been validated and consumed by the caller.
    pub async fn create_purchase(
        &self,
        tg_id: i64,
        username: &str,
        product: Product,
        method: PayMethod,
        discount_percent: f64,
    ) -> Result<Purchase> {
        let base = self.config.price_for(product);
        let amount_usd = base * (100.0 - discount_percent) / 100.0;
        let amount_irr = match method {
            PayMethod::Card => self.pricing.usd_to_irr(amount_usd).await,
            PayMethod::Usdt => 0.0,
        };
        let purchase = Purchase {
            purchase_id: generate_id('P'),
            telegram_id: tg_id,
            username: username.to_string(),
            product,
            amount_usd,
            amount_irr,
            payment_method: method.as_str().to_string(),
            transaction_id: String::new(),
            status: "pending".to_string(),
            admin_action: String::new(),
            created_at: Some(Utc::now()),
            approved_at: None,
            approved_by: String::new(),
            notes: if discount_percent > 0.0 {
                format!("discount {}%", discount_percent)
            } else {
                String::new()
            },
        };
        self.store.insert(&purchase).await?;
        info!(
            "purchase {} created: {} {} ${}",
            purchase.purchase_id,
            tg_id,
            product.as_str(),
            fmt_usd(amount_usd)
        );
        Ok(purchase)
    }

    /// Records the transaction id or receipt photo reference on the row.
    pub async fn attach_proof(&self, purchase_id: &str, proof: &str) -> Result<Option<Purchase>> {
        let Some(mut keyed) = self.find(purchase_id).await? else {
            return Ok(None);
        };
        keyed.value.transaction_id = proof.to_string();
        self.store.update(keyed.row_index, &keyed.value).await?;
        Ok(Some(keyed.value))
    }

    /// Flags the row so the reconciliation pass does not ping the admin a
    /// second time.
    pub async fn mark_admin_notified(&self, purchase_id: &str) -> Result<()> {
        if let Some(mut keyed) = self.find(purchase_id).await? {
            if !keyed.value.is_admin_notified() {
                append_note(&mut keyed.value.notes, NOTIFIED_MARKER);
                self.store.update(keyed.row_index, &keyed.value).await?;
            }
        }
        Ok(())
    }

    /// Approves a purchase: marks the row, then activates the subscription
    /// or mints a gift card, and pays referral commissions. The processed
    /// marker makes a second approve (button, command, or reconciliation)
    /// a no-op.
    pub async fn approve(&self, purchase_id: &str, approved_by: i64) -> Result<ApproveOutcome> {
        let Some(mut keyed) = self.find(purchase_id).await? else {
            return Ok(ApproveOutcome::NotFound);
        };
        if keyed.value.is_processed() {
            return Ok(ApproveOutcome::AlreadyProcessed);
        }
        keyed.value.status = "approved".to_string();
        keyed.value.approved_at = Some(Utc::now());
        keyed.value.approved_by = approved_by.to_string();
        keyed.value.admin_action = String::new();
        append_note(&mut keyed.value.notes, PROCESSED_MARKER);
        self.store.update(keyed.row_index, &keyed.value).await?;

        let purchase = keyed.value.clone();
        if purchase.product.is_gift() {
            let card = self
                .promos
                .mint_gift(purchase.product, purchase.telegram_id)
                .await?;
            let deep_link = format!("https://t.me/{}?start=gift_{}", self.bot_username, card.code);
            self.notifier
                .send(
                    purchase.telegram_id,
                    &format!(
                        "Your gift purchase was approved! Send this link to the recipient:\n{}",
                        deep_link
                    ),
                )
                .await;
            return Ok(ApproveOutcome::GiftMinted {
                code: card.code,
                deep_link,
            });
        }

        let tier = purchase.product.tier();
        let activation = self
            .subs
            .activate(
                purchase.telegram_id,
                &purchase.username,
                tier,
                &purchase.payment_method,
            )
            .await?;
        if !activation.failed_channels.is_empty() {
            // Approval stands; the failure is recorded for manual follow-up.
            warn!(
                "invite creation failed for purchase {} on channels {:?}",
                purchase_id, activation.failed_channels
            );
            if let Some(mut keyed) = self.find(purchase_id).await? {
                append_note(
                    &mut keyed.value.notes,
                    &format!("invite failed: {:?}", activation.failed_channels),
                );
                self.store.update(keyed.row_index, &keyed.value).await?;
            }
        }

        if let Err(e) = self
            .referrals
            .process_commission(purchase_id, purchase.telegram_id, purchase.amount_usd)
            .await
        {
            warn!("commission for purchase {} failed: {:#}", purchase_id, e);
        }

        if let Some(user) = self.users.find(purchase.telegram_id).await? {
            self.notifier
                .send(
                    purchase.telegram_id,
                    &format!(
                        "Payment approved, your subscription is active!\n\
                         Your referral code: {}\n\
                         Share it with friends and earn commission on their purchases.",
                        user.value.referral_code
                    ),
                )
                .await;
        }
        info!(
            "purchase {} approved by {} ({} invites sent)",
            purchase_id,
            approved_by,
            activation.invite_links.len()
        );
        Ok(ApproveOutcome::Activated {
            tier,
            expires_at: activation.expires_at,
        })
    }

    pub async fn reject(&self, purchase_id: &str, rejected_by: i64) -> Result<RejectOutcome> {
        let Some(mut keyed) = self.find(purchase_id).await? else {
            return Ok(RejectOutcome::NotFound);
        };
        if keyed.value.is_processed() {
            return Ok(RejectOutcome::AlreadyProcessed);
        }
        keyed.value.status = "rejected".to_string();
        keyed.value.approved_at = Some(Utc::now());
        keyed.value.approved_by = rejected_by.to_string();
        keyed.value.admin_action = String::new();
        append_note(&mut keyed.value.notes, PROCESSED_MARKER);
        self.store.update(keyed.row_index, &keyed.value).await?;
        self.notifier
            .send(
                keyed.value.telegram_id,
                "Your payment could not be verified and was rejected. \
                 Contact support if you believe this is a mistake.",
            )
            .await;
        info!("purchase {} rejected by {}", purchase_id, rejected_by);
        Ok(RejectOutcome::Rejected)
    }

    /// Free trial: one per user, ever. Records a `test` purchase row so the
    /// check survives restarts.
    pub async fn start_trial(&self, tg_id: i64, username: &str) -> Result<TrialOutcome> {
        let already = self
            .store
            .find_by::<Purchase, _>(|p| {
                p.telegram_id == tg_id
                    && p.product == Product::Trial
                    && (p.status == "test" || p.status == "approved")
            })
            .await?
            .is_some();
        if already {
            return Ok(TrialOutcome::AlreadyUsed);
        }
        let Some(invite_link) = self.subs.grant_trial(tg_id).await? else {
            return Ok(TrialOutcome::Unavailable);
        };
        let purchase = Purchase {
            purchase_id: generate_id('P'),
            telegram_id: tg_id,
            username: username.to_string(),
            product: Product::Trial,
            amount_usd: 0.0,
            amount_irr: 0.0,
            payment_method: String::new(),
            transaction_id: String::new(),
            status: "test".to_string(),
            admin_action: String::new(),
            created_at: Some(Utc::now()),
            approved_at: None,
            approved_by: String::new(),
            notes: String::new(),
        };
        self.store.insert(&purchase).await?;
        info!("trial granted to {}", tg_id);
        Ok(TrialOutcome::Granted { invite_link })
    }

    /// `/start gift_<code>`: activates the gifted tier for the redeemer and
    /// retroactively credits the gift buyer as referrer when none is set.
    pub async fn redeem_gift(
        &self,
        code: &str,
        redeemer_id: i64,
        username: &str,
    ) -> Result<GiftRedeemOutcome> {
        let Some(card) = self.promos.find_gift(code).await? else {
            return Ok(GiftRedeemOutcome::Invalid);
        };
        if !card.value.is_redeemable() {
            return Ok(GiftRedeemOutcome::Invalid);
        }
        let tier = card.value.product.tier();
        let buyer_id = card.value.purchased_by;
        let activation = self.subs.activate(redeemer_id, username, tier, "gift").await?;
        self.promos.mark_gift_redeemed(card, redeemer_id).await?;
        if buyer_id != redeemer_id {
            self.users.set_referred_by(redeemer_id, buyer_id).await?;
        }
        info!("gift {} redeemed by {}", code, redeemer_id);
        Ok(GiftRedeemOutcome::Activated {
            tier,
            expires_at: activation.expires_at,
        })
    }

    pub async fn stats(&self) -> Result<Stats> {
        let now = Utc::now();
        let users = self.store.scan::<User>().await?.len();
        let active_subscriptions = self
            .store
            .scan::<Subscription>()
            .await?
            .iter()
            .filter(|s| s.value.is_active_at(now))
            .count();
        let purchases = self.store.scan::<Purchase>().await?;
        let pending_purchases = purchases
            .iter()
            .filter(|p| p.value.status == "pending")
            .count();
        let approved: Vec<_> = purchases
            .iter()
            .filter(|p| p.value.status == "approved")
            .collect();
        let revenue_usd = approved.iter().map(|p| p.value.amount_usd).sum();
        let open_tickets = self
            .store
            .scan::<Ticket>()
            .await?
            .iter()
            .filter(|t| t.value.status == "open")
            .count();
        Ok(Stats {
            users,
            active_subscriptions,
            pending_purchases,
            approved_purchases: approved.len(),
            revenue_usd,
            open_tickets,
        })
    }
}

fn append_note(notes: &mut String, extra: &str) {
    if notes.is_empty() {
        notes.push_str(extra);
    } else {
        notes.push(' ');
        notes.push_str(extra);
    }
}
