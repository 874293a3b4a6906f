use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::info;

use crate::config::Config;
use crate::gateway::Notifier;
use crate::models::{fmt_usd, generate_id, PayMethod, Withdrawal};
use crate::services::user_service::UserService;
use crate::sheets::table::{Keyed, Store};

/// Wallet payouts. The balance is checked at request time but only debited
/// when an admin completes the payout, so a rejection leaves it untouched.
#[derive(Clone)]
pub struct WithdrawalService {
    store: Store,
    config: Arc<Config>,
    users: UserService,
    notifier: Arc<dyn Notifier>,
}

pub enum RequestOutcome {
    Created(Withdrawal),
    BelowMinimum { minimum_usd: f64 },
    InsufficientBalance { balance_usd: f64 },
}

pub enum ProcessOutcome {
    Done,
    AlreadyProcessed,
    NotFound,
}

impl WithdrawalService {
    pub fn new(
        store: Store,
        config: Arc<Config>,
        users: UserService,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            config,
            users,
            notifier,
        }
    }

    pub async fn find(&self, withdrawal_id: &str) -> Result<Option<Keyed<Withdrawal>>> {
        Ok(self
            .store
            .find_by::<Withdrawal, _>(|w| w.withdrawal_id == withdrawal_id)
            .await?)
    }

    pub async fn request(
        &self,
        tg_id: i64,
        amount_usd: f64,
        method: PayMethod,
        destination: &str,
    ) -> Result<RequestOutcome> {
        if amount_usd < self.config.min_withdrawal_usd {
            return Ok(RequestOutcome::BelowMinimum {
                minimum_usd: self.config.min_withdrawal_usd,
            });
        }
        let balance = self
            .users
            .find(tg_id)
            .await?
            .map(|u| u.value.wallet_balance)
            .unwrap_or(0.0);
        if amount_usd > balance {
            return Ok(RequestOutcome::InsufficientBalance {
                balance_usd: balance,
            });
        }
        let withdrawal = Withdrawal {
            withdrawal_id: generate_id('W'),
            telegram_id: tg_id,
            amount_usd,
            method,
            destination: destination.trim().to_string(),
            status: "pending".to_string(),
            admin_action: String::new(),
            requested_at: Some(Utc::now()),
            processed_at: None,
            processed_by: String::new(),
            notes: String::new(),
        };
        self.store.insert(&withdrawal).await?;
        info!(
            "withdrawal {} requested: {} ${}",
            withdrawal.withdrawal_id,
            tg_id,
            fmt_usd(amount_usd)
        );
        Ok(RequestOutcome::Created(withdrawal))
    }

    /// Marks the payout completed and debits the wallet.
    pub async fn complete(
        &self,
        withdrawal_id: &str,
        processed_by: i64,
        txid: &str,
    ) -> Result<ProcessOutcome> {
        let Some(mut keyed) = self.find(withdrawal_id).await? else {
            return Ok(ProcessOutcome::NotFound);
        };
        if keyed.value.status != "pending" {
            return Ok(ProcessOutcome::AlreadyProcessed);
        }
        keyed.value.status = "completed".to_string();
        keyed.value.processed_at = Some(Utc::now());
        keyed.value.processed_by = processed_by.to_string();
        keyed.value.admin_action = String::new();
        if !txid.is_empty() {
            keyed.value.notes = format!("txid: {}", txid);
        }
        self.store.update(keyed.row_index, &keyed.value).await?;
        self.users
            .adjust_balance(keyed.value.telegram_id, -keyed.value.amount_usd)
            .await?;
        self.notifier
            .send(
                keyed.value.telegram_id,
                &format!(
                    "Your withdrawal of ${} has been paid out.",
                    fmt_usd(keyed.value.amount_usd)
                ),
            )
            .await;
        info!("withdrawal {} completed by {}", withdrawal_id, processed_by);
        Ok(ProcessOutcome::Done)
    }

    pub async fn reject(&self, withdrawal_id: &str, processed_by: i64) -> Result<ProcessOutcome> {
        let Some(mut keyed) = self.find(withdrawal_id).await? else {
            return Ok(ProcessOutcome::NotFound);
        };
        if keyed.value.status != "pending" {
            return Ok(ProcessOutcome::AlreadyProcessed);
        }
        keyed.value.status = "rejected".to_string();
        keyed.value.processed_at = Some(Utc::now());
        keyed.value.processed_by = processed_by.to_string();
        keyed.value.admin_action = String::new();
        self.store.update(keyed.row_index, &keyed.value).await?;
        self.notifier
            .send(
                keyed.value.telegram_id,
                "Your withdrawal request was rejected. Contact support for details.",
            )
            .await;
        info!("withdrawal {} rejected by {}", withdrawal_id, processed_by);
        Ok(ProcessOutcome::Done)
    }
}
