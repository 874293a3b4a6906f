use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use crate::config::Config;
use crate::gateway::Notifier;
use crate::models::{fmt_usd, Purchase, Withdrawal};
use crate::services::purchase_service::PurchaseService;
use crate::services::subscription_service::SubscriptionService;
use crate::services::ticket_service::TicketService;
use crate::services::withdrawal_service::WithdrawalService;
use crate::sheets::table::Store;

pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Periodic sheet sweep. Admins can drive the workflow without Telegram by
/// typing into the `admin_action` column or a ticket's response cell; this
/// pass picks those up, pings admins about new pending rows, and fires due
/// scheduled jobs.
#[derive(Clone)]
pub struct Reconciler {
    store: Store,
    config: Arc<Config>,
    purchases: PurchaseService,
    subs: SubscriptionService,
    withdrawals: WithdrawalService,
    tickets: TicketService,
    notifier: Arc<dyn Notifier>,
}

impl Reconciler {
    pub fn new(
        store: Store,
        config: Arc<Config>,
        purchases: PurchaseService,
        subs: SubscriptionService,
        withdrawals: WithdrawalService,
        tickets: TicketService,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            config,
            purchases,
            subs,
            withdrawals,
            tickets,
            notifier,
        }
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = self.run_once().await {
                warn!("reconciliation pass failed: {:#}", e);
            }
        }
    }

    pub async fn run_once(&self) -> Result<()> {
        self.sweep_purchases().await?;
        self.sweep_withdrawals().await?;
        self.sweep_tickets().await?;
        let fired = self.subs.run_due_jobs(Utc::now()).await?;
        if fired > 0 {
            info!("fired {} scheduled jobs", fired);
        }
        Ok(())
    }

    async fn sweep_purchases(&self) -> Result<()> {
        for keyed in self.store.scan::<Purchase>().await? {
            let p = &keyed.value;
            // Only pending rows react to the action column; trial rows and
            // anything already handled stay untouched.
            if p.is_processed() || p.status != "pending" {
                continue;
            }
            match p.admin_action.trim().to_lowercase().as_str() {
                "approve" => {
                    info!("sheet-driven approve of purchase {}", p.purchase_id);
                    self.purchases.approve(&p.purchase_id, 0).await?;
                }
                "reject" => {
                    info!("sheet-driven reject of purchase {}", p.purchase_id);
                    self.purchases.reject(&p.purchase_id, 0).await?;
                }
                _ => {
                    if !p.is_admin_notified() {
                        self.notify_admins(&format!(
                            "Pending purchase {}\nuser: {} (@{})\nproduct: {}\namount: ${}\nproof: {}\n\
                             Use /approve {} or /reject {}",
                            p.purchase_id,
                            p.telegram_id,
                            p.username,
                            p.product.label(),
                            fmt_usd(p.amount_usd),
                            if p.transaction_id.is_empty() { "-" } else { &p.transaction_id },
                            p.purchase_id,
                            p.purchase_id
                        ))
                        .await;
                        self.purchases.mark_admin_notified(&p.purchase_id).await?;
                    }
                }
            }
        }
        Ok(())
    }

    async fn sweep_withdrawals(&self) -> Result<()> {
        for keyed in self.store.scan::<Withdrawal>().await? {
            let w = &keyed.value;
            if w.status != "pending" {
                continue;
            }
            match w.admin_action.trim().to_lowercase().as_str() {
                "complete" => {
                    info!("sheet-driven complete of withdrawal {}", w.withdrawal_id);
                    self.withdrawals.complete(&w.withdrawal_id, 0, "").await?;
                }
                "reject" => {
                    info!("sheet-driven reject of withdrawal {}", w.withdrawal_id);
                    self.withdrawals.reject(&w.withdrawal_id, 0).await?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    async fn sweep_tickets(&self) -> Result<()> {
        for ticket in self.tickets.open_tickets().await? {
            if !ticket.value.response.trim().is_empty() {
                let response = ticket.value.response.clone();
                self.tickets.deliver_response(ticket, &response).await?;
            }
        }
        Ok(())
    }

    async fn notify_admins(&self, text: &str) {
        for admin in &self.config.admin_ids {
            self.notifier.send(*admin, text).await;
        }
    }
}
