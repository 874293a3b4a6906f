use std::sync::Arc;

use crate::config::Config;
use crate::gateway::{MembershipGateway, Notifier};
use crate::pricing::PriceFeed;
use crate::services::promo_service::PromoService;
use crate::services::purchase_service::PurchaseService;
use crate::services::reconciler::Reconciler;
use crate::services::referral_service::ReferralService;
use crate::services::scheduler::Scheduler;
use crate::services::subscription_service::SubscriptionService;
use crate::services::ticket_service::TicketService;
use crate::services::user_service::UserService;
use crate::services::withdrawal_service::WithdrawalService;
use crate::session::SessionStore;
use crate::sheets::table::Store;

/// Everything the handlers need, cloned into each dispatch branch.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Store,
    pub sessions: SessionStore,
    pub users: UserService,
    pub subs: SubscriptionService,
    pub purchases: PurchaseService,
    pub referrals: ReferralService,
    pub promos: PromoService,
    pub withdrawals: WithdrawalService,
    pub tickets: TicketService,
    pub notifier: Arc<dyn Notifier>,
    pub bot_username: String,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        store: Store,
        notifier: Arc<dyn Notifier>,
        gateway: Arc<dyn MembershipGateway>,
        bot_username: String,
    ) -> Self {
        let pricing = PriceFeed::new(config.price_feed_url.clone(), config.usd_irr_fallback);
        let scheduler = Scheduler::new(store.clone());
        let users = UserService::new(store.clone());
        let promos = PromoService::new(store.clone());
        let subs = SubscriptionService::new(
            store.clone(),
            config.clone(),
            scheduler,
            gateway,
            notifier.clone(),
        );
        let referrals = ReferralService::new(
            store.clone(),
            config.clone(),
            users.clone(),
            promos.clone(),
            notifier.clone(),
        );
        let purchases = PurchaseService::new(
            store.clone(),
            config.clone(),
            pricing,
            users.clone(),
            subs.clone(),
            referrals.clone(),
            promos.clone(),
            notifier.clone(),
            bot_username.clone(),
        );
        let withdrawals = WithdrawalService::new(
            store.clone(),
            config.clone(),
            users.clone(),
            notifier.clone(),
        );
        let tickets = TicketService::new(store.clone(), notifier.clone());
        Self {
            config,
            store,
            sessions: SessionStore::new(),
            users,
            subs,
            purchases,
            referrals,
            promos,
            withdrawals,
            tickets,
            notifier,
            bot_username,
        }
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(
            self.store.clone(),
            self.config.clone(),
            self.purchases.clone(),
            self.subs.clone(),
            self.withdrawals.clone(),
            self.tickets.clone(),
            self.notifier.clone(),
        )
    }
}
