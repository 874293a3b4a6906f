use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::config::test_config;
use crate::gateway::{MembershipGateway, Notifier};
use crate::models::{PayMethod, Product, Purchase, Subscription, Tier};
use crate::services::purchase_service::{ApproveOutcome, GiftRedeemOutcome, TrialOutcome};
use crate::services::referral_service::BoostOutcome;
use crate::services::withdrawal_service::{ProcessOutcome, RequestOutcome};
use crate::sheets::table::{MemoryBackend, Store};
use crate::state::AppState;

#[derive(Default)]
struct RecordingNotifier {
    messages: Mutex<Vec<(i64, String)>>,
}

impl RecordingNotifier {
    fn sent_to(&self, tg_id: i64) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == tg_id)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, tg_id: i64, text: &str) {
        self.messages
            .lock()
            .unwrap()
            .push((tg_id, text.to_string()));
    }
}

#[derive(Default)]
struct RecordingGateway {
    invites_created: AtomicUsize,
    removals: Mutex<Vec<(i64, i64)>>,
    fail_invites: AtomicBool,
}

#[async_trait]
impl MembershipGateway for RecordingGateway {
    async fn is_member(&self, _channel: i64, _user_id: i64) -> bool {
        true
    }

    async fn create_invite(
        &self,
        channel: i64,
        _ttl: StdDuration,
        _member_limit: u32,
    ) -> Option<String> {
        if self.fail_invites.load(Ordering::SeqCst) {
            return None;
        }
        let n = self.invites_created.fetch_add(1, Ordering::SeqCst);
        Some(format!("https://t.me/+invite{}for{}", n, channel))
    }

    async fn remove_member(&self, channel: i64, user_id: i64) -> bool {
        self.removals.lock().unwrap().push((channel, user_id));
        true
    }
}

struct Harness {
    state: AppState,
    notifier: Arc<RecordingNotifier>,
    gateway: Arc<RecordingGateway>,
}

fn harness() -> Harness {
    let notifier = Arc::new(RecordingNotifier::default());
    let gateway = Arc::new(RecordingGateway::default());
    let store = Store::new(Arc::new(MemoryBackend::new()));
    let state = AppState::new(
        Arc::new(test_config()),
        store,
        notifier.clone(),
        gateway.clone(),
        "testbot".to_string(),
    );
    Harness {
        state,
        notifier,
        gateway,
    }
}

async fn register(h: &Harness, tg_id: i64, username: &str) {
    h.state
        .users
        .get_or_create(tg_id, username, username)
        .await
        .unwrap();
}

#[tokio::test]
async fn activation_is_idempotent() {
    let h = harness();
    register(&h, 10, "alice").await;
    h.state
        .subs
        .activate(10, "alice", Tier::Normal, "card")
        .await
        .unwrap();
    h.state
        .subs
        .activate(10, "alice", Tier::Premium, "usdt")
        .await
        .unwrap();
    let subs = h.state.store.scan::<Subscription>().await.unwrap();
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].value.tier, Tier::Premium);
    assert!(subs[0].value.is_active_at(Utc::now()));
}

#[tokio::test]
async fn commission_pays_two_levels_with_default_rates() {
    let h = harness();
    register(&h, 1, "grandma").await;
    register(&h, 2, "parent").await;
    register(&h, 3, "buyer").await;
    h.state.users.set_referred_by(2, 1).await.unwrap();
    h.state.users.set_referred_by(3, 2).await.unwrap();

    let levels = h
        .state
        .referrals
        .process_commission("P-TEST", 3, 100.0)
        .await
        .unwrap();
    assert_eq!(levels, 2);
    let parent = h.state.users.find(2).await.unwrap().unwrap();
    let grandma = h.state.users.find(1).await.unwrap().unwrap();
    assert!((parent.value.wallet_balance - 8.0).abs() < 1e-9);
    assert!((grandma.value.wallet_balance - 12.0).abs() < 1e-9);
}

#[tokio::test]
async fn commission_cycle_guard_stops_at_one_level() {
    let h = harness();
    register(&h, 1, "a").await;
    register(&h, 2, "b").await;
    // a referred b, b referred a: a's purchase must not pay a itself.
    h.state.users.set_referred_by(2, 1).await.unwrap();
    h.state.users.set_referred_by(1, 2).await.unwrap();

    let levels = h
        .state
        .referrals
        .process_commission("P-LOOP", 1, 50.0)
        .await
        .unwrap();
    assert_eq!(levels, 1);
    let a = h.state.users.find(1).await.unwrap().unwrap();
    assert_eq!(a.value.wallet_balance, 0.0);
}

#[tokio::test]
async fn no_referrer_means_no_commission() {
    let h = harness();
    register(&h, 5, "solo").await;
    let levels = h
        .state
        .referrals
        .process_commission("P-SOLO", 5, 10.0)
        .await
        .unwrap();
    assert_eq!(levels, 0);
}

#[tokio::test]
async fn boosted_rates_override_defaults() {
    let h = harness();
    register(&h, 1, "booster").await;
    register(&h, 2, "buyer").await;
    h.state.users.set_referred_by(2, 1).await.unwrap();
    h.state
        .promos
        .create_boost("VIP", 15.0, 25.0, 0, None, 1)
        .await
        .unwrap();
    assert!(matches!(
        h.state.referrals.redeem_boost(1, "vip").await.unwrap(),
        BoostOutcome::Applied(_)
    ));
    assert!(matches!(
        h.state.referrals.redeem_boost(1, "VIP").await.unwrap(),
        BoostOutcome::AlreadyBoosted
    ));

    h.state
        .referrals
        .process_commission("P-B", 2, 10.0)
        .await
        .unwrap();
    let booster = h.state.users.find(1).await.unwrap().unwrap();
    assert!((booster.value.wallet_balance - 1.5).abs() < 1e-9);
}

#[tokio::test]
async fn balance_never_goes_negative() {
    let h = harness();
    register(&h, 7, "deb").await;
    h.state.users.adjust_balance(7, 5.0).await.unwrap();
    let after = h.state.users.adjust_balance(7, -20.0).await.unwrap();
    assert_eq!(after, 0.0);
}

#[tokio::test]
async fn withdrawal_validation_and_completion() {
    let h = harness();
    register(&h, 9, "rich").await;
    h.state.users.adjust_balance(9, 25.0).await.unwrap();

    assert!(matches!(
        h.state
            .withdrawals
            .request(9, 5.0, PayMethod::Card, "6037")
            .await
            .unwrap(),
        RequestOutcome::BelowMinimum { .. }
    ));
    assert!(matches!(
        h.state
            .withdrawals
            .request(9, 100.0, PayMethod::Card, "6037")
            .await
            .unwrap(),
        RequestOutcome::InsufficientBalance { .. }
    ));

    let RequestOutcome::Created(w) = h
        .state
        .withdrawals
        .request(9, 20.0, PayMethod::Usdt, "TAddr")
        .await
        .unwrap()
    else {
        panic!("expected created");
    };
    // Requesting does not debit.
    let user = h.state.users.find(9).await.unwrap().unwrap();
    assert_eq!(user.value.wallet_balance, 25.0);

    assert!(matches!(
        h.state
            .withdrawals
            .complete(&w.withdrawal_id, 1, "tx123")
            .await
            .unwrap(),
        ProcessOutcome::Done
    ));
    let user = h.state.users.find(9).await.unwrap().unwrap();
    assert_eq!(user.value.wallet_balance, 5.0);

    // A second complete is a no-op.
    assert!(matches!(
        h.state
            .withdrawals
            .complete(&w.withdrawal_id, 1, "tx123")
            .await
            .unwrap(),
        ProcessOutcome::AlreadyProcessed
    ));
}

#[tokio::test]
async fn startup_reconcile_expires_exactly_once() {
    let h = harness();
    register(&h, 11, "old").await;
    let past = Utc::now() - Duration::days(1);
    h.state
        .store
        .insert(&Subscription {
            telegram_id: 11,
            username: "old".to_string(),
            tier: Tier::Normal,
            status: "active".to_string(),
            activated_at: Some(past - Duration::days(180)),
            expires_at: Some(past),
            payment_method: "card".to_string(),
        })
        .await
        .unwrap();

    h.state.subs.reconcile_on_startup().await.unwrap();
    assert_eq!(h.gateway.removals.lock().unwrap().len(), 1);

    h.state.subs.reconcile_on_startup().await.unwrap();
    assert_eq!(h.gateway.removals.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn reminders_fire_once_per_slot() {
    let h = harness();
    register(&h, 12, "timer").await;
    let activation = h
        .state
        .subs
        .activate(12, "timer", Tier::Normal, "card")
        .await
        .unwrap();

    let at = activation.expires_at - Duration::days(6);
    assert_eq!(h.state.subs.run_due_jobs(at).await.unwrap(), 1);
    assert_eq!(h.state.subs.run_due_jobs(at).await.unwrap(), 0);
}

#[tokio::test]
async fn discount_single_use_enforced() {
    let h = harness();
    assert!(h
        .state
        .promos
        .create_discount("SAVE50", 50.0, 1, Some(7), 1)
        .await
        .unwrap());
    // Case-insensitive duplicate rejected.
    assert!(!h
        .state
        .promos
        .create_discount("save50", 10.0, 0, None, 1)
        .await
        .unwrap());

    assert!(h
        .state
        .promos
        .validate_discount("save50")
        .await
        .unwrap()
        .is_some());
    h.state.promos.consume_discount("SAVE50").await.unwrap();
    assert!(h
        .state
        .promos
        .validate_discount("SAVE50")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn normal_purchase_round_trip() {
    let h = harness();
    register(&h, 1, "ref").await;
    register(&h, 2, "buyer").await;
    h.state.users.set_referred_by(2, 1).await.unwrap();

    let purchase = h
        .state
        .purchases
        .create_purchase(2, "buyer", Product::Normal, PayMethod::Card, 0.0)
        .await
        .unwrap();
    assert_eq!(purchase.amount_usd, 5.0);
    h.state
        .purchases
        .attach_proof(&purchase.purchase_id, "receipt-file-id")
        .await
        .unwrap();

    let outcome = h
        .state
        .purchases
        .approve(&purchase.purchase_id, 1)
        .await
        .unwrap();
    let ApproveOutcome::Activated { tier, expires_at } = outcome else {
        panic!("expected activation");
    };
    assert_eq!(tier, Tier::Normal);
    let days = (expires_at - Utc::now()).num_days();
    assert!((179..=180).contains(&days));

    // One invite for the normal channel only.
    assert_eq!(h.gateway.invites_created.load(Ordering::SeqCst), 1);

    // Referrer earned 8% of $5.
    let referrer = h.state.users.find(1).await.unwrap().unwrap();
    assert!((referrer.value.wallet_balance - 0.40).abs() < 1e-9);

    // Second approve is a no-op.
    assert!(matches!(
        h.state
            .purchases
            .approve(&purchase.purchase_id, 1)
            .await
            .unwrap(),
        ApproveOutcome::AlreadyProcessed
    ));
    assert_eq!(h.gateway.invites_created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invite_failure_does_not_roll_back_approval() {
    let h = harness();
    register(&h, 2, "buyer").await;
    h.gateway.fail_invites.store(true, Ordering::SeqCst);

    let purchase = h
        .state
        .purchases
        .create_purchase(2, "buyer", Product::Normal, PayMethod::Usdt, 0.0)
        .await
        .unwrap();
    let outcome = h
        .state
        .purchases
        .approve(&purchase.purchase_id, 1)
        .await
        .unwrap();
    assert!(matches!(outcome, ApproveOutcome::Activated { .. }));

    let sub = h
        .state
        .users
        .get_active_subscription(2)
        .await
        .unwrap();
    assert!(sub.is_some());
    let row = h
        .state
        .purchases
        .find(&purchase.purchase_id)
        .await
        .unwrap()
        .unwrap();
    assert!(row.value.notes.contains("invite failed"));
    assert!(h
        .notifier
        .sent_to(2)
        .iter()
        .any(|m| m.contains("contact an admin")));
}

#[tokio::test]
async fn gift_round_trip_with_retroactive_referrer() {
    let h = harness();
    register(&h, 2, "buyer").await;

    let purchase = h
        .state
        .purchases
        .create_purchase(2, "buyer", Product::GiftPremium, PayMethod::Usdt, 0.0)
        .await
        .unwrap();
    assert_eq!(purchase.amount_usd, 10.0);
    let ApproveOutcome::GiftMinted { code, deep_link } = h
        .state
        .purchases
        .approve(&purchase.purchase_id, 1)
        .await
        .unwrap()
    else {
        panic!("expected gift mint");
    };
    assert!(deep_link.contains("t.me/testbot?start=gift_"));
    // The buyer got a link, not a subscription.
    assert!(h
        .state
        .users
        .get_active_subscription(2)
        .await
        .unwrap()
        .is_none());

    register(&h, 3, "friend").await;
    let GiftRedeemOutcome::Activated { tier, .. } = h
        .state
        .purchases
        .redeem_gift(&code, 3, "friend")
        .await
        .unwrap()
    else {
        panic!("expected redemption");
    };
    assert_eq!(tier, Tier::Premium);
    // Premium grants both channels.
    assert_eq!(h.gateway.invites_created.load(Ordering::SeqCst), 2);

    let friend = h.state.users.find(3).await.unwrap().unwrap();
    assert_eq!(friend.value.referred_by, Some(2));

    // The card is spent.
    assert!(matches!(
        h.state.purchases.redeem_gift(&code, 4, "x").await.unwrap(),
        GiftRedeemOutcome::Invalid
    ));
}

#[tokio::test]
async fn trial_is_single_use() {
    let h = harness();
    register(&h, 20, "curious").await;
    let TrialOutcome::Granted { invite_link } =
        h.state.purchases.start_trial(20, "curious").await.unwrap()
    else {
        panic!("expected trial grant");
    };
    assert!(invite_link.contains("-100300") || invite_link.contains("invite"));

    assert!(matches!(
        h.state.purchases.start_trial(20, "curious").await.unwrap(),
        TrialOutcome::AlreadyUsed
    ));

    // The kick job fires after the trial window.
    let later = Utc::now() + Duration::minutes(11);
    assert_eq!(h.state.subs.run_due_jobs(later).await.unwrap(), 1);
    assert!(h
        .gateway
        .removals
        .lock()
        .unwrap()
        .contains(&(-100_300, 20)));
}

#[tokio::test]
async fn trial_kick_survives_purchase_during_trial() {
    let h = harness();
    register(&h, 21, "eager").await;
    assert!(matches!(
        h.state.purchases.start_trial(21, "eager").await.unwrap(),
        TrialOutcome::Granted { .. }
    ));

    // Buying mid-trial replaces the lifecycle jobs but not the kick.
    let purchase = h
        .state
        .purchases
        .create_purchase(21, "eager", Product::Normal, PayMethod::Usdt, 0.0)
        .await
        .unwrap();
    h.state
        .purchases
        .approve(&purchase.purchase_id, 1)
        .await
        .unwrap();

    let later = Utc::now() + Duration::minutes(11);
    h.state.subs.run_due_jobs(later).await.unwrap();
    assert!(h
        .gateway
        .removals
        .lock()
        .unwrap()
        .contains(&(-100_300, 21)));
    // The paid subscription itself is untouched.
    assert!(h
        .state
        .users
        .get_active_subscription(21)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn sheet_action_ignores_non_pending_rows() {
    let h = harness();
    register(&h, 22, "tester").await;
    assert!(matches!(
        h.state.purchases.start_trial(22, "tester").await.unwrap(),
        TrialOutcome::Granted { .. }
    ));

    // "approve" typed next to the trial row must not mint a subscription.
    let mut row = h
        .state
        .store
        .find_by::<Purchase, _>(|p| p.telegram_id == 22)
        .await
        .unwrap()
        .unwrap();
    row.value.admin_action = "approve".to_string();
    h.state.store.update(row.row_index, &row.value).await.unwrap();

    h.state.reconciler().run_once().await.unwrap();
    let row = h
        .state
        .store
        .find_by::<Purchase, _>(|p| p.telegram_id == 22)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.value.status, "test");
    assert!(h
        .state
        .users
        .get_active_subscription(22)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn reconciler_drives_sheet_actions_and_notifies_once() {
    let h = harness();
    register(&h, 2, "buyer").await;
    let purchase = h
        .state
        .purchases
        .create_purchase(2, "buyer", Product::Normal, PayMethod::Usdt, 0.0)
        .await
        .unwrap();

    let reconciler = h.state.reconciler();
    reconciler.run_once().await.unwrap();
    reconciler.run_once().await.unwrap();
    // Admin 1 pinged exactly once about the pending row.
    let pings = h
        .notifier
        .sent_to(1)
        .iter()
        .filter(|m| m.contains(&purchase.purchase_id))
        .count();
    assert_eq!(pings, 1);

    // An admin types "approve" into the sheet.
    let mut row = h
        .state
        .purchases
        .find(&purchase.purchase_id)
        .await
        .unwrap()
        .unwrap();
    row.value.admin_action = "approve".to_string();
    h.state.store.update(row.row_index, &row.value).await.unwrap();

    reconciler.run_once().await.unwrap();
    let row = h
        .state
        .purchases
        .find(&purchase.purchase_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.value.status, "approved");
    assert!(row.value.is_processed());
}

#[tokio::test]
async fn ticket_reply_closes_and_notifies() {
    let h = harness();
    register(&h, 30, "asker").await;
    let ticket = h
        .state
        .tickets
        .open(30, "asker", "how do I renew my access?")
        .await
        .unwrap();

    assert!(h
        .state
        .tickets
        .reply(&ticket.ticket_id, "Use Buy Subscription in the menu.")
        .await
        .unwrap());
    assert!(!h.state.tickets.reply(&ticket.ticket_id, "again").await.unwrap());
    assert!(h
        .notifier
        .sent_to(30)
        .iter()
        .any(|m| m.contains("Use Buy Subscription")));
}
