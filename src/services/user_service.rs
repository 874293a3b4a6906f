use anyhow::Result;
use chrono::Utc;
use tracing::info;

use crate::models::{ActiveBoost, Subscription, User};
use crate::sheets::table::{Keyed, Store};

/// The Users worksheet, typed. Rows are never deleted; a user row is created
/// on first contact and refreshed in place afterwards.
#[derive(Clone)]
pub struct UserService {
    store: Store,
}

impl UserService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn find(&self, tg_id: i64) -> Result<Option<Keyed<User>>> {
        Ok(self
            .store
            .find_by::<User, _>(|u| u.telegram_id == tg_id)
            .await?)
    }

    pub async fn find_by_referral_code(&self, code: &str) -> Result<Option<Keyed<User>>> {
        let code = code.trim();
        Ok(self
            .store
            .find_by::<User, _>(|u| u.referral_code.eq_ignore_ascii_case(code))
            .await?)
    }

    /// Finds or creates the row for a Telegram account, refreshing the
    /// profile fields and last_seen on every contact.
    pub async fn get_or_create(
        &self,
        tg_id: i64,
        username: &str,
        full_name: &str,
    ) -> Result<Keyed<User>> {
        if let Some(mut existing) = self.find(tg_id).await? {
            existing.value.username = username.to_string();
            existing.value.full_name = full_name.to_string();
            existing.value.last_seen = Some(Utc::now());
            self.store.update(existing.row_index, &existing.value).await?;
            return Ok(existing);
        }
        let user = User::new(tg_id, username, full_name, "");
        self.store.insert(&user).await?;
        info!("registered new user {} (@{})", tg_id, username);
        self.find(tg_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("user row vanished right after insert"))
    }

    pub async fn set_email(&self, tg_id: i64, email: &str) -> Result<()> {
        if let Some(mut user) = self.find(tg_id).await? {
            user.value.email = email.trim().to_string();
            self.store.update(user.row_index, &user.value).await?;
        }
        Ok(())
    }

    /// Records who referred this user. A no-op if a referrer is already set
    /// or the user would refer themselves.
    pub async fn set_referred_by(&self, tg_id: i64, referrer_tg_id: i64) -> Result<bool> {
        if tg_id == referrer_tg_id {
            return Ok(false);
        }
        let Some(mut user) = self.find(tg_id).await? else {
            return Ok(false);
        };
        if user.value.referred_by.is_some() {
            return Ok(false);
        }
        user.value.referred_by = Some(referrer_tg_id);
        self.store.update(user.row_index, &user.value).await?;
        info!("user {} referred by {}", tg_id, referrer_tg_id);
        Ok(true)
    }

    /// Adds to the wallet. Negative deltas debit; the balance never goes
    /// below zero. Returns the new balance.
    pub async fn adjust_balance(&self, tg_id: i64, delta_usd: f64) -> Result<f64> {
        let Some(mut user) = self.find(tg_id).await? else {
            anyhow::bail!("no user row for {}", tg_id);
        };
        user.value.wallet_balance = (user.value.wallet_balance + delta_usd).max(0.0);
        self.store.update(user.row_index, &user.value).await?;
        Ok(user.value.wallet_balance)
    }

    pub async fn set_boost(&self, tg_id: i64, boost: ActiveBoost) -> Result<()> {
        let Some(mut user) = self.find(tg_id).await? else {
            anyhow::bail!("no user row for {}", tg_id);
        };
        user.value.active_boost = Some(boost);
        self.store.update(user.row_index, &user.value).await?;
        Ok(())
    }

    pub async fn get_active_subscription(&self, tg_id: i64) -> Result<Option<Subscription>> {
        let now = Utc::now();
        Ok(self
            .store
            .find_by::<Subscription, _>(|s| s.telegram_id == tg_id)
            .await?
            .map(|k| k.value)
            .filter(|s| s.is_active_at(now)))
    }

    pub async fn all_users(&self) -> Result<Vec<User>> {
        Ok(self
            .store
            .scan::<User>()
            .await?
            .into_iter()
            .map(|k| k.value)
            .collect())
    }

    /// Lookup by id, @username, or referral code, for the admin search
    /// command.
    pub async fn search(&self, query: &str) -> Result<Option<User>> {
        let query = query.trim().trim_start_matches('@');
        let by_id = query.parse::<i64>().ok();
        Ok(self
            .store
            .find_by::<User, _>(|u| {
                by_id == Some(u.telegram_id)
                    || u.username.eq_ignore_ascii_case(query)
                    || u.referral_code.eq_ignore_ascii_case(query)
            })
            .await?
            .map(|k| k.value))
    }
}
