use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::models::{generate_id, BoostCode, DiscountCode, GiftCard, Product};
use crate::sheets::table::{Keyed, Store};

/// Discount codes, boost codes, and gift cards share the same worksheet
/// shape and live behind one service. Validation and consumption are two
/// separate reads of the sheet; the race between them is accepted.
#[derive(Clone)]
pub struct PromoService {
    store: Store,
}

impl PromoService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    fn valid_until(days: Option<i64>) -> Option<DateTime<Utc>> {
        days.map(|d| Utc::now() + Duration::days(d))
    }

    /// Creates a discount code. Returns false when a code with the same
    /// name (case-insensitive) already exists.
    pub async fn create_discount(
        &self,
        code: &str,
        percent: f64,
        max_uses: i64,
        days: Option<i64>,
        created_by: i64,
    ) -> Result<bool> {
        let code = code.trim().to_uppercase();
        if self
            .store
            .find_by::<DiscountCode, _>(|d| d.code.eq_ignore_ascii_case(&code))
            .await?
            .is_some()
        {
            return Ok(false);
        }
        self.store
            .insert(&DiscountCode {
                code: code.clone(),
                percent,
                max_uses,
                used_count: 0,
                valid_until: Self::valid_until(days),
                status: "active".to_string(),
                created_by,
                created_at: Some(Utc::now()),
            })
            .await?;
        info!("discount code {} created by {}", code, created_by);
        Ok(true)
    }

    pub async fn list_discounts(&self) -> Result<Vec<DiscountCode>> {
        Ok(self
            .store
            .scan::<DiscountCode>()
            .await?
            .into_iter()
            .map(|k| k.value)
            .collect())
    }

    pub async fn validate_discount(&self, code: &str) -> Result<Option<DiscountCode>> {
        let now = Utc::now();
        Ok(self
            .store
            .find_by::<DiscountCode, _>(|d| d.code.eq_ignore_ascii_case(code.trim()))
            .await?
            .map(|k| k.value)
            .filter(|d| d.is_valid_at(now)))
    }

    /// Burns one use. Consumed at entry time; a later purchase rejection
    /// does not refund the use.
    pub async fn consume_discount(&self, code: &str) -> Result<()> {
        if let Some(mut keyed) = self
            .store
            .find_by::<DiscountCode, _>(|d| d.code.eq_ignore_ascii_case(code.trim()))
            .await?
        {
            keyed.value.used_count += 1;
            self.store.update(keyed.row_index, &keyed.value).await?;
        }
        Ok(())
    }

    pub async fn create_boost(
        &self,
        code: &str,
        level1_percent: f64,
        level2_percent: f64,
        max_uses: i64,
        days: Option<i64>,
        created_by: i64,
    ) -> Result<bool> {
        let code = code.trim().to_uppercase();
        if self
            .store
            .find_by::<BoostCode, _>(|b| b.code.eq_ignore_ascii_case(&code))
            .await?
            .is_some()
        {
            return Ok(false);
        }
        self.store
            .insert(&BoostCode {
                code: code.clone(),
                level1_percent,
                level2_percent,
                max_uses,
                used_count: 0,
                valid_until: Self::valid_until(days),
                status: "active".to_string(),
                created_by,
                created_at: Some(Utc::now()),
            })
            .await?;
        info!("boost code {} created by {}", code, created_by);
        Ok(true)
    }

    pub async fn list_boosts(&self) -> Result<Vec<BoostCode>> {
        Ok(self
            .store
            .scan::<BoostCode>()
            .await?
            .into_iter()
            .map(|k| k.value)
            .collect())
    }

    pub async fn validate_boost(&self, code: &str) -> Result<Option<BoostCode>> {
        let now = Utc::now();
        Ok(self
            .store
            .find_by::<BoostCode, _>(|b| b.code.eq_ignore_ascii_case(code.trim()))
            .await?
            .map(|k| k.value)
            .filter(|b| b.is_valid_at(now)))
    }

    pub async fn consume_boost(&self, code: &str) -> Result<()> {
        if let Some(mut keyed) = self
            .store
            .find_by::<BoostCode, _>(|b| b.code.eq_ignore_ascii_case(code.trim()))
            .await?
        {
            keyed.value.used_count += 1;
            self.store.update(keyed.row_index, &keyed.value).await?;
        }
        Ok(())
    }

    /// Mints a pending gift card for an approved gift purchase.
    pub async fn mint_gift(&self, product: Product, purchased_by: i64) -> Result<GiftCard> {
        let card = GiftCard {
            code: generate_id('G'),
            product,
            status: "pending".to_string(),
            purchased_by,
            redeemed_by: None,
            created_at: Some(Utc::now()),
            redeemed_at: None,
        };
        self.store.insert(&card).await?;
        info!("gift card {} minted for buyer {}", card.code, purchased_by);
        Ok(card)
    }

    pub async fn find_gift(&self, code: &str) -> Result<Option<Keyed<GiftCard>>> {
        Ok(self
            .store
            .find_by::<GiftCard, _>(|g| g.code.eq_ignore_ascii_case(code.trim()))
            .await?)
    }

    pub async fn mark_gift_redeemed(
        &self,
        mut card: Keyed<GiftCard>,
        redeemed_by: i64,
    ) -> Result<()> {
        card.value.status = "redeemed".to_string();
        card.value.redeemed_by = Some(redeemed_by);
        card.value.redeemed_at = Some(Utc::now());
        self.store.update(card.row_index, &card.value).await?;
        Ok(())
    }
}
