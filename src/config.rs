use anyhow::{Context, Result};
use std::env;

/// All tunables come from the environment, read once at startup. Missing
/// required variables abort the process with a descriptive message.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub spreadsheet_id: String,
    pub google_credentials: Option<String>,
    pub google_credentials_file: String,
    pub admin_ids: Vec<i64>,
    pub normal_channel_id: i64,
    pub premium_channel_id: i64,
    pub test_channel_id: Option<i64>,
    pub price_normal_usd: f64,
    pub price_premium_usd: f64,
    pub card_number: String,
    pub usdt_address: String,
    pub min_withdrawal_usd: f64,
    pub price_feed_url: String,
    pub usd_irr_fallback: f64,
    pub level1_percent: f64,
    pub level2_percent: f64,
    pub subscription_days: i64,
    pub port: u16,
}

fn required(name: &str) -> Result<String> {
    env::var(name).with_context(|| format!("{} is not set", name))
}

fn optional_f64(name: &str, default: f64) -> f64 {
    env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn optional_i64(name: &str, default: i64) -> i64 {
    env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let admin_ids = required("ADMIN_IDS")?
            .split(',')
            .filter_map(|s| s.trim().parse::<i64>().ok())
            .collect::<Vec<_>>();
        if admin_ids.is_empty() {
            anyhow::bail!("ADMIN_IDS contains no valid telegram ids");
        }

        Ok(Self {
            bot_token: required("BOT_TOKEN")?,
            spreadsheet_id: required("SPREADSHEET_ID")?,
            google_credentials: env::var("GOOGLE_CREDENTIALS").ok(),
            google_credentials_file: env::var("GOOGLE_SERVICE_ACCOUNT")
                .unwrap_or_else(|_| "service-account.json".to_string()),
            admin_ids,
            normal_channel_id: required("NORMAL_CHANNEL_ID")?
                .parse()
                .context("NORMAL_CHANNEL_ID is not a chat id")?,
            premium_channel_id: required("PREMIUM_CHANNEL_ID")?
                .parse()
                .context("PREMIUM_CHANNEL_ID is not a chat id")?,
            test_channel_id: env::var("TEST_CHANNEL_ID").ok().and_then(|v| v.parse().ok()),
            price_normal_usd: optional_f64("PRICE_NORMAL_USD", 5.0),
            price_premium_usd: optional_f64("PRICE_PREMIUM_USD", 10.0),
            card_number: env::var("CARD_NUMBER").unwrap_or_default(),
            usdt_address: env::var("USDT_ADDRESS").unwrap_or_default(),
            min_withdrawal_usd: optional_f64("MIN_WITHDRAWAL_USD", 10.0),
            price_feed_url: env::var("PRICE_FEED_URL").unwrap_or_else(|_| {
                "https://api.nobitex.ir/v2/orderbook/USDTIRT".to_string()
            }),
            usd_irr_fallback: optional_f64("USD_IRR_FALLBACK", 600_000.0),
            level1_percent: optional_f64("LEVEL1_COMMISSION_PERCENT", 8.0),
            level2_percent: optional_f64("LEVEL2_COMMISSION_PERCENT", 12.0),
            subscription_days: optional_i64("SUBSCRIPTION_DAYS", 180),
            port: optional_i64("PORT", 8000) as u16,
        })
    }

    pub fn is_admin(&self, tg_id: i64) -> bool {
        self.admin_ids.contains(&tg_id)
    }

    /// Channels granted by a tier, premium includes both.
    pub fn channels_for(&self, tier: crate::models::Tier) -> Vec<i64> {
        match tier {
            crate::models::Tier::Normal => vec![self.normal_channel_id],
            crate::models::Tier::Premium => {
                vec![self.normal_channel_id, self.premium_channel_id]
            }
        }
    }

    pub fn price_for(&self, product: crate::models::Product) -> f64 {
        use crate::models::{Product, Tier};
        match product {
            Product::Trial => 0.0,
            p => match p.tier() {
                Tier::Normal => self.price_normal_usd,
                Tier::Premium => self.price_premium_usd,
            },
        }
    }
}

#[cfg(test)]
pub fn test_config() -> Config {
    Config {
        bot_token: "test-token".to_string(),
        spreadsheet_id: "sheet".to_string(),
        google_credentials: None,
        google_credentials_file: "service-account.json".to_string(),
        admin_ids: vec![1],
        normal_channel_id: -100_100,
        premium_channel_id: -100_200,
        test_channel_id: Some(-100_300),
        price_normal_usd: 5.0,
        price_premium_usd: 10.0,
        card_number: "6037-0000-0000-0000".to_string(),
        usdt_address: "TTestAddress".to_string(),
        min_withdrawal_usd: 10.0,
        price_feed_url: String::new(),
        usd_irr_fallback: 600_000.0,
        level1_percent: 8.0,
        level2_percent: 12.0,
        subscription_days: 180,
        port: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Product, Tier};

    #[test]
    fn tier_channels_and_prices() {
        let cfg = test_config();
        assert_eq!(cfg.channels_for(Tier::Normal), vec![-100_100]);
        assert_eq!(cfg.channels_for(Tier::Premium), vec![-100_100, -100_200]);
        assert_eq!(cfg.price_for(Product::Normal), 5.0);
        assert_eq!(cfg.price_for(Product::GiftPremium), 10.0);
        assert_eq!(cfg.price_for(Product::Trial), 0.0);
    }
}
