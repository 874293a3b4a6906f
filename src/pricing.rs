use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

/// USD→IRR conversion off a public order book. The best ask is good enough
/// for a price label; checkout must never hang or fail on feed trouble, so
/// the timeout is short and a configured fallback rate always applies.
#[derive(Clone)]
pub struct PriceFeed {
    http: reqwest::Client,
    url: String,
    fallback_rate: f64,
}

#[derive(Deserialize)]
struct OrderBook {
    #[serde(default)]
    asks: Vec<Vec<serde_json::Value>>,
}

impl PriceFeed {
    pub fn new(url: String, fallback_rate: f64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            url,
            fallback_rate,
        }
    }

    pub async fn usd_to_irr(&self, amount_usd: f64) -> f64 {
        (self.usd_irr_rate().await * amount_usd).round()
    }

    async fn usd_irr_rate(&self) -> f64 {
        match self.fetch_best_ask().await {
            Some(rate) if rate > 0.0 => rate,
            _ => {
                warn!(
                    "price feed unavailable, using fallback rate {}",
                    self.fallback_rate
                );
                self.fallback_rate
            }
        }
    }

    async fn fetch_best_ask(&self) -> Option<f64> {
        if self.url.is_empty() {
            return None;
        }
        let book: OrderBook = self
            .http
            .get(&self.url)
            .send()
            .await
            .ok()?
            .json()
            .await
            .ok()?;
        best_ask(&book)
    }
}

fn best_ask(book: &OrderBook) -> Option<f64> {
    let first = book.asks.first()?.first()?;
    match first {
        serde_json::Value::String(s) => s.parse().ok(),
        serde_json::Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_ask_reads_first_entry() {
        let book: OrderBook =
            serde_json::from_str(r#"{"asks": [["612000", "1.5"], ["613000", "2"]]}"#).unwrap();
        assert_eq!(best_ask(&book), Some(612_000.0));
    }

    #[test]
    fn best_ask_handles_numeric_cells_and_empty_books() {
        let book: OrderBook = serde_json::from_str(r#"{"asks": [[612000.5, 1]]}"#).unwrap();
        assert_eq!(best_ask(&book), Some(612_000.5));
        let empty: OrderBook = serde_json::from_str(r#"{"asks": []}"#).unwrap();
        assert_eq!(best_ask(&empty), None);
    }

    #[tokio::test]
    async fn fallback_applies_without_feed() {
        let feed = PriceFeed::new(String::new(), 600_000.0);
        assert_eq!(feed.usd_to_irr(5.0).await, 3_000_000.0);
    }
}
