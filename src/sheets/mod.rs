use async_trait::async_trait;
use rand::Rng;
use reqwest::Method;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub mod auth;
pub mod table;

use auth::TokenProvider;
use table::{StoreError, TableBackend, TableSpec};

const API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const MAX_ATTEMPTS: u32 = 4;
const BASE_DELAY_MS: u64 = 500;
const MAX_DELAY_MS: u64 = 8_000;

/// Google Sheets REST v4 backend. One spreadsheet document, one worksheet per
/// table, rate-limit aware.
pub struct SheetsClient {
    http: reqwest::Client,
    spreadsheet_id: String,
    tokens: TokenProvider,
    known_sheets: Mutex<HashSet<String>>,
}

impl SheetsClient {
    pub fn new(spreadsheet_id: String, tokens: TokenProvider) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            spreadsheet_id,
            tokens,
            known_sheets: Mutex::new(HashSet::new()),
        }
    }

    fn range(&self, spec: &TableSpec) -> String {
        // Sheet names never contain quotes here, so plain quoting is enough.
        format!("'{}'!A1:Z", spec.name)
    }

    fn values_url(&self, range: &str, suffix: &str) -> String {
        format!(
            "{}/{}/values/{}{}",
            API_BASE,
            self.spreadsheet_id,
            urlencoding::encode(range),
            suffix
        )
    }

    /// One API call with bounded, jittered exponential backoff on 429/5xx and
    /// transport errors.
    async fn api_call(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
    ) -> Result<Value, StoreError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let token = self.tokens.token(&self.http).await?;
            let mut req = self.http.request(method.clone(), url).bearer_auth(token);
            if let Some(b) = &body {
                req = req.json(b);
            }
            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp.json::<Value>().await.unwrap_or(Value::Null));
                    }
                    let retriable = status.as_u16() == 429 || status.is_server_error();
                    let text = resp.text().await.unwrap_or_default();
                    if retriable && attempt < MAX_ATTEMPTS {
                        let delay = backoff_delay(attempt);
                        warn!(
                            "sheets call {} returned {}, retrying in {:?} (attempt {})",
                            url, status, delay, attempt
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(StoreError::Api(format!("{}: {}", status, truncated(&text))));
                }
                Err(e) if attempt < MAX_ATTEMPTS => {
                    let delay = backoff_delay(attempt);
                    warn!(
                        "sheets transport error ({}), retrying in {:?} (attempt {})",
                        e, delay, attempt
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn sheet_titles(&self) -> Result<Vec<String>, StoreError> {
        let url = format!(
            "{}/{}?fields=sheets.properties.title",
            API_BASE, self.spreadsheet_id
        );
        let meta = self.api_call(Method::GET, &url, None).await?;
        let titles = meta["sheets"]
            .as_array()
            .map(|sheets| {
                sheets
                    .iter()
                    .filter_map(|s| s["properties"]["title"].as_str())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(titles)
    }

    async fn add_sheet(&self, name: &str) -> Result<(), StoreError> {
        let url = format!("{}/{}:batchUpdate", API_BASE, self.spreadsheet_id);
        let body = json!({
            "requests": [{ "addSheet": { "properties": { "title": name } } }]
        });
        self.api_call(Method::POST, &url, Some(body)).await?;
        Ok(())
    }

    async fn write_header(&self, spec: &TableSpec) -> Result<(), StoreError> {
        let range = format!("'{}'!A1", spec.name);
        let url = self.values_url(&range, "?valueInputOption=RAW");
        let header: Vec<&str> = spec.headers.to_vec();
        self.api_call(Method::PUT, &url, Some(json!({ "values": [header] })))
            .await?;
        Ok(())
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let exp = BASE_DELAY_MS.saturating_mul(1u64 << attempt.min(6));
    let jitter = rand::thread_rng().gen_range(0..250);
    Duration::from_millis(exp.min(MAX_DELAY_MS) + jitter)
}

fn truncated(s: &str) -> String {
    const LIMIT: usize = 300;
    if s.len() <= LIMIT {
        return s.to_string();
    }
    // Error bodies can be non-ASCII; never cut inside a character.
    let mut cut = LIMIT;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &s[..cut])
}

fn rows_from_values(value: &Value) -> Vec<Vec<String>> {
    value["values"]
        .as_array()
        .map(|rows| {
            rows.iter()
                .map(|row| {
                    row.as_array()
                        .map(|cells| {
                            cells
                                .iter()
                                .map(|c| match c {
                                    Value::String(s) => s.clone(),
                                    other => other.to_string(),
                                })
                                .collect()
                        })
                        .unwrap_or_default()
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl TableBackend for SheetsClient {
    async fn ensure_table(&self, spec: &TableSpec) -> Result<(), StoreError> {
        {
            let known = self.known_sheets.lock().await;
            if known.contains(spec.name) {
                return Ok(());
            }
        }
        let titles = self.sheet_titles().await?;
        if !titles.iter().any(|t| t == spec.name) {
            self.add_sheet(spec.name).await?;
            self.write_header(spec).await?;
            info!("created worksheet {} with header", spec.name);
        } else {
            // Repair a blank header row; a populated sheet is left alone.
            let url = self.values_url(&format!("'{}'!A1:Z1", spec.name), "");
            let first = self.api_call(Method::GET, &url, None).await?;
            if rows_from_values(&first).is_empty() {
                self.write_header(spec).await?;
                info!("repaired missing header on worksheet {}", spec.name);
            }
        }
        self.known_sheets.lock().await.insert(spec.name.to_string());
        Ok(())
    }

    async fn read_rows(&self, spec: &TableSpec) -> Result<Vec<Vec<String>>, StoreError> {
        let url = self.values_url(&self.range(spec), "");
        let value = self.api_call(Method::GET, &url, None).await?;
        let mut rows = rows_from_values(&value);
        if !rows.is_empty() {
            rows.remove(0); // header
        }
        Ok(rows)
    }

    async fn append_row(&self, spec: &TableSpec, row: Vec<String>) -> Result<(), StoreError> {
        let url = self.values_url(
            &self.range(spec),
            ":append?valueInputOption=RAW&insertDataOption=INSERT_ROWS",
        );
        self.api_call(Method::POST, &url, Some(json!({ "values": [row] })))
            .await?;
        Ok(())
    }

    async fn update_row(
        &self,
        spec: &TableSpec,
        row_index: usize,
        row: Vec<String>,
    ) -> Result<(), StoreError> {
        let range = format!("'{}'!A{}", spec.name, row_index);
        let url = self.values_url(&range, "?valueInputOption=RAW");
        self.api_call(Method::PUT, &url, Some(json!({ "values": [row] })))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_values_payload() {
        let v = json!({ "values": [["a", "b"], ["1", 2]] });
        let rows = rows_from_values(&v);
        assert_eq!(rows, vec![vec!["a", "b"], vec!["1", "2"]]);
        assert!(rows_from_values(&Value::Null).is_empty());
    }

    #[test]
    fn truncated_respects_char_boundaries() {
        let short = "plain error body";
        assert_eq!(truncated(short), short);
        // A multibyte character straddling the cut point must not panic.
        let mut long = "a".repeat(299);
        long.push('é');
        long.push_str(&"b".repeat(50));
        let cut = truncated(&long);
        assert!(cut.ends_with("..."));
        assert!(cut.len() <= 303);
    }

    #[test]
    fn backoff_is_bounded() {
        for attempt in 1..10 {
            assert!(backoff_delay(attempt) <= Duration::from_millis(MAX_DELAY_MS + 250));
        }
    }
}
