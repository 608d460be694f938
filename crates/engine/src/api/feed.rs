//! Signal feed API client — trade history, buy recommendations, symbol details
//!
//! Binds the abstract trade and price feeds to the backend's JSON API.
//! Individual records that fail to decode are skipped with a warning, never
//! fatal to the batch.

use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::prices::PriceSource;
use crate::types::{de_lenient_price, TradeEvent};

const REQUEST_TIMEOUT_SECS: u64 = 8;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("feed API error {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// Client for the signal feed API
#[derive(Clone)]
pub struct FeedClient {
    client: Client,
    base_url: String,
}

/// One entry of a symbol's price series. Only the adjusted close is read;
/// the feed has emitted both spellings of the column name.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceBar {
    #[serde(default, alias = "Adj Close", deserialize_with = "de_lenient_price")]
    pub adj_close: Option<Decimal>,
}

/// Payload of `get-symbol-details`: one symbol's trade log and price series.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SymbolDetails {
    #[serde(default, deserialize_with = "lenient_events")]
    pub trades: Vec<TradeEvent>,
    #[serde(default)]
    pub prices: Vec<PriceBar>,
}

impl SymbolDetails {
    /// Adjusted close of the most recent series entry, if any.
    pub fn latest_adj_close(&self) -> Option<Decimal> {
        self.prices.last().and_then(|bar| bar.adj_close)
    }
}

/// The history endpoint has returned both a bare array and `{"trades": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HistoryPayload {
    Bare(Vec<serde_json::Value>),
    Wrapped { trades: Vec<serde_json::Value> },
}

fn lenient_events<'de, D>(deserializer: D) -> Result<Vec<TradeEvent>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Vec::<serde_json::Value>::deserialize(deserializer)?;
    Ok(decode_events(raw))
}

/// Decode each record independently; malformed ones are dropped, not fatal.
fn decode_events(raw: Vec<serde_json::Value>) -> Vec<TradeEvent> {
    let total = raw.len();
    let events: Vec<TradeEvent> = raw
        .into_iter()
        .filter_map(|value| serde_json::from_value(value).ok())
        .collect();

    let dropped = total - events.len();
    if dropped > 0 {
        warn!(dropped, total, "Skipped undecodable trade records");
    }
    events
}

impl FeedClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: base_url.into(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, FeedError> {
        let resp = self.client.get(url).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(FeedError::Status { status, body });
        }

        Ok(resp.json().await?)
    }

    /// GET /fetch_trades_history — the full cross-symbol trade log
    pub async fn get_trade_history(&self) -> Result<Vec<TradeEvent>, FeedError> {
        let url = format!("{}/fetch_trades_history", self.base_url);
        debug!("Fetching trade history: {}", url);

        let payload: HistoryPayload = self.get_json(&url).await?;
        let raw = match payload {
            HistoryPayload::Bare(values) => values,
            HistoryPayload::Wrapped { trades } => trades,
        };

        let events = decode_events(raw);
        debug!(count = events.len(), "Trade history fetched");
        Ok(events)
    }

    /// GET /fetch-latest-buys — current buy recommendations
    pub async fn get_latest_buys(&self) -> Result<Vec<TradeEvent>, FeedError> {
        let url = format!("{}/fetch-latest-buys", self.base_url);
        debug!("Fetching latest buys: {}", url);

        let raw: Vec<serde_json::Value> = self.get_json(&url).await?;
        let events = decode_events(raw);
        debug!(count = events.len(), "Latest buys fetched");
        Ok(events)
    }

    /// GET /get-symbol-details?symbol= — one symbol's trades and price series
    pub async fn get_symbol_details(&self, symbol: &str) -> Result<SymbolDetails, FeedError> {
        let url = format!("{}/get-symbol-details?symbol={}", self.base_url, symbol);
        debug!(symbol, "Fetching symbol details");

        let details: SymbolDetails = self.get_json(&url).await?;
        debug!(
            symbol,
            trades = details.trades.len(),
            bars = details.prices.len(),
            "Symbol details fetched"
        );
        Ok(details)
    }
}

#[async_trait::async_trait]
impl PriceSource for FeedClient {
    async fn latest_adj_close(&self, symbol: &str) -> anyhow::Result<Option<Decimal>> {
        let details = self.get_symbol_details(symbol).await?;
        Ok(details.latest_adj_close())
    }
}
