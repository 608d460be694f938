//! Core value types: trade events, reconciled pairs, summary statistics

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

/// Side of a recorded trade action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl<'de> Deserialize<'de> for TradeAction {
    // The feed emits "buy"/"BUY"/"Buy" interchangeably
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.to_lowercase().as_str() {
            "buy" => Ok(TradeAction::Buy),
            "sell" => Ok(TradeAction::Sell),
            other => Err(serde::de::Error::custom(format!(
                "unknown trade action: {other}"
            ))),
        }
    }
}

/// A single recorded buy/sell action from the trade feed.
///
/// Events are immutable inputs; reconciliation never modifies them. Optional
/// fields stay `None` when the feed omits or mangles them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeEvent {
    pub symbol: String,
    pub action: TradeAction,
    #[serde(deserialize_with = "de_day")]
    pub date: NaiveDate,
    #[serde(default, deserialize_with = "de_lenient_price")]
    pub price: Option<Decimal>,
    /// Realized fractional return, present on sell events (0.05 = 5%)
    pub return_pct: Option<f64>,
    /// Holding period in whole days, present on sell events
    pub days_held: Option<i64>,
    pub signal_strength: Option<f64>,
    pub profit_loss: Option<f64>,
}

/// Dates carry no intra-day significance; timestamps are truncated to the day.
fn de_day<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_day(&s).ok_or_else(|| serde::de::Error::custom(format!("unparseable date: {s}")))
}

pub(crate) fn parse_day(s: &str) -> Option<NaiveDate> {
    if let Ok(day) = s.parse::<NaiveDate>() {
        return Some(day);
    }
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.date_naive())
}

/// Prices have arrived as numbers, numeric strings, and occasional junk;
/// anything unparseable degrades to `None` instead of rejecting the record.
pub(crate) fn de_lenient_price<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.to_string().parse().ok(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Lifecycle state of a reconciled pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PairStatus {
    Completed,
    Holding,
}

/// One reconciled round-trip: a matched buy/sell, or an unmatched buy valued
/// against the latest known price. Created once during reconciliation and
/// read-only downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradePair {
    pub symbol: String,
    pub buy_date: NaiveDate,
    pub sell_date: Option<NaiveDate>,
    pub buy_price: Option<Decimal>,
    pub sell_price: Option<Decimal>,
    /// Fractional return; `None` when unknowable (missing sell return, or
    /// price lookup exhausted for an open position)
    pub return_pct: Option<f64>,
    /// Whole days held, always ≥ 1
    pub days_held: i64,
    pub status: PairStatus,
    /// Sell date for completed pairs, buy date for open ones
    pub sort_date: NaiveDate,
}

/// Aggregate statistics over a reconciled pair set. All percentage fields are
/// expressed in percent (5.0 = 5%); derived on demand, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSummary {
    pub total_trades: usize,
    pub win_rate: f64,
    pub avg_return_pct: f64,
    pub avg_win_pct: f64,
    pub avg_loss_pct: f64,
    pub max_win_pct: f64,
    pub max_loss_pct: f64,
    pub avg_holding_days: f64,
    pub sharpe_ratio: f64,
}
