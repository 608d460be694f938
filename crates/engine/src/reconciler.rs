//! Trade reconciliation: a raw buy/sell event log → ordered trade pairs
//!
//! Matching keeps a single open-buy slot per symbol. A later buy replaces an
//! earlier unmatched one, and a sell with no open buy is dropped; both are
//! reconciliation policy, not errors. Whatever is still open after the scan
//! is valued against the live price feed.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use tracing::{debug, info};

use crate::prices::{fetch_latest_price, PriceQuote, PriceSource, RetryPolicy};
use crate::types::{PairStatus, TradeAction, TradeEvent, TradePair};

/// Reconcile `events` into completed round-trips and open positions.
///
/// Events are scanned in date order; same-date events keep their input order
/// (stable sort). Open positions are valued as of `as_of` with one concurrent
/// lookup per symbol; a failed or exhausted lookup degrades only that
/// symbol's return to `None`.
///
/// Output ordering: open positions first, then completed pairs; within each
/// group most recent activity first, symbol name breaking exact ties.
pub async fn reconcile_trades(
    events: &[TradeEvent],
    as_of: NaiveDate,
    prices: Arc<dyn PriceSource>,
    retry: RetryPolicy,
) -> Vec<TradePair> {
    let mut sorted: Vec<TradeEvent> = events.to_vec();
    sorted.sort_by_key(|e| e.date);

    let mut pairs: Vec<TradePair> = Vec::new();
    let mut open_buy: HashMap<String, TradeEvent> = HashMap::new();

    for event in sorted {
        match event.action {
            TradeAction::Buy => {
                if let Some(replaced) = open_buy.insert(event.symbol.clone(), event) {
                    debug!(symbol = %replaced.symbol, date = %replaced.date, "Later buy replaced unmatched buy");
                }
            }
            TradeAction::Sell => match open_buy.remove(&event.symbol) {
                Some(buy) => {
                    pairs.push(TradePair {
                        symbol: buy.symbol.clone(),
                        buy_date: buy.date,
                        sell_date: Some(event.date),
                        buy_price: buy.price,
                        sell_price: event.price,
                        return_pct: event.return_pct,
                        days_held: days_between(buy.date, event.date),
                        status: PairStatus::Completed,
                        sort_date: event.date,
                    });
                }
                None => {
                    debug!(symbol = %event.symbol, date = %event.date, "Dropping sell with no open buy");
                }
            },
        }
    }

    // Value whatever is still open, one task per symbol so a slow or failing
    // lookup cannot block the others. All tasks run to completion.
    let open: Vec<TradeEvent> = open_buy.into_values().collect();
    let lookups: Vec<_> = open
        .iter()
        .map(|buy| {
            let prices = Arc::clone(&prices);
            let symbol = buy.symbol.clone();
            tokio::spawn(async move { fetch_latest_price(prices.as_ref(), &symbol, retry).await })
        })
        .collect();

    for (buy, lookup) in open.into_iter().zip(lookups) {
        let quote = lookup.await.unwrap_or(PriceQuote::Unavailable);
        let return_pct = match (quote, buy.price) {
            (PriceQuote::Known(latest), Some(entry)) if !entry.is_zero() => {
                ((latest - entry) / entry).to_f64()
            }
            _ => None,
        };
        pairs.push(TradePair {
            symbol: buy.symbol.clone(),
            buy_date: buy.date,
            sell_date: None,
            buy_price: buy.price,
            sell_price: None,
            return_pct,
            days_held: days_between(buy.date, as_of),
            status: PairStatus::Holding,
            sort_date: buy.date,
        });
    }

    pairs.sort_by(|a, b| {
        let completed = |p: &TradePair| p.status == PairStatus::Completed;
        completed(a)
            .cmp(&completed(b))
            .then(b.sort_date.cmp(&a.sort_date))
            .then_with(|| a.symbol.cmp(&b.symbol))
    });

    info!(pairs = pairs.len(), "Reconciliation complete");
    pairs
}

/// Whole days from `start` to `end`, floored at 1 so same-day round trips
/// and just-opened positions still report a holding period.
fn days_between(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days().max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    use crate::prices::StaticPriceTable;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn event(symbol: &str, action: TradeAction, date: NaiveDate, price: Option<Decimal>) -> TradeEvent {
        TradeEvent {
            symbol: symbol.to_string(),
            action,
            date,
            price,
            return_pct: None,
            days_held: None,
            signal_strength: None,
            profit_loss: None,
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            backoff_base: Duration::from_millis(1),
            attempt_timeout: Duration::from_millis(100),
        }
    }

    fn no_prices() -> Arc<dyn PriceSource> {
        Arc::new(StaticPriceTable::new())
    }

    #[tokio::test]
    async fn test_buy_sell_forms_completed_pair() {
        let mut sell = event("VNM", TradeAction::Sell, day(2024, 1, 11), Some(dec!(110)));
        sell.return_pct = Some(0.10);
        let events = vec![
            event("VNM", TradeAction::Buy, day(2024, 1, 1), Some(dec!(100))),
            sell,
        ];

        let pairs = reconcile_trades(&events, day(2024, 2, 1), no_prices(), fast_retry()).await;

        assert_eq!(pairs.len(), 1);
        let pair = &pairs[0];
        assert_eq!(pair.status, PairStatus::Completed);
        assert_eq!(pair.days_held, 10);
        assert_eq!(pair.buy_price, Some(dec!(100)));
        assert_eq!(pair.sell_price, Some(dec!(110)));
        assert_eq!(pair.return_pct, Some(0.10));
        assert_eq!(pair.sort_date, day(2024, 1, 11));
    }

    #[tokio::test]
    async fn test_last_buy_wins() {
        let events = vec![
            event("VNM", TradeAction::Buy, day(2024, 1, 1), Some(dec!(100))),
            event("VNM", TradeAction::Buy, day(2024, 1, 5), Some(dec!(90))),
            event("VNM", TradeAction::Sell, day(2024, 1, 9), Some(dec!(95))),
        ];

        let pairs = reconcile_trades(&events, day(2024, 2, 1), no_prices(), fast_retry()).await;

        // The replaced first buy is discarded, never emitted
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].buy_date, day(2024, 1, 5));
        assert_eq!(pairs[0].buy_price, Some(dec!(90)));
        assert_eq!(pairs[0].days_held, 4);
    }

    #[tokio::test]
    async fn test_unmatched_sell_is_dropped() {
        let events = vec![event("VNM", TradeAction::Sell, day(2024, 1, 3), Some(dec!(50)))];
        let pairs = reconcile_trades(&events, day(2024, 2, 1), no_prices(), fast_retry()).await;
        assert!(pairs.is_empty());
    }

    #[tokio::test]
    async fn test_same_day_round_trip_holds_one_day() {
        let events = vec![
            event("VNM", TradeAction::Buy, day(2024, 1, 3), Some(dec!(100))),
            event("VNM", TradeAction::Sell, day(2024, 1, 3), Some(dec!(101))),
        ];
        let pairs = reconcile_trades(&events, day(2024, 2, 1), no_prices(), fast_retry()).await;
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].days_held, 1);
    }

    #[tokio::test]
    async fn test_same_day_sell_before_buy_stays_open() {
        // Stable sort keeps input order on equal dates: the sell comes first
        // and finds no open buy, the buy stays open.
        let events = vec![
            event("VNM", TradeAction::Sell, day(2024, 1, 3), Some(dec!(101))),
            event("VNM", TradeAction::Buy, day(2024, 1, 3), Some(dec!(100))),
        ];
        let pairs = reconcile_trades(&events, day(2024, 1, 3), no_prices(), fast_retry()).await;
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].status, PairStatus::Holding);
        assert_eq!(pairs[0].days_held, 1);
    }

    #[tokio::test]
    async fn test_open_position_valued_from_feed() {
        let events = vec![event("HPG", TradeAction::Buy, day(2024, 1, 1), Some(dec!(20)))];
        let table: StaticPriceTable = [("HPG".to_string(), dec!(25))].into_iter().collect();

        let pairs = reconcile_trades(&events, day(2024, 1, 31), Arc::new(table), fast_retry()).await;

        assert_eq!(pairs.len(), 1);
        let pair = &pairs[0];
        assert_eq!(pair.status, PairStatus::Holding);
        assert_eq!(pair.days_held, 30);
        assert!(pair.sell_date.is_none());
        let ret = pair.return_pct.unwrap();
        assert!((ret - 0.25).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_open_position_without_buy_price_has_no_return() {
        let events = vec![event("HPG", TradeAction::Buy, day(2024, 1, 1), None)];
        let table: StaticPriceTable = [("HPG".to_string(), dec!(25))].into_iter().collect();
        let pairs = reconcile_trades(&events, day(2024, 1, 31), Arc::new(table), fast_retry()).await;
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].return_pct.is_none());
    }

    /// Fails every lookup for one symbol, serves a table for the rest.
    struct PartialOutage {
        down: String,
        table: StaticPriceTable,
    }

    #[async_trait]
    impl PriceSource for PartialOutage {
        async fn latest_adj_close(&self, symbol: &str) -> anyhow::Result<Option<Decimal>> {
            if symbol == self.down {
                anyhow::bail!("upstream 502");
            }
            self.table.latest_adj_close(symbol).await
        }
    }

    #[tokio::test]
    async fn test_one_symbol_outage_does_not_block_others() {
        let events = vec![
            event("AAA", TradeAction::Buy, day(2024, 1, 1), Some(dec!(10))),
            event("BBB", TradeAction::Buy, day(2024, 1, 2), Some(dec!(40))),
        ];
        let source = PartialOutage {
            down: "AAA".to_string(),
            table: [("BBB".to_string(), dec!(50))].into_iter().collect(),
        };

        let pairs = reconcile_trades(&events, day(2024, 2, 1), Arc::new(source), fast_retry()).await;

        assert_eq!(pairs.len(), 2);
        let aaa = pairs.iter().find(|p| p.symbol == "AAA").unwrap();
        let bbb = pairs.iter().find(|p| p.symbol == "BBB").unwrap();
        assert_eq!(aaa.status, PairStatus::Holding);
        assert!(aaa.return_pct.is_none());
        let ret = bbb.return_pct.unwrap();
        assert!((ret - 0.25).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_holding_pairs_precede_completed_and_sort_descending() {
        let mut sell = event("CCC", TradeAction::Sell, day(2024, 2, 1), Some(dec!(11)));
        sell.return_pct = Some(0.10);
        let events = vec![
            event("AAA", TradeAction::Buy, day(2024, 1, 1), Some(dec!(10))),
            event("BBB", TradeAction::Buy, day(2024, 3, 1), Some(dec!(10))),
            event("CCC", TradeAction::Buy, day(2024, 1, 15), Some(dec!(10))),
            sell,
        ];

        let pairs = reconcile_trades(&events, day(2024, 4, 1), no_prices(), fast_retry()).await;

        let order: Vec<(&str, PairStatus)> = pairs
            .iter()
            .map(|p| (p.symbol.as_str(), p.status))
            .collect();
        assert_eq!(
            order,
            vec![
                ("BBB", PairStatus::Holding),
                ("AAA", PairStatus::Holding),
                ("CCC", PairStatus::Completed),
            ]
        );
    }

    #[tokio::test]
    async fn test_completed_pairs_sort_by_sell_date_descending() {
        let mut sell_a = event("AAA", TradeAction::Sell, day(2024, 1, 20), Some(dec!(11)));
        sell_a.return_pct = Some(0.10);
        let mut sell_b = event("BBB", TradeAction::Sell, day(2024, 2, 20), Some(dec!(22)));
        sell_b.return_pct = Some(0.05);
        let events = vec![
            event("AAA", TradeAction::Buy, day(2024, 1, 1), Some(dec!(10))),
            sell_a,
            event("BBB", TradeAction::Buy, day(2024, 2, 1), Some(dec!(20))),
            sell_b,
        ];

        let pairs = reconcile_trades(&events, day(2024, 3, 1), no_prices(), fast_retry()).await;

        assert_eq!(pairs[0].symbol, "BBB");
        assert_eq!(pairs[1].symbol, "AAA");
    }

    #[tokio::test]
    async fn test_independent_symbols_pair_independently() {
        let mut sell = event("VNM", TradeAction::Sell, day(2024, 1, 10), Some(dec!(80)));
        sell.return_pct = Some(-0.2);
        let events = vec![
            event("VNM", TradeAction::Buy, day(2024, 1, 2), Some(dec!(100))),
            event("FPT", TradeAction::Buy, day(2024, 1, 5), Some(dec!(120))),
            sell,
        ];

        let pairs = reconcile_trades(&events, day(2024, 2, 1), no_prices(), fast_retry()).await;

        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].symbol, "FPT");
        assert_eq!(pairs[0].status, PairStatus::Holding);
        assert_eq!(pairs[1].symbol, "VNM");
        assert_eq!(pairs[1].status, PairStatus::Completed);
    }
}
