//! Price lookup boundary and bounded retry wrapper
//!
//! Open positions are valued against the latest adjusted close from an
//! abstract `PriceSource`. Lookup exhaustion is a normal, anticipated outcome
//! modeled as `PriceQuote::Unavailable`, never an error.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{debug, warn};

/// Abstract source of latest adjusted-close prices.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Latest adjusted close for `symbol`. `Ok(None)` means the source
    /// answered but has no usable series (not worth retrying); `Err` means
    /// the attempt itself failed and may be retried.
    async fn latest_adj_close(&self, symbol: &str) -> anyhow::Result<Option<Decimal>>;
}

/// Outcome of a price lookup once the retry budget is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceQuote {
    Known(Decimal),
    Unavailable,
}

impl PriceQuote {
    pub fn known(self) -> Option<Decimal> {
        match self {
            PriceQuote::Known(price) => Some(price),
            PriceQuote::Unavailable => None,
        }
    }
}

/// Retry schedule for price lookups: `attempts` tries, each bounded by
/// `attempt_timeout`, waiting `backoff_base * attempt` after a failed
/// attempt `attempt`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff_base: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_base: Duration::from_millis(1000),
            attempt_timeout: Duration::from_millis(8000),
        }
    }
}

/// Fetch the latest price for one symbol under the given retry policy.
pub async fn fetch_latest_price(
    source: &dyn PriceSource,
    symbol: &str,
    policy: RetryPolicy,
) -> PriceQuote {
    for attempt in 1..=policy.attempts {
        match tokio::time::timeout(policy.attempt_timeout, source.latest_adj_close(symbol)).await {
            Ok(Ok(Some(price))) => {
                debug!(symbol, %price, attempt, "Price lookup succeeded");
                return PriceQuote::Known(price);
            }
            Ok(Ok(None)) => {
                warn!(symbol, "Price source has no usable series");
                return PriceQuote::Unavailable;
            }
            Ok(Err(e)) => {
                warn!(symbol, attempt, error = %e, "Price lookup attempt failed");
            }
            Err(_) => {
                warn!(
                    symbol,
                    attempt,
                    timeout_ms = policy.attempt_timeout.as_millis() as u64,
                    "Price lookup attempt timed out"
                );
            }
        }

        if attempt < policy.attempts {
            tokio::time::sleep(policy.backoff_base * attempt).await;
        }
    }

    warn!(symbol, attempts = policy.attempts, "Price lookup exhausted, valuing as unknown");
    PriceQuote::Unavailable
}

/// Fixed symbol → price table. Answers instantly and never fails; used to
/// value pairs against an already-fetched series, and as a test double.
#[derive(Debug, Clone, Default)]
pub struct StaticPriceTable {
    prices: HashMap<String, Decimal>,
}

impl StaticPriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: impl Into<String>, price: Decimal) {
        self.prices.insert(symbol.into(), price);
    }
}

impl FromIterator<(String, Decimal)> for StaticPriceTable {
    fn from_iter<I: IntoIterator<Item = (String, Decimal)>>(iter: I) -> Self {
        Self {
            prices: iter.into_iter().collect(),
        }
    }
}

#[async_trait]
impl PriceSource for StaticPriceTable {
    async fn latest_adj_close(&self, symbol: &str) -> anyhow::Result<Option<Decimal>> {
        Ok(self.prices.get(symbol).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            backoff_base: Duration::from_millis(1),
            attempt_timeout: Duration::from_millis(50),
        }
    }

    /// Fails the first `failures` calls, then answers with a fixed price.
    struct FlakySource {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl PriceSource for FlakySource {
        async fn latest_adj_close(&self, _symbol: &str) -> anyhow::Result<Option<Decimal>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                anyhow::bail!("connection reset");
            }
            Ok(Some(dec!(42.5)))
        }
    }

    struct EmptySource;

    #[async_trait]
    impl PriceSource for EmptySource {
        async fn latest_adj_close(&self, _symbol: &str) -> anyhow::Result<Option<Decimal>> {
            Ok(None)
        }
    }

    struct StallingSource;

    #[async_trait]
    impl PriceSource for StallingSource {
        async fn latest_adj_close(&self, _symbol: &str) -> anyhow::Result<Option<Decimal>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Some(dec!(1)))
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let source = FlakySource {
            failures: 2,
            calls: AtomicU32::new(0),
        };
        let quote = fetch_latest_price(&source, "HPG", fast_policy(3)).await;
        assert_eq!(quote, PriceQuote::Known(dec!(42.5)));
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_yields_unavailable() {
        let source = FlakySource {
            failures: 10,
            calls: AtomicU32::new(0),
        };
        let quote = fetch_latest_price(&source, "HPG", fast_policy(3)).await;
        assert_eq!(quote, PriceQuote::Unavailable);
        // No attempts beyond the budget
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_series_is_not_retried() {
        let quote = fetch_latest_price(&EmptySource, "HPG", fast_policy(3)).await;
        assert_eq!(quote, PriceQuote::Unavailable);
    }

    #[tokio::test]
    async fn test_slow_attempts_time_out() {
        let quote = fetch_latest_price(&StallingSource, "HPG", fast_policy(2)).await;
        assert_eq!(quote, PriceQuote::Unavailable);
    }

    #[tokio::test]
    async fn test_static_table_lookup() {
        let table: StaticPriceTable = [("VNM".to_string(), dec!(71.3))].into_iter().collect();
        assert_eq!(table.latest_adj_close("VNM").await.unwrap(), Some(dec!(71.3)));
        assert_eq!(table.latest_adj_close("FPT").await.unwrap(), None);
    }
}
