//! Trade reconciliation and performance engine
//!
//! Core library behind the trade-recap server. Provides:
//! - Trade pairing: a buy/sell event log → completed round-trips + open positions
//! - Live valuation of open positions with bounded-retry price lookups
//! - Performance statistics (win rate, average/extreme returns, annualized Sharpe)
//! - Buy-signal ranking and the upstream feed client

pub mod api;
pub mod metrics;
pub mod prices;
pub mod reconciler;
pub mod signals;
pub mod types;

// Re-exports for convenience
pub use api::{FeedClient, FeedError, SymbolDetails};
pub use metrics::{summarize, summarize_sell_events};
pub use prices::{fetch_latest_price, PriceQuote, PriceSource, RetryPolicy, StaticPriceTable};
pub use reconciler::reconcile_trades;
pub use signals::rank_buy_signals;
pub use types::*;
