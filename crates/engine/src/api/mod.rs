//! HTTP clients for the upstream signal/trade feed

pub mod feed;

pub use feed::{FeedClient, FeedError, PriceBar, SymbolDetails};
