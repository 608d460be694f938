//! Aggregate performance statistics over reconciled trades
//!
//! Pure and total: every input, including an empty or completed-free pair
//! set, produces a valid zero-filled summary. The Sharpe-style ratio
//! annualizes each trade's return to a 252-trading-day year and divides the
//! mean by the population standard deviation, with a zero fallback when the
//! spread is zero (single trade, or identical returns).

use crate::types::{PairStatus, PerformanceSummary, TradeAction, TradeEvent, TradePair};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// One completed trade's contribution to the statistics. The win flag is
/// kept separate from the return because the raw-event path classifies wins
/// by absolute profit, not by return.
struct Sample {
    ret: f64,
    days: i64,
    win: bool,
}

/// Summarize a reconciled pair set.
///
/// `total_trades` counts ALL pairs, open positions included; every other
/// statistic is computed over completed pairs only. A completed pair with an
/// unknown return contributes 0 and counts as a loss.
pub fn summarize(pairs: &[TradePair]) -> PerformanceSummary {
    let samples: Vec<Sample> = pairs
        .iter()
        .filter(|p| p.status == PairStatus::Completed)
        .map(|p| {
            let ret = p.return_pct.unwrap_or(0.0);
            Sample {
                ret,
                days: p.days_held,
                win: ret > 0.0,
            }
        })
        .collect();

    compose(pairs.len(), &samples)
}

/// Summarize a single symbol's raw event log, sell events carrying their own
/// precomputed returns and holding periods.
///
/// With no pair set to count, `total_trades` counts buy events (each buy
/// opens at most one round-trip). Wins are sells with positive absolute
/// profit; a sell with no recorded profit counts as a loss.
pub fn summarize_sell_events(events: &[TradeEvent]) -> PerformanceSummary {
    let buys = events
        .iter()
        .filter(|e| e.action == TradeAction::Buy)
        .count();

    let samples: Vec<Sample> = events
        .iter()
        .filter(|e| e.action == TradeAction::Sell)
        .map(|e| Sample {
            ret: e.return_pct.unwrap_or(0.0),
            days: e.days_held.unwrap_or(0),
            win: e.profit_loss.unwrap_or(0.0) > 0.0,
        })
        .collect();

    compose(buys, &samples)
}

fn compose(total_trades: usize, samples: &[Sample]) -> PerformanceSummary {
    if samples.is_empty() {
        return zeroed(total_trades);
    }

    let n = samples.len() as f64;
    let returns: Vec<f64> = samples.iter().map(|s| s.ret).collect();

    // Per-trade annualization; holding periods are never treated as zero
    let annualized: Vec<f64> = samples
        .iter()
        .map(|s| (1.0 + s.ret).powf(TRADING_DAYS_PER_YEAR / s.days.max(1) as f64) - 1.0)
        .collect();
    let mean_annualized = mean(&annualized);
    let variance = annualized
        .iter()
        .map(|r| (r - mean_annualized).powi(2))
        .sum::<f64>()
        / n;
    let std_dev = variance.sqrt();
    let sharpe_ratio = if std_dev != 0.0 {
        mean_annualized / std_dev
    } else {
        0.0
    };

    let win_returns: Vec<f64> = samples.iter().filter(|s| s.win).map(|s| s.ret).collect();
    let lose_returns: Vec<f64> = samples.iter().filter(|s| !s.win).map(|s| s.ret).collect();

    PerformanceSummary {
        total_trades,
        win_rate: win_returns.len() as f64 / n * 100.0,
        avg_return_pct: mean(&returns) * 100.0,
        avg_win_pct: if win_returns.is_empty() {
            0.0
        } else {
            mean(&win_returns) * 100.0
        },
        avg_loss_pct: if lose_returns.is_empty() {
            0.0
        } else {
            mean(&lose_returns) * 100.0
        },
        // Clamped against 0 so an all-losing history never reports a gain
        // extreme, and vice versa
        max_win_pct: returns.iter().copied().fold(0.0_f64, f64::max) * 100.0,
        max_loss_pct: returns.iter().copied().fold(0.0_f64, f64::min) * 100.0,
        avg_holding_days: samples.iter().map(|s| s.days as f64).sum::<f64>() / n,
        sharpe_ratio,
    }
}

fn zeroed(total_trades: usize) -> PerformanceSummary {
    PerformanceSummary {
        total_trades,
        win_rate: 0.0,
        avg_return_pct: 0.0,
        avg_win_pct: 0.0,
        avg_loss_pct: 0.0,
        max_win_pct: 0.0,
        max_loss_pct: 0.0,
        avg_holding_days: 0.0,
        sharpe_ratio: 0.0,
    }
}

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}
