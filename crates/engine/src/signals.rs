//! Buy-signal ranking for the recommendations view

use std::cmp::Ordering;

use crate::types::{TradeAction, TradeEvent};

/// Keep buy events only, newest first; a stronger signal wins same-day ties.
pub fn rank_buy_signals(events: Vec<TradeEvent>) -> Vec<TradeEvent> {
    let mut buys: Vec<TradeEvent> = events
        .into_iter()
        .filter(|e| e.action == TradeAction::Buy)
        .collect();

    buys.sort_by(|a, b| {
        b.date.cmp(&a.date).then_with(|| {
            let sa = a.signal_strength.unwrap_or(0.0);
            let sb = b.signal_strength.unwrap_or(0.0);
            sb.partial_cmp(&sa).unwrap_or(Ordering::Equal)
        })
    });

    buys
}
