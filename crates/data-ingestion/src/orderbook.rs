//! Derived microstructure metrics from order book snapshots: spread,
//! imbalance, and effective depth for a target notional.

use serde::{Deserialize, Serialize};
use signal_core::OrderBookDepth;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpreadMetrics {
    pub absolute_spread: f64,
    pub relative_spread_pct: f64,
    pub spread_bps: f64,
}

pub fn derive_spread(snapshot: &OrderBookDepth) -> SpreadMetrics {
    let absolute_spread = snapshot.best_ask - snapshot.best_bid;
    let mid = snapshot.mid_price();
    if mid <= 0.0 {
        return SpreadMetrics::default();
    }
    SpreadMetrics {
        absolute_spread,
        relative_spread_pct: absolute_spread / mid * 100.0,
        spread_bps: absolute_spread / mid * 10_000.0,
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImbalanceMetrics {
    pub bid_volume: f64,
    pub ask_volume: f64,
    pub total_volume: f64,
    /// `(bids - asks) / (bids + asks)`; positive means buy pressure.
    pub imbalance_ratio: f64,
    pub imbalance_pct: f64,
}

pub fn derive_imbalance(snapshot: &OrderBookDepth) -> ImbalanceMetrics {
    let total = snapshot.bid_depth + snapshot.ask_depth;
    if total <= 0.0 {
        return ImbalanceMetrics::default();
    }
    let ratio = (snapshot.bid_depth - snapshot.ask_depth) / total;
    ImbalanceMetrics {
        bid_volume: snapshot.bid_depth,
        ask_volume: snapshot.ask_depth,
        total_volume: total,
        imbalance_ratio: ratio,
        imbalance_pct: ratio * 100.0,
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DepthMetrics {
    pub available_depth: f64,
    /// `notional / available_depth` capped at 1; 1 means the book cannot
    /// absorb the order at the snapshot depth.
    pub depth_utilization: f64,
    pub can_fill_completely: bool,
}

pub fn derive_effective_depth(snapshot: &OrderBookDepth, notional: f64, side: &str) -> DepthMetrics {
    let (depth_qty, price) = if side.eq_ignore_ascii_case("buy") {
        (snapshot.ask_depth, snapshot.best_ask)
    } else {
        (snapshot.bid_depth, snapshot.best_bid)
    };
    let available_depth = depth_qty * price;
    if available_depth <= 0.0 {
        return DepthMetrics {
            available_depth: 0.0,
            depth_utilization: 1.0,
            can_fill_completely: false,
        };
    }
    DepthMetrics {
        available_depth,
        depth_utilization: (notional / available_depth).min(1.0),
        can_fill_completely: notional <= available_depth,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snapshot(best_bid: f64, best_ask: f64, bid_depth: f64, ask_depth: f64) -> OrderBookDepth {
        OrderBookDepth {
            venue: "binance".to_string(),
            symbol: "BTCUSDT".to_string(),
            best_bid,
            best_ask,
            bid_depth,
            ask_depth,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn spread_in_bps() {
        let s = derive_spread(&snapshot(99.0, 101.0, 10.0, 10.0));
        assert!((s.absolute_spread - 2.0).abs() < 1e-12);
        assert!((s.spread_bps - 200.0).abs() < 1e-9);
    }

    #[test]
    fn imbalance_sign_follows_bid_pressure() {
        let buy_heavy = derive_imbalance(&snapshot(99.0, 101.0, 30.0, 10.0));
        assert!(buy_heavy.imbalance_ratio > 0.0);
        let sell_heavy = derive_imbalance(&snapshot(99.0, 101.0, 10.0, 30.0));
        assert!(sell_heavy.imbalance_ratio < 0.0);
    }

    #[test]
    fn depth_utilization_caps_at_one() {
        let d = derive_effective_depth(&snapshot(99.0, 101.0, 10.0, 2.0), 1_000_000.0, "buy");
        assert_eq!(d.depth_utilization, 1.0);
        assert!(!d.can_fill_completely);
    }
}
