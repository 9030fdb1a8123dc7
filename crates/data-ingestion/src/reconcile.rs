use std::collections::BTreeMap;

use signal_core::{Candle, CuratedFrame, Interval};

/// Reconcile per-venue candle series into a single frame.
///
/// Venues are given in liquidity order; the first venue carrying a bar
/// wins its OHLC on conflict. `total_volume` aggregates volume across all
/// venues at each timestamp and `relative_volume` is the winning venue's
/// share of it.
pub fn reconcile_venues(
    symbol: &str,
    interval: Interval,
    per_venue: &[(String, Vec<Candle>)],
) -> CuratedFrame {
    // timestamp -> (winning candle, total volume). Venues iterate in
    // liquidity order, so the first candle seen at a timestamp wins.
    let mut merged: BTreeMap<i64, (Candle, f64)> = BTreeMap::new();

    for (_venue, candles) in per_venue {
        for candle in candles {
            let key = candle.open_time.timestamp_millis();
            match merged.get_mut(&key) {
                None => {
                    merged.insert(key, (candle.clone(), candle.volume));
                }
                Some((_winner, total)) => {
                    *total += candle.volume;
                }
            }
        }
    }

    let preferred_venue = per_venue
        .first()
        .map(|(venue, _)| venue.clone())
        .unwrap_or_default();
    let mut frame = CuratedFrame::new(preferred_venue, symbol, interval);
    for (_, (candle, total_volume)) in merged {
        frame.open_time.push(candle.open_time);
        frame.open.push(candle.open);
        frame.high.push(candle.high);
        frame.low.push(candle.low);
        frame.close.push(candle.close);
        frame.volume.push(candle.volume);
        frame.total_volume.push(total_volume);
        frame
            .relative_volume
            .push(if total_volume > 0.0 { candle.volume / total_volume } else { 0.0 });
    }
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn candle(venue: &str, open_time: DateTime<Utc>, close: f64, volume: f64) -> Candle {
        Candle {
            venue: venue.to_string(),
            symbol: "BTCUSDT".to_string(),
            interval: Interval::H1,
            open_time,
            close_time: Candle::close_time_for(open_time, Interval::H1),
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
            volume,
            taker_buy_base: None,
            best_bid_price: None,
            best_ask_price: None,
            bid_depth: None,
            ask_depth: None,
            relative_volume: None,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn preferred_venue_wins_conflicts() {
        let binance = vec![candle("binance", t0(), 100.0, 30.0)];
        let bybit = vec![candle("bybit", t0(), 105.0, 10.0)];
        let frame = reconcile_venues(
            "BTCUSDT",
            Interval::H1,
            &[
                ("binance".to_string(), binance),
                ("bybit".to_string(), bybit),
            ],
        );
        assert_eq!(frame.len(), 1);
        assert_eq!(frame.close[0], 100.0);
        assert_eq!(frame.total_volume[0], 40.0);
        assert!((frame.relative_volume[0] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn secondary_venue_fills_missing_bars() {
        let binance = vec![candle("binance", t0(), 100.0, 30.0)];
        let bybit = vec![
            candle("bybit", t0(), 105.0, 10.0),
            candle("bybit", t0() + Duration::hours(1), 106.0, 12.0),
        ];
        let frame = reconcile_venues(
            "BTCUSDT",
            Interval::H1,
            &[
                ("binance".to_string(), binance),
                ("bybit".to_string(), bybit),
            ],
        );
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.close[1], 106.0);
        assert_eq!(frame.relative_volume[1], 1.0);
    }

    #[test]
    fn output_is_time_ordered() {
        let series = vec![
            candle("binance", t0() + Duration::hours(2), 102.0, 1.0),
            candle("binance", t0(), 100.0, 1.0),
            candle("binance", t0() + Duration::hours(1), 101.0, 1.0),
        ];
        let frame = reconcile_venues("BTCUSDT", Interval::H1, &[("binance".to_string(), series)]);
        assert!(frame.validate().is_ok());
        assert_eq!(frame.close, vec![100.0, 101.0, 102.0]);
    }
}
