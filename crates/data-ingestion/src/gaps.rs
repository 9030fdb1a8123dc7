use chrono::{DateTime, Utc};
use signal_core::{Candle, GapWindow, Interval};

/// Gaps of at most this many consecutive candles are forward-filled in
/// curation; anything larger is reported and blocks signal generation.
pub const GAP_FILL_TOLERANCE: usize = 3;

/// Expected bar open timestamps in `[start, end)`, aligned to the
/// interval grid.
pub fn expected_timestamps(
    interval: Interval,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    let step = interval.millis();
    let start_ms = start.timestamp_millis();
    let aligned = start_ms - start_ms.rem_euclid(step);
    let mut out = Vec::new();
    let mut cursor = if aligned < start_ms { aligned + step } else { aligned };
    let end_ms = end.timestamp_millis();
    while cursor < end_ms {
        if let Some(ts) = DateTime::from_timestamp_millis(cursor) {
            out.push(ts);
        }
        cursor += step;
    }
    out
}

/// Detect missing bar spans against the expected grid. Consecutive
/// missing timestamps collapse into one `GapWindow`.
pub fn detect_gaps(
    present: &[DateTime<Utc>],
    interval: Interval,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<GapWindow> {
    let expected = expected_timestamps(interval, start, end);
    let present_set: std::collections::BTreeSet<i64> =
        present.iter().map(|t| t.timestamp_millis()).collect();

    let mut gaps: Vec<GapWindow> = Vec::new();
    let mut open: Option<(DateTime<Utc>, DateTime<Utc>, usize)> = None;
    for ts in expected {
        if present_set.contains(&ts.timestamp_millis()) {
            if let Some((gap_start, gap_end, missing)) = open.take() {
                gaps.push(GapWindow {
                    start: gap_start,
                    end: gap_end,
                    missing_candles: missing,
                });
            }
        } else {
            open = match open {
                None => Some((ts, ts, 1)),
                Some((gap_start, _, missing)) => Some((gap_start, ts, missing + 1)),
            };
        }
    }
    if let Some((gap_start, gap_end, missing)) = open {
        gaps.push(GapWindow {
            start: gap_start,
            end: gap_end,
            missing_candles: missing,
        });
    }
    gaps
}

/// Forward-fill gaps of up to `GAP_FILL_TOLERANCE` bars by carrying the
/// prior close forward as a zero-volume synthetic bar. Returns the filled
/// series and the gaps that were too wide to fill.
pub fn forward_fill(candles: &[Candle], interval: Interval) -> (Vec<Candle>, Vec<GapWindow>) {
    let mut filled: Vec<Candle> = Vec::with_capacity(candles.len());
    let mut unfilled: Vec<GapWindow> = Vec::new();
    let step = interval.duration();

    for candle in candles {
        if let Some(prev) = filled.last() {
            let mut missing = 0usize;
            let mut cursor = prev.open_time + step;
            while cursor < candle.open_time {
                missing += 1;
                cursor += step;
            }
            if missing > 0 && missing <= GAP_FILL_TOLERANCE {
                let template = prev.clone();
                let mut cursor = template.open_time + step;
                while cursor < candle.open_time {
                    let mut synthetic = template.clone();
                    synthetic.open_time = cursor;
                    synthetic.close_time = Candle::close_time_for(cursor, interval);
                    synthetic.open = template.close;
                    synthetic.high = template.close;
                    synthetic.low = template.close;
                    synthetic.close = template.close;
                    synthetic.volume = 0.0;
                    synthetic.taker_buy_base = None;
                    filled.push(synthetic);
                    cursor += step;
                }
            } else if missing > GAP_FILL_TOLERANCE {
                unfilled.push(GapWindow {
                    start: prev.open_time + step,
                    end: candle.open_time - step,
                    missing_candles: missing,
                });
            }
        }
        filled.push(candle.clone());
    }
    (filled, unfilled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn candle_at(open_time: DateTime<Utc>) -> Candle {
        Candle {
            venue: "binance".to_string(),
            symbol: "BTCUSDT".to_string(),
            interval: Interval::H1,
            open_time,
            close_time: Candle::close_time_for(open_time, Interval::H1),
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.5,
            volume: 10.0,
            taker_buy_base: None,
            best_bid_price: None,
            best_ask_price: None,
            bid_depth: None,
            ask_depth: None,
            relative_volume: None,
        }
    }

    #[test]
    fn expected_grid_is_aligned() {
        let start = t0() + Duration::minutes(10);
        let grid = expected_timestamps(Interval::H1, start, start + Duration::hours(3));
        assert_eq!(grid.len(), 3);
        assert_eq!(grid[0], t0() + Duration::hours(1));
    }

    #[test]
    fn consecutive_missing_bars_collapse_into_one_gap() {
        let present = vec![t0(), t0() + Duration::hours(4)];
        let gaps = detect_gaps(&present, Interval::H1, t0(), t0() + Duration::hours(5));
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].missing_candles, 3);
        assert_eq!(gaps[0].start, t0() + Duration::hours(1));
        assert_eq!(gaps[0].end, t0() + Duration::hours(3));
    }

    #[test]
    fn complete_series_has_no_gaps() {
        let present: Vec<_> = (0..5).map(|i| t0() + Duration::hours(i)).collect();
        let gaps = detect_gaps(&present, Interval::H1, t0(), t0() + Duration::hours(5));
        assert!(gaps.is_empty());
    }

    #[test]
    fn small_gaps_are_forward_filled_with_zero_volume() {
        let candles = vec![
            candle_at(t0()),
            candle_at(t0() + Duration::hours(3)), // 2 missing
        ];
        let (filled, unfilled) = forward_fill(&candles, Interval::H1);
        assert_eq!(filled.len(), 4);
        assert!(unfilled.is_empty());
        assert_eq!(filled[1].close, 100.5);
        assert_eq!(filled[1].open, 100.5);
        assert_eq!(filled[1].volume, 0.0);
        assert_eq!(filled[1].open_time, t0() + Duration::hours(1));
    }

    #[test]
    fn wide_gaps_stay_unfilled_and_are_reported() {
        let candles = vec![
            candle_at(t0()),
            candle_at(t0() + Duration::hours(6)), // 5 missing, beyond tolerance
        ];
        let (filled, unfilled) = forward_fill(&candles, Interval::H1);
        assert_eq!(filled.len(), 2);
        assert_eq!(unfilled.len(), 1);
        assert_eq!(unfilled[0].missing_candles, 5);
    }
}
