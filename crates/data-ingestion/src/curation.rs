use candle_store::{CandleStore, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use signal_core::{
    CuratedFrame, DataFreshnessError, DataGapError, GapWindow, Interval,
};

use crate::error::IngestionError;
use crate::gaps::GAP_FILL_TOLERANCE;
use crate::reconcile::reconcile_venues;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurationReport {
    pub symbol: String,
    pub interval: Interval,
    pub rows: usize,
    pub checksum: String,
    pub dataset_version: String,
    pub filled_candles: usize,
    pub unfilled_gaps: Vec<GapWindow>,
}

/// The curation pipeline: reconcile venues, forward-fill small gaps,
/// append the canonical indicator suite, and write the result
/// atomically. The transform itself is pure; only the final write
/// touches disk.
pub struct DataCuration {
    store: CandleStore,
    /// Venue names in liquidity order; the first wins reconciliation
    /// conflicts and names the curated partition.
    venues: Vec<String>,
}

impl DataCuration {
    pub fn new(store: CandleStore, venues: Vec<String>) -> Self {
        Self { store, venues }
    }

    pub fn curate(&self, symbol: &str, interval: Interval) -> Result<CurationReport, IngestionError> {
        let mut per_venue: Vec<(String, Vec<signal_core::Candle>)> = Vec::new();
        for venue in &self.venues {
            match self.store.read_raw(venue, symbol, interval) {
                Ok(candles) => per_venue.push((venue.clone(), candles)),
                Err(StoreError::NotFound { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if per_venue.iter().all(|(_, c)| c.is_empty()) {
            return Err(IngestionError::Empty {
                context: format!("{symbol} {interval} raw partitions"),
            });
        }

        let frame = reconcile_venues(symbol, interval, &per_venue);
        let (mut frame, unfilled_gaps, filled_candles) = forward_fill_frame(frame, interval);

        for gap in &unfilled_gaps {
            tracing::warn!(
                symbol,
                interval = %interval,
                gap_start = %gap.start,
                gap_end = %gap.end,
                missing = gap.missing_candles,
                "gap beyond forward-fill tolerance left unfilled"
            );
        }

        technical_indicators::append_canonical_indicators(&mut frame)
            .map_err(IngestionError::InvalidFrame)?;
        frame.validate().map_err(IngestionError::InvalidFrame)?;

        let report = self.store.write_curated(&frame)?;
        tracing::info!(
            symbol,
            interval = %interval,
            rows = report.rows,
            dataset_version = %report.dataset_version,
            "curated frame written"
        );
        Ok(CurationReport {
            symbol: symbol.to_string(),
            interval,
            rows: report.rows,
            checksum: report.checksum,
            dataset_version: report.dataset_version,
            filled_candles,
            unfilled_gaps,
        })
    }

    pub fn load_latest(&self, symbol: &str, interval: Interval) -> Result<CuratedFrame, IngestionError> {
        let venue = self.preferred_venue();
        Ok(self.store.read_curated_latest(venue, symbol, interval)?)
    }

    /// Reject stale curated data: the latest candle must be younger than
    /// the per-interval freshness threshold.
    pub fn validate_freshness(
        &self,
        symbol: &str,
        interval: Interval,
        now: DateTime<Utc>,
    ) -> Result<(), DataFreshnessError> {
        let threshold_minutes = interval.freshness_threshold_minutes();
        let frame = self.load_latest(symbol, interval).map_err(|e| DataFreshnessError {
            interval,
            latest_timestamp: None,
            threshold_minutes,
            context_data: serde_json::json!({"symbol": symbol, "error": e.to_string()}),
        })?;
        let latest = frame.last_open_time().ok_or_else(|| DataFreshnessError {
            interval,
            latest_timestamp: None,
            threshold_minutes,
            context_data: serde_json::json!({"symbol": symbol, "reason": "empty curated frame"}),
        })?;
        let age_minutes = (now - latest).num_minutes();
        if age_minutes > threshold_minutes {
            return Err(DataFreshnessError {
                interval,
                latest_timestamp: Some(latest),
                threshold_minutes,
                context_data: serde_json::json!({
                    "symbol": symbol,
                    "age_minutes": age_minutes,
                }),
            });
        }
        Ok(())
    }

    /// Reject curated data with unresolved gaps beyond the fill
    /// tolerance.
    pub fn validate_gaps(&self, symbol: &str, interval: Interval) -> Result<(), DataGapError> {
        let frame = match self.load_latest(symbol, interval) {
            Ok(frame) => frame,
            Err(e) => {
                return Err(DataGapError {
                    interval,
                    gaps: Vec::new(),
                    tolerance_candles: GAP_FILL_TOLERANCE,
                    context_data: serde_json::json!({"symbol": symbol, "error": e.to_string()}),
                })
            }
        };
        let gaps = frame_gaps(&frame, interval);
        if gaps.is_empty() {
            Ok(())
        } else {
            Err(DataGapError {
                interval,
                gaps,
                tolerance_candles: GAP_FILL_TOLERANCE,
                context_data: serde_json::json!({"symbol": symbol}),
            })
        }
    }

    pub fn preferred_venue(&self) -> &str {
        self.venues.first().map(|v| v.as_str()).unwrap_or("binance")
    }

    pub fn store(&self) -> &CandleStore {
        &self.store
    }
}

/// Gaps remaining in a curated frame: spans where consecutive bars are
/// further apart than the fill tolerance allows.
pub fn frame_gaps(frame: &CuratedFrame, interval: Interval) -> Vec<GapWindow> {
    let step = interval.duration();
    let mut gaps = Vec::new();
    for w in frame.open_time.windows(2) {
        let expected = w[0] + step;
        if w[1] > expected {
            let missing = ((w[1] - w[0]).num_milliseconds() / step.num_milliseconds() - 1) as usize;
            if missing > GAP_FILL_TOLERANCE {
                gaps.push(GapWindow {
                    start: expected,
                    end: w[1] - step,
                    missing_candles: missing,
                });
            }
        }
    }
    gaps
}

/// Forward-fill gaps of up to the tolerance directly on a reconciled
/// frame. Synthetic bars carry the prior close with zero volume.
fn forward_fill_frame(
    frame: CuratedFrame,
    interval: Interval,
) -> (CuratedFrame, Vec<GapWindow>, usize) {
    let step = interval.duration();
    let mut out = CuratedFrame::new(frame.venue.clone(), frame.symbol.clone(), interval);
    out.dataset_version = frame.dataset_version.clone();
    let mut unfilled = Vec::new();
    let mut filled_candles = 0usize;

    for i in 0..frame.len() {
        if let Some(&prev_time) = out.open_time.last() {
            let missing = ((frame.open_time[i] - prev_time).num_milliseconds()
                / step.num_milliseconds()
                - 1)
                .max(0) as usize;
            if missing > 0 && missing <= GAP_FILL_TOLERANCE {
                let prev_close = *out.close.last().unwrap_or(&frame.open[i]);
                for k in 1..=missing {
                    out.open_time.push(prev_time + step * k as i32);
                    out.open.push(prev_close);
                    out.high.push(prev_close);
                    out.low.push(prev_close);
                    out.close.push(prev_close);
                    out.volume.push(0.0);
                    out.total_volume.push(0.0);
                    out.relative_volume.push(0.0);
                    filled_candles += 1;
                }
            } else if missing > GAP_FILL_TOLERANCE {
                unfilled.push(GapWindow {
                    start: prev_time + step,
                    end: frame.open_time[i] - step,
                    missing_candles: missing,
                });
            }
        }
        out.open_time.push(frame.open_time[i]);
        out.open.push(frame.open[i]);
        out.high.push(frame.high[i]);
        out.low.push(frame.low[i]);
        out.close.push(frame.close[i]);
        out.volume.push(frame.volume[i]);
        out.total_volume.push(frame.total_volume[i]);
        out.relative_volume.push(frame.relative_volume[i]);
    }
    (out, unfilled, filled_candles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn frame_with_times(offsets_hours: &[i64]) -> CuratedFrame {
        let mut f = CuratedFrame::new("binance", "BTCUSDT", Interval::H1);
        for (i, h) in offsets_hours.iter().enumerate() {
            f.open_time.push(t0() + Duration::hours(*h));
            f.open.push(100.0 + i as f64);
            f.high.push(101.0 + i as f64);
            f.low.push(99.0 + i as f64);
            f.close.push(100.5 + i as f64);
            f.volume.push(10.0);
            f.total_volume.push(10.0);
            f.relative_volume.push(1.0);
        }
        f
    }

    #[test]
    fn small_frame_gap_is_filled_with_prior_close() {
        let frame = frame_with_times(&[0, 1, 4]); // 2 missing bars
        let (filled, unfilled, count) = forward_fill_frame(frame, Interval::H1);
        assert_eq!(count, 2);
        assert!(unfilled.is_empty());
        assert_eq!(filled.len(), 5);
        assert_eq!(filled.close[2], 101.5);
        assert_eq!(filled.volume[2], 0.0);
        assert!(filled.validate().is_ok());
    }

    #[test]
    fn wide_frame_gap_is_reported_not_filled() {
        let frame = frame_with_times(&[0, 10]);
        let (filled, unfilled, count) = forward_fill_frame(frame, Interval::H1);
        assert_eq!(count, 0);
        assert_eq!(filled.len(), 2);
        assert_eq!(unfilled.len(), 1);
        assert_eq!(unfilled[0].missing_candles, 9);
    }

    #[test]
    fn frame_gaps_only_flags_beyond_tolerance() {
        let filled = frame_with_times(&[0, 1, 4]); // 2-bar hole, within tolerance
        assert!(frame_gaps(&filled, Interval::H1).is_empty());
        let holey = frame_with_times(&[0, 8]);
        let gaps = frame_gaps(&holey, Interval::H1);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].missing_candles, 7);
    }
}
