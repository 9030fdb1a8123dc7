use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use candle_store::NumericTable;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use signal_core::VenueAdapter;

use crate::error::IngestionError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DerivativesReport {
    pub funding_rows: usize,
    pub open_interest_rows: usize,
    pub venue_errors: Vec<String>,
}

/// Collect funding rates and open interest across venues and persist
/// them into per-venue parquet partitions next to the raw candles.
///
/// Rows merge by timestamp; persisted entries are never rewritten.
pub struct DerivativesCollector {
    venues: Vec<Arc<dyn VenueAdapter>>,
    raw_dir: PathBuf,
}

impl DerivativesCollector {
    pub fn new(venues: Vec<Arc<dyn VenueAdapter>>, raw_dir: impl Into<PathBuf>) -> Self {
        Self {
            venues,
            raw_dir: raw_dir.into(),
        }
    }

    pub async fn collect(
        &self,
        symbol: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<DerivativesReport, IngestionError> {
        let mut report = DerivativesReport::default();

        for venue in &self.venues {
            let name = venue.venue().to_string();

            match venue.fetch_funding(symbol, start, end).await {
                Ok(rates) if !rates.is_empty() => {
                    let rows: BTreeMap<i64, f64> = rates
                        .iter()
                        .map(|r| (r.funding_time.timestamp_millis(), r.funding_rate))
                        .collect();
                    let path = self.partition(&name, symbol, "funding.parquet");
                    report.funding_rows += self.merge_write(&path, "funding_rate", rows)?;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(venue = %name, error = %e, "funding fetch failed");
                    report.venue_errors.push(format!("{name} funding: {e}"));
                }
            }

            match venue.fetch_open_interest(symbol).await {
                Ok(points) if !points.is_empty() => {
                    let rows: BTreeMap<i64, f64> = points
                        .iter()
                        .map(|p| (p.timestamp.timestamp_millis(), p.open_interest))
                        .collect();
                    let path = self.partition(&name, symbol, "open_interest.parquet");
                    report.open_interest_rows += self.merge_write(&path, "open_interest", rows)?;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(venue = %name, error = %e, "open interest fetch failed");
                    report.venue_errors.push(format!("{name} open_interest: {e}"));
                }
            }
        }

        Ok(report)
    }

    fn partition(&self, venue: &str, symbol: &str, file: &str) -> PathBuf {
        self.raw_dir.join(venue).join(symbol).join(file)
    }

    /// Merge rows into an existing single-column table by timestamp;
    /// stored values win on conflict.
    fn merge_write(
        &self,
        path: &std::path::Path,
        column: &str,
        mut rows: BTreeMap<i64, f64>,
    ) -> Result<usize, IngestionError> {
        if path.exists() {
            let existing = NumericTable::read(path)?;
            if let Some(values) = existing.floats.get(column) {
                for (time, value) in existing.time.iter().zip(values) {
                    rows.insert(*time, *value);
                }
            }
        }
        let mut table = NumericTable::new();
        table.time = rows.keys().copied().collect();
        table
            .floats
            .insert(column.to_string(), rows.values().copied().collect());
        table.write(path)?;
        Ok(table.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_write_keeps_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let collector = DerivativesCollector::new(Vec::new(), dir.path());
        let path = dir.path().join("binance/BTCUSDT/funding.parquet");

        let first: BTreeMap<i64, f64> = [(1_000, 0.0001), (2_000, 0.0002)].into();
        assert_eq!(collector.merge_write(&path, "funding_rate", first).unwrap(), 2);

        // Overlapping write: stored values win, new timestamps append
        let second: BTreeMap<i64, f64> = [(2_000, 0.0009), (3_000, 0.0003)].into();
        assert_eq!(collector.merge_write(&path, "funding_rate", second).unwrap(), 3);

        let table = NumericTable::read(&path).unwrap();
        assert_eq!(table.time, vec![1_000, 2_000, 3_000]);
        assert_eq!(table.floats["funding_rate"][1], 0.0002);
    }
}
