use std::sync::Arc;

use candle_store::CandleStore;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use signal_core::{Candle, GapWindow, Interval, Settings, VenueAdapter};
use tokio::task::JoinSet;

use crate::error::IngestionError;
use crate::gaps::detect_gaps;

const FETCH_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    Ok,
    Empty,
    Partial,
}

/// Summary of one ingestion window for one `(symbol, interval)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub symbol: String,
    pub interval: Interval,
    pub status: IngestStatus,
    pub start: Option<DateTime<Utc>>,
    pub end: DateTime<Utc>,
    pub rows_per_venue: Vec<(String, usize)>,
    pub venue_errors: Vec<String>,
}

/// Multi-venue ingestion: fetches candles concurrently across venue
/// adapters, annotates them with order-book depth, and persists each
/// venue's series to its raw partition.
pub struct DataIngestion {
    venues: Vec<Arc<dyn VenueAdapter>>,
    store: CandleStore,
    chunk_bars: usize,
}

impl DataIngestion {
    pub fn new(venues: Vec<Arc<dyn VenueAdapter>>, store: CandleStore, settings: &Settings) -> Self {
        Self {
            venues,
            store,
            chunk_bars: settings.prestart_backfill_chunk.max(1),
        }
    }

    pub fn venue_names(&self) -> Vec<String> {
        self.venues.iter().map(|v| v.venue().to_string()).collect()
    }

    /// Compute the next ingestion window: from the freshest persisted bar
    /// across venues (or the lookback horizon when nothing is stored) up
    /// to now, capped at one chunk of bars.
    pub fn next_window(
        &self,
        symbol: &str,
        interval: Interval,
        lookback: Duration,
    ) -> (DateTime<Utc>, DateTime<Utc>) {
        let now = Utc::now();
        let mut last_end: Option<DateTime<Utc>> = None;
        for venue in &self.venues {
            if let Ok(candles) = self.store.read_raw(venue.venue(), symbol, interval) {
                if let Some(last) = candles.last() {
                    let candidate = last.open_time + interval.duration();
                    last_end = Some(match last_end {
                        Some(existing) => existing.max(candidate),
                        None => candidate,
                    });
                }
            }
        }
        let start = last_end.unwrap_or(now - lookback);
        let cap = start + interval.duration() * self.chunk_bars as i32;
        (start, now.min(cap))
    }

    /// Fetch one window from every venue in parallel and persist each
    /// venue's rows. A venue failure degrades the report rather than
    /// failing the whole window.
    pub async fn ingest_window(
        &self,
        symbol: &str,
        interval: Interval,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<IngestReport, IngestionError> {
        let end = end.unwrap_or_else(Utc::now);
        let mut set: JoinSet<(String, Result<Vec<Candle>, signal_core::VenueError>)> =
            JoinSet::new();

        for venue in &self.venues {
            let venue = Arc::clone(venue);
            let symbol = symbol.to_string();
            set.spawn(async move {
                let name = venue.venue().to_string();
                let mut result = match signal_core::with_timeout(
                    std::time::Duration::from_secs(FETCH_TIMEOUT_SECS),
                    "fetch_candles",
                    venue.fetch_candles(&symbol, interval, start, Some(end)),
                )
                .await
                {
                    Some(result) => result,
                    None => Err(signal_core::VenueError::Net {
                        venue: name.clone(),
                        message: format!("candle fetch timed out after {FETCH_TIMEOUT_SECS}s"),
                    }),
                };
                if let Ok(candles) = &mut result {
                    // Annotate the latest bar with top-of-book depth
                    if !candles.is_empty() {
                        match venue.fetch_orderbook(&symbol, 50).await {
                            Ok(depth) => {
                                let spread = crate::orderbook::derive_spread(&depth);
                                let imbalance = crate::orderbook::derive_imbalance(&depth);
                                tracing::debug!(
                                    venue = %name,
                                    spread_bps = spread.spread_bps,
                                    imbalance_pct = imbalance.imbalance_pct,
                                    "orderbook snapshot"
                                );
                                if let Some(last) = candles.last_mut() {
                                    last.best_bid_price = Some(depth.best_bid);
                                    last.best_ask_price = Some(depth.best_ask);
                                    last.bid_depth = Some(depth.bid_depth);
                                    last.ask_depth = Some(depth.ask_depth);
                                }
                            }
                            Err(e) => {
                                tracing::warn!(venue = %name, error = %e, "orderbook fetch failed");
                            }
                        }
                    }
                }
                (name, result)
            });
        }

        let mut rows_per_venue: Vec<(String, usize)> = Vec::new();
        let mut venue_errors: Vec<String> = Vec::new();
        while let Some(joined) = set.join_next().await {
            let (venue_name, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    venue_errors.push(format!("join error: {e}"));
                    continue;
                }
            };
            match result {
                Ok(candles) => {
                    if !candles.is_empty() {
                        self.store.append_raw(&venue_name, symbol, interval, &candles)?;
                    }
                    rows_per_venue.push((venue_name, candles.len()));
                }
                Err(e) => {
                    tracing::warn!(venue = %venue_name, error = %e, "venue fetch failed");
                    venue_errors.push(format!("{venue_name}: {e}"));
                }
            }
        }
        rows_per_venue.sort();

        let total_rows: usize = rows_per_venue.iter().map(|(_, n)| n).sum();
        let status = if total_rows == 0 {
            IngestStatus::Empty
        } else if venue_errors.is_empty() {
            IngestStatus::Ok
        } else {
            IngestStatus::Partial
        };

        tracing::info!(
            symbol,
            interval = %interval,
            rows = total_rows,
            errors = venue_errors.len(),
            "ingestion window complete"
        );
        Ok(IngestReport {
            symbol: symbol.to_string(),
            interval,
            status,
            start,
            end,
            rows_per_venue,
            venue_errors,
        })
    }

    /// Detect gaps in the preferred venue's raw series over a window.
    pub fn check_gaps(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<GapWindow>, IngestionError> {
        let Some(preferred) = self.venues.first() else {
            return Ok(Vec::new());
        };
        let candles = match self.store.read_raw(preferred.venue(), symbol, interval) {
            Ok(candles) => candles,
            Err(candle_store::StoreError::NotFound { .. }) => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        let present: Vec<DateTime<Utc>> = candles
            .iter()
            .map(|c| c.open_time)
            .filter(|t| *t >= start && *t < end)
            .collect();
        Ok(detect_gaps(&present, interval, start, end))
    }

    pub fn store(&self) -> &CandleStore {
        &self.store
    }

    /// Derivatives collector over the same venue set, writing into the
    /// raw partition tree.
    pub fn derivatives(&self) -> crate::derivatives::DerivativesCollector {
        crate::derivatives::DerivativesCollector::new(
            self.venues.clone(),
            self.store.raw_dir(),
        )
    }
}
