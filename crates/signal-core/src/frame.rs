use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Interval;

/// A cross-venue-reconciled, gap-filled OHLCV series for one
/// `(symbol, interval)` with aligned derived columns appended by curation.
///
/// All columns have the same length and `open_time` is strictly
/// increasing. Derived columns are keyed by name; the manifest reports
/// which ones are populated so downstream strategies can declare what
/// they consume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CuratedFrame {
    pub venue: String,
    pub symbol: String,
    pub interval: Option<Interval>,
    pub open_time: Vec<DateTime<Utc>>,
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
    /// Aggregate volume across all reconciled venues at each bar.
    pub total_volume: Vec<f64>,
    /// Preferred venue's share of the aggregate volume at each bar.
    pub relative_volume: Vec<f64>,
    /// Indicator and factor columns appended during curation.
    pub derived: BTreeMap<String, Vec<f64>>,
    /// Content-derived version of the dataset this frame was loaded from.
    pub dataset_version: String,
}

impl CuratedFrame {
    pub fn new(venue: impl Into<String>, symbol: impl Into<String>, interval: Interval) -> Self {
        Self {
            venue: venue.into(),
            symbol: symbol.into(),
            interval: Some(interval),
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.open_time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open_time.is_empty()
    }

    /// Look up a column by name: base OHLCV columns or any derived column.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        match name {
            "open" => Some(&self.open),
            "high" => Some(&self.high),
            "low" => Some(&self.low),
            "close" => Some(&self.close),
            "volume" => Some(&self.volume),
            "total_volume" => Some(&self.total_volume),
            "relative_volume" => Some(&self.relative_volume),
            _ => self.derived.get(name).map(|v| v.as_slice()),
        }
    }

    /// Attach a derived column. The column must match the frame length.
    pub fn set_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<(), String> {
        if values.len() != self.len() {
            return Err(format!(
                "column length {} does not match frame length {}",
                values.len(),
                self.len()
            ));
        }
        self.derived.insert(name.into(), values);
        Ok(())
    }

    /// Names of populated derived columns.
    pub fn manifest(&self) -> Vec<&str> {
        self.derived.keys().map(|k| k.as_str()).collect()
    }

    /// Last value of a column, if the frame is non-empty and the value is
    /// finite. NaN tails read as missing.
    pub fn last_value(&self, name: &str) -> Option<f64> {
        let col = self.column(name)?;
        let v = *col.last()?;
        v.is_finite().then_some(v)
    }

    pub fn last_open_time(&self) -> Option<DateTime<Utc>> {
        self.open_time.last().copied()
    }

    /// Check structural invariants: equal column lengths and strictly
    /// increasing open_time.
    pub fn validate(&self) -> Result<(), String> {
        let n = self.len();
        for (name, len) in [
            ("open", self.open.len()),
            ("high", self.high.len()),
            ("low", self.low.len()),
            ("close", self.close.len()),
            ("volume", self.volume.len()),
            ("total_volume", self.total_volume.len()),
            ("relative_volume", self.relative_volume.len()),
        ] {
            if len != n {
                return Err(format!("column {name} has length {len}, expected {n}"));
            }
        }
        for (name, col) in &self.derived {
            if col.len() != n {
                return Err(format!("derived column {name} has length {}, expected {n}", col.len()));
            }
        }
        for w in self.open_time.windows(2) {
            if w[1] <= w[0] {
                return Err(format!("open_time not strictly increasing at {}", w[1]));
            }
        }
        Ok(())
    }

    /// Copy of the frame restricted to `[start, end]` by open_time
    /// (inclusive bounds), preserving all derived columns.
    pub fn between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> CuratedFrame {
        let keep: Vec<usize> = self
            .open_time
            .iter()
            .enumerate()
            .filter(|(_, t)| **t >= start && **t <= end)
            .map(|(i, _)| i)
            .collect();
        self.take(&keep)
    }

    /// Copy of the frame restricted to the first `i + 1` rows, the prefix
    /// visible at bar index `i`. Prevents lookahead in replay loops.
    pub fn prefix(&self, i: usize) -> CuratedFrame {
        let end = (i + 1).min(self.len());
        self.take(&(0..end).collect::<Vec<_>>())
    }

    fn take(&self, indices: &[usize]) -> CuratedFrame {
        let pick = |col: &[f64]| indices.iter().map(|&i| col[i]).collect::<Vec<f64>>();
        CuratedFrame {
            venue: self.venue.clone(),
            symbol: self.symbol.clone(),
            interval: self.interval,
            open_time: indices.iter().map(|&i| self.open_time[i]).collect(),
            open: pick(&self.open),
            high: pick(&self.high),
            low: pick(&self.low),
            close: pick(&self.close),
            volume: pick(&self.volume),
            total_volume: pick(&self.total_volume),
            relative_volume: pick(&self.relative_volume),
            derived: self
                .derived
                .iter()
                .map(|(k, v)| (k.clone(), pick(v)))
                .collect(),
            dataset_version: self.dataset_version.clone(),
        }
    }
}
