use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Datelike, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};
use signal_core::{Candle, CuratedFrame, Interval, Settings};

use crate::error::StoreError;

const RAW_BASE_COLUMNS: [&str; 9] = [
    "open_time", "close_time", "open", "high", "low", "close", "volume", "venue", "symbol",
];
const RAW_EXTRA_COLUMNS: [&str; 6] = [
    "taker_buy_base",
    "best_bid_price",
    "best_ask_price",
    "bid_depth",
    "ask_depth",
    "relative_volume",
];
const CURATED_BASE_COLUMNS: [&str; 10] = [
    "open_time",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "total_volume",
    "relative_volume",
    "venue",
    "symbol",
];

/// Result of a checksum verification. Reported as a gauge by callers:
/// `Verified = 1`, `Mismatch = 0`, `Missing = -1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumState {
    Verified,
    Mismatch,
    Missing,
}

impl ChecksumState {
    pub fn as_metric(&self) -> i8 {
        match self {
            ChecksumState::Verified => 1,
            ChecksumState::Mismatch => 0,
            ChecksumState::Missing => -1,
        }
    }
}

/// Outcome of a store write, persisted alongside the file as metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreWriteReport {
    pub path: PathBuf,
    pub rows: usize,
    pub checksum: String,
    pub dataset_version: String,
    pub written_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FileMetadata {
    rows: usize,
    checksum: String,
    dataset_version: String,
    written_at: DateTime<Utc>,
}

/// Partitioned append-only persistence for raw and curated candle series.
///
/// Layout: `raw/<venue>/<symbol>/<interval>/<symbol>.parquet` and
/// `curated/<venue>/<symbol>/<interval>/latest.parquet` with per-year
/// history partitions. Every write is temp-and-rename atomic and emits a
/// SHA-256 content hash in a `.meta.json` sidecar.
#[derive(Debug, Clone)]
pub struct CandleStore {
    raw_dir: PathBuf,
    curated_dir: PathBuf,
}

impl CandleStore {
    pub fn new(raw_dir: impl Into<PathBuf>, curated_dir: impl Into<PathBuf>) -> Self {
        Self {
            raw_dir: raw_dir.into(),
            curated_dir: curated_dir.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.raw_data_dir, &settings.curated_data_dir)
    }

    pub fn raw_dir(&self) -> &Path {
        &self.raw_dir
    }

    pub fn raw_path(&self, venue: &str, symbol: &str, interval: Interval) -> PathBuf {
        self.raw_dir
            .join(venue)
            .join(symbol)
            .join(interval.as_str())
            .join(format!("{symbol}.parquet"))
    }

    pub fn curated_latest_path(&self, venue: &str, symbol: &str, interval: Interval) -> PathBuf {
        self.curated_dir
            .join(venue)
            .join(symbol)
            .join(interval.as_str())
            .join("latest.parquet")
    }

    fn curated_history_path(
        &self,
        venue: &str,
        symbol: &str,
        interval: Interval,
        year: i32,
    ) -> PathBuf {
        self.curated_dir
            .join(venue)
            .join(symbol)
            .join(interval.as_str())
            .join("history")
            .join(format!("{year}.parquet"))
    }

    /// Merge new candles into the raw partition. Existing rows win on
    /// duplicate `open_time`: persisted candles are never mutated.
    pub fn append_raw(
        &self,
        venue: &str,
        symbol: &str,
        interval: Interval,
        candles: &[Candle],
    ) -> Result<StoreWriteReport, StoreError> {
        let path = self.raw_path(venue, symbol, interval);
        let mut merged: BTreeMap<i64, Candle> = BTreeMap::new();
        for candle in candles {
            merged.insert(candle.open_time.timestamp_millis(), candle.clone());
        }
        if path.exists() {
            for existing in self.read_raw(venue, symbol, interval)? {
                merged.insert(existing.open_time.timestamp_millis(), existing);
            }
        }
        let all: Vec<Candle> = merged.into_values().collect();
        let batch = candles_to_batch(&all)?;
        self.write_batch(&path, batch, all.len())
    }

    /// Read the full raw series in open_time order, verifying the
    /// content checksum first. A mismatch is an error; a missing sidecar
    /// is tolerated with a warning.
    pub fn read_raw(
        &self,
        venue: &str,
        symbol: &str,
        interval: Interval,
    ) -> Result<Vec<Candle>, StoreError> {
        let path = self.raw_path(venue, symbol, interval);
        self.enforce_checksum(&path)?;
        let batches = read_batches(&path)?;
        let mut candles = Vec::new();
        for batch in &batches {
            candles.extend(batch_to_candles(batch, &path, interval)?);
        }
        candles.sort_by_key(|c| c.open_time);
        Ok(candles)
    }

    /// Write a curated frame to `latest.parquet` and mirror it into the
    /// per-year history partitions.
    pub fn write_curated(&self, frame: &CuratedFrame) -> Result<StoreWriteReport, StoreError> {
        let interval = frame
            .interval
            .ok_or_else(|| StoreError::schema(Path::new("<frame>"), "frame has no interval"))?;
        let path = self.curated_latest_path(&frame.venue, &frame.symbol, interval);
        let batch = frame_to_batch(frame)?;
        let report = self.write_batch(&path, batch, frame.len())?;

        let mut years: Vec<i32> = frame.open_time.iter().map(|t| t.year()).collect();
        years.dedup();
        for year in years {
            let first = frame.open_time.iter().position(|t| t.year() == year);
            let last = frame.open_time.iter().rposition(|t| t.year() == year);
            let (Some(first), Some(last)) = (first, last) else {
                continue;
            };
            let slice = frame.between(frame.open_time[first], frame.open_time[last]);
            let history = self.curated_history_path(&frame.venue, &frame.symbol, interval, year);
            let batch = frame_to_batch(&slice)?;
            self.write_batch(&history, batch, slice.len())?;
        }
        Ok(report)
    }

    /// Load the latest curated frame, verifying the checksum.
    pub fn read_curated_latest(
        &self,
        venue: &str,
        symbol: &str,
        interval: Interval,
    ) -> Result<CuratedFrame, StoreError> {
        let path = self.curated_latest_path(venue, symbol, interval);
        self.enforce_checksum(&path)?;
        let batches = read_batches(&path)?;
        let mut frame = CuratedFrame::new(venue, symbol, interval);
        for batch in &batches {
            append_batch_to_frame(batch, &path, &mut frame)?;
        }
        frame.dataset_version = self
            .read_metadata(&path)
            .map(|m| m.dataset_version)
            .unwrap_or_default();
        Ok(frame)
    }

    /// Recompute and compare a file's checksum against its sidecar.
    pub fn verify_checksum(&self, path: &Path) -> ChecksumState {
        let Some(meta) = self.read_metadata(path) else {
            return ChecksumState::Missing;
        };
        match signal_core::hashing::sha256_file(path) {
            Ok(computed) if computed == meta.checksum => ChecksumState::Verified,
            Ok(_) => ChecksumState::Mismatch,
            Err(_) => ChecksumState::Missing,
        }
    }

    fn enforce_checksum(&self, path: &Path) -> Result<(), StoreError> {
        if !path.exists() {
            return Err(StoreError::NotFound {
                path: path.display().to_string(),
            });
        }
        let Some(meta) = self.read_metadata(path) else {
            tracing::warn!(path = %path.display(), "no checksum sidecar; skipping verification");
            return Ok(());
        };
        let computed =
            signal_core::hashing::sha256_file(path).map_err(|e| StoreError::io(path, e))?;
        if computed == meta.checksum {
            Ok(())
        } else {
            Err(StoreError::ChecksumMismatch {
                path: path.display().to_string(),
                stored: meta.checksum,
                computed,
            })
        }
    }

    fn write_batch(
        &self,
        path: &Path,
        batch: RecordBatch,
        rows: usize,
    ) -> Result<StoreWriteReport, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let tmp = path.with_extension("parquet.tmp");
        {
            let file = File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
            let props = WriterProperties::builder()
                .set_compression(Compression::SNAPPY)
                .build();
            let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
            writer.write(&batch)?;
            writer.close()?;
        }
        let checksum =
            signal_core::hashing::sha256_file(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))?;

        let metadata = FileMetadata {
            rows,
            checksum: checksum.clone(),
            dataset_version: checksum[..12].to_string(),
            written_at: Utc::now(),
        };
        let meta_path = metadata_path(path);
        std::fs::write(
            &meta_path,
            serde_json::to_vec_pretty(&metadata).expect("metadata serializes"),
        )
        .map_err(|e| StoreError::io(&meta_path, e))?;

        tracing::debug!(path = %path.display(), rows, checksum = %checksum, "wrote partition");
        Ok(StoreWriteReport {
            path: path.to_path_buf(),
            rows,
            checksum,
            dataset_version: metadata.dataset_version,
            written_at: metadata.written_at,
        })
    }

    fn read_metadata(&self, path: &Path) -> Option<FileMetadata> {
        let bytes = std::fs::read(metadata_path(path)).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Dataset version for the curated partition, from the write sidecar.
    pub fn dataset_version(
        &self,
        venue: &str,
        symbol: &str,
        interval: Interval,
    ) -> Option<String> {
        let path = self.curated_latest_path(venue, symbol, interval);
        self.read_metadata(&path).map(|m| m.dataset_version)
    }
}

fn metadata_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".meta.json");
    path.with_file_name(name)
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}

fn candles_to_batch(candles: &[Candle]) -> Result<RecordBatch, StoreError> {
    let mut fields: Vec<Field> = vec![
        Field::new("open_time", DataType::Int64, false),
        Field::new("close_time", DataType::Int64, false),
        Field::new("open", DataType::Float64, false),
        Field::new("high", DataType::Float64, false),
        Field::new("low", DataType::Float64, false),
        Field::new("close", DataType::Float64, false),
        Field::new("volume", DataType::Float64, false),
        Field::new("venue", DataType::Utf8, false),
        Field::new("symbol", DataType::Utf8, false),
    ];
    for name in RAW_EXTRA_COLUMNS {
        fields.push(Field::new(name, DataType::Float64, true));
    }
    let schema = Arc::new(Schema::new(fields));

    let opt = |pick: fn(&Candle) -> Option<f64>| {
        Arc::new(Float64Array::from(
            candles.iter().map(pick).collect::<Vec<_>>(),
        )) as ArrayRef
    };
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from(
            candles
                .iter()
                .map(|c| c.open_time.timestamp_millis())
                .collect::<Vec<_>>(),
        )),
        Arc::new(Int64Array::from(
            candles
                .iter()
                .map(|c| c.close_time.timestamp_millis())
                .collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            candles.iter().map(|c| c.open).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            candles.iter().map(|c| c.high).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            candles.iter().map(|c| c.low).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            candles.iter().map(|c| c.close).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            candles.iter().map(|c| c.volume).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            candles.iter().map(|c| c.venue.as_str()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            candles.iter().map(|c| c.symbol.as_str()).collect::<Vec<_>>(),
        )),
        opt(|c| c.taker_buy_base),
        opt(|c| c.best_bid_price),
        opt(|c| c.best_ask_price),
        opt(|c| c.bid_depth),
        opt(|c| c.ask_depth),
        opt(|c| c.relative_volume),
    ];
    Ok(RecordBatch::try_new(schema, columns)?)
}

fn batch_to_candles(
    batch: &RecordBatch,
    path: &Path,
    interval: Interval,
) -> Result<Vec<Candle>, StoreError> {
    let i64_col = |name: &str| -> Result<&Int64Array, StoreError> {
        batch
            .column_by_name(name)
            .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
            .ok_or_else(|| StoreError::schema(path, format!("missing int64 column {name}")))
    };
    let f64_col = |name: &str| -> Result<&Float64Array, StoreError> {
        batch
            .column_by_name(name)
            .and_then(|c| c.as_any().downcast_ref::<Float64Array>())
            .ok_or_else(|| StoreError::schema(path, format!("missing float64 column {name}")))
    };
    let str_col = |name: &str| -> Result<&StringArray, StoreError> {
        batch
            .column_by_name(name)
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| StoreError::schema(path, format!("missing utf8 column {name}")))
    };
    let opt_f64 = |name: &str| -> Option<&Float64Array> {
        batch
            .column_by_name(name)
            .and_then(|c| c.as_any().downcast_ref::<Float64Array>())
    };
    let opt_at = |arr: Option<&Float64Array>, i: usize| -> Option<f64> {
        arr.and_then(|a| (!a.is_null(i)).then(|| a.value(i)))
    };

    let open_time = i64_col("open_time")?;
    let close_time = i64_col("close_time")?;
    let open = f64_col("open")?;
    let high = f64_col("high")?;
    let low = f64_col("low")?;
    let close = f64_col("close")?;
    let volume = f64_col("volume")?;
    let venue = str_col("venue")?;
    let symbol = str_col("symbol")?;
    let taker_buy_base = opt_f64("taker_buy_base");
    let best_bid_price = opt_f64("best_bid_price");
    let best_ask_price = opt_f64("best_ask_price");
    let bid_depth = opt_f64("bid_depth");
    let ask_depth = opt_f64("ask_depth");
    let relative_volume = opt_f64("relative_volume");

    let mut candles = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        candles.push(Candle {
            venue: venue.value(i).to_string(),
            symbol: symbol.value(i).to_string(),
            interval,
            open_time: millis_to_datetime(open_time.value(i)),
            close_time: millis_to_datetime(close_time.value(i)),
            open: open.value(i),
            high: high.value(i),
            low: low.value(i),
            close: close.value(i),
            volume: volume.value(i),
            taker_buy_base: opt_at(taker_buy_base, i),
            best_bid_price: opt_at(best_bid_price, i),
            best_ask_price: opt_at(best_ask_price, i),
            bid_depth: opt_at(bid_depth, i),
            ask_depth: opt_at(ask_depth, i),
            relative_volume: opt_at(relative_volume, i),
        });
    }
    Ok(candles)
}

fn frame_to_batch(frame: &CuratedFrame) -> Result<RecordBatch, StoreError> {
    let mut fields: Vec<Field> = vec![
        Field::new("open_time", DataType::Int64, false),
        Field::new("open", DataType::Float64, false),
        Field::new("high", DataType::Float64, false),
        Field::new("low", DataType::Float64, false),
        Field::new("close", DataType::Float64, false),
        Field::new("volume", DataType::Float64, false),
        Field::new("total_volume", DataType::Float64, false),
        Field::new("relative_volume", DataType::Float64, false),
        Field::new("venue", DataType::Utf8, false),
        Field::new("symbol", DataType::Utf8, false),
    ];
    for name in frame.derived.keys() {
        fields.push(Field::new(name, DataType::Float64, false));
    }
    let schema = Arc::new(Schema::new(fields));

    let n = frame.len();
    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from(
            frame
                .open_time
                .iter()
                .map(|t| t.timestamp_millis())
                .collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(frame.open.clone())),
        Arc::new(Float64Array::from(frame.high.clone())),
        Arc::new(Float64Array::from(frame.low.clone())),
        Arc::new(Float64Array::from(frame.close.clone())),
        Arc::new(Float64Array::from(frame.volume.clone())),
        Arc::new(Float64Array::from(frame.total_volume.clone())),
        Arc::new(Float64Array::from(frame.relative_volume.clone())),
        Arc::new(StringArray::from(vec![frame.venue.as_str(); n])),
        Arc::new(StringArray::from(vec![frame.symbol.as_str(); n])),
    ];
    for col in frame.derived.values() {
        columns.push(Arc::new(Float64Array::from(col.clone())));
    }
    Ok(RecordBatch::try_new(schema, columns)?)
}

fn append_batch_to_frame(
    batch: &RecordBatch,
    path: &Path,
    frame: &mut CuratedFrame,
) -> Result<(), StoreError> {
    let f64_col = |name: &str| -> Result<Vec<f64>, StoreError> {
        batch
            .column_by_name(name)
            .and_then(|c| c.as_any().downcast_ref::<Float64Array>())
            .map(|a| a.values().to_vec())
            .ok_or_else(|| StoreError::schema(path, format!("missing float64 column {name}")))
    };
    let open_time = batch
        .column_by_name("open_time")
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .ok_or_else(|| StoreError::schema(path, "missing int64 column open_time"))?;

    frame
        .open_time
        .extend(open_time.values().iter().map(|ms| millis_to_datetime(*ms)));
    frame.open.extend(f64_col("open")?);
    frame.high.extend(f64_col("high")?);
    frame.low.extend(f64_col("low")?);
    frame.close.extend(f64_col("close")?);
    frame.volume.extend(f64_col("volume")?);
    frame.total_volume.extend(f64_col("total_volume")?);
    frame.relative_volume.extend(f64_col("relative_volume")?);

    for field in batch.schema().fields() {
        let name = field.name().as_str();
        if CURATED_BASE_COLUMNS.contains(&name) || RAW_BASE_COLUMNS.contains(&name) {
            continue;
        }
        if field.data_type() == &DataType::Float64 {
            let values = f64_col(name)?;
            frame.derived.entry(name.to_string()).or_default().extend(values);
        }
    }
    Ok(())
}

fn read_batches(path: &Path) -> Result<Vec<RecordBatch>, StoreError> {
    let file = File::open(path).map_err(|e| StoreError::io(path, e))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    let mut batches = Vec::new();
    for batch in reader {
        batches.push(batch?);
    }
    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candle(open_time: DateTime<Utc>, close: f64) -> Candle {
        Candle {
            venue: "binance".to_string(),
            symbol: "BTCUSDT".to_string(),
            interval: Interval::H1,
            open_time,
            close_time: Candle::close_time_for(open_time, Interval::H1),
            open: close - 1.0,
            high: close + 2.0,
            low: close - 2.0,
            close,
            volume: 10.0,
            taker_buy_base: Some(4.0),
            best_bid_price: None,
            best_ask_price: None,
            bid_depth: None,
            ask_depth: None,
            relative_volume: None,
        }
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn raw_roundtrip_preserves_rows_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = CandleStore::new(dir.path().join("raw"), dir.path().join("curated"));

        let candles: Vec<Candle> = (0..5)
            .map(|i| candle(base_time() + chrono::Duration::hours(i), 100.0 + i as f64))
            .collect();
        let report = store
            .append_raw("binance", "BTCUSDT", Interval::H1, &candles)
            .unwrap();
        assert_eq!(report.rows, 5);

        let loaded = store.read_raw("binance", "BTCUSDT", Interval::H1).unwrap();
        assert_eq!(loaded.len(), 5);
        assert_eq!(loaded[0].close, 100.0);
        assert_eq!(loaded[4].close, 104.0);
        assert_eq!(loaded[2].taker_buy_base, Some(4.0));
        assert!(loaded.windows(2).all(|w| w[0].open_time < w[1].open_time));
    }

    #[test]
    fn append_dedupes_and_existing_rows_win() {
        let dir = tempfile::tempdir().unwrap();
        let store = CandleStore::new(dir.path().join("raw"), dir.path().join("curated"));

        let first = vec![candle(base_time(), 100.0)];
        store
            .append_raw("binance", "BTCUSDT", Interval::H1, &first)
            .unwrap();

        let conflicting = vec![
            candle(base_time(), 999.0),
            candle(base_time() + chrono::Duration::hours(1), 101.0),
        ];
        let report = store
            .append_raw("binance", "BTCUSDT", Interval::H1, &conflicting)
            .unwrap();
        assert_eq!(report.rows, 2);

        let loaded = store.read_raw("binance", "BTCUSDT", Interval::H1).unwrap();
        assert_eq!(loaded[0].close, 100.0);
    }

    #[test]
    fn checksum_detects_tampering() {
        let dir = tempfile::tempdir().unwrap();
        let store = CandleStore::new(dir.path().join("raw"), dir.path().join("curated"));
        store
            .append_raw("binance", "BTCUSDT", Interval::H1, &[candle(base_time(), 100.0)])
            .unwrap();

        let path = store.raw_path("binance", "BTCUSDT", Interval::H1);
        assert_eq!(store.verify_checksum(&path), ChecksumState::Verified);

        std::fs::write(&path, b"corrupted").unwrap();
        assert_eq!(store.verify_checksum(&path), ChecksumState::Mismatch);
        assert!(matches!(
            store.read_raw("binance", "BTCUSDT", Interval::H1),
            Err(StoreError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn curated_roundtrip_preserves_derived_columns() {
        let dir = tempfile::tempdir().unwrap();
        let store = CandleStore::new(dir.path().join("raw"), dir.path().join("curated"));

        let mut frame = CuratedFrame::new("binance", "BTCUSDT", Interval::D1);
        for i in 0..4 {
            frame.open_time.push(base_time() + chrono::Duration::days(i));
            frame.open.push(100.0);
            frame.high.push(102.0);
            frame.low.push(98.0);
            frame.close.push(101.0 + i as f64);
            frame.volume.push(10.0);
            frame.total_volume.push(12.0);
            frame.relative_volume.push(10.0 / 12.0);
        }
        frame
            .set_column("ema_9", vec![100.5, 100.8, 101.1, 101.4])
            .unwrap();

        store.write_curated(&frame).unwrap();
        let loaded = store
            .read_curated_latest("binance", "BTCUSDT", Interval::D1)
            .unwrap();
        assert_eq!(loaded.len(), 4);
        assert_eq!(loaded.column("ema_9").unwrap(), &[100.5, 100.8, 101.1, 101.4]);
        assert!(!loaded.dataset_version.is_empty());
        assert!(loaded.validate().is_ok());
    }

    #[test]
    fn missing_partition_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = CandleStore::new(dir.path().join("raw"), dir.path().join("curated"));
        assert!(matches!(
            store.read_raw("binance", "NOPE", Interval::H1),
            Err(StoreError::NotFound { .. })
        ));
    }
}
