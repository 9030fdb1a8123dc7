use std::sync::Arc;

use chrono::Utc;
use signal_core::{CuratedFrame, Interval};
use tokio::sync::Mutex;

use crate::curation::DataCuration;
use crate::error::IngestionError;

/// Immutable container for validated signal generation inputs.
///
/// Constructing one is the only way downstream readers obtain curated
/// data; both frames have passed freshness and gap validation and are
/// guaranteed non-empty.
#[derive(Debug, Clone)]
pub struct SignalDataInputs {
    pub df_1h: Arc<CuratedFrame>,
    pub df_1d: Arc<CuratedFrame>,
    pub venue: String,
    pub symbol: String,
}

impl SignalDataInputs {
    fn new(
        df_1h: CuratedFrame,
        df_1d: CuratedFrame,
        venue: String,
        symbol: String,
    ) -> Result<Self, IngestionError> {
        if df_1h.is_empty() {
            return Err(IngestionError::InvalidFrame("1h frame is empty".to_string()));
        }
        if df_1d.is_empty() {
            return Err(IngestionError::InvalidFrame("1d frame is empty".to_string()));
        }
        df_1h.validate().map_err(IngestionError::InvalidFrame)?;
        df_1d.validate().map_err(IngestionError::InvalidFrame)?;
        Ok(Self {
            df_1h: Arc::new(df_1h),
            df_1d: Arc::new(df_1d),
            venue,
            symbol,
        })
    }
}

/// Single source of truth for signal generation data.
///
/// All strategies receive the same validated `(df_1h, df_1d)` snapshot;
/// nothing downstream reads the candle store directly.
pub struct SignalDataProvider {
    curation: DataCuration,
    symbol: String,
    cached: Mutex<Option<SignalDataInputs>>,
}

impl SignalDataProvider {
    pub fn new(curation: DataCuration, symbol: impl Into<String>) -> Self {
        Self {
            curation,
            symbol: symbol.into(),
            cached: Mutex::new(None),
        }
    }

    /// Get validated data inputs, using the in-memory snapshot unless a
    /// refresh is forced. Freshness failures raise `DataFreshnessError`
    /// and gap failures `DataGapError` via the ingestion error wrapper.
    pub async fn get_validated_inputs(
        &self,
        force_refresh: bool,
    ) -> Result<SignalDataInputs, IngestionError> {
        let mut cached = self.cached.lock().await;
        if let Some(inputs) = cached.as_ref() {
            if !force_refresh {
                tracing::debug!("returning cached signal data inputs");
                return Ok(inputs.clone());
            }
        }

        let now = Utc::now();
        for interval in [Interval::D1, Interval::H1] {
            self.curation.validate_freshness(&self.symbol, interval, now)?;
            self.curation.validate_gaps(&self.symbol, interval)?;
        }

        let df_1d = self.curation.load_latest(&self.symbol, Interval::D1)?;
        let df_1h = match self.curation.load_latest(&self.symbol, Interval::H1) {
            Ok(frame) if !frame.is_empty() => frame,
            _ => {
                tracing::warn!("1h curated dataset unavailable, falling back to 1d");
                df_1d.clone()
            }
        };

        let inputs = SignalDataInputs::new(
            df_1h,
            df_1d,
            self.curation.preferred_venue().to_string(),
            self.symbol.clone(),
        )?;
        tracing::info!(
            symbol = %self.symbol,
            rows_1h = inputs.df_1h.len(),
            rows_1d = inputs.df_1d.len(),
            "signal data inputs loaded"
        );
        *cached = Some(inputs.clone());
        Ok(inputs)
    }

    pub async fn clear_cache(&self) {
        *self.cached.lock().await = None;
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn curation(&self) -> &DataCuration {
        &self.curation
    }
}
