pub mod curation;
pub mod derivatives;
pub mod error;
pub mod gaps;
pub mod ingestion;
pub mod orderbook;
pub mod provider;
pub mod reconcile;

pub use curation::{CurationReport, DataCuration};
pub use derivatives::{DerivativesCollector, DerivativesReport};
pub use error::IngestionError;
pub use gaps::{detect_gaps, expected_timestamps, forward_fill, GAP_FILL_TOLERANCE};
pub use ingestion::{DataIngestion, IngestReport, IngestStatus};
pub use provider::{SignalDataInputs, SignalDataProvider};
pub use reconcile::reconcile_venues;
