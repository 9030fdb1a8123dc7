use candle_store::StoreError;
use signal_core::{DataFreshnessError, DataGapError, VenueError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error(transparent)]
    Venue(#[from] VenueError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Freshness(#[from] DataFreshnessError),

    #[error(transparent)]
    Gap(#[from] DataGapError),

    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("no data for {context}")]
    Empty { context: String },
}
