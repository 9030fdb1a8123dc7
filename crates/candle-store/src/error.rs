use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("no data at {path}")]
    NotFound { path: String },

    #[error("checksum mismatch at {path}: stored {stored}, computed {computed}")]
    ChecksumMismatch {
        path: String,
        stored: String,
        computed: String,
    },

    #[error("schema error at {path}: {message}")]
    Schema { path: String, message: String },
}

impl StoreError {
    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub fn schema(path: &std::path::Path, message: impl Into<String>) -> Self {
        StoreError::Schema {
            path: path.display().to_string(),
            message: message.into(),
        }
    }
}
