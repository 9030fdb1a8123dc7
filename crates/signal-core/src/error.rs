use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{GapWindow, Interval};

/// Failure from a venue adapter. Rate and network failures are retryable;
/// parse and auth failures are not.
#[derive(Error, Debug)]
pub enum VenueError {
    #[error("{venue} rate limit: {message}")]
    Rate { venue: String, message: String },

    #[error("{venue} network error: {message}")]
    Net { venue: String, message: String },

    #[error("{venue} parse error: {message}")]
    Parse { venue: String, message: String },

    #[error("{venue} auth error: {message}")]
    Auth { venue: String, message: String },
}

impl VenueError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, VenueError::Rate { .. } | VenueError::Net { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            VenueError::Rate { .. } => "rate",
            VenueError::Net { .. } => "net",
            VenueError::Parse { .. } => "parse",
            VenueError::Auth { .. } => "auth",
        }
    }

    pub fn venue(&self) -> &str {
        match self {
            VenueError::Rate { venue, .. }
            | VenueError::Net { venue, .. }
            | VenueError::Parse { venue, .. }
            | VenueError::Auth { venue, .. } => venue,
        }
    }
}

/// Curated data is older than the per-interval freshness threshold.
#[derive(Error, Debug)]
#[error("{interval} data is stale (latest: {latest_timestamp:?}, threshold: {threshold_minutes}m)")]
pub struct DataFreshnessError {
    pub interval: Interval,
    pub latest_timestamp: Option<DateTime<Utc>>,
    pub threshold_minutes: i64,
    pub context_data: serde_json::Value,
}

/// Unresolved gaps in a curated window exceed tolerance.
#[derive(Error, Debug)]
#[error("{interval} has {} gap(s) beyond tolerance of {tolerance_candles} candles", gaps.len())]
pub struct DataGapError {
    pub interval: Interval,
    pub gaps: Vec<GapWindow>,
    pub tolerance_candles: usize,
    pub context_data: serde_json::Value,
}

/// Risk validation failed before signal generation.
#[derive(Error, Debug)]
#[error("risk validation failed ({audit_type}): {reason}")]
pub struct RiskValidationError {
    pub audit_type: String,
    pub reason: String,
    pub context_data: serde_json::Value,
}

/// Backtest campaign aborted during window/coverage validation.
#[derive(Error, Debug)]
#[error("campaign aborted: {reason}")]
pub struct CampaignAbort {
    pub reason: String,
    pub details: serde_json::Value,
}

impl CampaignAbort {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            details: serde_json::Value::Null,
        }
    }

    pub fn with_details(reason: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            reason: reason.into(),
            details,
        }
    }
}

/// Recommendation generation failed: audit failure, risk block, stale data.
///
/// The orchestrator surfaces this as a well-formed payload with `status`
/// and `reason` rather than an opaque failure.
#[derive(Error, Debug)]
#[error("recommendation generation failed ({status}): {reason}")]
pub struct RecommendationGenerationError {
    pub status: String,
    pub reason: String,
    pub details: serde_json::Value,
}

impl RecommendationGenerationError {
    pub fn new(status: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            reason: reason.into(),
            details: serde_json::Value::Null,
        }
    }

    pub fn with_details(
        status: impl Into<String>,
        reason: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            status: status.into(),
            reason: reason.into(),
            details,
        }
    }

    /// Payload shape returned to callers when the engine deliberately
    /// withholds a signal.
    pub fn to_payload(&self) -> serde_json::Value {
        let mut payload = serde_json::json!({
            "status": self.status,
            "reason": self.reason,
            "details": self.details,
        });
        if self.status == "capital_missing" {
            payload["requires_capital_input"] = serde_json::Value::Bool(true);
        }
        payload
    }
}

/// Configuration could not be loaded from the environment.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value} ({reason})")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}
