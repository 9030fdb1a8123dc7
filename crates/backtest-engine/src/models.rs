use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::execution::ExecutionParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "long",
            Side::Short => "short",
        }
    }
}

/// Why a position (or part of one) was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    #[serde(rename = "TP")]
    Tp,
    #[serde(rename = "SL")]
    Sl,
    #[serde(rename = "SL_GAP")]
    SlGap,
    #[serde(rename = "TIME")]
    Time,
    #[serde(rename = "TRAILING")]
    Trailing,
    #[serde(rename = "PARTIAL")]
    Partial,
    #[serde(rename = "SIGNAL")]
    Signal,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::Tp => "TP",
            ExitReason::Sl => "SL",
            ExitReason::SlGap => "SL_GAP",
            ExitReason::Time => "TIME",
            ExitReason::Trailing => "TRAILING",
            ExitReason::Partial => "PARTIAL",
            ExitReason::Signal => "SIGNAL",
        }
    }
}

/// A completed (possibly partial) round trip. Trades are the primitives
/// over which all metrics are computed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub side: Side,
    pub entry_price: f64,
    pub exit_price: f64,
    pub qty: f64,
    pub pnl: f64,
    pub return_pct: f64,
    /// Maximum adverse excursion over the holding period, in percent.
    pub mae: f64,
    /// Maximum favorable excursion over the holding period, in percent.
    pub mfe: f64,
    pub exit_reason: ExitReason,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EquityPoint {
    pub time: DateTime<Utc>,
    pub equity: f64,
}

/// A gap event logged when a bar opens through a stop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapEvent {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub stop: f64,
    pub gap_pct: f64,
    pub fill_price: f64,
}

/// What a replay strategy may ask the engine to do on a bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    Enter {
        side: Side,
        sl: f64,
        tp: f64,
    },
    Exit,
    Adjust {
        sl: Option<f64>,
        tp: Option<f64>,
    },
    Hold,
}

/// Replay configuration. Serialized into the campaign params digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    pub initial_capital: f64,
    /// Fraction of equity committed per entry.
    pub position_size_pct: f64,
    /// Ratcheting stop distance, as a fraction of the best seen price.
    pub trailing_sl_pct: Option<f64>,
    /// Move the stop to entry once MFE reaches this fraction.
    pub breakeven_trigger_pct: Option<f64>,
    /// `(price_move_pct, qty_pct)` ladder of partial exits.
    pub partial_take_profits: Vec<(f64, f64)>,
    /// Close any position held longer than this many bars.
    pub max_hold_bars: Option<usize>,
    pub execution: ExecutionParams,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            position_size_pct: 0.5,
            trailing_sl_pct: None,
            breakeven_trigger_pct: None,
            partial_take_profits: Vec::new(),
            max_hold_bars: None,
            execution: ExecutionParams::default(),
        }
    }
}

impl ReplayConfig {
    /// A frictionless twin of this config, used for the tracking-error
    /// baseline.
    pub fn frictionless(&self) -> Self {
        let mut config = self.clone();
        config.execution = ExecutionParams::frictionless();
        config
    }
}
