use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Candle interval from the closed supported set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "1w")]
    W1,
}

/// All supported intervals in ingestion order.
pub const INTERVALS: [Interval; 6] = [
    Interval::M15,
    Interval::M30,
    Interval::H1,
    Interval::H4,
    Interval::D1,
    Interval::W1,
];

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::M15 => "15m",
            Interval::M30 => "30m",
            Interval::H1 => "1h",
            Interval::H4 => "4h",
            Interval::D1 => "1d",
            Interval::W1 => "1w",
        }
    }

    pub fn parse(s: &str) -> Option<Interval> {
        match s {
            "15m" => Some(Interval::M15),
            "30m" => Some(Interval::M30),
            "1h" => Some(Interval::H1),
            "4h" => Some(Interval::H4),
            "1d" => Some(Interval::D1),
            "1w" => Some(Interval::W1),
            _ => None,
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            Interval::M15 => Duration::minutes(15),
            Interval::M30 => Duration::minutes(30),
            Interval::H1 => Duration::hours(1),
            Interval::H4 => Duration::hours(4),
            Interval::D1 => Duration::days(1),
            Interval::W1 => Duration::weeks(1),
        }
    }

    pub fn millis(&self) -> i64 {
        self.duration().num_milliseconds()
    }

    /// Maximum age of the latest curated candle before the series is
    /// considered stale (twice the bar span, floored at 30 minutes).
    pub fn freshness_threshold_minutes(&self) -> i64 {
        (self.duration().num_minutes() * 2).max(30)
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single OHLCV bar as normalized by a venue adapter.
///
/// Identity is `(venue, symbol, interval, open_time)`; candles are never
/// mutated after persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub venue: String,
    pub symbol: String,
    pub interval: Interval,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default)]
    pub taker_buy_base: Option<f64>,
    #[serde(default)]
    pub best_bid_price: Option<f64>,
    #[serde(default)]
    pub best_ask_price: Option<f64>,
    #[serde(default)]
    pub bid_depth: Option<f64>,
    #[serde(default)]
    pub ask_depth: Option<f64>,
    /// Share of cross-venue volume carried by this venue at this bar.
    #[serde(default)]
    pub relative_volume: Option<f64>,
}

impl Candle {
    /// Close time implied by the interval: one tick before the next open.
    pub fn close_time_for(open_time: DateTime<Utc>, interval: Interval) -> DateTime<Utc> {
        open_time + interval.duration() - Duration::milliseconds(1)
    }
}

/// Top-of-book snapshot with aggregate depth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBookDepth {
    pub venue: String,
    pub symbol: String,
    pub best_bid: f64,
    pub best_ask: f64,
    pub bid_depth: f64,
    pub ask_depth: f64,
    pub timestamp: DateTime<Utc>,
}

impl OrderBookDepth {
    pub fn mid_price(&self) -> f64 {
        (self.best_bid + self.best_ask) / 2.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingRate {
    pub venue: String,
    pub symbol: String,
    pub funding_time: DateTime<Utc>,
    pub funding_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenInterest {
    pub venue: String,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open_interest: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Liquidation {
    pub venue: String,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub side: String,
    pub price: f64,
    pub qty: f64,
}

/// Directional recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
    #[serde(rename = "HOLD")]
    Hold,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Buy => "BUY",
            SignalKind::Sell => "SELL",
            SignalKind::Hold => "HOLD",
        }
    }

    pub fn parse(s: &str) -> Option<SignalKind> {
        match s {
            "BUY" => Some(SignalKind::Buy),
            "SELL" => Some(SignalKind::Sell),
            "HOLD" => Some(SignalKind::Hold),
            _ => None,
        }
    }

    /// Vote value used by the aggregator: +1 BUY, 0 HOLD, -1 SELL.
    pub fn vote(&self) -> f64 {
        match self {
            SignalKind::Buy => 1.0,
            SignalKind::Hold => 0.0,
            SignalKind::Sell => -1.0,
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Market regime label driving calibrator and ensemble-weight selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Regime {
    Bull,
    Bear,
    Range,
    Neutral,
    Calm,
    Balanced,
    Stress,
}

impl Regime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Regime::Bull => "bull",
            Regime::Bear => "bear",
            Regime::Range => "range",
            Regime::Neutral => "neutral",
            Regime::Calm => "calm",
            Regime::Balanced => "balanced",
            Regime::Stress => "stress",
        }
    }

    pub fn parse(s: &str) -> Option<Regime> {
        match s {
            "bull" => Some(Regime::Bull),
            "bear" => Some(Regime::Bear),
            "range" => Some(Regime::Range),
            "neutral" => Some(Regime::Neutral),
            "calm" => Some(Regime::Calm),
            "balanced" => Some(Regime::Balanced),
            "stress" => Some(Regime::Stress),
            _ => None,
        }
    }
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Realized-volatility bucket at fixed thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolBucket {
    Low,
    Mid,
    High,
}

impl VolBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolBucket::Low => "low",
            VolBucket::Mid => "mid",
            VolBucket::High => "high",
        }
    }

    /// Bucket annualized realized volatility at the canonical thresholds.
    pub fn from_realized_vol(vol: f64) -> VolBucket {
        if vol < 0.2 {
            VolBucket::Low
        } else if vol < 0.5 {
            VolBucket::Mid
        } else {
            VolBucket::High
        }
    }
}

/// Entry price band for a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntryRange {
    pub min: f64,
    pub max: f64,
    pub optimal: f64,
}

/// One strategy's contribution to the ensemble.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyVote {
    pub strategy: String,
    pub signal: SignalKind,
    pub confidence: f64,
    pub reason: String,
}

/// Aggregator internals persisted for transparency.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalBreakdown {
    pub aggregate_score: f64,
    pub raw_aggregate_score: f64,
    pub vector_bias: f64,
    pub buy_votes: u32,
    pub sell_votes: u32,
    pub hold_votes: u32,
    #[serde(default)]
    pub weights_snapshot_date: Option<NaiveDate>,
}

/// Suggested position sizing attached to the risk metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuggestedSizing {
    pub risk_amount: f64,
    pub position_notional: f64,
    pub qty: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalRiskMetrics {
    pub tp_probability: f64,
    pub sl_probability: f64,
    pub risk_reward_ratio: f64,
    #[serde(default)]
    pub suggested_sizing: Option<SuggestedSizing>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
}

/// A fully assembled signal candidate with provenance.
///
/// Invariants enforced at assembly: `sl < entry.optimal < tp` for BUY and
/// the mirror for SELL; confidence clamped to `[5, 95]`;
/// `risk_reward_ratio >= rr_floor` unless downgraded to HOLD with
/// `rejection_reason = "risk_reward_floor"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub signal: SignalKind,
    pub confidence_raw: f64,
    pub confidence_calibrated: Option<f64>,
    pub entry_range: EntryRange,
    pub sl: f64,
    pub tp: f64,
    pub sl_pct: f64,
    pub tp_pct: f64,
    pub votes: Vec<StrategyVote>,
    pub signal_breakdown: SignalBreakdown,
    pub risk_metrics: SignalRiskMetrics,
    pub market_regime: Regime,
    pub vol_bucket: VolBucket,
    pub seed: u32,
    pub params_version: String,
    pub dataset_version: String,
    pub code_commit: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationStatus {
    Open,
    Closed,
}

impl RecommendationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationStatus::Open => "open",
            RecommendationStatus::Closed => "closed",
        }
    }
}

/// Persisted recommendation: a published signal plus lifecycle and
/// backtest provenance. Unique per `(date, market_timestamp)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: String,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub market_timestamp: DateTime<Utc>,
    pub ingestion_timestamp: Option<DateTime<Utc>>,
    pub spot_source: String,
    pub symbol: String,
    pub venue: String,
    pub signal: Signal,
    pub status: RecommendationStatus,
    pub opened_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub exit_reason: Option<String>,
    pub exit_price: Option<f64>,
    pub exit_price_pct: Option<f64>,
    pub backtest_run_id: Option<String>,
    pub backtest_cagr: Option<f64>,
    pub backtest_win_rate: Option<f64>,
    pub backtest_risk_reward_ratio: Option<f64>,
    pub backtest_max_drawdown: Option<f64>,
    pub tracking_error_bps: Option<f64>,
}

/// A missing span of expected bar timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub missing_candles: usize,
}
