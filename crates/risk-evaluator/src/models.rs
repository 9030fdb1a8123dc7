use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Typed rejection reasons in guardrail order. The first three block a
/// recommendation entirely; the rest downgrade BUY/SELL to HOLD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    CapitalMissing,
    DailyRiskBlocked,
    TradeLimitPreventive,
    Cooldown,
    LeverageHardStop,
    ExposureLimitExceeded,
    RuinRiskTooHigh,
    RiskRewardFloor,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::CapitalMissing => "capital_missing",
            RejectReason::DailyRiskBlocked => "daily_risk_blocked",
            RejectReason::TradeLimitPreventive => "trade_limit_preventive",
            RejectReason::Cooldown => "cooldown",
            RejectReason::LeverageHardStop => "leverage_hard_stop",
            RejectReason::ExposureLimitExceeded => "exposure_limit_exceeded",
            RejectReason::RuinRiskTooHigh => "ruin_risk_too_high",
            RejectReason::RiskRewardFloor => "risk_reward_floor",
        }
    }

    /// Whether this reason blocks the emission entirely (checks 1-3)
    /// rather than downgrading the signal to HOLD.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            RejectReason::CapitalMissing
                | RejectReason::DailyRiskBlocked
                | RejectReason::TradeLimitPreventive
        )
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-user risk state. Mutated only by the risk evaluator, snapshotted
/// into every emission.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRiskState {
    pub user_id: String,
    pub current_equity: Option<f64>,
    pub current_drawdown_pct: f64,
    pub longest_losing_streak: i64,
    pub current_losing_streak: i64,
    pub longest_winning_streak: i64,
    pub current_winning_streak: i64,
    pub trades_last_24h: i64,
    pub avg_exposure_pct: f64,
    pub total_notional: f64,
    pub effective_leverage: f64,
    pub leverage_hard_stop: bool,
    pub leverage_hard_stop_since: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub cooldown_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl UserRiskState {
    pub fn empty(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            current_equity: None,
            current_drawdown_pct: 0.0,
            longest_losing_streak: 0,
            current_losing_streak: 0,
            longest_winning_streak: 0,
            current_winning_streak: 0,
            trades_last_24h: 0,
            avg_exposure_pct: 0.0,
            total_notional: 0.0,
            effective_leverage: 0.0,
            leverage_hard_stop: false,
            leverage_hard_stop_since: None,
            cooldown_until: None,
            cooldown_reason: None,
            updated_at: Utc::now(),
        }
    }

    pub fn cooldown_active(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| until > now)
    }
}

/// A row in the exposure ledger. A position participates in aggregate
/// exposure iff `is_active`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ExposureRow {
    pub user_id: String,
    pub recommendation_id: String,
    pub symbol: String,
    pub direction: String,
    pub notional: f64,
    pub beta_bucket: String,
    pub beta_value: f64,
    pub entry_price: f64,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl ExposureRow {
    pub fn beta_adjusted_notional(&self) -> f64 {
        self.notional * self.beta_value
    }
}

/// Audit trail row written for every guardrail rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAudit {
    pub user_id: String,
    pub blocked_at: DateTime<Utc>,
    pub audit_type: String,
    pub reason: String,
    pub recommendation_id: Option<String>,
    pub context_data: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownEvent {
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeverageAlert {
    pub user_id: String,
    pub recorded_at: DateTime<Utc>,
    pub effective_leverage: f64,
    pub threshold: f64,
    pub hard_stop: bool,
}
