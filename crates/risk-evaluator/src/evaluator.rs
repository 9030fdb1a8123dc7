use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use signal_core::{Settings, SignalKind};
use tokio::sync::Mutex;

use crate::alerts::RiskAlertService;
use crate::db::RiskDb;
use crate::ledger::ExposureLedger;
use crate::models::{
    CooldownEvent, ExposureRow, LeverageAlert, RejectReason, RiskAudit, UserRiskState,
};

/// Everything the guardrail battery needs to know about a candidate
/// emission, assembled by the orchestrator.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    pub signal: SignalKind,
    pub risk_reward_ratio: f64,
    pub proposed_notional: f64,
    pub beta_value: f64,
    pub entry_price: f64,
    /// Risk of the candidate trade as a percentage of equity.
    pub new_trade_risk_pct: f64,
    /// Risk already committed today as a percentage of equity.
    pub daily_committed_risk_pct: f64,
    pub ruin_probability: Option<f64>,
    pub recommendation_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accept,
    /// BUY/SELL is converted to HOLD with the given reason (checks 4-8).
    Downgrade(RejectReason),
    /// The emission is blocked entirely (checks 1-3).
    Block(RejectReason),
}

impl Verdict {
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Verdict::Accept => None,
            Verdict::Downgrade(reason) | Verdict::Block(reason) => Some(*reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RiskDecision {
    pub verdict: Verdict,
    /// Risk state snapshot taken at evaluation time.
    pub state: UserRiskState,
    pub exposure_multiplier: f64,
}

/// Stateful per-user risk evaluation.
///
/// Owns `UserRiskState`: every mutation goes through this type under the
/// per-user lock, and `evaluate` runs the guardrail checks in their fixed
/// order, short-circuiting on the first failure.
pub struct RiskEvaluator {
    db: RiskDb,
    ledger: ExposureLedger,
    alerts: RiskAlertService,
    settings: Settings,
    user_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl RiskEvaluator {
    pub fn new(db: RiskDb, settings: Settings) -> Self {
        Self {
            ledger: ExposureLedger::new(db.clone()),
            alerts: RiskAlertService::new(&settings),
            db,
            settings,
            user_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub fn ledger(&self) -> &ExposureLedger {
        &self.ledger
    }

    pub fn db(&self) -> &RiskDb {
        &self.db
    }

    /// Run the eight guardrail checks in order. The first failure wins;
    /// every rejection writes a `risk_audit` row and emits an alert.
    pub async fn evaluate(
        &self,
        user_id: &str,
        ctx: &EvaluationContext,
        now: DateTime<Utc>,
    ) -> Result<RiskDecision> {
        let lock = self.lock_for(user_id);
        let _guard = lock.lock().await;

        let state = self.db.load_state(user_id).await?;
        let equity = state.current_equity.unwrap_or(0.0);
        let exposure_multiplier = self
            .ledger
            .current_exposure_multiplier(user_id, equity)
            .await?;

        // 1. Capital data present and positive
        if state.current_equity.is_none() || equity <= 0.0 {
            let context = serde_json::json!({
                "has_data": state.current_equity.is_some(),
                "equity": state.current_equity,
            });
            return self
                .reject(user_id, ctx, state, exposure_multiplier, RejectReason::CapitalMissing, context)
                .await;
        }

        // 2. Daily committed risk cap (warning band below the hard cap)
        let total_daily_risk = ctx.daily_committed_risk_pct + ctx.new_trade_risk_pct;
        if total_daily_risk > self.settings.daily_risk_limit_pct {
            let context = serde_json::json!({
                "committed_risk_pct": ctx.daily_committed_risk_pct,
                "new_trade_risk_pct": ctx.new_trade_risk_pct,
                "limit_pct": self.settings.daily_risk_limit_pct,
            });
            return self
                .reject(user_id, ctx, state, exposure_multiplier, RejectReason::DailyRiskBlocked, context)
                .await;
        }
        if total_daily_risk > self.settings.daily_risk_warning_pct {
            tracing::warn!(
                user_id,
                total_daily_risk,
                warning_pct = self.settings.daily_risk_warning_pct,
                "daily risk approaching cap"
            );
        }

        // 3. Preventive trade count limit
        if state.trades_last_24h >= (self.settings.cooldown_max_trades_24h as i64) - 1 {
            let context = serde_json::json!({
                "trades_last_24h": state.trades_last_24h,
                "max_trades_24h": self.settings.cooldown_max_trades_24h,
            });
            return self
                .reject(user_id, ctx, state, exposure_multiplier, RejectReason::TradeLimitPreventive, context)
                .await;
        }

        // 4. Cooldown
        if state.cooldown_active(now) {
            let context = serde_json::json!({
                "cooldown_until": state.cooldown_until,
                "cooldown_reason": state.cooldown_reason,
            });
            return self
                .reject(user_id, ctx, state, exposure_multiplier, RejectReason::Cooldown, context)
                .await;
        }

        // 5. Leverage hard stop
        if state.leverage_hard_stop {
            let context = serde_json::json!({
                "effective_leverage": state.effective_leverage,
                "since": state.leverage_hard_stop_since,
            });
            return self
                .reject(user_id, ctx, state, exposure_multiplier, RejectReason::LeverageHardStop, context)
                .await;
        }

        // 6. Aggregate beta-adjusted exposure limit
        let active = self.ledger.active_beta_adjusted_notional(user_id).await?;
        let candidate = ctx.proposed_notional * ctx.beta_value;
        let limit = self.settings.exposure_limit_multiplier * equity;
        if ctx.signal != SignalKind::Hold && active + candidate > limit {
            let context = serde_json::json!({
                "active_beta_adjusted": active,
                "candidate_beta_adjusted": candidate,
                "limit": limit,
                "equity": equity,
            });
            return self
                .reject(user_id, ctx, state, exposure_multiplier, RejectReason::ExposureLimitExceeded, context)
                .await;
        }
        if limit > 0.0 && (active + candidate) / limit >= self.settings.exposure_alert_threshold_pct
        {
            self.alerts
                .send_exposure_warning(
                    user_id,
                    (active + candidate) / equity,
                    self.settings.exposure_limit_multiplier,
                )
                .await;
        }

        // 7. Monte-Carlo ruin probability
        if let Some(ruin) = ctx.ruin_probability {
            if ruin > self.settings.risk_ruin_alert_threshold {
                let context = serde_json::json!({
                    "ruin_probability": ruin,
                    "threshold": self.settings.risk_ruin_alert_threshold,
                });
                return self
                    .reject(user_id, ctx, state, exposure_multiplier, RejectReason::RuinRiskTooHigh, context)
                    .await;
            }
        }

        // 8. Risk/reward floor (directional signals only)
        if ctx.signal != SignalKind::Hold
            && ctx.risk_reward_ratio < self.settings.risk_reward_floor
        {
            let context = serde_json::json!({
                "risk_reward_ratio": ctx.risk_reward_ratio,
                "floor": self.settings.risk_reward_floor,
            });
            return self
                .reject(user_id, ctx, state, exposure_multiplier, RejectReason::RiskRewardFloor, context)
                .await;
        }

        Ok(RiskDecision {
            verdict: Verdict::Accept,
            state,
            exposure_multiplier,
        })
    }

    async fn reject(
        &self,
        user_id: &str,
        ctx: &EvaluationContext,
        state: UserRiskState,
        exposure_multiplier: f64,
        reason: RejectReason,
        context_data: serde_json::Value,
    ) -> Result<RiskDecision> {
        self.db
            .write_audit(&RiskAudit {
                user_id: user_id.to_string(),
                blocked_at: Utc::now(),
                audit_type: reason.as_str().to_string(),
                reason: reason.as_str().to_string(),
                recommendation_id: ctx.recommendation_id.clone(),
                context_data: context_data.clone(),
            })
            .await?;
        self.alerts
            .send_risk_block(user_id, reason.as_str(), &context_data)
            .await;
        tracing::warn!(user_id, reason = reason.as_str(), "guardrail rejection");

        let verdict = if reason.is_blocking() {
            Verdict::Block(reason)
        } else {
            Verdict::Downgrade(reason)
        };
        Ok(RiskDecision {
            verdict,
            state,
            exposure_multiplier,
        })
    }

    /// Record validated user capital.
    pub async fn update_capital(&self, user_id: &str, equity: f64) -> Result<()> {
        let lock = self.lock_for(user_id);
        let _guard = lock.lock().await;
        let mut state = self.db.load_state(user_id).await?;
        state.current_equity = Some(equity);
        state.updated_at = Utc::now();
        self.db.save_state(&state).await
    }

    /// Record a closed trade outcome: streaks, 24h counter, drawdown,
    /// and the cooldown triggers (losing streak, overtrading).
    pub async fn record_trade_outcome(
        &self,
        user_id: &str,
        pnl: f64,
        now: DateTime<Utc>,
    ) -> Result<UserRiskState> {
        let lock = self.lock_for(user_id);
        let _guard = lock.lock().await;
        let mut state = self.db.load_state(user_id).await?;

        if pnl < 0.0 {
            state.current_losing_streak += 1;
            state.current_winning_streak = 0;
            state.longest_losing_streak =
                state.longest_losing_streak.max(state.current_losing_streak);
        } else if pnl > 0.0 {
            state.current_winning_streak += 1;
            state.current_losing_streak = 0;
            state.longest_winning_streak =
                state.longest_winning_streak.max(state.current_winning_streak);
        }
        state.trades_last_24h += 1;
        if let Some(equity) = state.current_equity {
            let updated = (equity + pnl).max(0.0);
            state.current_equity = Some(updated);
            if pnl < 0.0 && equity > 0.0 {
                state.current_drawdown_pct =
                    (state.current_drawdown_pct + (-pnl / equity * 100.0)).max(0.0);
            } else if pnl > 0.0 {
                state.current_drawdown_pct = 0.0;
            }
        }

        if !state.cooldown_active(now) {
            if state.current_losing_streak
                >= self.settings.cooldown_losing_streak_threshold as i64
            {
                self.start_cooldown(
                    &mut state,
                    now,
                    Duration::hours(self.settings.cooldown_losing_streak_hours),
                    "losing_streak",
                )
                .await?;
            } else if state.trades_last_24h > self.settings.cooldown_max_trades_24h as i64 {
                self.start_cooldown(
                    &mut state,
                    now,
                    Duration::hours(self.settings.cooldown_overtrading_hours),
                    "overtrading",
                )
                .await?;
            }
        }

        state.updated_at = now;
        self.db.save_state(&state).await?;
        Ok(state)
    }

    async fn start_cooldown(
        &self,
        state: &mut UserRiskState,
        now: DateTime<Utc>,
        duration: Duration,
        reason: &str,
    ) -> Result<()> {
        state.cooldown_until = Some(now + duration);
        state.cooldown_reason = Some(reason.to_string());
        self.db
            .write_cooldown_event(&CooldownEvent {
                user_id: state.user_id.clone(),
                started_at: now,
                ends_at: now + duration,
                reason: reason.to_string(),
            })
            .await?;
        tracing::warn!(
            user_id = %state.user_id,
            reason,
            until = %(now + duration),
            "cooldown started"
        );
        Ok(())
    }

    /// Track effective leverage. The hard stop only engages once leverage
    /// has held at or above the threshold for the configured persistence
    /// window.
    pub async fn update_leverage(
        &self,
        user_id: &str,
        effective_leverage: f64,
        now: DateTime<Utc>,
    ) -> Result<UserRiskState> {
        let lock = self.lock_for(user_id);
        let _guard = lock.lock().await;
        let mut state = self.db.load_state(user_id).await?;
        state.effective_leverage = effective_leverage;

        if effective_leverage >= self.settings.leverage_hard_stop_threshold {
            match state.leverage_hard_stop_since {
                None => {
                    state.leverage_hard_stop_since = Some(now);
                }
                Some(since) => {
                    let held = now - since;
                    if !state.leverage_hard_stop
                        && held
                            >= Duration::minutes(
                                self.settings.leverage_hard_stop_persistence_minutes,
                            )
                    {
                        state.leverage_hard_stop = true;
                        self.db
                            .write_leverage_alert(&LeverageAlert {
                                user_id: user_id.to_string(),
                                recorded_at: now,
                                effective_leverage,
                                threshold: self.settings.leverage_hard_stop_threshold,
                                hard_stop: true,
                            })
                            .await?;
                    }
                }
            }
        } else {
            if effective_leverage >= self.settings.leverage_warning_threshold {
                tracing::warn!(user_id, effective_leverage, "leverage above warning threshold");
            }
            state.leverage_hard_stop = false;
            state.leverage_hard_stop_since = None;
        }

        state.updated_at = now;
        self.db.save_state(&state).await?;
        Ok(state)
    }

    /// Open a ledger position for an accepted recommendation and refresh
    /// the state's notional aggregate.
    pub async fn register_position(&self, row: &ExposureRow) -> Result<()> {
        let lock = self.lock_for(&row.user_id);
        let _guard = lock.lock().await;
        self.ledger.open_position(row).await?;

        let mut state = self.db.load_state(&row.user_id).await?;
        state.total_notional = self
            .ledger
            .active_positions(&row.user_id)
            .await?
            .iter()
            .map(|r| r.notional)
            .sum();
        if let Some(equity) = state.current_equity {
            if equity > 0.0 {
                state.avg_exposure_pct = state.total_notional / equity * 100.0;
            }
        }
        state.updated_at = Utc::now();
        self.db.save_state(&state).await
    }

    /// Close a ledger position and refresh the notional aggregate.
    pub async fn release_position(&self, user_id: &str, recommendation_id: &str) -> Result<bool> {
        let lock = self.lock_for(user_id);
        let _guard = lock.lock().await;
        let closed = self.ledger.close_position(user_id, recommendation_id).await?;
        if closed {
            let mut state = self.db.load_state(user_id).await?;
            state.total_notional = self
                .ledger
                .active_positions(user_id)
                .await?
                .iter()
                .map(|r| r.notional)
                .sum();
            state.updated_at = Utc::now();
            self.db.save_state(&state).await?;
        }
        Ok(closed)
    }
}
