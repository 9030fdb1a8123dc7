use anyhow::Result;
use chrono::Utc;

use crate::models::{CooldownEvent, LeverageAlert, RiskAudit, UserRiskState};

/// Persistence for risk state, audits, cooldowns, and leverage alerts.
#[derive(Clone)]
pub struct RiskDb {
    pool: sqlx::SqlitePool,
}

impl RiskDb {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &sqlx::SqlitePool {
        &self.pool
    }

    pub async fn init_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_risk_state (
                user_id TEXT PRIMARY KEY,
                current_equity REAL,
                current_drawdown_pct REAL NOT NULL DEFAULT 0,
                longest_losing_streak INTEGER NOT NULL DEFAULT 0,
                current_losing_streak INTEGER NOT NULL DEFAULT 0,
                longest_winning_streak INTEGER NOT NULL DEFAULT 0,
                current_winning_streak INTEGER NOT NULL DEFAULT 0,
                trades_last_24h INTEGER NOT NULL DEFAULT 0,
                avg_exposure_pct REAL NOT NULL DEFAULT 0,
                total_notional REAL NOT NULL DEFAULT 0,
                effective_leverage REAL NOT NULL DEFAULT 0,
                leverage_hard_stop INTEGER NOT NULL DEFAULT 0,
                leverage_hard_stop_since TEXT,
                cooldown_until TEXT,
                cooldown_reason TEXT,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS risk_audit (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                blocked_at TEXT NOT NULL,
                audit_type TEXT NOT NULL,
                reason TEXT NOT NULL,
                recommendation_id TEXT,
                context_data TEXT NOT NULL DEFAULT '{}'
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_risk_audit_user
             ON risk_audit (user_id, blocked_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cooldown_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                started_at TEXT NOT NULL,
                ends_at TEXT NOT NULL,
                reason TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS leverage_alerts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                recorded_at TEXT NOT NULL,
                effective_leverage REAL NOT NULL,
                threshold REAL NOT NULL,
                hard_stop INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS exposure_ledger (
                user_id TEXT NOT NULL,
                recommendation_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                direction TEXT NOT NULL,
                notional REAL NOT NULL,
                beta_bucket TEXT NOT NULL,
                beta_value REAL NOT NULL,
                entry_price REAL NOT NULL,
                opened_at TEXT NOT NULL,
                closed_at TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                PRIMARY KEY (user_id, recommendation_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_exposure_active
             ON exposure_ledger (user_id, is_active)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn load_state(&self, user_id: &str) -> Result<UserRiskState> {
        let state: Option<UserRiskState> =
            sqlx::query_as("SELECT * FROM user_risk_state WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(state.unwrap_or_else(|| UserRiskState::empty(user_id)))
    }

    pub async fn save_state(&self, state: &UserRiskState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_risk_state (
                user_id, current_equity, current_drawdown_pct,
                longest_losing_streak, current_losing_streak,
                longest_winning_streak, current_winning_streak,
                trades_last_24h, avg_exposure_pct, total_notional,
                effective_leverage, leverage_hard_stop,
                leverage_hard_stop_since, cooldown_until, cooldown_reason,
                updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id) DO UPDATE SET
                current_equity = excluded.current_equity,
                current_drawdown_pct = excluded.current_drawdown_pct,
                longest_losing_streak = excluded.longest_losing_streak,
                current_losing_streak = excluded.current_losing_streak,
                longest_winning_streak = excluded.longest_winning_streak,
                current_winning_streak = excluded.current_winning_streak,
                trades_last_24h = excluded.trades_last_24h,
                avg_exposure_pct = excluded.avg_exposure_pct,
                total_notional = excluded.total_notional,
                effective_leverage = excluded.effective_leverage,
                leverage_hard_stop = excluded.leverage_hard_stop,
                leverage_hard_stop_since = excluded.leverage_hard_stop_since,
                cooldown_until = excluded.cooldown_until,
                cooldown_reason = excluded.cooldown_reason,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&state.user_id)
        .bind(state.current_equity)
        .bind(state.current_drawdown_pct)
        .bind(state.longest_losing_streak)
        .bind(state.current_losing_streak)
        .bind(state.longest_winning_streak)
        .bind(state.current_winning_streak)
        .bind(state.trades_last_24h)
        .bind(state.avg_exposure_pct)
        .bind(state.total_notional)
        .bind(state.effective_leverage)
        .bind(state.leverage_hard_stop)
        .bind(state.leverage_hard_stop_since)
        .bind(state.cooldown_until)
        .bind(&state.cooldown_reason)
        .bind(state.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn write_audit(&self, audit: &RiskAudit) -> Result<()> {
        sqlx::query(
            "INSERT INTO risk_audit (user_id, blocked_at, audit_type, reason, recommendation_id, context_data)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&audit.user_id)
        .bind(audit.blocked_at)
        .bind(&audit.audit_type)
        .bind(&audit.reason)
        .bind(&audit.recommendation_id)
        .bind(audit.context_data.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn audits_for_user(&self, user_id: &str, limit: i64) -> Result<Vec<RiskAudit>> {
        let rows: Vec<(String, chrono::DateTime<Utc>, String, String, Option<String>, String)> =
            sqlx::query_as(
                "SELECT user_id, blocked_at, audit_type, reason, recommendation_id, context_data
                 FROM risk_audit WHERE user_id = ?
                 ORDER BY blocked_at DESC LIMIT ?",
            )
            .bind(user_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(user_id, blocked_at, audit_type, reason, recommendation_id, context)| {
                RiskAudit {
                    user_id,
                    blocked_at,
                    audit_type,
                    reason,
                    recommendation_id,
                    context_data: serde_json::from_str(&context)
                        .unwrap_or(serde_json::Value::Null),
                }
            })
            .collect())
    }

    pub async fn write_cooldown_event(&self, event: &CooldownEvent) -> Result<()> {
        sqlx::query(
            "INSERT INTO cooldown_events (user_id, started_at, ends_at, reason)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&event.user_id)
        .bind(event.started_at)
        .bind(event.ends_at)
        .bind(&event.reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn write_leverage_alert(&self, alert: &LeverageAlert) -> Result<()> {
        sqlx::query(
            "INSERT INTO leverage_alerts (user_id, recorded_at, effective_leverage, threshold, hard_stop)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&alert.user_id)
        .bind(alert.recorded_at)
        .bind(alert.effective_leverage)
        .bind(alert.threshold)
        .bind(alert.hard_stop)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
