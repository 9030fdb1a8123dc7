use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Row;

/// Persistence for recommendations, signal outcome references, run logs,
/// and backtest result summaries.
///
/// Uniqueness: `(date, market_timestamp)`. A second emission for the
/// same spot snapshot is dropped and the stored row wins.
#[derive(Clone)]
pub struct RecommendationStore {
    pool: sqlx::SqlitePool,
}

impl RecommendationStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &sqlx::SqlitePool {
        &self.pool
    }

    pub async fn init_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS recommendations (
                id TEXT PRIMARY KEY,
                date TEXT NOT NULL,
                created_at TEXT NOT NULL,
                market_timestamp TEXT NOT NULL,
                ingestion_timestamp TEXT,
                spot_source TEXT NOT NULL,
                symbol TEXT NOT NULL,
                venue TEXT NOT NULL,
                payload TEXT NOT NULL,
                signal TEXT NOT NULL,
                confidence_raw REAL NOT NULL,
                confidence_calibrated REAL,
                seed INTEGER NOT NULL,
                params_version TEXT NOT NULL,
                dataset_version TEXT NOT NULL,
                code_commit TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'open',
                opened_at TEXT,
                closed_at TEXT,
                exit_reason TEXT,
                exit_price REAL,
                exit_price_pct REAL,
                backtest_run_id TEXT,
                backtest_cagr REAL,
                backtest_win_rate REAL,
                backtest_risk_reward_ratio REAL,
                backtest_max_drawdown REAL,
                tracking_error_bps REAL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_recommendations_date_ts
             ON recommendations (date, market_timestamp)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signal_outcomes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                recommendation_id TEXT NOT NULL,
                signal TEXT NOT NULL,
                confidence REAL NOT NULL,
                regime TEXT NOT NULL,
                created_at TEXT NOT NULL,
                labeled INTEGER NOT NULL DEFAULT 0,
                outcome TEXT,
                realized_return_pct REAL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS run_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                job TEXT NOT NULL,
                status TEXT NOT NULL,
                message TEXT NOT NULL,
                details TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS backtest_results (
                campaign_id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                start TEXT NOT NULL,
                end TEXT NOT NULL,
                params TEXT NOT NULL,
                metrics TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a recommendation unless one already exists for the same
    /// `(date, market_timestamp)`. Returns the stored payload either way
    /// and whether this call inserted it.
    pub async fn insert_or_existing(
        &self,
        id: &str,
        date: NaiveDate,
        market_timestamp: DateTime<Utc>,
        payload: &serde_json::Value,
    ) -> Result<(serde_json::Value, bool)> {
        if let Some(existing) = self.find_by_snapshot(date, market_timestamp).await? {
            tracing::info!(
                date = %date,
                market_timestamp = %market_timestamp,
                "duplicate emission for spot snapshot, returning stored recommendation"
            );
            return Ok((existing, false));
        }

        let signal = payload["signal"].as_str().unwrap_or("HOLD").to_string();
        sqlx::query(
            r#"
            INSERT INTO recommendations (
                id, date, created_at, market_timestamp, ingestion_timestamp,
                spot_source, symbol, venue, payload, signal,
                confidence_raw, confidence_calibrated, seed,
                params_version, dataset_version, code_commit, status,
                opened_at, backtest_run_id, backtest_cagr, backtest_win_rate,
                backtest_risk_reward_ratio, backtest_max_drawdown, tracking_error_bps
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'open', ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(date.format("%Y-%m-%d").to_string())
        .bind(Utc::now())
        .bind(market_timestamp)
        .bind(payload["ingestion_timestamp"].as_str())
        .bind(payload["spot_source"].as_str().unwrap_or_default())
        .bind(payload["symbol"].as_str().unwrap_or_default())
        .bind(payload["venue"].as_str().unwrap_or_default())
        .bind(payload.to_string())
        .bind(&signal)
        .bind(payload["confidence_raw"].as_f64().unwrap_or(0.0))
        .bind(payload["confidence_calibrated"].as_f64())
        .bind(payload["seed"].as_i64().unwrap_or(0))
        .bind(payload["params_version"].as_str().unwrap_or_default())
        .bind(payload["dataset_version"].as_str().unwrap_or_default())
        .bind(payload["code_commit"].as_str().unwrap_or_default())
        .bind(Utc::now())
        .bind(payload["backtest_run_id"].as_str())
        .bind(payload["backtest_cagr"].as_f64())
        .bind(payload["backtest_win_rate"].as_f64())
        .bind(payload["backtest_risk_reward_ratio"].as_f64())
        .bind(payload["backtest_max_drawdown"].as_f64())
        .bind(payload["tracking_error_bps"].as_f64())
        .execute(&self.pool)
        .await?;

        Ok((payload.clone(), true))
    }

    pub async fn find_by_snapshot(
        &self,
        date: NaiveDate,
        market_timestamp: DateTime<Utc>,
    ) -> Result<Option<serde_json::Value>> {
        let row = sqlx::query(
            "SELECT payload FROM recommendations WHERE date = ? AND market_timestamp = ?",
        )
        .bind(date.format("%Y-%m-%d").to_string())
        .bind(market_timestamp)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.and_then(|r| serde_json::from_str(&r.get::<String, _>("payload")).ok()))
    }

    pub async fn latest(&self) -> Result<Option<serde_json::Value>> {
        let row = sqlx::query(
            "SELECT payload FROM recommendations ORDER BY created_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.and_then(|r| serde_json::from_str(&r.get::<String, _>("payload")).ok()))
    }

    pub async fn get_payload(&self, id: &str) -> Result<Option<serde_json::Value>> {
        let row = sqlx::query("SELECT payload FROM recommendations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(|r| serde_json::from_str(&r.get::<String, _>("payload")).ok()))
    }

    /// Open recommendations with their payloads, oldest first.
    pub async fn open_recommendations(&self) -> Result<Vec<(String, serde_json::Value)>> {
        let rows = sqlx::query(
            "SELECT id, payload FROM recommendations WHERE status = 'open' ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .filter_map(|r| {
                let payload = serde_json::from_str(&r.get::<String, _>("payload")).ok()?;
                Some((r.get::<String, _>("id"), payload))
            })
            .collect())
    }

    /// Close an open recommendation when its SL/TP is hit or it is
    /// superseded.
    pub async fn close_recommendation(
        &self,
        id: &str,
        exit_reason: &str,
        exit_price: f64,
        exit_price_pct: f64,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE recommendations
             SET status = 'closed', closed_at = ?, exit_reason = ?, exit_price = ?, exit_price_pct = ?
             WHERE id = ? AND status = 'open'",
        )
        .bind(Utc::now())
        .bind(exit_reason)
        .bind(exit_price)
        .bind(exit_price_pct)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Returns of recently closed recommendations, newest first; fuel for
    /// the per-user ruin bootstrap.
    pub async fn recent_closed_returns(&self, limit: i64) -> Result<Vec<f64>> {
        let rows = sqlx::query(
            "SELECT exit_price_pct FROM recommendations
             WHERE status = 'closed' AND exit_price_pct IS NOT NULL
             ORDER BY closed_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| r.get::<f64, _>("exit_price_pct") / 100.0)
            .collect())
    }

    /// Risk committed today across emitted recommendations, as a sum of
    /// per-trade risk percentages from the stored payloads.
    pub async fn committed_risk_pct_today(&self, date: NaiveDate) -> Result<f64> {
        let rows = sqlx::query("SELECT payload FROM recommendations WHERE date = ?")
            .bind(date.format("%Y-%m-%d").to_string())
            .fetch_all(&self.pool)
            .await?;
        let mut total = 0.0;
        for row in rows {
            if let Ok(payload) =
                serde_json::from_str::<serde_json::Value>(&row.get::<String, _>("payload"))
            {
                total += payload["risk_metrics"]["risk_pct"].as_f64().unwrap_or(0.0);
            }
        }
        Ok(total)
    }

    /// Payloads emitted on or after a date, oldest first.
    pub async fn payloads_since(&self, date: NaiveDate) -> Result<Vec<serde_json::Value>> {
        let rows = sqlx::query(
            "SELECT payload FROM recommendations WHERE date >= ? ORDER BY created_at",
        )
        .bind(date.format("%Y-%m-%d").to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .filter_map(|r| serde_json::from_str(&r.get::<String, _>("payload")).ok())
            .collect())
    }

    pub async fn insert_signal_outcome(
        &self,
        recommendation_id: &str,
        signal: &str,
        confidence: f64,
        regime: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO signal_outcomes (recommendation_id, signal, confidence, regime, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(recommendation_id)
        .bind(signal)
        .bind(confidence)
        .bind(regime)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Label a signal outcome once the trade resolves.
    pub async fn label_signal_outcome(
        &self,
        recommendation_id: &str,
        outcome: &str,
        realized_return_pct: f64,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE signal_outcomes
             SET labeled = 1, outcome = ?, realized_return_pct = ?
             WHERE recommendation_id = ? AND labeled = 0",
        )
        .bind(outcome)
        .bind(realized_return_pct)
        .bind(recommendation_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn log_run(
        &self,
        run_id: &str,
        job: &str,
        status: &str,
        message: &str,
        details: &serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO run_logs (run_id, job, status, message, details, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(run_id)
        .bind(job)
        .bind(status)
        .bind(message)
        .bind(details.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_backtest_result(
        &self,
        campaign_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        params: &serde_json::Value,
        metrics: &serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO backtest_results (campaign_id, created_at, start, end, params, metrics)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(campaign_id)
        .bind(Utc::now())
        .bind(start)
        .bind(end)
        .bind(params.to_string())
        .bind(metrics.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
