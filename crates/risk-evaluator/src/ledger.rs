use anyhow::Result;
use chrono::Utc;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;

use crate::db::RiskDb;
use crate::models::ExposureRow;

/// Per-user exposure ledger over beta-adjusted notionals.
///
/// Single writer: only the risk evaluator opens and closes positions.
/// Reads are plain queries against the active rows.
pub struct ExposureLedger {
    db: RiskDb,
}

impl ExposureLedger {
    pub fn new(db: RiskDb) -> Self {
        Self { db }
    }

    /// Insert the ledger row for a newly opened position. The
    /// `(user_id, recommendation_id)` primary key rejects duplicates.
    pub async fn open_position(&self, row: &ExposureRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO exposure_ledger (
                user_id, recommendation_id, symbol, direction, notional,
                beta_bucket, beta_value, entry_price, opened_at, closed_at, is_active
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, 1)
            "#,
        )
        .bind(&row.user_id)
        .bind(&row.recommendation_id)
        .bind(&row.symbol)
        .bind(&row.direction)
        .bind(row.notional)
        .bind(&row.beta_bucket)
        .bind(row.beta_value)
        .bind(row.entry_price)
        .bind(row.opened_at)
        .execute(self.db.pool())
        .await?;
        tracing::info!(
            user_id = %row.user_id,
            recommendation_id = %row.recommendation_id,
            notional = row.notional,
            beta = row.beta_value,
            "exposure position opened"
        );
        Ok(())
    }

    /// Close a position by flipping `is_active`; the row stays for audit.
    pub async fn close_position(&self, user_id: &str, recommendation_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE exposure_ledger SET is_active = 0, closed_at = ?
             WHERE user_id = ? AND recommendation_id = ? AND is_active = 1",
        )
        .bind(Utc::now())
        .bind(user_id)
        .bind(recommendation_id)
        .execute(self.db.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn active_positions(&self, user_id: &str) -> Result<Vec<ExposureRow>> {
        let rows: Vec<ExposureRow> = sqlx::query_as(
            "SELECT * FROM exposure_ledger WHERE user_id = ? AND is_active = 1
             ORDER BY opened_at",
        )
        .bind(user_id)
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows)
    }

    /// Aggregate beta-adjusted notional over active positions. Summed in
    /// decimal so many small positions cannot drift the limit check.
    pub async fn active_beta_adjusted_notional(&self, user_id: &str) -> Result<f64> {
        let rows = self.active_positions(user_id).await?;
        let total: Decimal = rows
            .iter()
            .map(|r| {
                Decimal::from_f64(r.notional).unwrap_or(Decimal::ZERO)
                    * Decimal::from_f64(r.beta_value).unwrap_or(Decimal::ONE)
            })
            .sum();
        Ok(total.to_f64().unwrap_or(0.0))
    }

    /// `Σ(active beta-adjusted notional) / equity`.
    pub async fn current_exposure_multiplier(&self, user_id: &str, equity: f64) -> Result<f64> {
        if equity <= 0.0 {
            return Ok(0.0);
        }
        Ok(self.active_beta_adjusted_notional(user_id).await? / equity)
    }
}
