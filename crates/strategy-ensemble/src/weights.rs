use std::collections::BTreeMap;

use anyhow::Result;
use chrono::NaiveDate;
use signal_core::Regime;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Active ensemble weights for one regime, from the newest snapshot.
#[derive(Debug, Clone)]
pub struct RegimeWeights {
    pub regime: Regime,
    pub snapshot_date: Option<NaiveDate>,
    pub weights: BTreeMap<String, f64>,
}

impl RegimeWeights {
    /// Uniform fallback over the given strategy names.
    pub fn uniform(regime: Regime, strategies: &[&str]) -> Self {
        let w = 1.0 / strategies.len().max(1) as f64;
        Self {
            regime,
            snapshot_date: None,
            weights: strategies.iter().map(|s| (s.to_string(), w)).collect(),
        }
    }

    pub fn weight_for(&self, strategy: &str) -> f64 {
        self.weights.get(strategy).copied().unwrap_or(0.0)
    }

    fn sum(&self) -> f64 {
        self.weights.values().sum()
    }
}

/// Regime-partitioned ensemble weight rows. Only `is_active` rows with
/// the newest `snapshot_date` for a regime are served; weights for a
/// regime must sum to 1 within tolerance or the store falls back to
/// uniform.
pub struct EnsembleWeightStore {
    pool: sqlx::SqlitePool,
}

impl EnsembleWeightStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn init_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ensemble_weights (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                regime TEXT NOT NULL,
                strategy_name TEXT NOT NULL,
                weight REAL NOT NULL,
                snapshot_date TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_ensemble_weights_lookup
             ON ensemble_weights (regime, is_active, snapshot_date)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Load the active weights for a regime, falling back to uniform when
    /// no snapshot exists or the stored weights fail the sum check.
    pub async fn load(&self, regime: Regime, strategies: &[&str]) -> Result<RegimeWeights> {
        let rows: Vec<(String, f64, String)> = sqlx::query_as(
            r#"
            SELECT strategy_name, weight, snapshot_date
            FROM ensemble_weights
            WHERE regime = ? AND is_active = 1
              AND snapshot_date = (
                SELECT MAX(snapshot_date) FROM ensemble_weights
                WHERE regime = ? AND is_active = 1
              )
            "#,
        )
        .bind(regime.as_str())
        .bind(regime.as_str())
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            tracing::debug!(regime = %regime, "no ensemble weights stored, using uniform");
            return Ok(RegimeWeights::uniform(regime, strategies));
        }

        let snapshot_date = rows
            .first()
            .and_then(|(_, _, d)| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());
        let loaded = RegimeWeights {
            regime,
            snapshot_date,
            weights: rows.into_iter().map(|(name, w, _)| (name, w)).collect(),
        };

        if (loaded.sum() - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            tracing::warn!(
                regime = %regime,
                sum = loaded.sum(),
                "stored ensemble weights do not sum to 1, using uniform"
            );
            return Ok(RegimeWeights::uniform(regime, strategies));
        }
        Ok(loaded)
    }

    /// Replace the active snapshot for a regime. Prior rows are
    /// deactivated, never deleted.
    pub async fn store_snapshot(
        &self,
        regime: Regime,
        snapshot_date: NaiveDate,
        weights: &BTreeMap<String, f64>,
    ) -> Result<()> {
        let sum: f64 = weights.values().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            anyhow::bail!("weights for {regime} sum to {sum}, expected 1.0");
        }
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE ensemble_weights SET is_active = 0 WHERE regime = ?")
            .bind(regime.as_str())
            .execute(&mut *tx)
            .await?;
        for (strategy, weight) in weights {
            sqlx::query(
                "INSERT INTO ensemble_weights (regime, strategy_name, weight, snapshot_date, is_active)
                 VALUES (?, ?, ?, ?, 1)",
            )
            .bind(regime.as_str())
            .bind(strategy)
            .bind(weight)
            .bind(snapshot_date.format("%Y-%m-%d").to_string())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
