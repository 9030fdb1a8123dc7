use std::path::{Path, PathBuf};

use candle_store::NumericTable;
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use signal_core::{CampaignAbort, CuratedFrame};

use crate::engine::{BacktestEngine, ReplayResult, ReplayStrategy};
use crate::metrics::{compute_metrics, tracking_error_rmse, BacktestMetrics};
use crate::models::{EquityPoint, ReplayConfig, Trade};
use crate::time_split::{split_windows, SplitParams};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignParams {
    pub split: SplitParams,
    pub replay: ReplayConfig,
    /// Optional flat cost override for the execution model's base bps.
    pub cost_bps: Option<f64>,
}

impl Default for CampaignParams {
    fn default() -> Self {
        Self {
            split: SplitParams::default(),
            replay: ReplayConfig::default(),
            cost_bps: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CampaignResult {
    pub campaign_id: String,
    pub metrics: BacktestMetrics,
    pub theoretical_cagr: f64,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub artifacts_dir: PathBuf,
    pub trades_checksum: String,
    pub equity_checksum: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailViolation {
    pub name: String,
    pub message: String,
    pub observed: f64,
    pub limit: f64,
}

/// Content address for a campaign: the first 12 hex characters of
/// `MD5(params || start || end)`. Reruns with identical inputs land in
/// the same directory.
pub fn campaign_id(params: &CampaignParams, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    let params_json = serde_json::to_string(params).unwrap_or_default();
    let mut hasher = Md5::new();
    hasher.update(params_json.as_bytes());
    hasher.update(start.to_rfc3339().as_bytes());
    hasher.update(end.to_rfc3339().as_bytes());
    hex::encode(hasher.finalize())[..12].to_string()
}

/// Run a full walk-forward campaign: replay the strategy over every
/// evaluation fold with realistic execution, replay a frictionless twin
/// for the tracking-error baseline, compute metrics, and persist the
/// content-addressed artifacts.
pub fn run_campaign(
    frame: &CuratedFrame,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    params: &CampaignParams,
    strategy_factory: &mut dyn FnMut() -> Box<dyn ReplayStrategy>,
    output_dir: &Path,
) -> Result<CampaignResult, CampaignAbort> {
    let plan = split_windows(start, end, &params.split)?;
    let id = campaign_id(params, start, end);
    let ruin_seed = u64::from_str_radix(&id, 16).unwrap_or(0);

    let mut realistic_config = params.replay.clone();
    if let Some(cost_bps) = params.cost_bps {
        realistic_config.execution.base_bps = cost_bps;
    }

    let realistic = replay_folds(frame, &plan, &realistic_config, strategy_factory)?;
    let theoretical = replay_folds(
        frame,
        &plan,
        &realistic_config.frictionless(),
        strategy_factory,
    )?;

    let mut metrics = compute_metrics(
        &realistic.trades,
        &realistic.equity_curve,
        realistic.initial_capital,
        realistic.final_equity,
        ruin_seed,
    );
    metrics.tracking_error = tracking_error_rmse(&realistic.equity_curve, &theoretical.equity_curve);
    metrics.tracking_error_bps = if realistic.initial_capital > 0.0 {
        metrics.tracking_error / realistic.initial_capital * 10_000.0
    } else {
        0.0
    };

    let theoretical_metrics = compute_metrics(
        &theoretical.trades,
        &theoretical.equity_curve,
        theoretical.initial_capital,
        theoretical.final_equity,
        ruin_seed,
    );

    let artifacts_dir = output_dir.join(&id);
    let (trades_checksum, equity_checksum) = persist_artifacts(
        &artifacts_dir,
        &id,
        params,
        start,
        end,
        frame,
        &realistic,
        &metrics,
        theoretical_metrics.cagr,
    )
    .map_err(|e| {
        CampaignAbort::with_details(
            "failed to persist campaign artifacts",
            serde_json::json!({"error": e.to_string()}),
        )
    })?;

    tracing::info!(
        campaign_id = %id,
        trades = realistic.trades.len(),
        cagr = metrics.cagr,
        max_drawdown = metrics.max_drawdown,
        tracking_error_bps = metrics.tracking_error_bps,
        "campaign complete"
    );

    Ok(CampaignResult {
        campaign_id: id,
        metrics,
        theoretical_cagr: theoretical_metrics.cagr,
        trades: realistic.trades,
        equity_curve: realistic.equity_curve,
        artifacts_dir,
        trades_checksum,
        equity_checksum,
    })
}

/// Re-run a persisted campaign from its stored parameters and report
/// whether the artifacts reproduce bit-identically.
pub fn reproduce_campaign(
    frame: &CuratedFrame,
    output_dir: &Path,
    id: &str,
    strategy_factory: &mut dyn FnMut() -> Box<dyn ReplayStrategy>,
) -> Result<(CampaignResult, bool), CampaignAbort> {
    let metadata_path = output_dir.join(id).join("metadata.json");
    let bytes = std::fs::read(&metadata_path).map_err(|e| {
        CampaignAbort::with_details(
            "campaign metadata not found",
            serde_json::json!({"path": metadata_path.display().to_string(), "error": e.to_string()}),
        )
    })?;
    let metadata: serde_json::Value = serde_json::from_slice(&bytes).map_err(|e| {
        CampaignAbort::with_details(
            "campaign metadata unreadable",
            serde_json::json!({"error": e.to_string()}),
        )
    })?;

    let params: CampaignParams = serde_json::from_value(metadata["params"].clone())
        .map_err(|e| CampaignAbort::new(format!("campaign params unreadable: {e}")))?;
    let start = parse_time(&metadata, "start")?;
    let end = parse_time(&metadata, "end")?;
    let original_trades = metadata["trades_checksum"].as_str().unwrap_or_default().to_string();
    let original_equity = metadata["equity_checksum"].as_str().unwrap_or_default().to_string();

    let rerun_dir = output_dir.join(format!("{id}-reproduce"));
    let result = run_campaign(frame, start, end, &params, strategy_factory, &rerun_dir)?;
    let identical =
        result.trades_checksum == original_trades && result.equity_checksum == original_equity;
    Ok((result, identical))
}

/// Guardrail battery over campaign metrics. An empty result means the
/// campaign may back a published recommendation.
pub fn check_campaign_guardrails(
    metrics: &BacktestMetrics,
    initial_capital: f64,
    theoretical_cagr: f64,
) -> Vec<GuardrailViolation> {
    if metrics.total_trades == 0 {
        // A flat campaign carries no drawdown, ruin, or divergence
        // evidence to bound; the ratio guardrails are meaningless on it
        tracing::warn!("campaign produced no trades; guardrails pass vacuously");
        return Vec::new();
    }
    let mut violations = Vec::new();
    let mut check = |name: &str, observed: f64, limit: f64, ok: bool, message: String| {
        if !ok {
            violations.push(GuardrailViolation {
                name: name.to_string(),
                message,
                observed,
                limit,
            });
        }
    };

    check(
        "max_drawdown",
        metrics.max_drawdown,
        25.0,
        metrics.max_drawdown <= 25.0,
        format!("max drawdown {:.2}% exceeds 25%", metrics.max_drawdown),
    );
    check(
        "calmar",
        metrics.calmar,
        1.5,
        metrics.calmar >= 1.5,
        format!("calmar {:.2} below 1.5", metrics.calmar),
    );
    check(
        "risk_of_ruin",
        metrics.risk_of_ruin,
        0.05,
        metrics.risk_of_ruin <= 0.05,
        format!("risk of ruin {:.2}% exceeds 5%", metrics.risk_of_ruin * 100.0),
    );
    let divergence = (metrics.cagr - theoretical_cagr).abs();
    check(
        "cagr_divergence",
        divergence,
        5.0,
        divergence <= 5.0,
        format!(
            "realistic CAGR {:.2}% diverges {:.2}pp from theoretical {:.2}%",
            metrics.cagr, divergence, theoretical_cagr
        ),
    );
    let tracking_limit = initial_capital * 0.05;
    check(
        "tracking_error",
        metrics.tracking_error,
        tracking_limit,
        metrics.tracking_error <= tracking_limit,
        format!(
            "tracking error RMSE {:.2} exceeds 5% of initial capital",
            metrics.tracking_error
        ),
    );
    violations
}

fn replay_folds(
    frame: &CuratedFrame,
    plan: &crate::time_split::SplitPlan,
    config: &ReplayConfig,
    strategy_factory: &mut dyn FnMut() -> Box<dyn ReplayStrategy>,
) -> Result<ReplayResult, CampaignAbort> {
    let mut combined = ReplayResult {
        initial_capital: config.initial_capital,
        final_equity: config.initial_capital,
        ..Default::default()
    };
    let mut carried_capital = config.initial_capital;

    for window in plan.evaluation_windows() {
        let slice = frame.between(window.start, window.end);
        if slice.is_empty() {
            return Err(CampaignAbort::with_details(
                "evaluation window has no curated data",
                serde_json::json!({
                    "window_start": window.start.to_rfc3339(),
                    "window_end": window.end.to_rfc3339(),
                }),
            ));
        }
        let mut fold_config = config.clone();
        fold_config.initial_capital = carried_capital;
        let engine = BacktestEngine::new(fold_config);
        let mut strategy = strategy_factory();
        let fold = engine.run(&slice, strategy.as_mut());

        carried_capital = fold.final_equity;
        combined.trades.extend(fold.trades);
        combined.equity_curve.extend(fold.equity_curve);
        combined.gap_events.extend(fold.gap_events);
        if combined.start.is_none() {
            combined.start = fold.start;
        }
        combined.end = fold.end;
    }

    combined.final_equity = carried_capital;
    Ok(combined)
}

#[allow(clippy::too_many_arguments)]
fn persist_artifacts(
    dir: &Path,
    id: &str,
    params: &CampaignParams,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    frame: &CuratedFrame,
    result: &ReplayResult,
    metrics: &BacktestMetrics,
    theoretical_cagr: f64,
) -> anyhow::Result<(String, String)> {
    std::fs::create_dir_all(dir)?;

    let mut trades = NumericTable::new();
    trades.time = result.trades.iter().map(|t| t.exit_time.timestamp_millis()).collect();
    trades.floats.insert(
        "entry_time_ms".to_string(),
        result.trades.iter().map(|t| t.entry_time.timestamp_millis() as f64).collect(),
    );
    for (name, pick) in [
        ("entry_price", (|t: &Trade| t.entry_price) as fn(&Trade) -> f64),
        ("exit_price", |t| t.exit_price),
        ("qty", |t| t.qty),
        ("pnl", |t| t.pnl),
        ("return_pct", |t| t.return_pct),
        ("mae", |t| t.mae),
        ("mfe", |t| t.mfe),
    ] {
        trades
            .floats
            .insert(name.to_string(), result.trades.iter().map(pick).collect());
    }
    trades.strings.insert(
        "side".to_string(),
        result.trades.iter().map(|t| t.side.as_str().to_string()).collect(),
    );
    trades.strings.insert(
        "exit_reason".to_string(),
        result
            .trades
            .iter()
            .map(|t| t.exit_reason.as_str().to_string())
            .collect(),
    );
    let trades_checksum = trades.write(&dir.join("trades.parquet"))?;

    let mut equity = NumericTable::new();
    equity.time = result.equity_curve.iter().map(|p| p.time.timestamp_millis()).collect();
    equity.floats.insert(
        "equity".to_string(),
        result.equity_curve.iter().map(|p| p.equity).collect(),
    );
    let equity_checksum = equity.write(&dir.join("equity.parquet"))?;

    let metadata = serde_json::json!({
        "campaign_id": id,
        "params": params,
        "start": start.to_rfc3339(),
        "end": end.to_rfc3339(),
        "symbol": frame.symbol,
        "interval": frame.interval,
        "dataset_version": frame.dataset_version,
        "metrics": metrics,
        "theoretical_cagr": theoretical_cagr,
        "trades_checksum": trades_checksum,
        "equity_checksum": equity_checksum,
        "created_at": Utc::now().to_rfc3339(),
    });
    std::fs::write(dir.join("metadata.json"), serde_json::to_vec_pretty(&metadata)?)?;

    Ok((trades_checksum, equity_checksum))
}

fn parse_time(metadata: &serde_json::Value, key: &str) -> Result<DateTime<Utc>, CampaignAbort> {
    metadata[key]
        .as_str()
        .and_then(|s| s.parse::<DateTime<Utc>>().ok())
        .ok_or_else(|| CampaignAbort::new(format!("campaign metadata missing {key}")))
}
