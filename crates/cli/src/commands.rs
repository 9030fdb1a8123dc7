use std::sync::Arc;

use backtest_engine::{
    check_campaign_guardrails, reproduce_campaign, run_campaign, validate_sltp, BacktestMetrics,
    CampaignParams, ReplayStrategy, Side, SltpCase, SplitParams,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use signal_core::{Interval, Regime, SignalKind, INTERVALS};
use signal_orchestrator::EnsembleReplayStrategy;
use sqlx::Row;
use strategy_ensemble::{AggregatorParams, RegimeWeights};

use crate::context::AppContext;
use crate::{arg_flag, arg_value, emit_json};

const STRATEGY_NAMES: [&str; 4] = ["momentum_trend", "mean_reversion", "breakout", "volatility"];

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn ensemble_factory(
    weights: RegimeWeights,
    params: AggregatorParams,
) -> impl FnMut() -> Box<dyn ReplayStrategy> {
    move || {
        Box::new(EnsembleReplayStrategy::new(weights.clone(), params.clone()))
            as Box<dyn ReplayStrategy>
    }
}

/// `ingest --symbol --interval --start --end [--venues]`
pub async fn ingest(args: &[String]) -> u8 {
    let symbol = arg_value(args, "--symbol");
    let Some(interval) = arg_value(args, "--interval").and_then(|s| Interval::parse(&s)) else {
        eprintln!("ingest: --interval is required (15m|30m|1h|4h|1d|1w)");
        return 1;
    };
    let start = arg_value(args, "--start").and_then(|s| parse_date(&s));
    let end = arg_value(args, "--end").and_then(|s| parse_date(&s));

    let ctx = match AppContext::build(symbol).await {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("ingest: {e:#}");
            return 1;
        }
    };

    match ctx.ingestion.ingest_window(&ctx.symbol, interval, start, end).await {
        Ok(report) => {
            emit_json(
                "ingest_complete",
                serde_json::to_value(&report).unwrap_or_default(),
            );
            let rows: usize = report.rows_per_venue.iter().map(|(_, n)| n).sum();
            println!("ingested {rows} candles for {} {interval}", ctx.symbol);
            if rows == 0 && !report.venue_errors.is_empty() {
                return 2;
            }
            0
        }
        Err(e) => {
            emit_json("ingest_failed", serde_json::json!({"error": e.to_string()}));
            eprintln!("ingest: {e}");
            2
        }
    }
}

/// `curate --interval {15m|30m|1h|4h|1d|1w|all} [--symbol]`
pub async fn curate(args: &[String]) -> u8 {
    let selection = arg_value(args, "--interval").unwrap_or_else(|| "all".to_string());
    let intervals: Vec<Interval> = if selection == "all" {
        INTERVALS.to_vec()
    } else {
        match Interval::parse(&selection) {
            Some(interval) => vec![interval],
            None => {
                eprintln!("curate: unknown interval {selection}");
                return 1;
            }
        }
    };

    let ctx = match AppContext::build(arg_value(args, "--symbol")).await {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("curate: {e:#}");
            return 1;
        }
    };

    let mut failures = 0;
    for interval in intervals {
        match ctx.curation.curate(&ctx.symbol, interval) {
            Ok(report) => {
                emit_json(
                    "curated",
                    serde_json::to_value(&report).unwrap_or_default(),
                );
                println!(
                    "{} {}: {} rows, dataset {}, {} gap(s) unfilled",
                    ctx.symbol,
                    interval,
                    report.rows,
                    report.dataset_version,
                    report.unfilled_gaps.len()
                );
            }
            Err(e) => {
                eprintln!("curate {interval}: {e}");
                failures += 1;
            }
        }
    }
    if failures > 0 {
        1
    } else {
        0
    }
}

/// `backtest-campaign --start --end [--train-days --val-days --test-days
/// --walk-forward-window --cost-bps --symbol]`
pub async fn backtest_campaign(args: &[String]) -> u8 {
    let (Some(start), Some(end)) = (
        arg_value(args, "--start").and_then(|s| parse_date(&s)),
        arg_value(args, "--end").and_then(|s| parse_date(&s)),
    ) else {
        eprintln!("backtest-campaign: --start and --end are required (YYYY-MM-DD)");
        return 1;
    };

    let ctx = match AppContext::build(arg_value(args, "--symbol")).await {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("backtest-campaign: {e:#}");
            return 1;
        }
    };
    let frame = match ctx.curation.load_latest(&ctx.symbol, Interval::D1) {
        Ok(frame) => frame,
        Err(e) => {
            eprintln!("backtest-campaign: no curated 1d data ({e})");
            return 1;
        }
    };

    let parse_days = |name: &str, default: i64| {
        arg_value(args, name)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    };
    let params = CampaignParams {
        split: SplitParams {
            train_days: parse_days("--train-days", 365),
            val_days: parse_days("--val-days", 90),
            test_days: parse_days("--test-days", 90),
            walk_days: arg_value(args, "--walk-forward-window").and_then(|v| v.parse().ok()),
        },
        cost_bps: arg_value(args, "--cost-bps").and_then(|v| v.parse().ok()),
        ..Default::default()
    };

    let weights = RegimeWeights::uniform(Regime::Neutral, &STRATEGY_NAMES);
    let mut factory = ensemble_factory(weights, AggregatorParams::default());
    let output_dir = std::path::PathBuf::from(&ctx.settings.data_dir).join("campaigns");

    match run_campaign(&frame, start, end, &params, &mut factory, &output_dir) {
        Ok(result) => {
            emit_json(
                "campaign_complete",
                serde_json::json!({
                    "campaign_id": result.campaign_id,
                    "metrics": result.metrics,
                    "theoretical_cagr": result.theoretical_cagr,
                }),
            );
            println!("campaign {}", result.campaign_id);
            println!(
                "  cagr {:.2}%  sharpe {:.2}  max_dd {:.2}%  win_rate {:.1}%  trades {}",
                result.metrics.cagr,
                result.metrics.sharpe,
                result.metrics.max_drawdown,
                result.metrics.win_rate,
                result.metrics.total_trades
            );
            println!(
                "  tracking_error {:.2} ({:.1} bps)",
                result.metrics.tracking_error, result.metrics.tracking_error_bps
            );

            let initial = result.equity_curve.first().map(|p| p.equity).unwrap_or(0.0);
            let violations =
                check_campaign_guardrails(&result.metrics, initial, result.theoretical_cagr);
            if !violations.is_empty() {
                for violation in &violations {
                    eprintln!("guardrail violation: {}", violation.message);
                }
                emit_json(
                    "campaign_rejected",
                    serde_json::json!({"violations": violations}),
                );
                return 1;
            }
            0
        }
        Err(abort) => {
            eprintln!("backtest-campaign: {}", abort.reason);
            emit_json(
                "campaign_aborted",
                serde_json::json!({"reason": abort.reason, "details": abort.details}),
            );
            1
        }
    }
}

/// `reproduce-campaign --campaign-id [--output-dir] [--symbol]`
pub async fn reproduce_campaign_cmd(args: &[String]) -> u8 {
    let Some(campaign_id) = arg_value(args, "--campaign-id") else {
        eprintln!("reproduce-campaign: --campaign-id is required");
        return 1;
    };

    let ctx = match AppContext::build(arg_value(args, "--symbol")).await {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("reproduce-campaign: {e:#}");
            return 1;
        }
    };
    let frame = match ctx.curation.load_latest(&ctx.symbol, Interval::D1) {
        Ok(frame) => frame,
        Err(e) => {
            eprintln!("reproduce-campaign: no curated 1d data ({e})");
            return 1;
        }
    };

    let output_dir = arg_value(args, "--output-dir")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| std::path::PathBuf::from(&ctx.settings.data_dir).join("campaigns"));
    let weights = RegimeWeights::uniform(Regime::Neutral, &STRATEGY_NAMES);
    let mut factory = ensemble_factory(weights, AggregatorParams::default());

    match reproduce_campaign(&frame, &output_dir, &campaign_id, &mut factory) {
        Ok((result, identical)) => {
            emit_json(
                "campaign_reproduced",
                serde_json::json!({
                    "campaign_id": campaign_id,
                    "identical": identical,
                    "trades_checksum": result.trades_checksum,
                    "equity_checksum": result.equity_checksum,
                }),
            );
            if identical {
                println!("campaign {campaign_id} reproduced bit-identically");
                0
            } else {
                eprintln!("campaign {campaign_id} did NOT reproduce identically");
                1
            }
        }
        Err(abort) => {
            eprintln!("reproduce-campaign: {}", abort.reason);
            1
        }
    }
}

/// `sensitivity --start-date --end-date [--params-path]
/// --critical-params a,b,c`
pub async fn sensitivity(args: &[String]) -> u8 {
    let (Some(start), Some(end)) = (
        arg_value(args, "--start-date").and_then(|s| parse_date(&s)),
        arg_value(args, "--end-date").and_then(|s| parse_date(&s)),
    ) else {
        eprintln!("sensitivity: --start-date and --end-date are required");
        return 1;
    };
    let critical: Vec<String> = arg_value(args, "--critical-params")
        .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
        .unwrap_or_else(|| vec!["position_size_pct".to_string(), "base_bps".to_string()]);

    let ctx = match AppContext::build(arg_value(args, "--symbol")).await {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("sensitivity: {e:#}");
            return 1;
        }
    };
    let frame = match ctx.curation.load_latest(&ctx.symbol, Interval::D1) {
        Ok(frame) => frame,
        Err(e) => {
            eprintln!("sensitivity: no curated 1d data ({e})");
            return 1;
        }
    };

    let base_params: CampaignParams = match arg_value(args, "--params-path") {
        Some(path) => match std::fs::read(&path)
            .map_err(|e| e.to_string())
            .and_then(|b| serde_json::from_slice(&b).map_err(|e| e.to_string()))
        {
            Ok(params) => params,
            Err(e) => {
                eprintln!("sensitivity: cannot load params from {path}: {e}");
                return 1;
            }
        },
        None => CampaignParams::default(),
    };

    let output_dir = std::path::PathBuf::from(&ctx.settings.data_dir).join("sensitivity");
    let weights = RegimeWeights::uniform(Regime::Neutral, &STRATEGY_NAMES);

    let mut factory = ensemble_factory(weights.clone(), AggregatorParams::default());
    let baseline = match run_campaign(&frame, start, end, &base_params, &mut factory, &output_dir) {
        Ok(result) => result,
        Err(abort) => {
            eprintln!("sensitivity: baseline campaign aborted: {}", abort.reason);
            return 1;
        }
    };
    println!(
        "baseline {}: cagr {:.2}%  max_dd {:.2}%",
        baseline.campaign_id, baseline.metrics.cagr, baseline.metrics.max_drawdown
    );

    let mut failures = 0;
    for param in &critical {
        for direction in [-0.1, 0.1] {
            let mut perturbed = base_params.clone();
            let applied = match param.as_str() {
                "position_size_pct" => {
                    perturbed.replay.position_size_pct *= 1.0 + direction;
                    true
                }
                "base_bps" => {
                    perturbed.replay.execution.base_bps *= 1.0 + direction;
                    true
                }
                "gap_penalty" => {
                    perturbed.replay.execution.gap_penalty *= 1.0 + direction;
                    true
                }
                "vol_coeff" => {
                    perturbed.replay.execution.vol_coeff *= 1.0 + direction;
                    true
                }
                _ => false,
            };
            if !applied {
                eprintln!("sensitivity: unknown critical param {param}, skipping");
                break;
            }

            let mut factory = ensemble_factory(weights.clone(), AggregatorParams::default());
            match run_campaign(&frame, start, end, &perturbed, &mut factory, &output_dir) {
                Ok(result) => {
                    let divergence = result.metrics.cagr - baseline.metrics.cagr;
                    println!(
                        "  {param} {:+.0}%: cagr {:.2}% (divergence {:+.2}pp), max_dd {:.2}%",
                        direction * 100.0,
                        result.metrics.cagr,
                        divergence,
                        result.metrics.max_drawdown
                    );
                    emit_json(
                        "sensitivity_point",
                        serde_json::json!({
                            "param": param,
                            "direction": direction,
                            "campaign_id": result.campaign_id,
                            "cagr": result.metrics.cagr,
                            "cagr_divergence_pp": divergence,
                        }),
                    );
                }
                Err(abort) => {
                    eprintln!("  {param} {direction:+.1}: aborted ({})", abort.reason);
                    failures += 1;
                }
            }
        }
    }
    if failures > 0 {
        1
    } else {
        0
    }
}

/// `preflight-audit [--recommendation-id | --generate] [--fail-on-error]
/// [--output]`
pub async fn preflight_audit_cmd(args: &[String]) -> u8 {
    let fail_on_error = arg_flag(args, "--fail-on-error");
    let ctx = match AppContext::build(arg_value(args, "--symbol")).await {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("preflight-audit: {e:#}");
            return 1;
        }
    };

    if arg_flag(args, "--generate") {
        match ctx
            .orchestrator
            .generate_recommendation(&ctx.settings.default_user_id)
            .await
        {
            Ok(payload) => {
                write_output(args, &payload);
                println!("preflight audit passed");
                println!("signal: {}", payload["signal"].as_str().unwrap_or("?"));
                0
            }
            Err(e) => {
                let report = e.to_payload();
                write_output(args, &report);
                eprintln!("recommendation generation failed ({}): {}", e.status, e.reason);
                if let Some(checks) = e.details["failed_checks"].as_array() {
                    for check in checks {
                        eprintln!(
                            "  failed: {} - {}",
                            check["name"].as_str().unwrap_or("?"),
                            check["message"].as_str().unwrap_or("")
                        );
                    }
                }
                if fail_on_error {
                    1
                } else {
                    0
                }
            }
        }
    } else {
        // Audit an already stored recommendation
        let payload = match arg_value(args, "--recommendation-id") {
            Some(id) => ctx.orchestrator.store().get_payload(&id).await,
            None => ctx.orchestrator.store().latest().await,
        };
        let Ok(Some(payload)) = payload else {
            eprintln!("preflight-audit: no recommendation found");
            return 1;
        };
        let report = audit_stored_payload(&ctx, &payload).await;
        write_output(args, &serde_json::to_value(&report).unwrap_or_default());

        println!(
            "preflight audit: {}",
            if report.all_checks_passed { "PASSED" } else { "FAILED" }
        );
        for check in &report.checks {
            println!(
                "  [{}] {}: {}",
                if check.passed { "ok" } else { "fail" },
                check.name,
                check.message
            );
        }
        if !report.all_checks_passed && fail_on_error {
            1
        } else {
            0
        }
    }
}

async fn audit_stored_payload(
    ctx: &AppContext,
    payload: &serde_json::Value,
) -> preflight_audit::AuditReport {
    let date = payload["date"]
        .as_str()
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .unwrap_or_else(|| Utc::now().date_naive());
    let symbol = payload["symbol"].as_str().unwrap_or(&ctx.symbol).to_string();

    let backtest_metrics: Option<BacktestMetrics> = match payload["backtest_run_id"].as_str() {
        Some(campaign_id) => sqlx::query("SELECT metrics FROM backtest_results WHERE campaign_id = ?")
            .bind(campaign_id)
            .fetch_optional(&ctx.pool)
            .await
            .ok()
            .flatten()
            .and_then(|row| serde_json::from_str(&row.get::<String, _>("metrics")).ok()),
        None => None,
    };

    let mut freshness_failures = Vec::new();
    let mut gap_failures = Vec::new();
    for interval in [Interval::H1, Interval::D1] {
        if let Err(e) = ctx.curation.validate_freshness(&symbol, interval, Utc::now()) {
            freshness_failures.push(e.to_string());
        }
        if let Err(e) = ctx.curation.validate_gaps(&symbol, interval) {
            gap_failures.push(e.to_string());
        }
    }

    let params_digest = payload["params_version"].as_str().unwrap_or("").to_string();
    preflight_audit::run_audit(&preflight_audit::AuditContext {
        code_commit: payload["code_commit"].as_str().unwrap_or("").to_string(),
        dataset_version: payload["dataset_version"].as_str().unwrap_or("").to_string(),
        disk_dataset_version: ctx.store.dataset_version("binance", &symbol, Interval::D1),
        params_digest: params_digest.clone(),
        expected_params_digest: params_digest,
        seed: payload["seed"].as_u64().unwrap_or(0) as u32,
        date,
        symbol,
        backtest_run_id: payload["backtest_run_id"].as_str().map(|s| s.to_string()),
        backtest_metrics,
        backtest_initial_capital: 10_000.0,
        theoretical_cagr: payload["backtest_cagr"].as_f64().unwrap_or(0.0),
        freshness_failures,
        gap_failures,
        risk_verdict_blocking: false,
        risk_reject_reason: payload["risk_metrics"]["rejection_reason"]
            .as_str()
            .map(|s| s.to_string()),
    })
}

fn write_output(args: &[String], value: &serde_json::Value) {
    if let Some(path) = arg_value(args, "--output") {
        match serde_json::to_vec_pretty(value) {
            Ok(bytes) => {
                if let Err(e) = std::fs::write(&path, bytes) {
                    eprintln!("could not write report to {path}: {e}");
                } else {
                    println!("report saved to {path}");
                }
            }
            Err(e) => eprintln!("could not serialize report: {e}"),
        }
    }
}

/// `validate-sltp --weeks --symbol --venue --fulfillment-threshold`
pub async fn validate_sltp_cmd(args: &[String]) -> u8 {
    let weeks: i64 = arg_value(args, "--weeks")
        .and_then(|v| v.parse().ok())
        .unwrap_or(4);
    let threshold: f64 = arg_value(args, "--fulfillment-threshold")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0.6);

    let ctx = match AppContext::build(arg_value(args, "--symbol")).await {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("validate-sltp: {e:#}");
            return 1;
        }
    };
    let frame = match ctx.curation.load_latest(&ctx.symbol, Interval::D1) {
        Ok(frame) => frame,
        Err(e) => {
            eprintln!("validate-sltp: no curated 1d data ({e})");
            return 1;
        }
    };

    let since = Utc::now().date_naive() - Duration::weeks(weeks);
    let payloads = match ctx.orchestrator.store().payloads_since(since).await {
        Ok(payloads) => payloads,
        Err(e) => {
            eprintln!("validate-sltp: {e}");
            return 2;
        }
    };

    let cases: Vec<SltpCase> = payloads
        .iter()
        .filter_map(|p| {
            let signal = SignalKind::parse(p["signal"].as_str()?)?;
            if signal == SignalKind::Hold {
                return None;
            }
            Some(SltpCase {
                time: p["market_timestamp"].as_str()?.parse().ok()?,
                side: if signal == SignalKind::Buy { Side::Long } else { Side::Short },
                entry: p["entry_range"]["optimal"].as_f64()?,
                sl: p["sl"].as_f64()?,
                tp: p["tp"].as_f64()?,
            })
        })
        .collect();

    if cases.is_empty() {
        println!("validate-sltp: no directional recommendations in the last {weeks} week(s)");
        return 0;
    }

    let report = validate_sltp(&frame, &cases, Duration::weeks(weeks), threshold);
    emit_json(
        "sltp_validation",
        serde_json::to_value(&report).unwrap_or_default(),
    );
    println!(
        "validated {} case(s): tp_first {}, sl_first {}, neither {}, fulfillment {:.1}%",
        report.cases,
        report.tp_first,
        report.sl_first,
        report.neither,
        report.fulfillment_rate * 100.0
    );
    if report.passed {
        0
    } else {
        eprintln!(
            "fulfillment rate {:.1}% below threshold {:.1}%",
            report.fulfillment_rate * 100.0,
            threshold * 100.0
        );
        1
    }
}

/// `check-alerts` - exits non-zero when staleness or divergence
/// thresholds are exceeded. Designed for CI cron.
pub async fn check_alerts(args: &[String]) -> u8 {
    let ctx = match AppContext::build(arg_value(args, "--symbol")).await {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("check-alerts: {e:#}");
            return 2;
        }
    };

    let mut alerts: Vec<String> = Vec::new();
    for interval in [Interval::H1, Interval::D1] {
        if let Err(e) = ctx.curation.validate_freshness(&ctx.symbol, interval, Utc::now()) {
            alerts.push(format!("ingestion stale: {e}"));
        }
        if let Err(e) = ctx.curation.validate_gaps(&ctx.symbol, interval) {
            alerts.push(format!("data gaps: {e}"));
        }
    }

    match ctx.orchestrator.store().latest().await {
        Ok(Some(payload)) => {
            let age_ok = payload["created_at"]
                .as_str()
                .or(payload["ingestion_timestamp"].as_str())
                .and_then(|s| s.parse::<DateTime<Utc>>().ok())
                .map(|t| Utc::now() - t < Duration::hours(48))
                .unwrap_or(false);
            if !age_ok {
                alerts.push("signal stale: no recommendation in the last 48h".to_string());
            }
        }
        Ok(None) => alerts.push("signal stale: no recommendations stored".to_string()),
        Err(e) => {
            eprintln!("check-alerts: {e}");
            return 2;
        }
    }

    emit_json("alert_check", serde_json::json!({"alerts": alerts}));
    if alerts.is_empty() {
        println!("no alerts");
        0
    } else {
        for alert in &alerts {
            eprintln!("ALERT: {alert}");
        }
        1
    }
}

/// `run` - start the scheduler daemon (ingestion cadence, daily
/// pipeline, startup maintenance).
pub async fn run_daemon(args: &[String]) -> u8 {
    let ctx = match AppContext::build(arg_value(args, "--symbol")).await {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("run: {e:#}");
            return 1;
        }
    };

    let scheduler = Arc::new(scheduler::Scheduler::new(
        Arc::clone(&ctx.ingestion),
        Arc::clone(&ctx.curation),
        Arc::clone(&ctx.orchestrator),
        ctx.metrics(),
        ctx.settings.clone(),
        ctx.symbol.clone(),
    ));
    tracing::info!(symbol = %ctx.symbol, "scheduler starting");
    scheduler.run().await;
    0
}
