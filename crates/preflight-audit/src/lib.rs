//! Pre-publish audit gate.
//!
//! Runs a fixed-order battery of checks over a candidate signal and its
//! computation context. Every check must pass before a recommendation is
//! persisted; the report is JSON-serializable for CI gating.

use backtest_engine::{check_campaign_guardrails, BacktestMetrics};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use signal_core::{derive_seed, RecommendationGenerationError};

const SEED_MAX: u32 = u32::MAX >> 1; // 2^31 - 1

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditCheck {
    pub name: String,
    pub passed: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub checks: Vec<AuditCheck>,
    pub all_checks_passed: bool,
    pub generated_at: DateTime<Utc>,
}

impl AuditReport {
    pub fn failed_checks(&self) -> Vec<&AuditCheck> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }

    /// Convert a failed report into the typed emission error; Ok when
    /// everything passed.
    pub fn ensure_passed(&self) -> Result<(), RecommendationGenerationError> {
        if self.all_checks_passed {
            return Ok(());
        }
        let failed: Vec<serde_json::Value> = self
            .failed_checks()
            .iter()
            .map(|c| {
                serde_json::json!({
                    "name": c.name,
                    "message": c.message,
                    "details": c.details,
                })
            })
            .collect();
        Err(RecommendationGenerationError::with_details(
            "audit_failed",
            format!("{} preflight check(s) failed", failed.len()),
            serde_json::json!({ "failed_checks": failed }),
        ))
    }
}

/// Evidence assembled by the orchestrator for the audit battery.
#[derive(Debug, Clone)]
pub struct AuditContext {
    pub code_commit: String,
    /// Dataset version carried by the signal.
    pub dataset_version: String,
    /// Dataset version recomputed from the on-disk curated partition.
    pub disk_dataset_version: Option<String>,
    /// Params digest carried by the signal.
    pub params_digest: String,
    /// Digest of the parameters actually loaded for this run.
    pub expected_params_digest: String,
    pub seed: u32,
    pub date: NaiveDate,
    pub symbol: String,
    pub backtest_run_id: Option<String>,
    pub backtest_metrics: Option<BacktestMetrics>,
    pub backtest_initial_capital: f64,
    pub theoretical_cagr: f64,
    /// Freshness validation failures, one message per stale interval.
    pub freshness_failures: Vec<String>,
    /// Unresolved gap failures, one message per interval.
    pub gap_failures: Vec<String>,
    /// True when the risk evaluator returned a blocking reject.
    pub risk_verdict_blocking: bool,
    pub risk_reject_reason: Option<String>,
}

/// Run all checks in their fixed order. Later checks still run after a
/// failure so the report shows the full picture.
pub fn run_audit(ctx: &AuditContext) -> AuditReport {
    let mut checks = Vec::with_capacity(8);

    checks.push(check(
        "code_commit",
        !ctx.code_commit.is_empty() && ctx.code_commit != "unknown",
        || format!("code commit {} resolvable", ctx.code_commit),
        "code commit missing or unresolvable".to_string(),
        serde_json::json!({"code_commit": ctx.code_commit}),
    ));

    let dataset_ok = !ctx.dataset_version.is_empty()
        && ctx
            .disk_dataset_version
            .as_deref()
            .is_some_and(|disk| disk == ctx.dataset_version);
    checks.push(check(
        "dataset_version",
        dataset_ok,
        || format!("dataset version {} matches on-disk hash", ctx.dataset_version),
        "dataset version missing or does not match on-disk hash".to_string(),
        serde_json::json!({
            "signal": ctx.dataset_version,
            "disk": ctx.disk_dataset_version,
        }),
    ));

    checks.push(check(
        "params_digest",
        !ctx.params_digest.is_empty() && ctx.params_digest == ctx.expected_params_digest,
        || "params digest matches loaded parameters".to_string(),
        "params digest does not match loaded parameters".to_string(),
        serde_json::json!({
            "signal": ctx.params_digest,
            "expected": ctx.expected_params_digest,
        }),
    ));

    let expected_seed = derive_seed(ctx.date, &ctx.symbol);
    checks.push(check(
        "seed",
        ctx.seed <= SEED_MAX && ctx.seed == expected_seed,
        || format!("seed {} derives from (date, symbol)", ctx.seed),
        "seed out of range or not derivable from (date, symbol)".to_string(),
        serde_json::json!({
            "seed": ctx.seed,
            "expected": expected_seed,
            "date": ctx.date.to_string(),
            "symbol": ctx.symbol,
        }),
    ));

    let (backtest_ok, backtest_details) = match (&ctx.backtest_run_id, &ctx.backtest_metrics) {
        (Some(run_id), Some(metrics)) => {
            let violations = check_campaign_guardrails(
                metrics,
                ctx.backtest_initial_capital,
                ctx.theoretical_cagr,
            );
            (
                violations.is_empty(),
                serde_json::json!({
                    "backtest_run_id": run_id,
                    "violations": violations,
                }),
            )
        }
        _ => (false, serde_json::json!({"backtest_run_id": ctx.backtest_run_id})),
    };
    checks.push(check(
        "backtest_guardrails",
        backtest_ok,
        || "backtest present and within guardrails".to_string(),
        "backtest missing or metrics violate guardrails".to_string(),
        backtest_details,
    ));

    checks.push(check(
        "data_freshness",
        ctx.freshness_failures.is_empty(),
        || "curated data within freshness thresholds".to_string(),
        format!("stale data: {}", ctx.freshness_failures.join("; ")),
        serde_json::json!({"failures": ctx.freshness_failures}),
    ));

    checks.push(check(
        "data_gaps",
        ctx.gap_failures.is_empty(),
        || "no unresolved gaps beyond tolerance".to_string(),
        format!("unresolved gaps: {}", ctx.gap_failures.join("; ")),
        serde_json::json!({"failures": ctx.gap_failures}),
    ));

    checks.push(check(
        "risk_verdict",
        !ctx.risk_verdict_blocking,
        || "risk evaluator verdict is not blocking".to_string(),
        format!(
            "risk evaluator blocked the emission ({})",
            ctx.risk_reject_reason.as_deref().unwrap_or("unknown")
        ),
        serde_json::json!({"reject_reason": ctx.risk_reject_reason}),
    ));

    let all_checks_passed = checks.iter().all(|c| c.passed);
    if !all_checks_passed {
        let failed: Vec<&str> = checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.name.as_str())
            .collect();
        tracing::warn!(failed = ?failed, "preflight audit failed");
    }
    AuditReport {
        checks,
        all_checks_passed,
        generated_at: Utc::now(),
    }
}

fn check(
    name: &str,
    passed: bool,
    pass_message: impl FnOnce() -> String,
    fail_message: String,
    details: serde_json::Value,
) -> AuditCheck {
    AuditCheck {
        name: name.to_string(),
        passed,
        message: if passed { pass_message() } else { fail_message },
        details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy_metrics() -> BacktestMetrics {
        BacktestMetrics {
            cagr: 20.0,
            calmar: 2.0,
            max_drawdown: 10.0,
            risk_of_ruin: 0.01,
            tracking_error: 100.0,
            total_trades: 50,
            ..Default::default()
        }
    }

    fn passing_context() -> AuditContext {
        let date = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        AuditContext {
            code_commit: "abc123def456".to_string(),
            dataset_version: "d41d8cd98f00".to_string(),
            disk_dataset_version: Some("d41d8cd98f00".to_string()),
            params_digest: "feedface".to_string(),
            expected_params_digest: "feedface".to_string(),
            seed: derive_seed(date, "BTCUSDT"),
            date,
            symbol: "BTCUSDT".to_string(),
            backtest_run_id: Some("0123456789ab".to_string()),
            backtest_metrics: Some(healthy_metrics()),
            backtest_initial_capital: 10_000.0,
            theoretical_cagr: 21.0,
            freshness_failures: Vec::new(),
            gap_failures: Vec::new(),
            risk_verdict_blocking: false,
            risk_reject_reason: None,
        }
    }

    #[test]
    fn healthy_context_passes_all_checks() {
        let report = run_audit(&passing_context());
        assert!(report.all_checks_passed);
        assert_eq!(report.checks.len(), 8);
        assert!(report.ensure_passed().is_ok());
    }

    #[test]
    fn checks_run_in_fixed_order() {
        let report = run_audit(&passing_context());
        let names: Vec<&str> = report.checks.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "code_commit",
                "dataset_version",
                "params_digest",
                "seed",
                "backtest_guardrails",
                "data_freshness",
                "data_gaps",
                "risk_verdict",
            ]
        );
    }

    #[test]
    fn wrong_seed_fails_the_seed_check() {
        let mut ctx = passing_context();
        ctx.seed = ctx.seed.wrapping_add(1);
        let report = run_audit(&ctx);
        assert!(!report.all_checks_passed);
        let failed = report.failed_checks();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].name, "seed");
    }

    #[test]
    fn dataset_mismatch_fails() {
        let mut ctx = passing_context();
        ctx.disk_dataset_version = Some("deadbeef0000".to_string());
        let report = run_audit(&ctx);
        assert!(report.failed_checks().iter().any(|c| c.name == "dataset_version"));
    }

    #[test]
    fn missing_backtest_fails_guardrail_check() {
        let mut ctx = passing_context();
        ctx.backtest_run_id = None;
        ctx.backtest_metrics = None;
        let report = run_audit(&ctx);
        assert!(report
            .failed_checks()
            .iter()
            .any(|c| c.name == "backtest_guardrails"));
    }

    #[test]
    fn guardrail_violations_fail_with_details() {
        let mut ctx = passing_context();
        ctx.backtest_metrics = Some(BacktestMetrics {
            max_drawdown: 40.0,
            ..healthy_metrics()
        });
        let report = run_audit(&ctx);
        let failed = report.failed_checks();
        assert_eq!(failed[0].name, "backtest_guardrails");
        assert!(failed[0].details["violations"].as_array().is_some());
    }

    #[test]
    fn failed_report_converts_to_emission_error() {
        let mut ctx = passing_context();
        ctx.freshness_failures.push("1h data is 900 minutes old".to_string());
        ctx.risk_verdict_blocking = true;
        ctx.risk_reject_reason = Some("capital_missing".to_string());

        let report = run_audit(&ctx);
        let err = report.ensure_passed().unwrap_err();
        assert_eq!(err.status, "audit_failed");
        let failed_names: Vec<String> = err.details["failed_checks"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["name"].as_str().unwrap().to_string())
            .collect();
        assert!(failed_names.contains(&"data_freshness".to_string()));
        assert!(failed_names.contains(&"risk_verdict".to_string()));
    }

    #[test]
    fn report_serializes_for_ci() {
        let report = run_audit(&passing_context());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["all_checks_passed"], true);
        assert_eq!(json["checks"].as_array().unwrap().len(), 8);
    }
}
