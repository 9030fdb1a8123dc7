//! tradectl: operational surface for the signal engine.
//!
//! Usage:
//!   tradectl ingest --symbol BTCUSDT --interval 1h --start 2024-01-01 --end 2024-06-01
//!   tradectl curate --interval all
//!   tradectl backtest-campaign --start 2023-01-01 --end 2024-12-31 --cost-bps 8
//!   tradectl reproduce-campaign --campaign-id 0123456789ab
//!   tradectl sensitivity --start-date 2023-01-01 --end-date 2024-12-31 --critical-params position_size_pct,base_bps
//!   tradectl preflight-audit --generate --fail-on-error
//!   tradectl validate-sltp --weeks 4 --fulfillment-threshold 0.6
//!   tradectl check-alerts
//!   tradectl run
//!
//! Exit codes: 0 success, 1 recoverable failure (validation, stale
//! data), 2 transport failure. Structured JSON lines go to stderr.

mod commands;
mod context;

use std::process::ExitCode;

fn usage() {
    eprintln!(
        "usage: tradectl <ingest|curate|backtest-campaign|reproduce-campaign|sensitivity|preflight-audit|validate-sltp|check-alerts|run> [options]"
    );
}

/// Scan for `--name value`.
pub(crate) fn arg_value(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

/// Scan for a bare `--name` flag.
pub(crate) fn arg_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|a| a == name)
}

/// Structured JSON line on stderr for machine consumers.
pub(crate) fn emit_json(event: &str, payload: serde_json::Value) {
    let mut line = serde_json::json!({"event": event});
    if let (Some(obj), Some(extra)) = (line.as_object_mut(), payload.as_object()) {
        for (k, v) in extra {
            obj.insert(k.clone(), v.clone());
        }
    }
    eprintln!("{line}");
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tradectl=info,signal_orchestrator=info,scheduler=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(command) = args.get(1).map(|s| s.as_str()) else {
        usage();
        return ExitCode::from(1);
    };

    let code = match command {
        "ingest" => commands::ingest(&args).await,
        "curate" => commands::curate(&args).await,
        "backtest-campaign" => commands::backtest_campaign(&args).await,
        "reproduce-campaign" => commands::reproduce_campaign_cmd(&args).await,
        "sensitivity" => commands::sensitivity(&args).await,
        "preflight-audit" => commands::preflight_audit_cmd(&args).await,
        "validate-sltp" => commands::validate_sltp_cmd(&args).await,
        "check-alerts" => commands::check_alerts(&args).await,
        "run" => commands::run_daemon(&args).await,
        _ => {
            usage();
            1
        }
    };
    ExitCode::from(code)
}
