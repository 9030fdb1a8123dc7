pub mod campaign;
pub mod engine;
pub mod execution;
pub mod metrics;
pub mod models;
pub mod position;
pub mod time_split;
pub mod validate;

#[cfg(test)]
mod tests;

pub use campaign::{
    check_campaign_guardrails, reproduce_campaign, run_campaign, CampaignParams, CampaignResult,
    GuardrailViolation,
};
pub use engine::{BacktestEngine, BarContext, ReplayResult, ReplayStrategy};
pub use execution::{ExecutionModel, ExecutionParams, VolumeLiquidityModel};
pub use metrics::{compute_metrics, tracking_error_rmse, BacktestMetrics};
pub use models::*;
pub use position::{Position, PositionArena, PositionId};
pub use time_split::{split_windows, SplitParams, SplitPlan, TimeWindow, WindowRole};
pub use validate::{validate_sltp, SltpCase, SltpOutcome, SltpValidationReport};
