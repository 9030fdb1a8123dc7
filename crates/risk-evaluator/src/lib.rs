pub mod alerts;
pub mod db;
pub mod evaluator;
pub mod ledger;
pub mod models;

#[cfg(test)]
mod tests;

pub use alerts::RiskAlertService;
pub use db::RiskDb;
pub use evaluator::{EvaluationContext, RiskDecision, RiskEvaluator, Verdict};
pub use ledger::ExposureLedger;
pub use models::*;
