//! Seed-deterministic Monte-Carlo risk engine.
//!
//! All simulations run on a ChaCha stream seeded from the published
//! `(date, symbol)` seed, so a fixed seed and trial count reproduce
//! bit-identical output across runs and hosts.

pub mod ruin;
pub mod simulation;

pub use ruin::{monte_carlo_ruin, RuinConfig, RuinSimulationResult};
pub use simulation::{estimate_tp_sl, TpSlConfig, TpSlEstimate};
