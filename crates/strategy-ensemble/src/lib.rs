pub mod aggregator;
pub mod regime;
pub mod strategies;
pub mod weights;

#[cfg(test)]
mod tests;

pub use aggregator::{aggregate, AggregatorParams, EnsembleOutcome};
pub use regime::classify_regime;
pub use strategies::{
    all_strategies, BreakoutStrategy, MeanReversionStrategy, MomentumTrendStrategy, Strategy,
    StrategyDecision, VolatilityStrategy,
};
pub use weights::{EnsembleWeightStore, RegimeWeights};
