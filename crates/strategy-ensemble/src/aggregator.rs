use serde::{Deserialize, Serialize};
use signal_core::{CuratedFrame, SignalBreakdown, SignalKind, StrategyVote};
use technical_indicators::FactorSet;

use crate::strategies::Strategy;
use crate::weights::RegimeWeights;

/// Aggregator parameters. Part of the published params document, so every
/// field is serialized into the params digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorParams {
    pub buy_threshold: f64,
    pub sell_threshold: f64,
    pub momentum_bias_weight: f64,
    pub breakout_slope_weight: f64,
    pub ema21_slope_weight: f64,
    pub intraday_momentum_weight: f64,
}

impl Default for AggregatorParams {
    fn default() -> Self {
        Self {
            buy_threshold: 0.35,
            sell_threshold: -0.35,
            momentum_bias_weight: 0.15,
            breakout_slope_weight: 2.0,
            ema21_slope_weight: 3.0,
            intraday_momentum_weight: 1.0,
        }
    }
}

/// The ensemble's combined verdict.
#[derive(Debug, Clone)]
pub struct EnsembleOutcome {
    pub signal: SignalKind,
    pub confidence_raw: f64,
    pub votes: Vec<StrategyVote>,
    pub breakdown: SignalBreakdown,
}

/// Run every strategy and combine their votes under regime weights plus
/// the vector bias.
///
/// `aggregate_score = Σ weight(s) · vote(s) + vector_bias`, with
/// `vote ∈ {+1, 0, -1}`. BUY when the score clears `buy_threshold`,
/// SELL below `sell_threshold`, HOLD otherwise; an exact BUY/SELL vote
/// tie always resolves to HOLD.
pub fn aggregate(
    strategies: &[Box<dyn Strategy>],
    frame: &CuratedFrame,
    weights: &RegimeWeights,
    factors: &FactorSet,
    params: &AggregatorParams,
) -> EnsembleOutcome {
    let mut votes: Vec<StrategyVote> = Vec::with_capacity(strategies.len());
    let mut raw_score = 0.0;
    let mut weighted_confidence = 0.0;
    let mut buy_votes = 0u32;
    let mut sell_votes = 0u32;
    let mut hold_votes = 0u32;

    for strategy in strategies {
        let decision = strategy.evaluate(frame);
        let weight = weights.weight_for(strategy.name());
        raw_score += weight * decision.signal.vote();
        weighted_confidence += weight * decision.confidence;
        match decision.signal {
            SignalKind::Buy => buy_votes += 1,
            SignalKind::Sell => sell_votes += 1,
            SignalKind::Hold => hold_votes += 1,
        }
        votes.push(StrategyVote {
            strategy: strategy.name().to_string(),
            signal: decision.signal,
            confidence: decision.confidence,
            reason: decision.reason,
        });
    }

    let vector_bias = params.momentum_bias_weight * factors.momentum_alignment
        + params.breakout_slope_weight * factors.slope_1d
        + params.ema21_slope_weight * frame.last_value("ema_21_slope").unwrap_or(0.0)
        + params.intraday_momentum_weight * factors.intraday_momentum;
    let aggregate_score = raw_score + vector_bias;

    let tied = buy_votes > 0 && buy_votes == sell_votes;
    let signal = if tied {
        SignalKind::Hold
    } else if aggregate_score >= params.buy_threshold {
        SignalKind::Buy
    } else if aggregate_score <= params.sell_threshold {
        SignalKind::Sell
    } else {
        SignalKind::Hold
    };

    let total_votes = votes.len().max(1) as u32;
    let agreement =
        buy_votes.max(sell_votes).max(hold_votes) as f64 / total_votes as f64;
    let confidence_raw = (weighted_confidence * (1.0 + agreement)).clamp(5.0, 95.0);

    tracing::debug!(
        signal = %signal,
        aggregate_score,
        raw_score,
        vector_bias,
        buy_votes,
        sell_votes,
        hold_votes,
        "ensemble aggregated"
    );

    EnsembleOutcome {
        signal,
        confidence_raw,
        votes,
        breakdown: SignalBreakdown {
            aggregate_score,
            raw_aggregate_score: raw_score,
            vector_bias,
            buy_votes,
            sell_votes,
            hold_votes,
            weights_snapshot_date: weights.snapshot_date,
        },
    }
}
