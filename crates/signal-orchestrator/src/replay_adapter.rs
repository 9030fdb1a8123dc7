use backtest_engine::{Action, BarContext, ReplayStrategy, Side};
use signal_core::SignalKind;
use strategy_ensemble::{aggregate, AggregatorParams, RegimeWeights, Strategy};
use technical_indicators::FactorSet;

/// Drives the production strategy ensemble through the replay engine.
///
/// On each bar the ensemble is evaluated over the visible prefix of the
/// frame; directional verdicts open a position with ATR-derived stop and
/// target levels, an opposing verdict closes it.
pub struct EnsembleReplayStrategy {
    strategies: Vec<Box<dyn Strategy>>,
    weights: RegimeWeights,
    params: AggregatorParams,
    sl_atr_mult: f64,
    tp_atr_mult: f64,
}

impl EnsembleReplayStrategy {
    pub fn new(weights: RegimeWeights, params: AggregatorParams) -> Self {
        Self {
            strategies: strategy_ensemble::all_strategies(),
            weights,
            params,
            sl_atr_mult: 2.0,
            tp_atr_mult: 3.0,
        }
    }

    /// ATR-derived SL/TP band around a close. Falls back to a 2%/3% band
    /// when ATR is not yet warm.
    pub fn levels(close: f64, atr: Option<f64>, side: Side, sl_mult: f64, tp_mult: f64) -> (f64, f64) {
        let atr = atr.filter(|a| *a > 0.0).unwrap_or(close * 0.01);
        match side {
            Side::Long => (close - sl_mult * atr, close + tp_mult * atr),
            Side::Short => (close + sl_mult * atr, close - tp_mult * atr),
        }
    }
}

impl ReplayStrategy for EnsembleReplayStrategy {
    fn on_bar(&mut self, ctx: &BarContext<'_>) -> Action {
        // Evaluate on the visible prefix only; indicator columns further
        // out would leak the future into the vote.
        let visible = ctx.frame.prefix(ctx.index);
        let outcome = aggregate(
            &self.strategies,
            &visible,
            &self.weights,
            &FactorSet::default(),
            &self.params,
        );

        let close = visible.close[visible.len() - 1];
        let atr = visible.last_value("atr_14");

        match (outcome.signal, ctx.position) {
            (SignalKind::Buy, None) => {
                let (sl, tp) =
                    Self::levels(close, atr, Side::Long, self.sl_atr_mult, self.tp_atr_mult);
                Action::Enter {
                    side: Side::Long,
                    sl,
                    tp,
                }
            }
            (SignalKind::Sell, None) => {
                let (sl, tp) =
                    Self::levels(close, atr, Side::Short, self.sl_atr_mult, self.tp_atr_mult);
                Action::Enter {
                    side: Side::Short,
                    sl,
                    tp,
                }
            }
            (SignalKind::Buy, Some(position)) if position.side == Side::Short => Action::Exit,
            (SignalKind::Sell, Some(position)) if position.side == Side::Long => Action::Exit,
            _ => Action::Hold,
        }
    }
}
