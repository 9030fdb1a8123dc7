use chrono::{Duration, TimeZone, Utc};
use signal_core::{CuratedFrame, Interval, Regime, SignalKind};
use technical_indicators::FactorSet;

use crate::aggregator::{aggregate, AggregatorParams};
use crate::strategies::*;
use crate::weights::RegimeWeights;

fn frame_from_closes(closes: &[f64], volumes: &[f64]) -> CuratedFrame {
    let mut f = CuratedFrame::new("binance", "BTCUSDT", Interval::D1);
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    for (i, close) in closes.iter().enumerate() {
        f.open_time.push(start + Duration::days(i as i64));
        f.open.push(*close * 0.999);
        f.high.push(*close * 1.005);
        f.low.push(*close * 0.995);
        f.close.push(*close);
        let v = volumes.get(i).copied().unwrap_or(10.0);
        f.volume.push(v);
        f.total_volume.push(v);
        f.relative_volume.push(1.0);
    }
    technical_indicators::append_canonical_indicators(&mut f).unwrap();
    f
}

fn neutral_factors() -> FactorSet {
    FactorSet::default()
}

struct StubStrategy {
    name: &'static str,
    signal: SignalKind,
    confidence: f64,
}

impl Strategy for StubStrategy {
    fn name(&self) -> &'static str {
        self.name
    }

    fn required_columns(&self) -> &'static [&'static str] {
        &[]
    }

    fn evaluate(&self, _frame: &CuratedFrame) -> StrategyDecision {
        StrategyDecision {
            signal: self.signal,
            confidence: self.confidence,
            reason: "stub".to_string(),
        }
    }
}

fn stubs(signals: &[(&'static str, SignalKind)]) -> Vec<Box<dyn Strategy>> {
    signals
        .iter()
        .map(|(name, signal)| {
            Box::new(StubStrategy {
                name,
                signal: *signal,
                confidence: 60.0,
            }) as Box<dyn Strategy>
        })
        .collect()
}

mod strategy_behavior {
    use super::*;

    #[test]
    fn empty_frame_holds_with_no_data() {
        let empty = CuratedFrame::new("binance", "BTCUSDT", Interval::D1);
        for strategy in all_strategies() {
            let decision = strategy.evaluate(&empty);
            assert_eq!(decision.signal, SignalKind::Hold, "{}", strategy.name());
            assert!(decision.reason == "no_data" || decision.reason == "missing_indicators");
        }
    }

    #[test]
    fn short_frame_holds_with_missing_indicators() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let frame = frame_from_closes(&closes, &vec![10.0; 30]);
        let decision = MomentumTrendStrategy.evaluate(&frame);
        assert_eq!(decision.signal, SignalKind::Hold);
        assert_eq!(decision.reason, "missing_indicators");
    }

    #[test]
    fn momentum_trend_buys_a_persistent_uptrend() {
        let closes: Vec<f64> = (0..260).map(|i| 100.0 * 1.01f64.powi(i)).collect();
        let frame = frame_from_closes(&closes, &vec![10.0; 260]);
        let decision = MomentumTrendStrategy.evaluate(&frame);
        assert_eq!(decision.signal, SignalKind::Buy);
        assert_eq!(decision.reason, "trend_alignment");
        assert_eq!(decision.confidence, 65.0);
    }

    #[test]
    fn momentum_trend_sells_a_persistent_downtrend() {
        let closes: Vec<f64> = (0..260).map(|i| 100_000.0 * 0.99f64.powi(i)).collect();
        let frame = frame_from_closes(&closes, &vec![10.0; 260]);
        let decision = MomentumTrendStrategy.evaluate(&frame);
        assert_eq!(decision.signal, SignalKind::Sell);
    }

    #[test]
    fn mean_reversion_buys_a_capitulation_bar() {
        let mut closes: Vec<f64> = (0..120)
            .map(|i| 100.0 + if i % 2 == 0 { 0.3 } else { -0.3 })
            .collect();
        closes.push(80.0); // hard flush through the lower band
        let frame = frame_from_closes(&closes, &vec![10.0; 121]);
        let decision = MeanReversionStrategy.evaluate(&frame);
        assert_eq!(decision.signal, SignalKind::Buy);
        assert_eq!(decision.reason, "oversold_bounce");
    }

    #[test]
    fn breakout_needs_volume_confirmation() {
        let mut closes: Vec<f64> = (0..60)
            .map(|i| 100.0 + if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        let mut volumes = vec![10.0; 60];

        // New high without volume: no trade
        closes.push(108.0);
        volumes.push(10.0);
        let frame = frame_from_closes(&closes, &volumes);
        assert_eq!(BreakoutStrategy.evaluate(&frame).signal, SignalKind::Hold);

        // Same high with a 2x volume surge: breakout
        *volumes.last_mut().unwrap() = 20.0;
        let frame = frame_from_closes(&closes, &volumes);
        let decision = BreakoutStrategy.evaluate(&frame);
        assert_eq!(decision.signal, SignalKind::Buy);
        assert_eq!(decision.reason, "breakout_up");
    }

    #[test]
    fn volatility_stands_aside_in_quiet_tape() {
        let closes: Vec<f64> = (0..120)
            .map(|i| 100.0 + (i % 2) as f64 * 0.05)
            .collect();
        let frame = frame_from_closes(&closes, &vec![10.0; 120]);
        let decision = VolatilityStrategy.evaluate(&frame);
        assert_eq!(decision.signal, SignalKind::Hold);
        assert_eq!(decision.reason, "low_vol_range");
    }

    #[test]
    fn volatility_follows_slope_when_vol_expands() {
        let closes: Vec<f64> = (0..120)
            .map(|i| 100.0 * 1.004f64.powi(i) * if i % 2 == 0 { 1.03 } else { 0.97 })
            .collect();
        let frame = frame_from_closes(&closes, &vec![10.0; 120]);
        let decision = VolatilityStrategy.evaluate(&frame);
        assert!(
            decision.reason == "high_vol_trend" || decision.reason == "high_vol_flat",
            "unexpected reason {}",
            decision.reason
        );
    }
}

mod aggregation {
    use super::*;

    #[test]
    fn weighted_majority_buy_clears_threshold() {
        let strategies = stubs(&[
            ("momentum_trend", SignalKind::Buy),
            ("mean_reversion", SignalKind::Buy),
            ("breakout", SignalKind::Buy),
            ("volatility", SignalKind::Hold),
        ]);
        let frame = frame_from_closes(&[100.0, 101.0, 102.0], &[10.0, 10.0, 10.0]);
        let weights = RegimeWeights::uniform(
            Regime::Bull,
            &["momentum_trend", "mean_reversion", "breakout", "volatility"],
        );
        let outcome = aggregate(
            &strategies,
            &frame,
            &weights,
            &neutral_factors(),
            &AggregatorParams::default(),
        );
        assert_eq!(outcome.signal, SignalKind::Buy);
        assert_eq!(outcome.breakdown.buy_votes, 3);
        assert!((outcome.breakdown.raw_aggregate_score - 0.75).abs() < 1e-9);
        assert!(outcome.confidence_raw >= 5.0 && outcome.confidence_raw <= 95.0);
    }

    #[test]
    fn buy_sell_tie_resolves_to_hold() {
        let strategies = stubs(&[
            ("momentum_trend", SignalKind::Buy),
            ("mean_reversion", SignalKind::Sell),
            ("breakout", SignalKind::Buy),
            ("volatility", SignalKind::Sell),
        ]);
        let frame = frame_from_closes(&[100.0, 101.0, 102.0], &[10.0, 10.0, 10.0]);
        // Lopsided weights would otherwise push the score over threshold
        let mut weights = RegimeWeights::uniform(
            Regime::Range,
            &["momentum_trend", "mean_reversion", "breakout", "volatility"],
        );
        weights.weights.insert("momentum_trend".to_string(), 0.7);
        weights.weights.insert("mean_reversion".to_string(), 0.1);
        weights.weights.insert("breakout".to_string(), 0.1);
        weights.weights.insert("volatility".to_string(), 0.1);

        let outcome = aggregate(
            &strategies,
            &frame,
            &weights,
            &neutral_factors(),
            &AggregatorParams::default(),
        );
        assert_eq!(outcome.signal, SignalKind::Hold);
    }

    #[test]
    fn vector_bias_can_tip_a_borderline_score() {
        let strategies = stubs(&[
            ("momentum_trend", SignalKind::Buy),
            ("mean_reversion", SignalKind::Hold),
            ("breakout", SignalKind::Hold),
            ("volatility", SignalKind::Hold),
        ]);
        let frame = frame_from_closes(&[100.0, 101.0, 102.0], &[10.0, 10.0, 10.0]);
        let weights = RegimeWeights::uniform(
            Regime::Bull,
            &["momentum_trend", "mean_reversion", "breakout", "volatility"],
        );

        let flat = aggregate(
            &strategies,
            &frame,
            &weights,
            &neutral_factors(),
            &AggregatorParams::default(),
        );
        assert_eq!(flat.signal, SignalKind::Hold);

        let factors = FactorSet {
            momentum_alignment: 1.0,
            slope_1d: 0.05,
            intraday_momentum: 0.02,
            ..Default::default()
        };
        let biased = aggregate(
            &strategies,
            &frame,
            &weights,
            &factors,
            &AggregatorParams::default(),
        );
        assert!(biased.breakdown.vector_bias > 0.0);
        assert_eq!(biased.signal, SignalKind::Buy);
    }

    #[test]
    fn all_hold_stays_hold() {
        let strategies = stubs(&[
            ("momentum_trend", SignalKind::Hold),
            ("mean_reversion", SignalKind::Hold),
            ("breakout", SignalKind::Hold),
            ("volatility", SignalKind::Hold),
        ]);
        let frame = frame_from_closes(&[100.0, 100.0, 100.0], &[10.0, 10.0, 10.0]);
        let weights = RegimeWeights::uniform(
            Regime::Calm,
            &["momentum_trend", "mean_reversion", "breakout", "volatility"],
        );
        let outcome = aggregate(
            &strategies,
            &frame,
            &weights,
            &neutral_factors(),
            &AggregatorParams::default(),
        );
        assert_eq!(outcome.signal, SignalKind::Hold);
        assert_eq!(outcome.breakdown.hold_votes, 4);
    }
}
