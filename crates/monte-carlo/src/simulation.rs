use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use signal_core::SignalKind;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TpSlConfig {
    pub trials: usize,
    pub horizon: usize,
}

impl Default for TpSlConfig {
    fn default() -> Self {
        Self {
            trials: 1000,
            horizon: 36,
        }
    }
}

/// TP/SL hit probabilities for a candidate signal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TpSlEstimate {
    pub tp_probability: f64,
    pub sl_probability: f64,
    pub neither_probability: f64,
    /// Confidence component derived from the TP/SL edge, clamped to
    /// `[5, 95]`.
    pub mc_confidence: f64,
    pub trials: usize,
    pub horizon: usize,
}

/// Bootstrap forward price paths from historical returns and count which
/// barrier each path touches first.
///
/// Paths are sampled with replacement from `returns` and compounded from
/// `entry`. For a BUY the stop sits below entry and the target above;
/// SELL mirrors. A path that touches neither barrier within the horizon
/// counts as `neither`.
pub fn estimate_tp_sl(
    returns: &[f64],
    entry: f64,
    sl: f64,
    tp: f64,
    side: SignalKind,
    seed: u32,
    config: TpSlConfig,
) -> TpSlEstimate {
    if returns.is_empty() || entry <= 0.0 || config.trials == 0 || side == SignalKind::Hold {
        return TpSlEstimate {
            mc_confidence: 5.0,
            trials: config.trials,
            horizon: config.horizon,
            ..Default::default()
        };
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed as u64);
    let mut tp_hits = 0usize;
    let mut sl_hits = 0usize;

    for _ in 0..config.trials {
        let mut price = entry;
        for _ in 0..config.horizon {
            let r = returns[rng.gen_range(0..returns.len())];
            price *= 1.0 + r;
            let (tp_hit, sl_hit) = match side {
                SignalKind::Buy => (price >= tp, price <= sl),
                SignalKind::Sell => (price <= tp, price >= sl),
                SignalKind::Hold => (false, false),
            };
            // Stop is checked first: a path that could have touched both
            // within one bar resolves conservatively
            if sl_hit {
                sl_hits += 1;
                break;
            }
            if tp_hit {
                tp_hits += 1;
                break;
            }
        }
    }

    let trials = config.trials as f64;
    let tp_probability = tp_hits as f64 / trials;
    let sl_probability = sl_hits as f64 / trials;
    let neither_probability = 1.0 - tp_probability - sl_probability;
    let mc_confidence = (50.0 + (tp_probability - sl_probability) * 50.0).clamp(5.0, 95.0);

    TpSlEstimate {
        tp_probability,
        sl_probability,
        neither_probability,
        mc_confidence,
        trials: config.trials,
        horizon: config.horizon,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_returns() -> Vec<f64> {
        vec![0.01, -0.008, 0.015, -0.012, 0.02, -0.01, 0.005, -0.004, 0.012, -0.02]
    }

    #[test]
    fn fixed_seed_is_bit_identical() {
        let returns = sample_returns();
        let a = estimate_tp_sl(
            &returns, 100.0, 96.0, 106.0, SignalKind::Buy, 12345, TpSlConfig::default(),
        );
        let b = estimate_tp_sl(
            &returns, 100.0, 96.0, 106.0, SignalKind::Buy, 12345, TpSlConfig::default(),
        );
        assert_eq!(a.tp_probability, b.tp_probability);
        assert_eq!(a.sl_probability, b.sl_probability);
        assert_eq!(a.mc_confidence, b.mc_confidence);
    }

    #[test]
    fn different_seeds_differ() {
        let returns = sample_returns();
        let a = estimate_tp_sl(
            &returns, 100.0, 96.0, 106.0, SignalKind::Buy, 1, TpSlConfig::default(),
        );
        let b = estimate_tp_sl(
            &returns, 100.0, 96.0, 106.0, SignalKind::Buy, 2, TpSlConfig::default(),
        );
        assert!(a.tp_probability != b.tp_probability || a.sl_probability != b.sl_probability);
    }

    #[test]
    fn probabilities_partition_unity() {
        let e = estimate_tp_sl(
            &sample_returns(), 100.0, 96.0, 106.0, SignalKind::Buy, 7, TpSlConfig::default(),
        );
        assert!((e.tp_probability + e.sl_probability + e.neither_probability - 1.0).abs() < 1e-9);
        assert!(e.mc_confidence >= 5.0 && e.mc_confidence <= 95.0);
    }

    #[test]
    fn upward_drift_favors_the_target() {
        let bullish = vec![0.02, 0.015, 0.01, -0.005, 0.02];
        let e = estimate_tp_sl(
            &bullish, 100.0, 96.0, 106.0, SignalKind::Buy, 7, TpSlConfig::default(),
        );
        assert!(e.tp_probability > e.sl_probability);
        assert!(e.mc_confidence > 50.0);
    }

    #[test]
    fn sell_side_mirrors_barriers() {
        let bearish = vec![-0.02, -0.015, -0.01, 0.005, -0.02];
        let e = estimate_tp_sl(
            &bearish, 100.0, 104.0, 94.0, SignalKind::Sell, 7, TpSlConfig::default(),
        );
        assert!(e.tp_probability > e.sl_probability);
    }

    #[test]
    fn empty_returns_yield_floor_confidence() {
        let e = estimate_tp_sl(&[], 100.0, 96.0, 106.0, SignalKind::Buy, 7, TpSlConfig::default());
        assert_eq!(e.tp_probability, 0.0);
        assert_eq!(e.mc_confidence, 5.0);
    }
}
