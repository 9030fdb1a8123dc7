use signal_core::{CuratedFrame, VolBucket};

use crate::indicators::slope;

/// Cross-timeframe factors feeding the aggregator's regime classifier and
/// vector bias.
#[derive(Debug, Clone, Default)]
pub struct FactorSet {
    /// +1 when the short-EMA slope agrees in sign across 1h and 1d,
    /// -1 when it disagrees, 0 when either is flat or missing.
    pub momentum_alignment: f64,
    pub vol_regime_1h: Option<VolBucket>,
    pub vol_regime_1d: Option<VolBucket>,
    pub slope_1h: f64,
    pub slope_1d: f64,
    /// 1h close change over the last 24 bars.
    pub intraday_momentum: f64,
}

/// Compute cross-timeframe factors from the curated 1h and 1d frames.
pub fn compute_factors(df_1h: &CuratedFrame, df_1d: &CuratedFrame) -> FactorSet {
    let slope_1h = ema9_slope(df_1h);
    let slope_1d = ema9_slope(df_1d);

    let momentum_alignment = match (sign(slope_1h), sign(slope_1d)) {
        (0, _) | (_, 0) => 0.0,
        (a, b) if a == b => 1.0,
        _ => -1.0,
    };

    let intraday_momentum = last_finite(&slope(&df_1h.close, 24)).unwrap_or(0.0);

    FactorSet {
        momentum_alignment,
        vol_regime_1h: df_1h.last_value("realized_vol_30").map(VolBucket::from_realized_vol),
        vol_regime_1d: df_1d.last_value("realized_vol_30").map(VolBucket::from_realized_vol),
        slope_1h,
        slope_1d,
        intraday_momentum,
    }
}

fn ema9_slope(frame: &CuratedFrame) -> f64 {
    frame
        .column("ema_9")
        .and_then(|col| last_finite(&slope(col, 5)))
        .unwrap_or(0.0)
}

fn last_finite(values: &[f64]) -> Option<f64> {
    values.last().copied().filter(|v| v.is_finite())
}

fn sign(v: f64) -> i8 {
    if v > 1e-9 {
        1
    } else if v < -1e-9 {
        -1
    } else {
        0
    }
}
