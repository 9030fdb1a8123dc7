use signal_core::{CuratedFrame, SignalKind};

/// A single strategy's verdict on the latest bar.
#[derive(Debug, Clone)]
pub struct StrategyDecision {
    pub signal: SignalKind,
    pub confidence: f64,
    pub reason: String,
}

impl StrategyDecision {
    fn hold(confidence: f64, reason: &str) -> Self {
        Self {
            signal: SignalKind::Hold,
            confidence,
            reason: reason.to_string(),
        }
    }
}

/// Stateless strategy over a curated frame. Implementations read only the
/// indicator columns they declare and never mutate shared state.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Columns this strategy consumes; checked against the frame manifest
    /// before evaluation.
    fn required_columns(&self) -> &'static [&'static str];

    fn evaluate(&self, frame: &CuratedFrame) -> StrategyDecision;
}

/// The production ensemble in aggregation order.
pub fn all_strategies() -> Vec<Box<dyn Strategy>> {
    vec![
        Box::new(MomentumTrendStrategy),
        Box::new(MeanReversionStrategy),
        Box::new(BreakoutStrategy),
        Box::new(VolatilityStrategy),
    ]
}

fn missing_columns(frame: &CuratedFrame, required: &[&str]) -> bool {
    required.iter().any(|name| frame.last_value(name).is_none())
}

/// Multi-EMA alignment with MACD confirmation.
pub struct MomentumTrendStrategy;

impl Strategy for MomentumTrendStrategy {
    fn name(&self) -> &'static str {
        "momentum_trend"
    }

    fn required_columns(&self) -> &'static [&'static str] {
        &["ema_9", "ema_21", "ema_50", "sma_200", "macd", "macd_signal"]
    }

    fn evaluate(&self, frame: &CuratedFrame) -> StrategyDecision {
        if frame.is_empty() {
            return StrategyDecision::hold(0.0, "no_data");
        }
        if missing_columns(frame, self.required_columns()) {
            return StrategyDecision::hold(0.0, "missing_indicators");
        }
        let price = frame.close[frame.len() - 1];
        let ema9 = frame.last_value("ema_9").unwrap_or(f64::NAN);
        let ema21 = frame.last_value("ema_21").unwrap_or(f64::NAN);
        let ema50 = frame.last_value("ema_50").unwrap_or(f64::NAN);
        let sma200 = frame.last_value("sma_200").unwrap_or(f64::NAN);
        let macd = frame.last_value("macd").unwrap_or(f64::NAN);
        let macd_signal = frame.last_value("macd_signal").unwrap_or(f64::NAN);

        let buy = price > ema9 && ema9 > ema21 && ema21 > ema50 && ema50 > sma200
            && macd > macd_signal;
        let sell = price < ema9 && ema9 < ema21 && ema21 < ema50 && ema50 < sma200
            && macd < macd_signal;

        if buy {
            StrategyDecision {
                signal: SignalKind::Buy,
                confidence: 65.0,
                reason: "trend_alignment".to_string(),
            }
        } else if sell {
            StrategyDecision {
                signal: SignalKind::Sell,
                confidence: 65.0,
                reason: "trend_alignment".to_string(),
            }
        } else {
            StrategyDecision::hold(30.0, "no_alignment")
        }
    }
}

/// Bollinger touch plus RSI extreme, sharpened by StochRSI.
pub struct MeanReversionStrategy;

impl Strategy for MeanReversionStrategy {
    fn name(&self) -> &'static str {
        "mean_reversion"
    }

    fn required_columns(&self) -> &'static [&'static str] {
        &["rsi_14", "bb_upper", "bb_lower", "stoch_rsi"]
    }

    fn evaluate(&self, frame: &CuratedFrame) -> StrategyDecision {
        if frame.is_empty() {
            return StrategyDecision::hold(0.0, "no_data");
        }
        if missing_columns(frame, self.required_columns()) {
            return StrategyDecision::hold(0.0, "missing_indicators");
        }
        let price = frame.close[frame.len() - 1];
        let rsi = frame.last_value("rsi_14").unwrap_or(f64::NAN);
        let bb_upper = frame.last_value("bb_upper").unwrap_or(f64::NAN);
        let bb_lower = frame.last_value("bb_lower").unwrap_or(f64::NAN);
        let stoch = frame.last_value("stoch_rsi").unwrap_or(f64::NAN);

        if price <= bb_lower && rsi < 30.0 {
            let confidence = if stoch < 20.0 { 65.0 } else { 55.0 };
            return StrategyDecision {
                signal: SignalKind::Buy,
                confidence,
                reason: "oversold_bounce".to_string(),
            };
        }
        if price >= bb_upper && rsi > 70.0 {
            let confidence = if stoch > 80.0 { 65.0 } else { 55.0 };
            return StrategyDecision {
                signal: SignalKind::Sell,
                confidence,
                reason: "overbought_pullback".to_string(),
            };
        }
        StrategyDecision::hold(25.0, "neutral")
    }
}

/// Donchian breakout on volume expansion, biased by trend strength.
pub struct BreakoutStrategy;

impl Strategy for BreakoutStrategy {
    fn name(&self) -> &'static str {
        "breakout"
    }

    fn required_columns(&self) -> &'static [&'static str] {
        &["rolling_high_20", "rolling_low_20", "volume_sma_20", "adx_14"]
    }

    fn evaluate(&self, frame: &CuratedFrame) -> StrategyDecision {
        let n = frame.len();
        if n < 21 {
            return StrategyDecision::hold(0.0, "no_data");
        }
        if missing_columns(frame, self.required_columns()) {
            return StrategyDecision::hold(0.0, "missing_indicators");
        }
        let price = frame.close[n - 1];
        let volume = frame.volume[n - 1];
        // Breakout levels come from the prior bar so the current bar
        // cannot break its own extreme
        let (Some(high_col), Some(low_col)) = (
            frame.column("rolling_high_20"),
            frame.column("rolling_low_20"),
        ) else {
            return StrategyDecision::hold(0.0, "missing_indicators");
        };
        let (recent_high, recent_low) = (high_col[n - 2], low_col[n - 2]);
        if recent_high.is_nan() || recent_low.is_nan() {
            return StrategyDecision::hold(0.0, "missing_indicators");
        }
        let avg_volume = frame.last_value("volume_sma_20").unwrap_or(f64::NAN);
        let adx = frame.last_value("adx_14").unwrap_or(f64::NAN);

        let volume_surge = avg_volume > 0.0 && volume >= 1.5 * avg_volume;
        let trending = adx > 25.0;

        if price > recent_high && volume_surge {
            return StrategyDecision {
                signal: SignalKind::Buy,
                confidence: if trending { 72.0 } else { 60.0 },
                reason: "breakout_up".to_string(),
            };
        }
        if price < recent_low && volume_surge {
            return StrategyDecision {
                signal: SignalKind::Sell,
                confidence: if trending { 72.0 } else { 60.0 },
                reason: "breakout_down".to_string(),
            };
        }
        StrategyDecision::hold(20.0, "no_breakout")
    }
}

/// Volatility regime filter: stand aside in quiet tape, follow the
/// medium-term slope when volatility expands.
pub struct VolatilityStrategy;

impl Strategy for VolatilityStrategy {
    fn name(&self) -> &'static str {
        "volatility"
    }

    fn required_columns(&self) -> &'static [&'static str] {
        &["realized_vol_30", "atr_14", "ema_21_slope"]
    }

    fn evaluate(&self, frame: &CuratedFrame) -> StrategyDecision {
        if frame.is_empty() {
            return StrategyDecision::hold(0.0, "no_data");
        }
        if missing_columns(frame, self.required_columns()) {
            return StrategyDecision::hold(0.0, "missing_indicators");
        }
        let vol = frame.last_value("realized_vol_30").unwrap_or(f64::NAN);
        let slope = frame.last_value("ema_21_slope").unwrap_or(f64::NAN);

        if vol < 0.2 {
            return StrategyDecision::hold(35.0, "low_vol_range");
        }
        if vol > 0.5 {
            if slope > 0.0 {
                return StrategyDecision {
                    signal: SignalKind::Buy,
                    confidence: 50.0,
                    reason: "high_vol_trend".to_string(),
                };
            }
            if slope < 0.0 {
                return StrategyDecision {
                    signal: SignalKind::Sell,
                    confidence: 50.0,
                    reason: "high_vol_trend".to_string(),
                };
            }
            return StrategyDecision::hold(30.0, "high_vol_flat");
        }
        StrategyDecision::hold(30.0, "mid_vol")
    }
}
