use signal_core::{CuratedFrame, Interval};

use crate::indicators::*;

/// Bars per year for annualizing realized volatility.
fn periods_per_year(interval: Interval) -> f64 {
    match interval {
        Interval::M15 => 365.0 * 24.0 * 4.0,
        Interval::M30 => 365.0 * 24.0 * 2.0,
        Interval::H1 => 365.0 * 24.0,
        Interval::H4 => 365.0 * 6.0,
        Interval::D1 => 365.0,
        Interval::W1 => 52.0,
    }
}

/// Append the canonical indicator suite to a curated frame.
///
/// Column names are the contract between curation and the strategies;
/// strategies look columns up by these names and treat NaN tails as
/// missing.
pub fn append_canonical_indicators(frame: &mut CuratedFrame) -> Result<(), String> {
    if frame.is_empty() {
        return Ok(());
    }
    let interval = frame.interval.unwrap_or(Interval::D1);
    let close = frame.close.clone();
    let high = frame.high.clone();
    let low = frame.low.clone();
    let volume = frame.volume.clone();
    let ppy = periods_per_year(interval);

    frame.set_column("ema_9", ema(&close, 9))?;
    let ema_21 = ema(&close, 21);
    frame.set_column("ema_21_slope", slope(&ema_21, 5))?;
    frame.set_column("ema_21", ema_21)?;
    frame.set_column("ema_50", ema(&close, 50))?;
    frame.set_column("sma_100", sma(&close, 100))?;
    frame.set_column("sma_200", sma(&close, 200))?;

    let macd_result = macd(&close, 12, 26, 9);
    frame.set_column("macd", macd_result.macd_line)?;
    frame.set_column("macd_signal", macd_result.signal_line)?;
    frame.set_column("macd_hist", macd_result.histogram)?;

    frame.set_column("rsi_14", rsi(&close, 14))?;
    frame.set_column("stoch_rsi", stoch_rsi(&close, 14, 14))?;

    let bb = bollinger(&close, 20, 2.0);
    frame.set_column("bb_upper", bb.upper)?;
    frame.set_column("bb_middle", bb.middle)?;
    frame.set_column("bb_lower", bb.lower)?;

    let kc = keltner(&high, &low, &close, 20, 2.0);
    frame.set_column("kc_upper", kc.upper)?;
    frame.set_column("kc_middle", kc.middle)?;
    frame.set_column("kc_lower", kc.lower)?;

    frame.set_column("atr_14", atr(&high, &low, &close, 14))?;
    frame.set_column("adx_14", adx(&high, &low, &close, 14))?;
    frame.set_column("momentum_10", momentum(&close, 10))?;

    frame.set_column("realized_vol_7", realized_vol(&close, 7, ppy))?;
    frame.set_column("realized_vol_30", realized_vol(&close, 30, ppy))?;
    frame.set_column("realized_vol_90", realized_vol(&close, 90, ppy))?;

    frame.set_column("vwap", vwap(&high, &low, &close, &volume))?;
    frame.set_column("rolling_high_20", rolling_high(&high, 20))?;
    frame.set_column("rolling_low_20", rolling_low(&low, 20))?;
    frame.set_column("volume_sma_20", sma(&volume, 20))?;

    Ok(())
}
