//! Pure indicator functions over OHLCV slices.
//!
//! Every function returns a vector aligned with its input: warmup slots
//! hold NaN and NaN inputs propagate. At bar index `i` only values from
//! the prefix `[0..=i]` contribute, so prefix replay never sees the
//! future.

/// Simple Moving Average, NaN until the window fills.
pub fn sma(data: &[f64], period: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; data.len()];
    if period == 0 || data.len() < period {
        return result;
    }
    for i in period - 1..data.len() {
        let sum: f64 = data[i + 1 - period..=i].iter().sum();
        result[i] = sum / period as f64;
    }
    result
}

/// Exponential Moving Average seeded with the SMA of the first window.
pub fn ema(data: &[f64], period: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; data.len()];
    if period == 0 || data.len() < period {
        return result;
    }
    let multiplier = 2.0 / (period as f64 + 1.0);
    let seed: f64 = data[..period].iter().sum::<f64>() / period as f64;
    result[period - 1] = seed;
    for i in period..data.len() {
        let prev = result[i - 1];
        result[i] = (data[i] - prev) * multiplier + prev;
    }
    result
}

pub struct MacdResult {
    pub macd_line: Vec<f64>,
    pub signal_line: Vec<f64>,
    pub histogram: Vec<f64>,
}

/// MACD over close prices with the canonical (12, 26, 9) parameters.
pub fn macd(data: &[f64], fast: usize, slow: usize, signal: usize) -> MacdResult {
    let n = data.len();
    if fast == 0 || slow == 0 || signal == 0 || slow <= fast || n < slow {
        return MacdResult {
            macd_line: vec![f64::NAN; n],
            signal_line: vec![f64::NAN; n],
            histogram: vec![f64::NAN; n],
        };
    }
    let fast_ema = ema(data, fast);
    let slow_ema = ema(data, slow);
    let macd_line: Vec<f64> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| f - s)
        .collect();

    // Signal line is an EMA of the MACD line starting where MACD is defined
    let mut signal_line = vec![f64::NAN; n];
    let start = slow - 1;
    let defined = &macd_line[start..];
    if defined.len() >= signal {
        let smoothed = ema(defined, signal);
        for (offset, v) in smoothed.into_iter().enumerate() {
            signal_line[start + offset] = v;
        }
    }
    let histogram: Vec<f64> = macd_line
        .iter()
        .zip(&signal_line)
        .map(|(m, s)| m - s)
        .collect();
    MacdResult {
        macd_line,
        signal_line,
        histogram,
    }
}

/// Relative Strength Index with Wilder smoothing.
pub fn rsi(data: &[f64], period: usize) -> Vec<f64> {
    let n = data.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period + 1 {
        return result;
    }
    let mut gains = 0.0;
    let mut losses = 0.0;
    for i in 1..=period {
        let change = data[i] - data[i - 1];
        if change > 0.0 {
            gains += change;
        } else {
            losses += change.abs();
        }
    }
    let mut avg_gain = gains / period as f64;
    let mut avg_loss = losses / period as f64;
    result[period] = rsi_value(avg_gain, avg_loss);

    for i in period + 1..n {
        let change = data[i] - data[i - 1];
        let (gain, loss) = if change > 0.0 {
            (change, 0.0)
        } else {
            (0.0, change.abs())
        };
        avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
        result[i] = rsi_value(avg_gain, avg_loss);
    }
    result
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// Stochastic RSI: RSI's position within its rolling min/max band, 0-100.
pub fn stoch_rsi(data: &[f64], rsi_period: usize, stoch_period: usize) -> Vec<f64> {
    let rsi_series = rsi(data, rsi_period);
    let n = rsi_series.len();
    let mut result = vec![f64::NAN; n];
    if stoch_period == 0 {
        return result;
    }
    for i in 0..n {
        if i + 1 < stoch_period {
            continue;
        }
        let window = &rsi_series[i + 1 - stoch_period..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        let min = window.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = window.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        result[i] = if max > min {
            (rsi_series[i] - min) / (max - min) * 100.0
        } else {
            50.0
        };
    }
    result
}

pub struct BollingerResult {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Bollinger Bands: SMA middle with k standard deviations either side.
pub fn bollinger(data: &[f64], period: usize, k: f64) -> BollingerResult {
    let n = data.len();
    let middle = sma(data, period);
    let mut upper = vec![f64::NAN; n];
    let mut lower = vec![f64::NAN; n];
    for i in 0..n {
        if i + 1 < period || middle[i].is_nan() {
            continue;
        }
        let window = &data[i + 1 - period..=i];
        let mean = middle[i];
        let var = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / period as f64;
        let std = var.sqrt();
        upper[i] = mean + k * std;
        lower[i] = mean - k * std;
    }
    BollingerResult { upper, middle, lower }
}

/// True range series; index 0 uses high-low only.
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let n = high.len().min(low.len()).min(close.len());
    let mut tr = Vec::with_capacity(n);
    for i in 0..n {
        if i == 0 {
            tr.push(high[0] - low[0]);
        } else {
            let hl = high[i] - low[i];
            let hc = (high[i] - close[i - 1]).abs();
            let lc = (low[i] - close[i - 1]).abs();
            tr.push(hl.max(hc).max(lc));
        }
    }
    tr
}

/// Average True Range with Wilder smoothing.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let tr = true_range(high, low, close);
    wilder_smooth(&tr, period)
}

/// Wilder's smoothing: SMA seed then `(prev * (n-1) + x) / n`.
fn wilder_smooth(data: &[f64], period: usize) -> Vec<f64> {
    let n = data.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }
    let seed: f64 = data[..period].iter().sum::<f64>() / period as f64;
    result[period - 1] = seed;
    for i in period..n {
        result[i] = (result[i - 1] * (period - 1) as f64 + data[i]) / period as f64;
    }
    result
}

pub struct KeltnerResult {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Keltner Channels: EMA middle with ATR multiples either side.
pub fn keltner(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    period: usize,
    atr_mult: f64,
) -> KeltnerResult {
    let middle = ema(close, period);
    let atr_series = atr(high, low, close, period);
    let upper = middle
        .iter()
        .zip(&atr_series)
        .map(|(m, a)| m + atr_mult * a)
        .collect();
    let lower = middle
        .iter()
        .zip(&atr_series)
        .map(|(m, a)| m - atr_mult * a)
        .collect();
    KeltnerResult { upper, middle, lower }
}

/// Average Directional Index with Wilder smoothing of DM and DX.
pub fn adx(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let n = high.len().min(low.len()).min(close.len());
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < 2 * period {
        return result;
    }

    let tr = true_range(high, low, close);
    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];
    for i in 1..n {
        let up = high[i] - high[i - 1];
        let down = low[i - 1] - low[i];
        if up > down && up > 0.0 {
            plus_dm[i] = up;
        }
        if down > up && down > 0.0 {
            minus_dm[i] = down;
        }
    }

    let tr_s = wilder_smooth(&tr[1..], period);
    let plus_s = wilder_smooth(&plus_dm[1..], period);
    let minus_s = wilder_smooth(&minus_dm[1..], period);

    let mut dx = vec![f64::NAN; tr_s.len()];
    for i in 0..tr_s.len() {
        if tr_s[i].is_nan() || tr_s[i] == 0.0 {
            continue;
        }
        let plus_di = 100.0 * plus_s[i] / tr_s[i];
        let minus_di = 100.0 * minus_s[i] / tr_s[i];
        let sum = plus_di + minus_di;
        dx[i] = if sum > 0.0 {
            100.0 * (plus_di - minus_di).abs() / sum
        } else {
            0.0
        };
    }

    // ADX is a Wilder smooth of DX, starting where DX is defined
    let start = period - 1;
    let adx_defined = wilder_smooth(&dx[start..], period);
    for (offset, v) in adx_defined.into_iter().enumerate() {
        // +1 re-aligns for the leading diff row dropped before smoothing
        let idx = start + offset + 1;
        if idx < n {
            result[idx] = v;
        }
    }
    result
}

/// Price momentum: difference against the value `period` bars back.
pub fn momentum(data: &[f64], period: usize) -> Vec<f64> {
    let n = data.len();
    let mut result = vec![f64::NAN; n];
    for i in period..n {
        result[i] = data[i] - data[i - period];
    }
    result
}

/// Annualized realized volatility: rolling std of log returns scaled by
/// sqrt(periods_per_year).
pub fn realized_vol(close: &[f64], window: usize, periods_per_year: f64) -> Vec<f64> {
    let n = close.len();
    let mut result = vec![f64::NAN; n];
    if window < 2 || n < 2 {
        return result;
    }
    let mut log_returns = vec![f64::NAN; n];
    for i in 1..n {
        if close[i] > 0.0 && close[i - 1] > 0.0 {
            log_returns[i] = (close[i] / close[i - 1]).ln();
        }
    }
    for i in 0..n {
        if i < window {
            continue;
        }
        let slice = &log_returns[i + 1 - window..=i];
        if slice.iter().any(|v| v.is_nan()) {
            continue;
        }
        let mean = slice.iter().sum::<f64>() / window as f64;
        let var = slice.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / window as f64;
        result[i] = var.sqrt() * periods_per_year.sqrt();
    }
    result
}

/// Cumulative VWAP from typical price.
pub fn vwap(high: &[f64], low: &[f64], close: &[f64], volume: &[f64]) -> Vec<f64> {
    let n = high.len().min(low.len()).min(close.len()).min(volume.len());
    let mut result = vec![f64::NAN; n];
    let mut cum_pv = 0.0;
    let mut cum_vol = 0.0;
    for i in 0..n {
        let typical = (high[i] + low[i] + close[i]) / 3.0;
        cum_pv += typical * volume[i];
        cum_vol += volume[i];
        if cum_vol > 0.0 {
            result[i] = cum_pv / cum_vol;
        }
    }
    result
}

/// Rolling maximum over the trailing window.
pub fn rolling_high(data: &[f64], period: usize) -> Vec<f64> {
    rolling_extreme(data, period, f64::max, f64::NEG_INFINITY)
}

/// Rolling minimum over the trailing window.
pub fn rolling_low(data: &[f64], period: usize) -> Vec<f64> {
    rolling_extreme(data, period, f64::min, f64::INFINITY)
}

fn rolling_extreme(
    data: &[f64],
    period: usize,
    fold: fn(f64, f64) -> f64,
    identity: f64,
) -> Vec<f64> {
    let n = data.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 {
        return result;
    }
    for i in 0..n {
        if i + 1 < period {
            continue;
        }
        result[i] = data[i + 1 - period..=i].iter().cloned().fold(identity, fold);
    }
    result
}

/// Fractional slope over `period` bars: `data[i] / data[i-period] - 1`.
pub fn slope(data: &[f64], period: usize) -> Vec<f64> {
    let n = data.len();
    let mut result = vec![f64::NAN; n];
    for i in period..n {
        if data[i - period].abs() > f64::EPSILON {
            result[i] = data[i] / data[i - period] - 1.0;
        }
    }
    result
}
