#[cfg(test)]
mod tests {
    use crate::indicators::*;

    fn sample_prices() -> Vec<f64> {
        vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08,
            45.89, 46.03, 45.61, 46.28, 46.28, 46.00, 46.03, 46.41, 46.22, 45.64,
            46.21, 46.25, 45.71, 46.45, 45.78, 45.35, 44.03, 44.18, 44.22, 44.57,
        ]
    }

    fn trending(n: usize) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let close: Vec<f64> = (0..n).map(|i| 100.0 + i as f64).collect();
        let high: Vec<f64> = close.iter().map(|c| c + 1.0).collect();
        let low: Vec<f64> = close.iter().map(|c| c - 1.0).collect();
        (high, low, close)
    }

    #[test]
    fn sma_is_aligned_with_nan_warmup() {
        let data = sample_prices();
        let result = sma(&data, 5);
        assert_eq!(result.len(), data.len());
        assert!(result[..4].iter().all(|v| v.is_nan()));
        let expected: f64 = data[..5].iter().sum::<f64>() / 5.0;
        assert!((result[4] - expected).abs() < 1e-9);
    }

    #[test]
    fn sma_short_input_is_all_nan() {
        let result = sma(&[1.0, 2.0], 5);
        assert!(result.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn ema_converges_toward_recent_prices() {
        let mut data = vec![10.0; 50];
        data.extend(vec![20.0; 50]);
        let result = ema(&data, 9);
        let last = result.last().copied().unwrap();
        assert!((last - 20.0).abs() < 0.1);
    }

    #[test]
    fn rsi_saturates_at_100_on_monotone_gains() {
        let data: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let result = rsi(&data, 14);
        assert!(result[..14].iter().all(|v| v.is_nan()));
        assert!((result.last().unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn rsi_is_bounded() {
        let result = rsi(&sample_prices(), 14);
        for v in result.iter().filter(|v| v.is_finite()) {
            assert!((0.0..=100.0).contains(v));
        }
    }

    #[test]
    fn macd_positive_in_uptrend() {
        let data: Vec<f64> = (0..80).map(|i| 100.0 * 1.01f64.powi(i)).collect();
        let result = macd(&data, 12, 26, 9);
        assert_eq!(result.macd_line.len(), data.len());
        let last_macd = result.macd_line.last().unwrap();
        let last_signal = result.signal_line.last().unwrap();
        assert!(*last_macd > 0.0);
        assert!(last_signal.is_finite());
        assert!(
            (result.histogram.last().unwrap() - (last_macd - last_signal)).abs() < 1e-9
        );
    }

    #[test]
    fn bollinger_brackets_the_mean() {
        let bb = bollinger(&sample_prices(), 20, 2.0);
        let i = sample_prices().len() - 1;
        assert!(bb.lower[i] < bb.middle[i]);
        assert!(bb.middle[i] < bb.upper[i]);
    }

    #[test]
    fn bollinger_is_flat_on_constant_series() {
        let data = vec![50.0; 30];
        let bb = bollinger(&data, 20, 2.0);
        assert!((bb.upper[29] - 50.0).abs() < 1e-9);
        assert!((bb.lower[29] - 50.0).abs() < 1e-9);
    }

    #[test]
    fn atr_reflects_bar_range() {
        let (high, low, close) = trending(40);
        let result = atr(&high, &low, &close, 14);
        // Each bar spans 2.0 and gaps 1.0 against the prior close
        let last = result.last().unwrap();
        assert!(*last > 1.9 && *last < 2.6);
    }

    #[test]
    fn adx_is_high_in_a_strong_trend() {
        let (high, low, close) = trending(80);
        let result = adx(&high, &low, &close, 14);
        let last = result.last().unwrap();
        assert!(last.is_finite());
        assert!(*last > 25.0, "trending adx was {last}");
    }

    #[test]
    fn stoch_rsi_stays_in_band() {
        let result = stoch_rsi(&sample_prices(), 14, 14);
        for v in result.iter().filter(|v| v.is_finite()) {
            assert!((0.0..=100.0).contains(v));
        }
    }

    #[test]
    fn keltner_brackets_ema() {
        let (high, low, close) = trending(50);
        let kc = keltner(&high, &low, &close, 20, 2.0);
        let i = 49;
        assert!(kc.lower[i] < kc.middle[i] && kc.middle[i] < kc.upper[i]);
    }

    #[test]
    fn momentum_measures_period_change() {
        let data: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let result = momentum(&data, 10);
        assert!(result[9].is_nan());
        assert_eq!(result[10], 10.0);
        assert_eq!(result[19], 10.0);
    }

    #[test]
    fn realized_vol_is_zero_on_constant_series() {
        let data = vec![100.0; 40];
        let result = realized_vol(&data, 30, 365.0);
        assert!((result.last().unwrap() - 0.0).abs() < 1e-12);
    }

    #[test]
    fn realized_vol_scales_with_return_dispersion() {
        let calm: Vec<f64> = (0..60).map(|i| 100.0 + (i % 2) as f64 * 0.1).collect();
        let wild: Vec<f64> = (0..60).map(|i| 100.0 + (i % 2) as f64 * 10.0).collect();
        let calm_vol = realized_vol(&calm, 30, 365.0).last().copied().unwrap();
        let wild_vol = realized_vol(&wild, 30, 365.0).last().copied().unwrap();
        assert!(wild_vol > calm_vol);
    }

    #[test]
    fn vwap_tracks_typical_price_under_uniform_volume() {
        let (high, low, close) = trending(10);
        let volume = vec![5.0; 10];
        let result = vwap(&high, &low, &close, &volume);
        let typical_mean: f64 = (0..10)
            .map(|i| (high[i] + low[i] + close[i]) / 3.0)
            .sum::<f64>()
            / 10.0;
        assert!((result[9] - typical_mean).abs() < 1e-9);
    }

    #[test]
    fn rolling_extremes_cover_the_window() {
        let data = vec![1.0, 5.0, 3.0, 2.0, 8.0, 4.0];
        let highs = rolling_high(&data, 3);
        let lows = rolling_low(&data, 3);
        assert!(highs[1].is_nan());
        assert_eq!(highs[2], 5.0);
        assert_eq!(highs[4], 8.0);
        assert_eq!(lows[3], 2.0);
    }

    #[test]
    fn slope_is_fractional_change() {
        let data = vec![100.0, 100.0, 100.0, 110.0];
        let result = slope(&data, 3);
        assert!((result[3] - 0.1).abs() < 1e-9);
    }

    #[test]
    fn indicators_do_not_look_ahead() {
        let data = sample_prices();
        let full = ema(&data, 9);
        let prefix = ema(&data[..20], 9);
        for i in 0..20 {
            let (a, b) = (full[i], prefix[i]);
            assert!(a.is_nan() == b.is_nan());
            if a.is_finite() {
                assert!((a - b).abs() < 1e-12, "ema diverged at {i}");
            }
        }

        let full_rsi = rsi(&data, 14);
        let prefix_rsi = rsi(&data[..20], 14);
        for i in 0..20 {
            if full_rsi[i].is_finite() {
                assert!((full_rsi[i] - prefix_rsi[i]).abs() < 1e-12, "rsi diverged at {i}");
            }
        }
    }

    #[test]
    fn nan_inputs_propagate() {
        let mut data = sample_prices();
        data[10] = f64::NAN;
        let result = sma(&data, 5);
        assert!(result[12].is_nan());
        // Windows fully past the NaN recover
        assert!(result[18].is_finite());
    }
}
