use serde::{Deserialize, Serialize};
use signal_core::CuratedFrame;

use crate::models::Side;

/// Estimate available depth from order-book columns when present, else
/// from bar volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeLiquidityModel {
    pub min_depth: f64,
    pub volume_scale: f64,
}

impl Default for VolumeLiquidityModel {
    fn default() -> Self {
        Self {
            min_depth: 1_000.0,
            volume_scale: 0.4,
        }
    }
}

impl VolumeLiquidityModel {
    pub fn depth(&self, frame: &CuratedFrame, index: usize) -> f64 {
        let bids = column_at(frame, "bid_depth", index).unwrap_or(0.0);
        let asks = column_at(frame, "ask_depth", index).unwrap_or(0.0);
        if bids > 0.0 || asks > 0.0 {
            return (bids + asks).max(self.min_depth);
        }
        let volume = frame.volume.get(index).copied().unwrap_or(0.0);
        (volume * self.volume_scale).max(self.min_depth)
    }
}

/// Dynamic slippage and partial-fill parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionParams {
    pub base_bps: f64,
    pub vol_coeff: f64,
    pub depth_coeff: f64,
    /// Opening gaps at or beyond this fraction trigger the gap path.
    pub gap_threshold: f64,
    /// Penalty applied to gap fills, as a fraction of price.
    pub gap_penalty: f64,
    pub liquidity: VolumeLiquidityModel,
}

impl Default for ExecutionParams {
    fn default() -> Self {
        Self {
            base_bps: 5.0,
            vol_coeff: 40.0,
            depth_coeff: 0.00004,
            gap_threshold: 0.01,
            gap_penalty: 0.002,
            liquidity: VolumeLiquidityModel::default(),
        }
    }
}

impl ExecutionParams {
    /// Zero-cost execution for the theoretical baseline.
    pub fn frictionless() -> Self {
        Self {
            base_bps: 0.0,
            vol_coeff: 0.0,
            depth_coeff: 0.0,
            gap_threshold: f64::INFINITY,
            gap_penalty: 0.0,
            liquidity: VolumeLiquidityModel::default(),
        }
    }
}

/// Fill simulator: price impact from volatility and depth, partial fills
/// on gap opens.
#[derive(Debug, Clone)]
pub struct ExecutionModel {
    params: ExecutionParams,
}

impl ExecutionModel {
    pub fn new(params: ExecutionParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ExecutionParams {
        &self.params
    }

    /// Volatility estimate for a bar, preferring ATR over realized vol.
    fn vol_estimate(&self, frame: &CuratedFrame, index: usize) -> f64 {
        for key in ["atr_pct", "realized_vol_7", "realized_vol_30", "realized_vol_90"] {
            if let Some(v) = column_at(frame, key, index) {
                return v.max(0.0);
            }
        }
        // ATR is in price units; normalize against the close
        if let (Some(atr), Some(close)) = (
            column_at(frame, "atr_14", index),
            frame.close.get(index).copied(),
        ) {
            if close > 0.0 {
                return (atr / close).max(0.0);
            }
        }
        0.02
    }

    /// Fractional price impact for a fill of `notional` on this bar:
    /// `impact_bps = base + vol_coeff * sigma + depth_coeff * notional/depth`.
    pub fn price_impact(&self, frame: &CuratedFrame, index: usize, notional: f64) -> f64 {
        let vol = self.vol_estimate(frame, index);
        let depth = self.params.liquidity.depth(frame, index);
        let depth_term = (notional.abs() / depth.max(1.0)) * self.params.depth_coeff;
        let slip_bps = self.params.base_bps + self.params.vol_coeff * vol + depth_term;
        slip_bps / 10_000.0
    }

    /// Apply impact and the gap model to a target price. Returns
    /// `(fill_price, fill_ratio)`; gap opens fill only 60% of the order.
    pub fn adjust_price(
        &self,
        frame: &CuratedFrame,
        index: usize,
        side: Side,
        target_price: f64,
        notional: f64,
        gap_open: f64,
    ) -> (f64, f64) {
        let impact = self.price_impact(frame, index, notional);
        let impacted = match side {
            Side::Long => target_price * (1.0 + impact),
            Side::Short => target_price * (1.0 - impact),
        };
        if gap_open.abs() >= self.params.gap_threshold {
            let direction = match (gap_open > 0.0, side) {
                (true, Side::Long) | (false, Side::Short) => 1.0,
                _ => -1.0,
            };
            let adjusted = impacted * (1.0 + direction * self.params.gap_penalty);
            return (adjusted, 0.6);
        }
        (impacted, 1.0)
    }
}

fn column_at(frame: &CuratedFrame, name: &str, index: usize) -> Option<f64> {
    frame
        .column(name)
        .and_then(|col| col.get(index))
        .copied()
        .filter(|v| v.is_finite())
}
