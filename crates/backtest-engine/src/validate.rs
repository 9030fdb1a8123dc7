use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use signal_core::CuratedFrame;

use crate::models::Side;

/// One historical recommendation's SL/TP levels to replay against the
/// curated candles that followed it.
#[derive(Debug, Clone)]
pub struct SltpCase {
    pub time: DateTime<Utc>,
    pub side: Side,
    pub entry: f64,
    pub sl: f64,
    pub tp: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SltpOutcome {
    TpFirst,
    SlFirst,
    Neither,
    NoData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SltpValidationReport {
    pub cases: usize,
    pub tp_first: usize,
    pub sl_first: usize,
    pub neither: usize,
    pub no_data: usize,
    /// Fraction of cases where either level filled within the horizon.
    pub fulfillment_rate: f64,
    pub passed: bool,
    pub threshold: f64,
}

/// Replay recommendation SL/TP levels over subsequent candles and report
/// how often the levels were actually reachable. SL is tested before TP
/// on each bar, matching the backtest execution model.
pub fn validate_sltp(
    frame: &CuratedFrame,
    cases: &[SltpCase],
    horizon: Duration,
    fulfillment_threshold: f64,
) -> SltpValidationReport {
    let mut tp_first = 0usize;
    let mut sl_first = 0usize;
    let mut neither = 0usize;
    let mut no_data = 0usize;

    for case in cases {
        let window = frame.between(case.time, case.time + horizon);
        if window.is_empty() {
            no_data += 1;
            continue;
        }
        let mut outcome = SltpOutcome::Neither;
        for i in 0..window.len() {
            let (high, low) = (window.high[i], window.low[i]);
            let sl_hit = match case.side {
                Side::Long => low <= case.sl,
                Side::Short => high >= case.sl,
            };
            if sl_hit {
                outcome = SltpOutcome::SlFirst;
                break;
            }
            let tp_hit = match case.side {
                Side::Long => high >= case.tp,
                Side::Short => low <= case.tp,
            };
            if tp_hit {
                outcome = SltpOutcome::TpFirst;
                break;
            }
        }
        match outcome {
            SltpOutcome::TpFirst => tp_first += 1,
            SltpOutcome::SlFirst => sl_first += 1,
            SltpOutcome::Neither => neither += 1,
            SltpOutcome::NoData => no_data += 1,
        }
    }

    let evaluated = cases.len().saturating_sub(no_data);
    let fulfillment_rate = if evaluated > 0 {
        (tp_first + sl_first) as f64 / evaluated as f64
    } else {
        0.0
    };

    SltpValidationReport {
        cases: cases.len(),
        tp_first,
        sl_first,
        neither,
        no_data,
        fulfillment_rate,
        passed: fulfillment_rate >= fulfillment_threshold,
        threshold: fulfillment_threshold,
    }
}
