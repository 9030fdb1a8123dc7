use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use signal_core::Regime;

use crate::artifacts::{load_artifact, ArtifactMetadata, CalibratorArtifact};

const MAX_ECE: f64 = 0.05;
const MAX_BRIER: f64 = 0.08;

/// Result of a calibration call. When no acceptable artifact exists for
/// the regime, `calibrated` is None and callers persist a NULL
/// calibrated confidence.
#[derive(Debug, Clone)]
pub struct CalibrationOutcome {
    pub raw: f64,
    pub calibrated: Option<f64>,
    pub metadata: serde_json::Value,
}

impl CalibrationOutcome {
    fn passthrough(raw: f64) -> Self {
        Self {
            raw,
            calibrated: None,
            metadata: serde_json::json!({}),
        }
    }

    /// The confidence the rest of the pipeline should act on.
    pub fn effective(&self) -> f64 {
        self.calibrated.unwrap_or(self.raw)
    }
}

enum CacheEntry {
    Loaded(CalibratorArtifact, ArtifactMetadata),
    Rejected,
}

/// Regime-partitioned calibration service with ECE/Brier load gates.
///
/// Artifacts are lazily loaded per regime and cached, including negative
/// results, so a missing artifact logs once rather than every signal.
pub struct ConfidenceService {
    artifacts_dir: PathBuf,
    max_ece: f64,
    max_brier: f64,
    cache: Mutex<HashMap<Regime, CacheEntry>>,
}

impl ConfidenceService {
    pub fn new(artifacts_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifacts_dir: artifacts_dir.into(),
            max_ece: MAX_ECE,
            max_brier: MAX_BRIER,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_gates(mut self, max_ece: f64, max_brier: f64) -> Self {
        self.max_ece = max_ece;
        self.max_brier = max_brier;
        self
    }

    /// Calibrate a raw confidence in `[0, 100]` for the active regime.
    ///
    /// Falls back to the raw score (with empty metadata) when the regime
    /// has no artifact or the artifact fails the quality gates.
    pub fn calibrate(&self, raw: f64, regime: Regime) -> CalibrationOutcome {
        let raw = raw.clamp(0.0, 100.0);
        let mut cache = self.cache.lock().expect("calibrator cache poisoned");
        let entry = cache.entry(regime).or_insert_with(|| self.load(regime));

        match entry {
            CacheEntry::Rejected => CalibrationOutcome::passthrough(raw),
            CacheEntry::Loaded(artifact, metadata) => {
                let calibrated = apply(artifact, raw / 100.0) * 100.0;
                CalibrationOutcome {
                    raw,
                    calibrated: Some(calibrated.clamp(0.0, 100.0)),
                    metadata: serde_json::json!({
                        "regime": metadata.regime,
                        "calibrator_type": metadata.calibrator_type,
                        "ece": metadata.ece,
                        "brier": metadata.brier,
                        "commit": metadata.commit,
                    }),
                }
            }
        }
    }

    fn load(&self, regime: Regime) -> CacheEntry {
        match load_artifact(&self.artifacts_dir, regime) {
            Ok((artifact, metadata)) => {
                if metadata.ece > self.max_ece {
                    tracing::warn!(
                        regime = %regime,
                        ece = metadata.ece,
                        max_ece = self.max_ece,
                        "calibrator rejected: ECE above gate"
                    );
                    return CacheEntry::Rejected;
                }
                if metadata.brier > self.max_brier {
                    tracing::warn!(
                        regime = %regime,
                        brier = metadata.brier,
                        max_brier = self.max_brier,
                        "calibrator rejected: Brier above gate"
                    );
                    return CacheEntry::Rejected;
                }
                tracing::info!(
                    regime = %regime,
                    ece = metadata.ece,
                    brier = metadata.brier,
                    "calibrator loaded"
                );
                CacheEntry::Loaded(artifact, metadata)
            }
            Err(e) => {
                tracing::warn!(
                    regime = %regime,
                    error = %e,
                    "no usable calibrator, passing raw confidence through"
                );
                CacheEntry::Rejected
            }
        }
    }
}

/// Apply a calibrator to a score in `[0, 1]`.
fn apply(artifact: &CalibratorArtifact, score: f64) -> f64 {
    match artifact {
        CalibratorArtifact::Platt { a, b } => sigmoid(a * score + b),
        CalibratorArtifact::Isotonic { table } => interpolate(table, score),
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Piecewise-linear interpolation over a sorted `(score, probability)`
/// table, clamped at the ends.
fn interpolate(table: &[(f64, f64)], score: f64) -> f64 {
    match table {
        [] => score,
        [(_, only)] => *only,
        _ => {
            let first = table[0];
            let last = table[table.len() - 1];
            if score <= first.0 {
                return first.1;
            }
            if score >= last.0 {
                return last.1;
            }
            for w in table.windows(2) {
                let (x0, y0) = w[0];
                let (x1, y1) = w[1];
                if score >= x0 && score <= x1 {
                    if (x1 - x0).abs() < f64::EPSILON {
                        return y0;
                    }
                    let t = (score - x0) / (x1 - x0);
                    return y0 + t * (y1 - y0);
                }
            }
            last.1
        }
    }
}
