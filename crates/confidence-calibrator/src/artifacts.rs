use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use signal_core::Regime;
use thiserror::Error;

/// Calibration method declared by an artifact manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibratorType {
    Platt,
    Isotonic,
}

/// Manifest stored as `metadata.json` next to each calibrator artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub regime: String,
    pub calibrator_type: CalibratorType,
    /// Expected calibration error on the holdout set.
    pub ece: f64,
    /// Brier score on the holdout set.
    pub brier: f64,
    pub dataset_path: String,
    pub commit: String,
}

/// The calibrator parameters stored as `calibrator.json`.
///
/// Platt artifacts carry sigmoid coefficients over the [0, 1] score;
/// isotonic artifacts carry a sorted `(score, probability)` lookup table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CalibratorArtifact {
    Platt { a: f64, b: f64 },
    Isotonic { table: Vec<(f64, f64)> },
}

impl CalibratorArtifact {
    pub fn calibrator_type(&self) -> CalibratorType {
        match self {
            CalibratorArtifact::Platt { .. } => CalibratorType::Platt,
            CalibratorArtifact::Isotonic { .. } => CalibratorType::Isotonic,
        }
    }
}

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("artifact not found for regime {0}")]
    NotFound(String),

    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed artifact at {path}: {message}")]
    Malformed { path: String, message: String },

    #[error("artifact type mismatch for regime {regime}: manifest says {manifest:?}, calibrator is {calibrator:?}")]
    TypeMismatch {
        regime: String,
        manifest: CalibratorType,
        calibrator: CalibratorType,
    },
}

pub fn regime_dir(artifacts_dir: &Path, regime: Regime) -> PathBuf {
    artifacts_dir.join("confidence").join(regime.as_str())
}

/// Load the `(calibrator, metadata)` pair for a regime from
/// `artifacts/confidence/<regime>/`.
pub fn load_artifact(
    artifacts_dir: &Path,
    regime: Regime,
) -> Result<(CalibratorArtifact, ArtifactMetadata), ArtifactError> {
    let dir = regime_dir(artifacts_dir, regime);
    let calibrator_path = dir.join("calibrator.json");
    let metadata_path = dir.join("metadata.json");
    if !calibrator_path.exists() || !metadata_path.exists() {
        return Err(ArtifactError::NotFound(regime.as_str().to_string()));
    }

    let read_json = |path: &Path| -> Result<serde_json::Value, ArtifactError> {
        let bytes = std::fs::read(path).map_err(|e| ArtifactError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        serde_json::from_slice(&bytes).map_err(|e| ArtifactError::Malformed {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    };

    let calibrator: CalibratorArtifact = serde_json::from_value(read_json(&calibrator_path)?)
        .map_err(|e| ArtifactError::Malformed {
            path: calibrator_path.display().to_string(),
            message: e.to_string(),
        })?;
    let metadata: ArtifactMetadata = serde_json::from_value(read_json(&metadata_path)?)
        .map_err(|e| ArtifactError::Malformed {
            path: metadata_path.display().to_string(),
            message: e.to_string(),
        })?;

    if metadata.calibrator_type != calibrator.calibrator_type() {
        return Err(ArtifactError::TypeMismatch {
            regime: regime.as_str().to_string(),
            manifest: metadata.calibrator_type,
            calibrator: calibrator.calibrator_type(),
        });
    }
    Ok((calibrator, metadata))
}

/// Write an artifact pair; used by tests and the weight-training CLI.
pub fn write_artifact(
    artifacts_dir: &Path,
    regime: Regime,
    calibrator: &CalibratorArtifact,
    metadata: &ArtifactMetadata,
) -> std::io::Result<()> {
    let dir = regime_dir(artifacts_dir, regime);
    std::fs::create_dir_all(&dir)?;
    std::fs::write(
        dir.join("calibrator.json"),
        serde_json::to_vec_pretty(calibrator).expect("artifact serializes"),
    )?;
    std::fs::write(
        dir.join("metadata.json"),
        serde_json::to_vec_pretty(metadata).expect("metadata serializes"),
    )?;
    Ok(())
}
