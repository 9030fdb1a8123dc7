use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use signal_core::CampaignAbort;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowRole {
    Train,
    Validation,
    Test,
    WalkForward,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub role: WindowRole,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SplitParams {
    pub train_days: i64,
    pub val_days: i64,
    pub test_days: i64,
    /// Span of each intermediate fold; defaults to `test_days`.
    pub walk_days: Option<i64>,
}

impl Default for SplitParams {
    fn default() -> Self {
        Self {
            train_days: 365,
            val_days: 90,
            test_days: 90,
            walk_days: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitPlan {
    pub train: TimeWindow,
    pub validation: TimeWindow,
    pub test: TimeWindow,
    pub walk_forward: Vec<TimeWindow>,
}

impl SplitPlan {
    /// Folds in replay order: walk-forward folds then the test window.
    pub fn evaluation_windows(&self) -> Vec<TimeWindow> {
        let mut windows = self.walk_forward.clone();
        windows.push(self.test);
        windows
    }
}

/// Produce temporally isolated train/validation/test/walk-forward
/// windows over `[start, end]`.
///
/// Ordering is train -> validation -> [walk folds] -> test; any overlap
/// aborts the campaign rather than silently leaking future data into an
/// earlier window.
pub fn split_windows(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    params: &SplitParams,
) -> Result<SplitPlan, CampaignAbort> {
    if start >= end {
        return Err(CampaignAbort::new("Start must be earlier than end"));
    }
    let day = Duration::days(1);

    let train_end = start + Duration::days(params.train_days - 1);
    if train_end >= end {
        return Err(CampaignAbort::with_details(
            "Training window exceeds available range",
            serde_json::json!({"train_end": train_end.to_rfc3339(), "end": end.to_rfc3339()}),
        ));
    }

    let val_start = train_end + day;
    let val_end = val_start + Duration::days(params.val_days - 1);

    let test_end = end;
    let test_start = end - Duration::days(params.test_days - 1);
    if test_start <= val_end {
        return Err(CampaignAbort::with_details(
            "Test window overlaps validation data",
            serde_json::json!({
                "validation_end": val_end.to_rfc3339(),
                "test_start": test_start.to_rfc3339(),
            }),
        ));
    }
    if val_end >= end {
        return Err(CampaignAbort::with_details(
            "Validation window exceeds available range",
            serde_json::json!({"validation_end": val_end.to_rfc3339(), "end": end.to_rfc3339()}),
        ));
    }

    let walk_span = params.walk_days.unwrap_or(params.test_days).max(1);
    let mut walk_forward = Vec::new();
    let mut walk_start = val_end + day;
    let walk_cutoff = test_start - day;
    while walk_start <= walk_cutoff {
        let walk_end = (walk_start + Duration::days(walk_span - 1)).min(walk_cutoff);
        walk_forward.push(TimeWindow {
            start: walk_start,
            end: walk_end,
            role: WindowRole::WalkForward,
        });
        walk_start = walk_end + day;
    }

    Ok(SplitPlan {
        train: TimeWindow {
            start,
            end: train_end,
            role: WindowRole::Train,
        },
        validation: TimeWindow {
            start: val_start,
            end: val_end,
            role: WindowRole::Validation,
        },
        test: TimeWindow {
            start: test_start,
            end: test_end,
            role: WindowRole::Test,
        },
        walk_forward,
    })
}
