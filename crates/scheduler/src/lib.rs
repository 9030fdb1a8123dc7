//! Time-triggered and gap-triggered jobs.
//!
//! Jobs: `ingest_all` every 15 minutes, `daily_pipeline` once per day at
//! the configured UTC time, and a `preflight_maintenance` pass at
//! startup that backfills detected gaps in chunks and re-curates.
//! Ingestion retries are local with linear backoff; metric-recording
//! failures are swallowed with a warning and never abort a job.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Timelike, Utc};
use data_ingestion::{DataCuration, DataIngestion, IngestStatus};
use signal_core::{
    incr_counter_quietly, record_gauge_quietly, Interval, MetricsSink, Settings, INTERVALS,
};
use signal_orchestrator::SignalOrchestrator;
use uuid::Uuid;

const INGEST_CADENCE_SECS: u64 = 15 * 60;
const MAX_RETRIES: u32 = 3;
const RETRY_BACKOFF_SECS: u64 = 5;

pub struct Scheduler {
    ingestion: Arc<DataIngestion>,
    curation: Arc<DataCuration>,
    orchestrator: Arc<SignalOrchestrator>,
    metrics: Arc<dyn MetricsSink>,
    settings: Settings,
    symbol: String,
}

impl Scheduler {
    pub fn new(
        ingestion: Arc<DataIngestion>,
        curation: Arc<DataCuration>,
        orchestrator: Arc<SignalOrchestrator>,
        metrics: Arc<dyn MetricsSink>,
        settings: Settings,
        symbol: impl Into<String>,
    ) -> Self {
        Self {
            ingestion,
            curation,
            orchestrator,
            metrics,
            settings,
            symbol: symbol.into(),
        }
    }

    /// Run the scheduler forever: startup maintenance, then the
    /// ingestion cadence and the daily pipeline concurrently.
    pub async fn run(self: Arc<Self>) {
        if self.settings.prestart_maintenance {
            self.preflight_maintenance().await;
        }

        let ingest = Arc::clone(&self);
        let ingest_task = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(StdDuration::from_secs(INGEST_CADENCE_SECS));
            loop {
                ticker.tick().await;
                ingest.ingest_all().await;
            }
        });

        let daily = Arc::clone(&self);
        let daily_task = tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let next = next_daily_run(now, daily.settings.recommendation_update_time);
                let wait = (next - now).to_std().unwrap_or(StdDuration::from_secs(60));
                tracing::info!(next_run = %next, "daily pipeline scheduled");
                tokio::time::sleep(wait).await;
                daily.daily_pipeline().await;
            }
        });

        let _ = tokio::join!(ingest_task, daily_task);
    }

    /// Ingest the next window for every interval, with linear-backoff
    /// retries per window.
    pub async fn ingest_all(&self) {
        let run_id = Uuid::new_v4().to_string();
        for interval in INTERVALS {
            let lookback = Duration::days(self.settings.prestart_lookback_days);
            let (start, end) = self.ingestion.next_window(&self.symbol, interval, lookback);
            if start >= end {
                continue;
            }

            let mut last_error: Option<String> = None;
            for attempt in 1..=MAX_RETRIES {
                match self
                    .ingestion
                    .ingest_window(&self.symbol, interval, Some(start), Some(end))
                    .await
                {
                    Ok(report) => {
                        incr_counter_quietly(
                            self.metrics.as_ref(),
                            "ingestion_windows_total",
                            &[("interval", interval.as_str()), ("status", "ok")],
                        );
                        if report.status == IngestStatus::Empty {
                            tracing::debug!(interval = %interval, "ingestion window empty");
                        }
                        last_error = None;
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(
                            interval = %interval,
                            attempt,
                            error = %e,
                            "ingestion window failed"
                        );
                        last_error = Some(e.to_string());
                        tokio::time::sleep(StdDuration::from_secs(
                            RETRY_BACKOFF_SECS * attempt as u64,
                        ))
                        .await;
                    }
                }
            }
            if let Some(error) = last_error {
                incr_counter_quietly(
                    self.metrics.as_ref(),
                    "ingestion_windows_total",
                    &[("interval", interval.as_str()), ("status", "error")],
                );
                self.log_run(
                    &run_id,
                    "ingest_all",
                    "failed",
                    &format!("{interval} ingestion failed after {MAX_RETRIES} attempts"),
                    serde_json::json!({"error": error}),
                )
                .await;
            }
        }

        // Funding and open interest ride along with the candle cadence;
        // a failure here never blocks candle ingestion
        match self.ingestion.derivatives().collect(&self.symbol, None, None).await {
            Ok(report) => {
                tracing::debug!(
                    funding_rows = report.funding_rows,
                    open_interest_rows = report.open_interest_rows,
                    "derivatives collected"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "derivatives collection failed");
            }
        }
    }

    /// Curate every interval, then generate and publish the daily
    /// recommendation.
    pub async fn daily_pipeline(&self) {
        let run_id = Uuid::new_v4().to_string();
        for interval in INTERVALS {
            match self.curation.curate(&self.symbol, interval) {
                Ok(_) => {
                    let store = self.curation.store();
                    let path = store.curated_latest_path(
                        self.curation.preferred_venue(),
                        &self.symbol,
                        interval,
                    );
                    let state = store.verify_checksum(&path);
                    record_gauge_quietly(
                        self.metrics.as_ref(),
                        "curated_checksum_verified",
                        state.as_metric() as f64,
                        &[("interval", interval.as_str())],
                    );
                }
                Err(e) => {
                    tracing::error!(interval = %interval, error = %e, "curation failed");
                    self.log_run(
                        &run_id,
                        "daily_pipeline",
                        "failed",
                        &format!("curation failed for {interval}"),
                        serde_json::json!({"error": e.to_string()}),
                    )
                    .await;
                }
            }
        }

        // Resolve yesterday's open recommendations before emitting today's
        match self
            .orchestrator
            .close_resolved_recommendations(&self.settings.default_user_id)
            .await
        {
            Ok(closed) if closed > 0 => {
                tracing::info!(closed, "resolved open recommendations");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(status = %e.status, reason = %e.reason, "recommendation resolution failed");
            }
        }

        match self
            .orchestrator
            .generate_recommendation(&self.settings.default_user_id)
            .await
        {
            Ok(payload) => {
                let status = payload["status"].as_str().unwrap_or("ok").to_string();
                self.log_run(
                    &run_id,
                    "daily_pipeline",
                    "success",
                    "daily recommendation pipeline completed",
                    serde_json::json!({"status": status, "signal": payload["signal"]}),
                )
                .await;
            }
            Err(e) => {
                tracing::error!(status = %e.status, reason = %e.reason, "recommendation generation failed");
                self.log_run(
                    &run_id,
                    "daily_pipeline",
                    "failed",
                    &e.reason,
                    e.to_payload(),
                )
                .await;
            }
        }
    }

    /// Startup maintenance: detect gaps over the lookback horizon,
    /// backfill them in chunks with a pause between calls, then
    /// re-curate every interval.
    pub async fn preflight_maintenance(&self) {
        let run_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let lookback_start = now - Duration::days(self.settings.prestart_lookback_days);
        tracing::info!(
            lookback_days = self.settings.prestart_lookback_days,
            "starting preflight maintenance"
        );
        let mut summary = serde_json::json!({"intervals": []});

        for interval in INTERVALS {
            let mut interval_summary = serde_json::json!({
                "interval": interval.as_str(),
                "gaps": 0,
                "backfilled_windows": 0,
            });

            let gaps = match self
                .ingestion
                .check_gaps(&self.symbol, interval, lookback_start, now)
            {
                Ok(gaps) => gaps,
                Err(e) => {
                    tracing::error!(interval = %interval, error = %e, "preflight gap detection failed");
                    interval_summary["gap_error"] = serde_json::json!(e.to_string());
                    if let Some(intervals) = summary["intervals"].as_array_mut() {
                        intervals.push(interval_summary);
                    }
                    continue;
                }
            };

            interval_summary["gaps"] = serde_json::json!(gaps.len());
            for gap in &gaps {
                // Metric failures must not interrupt the backfill
                incr_counter_quietly(
                    self.metrics.as_ref(),
                    "data_gaps_total",
                    &[("interval", interval.as_str())],
                );
                let windows = self.backfill_gap(interval, gap.start, gap.end).await;
                interval_summary["backfilled_windows"] = serde_json::json!(
                    interval_summary["backfilled_windows"].as_u64().unwrap_or(0) + windows
                );
            }

            if let Err(e) = self.curation.curate(&self.symbol, interval) {
                tracing::warn!(interval = %interval, error = %e, "preflight curation failed");
                interval_summary["curation_error"] = serde_json::json!(e.to_string());
            }
            if let Some(intervals) = summary["intervals"].as_array_mut() {
                intervals.push(interval_summary);
            }
        }

        self.log_run(
            &run_id,
            "preflight",
            "success",
            "preflight maintenance completed",
            summary,
        )
        .await;
        tracing::info!("preflight maintenance completed");
    }

    async fn backfill_gap(
        &self,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> u64 {
        let chunk = interval.duration() * self.settings.prestart_backfill_chunk as i32;
        let pause = StdDuration::from_secs_f64(self.settings.prestart_backfill_pause_secs);
        let mut cursor = start;
        let mut windows = 0u64;

        while cursor <= end {
            let window_end = (cursor + chunk).min(end + interval.duration());
            match self
                .ingestion
                .ingest_window(&self.symbol, interval, Some(cursor), Some(window_end))
                .await
            {
                Ok(report) => {
                    windows += 1;
                    if report.status == IngestStatus::Empty {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        interval = %interval,
                        cursor = %cursor,
                        error = %e,
                        "gap backfill window failed"
                    );
                    break;
                }
            }
            cursor = window_end + interval.duration();
            tokio::time::sleep(pause).await;
        }
        windows
    }

    async fn log_run(
        &self,
        run_id: &str,
        job: &str,
        status: &str,
        message: &str,
        details: serde_json::Value,
    ) {
        if let Err(e) = self
            .orchestrator
            .store()
            .log_run(run_id, job, status, message, &details)
            .await
        {
            tracing::warn!(job, error = %e, "failed to write run log");
        }
    }
}

/// Next occurrence of the configured daily `HH:MM` in UTC.
pub fn next_daily_run(now: DateTime<Utc>, (hour, minute): (u32, u32)) -> DateTime<Utc> {
    let today = now
        .with_hour(hour)
        .and_then(|t| t.with_minute(minute))
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn next_run_is_today_when_still_ahead() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let next = next_daily_run(now, (12, 0));
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn next_run_rolls_to_tomorrow_when_passed() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 13, 30, 0).unwrap();
        let next = next_daily_run(now, (12, 0));
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 3, 2, 12, 0, 0).unwrap());
    }

    #[test]
    fn exact_boundary_rolls_forward() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let next = next_daily_run(now, (12, 0));
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 3, 2, 12, 0, 0).unwrap());
    }
}
