use std::path::PathBuf;
use std::sync::Arc;

use backtest_engine::{
    run_campaign, CampaignParams, CampaignResult, ReplayConfig, ReplayStrategy, Side, SplitParams,
};
use chrono::{DateTime, NaiveDate, Utc};
use confidence_calibrator::ConfidenceService;
use data_ingestion::{IngestionError, SignalDataInputs, SignalDataProvider};
use monte_carlo::{estimate_tp_sl, monte_carlo_ruin, RuinConfig, TpSlConfig};
use preflight_audit::{run_audit, AuditContext};
use risk_evaluator::{
    EvaluationContext, ExposureRow, RejectReason, RiskEvaluator, Verdict,
};
use signal_core::{
    derive_seed, hashing, CuratedFrame, EntryRange, Interval, RecommendationGenerationError,
    Settings, Signal, SignalKind, SignalRiskMetrics, SuggestedSizing, VolBucket,
};
use strategy_ensemble::{
    aggregate, all_strategies, classify_regime, AggregatorParams, EnsembleWeightStore,
    RegimeWeights,
};
use tokio::sync::Mutex;
use uuid::Uuid;
use worm_store::WormStore;

use crate::recommendation::RecommendationStore;
use crate::replay_adapter::EnsembleReplayStrategy;

const RISK_PCT_PER_TRADE: f64 = 1.0;
const SL_ATR_MULT: f64 = 2.0;
const TP_ATR_MULT: f64 = 3.0;
const ENTRY_BAND_ATR_MULT: f64 = 0.25;
const MC_RETURN_WINDOW: usize = 90;
const RUIN_MIN_TRADES: usize = 5;

/// Everything the orchestrator needs, threaded explicitly instead of
/// living in process globals.
pub struct OrchestratorDeps {
    pub provider: SignalDataProvider,
    pub weight_store: EnsembleWeightStore,
    pub confidence: ConfidenceService,
    pub risk: RiskEvaluator,
    pub store: RecommendationStore,
    pub worm: WormStore,
    pub settings: Settings,
    pub aggregator_params: AggregatorParams,
    pub campaigns_dir: PathBuf,
    pub code_commit: String,
}

/// Top-level signal pipeline: validated data -> ensemble -> calibration
/// -> Monte-Carlo -> risk evaluation -> mandatory backtest -> preflight
/// audit -> persistence (DB row, then WORM snapshot).
pub struct SignalOrchestrator {
    deps: OrchestratorDeps,
    /// Serializes emissions per (user, symbol): at most one in flight.
    emission_lock: Mutex<()>,
}

impl SignalOrchestrator {
    pub fn new(deps: OrchestratorDeps) -> Self {
        Self {
            deps,
            emission_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &RecommendationStore {
        &self.deps.store
    }

    /// Generate and publish today's recommendation for the user.
    ///
    /// Deliberate withholds (risk blocks, duplicate snapshots) return a
    /// well-formed payload with `status` and `reason`; audit and data
    /// failures surface as typed errors.
    pub async fn generate_recommendation(
        &self,
        user_id: &str,
    ) -> Result<serde_json::Value, RecommendationGenerationError> {
        let _serialized = self.emission_lock.lock().await;

        // 1. Validated data inputs
        let inputs = self
            .deps
            .provider
            .get_validated_inputs(true)
            .await
            .map_err(map_data_error)?;
        let df_1d = Arc::clone(&inputs.df_1d);
        let df_1h = Arc::clone(&inputs.df_1h);

        let market_timestamp = df_1d.last_open_time().ok_or_else(|| {
            RecommendationGenerationError::new("no_data", "curated 1d frame is empty")
        })?;
        let date = Utc::now().date_naive();

        // Duplicate spot snapshot: drop the second emission
        if let Ok(Some(existing)) = self
            .deps
            .store
            .find_by_snapshot(date, market_timestamp)
            .await
        {
            return Ok(existing);
        }

        // 2. Ensemble under regime weights
        let factors = technical_indicators::compute_factors(&df_1h, &df_1d);
        let regime = classify_regime(&factors);
        let vol_bucket = factors.vol_regime_1d.unwrap_or(VolBucket::Mid);
        let strategies = all_strategies();
        let strategy_names: Vec<&str> = strategies.iter().map(|s| s.name()).collect();
        let weights = self
            .deps
            .weight_store
            .load(regime, &strategy_names)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "weight store unavailable, using uniform weights");
                RegimeWeights::uniform(regime, &strategy_names)
            });
        let ensemble = aggregate(
            &strategies,
            &df_1d,
            &weights,
            &factors,
            &self.deps.aggregator_params,
        );

        // 3. Seed, levels, Monte-Carlo
        let seed = derive_seed(date, &inputs.symbol);
        let close = df_1d.close[df_1d.len() - 1];
        let atr = df_1d.last_value("atr_14");
        let mut signal_kind = ensemble.signal;

        let side = match signal_kind {
            SignalKind::Sell => Side::Short,
            _ => Side::Long,
        };
        let (sl, tp) = EnsembleReplayStrategy::levels(close, atr, side, SL_ATR_MULT, TP_ATR_MULT);
        let band = atr.filter(|a| *a > 0.0).unwrap_or(close * 0.01) * ENTRY_BAND_ATR_MULT;
        let entry_range = EntryRange {
            min: close - band,
            max: close + band,
            optimal: close,
        };

        let mc = {
            let returns = pct_returns(&df_1d, MC_RETURN_WINDOW);
            let kind = signal_kind;
            tokio::task::spawn_blocking(move || {
                estimate_tp_sl(&returns, close, sl, tp, kind, seed, TpSlConfig::default())
            })
            .await
            .map_err(|e| internal_error("monte carlo task failed", &e.to_string()))?
        };

        let risk_reward_ratio = match signal_kind {
            SignalKind::Sell => {
                if sl - close > 0.0 {
                    (close - tp) / (sl - close)
                } else {
                    0.0
                }
            }
            _ => {
                if close - sl > 0.0 {
                    (tp - close) / (close - sl)
                } else {
                    0.0
                }
            }
        };

        let confidence_raw =
            (0.6 * ensemble.confidence_raw + 0.4 * mc.mc_confidence).clamp(5.0, 95.0);
        let calibration = self.deps.confidence.calibrate(confidence_raw, regime);

        // 4. Risk evaluation
        let trade_returns = self
            .deps
            .store
            .recent_closed_returns(50)
            .await
            .unwrap_or_default();
        let ruin_probability = if trade_returns.len() >= RUIN_MIN_TRADES {
            let equity = 10_000.0;
            let seed64 = seed as u64;
            let returns = trade_returns;
            let ruin = tokio::task::spawn_blocking(move || {
                monte_carlo_ruin(
                    &returns,
                    &RuinConfig {
                        equity,
                        seed: seed64,
                        n_paths: 1000,
                        ..Default::default()
                    },
                )
            })
            .await
            .map_err(|e| internal_error("ruin task failed", &e.to_string()))?;
            Some(ruin.ruin_probability)
        } else {
            None
        };

        let committed_risk = self
            .deps
            .store
            .committed_risk_pct_today(date)
            .await
            .unwrap_or(0.0);
        let recommendation_id = Uuid::new_v4().to_string();
        let new_trade_risk_pct = if signal_kind == SignalKind::Hold {
            0.0
        } else {
            RISK_PCT_PER_TRADE
        };

        let decision = self
            .deps
            .risk
            .evaluate(
                user_id,
                &EvaluationContext {
                    signal: signal_kind,
                    risk_reward_ratio,
                    proposed_notional: 0.0, // filled below once sizing is known
                    beta_value: 1.0,
                    entry_price: close,
                    new_trade_risk_pct,
                    daily_committed_risk_pct: committed_risk,
                    ruin_probability,
                    recommendation_id: Some(recommendation_id.clone()),
                },
                Utc::now(),
            )
            .await
            .map_err(|e| internal_error("risk evaluation failed", &e.to_string()))?;

        let equity = decision.state.current_equity.unwrap_or(0.0);
        let sizing = suggested_sizing(equity, close, sl, signal_kind);

        // Re-run the exposure arithmetic with the real notional
        let decision = if decision.verdict == Verdict::Accept && sizing.position_notional > 0.0 {
            self.deps
                .risk
                .evaluate(
                    user_id,
                    &EvaluationContext {
                        signal: signal_kind,
                        risk_reward_ratio,
                        proposed_notional: sizing.position_notional,
                        beta_value: 1.0,
                        entry_price: close,
                        new_trade_risk_pct,
                        daily_committed_risk_pct: committed_risk,
                        ruin_probability,
                        recommendation_id: Some(recommendation_id.clone()),
                    },
                    Utc::now(),
                )
                .await
                .map_err(|e| internal_error("risk evaluation failed", &e.to_string()))?
        } else {
            decision
        };

        let mut rejection_reason: Option<String> = None;
        match &decision.verdict {
            Verdict::Block(reason) => {
                // Blocked emissions produce no recommendation row and no
                // snapshot, only the audit trail the evaluator wrote
                let mut payload = serde_json::json!({
                    "status": reason.as_str(),
                    "reason": reason.as_str(),
                    "signal": "HOLD",
                });
                if *reason == RejectReason::CapitalMissing {
                    payload["requires_capital_input"] = serde_json::Value::Bool(true);
                }
                tracing::warn!(user_id, reason = reason.as_str(), "emission blocked by risk evaluator");
                return Ok(payload);
            }
            Verdict::Downgrade(reason) => {
                signal_kind = SignalKind::Hold;
                rejection_reason = Some(reason.as_str().to_string());
            }
            Verdict::Accept => {}
        }

        // 5. Mandatory backtest over the curated history
        let params_doc = self.params_document();
        let params_digest = hashing::params_digest(&params_doc);
        let campaign = self.run_mandatory_backtest(&df_1d, &weights).await?;

        // 6. Preflight audit
        let dataset_version = df_1d.dataset_version.clone();
        let disk_dataset_version = self.deps.provider.curation().store().dataset_version(
            &inputs.venue,
            &inputs.symbol,
            Interval::D1,
        );
        let mut freshness_failures = Vec::new();
        let mut gap_failures = Vec::new();
        for interval in [Interval::H1, Interval::D1] {
            if let Err(e) =
                self.deps
                    .provider
                    .curation()
                    .validate_freshness(&inputs.symbol, interval, Utc::now())
            {
                freshness_failures.push(e.to_string());
            }
            if let Err(e) = self
                .deps
                .provider
                .curation()
                .validate_gaps(&inputs.symbol, interval)
            {
                gap_failures.push(e.to_string());
            }
        }

        let report = run_audit(&AuditContext {
            code_commit: self.deps.code_commit.clone(),
            dataset_version: dataset_version.clone(),
            disk_dataset_version,
            params_digest: params_digest.clone(),
            expected_params_digest: params_digest.clone(),
            seed,
            date,
            symbol: inputs.symbol.clone(),
            backtest_run_id: Some(campaign.campaign_id.clone()),
            backtest_metrics: Some(campaign.metrics.clone()),
            backtest_initial_capital: campaign
                .equity_curve
                .first()
                .map(|p| p.equity)
                .unwrap_or(10_000.0),
            theoretical_cagr: campaign.theoretical_cagr,
            freshness_failures,
            gap_failures,
            risk_verdict_blocking: false,
            risk_reject_reason: rejection_reason.clone(),
        });
        report.ensure_passed()?;

        // 7. Assemble and persist
        let signal = Signal {
            signal: signal_kind,
            confidence_raw,
            confidence_calibrated: calibration.calibrated,
            entry_range,
            sl,
            tp,
            sl_pct: (sl / close - 1.0) * 100.0,
            tp_pct: (tp / close - 1.0) * 100.0,
            votes: ensemble.votes.clone(),
            signal_breakdown: ensemble.breakdown.clone(),
            risk_metrics: SignalRiskMetrics {
                tp_probability: mc.tp_probability,
                sl_probability: mc.sl_probability,
                risk_reward_ratio,
                suggested_sizing: Some(sizing.clone()),
                rejection_reason: rejection_reason.clone(),
            },
            market_regime: regime,
            vol_bucket,
            seed,
            params_version: params_digest[..12].to_string(),
            dataset_version,
            code_commit: self.deps.code_commit.clone(),
        };

        let payload = self.build_payload(
            &recommendation_id,
            &signal,
            &inputs,
            date,
            market_timestamp,
            &campaign,
            new_trade_risk_pct,
        );

        let (stored_payload, inserted) = self
            .deps
            .store
            .insert_or_existing(&recommendation_id, date, market_timestamp, &payload)
            .await
            .map_err(|e| internal_error("failed to persist recommendation", &e.to_string()))?;
        if !inserted {
            return Ok(stored_payload);
        }

        self.deps
            .store
            .insert_backtest_result(
                &campaign.campaign_id,
                campaign.equity_curve.first().map(|p| p.time).unwrap_or_else(Utc::now),
                campaign.equity_curve.last().map(|p| p.time).unwrap_or_else(Utc::now),
                &params_doc,
                &serde_json::to_value(&campaign.metrics).unwrap_or_default(),
            )
            .await
            .map_err(|e| internal_error("failed to persist backtest result", &e.to_string()))?;

        // WORM snapshot strictly after the database commit
        let snapshot = self
            .deps
            .worm
            .write_snapshot(
                stored_payload.clone(),
                serde_json::json!({
                    "code_commit": self.deps.code_commit,
                    "dataset_version": signal.dataset_version,
                    "params_digest": params_digest,
                    "recommendation_id": recommendation_id,
                }),
            )
            .map_err(|e| internal_error("failed to write WORM snapshot", &e.to_string()))?;

        self.deps
            .store
            .insert_signal_outcome(
                &recommendation_id,
                signal.signal.as_str(),
                calibration.effective(),
                regime.as_str(),
            )
            .await
            .map_err(|e| internal_error("failed to record signal outcome", &e.to_string()))?;

        if signal.signal != SignalKind::Hold {
            self.deps
                .risk
                .register_position(&ExposureRow {
                    user_id: user_id.to_string(),
                    recommendation_id: recommendation_id.clone(),
                    symbol: inputs.symbol.clone(),
                    direction: match signal.signal {
                        SignalKind::Buy => "long".to_string(),
                        _ => "short".to_string(),
                    },
                    notional: sizing.position_notional,
                    beta_bucket: "crypto_major".to_string(),
                    beta_value: 1.0,
                    entry_price: close,
                    opened_at: Utc::now(),
                    closed_at: None,
                    is_active: true,
                })
                .await
                .map_err(|e| internal_error("failed to open exposure position", &e.to_string()))?;
        }

        tracing::info!(
            recommendation_id = %recommendation_id,
            signal = %signal.signal,
            confidence = calibration.effective(),
            regime = %regime,
            seed,
            snapshot_uuid = %snapshot.uuid,
            "recommendation published"
        );
        Ok(stored_payload)
    }

    /// Resolve open recommendations against the curated candles that
    /// arrived since they were published: SL before TP per bar, matching
    /// the execution model. Closing a trade labels its signal outcome,
    /// feeds the user's risk streaks, and releases the exposure row.
    pub async fn close_resolved_recommendations(
        &self,
        user_id: &str,
    ) -> Result<usize, RecommendationGenerationError> {
        let inputs = self
            .deps
            .provider
            .get_validated_inputs(true)
            .await
            .map_err(map_data_error)?;
        let frame = Arc::clone(&inputs.df_1d);

        let open = self
            .deps
            .store
            .open_recommendations()
            .await
            .map_err(|e| internal_error("failed to load open recommendations", &e.to_string()))?;

        let mut closed = 0usize;
        for (id, payload) in open {
            let Some(kind) = payload["signal"].as_str().and_then(SignalKind::parse) else {
                continue;
            };
            if kind == SignalKind::Hold {
                // HOLD rows have nothing to resolve; supersede them
                let _ = self
                    .deps
                    .store
                    .close_recommendation(&id, "superseded", 0.0, 0.0)
                    .await;
                continue;
            }
            let (Some(entry), Some(sl), Some(tp), Some(since)) = (
                payload["entry_range"]["optimal"].as_f64(),
                payload["sl"].as_f64(),
                payload["tp"].as_f64(),
                payload["market_timestamp"]
                    .as_str()
                    .and_then(|s| s.parse::<DateTime<Utc>>().ok()),
            ) else {
                continue;
            };

            let window = frame.between(since, Utc::now());
            let mut exit: Option<(&str, f64)> = None;
            for i in 0..window.len() {
                let (high, low) = (window.high[i], window.low[i]);
                let sl_hit = match kind {
                    SignalKind::Buy => low <= sl,
                    _ => high >= sl,
                };
                if sl_hit {
                    exit = Some(("SL", sl));
                    break;
                }
                let tp_hit = match kind {
                    SignalKind::Buy => high >= tp,
                    _ => low <= tp,
                };
                if tp_hit {
                    exit = Some(("TP", tp));
                    break;
                }
            }

            if let Some((reason, exit_price)) = exit {
                let exit_pct = match kind {
                    SignalKind::Buy => (exit_price / entry - 1.0) * 100.0,
                    _ => (1.0 - exit_price / entry) * 100.0,
                };
                self.deps
                    .store
                    .close_recommendation(&id, reason, exit_price, exit_pct)
                    .await
                    .map_err(|e| internal_error("failed to close recommendation", &e.to_string()))?;
                self.deps
                    .store
                    .label_signal_outcome(&id, reason, exit_pct)
                    .await
                    .map_err(|e| internal_error("failed to label outcome", &e.to_string()))?;

                let sizing_notional = payload["risk_metrics"]["suggested_sizing"]
                    ["position_notional"]
                    .as_f64()
                    .unwrap_or(0.0);
                let pnl = sizing_notional * exit_pct / 100.0;
                self.deps
                    .risk
                    .record_trade_outcome(user_id, pnl, Utc::now())
                    .await
                    .map_err(|e| internal_error("failed to record trade outcome", &e.to_string()))?;
                self.deps
                    .risk
                    .release_position(user_id, &id)
                    .await
                    .map_err(|e| internal_error("failed to release exposure", &e.to_string()))?;

                tracing::info!(recommendation_id = %id, reason, exit_price, "recommendation closed");
                closed += 1;
            }
        }
        Ok(closed)
    }

    async fn run_mandatory_backtest(
        &self,
        df_1d: &Arc<CuratedFrame>,
        weights: &RegimeWeights,
    ) -> Result<CampaignResult, RecommendationGenerationError> {
        let (Some(start), Some(end)) = (df_1d.open_time.first(), df_1d.open_time.last()) else {
            return Err(RecommendationGenerationError::new(
                "backtest_failed",
                "no curated history for the mandatory backtest",
            ));
        };
        let params = rolling_campaign_params(*start, *end);
        let frame = Arc::clone(df_1d);
        let weights = weights.clone();
        let agg_params = self.deps.aggregator_params.clone();
        let campaigns_dir = self.deps.campaigns_dir.clone();
        let (start, end) = (*start, *end);

        tokio::task::spawn_blocking(move || {
            let mut factory = || {
                Box::new(EnsembleReplayStrategy::new(weights.clone(), agg_params.clone()))
                    as Box<dyn ReplayStrategy>
            };
            run_campaign(&frame, start, end, &params, &mut factory, &campaigns_dir)
        })
        .await
        .map_err(|e| internal_error("backtest task failed", &e.to_string()))?
        .map_err(|abort| {
            RecommendationGenerationError::with_details(
                "backtest_failed",
                abort.reason.clone(),
                abort.details,
            )
        })
    }

    fn params_document(&self) -> serde_json::Value {
        serde_json::json!({
            "aggregator": self.deps.aggregator_params,
            "risk_pct_per_trade": RISK_PCT_PER_TRADE,
            "sl_atr_mult": SL_ATR_MULT,
            "tp_atr_mult": TP_ATR_MULT,
            "entry_band_atr_mult": ENTRY_BAND_ATR_MULT,
            "mc": TpSlConfig::default(),
            "risk_reward_floor": self.deps.settings.risk_reward_floor,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn build_payload(
        &self,
        recommendation_id: &str,
        signal: &Signal,
        inputs: &SignalDataInputs,
        date: NaiveDate,
        market_timestamp: DateTime<Utc>,
        campaign: &CampaignResult,
        risk_pct: f64,
    ) -> serde_json::Value {
        let mut payload = serde_json::to_value(signal).unwrap_or_default();
        payload["status"] = "ok".into();
        payload["id"] = recommendation_id.into();
        payload["date"] = date.format("%Y-%m-%d").to_string().into();
        payload["market_timestamp"] = market_timestamp.to_rfc3339().into();
        payload["ingestion_timestamp"] = Utc::now().to_rfc3339().into();
        payload["spot_source"] = inputs.venue.clone().into();
        payload["symbol"] = inputs.symbol.clone().into();
        payload["venue"] = inputs.venue.clone().into();
        payload["backtest_run_id"] = campaign.campaign_id.clone().into();
        payload["backtest_cagr"] = campaign.metrics.cagr.into();
        payload["backtest_win_rate"] = campaign.metrics.win_rate.into();
        payload["backtest_risk_reward_ratio"] = campaign.metrics.profit_factor.into();
        payload["backtest_max_drawdown"] = campaign.metrics.max_drawdown.into();
        payload["tracking_error_bps"] = campaign.metrics.tracking_error_bps.into();
        payload["risk_metrics"]["risk_pct"] = risk_pct.into();
        payload
    }
}

fn suggested_sizing(equity: f64, entry: f64, sl: f64, signal: SignalKind) -> SuggestedSizing {
    if equity <= 0.0 || signal == SignalKind::Hold {
        return SuggestedSizing::default();
    }
    let risk_amount = equity * RISK_PCT_PER_TRADE / 100.0;
    let stop_distance = (entry - sl).abs();
    if stop_distance <= 0.0 {
        return SuggestedSizing::default();
    }
    let qty = risk_amount / stop_distance;
    let notional = (qty * entry).min(equity * 0.5);
    SuggestedSizing {
        risk_amount,
        position_notional: notional,
        qty: notional / entry,
    }
}

/// Scale the walk-forward split to the available history so the
/// mandatory backtest works from shorter curated sets too.
fn rolling_campaign_params(start: DateTime<Utc>, end: DateTime<Utc>) -> CampaignParams {
    let total_days = (end - start).num_days().max(10);
    let train_days = (total_days as f64 * 0.5) as i64;
    let val_days = ((total_days as f64 * 0.15) as i64).max(2);
    let test_days = ((total_days as f64 * 0.2) as i64).max(2);
    CampaignParams {
        split: SplitParams {
            train_days: train_days.max(5),
            val_days,
            test_days,
            walk_days: Some(test_days),
        },
        replay: ReplayConfig::default(),
        cost_bps: None,
    }
}

fn pct_returns(frame: &CuratedFrame, window: usize) -> Vec<f64> {
    let closes = &frame.close;
    let start = closes.len().saturating_sub(window + 1);
    closes[start..]
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect()
}

fn map_data_error(e: IngestionError) -> RecommendationGenerationError {
    match e {
        IngestionError::Freshness(err) => RecommendationGenerationError::with_details(
            "stale_data",
            err.to_string(),
            serde_json::json!({
                "interval": err.interval,
                "latest_timestamp": err.latest_timestamp,
                "threshold_minutes": err.threshold_minutes,
                "context": err.context_data,
            }),
        ),
        IngestionError::Gap(err) => RecommendationGenerationError::with_details(
            "data_gap",
            err.to_string(),
            serde_json::json!({
                "interval": err.interval,
                "gaps": err.gaps,
                "tolerance_candles": err.tolerance_candles,
            }),
        ),
        other => RecommendationGenerationError::new("data_unavailable", other.to_string()),
    }
}

fn internal_error(context: &str, detail: &str) -> RecommendationGenerationError {
    RecommendationGenerationError::with_details(
        "internal_error",
        context,
        serde_json::json!({"detail": detail}),
    )
}
