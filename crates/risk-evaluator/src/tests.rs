use chrono::{Duration, Utc};
use signal_core::{Settings, SignalKind};

use crate::db::RiskDb;
use crate::evaluator::{EvaluationContext, RiskEvaluator, Verdict};
use crate::models::{ExposureRow, RejectReason};

async fn evaluator() -> RiskEvaluator {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory SQLite");
    let db = RiskDb::new(pool);
    db.init_tables().await.unwrap();
    RiskEvaluator::new(db, Settings::default())
}

fn buy_context() -> EvaluationContext {
    EvaluationContext {
        signal: SignalKind::Buy,
        risk_reward_ratio: 2.0,
        proposed_notional: 1_000.0,
        beta_value: 1.0,
        entry_price: 100.0,
        new_trade_risk_pct: 0.5,
        daily_committed_risk_pct: 0.0,
        ruin_probability: Some(0.01),
        recommendation_id: Some("rec-1".to_string()),
    }
}

fn exposure_row(user_id: &str, rec_id: &str, notional: f64, beta: f64) -> ExposureRow {
    ExposureRow {
        user_id: user_id.to_string(),
        recommendation_id: rec_id.to_string(),
        symbol: "BTCUSDT".to_string(),
        direction: "long".to_string(),
        notional,
        beta_bucket: "crypto_major".to_string(),
        beta_value: beta,
        entry_price: 100.0,
        opened_at: Utc::now(),
        closed_at: None,
        is_active: true,
    }
}

#[tokio::test]
async fn missing_capital_blocks_and_audits() {
    let evaluator = evaluator().await;
    let decision = evaluator
        .evaluate("user-1", &buy_context(), Utc::now())
        .await
        .unwrap();
    assert_eq!(decision.verdict, Verdict::Block(RejectReason::CapitalMissing));

    let audits = evaluator.db().audits_for_user("user-1", 10).await.unwrap();
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].audit_type, "capital_missing");
    assert_eq!(audits[0].context_data["has_data"], false);
}

#[tokio::test]
async fn zero_equity_counts_as_missing_capital() {
    let evaluator = evaluator().await;
    evaluator.update_capital("user-1", 0.0).await.unwrap();
    let decision = evaluator
        .evaluate("user-1", &buy_context(), Utc::now())
        .await
        .unwrap();
    assert_eq!(decision.verdict, Verdict::Block(RejectReason::CapitalMissing));
}

#[tokio::test]
async fn daily_risk_cap_blocks() {
    let evaluator = evaluator().await;
    evaluator.update_capital("user-1", 10_000.0).await.unwrap();
    let mut ctx = buy_context();
    ctx.daily_committed_risk_pct = 2.8;
    ctx.new_trade_risk_pct = 0.5;
    let decision = evaluator.evaluate("user-1", &ctx, Utc::now()).await.unwrap();
    assert_eq!(decision.verdict, Verdict::Block(RejectReason::DailyRiskBlocked));
}

#[tokio::test]
async fn trade_limit_is_preventive() {
    let evaluator = evaluator().await;
    evaluator.update_capital("user-1", 10_000.0).await.unwrap();
    // 7 winning trades: one below the 8-trade cap already triggers the
    // preventive check
    for _ in 0..7 {
        evaluator
            .record_trade_outcome("user-1", 10.0, Utc::now())
            .await
            .unwrap();
    }
    let decision = evaluator
        .evaluate("user-1", &buy_context(), Utc::now())
        .await
        .unwrap();
    assert_eq!(
        decision.verdict,
        Verdict::Block(RejectReason::TradeLimitPreventive)
    );
}

#[tokio::test]
async fn losing_streak_starts_cooldown_and_downgrades() {
    let evaluator = evaluator().await;
    evaluator.update_capital("user-1", 10_000.0).await.unwrap();
    let now = Utc::now();
    for _ in 0..3 {
        evaluator.record_trade_outcome("user-1", -50.0, now).await.unwrap();
    }
    let state = evaluator.db().load_state("user-1").await.unwrap();
    assert!(state.cooldown_active(now));
    assert_eq!(state.cooldown_reason.as_deref(), Some("losing_streak"));

    let decision = evaluator.evaluate("user-1", &buy_context(), now).await.unwrap();
    assert_eq!(decision.verdict, Verdict::Downgrade(RejectReason::Cooldown));
}

#[tokio::test]
async fn leverage_hard_stop_requires_persistence() {
    let evaluator = evaluator().await;
    evaluator.update_capital("user-1", 10_000.0).await.unwrap();
    let t0 = Utc::now();

    let state = evaluator.update_leverage("user-1", 3.5, t0).await.unwrap();
    assert!(!state.leverage_hard_stop);
    assert!(state.leverage_hard_stop_since.is_some());

    // Still above threshold 30 minutes later: not yet a hard stop
    let state = evaluator
        .update_leverage("user-1", 3.2, t0 + Duration::minutes(30))
        .await
        .unwrap();
    assert!(!state.leverage_hard_stop);

    // Past the 60-minute persistence window: hard stop engages
    let state = evaluator
        .update_leverage("user-1", 3.4, t0 + Duration::minutes(61))
        .await
        .unwrap();
    assert!(state.leverage_hard_stop);

    let decision = evaluator
        .evaluate("user-1", &buy_context(), t0 + Duration::minutes(62))
        .await
        .unwrap();
    assert_eq!(
        decision.verdict,
        Verdict::Downgrade(RejectReason::LeverageHardStop)
    );

    // Dropping below the threshold clears the stop
    let state = evaluator
        .update_leverage("user-1", 1.5, t0 + Duration::minutes(90))
        .await
        .unwrap();
    assert!(!state.leverage_hard_stop);
    assert!(state.leverage_hard_stop_since.is_none());
}

#[tokio::test]
async fn exposure_breach_rejects_candidate() {
    let evaluator = evaluator().await;
    evaluator.update_capital("user-1", 10_000.0).await.unwrap();
    // Active beta-adjusted exposure of 19,500 against a 2x equity limit
    evaluator
        .register_position(&exposure_row("user-1", "rec-a", 13_000.0, 1.5))
        .await
        .unwrap();

    let mut ctx = buy_context();
    ctx.proposed_notional = 3_000.0;
    ctx.beta_value = 1.0;
    let decision = evaluator.evaluate("user-1", &ctx, Utc::now()).await.unwrap();
    assert_eq!(
        decision.verdict,
        Verdict::Downgrade(RejectReason::ExposureLimitExceeded)
    );

    // Closing the position frees the budget
    assert!(evaluator.release_position("user-1", "rec-a").await.unwrap());
    let decision = evaluator.evaluate("user-1", &ctx, Utc::now()).await.unwrap();
    assert_eq!(decision.verdict, Verdict::Accept);
}

#[tokio::test]
async fn ruin_probability_above_threshold_downgrades() {
    let evaluator = evaluator().await;
    evaluator.update_capital("user-1", 10_000.0).await.unwrap();
    let mut ctx = buy_context();
    ctx.ruin_probability = Some(0.08);
    let decision = evaluator.evaluate("user-1", &ctx, Utc::now()).await.unwrap();
    assert_eq!(
        decision.verdict,
        Verdict::Downgrade(RejectReason::RuinRiskTooHigh)
    );
}

#[tokio::test]
async fn risk_reward_floor_applies_to_directional_signals_only() {
    let evaluator = evaluator().await;
    evaluator.update_capital("user-1", 10_000.0).await.unwrap();

    let mut ctx = buy_context();
    ctx.risk_reward_ratio = 1.0;
    let decision = evaluator.evaluate("user-1", &ctx, Utc::now()).await.unwrap();
    assert_eq!(
        decision.verdict,
        Verdict::Downgrade(RejectReason::RiskRewardFloor)
    );

    ctx.signal = SignalKind::Hold;
    let decision = evaluator.evaluate("user-1", &ctx, Utc::now()).await.unwrap();
    assert_eq!(decision.verdict, Verdict::Accept);
}

#[tokio::test]
async fn clean_context_is_accepted_with_snapshot() {
    let evaluator = evaluator().await;
    evaluator.update_capital("user-1", 10_000.0).await.unwrap();
    let decision = evaluator
        .evaluate("user-1", &buy_context(), Utc::now())
        .await
        .unwrap();
    assert_eq!(decision.verdict, Verdict::Accept);
    assert_eq!(decision.state.current_equity, Some(10_000.0));
    assert_eq!(decision.exposure_multiplier, 0.0);
}

#[tokio::test]
async fn ledger_rejects_duplicate_positions() {
    let evaluator = evaluator().await;
    evaluator.update_capital("user-1", 10_000.0).await.unwrap();
    evaluator
        .register_position(&exposure_row("user-1", "rec-a", 1_000.0, 1.0))
        .await
        .unwrap();
    assert!(evaluator
        .register_position(&exposure_row("user-1", "rec-a", 2_000.0, 1.0))
        .await
        .is_err());
}

#[tokio::test]
async fn streaks_track_wins_and_losses() {
    let evaluator = evaluator().await;
    evaluator.update_capital("user-1", 10_000.0).await.unwrap();
    let now = Utc::now();
    evaluator.record_trade_outcome("user-1", -10.0, now).await.unwrap();
    evaluator.record_trade_outcome("user-1", -10.0, now).await.unwrap();
    evaluator.record_trade_outcome("user-1", 30.0, now).await.unwrap();
    let state = evaluator.record_trade_outcome("user-1", 15.0, now).await.unwrap();

    assert_eq!(state.longest_losing_streak, 2);
    assert_eq!(state.current_losing_streak, 0);
    assert_eq!(state.current_winning_streak, 2);
    assert_eq!(state.trades_last_24h, 4);
}
