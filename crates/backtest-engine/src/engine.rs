use chrono::{DateTime, Utc};
use signal_core::CuratedFrame;

use crate::execution::ExecutionModel;
use crate::models::{Action, EquityPoint, ExitReason, GapEvent, ReplayConfig, Side, Trade};
use crate::position::{Position, PositionArena};

/// Read-only view handed to the strategy on each bar.
///
/// Contract: the strategy may only read frame values at or before
/// `index`; the engine replays bars in strictly increasing `open_time`
/// order and nothing later exists yet.
pub struct BarContext<'a> {
    pub index: usize,
    pub frame: &'a CuratedFrame,
    pub equity: f64,
    pub drawdown_pct: f64,
    pub position: Option<&'a Position>,
}

/// Bar-driven strategy capability for the replay loop.
pub trait ReplayStrategy {
    fn on_bar(&mut self, ctx: &BarContext<'_>) -> Action;
}

#[derive(Debug, Clone, Default)]
pub struct ReplayResult {
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub gap_events: Vec<GapEvent>,
    pub initial_capital: f64,
    pub final_equity: f64,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// A pending full exit decided while the position borrow was held.
struct PendingExit {
    price: f64,
    reason: ExitReason,
}

/// Walk-forward replay engine with the conservative intrabar execution
/// model: on each bar the stop-loss is tested before the take-profit,
/// and a bar opening through the stop with a gap at or beyond the
/// threshold exits at the penalized open instead of the stop price.
pub struct BacktestEngine {
    config: ReplayConfig,
    execution: ExecutionModel,
}

impl BacktestEngine {
    pub fn new(config: ReplayConfig) -> Self {
        let execution = ExecutionModel::new(config.execution.clone());
        Self { config, execution }
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    pub fn run(&self, frame: &CuratedFrame, strategy: &mut dyn ReplayStrategy) -> ReplayResult {
        let mut result = ReplayResult {
            initial_capital: self.config.initial_capital,
            final_equity: self.config.initial_capital,
            ..Default::default()
        };
        if frame.is_empty() {
            return result;
        }
        result.start = frame.open_time.first().copied();
        result.end = frame.open_time.last().copied();

        let mut arena = PositionArena::new();
        let mut realized_equity = self.config.initial_capital;
        let mut peak_equity = self.config.initial_capital;

        for i in 0..frame.len() {
            let time = frame.open_time[i];
            let open = frame.open[i];
            let high = frame.high[i];
            let low = frame.low[i];
            let close = frame.close[i];
            let prev_close = if i > 0 { frame.close[i - 1] } else { open };
            let gap_open = if prev_close > 0.0 {
                open / prev_close - 1.0
            } else {
                0.0
            };

            // 1. Exit handling for the open position, stop before target
            let mut pending_exit: Option<PendingExit> = None;
            let mut drained_by_partials = false;
            if let Some(position) = arena.active_mut() {
                let stop_breached_at_open = match position.side {
                    Side::Long => open <= position.sl,
                    Side::Short => open >= position.sl,
                };
                let stop_hit_intrabar = match position.side {
                    Side::Long => low <= position.sl,
                    Side::Short => high >= position.sl,
                };

                if stop_breached_at_open
                    && gap_open.abs() >= self.config.execution.gap_threshold
                {
                    let fill = match position.side {
                        Side::Long => open * (1.0 - self.config.execution.gap_penalty),
                        Side::Short => open * (1.0 + self.config.execution.gap_penalty),
                    };
                    result.gap_events.push(GapEvent {
                        time,
                        open,
                        stop: position.sl,
                        gap_pct: gap_open * 100.0,
                        fill_price: fill,
                    });
                    tracing::warn!(
                        time = %time,
                        open,
                        stop = position.sl,
                        gap_pct = gap_open * 100.0,
                        "gap through stop, exiting at penalized open"
                    );
                    pending_exit = Some(PendingExit {
                        price: fill,
                        reason: ExitReason::SlGap,
                    });
                } else if stop_hit_intrabar {
                    let reason = if position.sl != position.initial_sl {
                        ExitReason::Trailing
                    } else {
                        ExitReason::Sl
                    };
                    pending_exit = Some(PendingExit {
                        price: position.sl,
                        reason,
                    });
                }

                // Partial take-profit ladder, only when the stop held
                if pending_exit.is_none() {
                    for (rung, (move_pct, qty_pct)) in
                        self.config.partial_take_profits.iter().enumerate()
                    {
                        if position.partials_taken.contains(&rung) || position.qty <= 0.0 {
                            continue;
                        }
                        let target = match position.side {
                            Side::Long => position.entry_price * (1.0 + move_pct),
                            Side::Short => position.entry_price * (1.0 - move_pct),
                        };
                        let touched = match position.side {
                            Side::Long => high >= target,
                            Side::Short => low <= target,
                        };
                        if touched {
                            position.partials_taken.push(rung);
                            let qty = (position.initial_qty * qty_pct).min(position.qty);
                            position.qty -= qty;
                            let pnl = position.pnl(target, qty);
                            realized_equity += pnl;
                            result.trades.push(Trade {
                                entry_time: position.entry_time,
                                exit_time: time,
                                side: position.side,
                                entry_price: position.entry_price,
                                exit_price: target,
                                qty,
                                pnl,
                                return_pct: position.return_pct(target),
                                mae: position.mae_pct(),
                                mfe: position.mfe_pct(),
                                exit_reason: ExitReason::Partial,
                            });
                            tracing::debug!(time = %time, rung, qty, "partial take-profit filled");
                        }
                    }
                    drained_by_partials = position.qty <= f64::EPSILON;

                    if !drained_by_partials {
                        let tp_hit = match position.side {
                            Side::Long => high >= position.tp,
                            Side::Short => low <= position.tp,
                        };
                        if tp_hit {
                            pending_exit = Some(PendingExit {
                                price: position.tp,
                                reason: ExitReason::Tp,
                            });
                        }
                    }
                }
            }
            if drained_by_partials {
                arena.close_active();
            } else if let Some(exit) = pending_exit {
                close_position(
                    &mut arena,
                    &mut result,
                    &mut realized_equity,
                    time,
                    exit.price,
                    exit.reason,
                );
            }

            // 2. Lifecycle updates on the surviving position
            let mut time_stop = false;
            if let Some(position) = arena.active_mut() {
                position.observe_bar(high, low);
                if let Some(trailing) = self.config.trailing_sl_pct {
                    position.trail_stop(trailing);
                }
                if let Some(trigger) = self.config.breakeven_trigger_pct {
                    position.arm_breakeven(trigger);
                }
                if let Some(max_hold) = self.config.max_hold_bars {
                    time_stop = i - position.entry_index >= max_hold;
                }
            }
            if time_stop {
                close_position(
                    &mut arena,
                    &mut result,
                    &mut realized_equity,
                    time,
                    close,
                    ExitReason::Time,
                );
            }

            // 3. Strategy decision on this bar
            let marked_equity =
                realized_equity + arena.active().map(|p| p.pnl(close, p.qty)).unwrap_or(0.0);
            peak_equity = peak_equity.max(marked_equity);
            let drawdown_pct = if peak_equity > 0.0 {
                (peak_equity - marked_equity) / peak_equity * 100.0
            } else {
                0.0
            };

            let action = strategy.on_bar(&BarContext {
                index: i,
                frame,
                equity: marked_equity,
                drawdown_pct,
                position: arena.active(),
            });

            match action {
                Action::Enter { side, sl, tp } if arena.active().is_none() => {
                    let notional = realized_equity * self.config.position_size_pct;
                    if notional > 0.0 && close > 0.0 {
                        let (fill_price, fill_ratio) = self
                            .execution
                            .adjust_price(frame, i, side, close, notional, gap_open);
                        let qty = notional * fill_ratio / fill_price;
                        if qty > 0.0 {
                            arena.open(Position::open(side, time, i, fill_price, qty, sl, tp));
                            tracing::debug!(
                                time = %time,
                                side = side.as_str(),
                                fill_price,
                                qty,
                                fill_ratio,
                                "position opened"
                            );
                        }
                    }
                }
                // One open position per symbol; surplus entries drop
                Action::Enter { .. } => {}
                Action::Exit => {
                    if arena.active().is_some() {
                        close_position(
                            &mut arena,
                            &mut result,
                            &mut realized_equity,
                            time,
                            close,
                            ExitReason::Signal,
                        );
                    }
                }
                Action::Adjust { sl, tp } => {
                    if let Some(position) = arena.active_mut() {
                        if let Some(sl) = sl {
                            position.sl = sl;
                        }
                        if let Some(tp) = tp {
                            position.tp = tp;
                        }
                    }
                }
                Action::Hold => {}
            }

            let marked_equity =
                realized_equity + arena.active().map(|p| p.pnl(close, p.qty)).unwrap_or(0.0);
            result.equity_curve.push(EquityPoint {
                time,
                equity: marked_equity,
            });
        }

        // Liquidate anything still open at the end of the window
        if arena.active().is_some() {
            let last = frame.len() - 1;
            close_position(
                &mut arena,
                &mut result,
                &mut realized_equity,
                frame.open_time[last],
                frame.close[last],
                ExitReason::Time,
            );
            if let Some(point) = result.equity_curve.last_mut() {
                point.equity = realized_equity;
            }
        }

        result.final_equity = realized_equity;
        result
    }
}

fn close_position(
    arena: &mut PositionArena,
    result: &mut ReplayResult,
    realized_equity: &mut f64,
    time: DateTime<Utc>,
    price: f64,
    reason: ExitReason,
) {
    let Some(position) = arena.active() else {
        return;
    };
    let qty = position.qty;
    let pnl = position.pnl(price, qty);
    *realized_equity += pnl;
    result.trades.push(Trade {
        entry_time: position.entry_time,
        exit_time: time,
        side: position.side,
        entry_price: position.entry_price,
        exit_price: price,
        qty,
        pnl,
        return_pct: position.return_pct(price),
        mae: position.mae_pct(),
        mfe: position.mfe_pct(),
        exit_reason: reason,
    });
    arena.close_active();
}
