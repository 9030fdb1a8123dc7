use monte_carlo::{monte_carlo_ruin, RuinConfig};
use serde::{Deserialize, Serialize};

use crate::models::{EquityPoint, Trade};

/// Comprehensive backtest metrics computed from the trade list and the
/// equity curve. Sharpe and Sortino require at least two trades and are
/// zero otherwise.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BacktestMetrics {
    pub cagr: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub expectancy: f64,
    pub calmar: f64,
    pub total_return: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub longest_losing_streak: usize,
    pub risk_of_ruin: f64,
    pub tracking_error: f64,
    pub tracking_error_bps: f64,
}

/// Compute metrics for a completed replay.
///
/// `ruin_seed` keeps the risk-of-ruin bootstrap reproducible for a given
/// campaign.
pub fn compute_metrics(
    trades: &[Trade],
    equity_curve: &[EquityPoint],
    initial_capital: f64,
    final_equity: f64,
    ruin_seed: u64,
) -> BacktestMetrics {
    if trades.is_empty() {
        return BacktestMetrics::default();
    }

    let returns: Vec<f64> = trades.iter().map(|t| t.return_pct).collect();
    let total_return = (final_equity - initial_capital) / initial_capital * 100.0;

    let days = match (equity_curve.first(), equity_curve.last()) {
        (Some(first), Some(last)) => (last.time - first.time).num_days().max(1) as f64,
        _ => 1.0,
    };
    let years = days / 365.25;
    let cagr = if years > 0.0 && initial_capital > 0.0 && final_equity > 0.0 {
        ((final_equity / initial_capital).powf(1.0 / years) - 1.0) * 100.0
    } else {
        0.0
    };

    // Sharpe, annualized over 252 trading days
    let sharpe = if returns.len() > 1 {
        let mean = mean(&returns);
        let std = std_dev(&returns, mean);
        if std > 0.0 {
            mean / std * 252.0f64.sqrt()
        } else {
            0.0
        }
    } else {
        0.0
    };

    // Sortino over downside deviation only
    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    let sortino = if !downside.is_empty() && returns.len() > 1 {
        let downside_std = std_dev(&downside, mean(&downside));
        if downside_std > 0.0 {
            mean(&returns) / downside_std * 252.0f64.sqrt()
        } else {
            0.0
        }
    } else if sharpe > 0.0 {
        sharpe
    } else {
        0.0
    };

    let max_drawdown = max_drawdown_pct(equity_curve);

    let winning_trades = trades.iter().filter(|t| t.pnl > 0.0).count();
    let losing_trades = trades.iter().filter(|t| t.pnl < 0.0).count();
    let win_rate = winning_trades as f64 / trades.len() as f64 * 100.0;

    let gross_profit: f64 = trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).sum();
    let gross_loss: f64 = trades
        .iter()
        .filter(|t| t.pnl < 0.0)
        .map(|t| t.pnl.abs())
        .sum();
    let profit_factor = if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else {
        0.0
    };

    let avg_win = if winning_trades > 0 {
        gross_profit / winning_trades as f64
    } else {
        0.0
    };
    let avg_loss = if losing_trades > 0 {
        -gross_loss / losing_trades as f64
    } else {
        0.0
    };
    let win_prob = winning_trades as f64 / trades.len() as f64;
    let loss_prob = losing_trades as f64 / trades.len() as f64;
    let expectancy = avg_win * win_prob + avg_loss * loss_prob;

    let calmar = if max_drawdown > 0.0 { cagr / max_drawdown } else { 0.0 };

    let mut longest_losing_streak = 0usize;
    let mut current_streak = 0usize;
    for trade in trades {
        if trade.pnl < 0.0 {
            current_streak += 1;
            longest_losing_streak = longest_losing_streak.max(current_streak);
        } else {
            current_streak = 0;
        }
    }

    let trade_fractions: Vec<f64> = returns.iter().map(|r| r / 100.0).collect();
    let risk_of_ruin = monte_carlo_ruin(
        &trade_fractions,
        &RuinConfig {
            equity: initial_capital,
            n_paths: 1000,
            seed: ruin_seed,
            ..Default::default()
        },
    )
    .ruin_probability;

    BacktestMetrics {
        cagr,
        sharpe,
        sortino,
        max_drawdown,
        win_rate,
        profit_factor,
        expectancy,
        calmar,
        total_return,
        total_trades: trades.len(),
        winning_trades,
        losing_trades,
        longest_losing_streak,
        risk_of_ruin,
        tracking_error: 0.0,
        tracking_error_bps: 0.0,
    }
}

/// RMSE between the realistic and frictionless equity curves, aligned by
/// index. The guardrail checker rejects campaigns whose execution drifts
/// too far from theory.
pub fn tracking_error_rmse(realistic: &[EquityPoint], theoretical: &[EquityPoint]) -> f64 {
    let n = realistic.len().min(theoretical.len());
    if n == 0 {
        return 0.0;
    }
    let sum_sq: f64 = realistic
        .iter()
        .zip(theoretical)
        .take(n)
        .map(|(r, t)| (r.equity - t.equity).powi(2))
        .sum();
    (sum_sq / n as f64).sqrt()
}

pub fn max_drawdown_pct(equity_curve: &[EquityPoint]) -> f64 {
    let mut peak = f64::MIN;
    let mut max_dd = 0.0f64;
    for point in equity_curve {
        peak = peak.max(point.equity);
        if peak > 0.0 {
            max_dd = max_dd.max((peak - point.equity) / peak * 100.0);
        }
    }
    max_dd
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64], mean: f64) -> f64 {
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}
