// src/engines/metrics/profitability.rs
use crate::engines::metrics::returns::safe_ratio;
use crate::types::Trade;

/// Trade-level statistics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfitabilityMetrics {
    pub num_trades: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub average_trade: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
}

impl ProfitabilityMetrics {
    pub fn calculate(trades: &[Trade]) -> Self {
        if trades.is_empty() {
            return Self {
                num_trades: 0,
                win_rate: f64::NAN,
                profit_factor: f64::NAN,
                average_trade: f64::NAN,
                largest_win: 0.0,
                largest_loss: 0.0,
                max_consecutive_wins: 0,
                max_consecutive_losses: 0,
            };
        }

        let gross_profit: f64 = trades.iter().filter(|t| t.profit > 0.0).map(|t| t.profit).sum();
        let gross_loss: f64 = trades.iter().filter(|t| t.profit < 0.0).map(|t| -t.profit).sum();
        let wins = trades.iter().filter(|t| t.profit > 0.0).count();
        let total: f64 = trades.iter().map(|t| t.profit).sum();

        let (max_consecutive_wins, max_consecutive_losses) = Self::streaks(trades);

        Self {
            num_trades: trades.len(),
            win_rate: wins as f64 / trades.len() as f64,
            profit_factor: safe_ratio(gross_profit, gross_loss),
            average_trade: total / trades.len() as f64,
            largest_win: trades.iter().map(|t| t.profit).fold(0.0, f64::max),
            largest_loss: trades.iter().map(|t| t.profit).fold(0.0, f64::min),
            max_consecutive_wins,
            max_consecutive_losses,
        }
    }

    /// Longest runs of winning and losing trades; a flat trade ends both
    fn streaks(trades: &[Trade]) -> (usize, usize) {
        let (mut wins, mut losses) = (0, 0);
        let (mut best_wins, mut best_losses) = (0, 0);

        for trade in trades {
            if trade.profit > 0.0 {
                wins += 1;
                losses = 0;
            } else if trade.profit < 0.0 {
                losses += 1;
                wins = 0;
            } else {
                wins = 0;
                losses = 0;
            }
            best_wins = best_wins.max(wins);
            best_losses = best_losses.max(losses);
        }

        (best_wins, best_losses)
    }
}
