use crate::types::{Bar, Direction, EquityPoint, ExitReason, Trade};

/// Single-position account used by the backtester.
///
/// `balance` is the realised account value (initial capital plus closed P&L
/// minus fees); equity adds the open position's unrealised P&L.
pub struct Portfolio {
    pub initial_capital: f64,
    pub balance: f64,
    pub commission: f64,
    pub position_fraction: f64,
    pub position: Option<OpenPosition>,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,

    // P&L and drawdown tracking
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub total_pnl: f64,
    pub fees_paid: f64,
    pub peak_equity: f64,
    pub max_drawdown: f64,
    pub current_drawdown: f64,
}

pub struct OpenPosition {
    pub direction: Direction,
    pub entry_bar: usize,
    pub entry_time: chrono::DateTime<chrono::Utc>,
    pub entry_price: f64,
    pub size: f64,
    pub entry_fee: f64,
}

impl OpenPosition {
    /// Direction-adjusted fractional move from the entry price
    pub fn return_at(&self, price: f64) -> f64 {
        let change = (price - self.entry_price) / self.entry_price;
        match self.direction {
            Direction::Long => change,
            Direction::Short => -change,
        }
    }

    fn pnl_at(&self, price: f64) -> f64 {
        match self.direction {
            Direction::Long => (price - self.entry_price) * self.size,
            Direction::Short => (self.entry_price - price) * self.size,
        }
    }
}

impl Portfolio {
    pub fn new(initial_capital: f64, commission: f64, position_fraction: f64) -> Self {
        Self {
            initial_capital,
            balance: initial_capital,
            commission,
            position_fraction,
            position: None,
            trades: Vec::new(),
            equity_curve: Vec::new(),
            realized_pnl: 0.0,
            unrealized_pnl: 0.0,
            total_pnl: 0.0,
            fees_paid: 0.0,
            peak_equity: initial_capital,
            max_drawdown: 0.0,
            current_drawdown: 0.0,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.position.is_none()
    }

    pub fn direction(&self) -> Option<Direction> {
        self.position.as_ref().map(|p| p.direction)
    }

    /// Open at `bar.close`, sizing the position as a fraction of equity.
    /// Non-positive prices or an exhausted account leave the portfolio flat.
    pub fn open_position(&mut self, index: usize, bar: &Bar, direction: Direction, fraction: f64) {
        let price = bar.close;
        let capital = self.equity() * fraction;
        if price <= 0.0 || capital <= 0.0 || !capital.is_finite() {
            log::debug!("Skipping entry at bar {}: price {}, capital {}", index, price, capital);
            return;
        }

        let size = capital / price;
        let fee = size * price * self.commission;
        self.balance -= fee;
        self.fees_paid += fee;

        self.position = Some(OpenPosition {
            direction,
            entry_bar: index,
            entry_time: bar.timestamp,
            entry_price: price,
            size,
            entry_fee: fee,
        });
    }

    pub fn close_position(&mut self, index: usize, bar: &Bar, reason: ExitReason) {
        if let Some(pos) = self.position.take() {
            let price = bar.close;
            let pnl = pos.pnl_at(price);
            let exit_fee = pos.size * price * self.commission;

            self.balance += pnl - exit_fee;
            self.realized_pnl += pnl;
            self.fees_paid += exit_fee;

            self.trades.push(Trade {
                entry_bar: pos.entry_bar,
                exit_bar: index,
                entry_time: pos.entry_time,
                exit_time: bar.timestamp,
                entry_price: pos.entry_price,
                exit_price: price,
                direction: pos.direction,
                size: pos.size,
                profit: pnl - pos.entry_fee - exit_fee,
                exit_reason: reason,
                fees: pos.entry_fee + exit_fee,
            });
        }
        self.unrealized_pnl = 0.0;
        self.total_pnl = self.realized_pnl;
    }

    /// Close the open position when its return breaches a stop or target.
    /// A zero threshold disables that check.
    pub fn check_risk_exits(&mut self, index: usize, bar: &Bar, stop_loss: f64, take_profit: f64) -> bool {
        let reason = match &self.position {
            Some(pos) => {
                let ret = pos.return_at(bar.close);
                if stop_loss > 0.0 && ret <= -stop_loss {
                    Some(ExitReason::StopLoss)
                } else if take_profit > 0.0 && ret >= take_profit {
                    Some(ExitReason::TakeProfit)
                } else {
                    None
                }
            }
            None => None,
        };

        match reason {
            Some(reason) => {
                self.close_position(index, bar, reason);
                true
            }
            None => false,
        }
    }

    /// Mark the open position to `bar.close` and record an equity point
    pub fn mark_to_market(&mut self, bar: &Bar) {
        self.calculate_unrealized_pnl(bar.close);
        self.update_drawdown();
        self.equity_curve.push(EquityPoint {
            timestamp: bar.timestamp,
            equity: self.equity(),
        });
    }

    pub fn calculate_unrealized_pnl(&mut self, current_price: f64) {
        self.unrealized_pnl = self
            .position
            .as_ref()
            .map(|p| p.pnl_at(current_price))
            .unwrap_or(0.0);
        self.total_pnl = self.realized_pnl + self.unrealized_pnl;
    }

    pub fn equity(&self) -> f64 {
        self.balance + self.unrealized_pnl
    }

    pub fn update_drawdown(&mut self) {
        let current_equity = self.equity();

        if current_equity > self.peak_equity {
            self.peak_equity = current_equity;
        }

        if self.peak_equity > 0.0 {
            self.current_drawdown = (self.peak_equity - current_equity) / self.peak_equity;
            if self.current_drawdown > self.max_drawdown {
                self.max_drawdown = self.current_drawdown;
            }
        }
    }
}
