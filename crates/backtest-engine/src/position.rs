use chrono::{DateTime, Utc};

use crate::models::Side;

/// Index into the position arena. Trades and ledger events reference
/// positions by id, never by pointer, so the object graph stays acyclic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PositionId(pub usize);

/// An open position's mutable lifecycle state.
#[derive(Debug, Clone)]
pub struct Position {
    pub side: Side,
    pub entry_time: DateTime<Utc>,
    pub entry_index: usize,
    pub entry_price: f64,
    pub qty: f64,
    pub initial_qty: f64,
    pub sl: f64,
    pub tp: f64,
    /// Stop as placed at entry; a tighter current stop means the trail or
    /// breakeven logic moved it.
    pub initial_sl: f64,
    /// Best price seen in the position's favor, drives the trailing stop.
    pub best_price: f64,
    /// Worst price seen against the position.
    pub worst_price: f64,
    pub breakeven_armed: bool,
    /// Partial take-profit rungs already consumed (indices into config).
    pub partials_taken: Vec<usize>,
}

impl Position {
    pub fn open(
        side: Side,
        entry_time: DateTime<Utc>,
        entry_index: usize,
        entry_price: f64,
        qty: f64,
        sl: f64,
        tp: f64,
    ) -> Self {
        Self {
            side,
            entry_time,
            entry_index,
            entry_price,
            qty,
            initial_qty: qty,
            sl,
            tp,
            initial_sl: sl,
            best_price: entry_price,
            worst_price: entry_price,
            breakeven_armed: false,
            partials_taken: Vec::new(),
        }
    }

    /// Track excursion extremes against this bar's range.
    pub fn observe_bar(&mut self, high: f64, low: f64) {
        match self.side {
            Side::Long => {
                self.best_price = self.best_price.max(high);
                self.worst_price = self.worst_price.min(low);
            }
            Side::Short => {
                self.best_price = self.best_price.min(low);
                self.worst_price = self.worst_price.max(high);
            }
        }
    }

    /// Maximum favorable excursion in percent of entry.
    pub fn mfe_pct(&self) -> f64 {
        match self.side {
            Side::Long => (self.best_price / self.entry_price - 1.0) * 100.0,
            Side::Short => (1.0 - self.best_price / self.entry_price) * 100.0,
        }
    }

    /// Maximum adverse excursion in percent of entry (reported negative).
    pub fn mae_pct(&self) -> f64 {
        match self.side {
            Side::Long => (self.worst_price / self.entry_price - 1.0) * 100.0,
            Side::Short => (1.0 - self.worst_price / self.entry_price) * 100.0,
        }
    }

    /// Ratchet the trailing stop from the best seen price; the stop only
    /// ever tightens.
    pub fn trail_stop(&mut self, trailing_pct: f64) {
        match self.side {
            Side::Long => {
                let candidate = self.best_price * (1.0 - trailing_pct);
                if candidate > self.sl {
                    self.sl = candidate;
                }
            }
            Side::Short => {
                let candidate = self.best_price * (1.0 + trailing_pct);
                if candidate < self.sl {
                    self.sl = candidate;
                }
            }
        }
    }

    /// Arm breakeven once MFE clears the trigger: the stop moves to entry
    /// and stays there.
    pub fn arm_breakeven(&mut self, trigger_pct: f64) {
        if self.breakeven_armed {
            return;
        }
        if self.mfe_pct() >= trigger_pct * 100.0 {
            self.breakeven_armed = true;
            match self.side {
                Side::Long => self.sl = self.sl.max(self.entry_price),
                Side::Short => self.sl = self.sl.min(self.entry_price),
            }
        }
    }

    pub fn pnl(&self, exit_price: f64, qty: f64) -> f64 {
        match self.side {
            Side::Long => (exit_price - self.entry_price) * qty,
            Side::Short => (self.entry_price - exit_price) * qty,
        }
    }

    pub fn return_pct(&self, exit_price: f64) -> f64 {
        match self.side {
            Side::Long => (exit_price / self.entry_price - 1.0) * 100.0,
            Side::Short => (1.0 - exit_price / self.entry_price) * 100.0,
        }
    }
}

/// Arena owning all positions ever opened in a replay. Closed positions
/// stay in place; `active` points at the single open position, enforcing
/// at most one open position per symbol.
#[derive(Debug, Default)]
pub struct PositionArena {
    positions: Vec<Position>,
    active: Option<PositionId>,
}

impl PositionArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, position: Position) -> Option<PositionId> {
        if self.active.is_some() {
            return None;
        }
        let id = PositionId(self.positions.len());
        self.positions.push(position);
        self.active = Some(id);
        Some(id)
    }

    pub fn active_id(&self) -> Option<PositionId> {
        self.active
    }

    pub fn active(&self) -> Option<&Position> {
        self.active.map(|id| &self.positions[id.0])
    }

    pub fn active_mut(&mut self) -> Option<&mut Position> {
        let id = self.active?;
        Some(&mut self.positions[id.0])
    }

    pub fn close_active(&mut self) -> Option<PositionId> {
        self.active.take()
    }

    pub fn get(&self, id: PositionId) -> Option<&Position> {
        self.positions.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
