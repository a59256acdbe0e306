//! Price history domain: OHLCV bars, per-ticker series, gain calculations.

mod convert;
pub mod state;
pub mod wire;

use crate::shared::Ticker;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use state::HistoryStore;

/// One OHLCV observation for a ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    /// Period label as sent by the feed (e.g. `"2024-01-01"`).
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    #[serde(default)]
    pub sma: Vec<f64>,
    #[serde(default)]
    pub rsi: Vec<f64>,
}

impl PriceBar {
    /// Percentage move from open to close within this bar.
    pub fn gain_pct(&self) -> Option<f64> {
        Gain::between(self.open, self.close).map(|g| g.pct)
    }

    pub fn gain(&self) -> Option<Gain> {
        Gain::between(self.open, self.close)
    }
}

/// A decoded update frame.
///
/// `data` holds normalized tickers in ascending order, each with the bars the
/// feed sent for it.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateMessage {
    /// Pass-through message tag (`"update"` from the current feed).
    pub kind: String,
    pub data: Vec<(Ticker, Vec<PriceBar>)>,
}

// ─── Gain ────────────────────────────────────────────────────────────────────

/// Window a gain is measured over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum GainPeriod {
    /// Latest bar, open to close.
    #[default]
    Daily,
    /// Five bars back to the latest close.
    Weekly,
    /// First bar's open to the latest close.
    AllTime,
}

impl GainPeriod {
    pub const ALL: [GainPeriod; 3] = [GainPeriod::Daily, GainPeriod::Weekly, GainPeriod::AllTime];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Daily => "Daily",
            Self::Weekly => "Weekly",
            Self::AllTime => "All-Time",
        }
    }
}

/// Relative price change in percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gain {
    pub pct: f64,
}

impl Gain {
    /// Gain from `from` to `to`. `None` when the base price is not positive.
    pub fn between(from: f64, to: f64) -> Option<Self> {
        if from > 0.0 && from.is_finite() && to.is_finite() {
            Some(Self {
                pct: (to - from) / from * 100.0,
            })
        } else {
            None
        }
    }

    pub fn is_positive(&self) -> bool {
        self.pct >= 0.0
    }
}

impl fmt::Display for Gain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.is_positive() { "+" } else { "" };
        write!(f, "{sign}{:.2}%", self.pct)
    }
}
