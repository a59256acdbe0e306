//! Price history state container: ticker → time-ordered bars.

use super::{Gain, GainPeriod, PriceBar};
use crate::shared::Ticker;
use std::collections::HashMap;

/// Bars back from the latest used for [`GainPeriod::Weekly`].
const WEEKLY_LOOKBACK: usize = 5;

/// Live price history for every subscribed ticker.
///
/// Series are kept in feed emission order; the last bar is the latest.
/// A stored series is never empty.
#[derive(Debug, Clone, Default)]
pub struct HistoryStore {
    data: HashMap<Ticker, Vec<PriceBar>>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole series for `ticker`.
    ///
    /// An empty `bars` leaves the store untouched and returns `false`.
    pub fn replace(&mut self, ticker: Ticker, bars: Vec<PriceBar>) -> bool {
        if bars.is_empty() {
            return false;
        }
        self.data.insert(ticker, bars);
        true
    }

    /// Keep only series whose ticker satisfies `keep`; returns the evicted tickers.
    pub fn retain(&mut self, mut keep: impl FnMut(&Ticker) -> bool) -> Vec<Ticker> {
        let evicted: Vec<Ticker> = self.data.keys().filter(|t| !keep(t)).cloned().collect();
        for ticker in &evicted {
            self.data.remove(ticker);
        }
        evicted
    }

    pub fn series(&self, ticker: &Ticker) -> Option<&[PriceBar]> {
        self.data.get(ticker).map(Vec::as_slice)
    }

    pub fn latest(&self, ticker: &Ticker) -> Option<&PriceBar> {
        self.data.get(ticker).and_then(|bars| bars.last())
    }

    pub fn contains(&self, ticker: &Ticker) -> bool {
        self.data.contains_key(ticker)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Gain for `ticker` over `period`, measured against the latest close.
    pub fn gain(&self, ticker: &Ticker, period: GainPeriod) -> Option<Gain> {
        let bars = self.data.get(ticker)?;
        let latest = bars.last()?;
        let base = match period {
            GainPeriod::Daily => latest.open,
            GainPeriod::Weekly => match bars.len().checked_sub(WEEKLY_LOOKBACK + 1) {
                Some(idx) => bars[idx].close,
                None => bars[0].open,
            },
            GainPeriod::AllTime => bars[0].open,
        };
        Gain::between(base, latest.close)
    }

    /// Owned copy of every series, for handing to a UI layer.
    pub fn to_map(&self) -> HashMap<Ticker, Vec<PriceBar>> {
        self.data.clone()
    }
}
