//! Watchlist domain: the ordered set of tickers the user wants streamed.

pub mod state;

use crate::shared::{normalize_tickers, Ticker};

pub use state::{TickerChange, WatchState};

/// Tickers currently desired by the user.
///
/// Insertion order is preserved for display; duplicates are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSet {
    tickers: Vec<Ticker>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from raw input, normalizing and de-duplicating.
    pub fn from_raw<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            tickers: normalize_tickers(raw),
        }
    }

    /// Replace the set in full. Returns whether the contents changed.
    pub fn replace(&mut self, next: SubscriptionSet) -> bool {
        if *self == next {
            return false;
        }
        *self = next;
        true
    }

    pub fn contains(&self, ticker: &Ticker) -> bool {
        self.tickers.contains(ticker)
    }

    pub fn as_slice(&self) -> &[Ticker] {
        &self.tickers
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ticker> {
        self.tickers.iter()
    }

    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }

    /// The set with `ticker` appended (no-op when already present).
    pub fn with(&self, ticker: Ticker) -> Self {
        let mut tickers = self.tickers.clone();
        if !tickers.contains(&ticker) {
            tickers.push(ticker);
        }
        Self { tickers }
    }

    /// The set without `ticker`.
    pub fn without(&self, ticker: &Ticker) -> Self {
        Self {
            tickers: self.tickers.iter().filter(|t| *t != ticker).cloned().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a SubscriptionSet {
    type Item = &'a Ticker;
    type IntoIter = std::slice::Iter<'a, Ticker>;

    fn into_iter(self) -> Self::IntoIter {
        self.tickers.iter()
    }
}
