//! Watch state: subscription set and price history under one owner.
//!
//! Every mutation goes through a `&mut WatchState`, so holding the one lock
//! around it serializes ticker changes against inbound merges.

use super::SubscriptionSet;
use crate::domain::price_history::{Gain, GainPeriod, HistoryStore, PriceBar, UpdateMessage};
use crate::shared::{Period, Ticker};

/// Outcome of a subscription change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickerChange {
    /// Whether the subscription set differs from before.
    pub changed: bool,
    /// The full set after the change.
    pub tickers: Vec<Ticker>,
    /// History entries purged because their ticker left the set.
    pub evicted: Vec<Ticker>,
}

/// Subscription set, requested period and history for one client.
#[derive(Debug, Clone, Default)]
pub struct WatchState {
    subscriptions: SubscriptionSet,
    period: Period,
    history: HistoryStore,
}

impl WatchState {
    pub fn new(period: Period) -> Self {
        Self {
            period,
            ..Self::default()
        }
    }

    /// Replace the subscription set in full and purge history for tickers
    /// that are no longer wanted.
    pub fn set_tickers<I, S>(&mut self, raw: I) -> TickerChange
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.apply(SubscriptionSet::from_raw(raw))
    }

    pub fn add_ticker(&mut self, raw: &str) -> TickerChange {
        match Ticker::parse(raw) {
            Some(ticker) => self.apply(self.subscriptions.with(ticker)),
            None => self.unchanged(),
        }
    }

    pub fn remove_ticker(&mut self, raw: &str) -> TickerChange {
        match Ticker::parse(raw) {
            Some(ticker) => self.apply(self.subscriptions.without(&ticker)),
            None => self.unchanged(),
        }
    }

    fn apply(&mut self, next: SubscriptionSet) -> TickerChange {
        let changed = self.subscriptions.replace(next);
        let subscriptions = &self.subscriptions;
        let evicted = self.history.retain(|ticker| subscriptions.contains(ticker));
        TickerChange {
            changed,
            tickers: self.subscriptions.as_slice().to_vec(),
            evicted,
        }
    }

    fn unchanged(&self) -> TickerChange {
        TickerChange {
            changed: false,
            tickers: self.subscriptions.as_slice().to_vec(),
            evicted: Vec::new(),
        }
    }

    /// Merge an inbound update: each subscribed ticker's series is replaced
    /// by the bars received. Bars for unsubscribed tickers are dropped.
    ///
    /// Returns the tickers whose series changed.
    pub fn merge(&mut self, update: UpdateMessage) -> Vec<Ticker> {
        let mut applied = Vec::new();
        for (ticker, bars) in update.data {
            if !self.subscriptions.contains(&ticker) {
                tracing::debug!("Dropping {} bar(s) for unsubscribed {}", bars.len(), ticker);
                continue;
            }
            if self.history.replace(ticker.clone(), bars) {
                applied.push(ticker);
            }
        }
        applied
    }

    /// Returns whether the period changed.
    pub fn set_period(&mut self, period: Period) -> bool {
        std::mem::replace(&mut self.period, period) != period
    }

    pub fn period(&self) -> Period {
        self.period
    }

    pub fn subscriptions(&self) -> &SubscriptionSet {
        &self.subscriptions
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn latest(&self, ticker: &Ticker) -> Option<&PriceBar> {
        self.history.latest(ticker)
    }

    pub fn series(&self, ticker: &Ticker) -> Option<&[PriceBar]> {
        self.history.series(ticker)
    }

    pub fn gain(&self, ticker: &Ticker, period: GainPeriod) -> Option<Gain> {
        self.history.gain(ticker, period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> Ticker {
        Ticker::parse(s).unwrap()
    }

    fn bars(n: usize) -> Vec<PriceBar> {
        (0..n)
            .map(|i| PriceBar {
                date: format!("2024-01-{:02}", i + 1),
                open: 10.0,
                high: 11.0,
                low: 9.0,
                close: 10.5,
                volume: 100,
                sma: Vec::new(),
                rsi: Vec::new(),
            })
            .collect()
    }

    fn update(entries: Vec<(&str, usize)>) -> UpdateMessage {
        UpdateMessage {
            kind: "update".to_string(),
            data: entries.into_iter().map(|(s, n)| (t(s), bars(n))).collect(),
        }
    }

    fn names(state: &WatchState) -> Vec<&str> {
        state.subscriptions().iter().map(Ticker::as_str).collect()
    }

    #[test]
    fn test_set_tickers_normalizes() {
        let mut state = WatchState::default();
        let change = state.set_tickers(["aapl", "AAPL", " tsla "]);
        assert!(change.changed);
        assert_eq!(names(&state), vec!["AAPL", "TSLA"]);
    }

    #[test]
    fn test_remove_absent_ticker_is_noop() {
        let mut state = WatchState::default();
        state.set_tickers(["AAPL"]);
        state.merge(update(vec![("AAPL", 2)]));

        let change = state.remove_ticker("TSLA");
        assert!(!change.changed);
        assert!(change.evicted.is_empty());
        assert_eq!(names(&state), vec!["AAPL"]);
        assert_eq!(state.series(&t("AAPL")).unwrap().len(), 2);
    }

    #[test]
    fn test_remove_ticker_evicts_history() {
        let mut state = WatchState::default();
        state.set_tickers(["AAPL", "TSLA"]);
        state.merge(update(vec![("AAPL", 1), ("TSLA", 1)]));

        let change = state.remove_ticker("tsla");
        assert!(change.changed);
        assert_eq!(change.evicted, vec![t("TSLA")]);
        assert!(state.latest(&t("TSLA")).is_none());
    }

    #[test]
    fn test_set_tickers_evicts_dropped() {
        let mut state = WatchState::default();
        state.set_tickers(["AAPL", "TSLA"]);
        state.merge(update(vec![("AAPL", 1), ("TSLA", 1)]));

        let change = state.set_tickers(["MSFT", "AAPL"]);
        assert_eq!(change.evicted, vec![t("TSLA")]);
        assert_eq!(names(&state), vec!["MSFT", "AAPL"]);
        assert!(state.history().contains(&t("AAPL")));
    }

    // Updates replace a ticker's series; they do not append to it.
    #[test]
    fn test_merge_replaces_series() {
        let mut state = WatchState::default();
        state.set_tickers(["AAPL"]);
        state.merge(update(vec![("AAPL", 5)]));
        state.merge(update(vec![("AAPL", 3)]));
        assert_eq!(state.series(&t("AAPL")).unwrap().len(), 3);
    }

    #[test]
    fn test_merge_ignores_removed_ticker() {
        let mut state = WatchState::default();
        state.set_tickers(["AAPL", "TSLA"]);
        state.remove_ticker("TSLA");

        let applied = state.merge(update(vec![("AAPL", 1), ("TSLA", 4)]));
        assert_eq!(applied, vec![t("AAPL")]);
        assert!(!state.history().contains(&t("TSLA")));
    }

    #[test]
    fn test_add_existing_ticker_is_noop() {
        let mut state = WatchState::default();
        state.set_tickers(["AAPL"]);
        assert!(!state.add_ticker(" aapl").changed);
        assert!(state.add_ticker("msft").changed);
        assert_eq!(names(&state), vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn test_blank_ticker_ignored() {
        let mut state = WatchState::default();
        assert!(!state.add_ticker("  ").changed);
        assert!(state.subscriptions().is_empty());
    }

    #[test]
    fn test_set_period() {
        let mut state = WatchState::new(Period::Month1);
        assert!(!state.set_period(Period::Month1));
        assert!(state.set_period(Period::Year1));
        assert_eq!(state.period(), Period::Year1);
    }
}
