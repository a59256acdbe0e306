//! Wire → domain conversions with validation.

use super::wire::{WsPriceBar, WsUpdate};
use super::{PriceBar, UpdateMessage};
use crate::error::DecodeError;
use crate::shared::Ticker;

impl PriceBar {
    pub(crate) fn try_from_wire(
        ticker: &str,
        index: usize,
        bar: WsPriceBar,
    ) -> Result<Self, DecodeError> {
        let invalid = |reason: String| DecodeError::InvalidBar {
            ticker: ticker.to_string(),
            index,
            reason,
        };

        for (name, value) in [
            ("Open", bar.open),
            ("High", bar.high),
            ("Low", bar.low),
            ("Close", bar.close),
        ] {
            if !value.is_finite() {
                return Err(invalid(format!("{name} is not finite")));
            }
        }
        let volume = u64::try_from(bar.volume)
            .map_err(|_| invalid(format!("negative Volume {}", bar.volume)))?;

        Ok(Self {
            date: bar.date,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume,
            sma: bar.sma,
            rsi: bar.rsi,
        })
    }
}

impl TryFrom<WsUpdate> for UpdateMessage {
    type Error = DecodeError;

    fn try_from(wire: WsUpdate) -> Result<Self, Self::Error> {
        let mut data = Vec::with_capacity(wire.data.len());
        for (raw_ticker, bars) in wire.data {
            let ticker =
                Ticker::parse(&raw_ticker).ok_or(DecodeError::InvalidTicker(raw_ticker.clone()))?;
            let bars = bars
                .into_iter()
                .enumerate()
                .map(|(index, bar)| PriceBar::try_from_wire(ticker.as_str(), index, bar))
                .collect::<Result<Vec<_>, _>>()?;
            data.push((ticker, bars));
        }
        // HashMap order is arbitrary; keep merges deterministic.
        data.sort_by(|a, b| a.0.cmp(&b.0));
        if let Some(pair) = data.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(DecodeError::DuplicateTicker(pair[0].0.to_string()));
        }

        Ok(Self {
            kind: wire.kind,
            data,
        })
    }
}

impl From<&PriceBar> for WsPriceBar {
    fn from(bar: &PriceBar) -> Self {
        Self {
            date: bar.date.clone(),
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: i64::try_from(bar.volume).unwrap_or(i64::MAX),
            sma: bar.sma.clone(),
            rsi: bar.rsi.clone(),
        }
    }
}
