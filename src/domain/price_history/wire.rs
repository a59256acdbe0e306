//! Wire types for price history (WS).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single OHLCV bar as the feed sends it.
///
/// Field names are the feed's capitalized keys. Unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsPriceBar {
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Open")]
    pub open: f64,
    #[serde(rename = "High")]
    pub high: f64,
    #[serde(rename = "Low")]
    pub low: f64,
    #[serde(rename = "Close")]
    pub close: f64,
    #[serde(rename = "Volume")]
    pub volume: i64,
    /// Simple moving average computed by the feed's indicator worker.
    #[serde(rename = "SMA", default, skip_serializing_if = "Vec::is_empty")]
    pub sma: Vec<f64>,
    /// Relative strength index computed by the feed's indicator worker.
    #[serde(rename = "RSI", default, skip_serializing_if = "Vec::is_empty")]
    pub rsi: Vec<f64>,
}

/// WS price history update: ticker → bars.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsUpdate {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: HashMap<String, Vec<WsPriceBar>>,
}
