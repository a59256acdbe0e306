//! WebSocket layer: messages, codec, transports, events.
//!
//! The transport is pluggable through [`transport::Connector`]:
//! - `ws-native` feature → `tokio-tungstenite` (native.rs)
//! - always available → in-process feed (memory.rs)
//!
//! This module defines the shared message/event/config types.

pub mod codec;
pub mod memory;
pub mod reconnect;
pub mod transport;

#[cfg(feature = "ws-native")]
pub mod native;

use crate::domain::price_history::wire::WsUpdate;
use crate::shared::{Period, Ticker};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use codec::{decode_text, decode_update, encode_subscription};
pub use reconnect::{BackoffConfig, BackoffStrategy, ExponentialBackoff, NoReconnect};

// ─── Outbound messages ───────────────────────────────────────────────────────

/// Subscription request sent from client to server.
///
/// Always carries the full desired ticker list, never a delta. An empty list
/// unsubscribes from everything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageOut {
    pub tickers: Vec<Ticker>,
    pub period: Period,
}

impl MessageOut {
    pub fn subscribe(tickers: &[Ticker], period: Period) -> Self {
        Self {
            tickers: tickers.to_vec(),
            period,
        }
    }
}

// ─── Inbound messages ────────────────────────────────────────────────────────

/// Raw inbound message from the server.
pub type MessageIn = WsUpdate;

// ─── Connection state ────────────────────────────────────────────────────────

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    #[default]
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Reconnecting = 3,
}

impl From<u8> for ConnectionState {
    fn from(v: u8) -> Self {
        match v {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Reconnecting,
            _ => Self::Disconnected,
        }
    }
}

// ─── WatchEvent ──────────────────────────────────────────────────────────────

/// Change notifications emitted by the watchlist client.
///
/// Each event is sent after the state it describes has been applied.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    /// Connection state transition.
    State(ConnectionState),
    /// The subscription set was replaced.
    TickersChanged(Vec<Ticker>),
    /// Series replaced by an inbound update.
    HistoryUpdated(Vec<Ticker>),
    /// Series purged because their tickers left the watchlist.
    Evicted(Vec<Ticker>),
    /// A non-fatal transport, send or decode problem.
    Diagnostic(String),
    /// Reconnection was abandoned after `attempts` tries.
    GaveUp { attempts: u32 },
}

// ─── Config ──────────────────────────────────────────────────────────────────

/// Configuration for the watchlist client.
#[derive(Debug, Clone)]
pub struct WsConfig {
    pub url: String,
    pub period: Period,
    /// Retry after a failed or dropped connection.
    pub reconnect: bool,
    pub backoff: BackoffConfig,
    pub connect_timeout: Duration,
    /// Drop the connection when no frame arrives within this window.
    pub idle_timeout: Option<Duration>,
    pub event_channel_capacity: usize,
    pub command_channel_capacity: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            url: crate::network::DEFAULT_WS_URL.to_string(),
            period: Period::default(),
            reconnect: true,
            backoff: BackoffConfig::default(),
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(90)),
            event_channel_capacity: 256,
            command_channel_capacity: 64,
        }
    }
}

impl WsConfig {
    /// Defaults overridden by `QUANTPULSE_WS_URL` / `QUANTPULSE_PERIOD` when set.
    pub fn from_env() -> Result<Self, crate::error::SdkError> {
        let mut config = Self::default();
        if let Ok(url) = std::env::var(crate::network::WS_URL_ENV) {
            if !url.trim().is_empty() {
                config.url = url.trim().to_string();
            }
        }
        if let Ok(period) = std::env::var(crate::network::PERIOD_ENV) {
            config.period = period.parse()?;
        }
        Ok(config)
    }

    /// The backoff strategy this config describes.
    pub fn backoff_strategy(&self) -> Box<dyn BackoffStrategy> {
        if self.reconnect {
            Box::new(ExponentialBackoff::new(self.backoff.clone()))
        } else {
            Box::new(NoReconnect)
        }
    }
}
