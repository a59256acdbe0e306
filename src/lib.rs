//! # QuantPulse
//!
//! Rust client for the QuantPulse watchlist feed: keep a list of stock
//! tickers subscribed over a WebSocket and an always-current OHLCV history
//! for each of them.
//!
//! ## Architecture
//!
//! The crate is organized in layers:
//!
//! 1. **Core**: Ticker/period newtypes, price bars, gains, watch state
//! 2. **WebSocket**: Wire codec, pluggable transports (`tokio-tungstenite` / in-memory), backoff
//! 3. **High-Level Client**: `WatchlistClient`, the sync engine tying both together
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use quantpulse::prelude::*;
//!
//! let mut client = WatchlistClient::new(WsConfig::from_env()?);
//! client.set_tickers(["AAPL", "GOOGL", "MSFT", "TSLA"]);
//! client.connect()?;
//!
//! // later, after a HistoryUpdated event
//! let bar = client.latest("AAPL");
//! let weekly = client.gain("AAPL", GainPeriod::Weekly);
//! ```

// ── Layer 1: Core ────────────────────────────────────────────────────────────

/// Shared newtypes: tickers and bar periods.
pub mod shared;

/// Domain modules: price history and the watchlist state.
pub mod domain;

/// Error types.
pub mod error;

/// Network defaults.
pub mod network;

// ── Layer 2: WebSocket ───────────────────────────────────────────────────────

/// WebSocket layer: messages, codec, transports, events.
pub mod ws;

// ── Layer 3: High-Level Client ───────────────────────────────────────────────

/// `WatchlistClient`: the primary entry point.
pub mod client;

// ── Prelude ──────────────────────────────────────────────────────────────────

pub mod prelude {
    // Shared newtypes
    pub use crate::shared::{Period, Ticker};

    // Domain types
    pub use crate::domain::price_history::{
        Gain, GainPeriod, HistoryStore, PriceBar, UpdateMessage,
    };
    pub use crate::domain::watchlist::{SubscriptionSet, TickerChange, WatchState};

    // Errors
    pub use crate::error::{DecodeError, SdkError, WsError};

    // Network
    pub use crate::network::DEFAULT_WS_URL;

    // WebSocket types
    pub use crate::ws::memory::{MemoryConnector, MemoryFeed, MemoryPeer};
    pub use crate::ws::transport::{Connector, Frame};
    pub use crate::ws::{
        BackoffConfig, BackoffStrategy, ConnectionState, MessageOut, WatchEvent, WsConfig,
    };

    // Client
    pub use crate::client::WatchlistClient;
}
