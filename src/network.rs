//! Network defaults for the QuantPulse feed.

/// Default WebSocket URL of the feed server.
pub const DEFAULT_WS_URL: &str = "ws://localhost:8000/ws";

/// Environment variable overriding [`DEFAULT_WS_URL`].
pub const WS_URL_ENV: &str = "QUANTPULSE_WS_URL";

/// Environment variable overriding the requested bar period.
pub const PERIOD_ENV: &str = "QUANTPULSE_PERIOD";
