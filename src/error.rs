//! Unified SDK error types.

use thiserror::Error;

/// Top-level SDK error.
#[derive(Error, Debug)]
pub enum SdkError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] WsError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// WebSocket transport errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WsError {
    #[error("Not connected")]
    NotConnected,

    #[error("No tokio runtime available to drive the connection")]
    NoRuntime,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Connection closed: code={code:?} reason={reason}")]
    Closed { code: Option<u16>, reason: String },

    #[error("Protocol error: {0}")]
    Protocol(String),
}

#[cfg(feature = "ws-native")]
impl From<tokio_tungstenite::tungstenite::Error> for WsError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error;
        match err {
            Error::ConnectionClosed => WsError::Closed {
                code: Some(1000),
                reason: "Connection closed normally".to_string(),
            },
            Error::AlreadyClosed => WsError::NotConnected,
            Error::Io(e) => WsError::ConnectionFailed(e.to_string()),
            Error::Url(e) => WsError::ConnectionFailed(format!("Invalid URL: {e}")),
            Error::Http(resp) => WsError::ConnectionFailed(format!("HTTP error: {:?}", resp.status())),
            other => WsError::Protocol(other.to_string()),
        }
    }
}

/// Errors raised while decoding an inbound feed frame.
///
/// A decode error drops the offending frame only; the connection stays up.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Frame is not valid UTF-8: {0}")]
    InvalidUtf8(String),

    #[error("Malformed update: {0}")]
    Json(String),

    #[error("Invalid bar #{index} for {ticker}: {reason}")]
    InvalidBar {
        ticker: String,
        index: usize,
        reason: String,
    },

    #[error("Invalid ticker key: {0:?}")]
    InvalidTicker(String),

    #[error("Ticker {0} appears under more than one key")]
    DuplicateTicker(String),
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        DecodeError::Json(err.to_string())
    }
}

impl From<std::str::Utf8Error> for DecodeError {
    fn from(err: std::str::Utf8Error) -> Self {
        DecodeError::InvalidUtf8(err.to_string())
    }
}
