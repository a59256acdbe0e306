//! Transport abstraction: what the connection task needs from a socket.

use std::pin::Pin;

use futures_util::future::BoxFuture;
use futures_util::{Sink, Stream};

use crate::error::WsError;

/// A WebSocket frame, independent of the underlying library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close(Option<CloseInfo>),
}

/// Close code and reason carried by a close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

impl CloseInfo {
    pub fn normal(reason: impl Into<String>) -> Self {
        Self {
            code: 1000,
            reason: reason.into(),
        }
    }
}

pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = WsError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, WsError>> + Send>>;

/// An open connection, split into its write and read halves.
pub struct Connection {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Connection {
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }
}

/// Opens connections to a feed endpoint.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<Connection, WsError>>;
}
