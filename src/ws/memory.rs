//! In-process transport: a feed server living in the same process.
//!
//! [`MemoryConnector`] hands out connections; the paired [`MemoryFeed`]
//! accepts them as [`MemoryPeer`]s that can push frames to the client and
//! read what it sent. Used by tests and offline demos.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use futures_util::future::{self, BoxFuture};
use tokio::sync::mpsc;

use crate::domain::price_history::wire::{WsPriceBar, WsUpdate};
use crate::domain::price_history::PriceBar;
use crate::error::WsError;
use crate::shared::Ticker;
use crate::ws::transport::{CloseInfo, Connection, Connector, Frame};
use crate::ws::MessageOut;

/// Client-side half: plug into a watchlist client as its connector.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    accept_tx: mpsc::UnboundedSender<MemoryPeer>,
    refuse: Arc<AtomicU32>,
}

/// Server-side half: accepts connections opened through the paired connector.
#[derive(Debug)]
pub struct MemoryFeed {
    accept_rx: mpsc::UnboundedReceiver<MemoryPeer>,
    refuse: Arc<AtomicU32>,
}

/// One accepted connection, seen from the feed's side.
#[derive(Debug)]
pub struct MemoryPeer {
    pub url: String,
    to_client: mpsc::UnboundedSender<Result<Frame, WsError>>,
    from_client: mpsc::UnboundedReceiver<Frame>,
}

impl MemoryConnector {
    /// Create a connector and the feed that serves it.
    pub fn pair() -> (MemoryConnector, MemoryFeed) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        let refuse = Arc::new(AtomicU32::new(0));
        (
            MemoryConnector {
                accept_tx,
                refuse: Arc::clone(&refuse),
            },
            MemoryFeed { accept_rx, refuse },
        )
    }

    fn open(&self, url: &str) -> Result<Connection, WsError> {
        let refused = self
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(WsError::ConnectionFailed("connection refused".into()));
        }

        let (to_client, client_rx) = mpsc::unbounded_channel();
        let (client_tx, from_client) = mpsc::unbounded_channel();
        self.accept_tx
            .send(MemoryPeer {
                url: url.to_string(),
                to_client,
                from_client,
            })
            .map_err(|_| WsError::ConnectionFailed("feed is offline".into()))?;

        let sink = futures_util::sink::unfold(
            client_tx,
            |tx: mpsc::UnboundedSender<Frame>, frame: Frame| async move {
                tx.send(frame)
                    .map_err(|_| WsError::SendFailed("feed closed the connection".into()))?;
                Ok::<_, WsError>(tx)
            },
        );
        let stream = futures_util::stream::unfold(client_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        Ok(Connection::new(Box::pin(sink), Box::pin(stream)))
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<Connection, WsError>> {
        Box::pin(future::ready(self.open(url)))
    }
}

impl MemoryFeed {
    /// Wait for the next client connection.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accept_rx.recv().await
    }

    /// Refuse the next `n` connection attempts.
    pub fn refuse_next(&self, n: u32) {
        self.refuse.store(n, Ordering::SeqCst);
    }
}

impl MemoryPeer {
    pub fn send(&self, frame: Frame) -> Result<(), WsError> {
        self.to_client
            .send(Ok(frame))
            .map_err(|_| WsError::NotConnected)
    }

    pub fn send_text(&self, text: impl Into<String>) -> Result<(), WsError> {
        self.send(Frame::Text(text.into()))
    }

    pub fn send_binary(&self, data: impl Into<Vec<u8>>) -> Result<(), WsError> {
        self.send(Frame::Binary(data.into()))
    }

    /// Send an `"update"` frame carrying `bars` for each ticker.
    pub fn send_update(&self, entries: &[(Ticker, Vec<PriceBar>)]) -> Result<(), WsError> {
        let update = WsUpdate {
            kind: "update".to_string(),
            data: entries
                .iter()
                .map(|(ticker, bars)| {
                    (
                        ticker.to_string(),
                        bars.iter().map(WsPriceBar::from).collect(),
                    )
                })
                .collect(),
        };
        let text = serde_json::to_string(&update).map_err(|e| WsError::Protocol(e.to_string()))?;
        self.send_text(text)
    }

    /// Close from the feed side with a close frame.
    pub fn close(&self, code: u16, reason: &str) -> Result<(), WsError> {
        self.send(Frame::Close(Some(CloseInfo {
            code,
            reason: reason.to_string(),
        })))
    }

    /// Make the client's next read fail with `err`.
    pub fn fail(&self, err: WsError) -> Result<(), WsError> {
        self.to_client.send(Err(err)).map_err(|_| WsError::NotConnected)
    }

    /// Next frame the client sent, `None` once the client side is gone.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.from_client.recv().await
    }

    /// Next subscription request the client sent, skipping other frames.
    pub async fn recv_subscription(&mut self) -> Option<MessageOut> {
        while let Some(frame) = self.recv().await {
            if let Frame::Text(text) = frame {
                match serde_json::from_str::<MessageOut>(&text) {
                    Ok(msg) => return Some(msg),
                    Err(e) => tracing::debug!("Feed ignoring non-subscription frame: {}", e),
                }
            }
        }
        None
    }
}
