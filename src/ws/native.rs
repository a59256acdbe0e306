//! Native WebSocket transport: `tokio-tungstenite`.

use futures_util::future::{self, BoxFuture};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use crate::error::WsError;
use crate::ws::transport::{CloseInfo, Connection, Connector, Frame};

/// Connects to the feed over TCP/TLS with `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeConnector;

impl Connector for NativeConnector {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<Connection, WsError>> {
        let url = url.to_string();
        Box::pin(async move {
            let (ws_stream, _) = connect_async(url).await?;
            let (sink, stream) = ws_stream.split();

            let sink = sink
                .sink_map_err(WsError::from)
                .with(|frame: Frame| future::ready(Ok::<_, WsError>(to_message(frame))));
            let stream = stream.filter_map(|msg| {
                future::ready(match msg {
                    Ok(msg) => from_message(msg).map(Ok),
                    Err(e) => Some(Err(WsError::from(e))),
                })
            });

            Ok(Connection::new(Box::pin(sink), Box::pin(stream)))
        })
    }
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(data) => Message::Binary(data.into()),
        Frame::Ping(data) => Message::Ping(data.into()),
        Frame::Pong(data) => Message::Pong(data.into()),
        Frame::Close(info) => Message::Close(info.map(|info| CloseFrame {
            code: CloseCode::from(info.code),
            reason: info.reason.into(),
        })),
    }
}

/// Raw `Message::Frame` values never surface while reading; they map to `None`.
fn from_message(msg: Message) -> Option<Frame> {
    match msg {
        Message::Text(text) => Some(Frame::Text(text.to_string())),
        Message::Binary(data) => Some(Frame::Binary(data.to_vec())),
        Message::Ping(data) => Some(Frame::Ping(data.to_vec())),
        Message::Pong(data) => Some(Frame::Pong(data.to_vec())),
        Message::Close(frame) => Some(Frame::Close(frame.map(|f| CloseInfo {
            code: f.code.into(),
            reason: f.reason.to_string(),
        }))),
        Message::Frame(_) => None,
    }
}
