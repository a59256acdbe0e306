//! Feed codec: subscription encoding and update decoding.

use crate::domain::price_history::UpdateMessage;
use crate::error::{DecodeError, SdkError};
use crate::shared::{Period, Ticker};
use crate::ws::{MessageIn, MessageOut};

/// Encode the full subscription as the outbound JSON text frame.
pub fn encode_subscription(tickers: &[Ticker], period: Period) -> Result<String, SdkError> {
    Ok(serde_json::to_string(&MessageOut::subscribe(tickers, period))?)
}

/// Decode and validate an inbound frame payload.
///
/// Binary frames are expected to carry UTF-8 JSON.
pub fn decode_update(bytes: &[u8]) -> Result<UpdateMessage, DecodeError> {
    decode_text(std::str::from_utf8(bytes)?)
}

/// Decode and validate an inbound text frame.
pub fn decode_text(text: &str) -> Result<UpdateMessage, DecodeError> {
    let raw: MessageIn = serde_json::from_str(text)?;
    UpdateMessage::try_from(raw)
}
