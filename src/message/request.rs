// src/message/request.rs

use crate::message::kind::OutgoingMessageId;
use bytes::{BufMut, BytesMut};

/// One request the engine can send to the gateway.
///
/// Requests are fire-and-forget at this layer; the gateway answers through
/// the ordinary reply stream (for example [`super::reply::CurrentTime`] for
/// [`Request::CurrentTime`]).
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Request {
  /// Ask the gateway for its current clock.
  CurrentTime,
  /// Start streaming market data for a symbol under a caller-chosen ticker id.
  MarketData { ticker_id: i64, symbol: String },
  /// Stop a market data stream started with the same ticker id.
  CancelMarketData { ticker_id: i64 },
}

impl Request {
  /// Wire kind written into the frame header.
  pub fn code(&self) -> OutgoingMessageId {
    match self {
      Request::CurrentTime => OutgoingMessageId::REQUEST_CURRENT_TIME,
      Request::MarketData { .. } => OutgoingMessageId::REQUEST_MARKET_DATA,
      Request::CancelMarketData { .. } => OutgoingMessageId::CANCEL_MARKET_DATA,
    }
  }

  /// Writes the NUL-terminated field payload for this request.
  pub(crate) fn encode_payload(&self, dst: &mut BytesMut) {
    match self {
      Request::CurrentTime => {}
      Request::MarketData { ticker_id, symbol } => {
        put_field(dst, &ticker_id.to_string());
        put_field(dst, symbol);
      }
      Request::CancelMarketData { ticker_id } => {
        put_field(dst, &ticker_id.to_string());
      }
    }
  }
}

fn put_field(dst: &mut BytesMut, field: &str) {
  dst.reserve(field.len() + 1);
  dst.put_slice(field.as_bytes());
  dst.put_u8(0);
}
