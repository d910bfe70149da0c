// src/message/reply.rs

use crate::error::GatewayError;
use crate::message::kind::IncomingMessageId;
use bytes::Bytes;
use std::time::{Duration, SystemTime};

/// Gateway clock value, sent once right after the greeting exchange.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServerTime {
  pub timestamp: SystemTime,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickPrice {
  pub ticker_id: i64,
  pub field: i32,
  pub price: f64,
  pub size: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickSize {
  pub ticker_id: i64,
  pub field: i32,
  pub size: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderStatus {
  pub order_id: i64,
  pub status: String,
  pub filled: i64,
  pub remaining: i64,
  pub avg_fill_price: f64,
}

/// Gateway-side error or warning tied to a request id (or `-1` for
/// session-level notices).
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorMessage {
  pub id: i64,
  pub code: i64,
  pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NextValidOrderId {
  pub order_id: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ManagedAccounts {
  pub accounts: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurrentTime {
  pub timestamp: SystemTime,
}

/// A structurally sound frame whose kind this build does not recognize.
/// The raw wire kind and payload are kept for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownReply {
  pub wire_kind: u16,
  pub payload: Bytes,
}

/// One decoded gateway reply.
///
/// Closed set: the decoder maps every intact frame to exactly one variant,
/// with [`Reply::Unknown`] absorbing kinds added on the gateway side after
/// this build. Cloning is cheap; payloads are small scalars or `Bytes`.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Reply {
  ServerTime(ServerTime),
  TickPrice(TickPrice),
  TickSize(TickSize),
  OrderStatus(OrderStatus),
  ErrorMessage(ErrorMessage),
  NextValidOrderId(NextValidOrderId),
  ManagedAccounts(ManagedAccounts),
  CurrentTime(CurrentTime),
  Unknown(UnknownReply),
}

impl Reply {
  /// Kind discriminant used for subscription matching.
  ///
  /// `Unknown` replies report [`IncomingMessageId::UNKNOWN`] here no matter
  /// what their wire kind was; the raw kind stays available on the variant.
  pub fn code(&self) -> IncomingMessageId {
    match self {
      Reply::ServerTime(_) => IncomingMessageId::SERVER_TIME,
      Reply::TickPrice(_) => IncomingMessageId::TICK_PRICE,
      Reply::TickSize(_) => IncomingMessageId::TICK_SIZE,
      Reply::OrderStatus(_) => IncomingMessageId::ORDER_STATUS,
      Reply::ErrorMessage(_) => IncomingMessageId::ERROR_MESSAGE,
      Reply::NextValidOrderId(_) => IncomingMessageId::NEXT_VALID_ORDER_ID,
      Reply::ManagedAccounts(_) => IncomingMessageId::MANAGED_ACCOUNTS,
      Reply::CurrentTime(_) => IncomingMessageId::CURRENT_TIME,
      Reply::Unknown(_) => IncomingMessageId::UNKNOWN,
    }
  }

  /// Parses a frame payload according to its wire kind.
  ///
  /// Unknown kinds are preserved rather than rejected. A malformed payload
  /// for a known kind is a protocol violation: field alignment with the
  /// gateway is lost and nothing after it can be trusted.
  pub(crate) fn parse(wire_kind: u16, payload: Bytes) -> Result<Reply, GatewayError> {
    let mut fields = Fields::new(&payload);
    let reply = match IncomingMessageId(wire_kind) {
      IncomingMessageId::SERVER_TIME => Reply::ServerTime(ServerTime {
        timestamp: fields.next_timestamp()?,
      }),
      IncomingMessageId::TICK_PRICE => Reply::TickPrice(TickPrice {
        ticker_id: fields.next_i64()?,
        field: fields.next_i32()?,
        price: fields.next_f64()?,
        size: fields.next_i64()?,
      }),
      IncomingMessageId::TICK_SIZE => Reply::TickSize(TickSize {
        ticker_id: fields.next_i64()?,
        field: fields.next_i32()?,
        size: fields.next_i64()?,
      }),
      IncomingMessageId::ORDER_STATUS => Reply::OrderStatus(OrderStatus {
        order_id: fields.next_i64()?,
        status: fields.next_str()?.to_string(),
        filled: fields.next_i64()?,
        remaining: fields.next_i64()?,
        avg_fill_price: fields.next_f64()?,
      }),
      IncomingMessageId::ERROR_MESSAGE => Reply::ErrorMessage(ErrorMessage {
        id: fields.next_i64()?,
        code: fields.next_i64()?,
        message: fields.next_str()?.to_string(),
      }),
      IncomingMessageId::NEXT_VALID_ORDER_ID => Reply::NextValidOrderId(NextValidOrderId {
        order_id: fields.next_i64()?,
      }),
      IncomingMessageId::MANAGED_ACCOUNTS => Reply::ManagedAccounts(ManagedAccounts {
        // One comma-separated field, e.g. "DU123456,DU123457"
        accounts: fields
          .next_str()?
          .split(',')
          .filter(|a| !a.is_empty())
          .map(str::to_string)
          .collect(),
      }),
      IncomingMessageId::CURRENT_TIME => Reply::CurrentTime(CurrentTime {
        timestamp: fields.next_timestamp()?,
      }),
      _ => return Ok(Reply::Unknown(UnknownReply { wire_kind, payload })),
    };
    // Trailing fields are ignored; gateways append fields to existing kinds
    // over time and old clients are expected to keep working.
    Ok(reply)
  }
}

/// Cursor over a payload's NUL-terminated ASCII fields.
struct Fields<'a> {
  rest: &'a [u8],
}

impl<'a> Fields<'a> {
  fn new(payload: &'a [u8]) -> Self {
    Self { rest: payload }
  }

  fn next_str(&mut self) -> Result<&'a str, GatewayError> {
    let end = self
      .rest
      .iter()
      .position(|&b| b == 0)
      .ok_or_else(|| GatewayError::ProtocolViolation("Unterminated payload field".into()))?;
    let (field, rest) = self.rest.split_at(end);
    self.rest = &rest[1..]; // Skip the NUL terminator
    std::str::from_utf8(field)
      .map_err(|_| GatewayError::ProtocolViolation("Payload field is not valid UTF-8".into()))
  }

  fn next_i32(&mut self) -> Result<i32, GatewayError> {
    let field = self.next_str()?;
    field
      .parse()
      .map_err(|_| GatewayError::ProtocolViolation(format!("Expected integer field, got {:?}", field)))
  }

  fn next_i64(&mut self) -> Result<i64, GatewayError> {
    let field = self.next_str()?;
    field
      .parse()
      .map_err(|_| GatewayError::ProtocolViolation(format!("Expected integer field, got {:?}", field)))
  }

  fn next_f64(&mut self) -> Result<f64, GatewayError> {
    let field = self.next_str()?;
    field
      .parse()
      .map_err(|_| GatewayError::ProtocolViolation(format!("Expected decimal field, got {:?}", field)))
  }

  /// Unix seconds as a decimal field.
  fn next_timestamp(&mut self) -> Result<SystemTime, GatewayError> {
    let secs = self.next_i64()?;
    let secs = u64::try_from(secs)
      .map_err(|_| GatewayError::ProtocolViolation(format!("Timestamp field out of range: {}", secs)))?;
    Ok(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
  }
}
