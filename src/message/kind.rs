// src/message/kind.rs

use std::fmt;

/// Wire discriminant of a reply received from the gateway.
///
/// The raw value is stable across releases; subscription filters and log
/// output both use it. Kind `0` is reserved for replies the decoder could
/// not classify and is never sent by the gateway itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IncomingMessageId(pub u16);

impl IncomingMessageId {
  /// Reserved marker for unclassifiable replies.
  pub const UNKNOWN: IncomingMessageId = IncomingMessageId(0);
  /// Gateway clock sent once to complete the handshake.
  pub const SERVER_TIME: IncomingMessageId = IncomingMessageId(1);
  pub const TICK_PRICE: IncomingMessageId = IncomingMessageId(2);
  pub const TICK_SIZE: IncomingMessageId = IncomingMessageId(3);
  pub const ORDER_STATUS: IncomingMessageId = IncomingMessageId(4);
  pub const ERROR_MESSAGE: IncomingMessageId = IncomingMessageId(5);
  pub const NEXT_VALID_ORDER_ID: IncomingMessageId = IncomingMessageId(6);
  pub const MANAGED_ACCOUNTS: IncomingMessageId = IncomingMessageId(7);
  pub const CURRENT_TIME: IncomingMessageId = IncomingMessageId(8);
}

impl fmt::Display for IncomingMessageId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Wire discriminant of a request sent to the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutgoingMessageId(pub u16);

impl OutgoingMessageId {
  pub const REQUEST_CURRENT_TIME: OutgoingMessageId = OutgoingMessageId(1);
  pub const REQUEST_MARKET_DATA: OutgoingMessageId = OutgoingMessageId(2);
  pub const CANCEL_MARKET_DATA: OutgoingMessageId = OutgoingMessageId(3);
}

impl fmt::Display for OutgoingMessageId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}
