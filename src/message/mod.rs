// src/message/mod.rs

pub mod kind;
pub mod reply;
pub mod request;

pub use kind::{IncomingMessageId, OutgoingMessageId};
pub use reply::{
  CurrentTime, ErrorMessage, ManagedAccounts, NextValidOrderId, OrderStatus, Reply, ServerTime, TickPrice, TickSize,
  UnknownReply,
};
pub use request::Request;
