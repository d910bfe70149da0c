//! gatelink - An asynchronous trading-gateway client engine built on Tokio.

pub mod dispatch;
pub mod engine;
pub mod error;
pub mod message;
pub mod options;
pub mod protocol;
pub mod state;
pub mod transport;

// Re-export core types for user convenience
pub use dispatch::{ReplyReceiver, ReplySender, SubscriptionId};
pub use engine::Engine;
pub use error::{FatalError, GatewayError};
pub use message::{IncomingMessageId, OutgoingMessageId, Reply, Request};
pub use options::{EngineOptions, UnknownKindPolicy, DEFAULT_GATEWAY};
pub use state::{ConnectionState, StateReceiver};
