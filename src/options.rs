// src/options.rs

use std::time::Duration;

/// Conventional local paper-trading gateway address.
pub const DEFAULT_GATEWAY: &str = "127.0.0.1:4002";

/// Connection options for [`crate::Engine::connect`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
  /// Gateway endpoint as `host:port`, with an optional `tcp://` prefix.
  pub gateway: String,
  /// Client id announced in the connection greeting. The gateway uses it to
  /// tell concurrent clients apart.
  pub client_id: i32,
  /// Mirror every greeting, request, and reply crossing the wire to the
  /// `gatelink::dump` log target at debug level.
  pub dump_conversation: bool,
  /// Bound on the TCP connect.
  pub connect_timeout: Duration,
  /// Bound on the greeting exchange plus the opening server-time frame.
  pub handshake_timeout: Duration,
  /// Grace period for one delivery to one subscriber. A subscriber that
  /// cannot accept a reply or state change within this window is evicted and
  /// its channel closed.
  pub delivery_timeout: Duration,
  /// What to do with intact frames whose kind this build does not know.
  pub unknown_kind_policy: UnknownKindPolicy,
  pub tcp_nodelay: bool,
  /// Keepalive probe idle time; `None` leaves the system default.
  pub tcp_keepalive: Option<Duration>,
}

impl Default for EngineOptions {
  fn default() -> Self {
    Self {
      gateway: DEFAULT_GATEWAY.to_string(),
      client_id: 0,
      dump_conversation: false,
      connect_timeout: Duration::from_secs(10),
      handshake_timeout: Duration::from_secs(10),
      delivery_timeout: Duration::from_secs(1),
      unknown_kind_policy: UnknownKindPolicy::Deliver,
      tcp_nodelay: true, // Latency-sensitive protocol, small frames
      tcp_keepalive: None,
    }
  }
}

/// Policy for structurally sound frames with an unrecognized kind.
///
/// Gateways grow new reply kinds over time; older clients keep seeing frames
/// they cannot classify. Either way the frame is delivered to all-kinds
/// subscribers as [`crate::Reply::Unknown`] first, so the consumer can log
/// what arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownKindPolicy {
  /// Keep the session alive. The default.
  #[default]
  Deliver,
  /// Treat the frame as a protocol violation and shut the session down.
  Fatal,
}
