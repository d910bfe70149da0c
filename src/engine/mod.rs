// src/engine/mod.rs

mod core;

use crate::dispatch::{
  ReplyDispatcher, ReplyReceiver, SubscriptionId, DEFAULT_SUBSCRIPTION_CAPACITY,
};
use crate::error::{FatalError, GatewayError};
use crate::message::{IncomingMessageId, Request};
use crate::options::EngineOptions;
use crate::protocol::GatewayCodec;
use crate::state::{ConnectionState, StateMachine, StateReceiver};
use crate::transport;

use self::core::{perform_handshake, EngineCore};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Notify;
use tokio::time::timeout;
use tokio_util::codec::Framed;

/// Streams the engine can drive. Blanket-implemented so tests can swap the
/// TCP transport for in-memory duplex pipes.
pub(crate) trait GatewayStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> GatewayStream for T {}

/// Requests queued ahead of the writer before `send` starts failing.
const REQUEST_MAILBOX_CAPACITY: usize = 128;

/// State shared between every `Engine` handle and the engine task.
#[derive(Debug)]
pub(crate) struct EngineShared {
  pub(crate) endpoint: String,
  pub(crate) client_id: i32,
  pub(crate) server_time: SystemTime,
  pub(crate) state: StateMachine,
  pub(crate) dispatcher: ReplyDispatcher,
  pub(crate) stop_flag: AtomicBool,
  pub(crate) stop_notify: Notify,
}

/// Handle to one live gateway session.
///
/// `connect` dials the gateway, completes the opening exchange and spawns the
/// engine task that owns the socket from then on. The handle is cheap to
/// clone; clones share the session. Dropping every handle closes the request
/// mailbox, which the engine task treats like [`Engine::stop`].
#[derive(Clone)]
pub struct Engine {
  shared: Arc<EngineShared>,
  request_tx: async_channel::Sender<Request>,
}

impl Engine {
  /// Establishes a session with the gateway named in `options`.
  ///
  /// Returns once the connection is `Ready`: the TCP stream is up, greetings
  /// were exchanged and the gateway announced its clock. On any failure the
  /// error is returned directly and nothing keeps running.
  pub async fn connect(options: EngineOptions) -> Result<Self, GatewayError> {
    let endpoint = options.gateway.clone();
    tracing::info!(uri = %endpoint, client_id = options.client_id, "Connecting to gateway");

    let stream = transport::connect(&options).await?;
    let mut framed = Framed::new(stream, GatewayCodec::new());

    let handshake = perform_handshake(&mut framed, options.client_id, options.dump_conversation);
    let server_time = match timeout(options.handshake_timeout, handshake).await {
      Ok(Ok(timestamp)) => timestamp,
      Ok(Err(e)) => {
        tracing::error!(uri = %endpoint, error = %e, "Gateway handshake failed");
        return Err(e);
      }
      Err(_) => {
        tracing::error!(uri = %endpoint, "Gateway handshake timed out");
        return Err(GatewayError::Timeout);
      }
    };

    let (request_tx, request_rx) = async_channel::bounded(REQUEST_MAILBOX_CAPACITY);
    let shared = Arc::new(EngineShared {
      endpoint: endpoint.clone(),
      client_id: options.client_id,
      server_time,
      state: StateMachine::new(),
      dispatcher: ReplyDispatcher::new(),
      stop_flag: AtomicBool::new(false),
      stop_notify: Notify::new(),
    });

    // Ready is published before the engine task exists, so no reply can be
    // observed ahead of it.
    shared.state.ready(options.delivery_timeout).await;
    tokio::spawn(EngineCore::new(framed, shared.clone(), request_rx, &options).run_loop());

    tracing::info!(uri = %endpoint, server_time = ?server_time, "Gateway connection ready");
    Ok(Engine { shared, request_tx })
  }

  /// Current lifecycle state of the connection.
  pub fn state(&self) -> ConnectionState {
    self.shared.state.current()
  }

  /// The error that drove the connection into `ExitError`, if it is there.
  pub fn fatal_error(&self) -> Option<FatalError> {
    self.shared.state.fatal_error()
  }

  /// Gateway clock reading captured during the opening exchange.
  pub fn server_time(&self) -> SystemTime {
    self.shared.server_time
  }

  /// Client id this session presented in its greeting.
  pub fn client_id(&self) -> i32 {
    self.shared.client_id
  }

  /// Endpoint this session dialed.
  pub fn endpoint(&self) -> &str {
    &self.shared.endpoint
  }

  /// Requests an orderly shutdown. Idempotent; the session lands in
  /// `ExitNormal` unless a failure got there first. Returns without waiting
  /// for the engine task, watch [`Engine::subscribe_state`] for the terminal
  /// transition.
  pub fn stop(&self) {
    if self
      .shared
      .stop_flag
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_ok()
    {
      tracing::debug!(uri = %self.shared.endpoint, "Stop requested");
      // notify_one stores a permit, so a stop ahead of the engine task's
      // first poll is not lost.
      self.shared.stop_notify.notify_one();
    }
  }

  /// Registers for lifecycle transitions that happen after this call.
  ///
  /// The current state is not replayed; read [`Engine::state`] for that. On a
  /// connection already in a terminal state the returned channel is closed.
  pub fn subscribe_state(&self) -> StateReceiver {
    let (tx, rx) = async_channel::bounded(DEFAULT_SUBSCRIPTION_CAPACITY);
    self.shared.state.subscribe(tx);
    rx
  }

  /// Registers a reply subscription. `kinds` filters delivery to the listed
  /// message kinds; an empty slice subscribes to every reply.
  pub fn subscribe(&self, kinds: &[IncomingMessageId]) -> (SubscriptionId, ReplyReceiver) {
    self.subscribe_with_capacity(kinds, DEFAULT_SUBSCRIPTION_CAPACITY)
  }

  /// `subscribe` with an explicit channel capacity. A subscriber that lets
  /// its channel fill up stalls delivery for the grace period and is then
  /// evicted, so size the capacity to the burstiness of the kinds requested.
  pub fn subscribe_with_capacity(
    &self,
    kinds: &[IncomingMessageId],
    capacity: usize,
  ) -> (SubscriptionId, ReplyReceiver) {
    let (tx, rx) = async_channel::bounded(capacity.max(1)); // Ensure capacity is at least 1.
    let id = self.shared.dispatcher.subscribe(tx, kinds);
    (id, rx)
  }

  /// Removes a reply subscription. Delivery stops once the engine task
  /// observes the removal; frames already handed to the channel stay there.
  pub fn unsubscribe(&self, id: SubscriptionId) {
    self.shared.dispatcher.unsubscribe(id)
  }

  /// Queues a request for the gateway. Waits while the mailbox is full and
  /// fails once the session has stopped.
  pub async fn send(&self, request: Request) -> Result<(), GatewayError> {
    self
      .request_tx
      .send(request)
      .await
      .map_err(|_| GatewayError::InvalidState("Engine is stopped"))
  }
}

impl fmt::Debug for Engine {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Engine")
      .field("endpoint", &self.shared.endpoint)
      .field("client_id", &self.shared.client_id)
      .field("state", &self.state())
      .finish_non_exhaustive()
  }
}
