// src/state.rs

use crate::error::{FatalError, GatewayError};
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Lifecycle of the single gateway connection.
///
/// States only move forward: `Connecting` to `Ready` to one of the terminal
/// states. A terminal state is permanent for the life of the engine value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
  /// Transport connect and handshake in progress.
  Connecting = 0,
  /// Handshake complete, replies flowing.
  Ready = 1,
  /// Terminal: orderly shutdown via `stop()` or dropping every handle.
  ExitNormal = 2,
  /// Terminal: transport or protocol failure. `fatal_error()` holds why.
  ExitError = 3,
}

impl ConnectionState {
  pub fn is_terminal(self) -> bool {
    matches!(self, ConnectionState::ExitNormal | ConnectionState::ExitError)
  }

  fn from_u8(raw: u8) -> ConnectionState {
    match raw {
      0 => ConnectionState::Connecting,
      1 => ConnectionState::Ready,
      2 => ConnectionState::ExitNormal,
      _ => ConnectionState::ExitError,
    }
  }
}

// Type aliases for the channels used for state-change subscriptions
pub type StateSender = async_channel::Sender<ConnectionState>;
pub type StateReceiver = async_channel::Receiver<ConnectionState>;

/// Tracks the connection lifecycle and fans transitions out to subscribers.
///
/// Transitions are driven by the constructor and the read-loop task only.
/// Accessors never suspend: `current` is an atomic load, `fatal_error` copies
/// an `Arc` under a short parking_lot lock.
#[derive(Debug)]
pub(crate) struct StateMachine {
  current: AtomicU8,
  fatal: Mutex<Option<FatalError>>,
  subscribers: Mutex<Vec<StateSender>>,
}

impl StateMachine {
  pub fn new() -> Self {
    Self {
      current: AtomicU8::new(ConnectionState::Connecting as u8),
      fatal: Mutex::new(None),
      subscribers: Mutex::new(Vec::new()),
    }
  }

  pub fn current(&self) -> ConnectionState {
    ConnectionState::from_u8(self.current.load(Ordering::Acquire))
  }

  /// The error behind `ExitError`, `None` in every other state.
  pub fn fatal_error(&self) -> Option<FatalError> {
    self.fatal.lock().clone()
  }

  /// Registers a subscriber for transitions happening after this call.
  ///
  /// The current state is never replayed. Once terminal, the sender is
  /// dropped on the spot so the caller's channel closes without deliveries.
  pub fn subscribe(&self, sender: StateSender) {
    let mut subs = self.subscribers.lock();
    if self.current().is_terminal() {
      return;
    }
    subs.push(sender);
  }

  pub async fn ready(&self, grace: Duration) {
    self.transition(ConnectionState::Ready, None, grace).await;
  }

  pub async fn exit_normal(&self, grace: Duration) {
    self.transition(ConnectionState::ExitNormal, None, grace).await;
  }

  pub async fn exit_error(&self, error: GatewayError, grace: Duration) {
    self
      .transition(ConnectionState::ExitError, Some(Arc::new(error)), grace)
      .await;
  }

  /// Publishes a transition and delivers it to every subscriber.
  ///
  /// No-op once terminal, which is what makes duplicate terminal requests
  /// (a stop racing a transport error, say) collapse into one transition.
  /// The fatal slot is written before the state value becomes visible, so a
  /// reader that observes `ExitError` always finds the error populated.
  async fn transition(&self, next: ConnectionState, fatal: Option<FatalError>, grace: Duration) {
    let senders: Vec<StateSender> = {
      let mut subs = self.subscribers.lock();
      if self.current().is_terminal() {
        tracing::debug!(requested = ?next, "Ignoring state transition, already terminal");
        return;
      }
      if let Some(err) = fatal {
        *self.fatal.lock() = Some(err);
      }
      self.current.store(next as u8, Ordering::Release);
      if next.is_terminal() {
        // Take the registry: the dropped senders close subscriber channels
        // once the deliveries below finish.
        std::mem::take(&mut *subs)
      } else {
        subs.clone()
      }
    };

    tracing::debug!(state = ?next, subscribers = senders.len(), "Connection state changed");
    if senders.is_empty() {
      return;
    }

    // Deliver outside the lock, concurrently, each send bounded by the grace
    // period so one stuck subscriber cannot wedge the engine.
    let deliveries = senders.iter().map(|sender| async move {
      match timeout(grace, sender.send(next)).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => tracing::warn!(state = ?next, "State subscriber channel closed"),
        Err(_) => tracing::warn!(state = ?next, grace = ?grace, "State subscriber too slow, delivery skipped"),
      }
    });
    join_all(deliveries).await;
  }
}
