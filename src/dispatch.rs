// src/dispatch.rs

use crate::message::{IncomingMessageId, Reply};
use futures::future::join_all;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::timeout;

// Type aliases for the channels used for reply subscriptions
pub type ReplySender = async_channel::Sender<Reply>;
pub type ReplyReceiver = async_channel::Receiver<Reply>;

// Default capacity for subscription channels created by the engine handle
pub const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 100;

/// Opaque handle identifying one reply subscription.
///
/// Channels have no usable identity in Rust, so `subscribe` hands out ids
/// from a counter and `unsubscribe` takes them back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(usize);

#[derive(Debug)]
struct ReplySubscription {
  id: SubscriptionId,
  sender: ReplySender,
  /// `None` subscribes to every kind, unknown replies included.
  kinds: Option<HashSet<IncomingMessageId>>,
}

impl ReplySubscription {
  fn matches(&self, kind: IncomingMessageId) -> bool {
    match &self.kinds {
      None => true,
      Some(set) => set.contains(&kind),
    }
  }
}

/// Fans decoded replies out to matching subscribers.
///
/// The registry lock is held only to snapshot or mutate registrations, never
/// during a delivery.
#[derive(Debug, Default)]
pub(crate) struct ReplyDispatcher {
  subscriptions: RwLock<Vec<ReplySubscription>>,
  next_id: AtomicUsize,
  closed: AtomicBool,
}

impl ReplyDispatcher {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers a subscriber. An empty `kinds` slice subscribes to every
  /// reply. After terminal teardown the sender is dropped immediately so the
  /// caller's channel closes instead of idling forever.
  pub fn subscribe(&self, sender: ReplySender, kinds: &[IncomingMessageId]) -> SubscriptionId {
    let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
    let kinds = if kinds.is_empty() {
      None
    } else {
      Some(kinds.iter().copied().collect())
    };

    let mut subs = self.subscriptions.write();
    if self.closed.load(Ordering::Acquire) {
      tracing::debug!(sub_id = id.0, "Subscription after teardown, dropping sender");
      return id;
    }
    subs.push(ReplySubscription { id, sender, kinds });
    tracing::trace!(sub_id = id.0, "Reply subscription added");
    id
  }

  /// Removes a registration. Unknown or already-removed ids are ignored.
  /// Deliveries already queued on the subscriber's channel stay there.
  pub fn unsubscribe(&self, id: SubscriptionId) {
    let mut subs = self.subscriptions.write();
    if let Some(pos) = subs.iter().position(|s| s.id == id) {
      subs.swap_remove(pos);
      tracing::trace!(sub_id = id.0, "Reply subscription removed");
    }
  }

  /// Delivers one reply to every matching subscriber, concurrently.
  ///
  /// Each delivery is bounded by `grace`. A subscriber whose channel is
  /// closed, or that cannot accept the reply in time, is evicted afterwards;
  /// eviction drops its sender, which closes the channel and tells the
  /// consumer it fell behind.
  pub async fn dispatch(&self, reply: &Reply, grace: Duration) {
    let kind = reply.code();
    let matching: Vec<(SubscriptionId, ReplySender)> = {
      let subs = self.subscriptions.read();
      subs
        .iter()
        .filter(|s| s.matches(kind))
        .map(|s| (s.id, s.sender.clone()))
        .collect()
    };
    if matching.is_empty() {
      tracing::trace!(kind = kind.0, "No subscribers for reply");
      return;
    }

    let sends = matching.into_iter().map(|(id, sender)| {
      let reply = reply.clone();
      async move {
        match timeout(grace, sender.send(reply)).await {
          Ok(Ok(())) => None,
          Ok(Err(_)) => Some((id, "closed")),
          Err(_) => Some((id, "stalled")),
        }
      }
    });

    let failed: Vec<(SubscriptionId, &str)> = join_all(sends).await.into_iter().flatten().collect();
    if failed.is_empty() {
      return;
    }

    let mut subs = self.subscriptions.write();
    for (id, reason) in failed {
      if let Some(pos) = subs.iter().position(|s| s.id == id) {
        subs.swap_remove(pos);
        tracing::warn!(sub_id = id.0, kind = kind.0, reason, "Evicted reply subscriber");
      }
    }
  }

  /// Drops every registration. Part of terminal teardown; idempotent.
  pub fn close(&self) {
    let mut subs = self.subscriptions.write();
    self.closed.store(true, Ordering::Release);
    if !subs.is_empty() {
      tracing::debug!(count = subs.len(), "Dropping reply subscriptions");
    }
    subs.clear();
  }
}
