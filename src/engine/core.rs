// src/engine/core.rs

use crate::engine::{EngineShared, GatewayStream};
use crate::error::GatewayError;
use crate::message::{Reply, Request};
use crate::options::{EngineOptions, UnknownKindPolicy};
use crate::protocol::greeting::{Greeting, GREETING_LENGTH};
use crate::protocol::GatewayCodec;

use bytes::BytesMut;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::codec::Framed;

/// Runs the opening exchange on a freshly connected stream: greetings pass
/// raw in both directions, then the first frame must carry the gateway clock.
///
/// Bytes the gateway sends after its greeting already belong to framed
/// traffic and are handed over to the codec buffer.
pub(crate) async fn perform_handshake<S: GatewayStream>(
  framed: &mut Framed<S, GatewayCodec>,
  client_id: i32,
  dump: bool,
) -> Result<SystemTime, GatewayError> {
  // --- Greeting Exchange (raw stream access, the codec never sees these) ---
  let mut greeting_buf = BytesMut::with_capacity(GREETING_LENGTH);
  Greeting::encode(client_id, &mut greeting_buf);
  framed.get_mut().write_all(&greeting_buf).await?;
  framed.get_mut().flush().await?;
  if dump {
    tracing::debug!(target: "gatelink::dump", client_id, "-> greeting");
  }
  tracing::debug!(client_id, "Sent own greeting");

  let mut read_buf = BytesMut::with_capacity(GREETING_LENGTH * 2);
  let greeting = loop {
    if let Some(greeting) = Greeting::decode(&mut read_buf)? {
      break greeting;
    }
    let bytes_read = framed.get_mut().read_buf(&mut read_buf).await?;
    if bytes_read == 0 {
      tracing::error!("Connection closed during greeting exchange");
      return Err(GatewayError::ConnectionClosed);
    }
    tracing::trace!(bytes_read, "Read greeting bytes");
  };
  if dump {
    tracing::debug!(target: "gatelink::dump", version = greeting.version, "<- greeting");
  }
  tracing::debug!(version = greeting.version, "Received gateway greeting");

  if !read_buf.is_empty() {
    framed.read_buffer_mut().unsplit(read_buf);
  }

  // --- Opening server time ---
  match framed.next().await {
    Some(Ok(reply)) => {
      if dump {
        tracing::debug!(target: "gatelink::dump", kind = reply.code().0, reply = ?reply, "<- reply");
      }
      match reply {
        Reply::ServerTime(server_time) => Ok(server_time.timestamp),
        other => Err(GatewayError::ProtocolViolation(format!(
          "Expected server time to open the session, got kind {}",
          other.code()
        ))),
      }
    }
    Some(Err(e)) => Err(e),
    None => Err(GatewayError::ConnectionClosed),
  }
}

/// Engine task state for one gateway session, generic over the stream type.
///
/// Owns the framed transport and the receiving half of the request mailbox.
/// `run_loop` is the only entry point; it consumes the core and always
/// finishes by publishing a terminal state.
pub(crate) struct EngineCore<S: GatewayStream> {
  framed: Framed<S, GatewayCodec>,
  shared: Arc<EngineShared>,
  request_rx: async_channel::Receiver<Request>,
  delivery_timeout: Duration,
  unknown_kind_policy: UnknownKindPolicy,
  dump: bool,
}

impl<S: GatewayStream> EngineCore<S> {
  pub fn new(
    framed: Framed<S, GatewayCodec>,
    shared: Arc<EngineShared>,
    request_rx: async_channel::Receiver<Request>,
    options: &EngineOptions,
  ) -> Self {
    Self {
      framed,
      shared,
      request_rx,
      delivery_timeout: options.delivery_timeout,
      unknown_kind_policy: options.unknown_kind_policy,
      dump: options.dump_conversation,
    }
  }

  pub async fn run_loop(self) {
    let EngineCore {
      mut framed,
      shared,
      request_rx,
      delivery_timeout,
      unknown_kind_policy,
      dump,
    } = self;
    let uri = shared.endpoint.clone();
    tracing::info!(uri = %uri, "Gateway engine task started");

    let mut stop_requested = false;
    let mut fatal: Option<GatewayError> = None;

    loop {
      tokio::select! {
        biased; // Check for a stop request before handling more traffic

        _ = shared.stop_notify.notified() => {
          tracing::debug!(uri = %uri, "Engine observed stop request");
          stop_requested = true;
          break;
        }

        request = request_rx.recv() => {
          match request {
            Ok(request) => {
              if dump {
                tracing::debug!(target: "gatelink::dump", kind = request.code().0, request = ?request, "-> request");
              }
              if let Err(e) = framed.send(request).await {
                tracing::error!(uri = %uri, error = %e, "Failed to send request to gateway");
                fatal = Some(e);
                break;
              }
            }
            Err(_) => {
              // Every handle dropped; same orderly path as stop().
              tracing::debug!(uri = %uri, "Request mailbox closed, stopping engine");
              stop_requested = true;
              break;
            }
          }
        }

        frame = framed.next() => {
          match frame {
            Some(Ok(reply)) => {
              if dump {
                tracing::debug!(target: "gatelink::dump", kind = reply.code().0, reply = ?reply, "<- reply");
              }
              let unknown_kind = match &reply {
                Reply::Unknown(raw) => Some(raw.wire_kind),
                _ => None,
              };
              // Delivery completes before the next frame is decoded, which
              // keeps every subscriber's view in arrival order.
              shared.dispatcher.dispatch(&reply, delivery_timeout).await;
              if let Some(wire_kind) = unknown_kind {
                if unknown_kind_policy == UnknownKindPolicy::Fatal {
                  fatal = Some(GatewayError::ProtocolViolation(format!(
                    "Unknown message kind {wire_kind}"
                  )));
                  break;
                }
                tracing::debug!(uri = %uri, wire_kind, "Delivered reply of unknown kind");
              }
            }
            Some(Err(e)) => {
              tracing::error!(uri = %uri, error = %e, "Failed to read gateway frame");
              fatal = Some(e);
              break;
            }
            None => {
              // EOF is orderly only when we asked for it.
              if shared.stop_flag.load(Ordering::Acquire) {
                tracing::debug!(uri = %uri, "Gateway stream closed after stop request");
                stop_requested = true;
              } else {
                tracing::warn!(uri = %uri, "Gateway closed the connection unexpectedly");
                fatal = Some(GatewayError::ConnectionClosed);
              }
              break;
            }
          }
        }
      }
    }

    // --- Cleanup ---
    // Transport goes down first, then the mailbox stops accepting requests
    // from handles that raced the shutdown, then the terminal state is
    // published and the subscription registry drained.
    let _ = framed.close().await;
    request_rx.close();

    match fatal {
      Some(error) => {
        tracing::info!(uri = %uri, error = %error, "Gateway engine stopped on failure");
        shared.state.exit_error(error, delivery_timeout).await;
      }
      None => {
        debug_assert!(stop_requested);
        tracing::info!(uri = %uri, "Gateway engine stopped");
        shared.state.exit_normal(delivery_timeout).await;
      }
    }
    shared.dispatcher.close();
  }
}
