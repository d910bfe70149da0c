// tests/lifecycle.rs

use gatelink::{ConnectionState, GatewayError, Request};
use std::time::Duration;
use tokio::io::AsyncReadExt;
mod common;

const LONG_TIMEOUT: Duration = Duration::from_secs(2);

const SERVER_TIME_SECS: u64 = 1_700_000_000;

// --- Test: racing stops collapse into a single terminal transition ---
#[tokio::test]
async fn test_concurrent_stops_collapse_to_one_transition() {
  let (engine, _stream) = common::connected_engine(SERVER_TIME_SECS).await;
  let state_rx = engine.subscribe_state();

  let mut handles = Vec::new();
  for _ in 0..8 {
    let handle = engine.clone();
    handles.push(tokio::spawn(async move { handle.stop() }));
  }
  for handle in handles {
    handle.await.expect("stop task panicked");
  }

  let state = common::recv_timeout(&state_rx, LONG_TIMEOUT)
    .await
    .expect("terminal transition");
  assert_eq!(state, ConnectionState::ExitNormal);

  // Registry was drained on the terminal transition, so there is exactly one
  // delivery and then the channel closes
  assert!(state_rx.recv().await.is_err());
  assert!(engine.fatal_error().is_none());
}

// --- Test: clones are handles onto the same session ---
#[tokio::test]
async fn test_clones_share_the_session() {
  let (engine, _stream) = common::connected_engine(SERVER_TIME_SECS).await;
  let clone = engine.clone();

  assert_eq!(clone.endpoint(), engine.endpoint());
  assert_eq!(clone.client_id(), engine.client_id());

  let state_rx = engine.subscribe_state();
  clone.stop();
  common::wait_for_state(&state_rx, LONG_TIMEOUT, ConnectionState::ExitNormal)
    .await
    .expect("stop through the clone stops the original");
  assert_eq!(engine.state(), ConnectionState::ExitNormal);
}

// --- Test: send fails once the session has stopped ---
#[tokio::test]
async fn test_send_fails_after_stop() {
  let (engine, _stream) = common::connected_engine(SERVER_TIME_SECS).await;
  let state_rx = engine.subscribe_state();

  engine.stop();
  common::wait_for_state(&state_rx, LONG_TIMEOUT, ConnectionState::ExitNormal)
    .await
    .expect("ExitNormal after stop");

  match engine.send(Request::CurrentTime).await {
    Err(GatewayError::InvalidState(_)) => {}
    other => panic!("Expected InvalidState, got {:?}", other),
  }
}

// --- Test: requests reach the gateway with the right frames ---
#[tokio::test]
async fn test_request_reaches_gateway() {
  let (engine, mut stream) = common::connected_engine(SERVER_TIME_SECS).await;

  engine
    .send(Request::MarketData {
      ticker_id: 42,
      symbol: "IBM".to_string(),
    })
    .await
    .expect("send market data");

  let mut header = [0u8; 6];
  stream.read_exact(&mut header).await.expect("request header");
  let kind = u16::from_be_bytes([header[0], header[1]]);
  let len = u32::from_be_bytes([header[2], header[3], header[4], header[5]]) as usize;
  assert_eq!(kind, 2, "market data request kind");
  let mut payload = vec![0u8; len];
  stream.read_exact(&mut payload).await.expect("request payload");
  assert_eq!(payload, b"42\0IBM\0");

  engine.send(Request::CurrentTime).await.expect("send current time");
  stream.read_exact(&mut header).await.expect("request header");
  assert_eq!(u16::from_be_bytes([header[0], header[1]]), 1, "current time request kind");
  assert_eq!(
    u32::from_be_bytes([header[2], header[3], header[4], header[5]]),
    0,
    "current time request carries no payload"
  );

  engine.stop();
}

// --- Test: dropping every handle shuts the session down in order ---
#[tokio::test]
async fn test_dropping_all_handles_stops_engine() {
  let (engine, _stream) = common::connected_engine(SERVER_TIME_SECS).await;
  let state_rx = engine.subscribe_state();

  drop(engine);

  common::wait_for_state(&state_rx, LONG_TIMEOUT, ConnectionState::ExitNormal)
    .await
    .expect("ExitNormal after the last handle is dropped");
}

// --- Test: a late stop cannot rewrite a failure into an orderly exit ---
#[tokio::test]
async fn test_stop_after_failure_keeps_exit_error() {
  let (engine, stream) = common::connected_engine(SERVER_TIME_SECS).await;
  let state_rx = engine.subscribe_state();

  drop(stream); // Unsolicited disconnect
  common::wait_for_state(&state_rx, LONG_TIMEOUT, ConnectionState::ExitError)
    .await
    .expect("ExitError after unsolicited EOF");

  engine.stop();
  assert_eq!(engine.state(), ConnectionState::ExitError);
  match engine.fatal_error().as_deref() {
    Some(GatewayError::ConnectionClosed) => {}
    other => panic!("Expected ConnectionClosed fatal error, got {:?}", other),
  }
}
