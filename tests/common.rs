// tests/common.rs
#![allow(dead_code)] // Not every integration file uses every helper

use gatelink::{ConnectionState, Engine, EngineOptions, GatewayError, StateReceiver};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use std::sync::Once;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

// Use std::sync::Once for one-time initialization
static TRACING_INIT: Once = Once::new();

// Setup function to initialize tracing
pub fn setup_tracing() {
  TRACING_INIT.call_once(|| {
    // Default level filter, overridable through RUST_LOG
    let default_filter = "gatelink=trace,debug,info,warn";
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = FmtSubscriber::builder()
      .with_max_level(tracing::Level::TRACE)
      .with_env_filter(env_filter)
      .with_target(true)
      .with_line_number(true)
      .with_span_events(FmtSpan::CLOSE)
      .with_test_writer() // Write to test output capture
      .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set global tracing subscriber");
  });
}

// --- Wire-format builders for the gateway's half of the conversation ---

pub const SERVER_TIME_KIND: u16 = 1;

pub fn server_greeting() -> Vec<u8> {
  let mut buf = Vec::with_capacity(16);
  buf.extend_from_slice(b"GWAY");
  buf.extend_from_slice(&1u16.to_be_bytes()); // protocol version
  buf.extend_from_slice(&0i32.to_be_bytes()); // peer id slot, unused by gateways
  buf.extend_from_slice(&[0u8; 6]); // reserved
  buf
}

pub fn frame(kind: u16, fields: &[&str]) -> Vec<u8> {
  let mut payload = Vec::new();
  for field in fields {
    payload.extend_from_slice(field.as_bytes());
    payload.push(0);
  }
  let mut buf = Vec::with_capacity(6 + payload.len());
  buf.extend_from_slice(&kind.to_be_bytes());
  buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
  buf.extend_from_slice(&payload);
  buf
}

/// Scripted gateway peer. Tests hand-write the server side of the protocol
/// byte by byte, so nothing here leans on the crate's own codec.
pub struct StubGateway {
  listener: TcpListener,
}

impl StubGateway {
  pub async fn bind() -> StubGateway {
    let listener = TcpListener::bind("127.0.0.1:0")
      .await
      .expect("Failed to bind stub gateway");
    StubGateway { listener }
  }

  pub fn endpoint(&self) -> String {
    self.listener.local_addr().expect("No local addr").to_string()
  }

  /// Accepts one connection without touching it.
  pub async fn accept(&self) -> TcpStream {
    let (stream, _) = self.listener.accept().await.expect("Accept failed");
    stream
  }

  /// Accepts one connection and plays the gateway's opening lines: read the
  /// client greeting, answer with a greeting plus the server-time frame.
  /// Returns the stream so the test can keep scripting.
  pub async fn accept_and_handshake(&self, server_time_secs: u64) -> TcpStream {
    let mut stream = self.accept().await;
    let mut greeting = [0u8; 16];
    stream
      .read_exact(&mut greeting)
      .await
      .expect("Failed to read client greeting");
    assert_eq!(&greeting[0..4], b"GWAY", "client greeting magic");

    stream
      .write_all(&server_greeting())
      .await
      .expect("Failed to write server greeting");
    stream
      .write_all(&frame(SERVER_TIME_KIND, &[&server_time_secs.to_string()]))
      .await
      .expect("Failed to write server time");
    stream
  }
}

// Options pointed at the stub; generous outer timeouts so slow CI does not
// flake, tests that probe timeouts override the field they care about.
pub fn test_options(gateway: &StubGateway) -> EngineOptions {
  EngineOptions {
    gateway: gateway.endpoint(),
    client_id: 7,
    connect_timeout: Duration::from_secs(5),
    handshake_timeout: Duration::from_secs(5),
    delivery_timeout: Duration::from_secs(1),
    ..Default::default()
  }
}

/// Stands up a stub gateway and a connected engine in one call. Returns the
/// gateway-side stream for further scripting.
pub async fn connected_engine(server_time_secs: u64) -> (Engine, TcpStream) {
  setup_tracing();
  let gateway = StubGateway::bind().await;
  let options = test_options(&gateway);
  let (engine, stream) = tokio::join!(
    Engine::connect(options),
    gateway.accept_and_handshake(server_time_secs)
  );
  (engine.expect("Engine::connect failed"), stream)
}

// Helper for recv with timeout assertion
pub async fn recv_timeout<T>(rx: &async_channel::Receiver<T>, duration: Duration) -> Result<T, GatewayError> {
  match timeout(duration, rx.recv()).await {
    Ok(Ok(value)) => Ok(value),
    Ok(Err(_)) => Err(GatewayError::ConnectionClosed), // Channel closed
    Err(_) => Err(GatewayError::Timeout),              // Map timeout error
  }
}

// --- Helper function to wait for a specific lifecycle state ---
pub async fn wait_for_state(
  state_rx: &StateReceiver,
  overall_timeout: Duration,
  wanted: ConnectionState,
) -> Result<(), String> {
  let start_time = tokio::time::Instant::now();
  loop {
    if start_time.elapsed() > overall_timeout {
      return Err(format!(
        "Timeout waiting for state {:?} after {:?}",
        wanted, overall_timeout
      ));
    }
    match timeout(Duration::from_millis(100), state_rx.recv()).await {
      Ok(Ok(state)) => {
        println!("State observed: {:?}", state);
        if state == wanted {
          return Ok(());
        }
      }
      Ok(Err(_)) => return Err("State channel closed before the wanted state arrived".to_string()),
      Err(_) => {} // Short recv attempt elapsed, re-check the overall budget
    }
  }
}
