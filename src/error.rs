// src/error.rs

use std::io;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive] // Allows adding more variants later without breaking change
pub enum GatewayError {
  // --- I/O Errors ---
  #[error("I/O error: {0}")]
  Io(#[from] io::Error),

  // --- Timeouts ---
  #[error("Operation timed out")]
  Timeout,

  // --- Connection Errors ---
  #[error("Connection refused by gateway: {0}")]
  ConnectionRefused(String), // Endpoint string
  #[error("Host is unreachable: {0}")]
  HostUnreachable(String),
  #[error("Network is unreachable: {0}")]
  NetworkUnreachable(String),
  #[error("Connection closed by gateway or transport")]
  ConnectionClosed,

  // --- Endpoint Errors ---
  #[error("Invalid endpoint format: {0}")]
  InvalidEndpoint(String),

  // --- State Errors ---
  #[error("Operation is invalid for the current engine state: {0}")]
  InvalidState(&'static str),

  // --- Protocol Errors ---
  #[error("Gateway protocol violation: {0}")]
  ProtocolViolation(String),

  // --- Internal Errors ---
  #[error("Internal library error: {0}")]
  Internal(String),
}

// Helper function to map common std::io::Error kinds
impl GatewayError {
  pub fn from_io_endpoint(e: io::Error, endpoint: &str) -> Self {
    match e.kind() {
      io::ErrorKind::ConnectionRefused => GatewayError::ConnectionRefused(endpoint.to_string()),
      io::ErrorKind::TimedOut => GatewayError::Timeout,
      io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe | io::ErrorKind::UnexpectedEof => {
        GatewayError::ConnectionClosed
      }
      _ => GatewayError::Io(e), // Default fallback
    }
  }
}

/// Shared handle to the error that drove the connection into `ExitError`.
///
/// `GatewayError` carries non-clonable payloads (`std::io::Error`), so the
/// fatal slot and every `fatal_error()` caller share one allocation instead.
pub type FatalError = Arc<GatewayError>;
