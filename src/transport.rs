// src/transport.rs

use crate::error::GatewayError;
use crate::options::EngineOptions;
use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Resolves the configured gateway endpoint to a dialable address.
/// The `tcp://` prefix is optional; no other scheme exists for the gateway.
pub(crate) fn target_addr(endpoint: &str) -> Result<&str, GatewayError> {
  let addr = endpoint.strip_prefix("tcp://").unwrap_or(endpoint);
  if addr.is_empty() || !addr.contains(':') {
    return Err(GatewayError::InvalidEndpoint(endpoint.to_string()));
  }
  Ok(addr)
}

/// Opens the gateway TCP stream, bounded by the configured connect timeout,
/// and applies socket options before handing it to the engine.
pub(crate) async fn connect(options: &EngineOptions) -> Result<TcpStream, GatewayError> {
  let addr = target_addr(&options.gateway)?;

  let stream = match timeout(options.connect_timeout, TcpStream::connect(addr)).await {
    Ok(Ok(stream)) => stream,
    Ok(Err(e)) => return Err(GatewayError::from_io_endpoint(e, &options.gateway)),
    Err(_) => {
      tracing::warn!(uri = %options.gateway, timeout = ?options.connect_timeout, "TCP connect timed out");
      return Err(GatewayError::Timeout);
    }
  };

  apply_tcp_socket_options(&stream, options)?;
  tracing::debug!(uri = %options.gateway, local_addr = ?stream.local_addr().ok(), "TCP connect successful");
  Ok(stream)
}

fn apply_tcp_socket_options(stream: &TcpStream, options: &EngineOptions) -> Result<(), GatewayError> {
  let socket_ref = SockRef::from(stream);
  socket_ref.set_nodelay(options.tcp_nodelay)?;
  tracing::trace!(nodelay = options.tcp_nodelay, "Applied TCP_NODELAY");

  if let Some(time) = options.tcp_keepalive {
    let keepalive = TcpKeepalive::new().with_time(time);
    socket_ref.set_tcp_keepalive(&keepalive)?;
    tracing::debug!("Applied TCP keepalive settings: {:?}", keepalive);
  } else {
    tracing::trace!("TCP keepalive not configured, using system defaults");
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_target_addr_accepts_bare_and_prefixed() {
    assert_eq!(target_addr("127.0.0.1:4002").unwrap(), "127.0.0.1:4002");
    assert_eq!(target_addr("tcp://127.0.0.1:4002").unwrap(), "127.0.0.1:4002");
  }

  #[test]
  fn test_target_addr_rejects_missing_port() {
    assert!(matches!(
      target_addr("127.0.0.1"),
      Err(GatewayError::InvalidEndpoint(_))
    ));
    assert!(matches!(target_addr("tcp://"), Err(GatewayError::InvalidEndpoint(_))));
    assert!(matches!(target_addr(""), Err(GatewayError::InvalidEndpoint(_))));
  }
}
