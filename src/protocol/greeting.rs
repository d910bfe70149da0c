// src/protocol/greeting.rs

use crate::error::GatewayError;
use bytes::{BufMut, BytesMut};

// --- Constants ---
pub const GREETING_LENGTH: usize = 16;

/// Leading magic identifying a gateway connection.
pub const GREETING_MAGIC: [u8; 4] = *b"GWAY";

/// Protocol revision this implementation sends and expects from peers.
pub const PROTOCOL_VERSION: u16 = 1;

// Byte offsets within the 16-byte greeting.
const VERSION_OFFSET: usize = 4;
const CLIENT_ID_OFFSET: usize = 6;
const PADDING_OFFSET: usize = CLIENT_ID_OFFSET + 4; // 10
const PADDING_LENGTH: usize = GREETING_LENGTH - PADDING_OFFSET; // 6

/// Parsed content of the fixed-size connection greeting.
///
/// Both sides exchange one greeting before any framing starts. The client
/// announces its id; the gateway echoes id `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Greeting {
  pub version: u16,
  pub client_id: i32,
}

impl Greeting {
  /// Writes a canonical greeting to be sent.
  pub fn encode(client_id: i32, buffer: &mut BytesMut) {
    buffer.reserve(GREETING_LENGTH);
    buffer.put_slice(&GREETING_MAGIC);
    buffer.put_u16(PROTOCOL_VERSION);
    buffer.put_i32(client_id);
    buffer.put_bytes(0, PADDING_LENGTH);
  }

  /// Parses a received greeting, consuming it from the buffer.
  ///
  /// Returns `Ok(None)` until a full greeting has been buffered.
  pub fn decode(buffer: &mut BytesMut) -> Result<Option<Self>, GatewayError> {
    if buffer.len() < GREETING_LENGTH {
      return Ok(None); // Need more data
    }

    let data = buffer.split_to(GREETING_LENGTH);

    if data[..GREETING_MAGIC.len()] != GREETING_MAGIC {
      tracing::error!("Greeting does not start with GWAY magic (got {:02x?})", &data[..4]);
      return Err(GatewayError::ProtocolViolation(
        "Greeting does not start with GWAY magic".into(),
      ));
    }

    let version = u16::from_be_bytes([data[VERSION_OFFSET], data[VERSION_OFFSET + 1]]);
    if version != PROTOCOL_VERSION {
      return Err(GatewayError::ProtocolViolation(format!(
        "Unsupported protocol version {}",
        version
      )));
    }

    let client_id = i32::from_be_bytes([
      data[CLIENT_ID_OFFSET],
      data[CLIENT_ID_OFFSET + 1],
      data[CLIENT_ID_OFFSET + 2],
      data[CLIENT_ID_OFFSET + 3],
    ]);

    // The reserved tail must be zeroed; anything else means a peer speaking
    // a different dialect and field offsets can no longer be trusted.
    for i in 0..PADDING_LENGTH {
      if data[PADDING_OFFSET + i] != 0 {
        tracing::error!(
          "Invalid greeting: non-zero reserved byte at index {}: {:#04x}",
          PADDING_OFFSET + i,
          data[PADDING_OFFSET + i]
        );
        return Err(GatewayError::ProtocolViolation(
          "Non-zero byte in greeting reserved area".into(),
        ));
      }
    }

    tracing::debug!(version, client_id, "Parsed gateway greeting");
    Ok(Some(Self { version, client_id }))
  }
}
