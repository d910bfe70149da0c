// src/protocol/codec.rs

use crate::error::GatewayError;
use crate::message::{Reply, Request};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Frame header: kind (u16) + payload length (u32), both big-endian.
pub const FRAME_HEADER_LENGTH: usize = 2 + 4;

/// Hard cap on a frame payload. A header announcing more than this means the
/// stream has desynchronized (or the peer is hostile); recovery is impossible
/// either way, so the decoder fails the connection instead of allocating.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Codec for gateway message framing.
///
/// The greeting exchange happens on the raw stream before this codec sees any
/// bytes; everything after it is kind/length-prefixed frames.
#[derive(Debug, Default)]
pub struct GatewayCodec {
  // State needed for decoding potentially fragmented frames
  decoding_state: DecodingState,
}

#[derive(Debug, Default, Clone, Copy)]
enum DecodingState {
  #[default]
  ReadHeader, // Waiting for kind + length octets
  ReadBody(FrameHeader), // Waiting for frame body bytes
}

#[derive(Debug, Clone, Copy)]
struct FrameHeader {
  kind: u16,
  size: usize,
}

impl GatewayCodec {
  pub fn new() -> Self {
    Self::default()
  }
}

// --- Decoder Implementation (BytesMut -> Reply) ---
impl Decoder for GatewayCodec {
  type Item = Reply;
  type Error = GatewayError;

  fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
    loop {
      match self.decoding_state {
        DecodingState::ReadHeader => {
          if src.len() < FRAME_HEADER_LENGTH {
            src.reserve(FRAME_HEADER_LENGTH - src.len());
            return Ok(None); // Need more data for header
          }

          // Consume header bytes
          let mut header_bytes = src.split_to(FRAME_HEADER_LENGTH);
          let kind = header_bytes.get_u16();
          let size = header_bytes.get_u32() as usize;

          if size > MAX_FRAME_SIZE {
            return Err(GatewayError::ProtocolViolation(format!(
              "Frame payload of {} bytes exceeds the {} byte limit",
              size, MAX_FRAME_SIZE
            )));
          }

          // Store header info and move to ReadBody state
          self.decoding_state = DecodingState::ReadBody(FrameHeader { kind, size });
          // Continue loop to try decoding body immediately if possible
        }

        DecodingState::ReadBody(header) => {
          if src.len() < header.size {
            // Not enough data for the body yet
            src.reserve(header.size - src.len());
            return Ok(None);
          }

          // Enough data available, consume body
          let payload = src.split_to(header.size).freeze();

          // Reset state for next frame
          self.decoding_state = DecodingState::ReadHeader;

          return Reply::parse(header.kind, payload).map(Some);
        }
      } // end match self.decoding_state
    } // end loop
  }
}

// --- Encoder Implementation (Request -> BytesMut) ---
impl Encoder<Request> for GatewayCodec {
  type Error = GatewayError;

  fn encode(&mut self, item: Request, dst: &mut BytesMut) -> Result<(), Self::Error> {
    let mut payload = BytesMut::new();
    item.encode_payload(&mut payload);

    dst.reserve(FRAME_HEADER_LENGTH + payload.len());
    dst.put_u16(item.code().0);
    dst.put_u32(payload.len() as u32);
    dst.put_slice(&payload);

    Ok(())
  }
}
