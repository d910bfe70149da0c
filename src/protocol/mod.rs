// src/protocol/mod.rs

pub mod codec;
pub mod greeting;

pub use codec::GatewayCodec;
pub use greeting::Greeting;
