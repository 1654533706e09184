//! TLS wire-format types: the codec framework, record and message
//! structures, and the handshake payloads a TLS 1.3 client exchanges.

#[macro_use]
mod macros;

pub mod alert;
pub mod base;
pub mod ccs;
pub mod codec;
pub mod handshake;
pub mod hsjoiner;
pub mod message;
