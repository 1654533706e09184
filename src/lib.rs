//! # tls13-client
//!
//! A TLS 1.3 client core: the record layer that frames, protects and parses
//! every byte crossing the wire, and the handshake state machine that drives
//! a connection from ClientHello to application-data traffic.
//!
//! This crate deliberately contains **no cryptography**.  All cryptographic
//! work happens behind small trait seams supplied by the caller:
//!
//! * [`crypto::CipherStateFactory`] / [`crypto::CipherState`] hold the
//!   traffic secrets and perform record protection and key-schedule
//!   advancement;
//! * [`crypto::SupportedKxGroup`] / [`crypto::ActiveKeyExchange`] produce
//!   and complete the ClientHello key share;
//! * [`crypto::Hash`] computes the handshake transcript hash;
//! * [`verify::ServerCertVerifier`] validates the certificate chain and the
//!   CertificateVerify signature.
//!
//! Likewise the caller owns all transport I/O: bytes read from the peer are
//! handed to [`client::ClientConnection::read_tls`], and bytes destined for
//! the peer are collected with [`client::ClientConnection::take_tls_output`].
//! Nothing in this crate blocks.
//!
//! Explicitly out of scope: the server role, DTLS, session resumption, PSK
//! and 0-RTT early data, and the TLS 1.2 state machine.  A server that
//! negotiates TLS 1.2 results in a [`client::Tls12Handoff`] the host can use
//! to construct a TLS 1.2 client elsewhere.

#![forbid(unsafe_code)]
#![warn(
    clippy::manual_let_else,
    clippy::use_self,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications
)]

// log for logging (optional).
#[cfg(feature = "logging")]
mod log {
    pub(crate) use log::{debug, trace, warn};
}

#[cfg(not(feature = "logging"))]
mod log {
    macro_rules! trace    ( ($($tt:tt)*) => {{}} );
    macro_rules! debug    ( ($($tt:tt)*) => {{}} );
    macro_rules! _warn    ( ($($tt:tt)*) => {{}} );
    pub(crate) use {_warn as warn, debug, trace};
}

#[macro_use]
mod check;
#[macro_use]
pub mod msgs;

pub mod client;
pub mod crypto;
mod enums;
mod error;
mod hash_hs;
pub mod record;
pub mod verify;

pub use crate::enums::{
    AlertDescription, AlertLevel, CipherSuite, Compression, ContentType, HandshakeType,
    HashAlgorithm, KeyUpdateRequest, NamedGroup, ProtocolVersion, SignatureScheme,
};
pub use crate::error::{CertificateError, Error, InvalidMessage, PeerIncompatible, PeerMisbehaved};

/// Re-exports of types from the `rustls-pki-types` crate, which are used
/// in this crate's public interfaces.
pub mod pki_types {
    pub use pki_types::{CertificateDer, ServerName, UnixTime};
}
