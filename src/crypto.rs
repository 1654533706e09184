//! Interfaces to the cryptographic collaborators.
//!
//! This crate performs no cryptography itself.  The traits here are the
//! seams along which a caller plugs in a real implementation: a hash for
//! the handshake transcript, a key exchange for the ClientHello key share,
//! and a cipher state that owns the traffic secrets and protects records.

use core::fmt::Debug;

use pki_types::UnixTime;
use zeroize::Zeroize;

use crate::enums::{CipherSuite, HashAlgorithm, NamedGroup};
use crate::error::Error;

/// Which side of a connection we occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The client initiates the connection.
    Client,
    /// The server accepts the connection.
    Server,
}

impl Side {
    /// The other side.
    pub fn peer(&self) -> Self {
        match self {
            Self::Client => Self::Server,
            Self::Server => Self::Client,
        }
    }
}

/// Random material generation failed.
#[derive(Debug)]
pub struct GetRandomFailed;

impl From<GetRandomFailed> for Error {
    fn from(_: GetRandomFailed) -> Self {
        Self::FailedToGetRandomBytes
    }
}

/// A source of cryptographically secure randomness.
pub trait SecureRandom: Send + Sync {
    /// Fill the given buffer with random bytes.
    fn fill(&self, buf: &mut [u8]) -> Result<(), GetRandomFailed>;
}

/// A source of the current wall-clock time, for certificate validity.
pub trait TimeProvider: Send + Sync {
    /// The current time, or `None` if unavailable.
    fn current_time(&self) -> Option<UnixTime>;
}

/// [`TimeProvider`] implemented on top of the standard library clock.
#[derive(Debug)]
pub struct DefaultTimeProvider;

impl TimeProvider for DefaultTimeProvider {
    fn current_time(&self) -> Option<UnixTime> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .ok()?;
        Some(UnixTime::since_unix_epoch(now))
    }
}

/// A hash output, stored as a value type.
#[derive(Clone, Copy)]
pub struct HashOutput {
    buf: [u8; Self::MAX_LEN],
    used: usize,
}

impl HashOutput {
    /// Maximum supported hash output size: supports up to SHA-512.
    pub const MAX_LEN: usize = 64;

    /// Build a `HashOutput` by copying a byte slice.
    ///
    /// The slice can be up to [`Self::MAX_LEN`] bytes in length.
    pub fn new(bytes: &[u8]) -> Self {
        debug_assert!(bytes.len() <= Self::MAX_LEN);
        let mut output = Self {
            buf: [0u8; Self::MAX_LEN],
            used: bytes.len(),
        };
        output.buf[..bytes.len()].copy_from_slice(bytes);
        output
    }
}

impl AsRef<[u8]> for HashOutput {
    fn as_ref(&self) -> &[u8] {
        &self.buf[..self.used]
    }
}

impl Debug for HashOutput {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        crate::msgs::base::hex(f, self.as_ref())
    }
}

/// Describes a single cryptographic hash function.
///
/// This interface can do both one-shot and incremental hashing, using
/// [`Hash::hash()`] and [`Hash::start()`] respectively.
pub trait Hash: Send + Sync {
    /// Start an incremental hash computation.
    fn start(&self) -> Box<dyn HashContext>;

    /// Return the output of this hash with input `data`.
    fn hash(&self, data: &[u8]) -> HashOutput {
        let mut ctx = self.start();
        ctx.update(data);
        ctx.finish()
    }

    /// The length in bytes of this hash function's output.
    fn output_len(&self) -> usize;

    /// Which hash function this is, e.g. `HashAlgorithm::SHA256`.
    fn algorithm(&self) -> HashAlgorithm;
}

/// A running hash computation which is sized to produce [`Hash::output_len`]
/// bytes.
pub trait HashContext: Send + Sync {
    /// Finish the computation, returning the resulting output.
    ///
    /// The computation remains valid, and more data can be added later with
    /// [`HashContext::update()`].
    fn fork_finish(&self) -> HashOutput;

    /// Fork the computation, producing another context that has the
    /// same prefix.
    fn fork(&self) -> Box<dyn HashContext>;

    /// Terminate and finish the computation, returning the resulting output.
    fn finish(self: Box<Self>) -> HashOutput;

    /// Add `data` to the computation.
    fn update(&mut self, data: &[u8]);
}

/// Resolves a [`HashAlgorithm`] to a hash implementation.
pub trait HashProvider: Send + Sync {
    /// Return the implementation of `alg`, if supported.
    fn select(&self, alg: HashAlgorithm) -> Option<&'static dyn Hash>;

    /// Return the transcript hash implementation for `suite`.
    fn for_suite(&self, suite: CipherSuite) -> Option<&'static dyn Hash> {
        self.select(suite.hash_algorithm()?)
    }
}

/// The result from a completed key exchange.
///
/// The buffer is wiped on drop.
pub struct SharedSecret {
    buf: Vec<u8>,
}

impl SharedSecret {
    /// Returns the shared secret as a slice of bytes.
    pub fn secret_bytes(&self) -> &[u8] {
        &self.buf
    }
}

impl From<Vec<u8>> for SharedSecret {
    fn from(buf: Vec<u8>) -> Self {
        Self { buf }
    }
}

impl Drop for SharedSecret {
    fn drop(&mut self) {
        self.buf.zeroize();
    }
}

impl Debug for SharedSecret {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("SharedSecret")
    }
}

/// A key-exchange group supported by this configuration.
pub trait SupportedKxGroup: Send + Sync {
    /// Named group the key exchange is operating in.
    fn name(&self) -> NamedGroup;

    /// Start a key exchange.
    ///
    /// This will prepare an ephemeral secret key in the supported group, and
    /// a corresponding public key.  The key exchange must be completed by
    /// calling [`ActiveKeyExchange::complete`].
    fn start(&self) -> Result<Box<dyn ActiveKeyExchange>, Error>;
}

/// An in-progress key exchange originated by a [`SupportedKxGroup`].
pub trait ActiveKeyExchange: Send + Sync {
    /// Completes the key exchange, given the peer's raw public key.
    ///
    /// The shared secret is returned as a plain byte value.
    fn complete(self: Box<Self>, peer_pub_key: &[u8]) -> Result<SharedSecret, Error>;

    /// Return the public key being used.
    fn pub_key(&self) -> &[u8];

    /// Return the group being used.
    fn group(&self) -> NamedGroup;
}

/// The stage the traffic secrets of a [`CipherState`] have reached.
///
/// On a successful handshake the epochs are visited strictly in order and
/// none is revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherEpoch {
    /// Handshake traffic secrets are installed for both directions.
    Handshake,
    /// The server's application traffic secret is installed; the client
    /// still writes under handshake keys.
    ApplicationPartial,
    /// Application traffic secrets are installed for both directions.
    Application,
}

/// The connection's protection context: traffic secrets, sequence numbers
/// and the AEAD keyed by them.
///
/// This object is opaque to the core.  It is created at ServerHello time by
/// a [`CipherStateFactory`] and advanced by the handshake driver at defined
/// milestones.
pub trait CipherState: Send {
    /// The number of ciphertext bytes that protecting `plaintext_len` bytes
    /// produces, including the AEAD tag.
    fn encrypt_output_length(&self, plaintext_len: usize) -> usize;

    /// Encrypt `fragment` in place, extending it with the AEAD tag.
    ///
    /// `header_aad` is the serialized record header, used as associated
    /// data.
    fn encrypt_record_fragment(
        &mut self,
        header_aad: &[u8],
        fragment: &mut Vec<u8>,
    ) -> Result<(), Error>;

    /// Decrypt `fragment` in place, leaving the inner plaintext followed by
    /// the inner content-type octet.  Returns the record's sequence number.
    ///
    /// Fails with [`Error::DecryptError`] on an authentication failure,
    /// which maps to a `bad_record_mac` alert.
    fn decrypt_record_fragment(
        &mut self,
        header_aad: &[u8],
        fragment: &mut Vec<u8>,
    ) -> Result<u64, Error>;

    /// Install the server's application traffic secret, derived from the
    /// transcript hash up to and including the server Finished.
    fn advance_with_server_finished(&mut self, transcript_hash: &HashOutput);

    /// Install the client's application traffic secret, derived from the
    /// transcript hash up to and including the client Finished.
    fn advance_with_client_finished(&mut self, transcript_hash: &HashOutput);

    /// Rotate the read-direction traffic secret (peer-initiated KeyUpdate).
    fn update_read_keys(&mut self);

    /// Rotate the write-direction traffic secret (our KeyUpdate).
    fn update_write_keys(&mut self);

    /// Produce the Finished `verify_data` for `side` at `transcript_hash`.
    fn sign_finished(&self, side: Side, transcript_hash: &HashOutput) -> Vec<u8>;

    /// The epoch the traffic secrets have reached.
    fn epoch(&self) -> CipherEpoch;
}

/// Creates [`CipherState`] objects when a ServerHello fixes the connection
/// parameters.
pub trait CipherStateFactory: Send + Sync {
    /// Derive handshake traffic secrets and install read/write keys.
    ///
    /// `transcript_hash` covers the handshake transcript up to and
    /// including the ServerHello.
    fn init_with_server_hello(
        &self,
        side: Side,
        shared_secret: SharedSecret,
        suite: CipherSuite,
        transcript_hash: &HashOutput,
    ) -> Result<Box<dyn CipherState>, Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_secret_wipes_on_drop() {
        let secret = SharedSecret::from(vec![1, 2, 3]);
        assert_eq!(secret.secret_bytes(), &[1, 2, 3]);
        drop(secret);
    }

    #[test]
    fn hash_output_truncates_view() {
        let out = HashOutput::new(&[7; 32]);
        assert_eq!(out.as_ref().len(), 32);
        assert!(out.as_ref().iter().all(|&b| b == 7));
    }
}
