//! The seam along which certificate and signature verification is
//! delegated to the application.

use core::fmt;

use pki_types::{CertificateDer, ServerName, UnixTime};

use crate::crypto::HashOutput;
use crate::enums::SignatureScheme;
use crate::error::{Error, InvalidMessage};
use crate::msgs::base::PayloadU16;
use crate::msgs::codec::{Codec, Reader};

/// A server certificate chain that passed [`ServerCertVerifier`]
/// validation.
///
/// This is a zero-sized assertion type: it can only be constructed by a
/// verifier, which forces the driver to actually run verification before
/// proceeding.
#[derive(Debug)]
pub struct ServerCertVerified(());

impl ServerCertVerified {
    /// Make a `ServerCertVerified`.
    pub fn assertion() -> Self {
        Self(())
    }
}

/// A handshake signature that passed [`ServerCertVerifier`] validation.
#[derive(Debug)]
pub struct HandshakeSignatureValid(());

impl HandshakeSignatureValid {
    /// Make a `HandshakeSignatureValid`.
    pub fn assertion() -> Self {
        Self(())
    }
}

/// A signature scheme paired with the signature bytes, as sent in a
/// CertificateVerify message.
#[derive(Clone, Debug)]
pub struct DigitallySignedStruct {
    /// The [`SignatureScheme`] used to produce the signature.
    pub scheme: SignatureScheme,
    sig: PayloadU16,
}

impl DigitallySignedStruct {
    /// Build a `DigitallySignedStruct` from a scheme and signature bytes.
    pub fn new(scheme: SignatureScheme, sig: Vec<u8>) -> Self {
        Self {
            scheme,
            sig: PayloadU16::new(sig),
        }
    }

    /// The signature bytes.
    pub fn signature(&self) -> &[u8] {
        &self.sig.0
    }
}

impl Codec for DigitallySignedStruct {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.scheme.encode(bytes);
        self.sig.encode(bytes);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let scheme = SignatureScheme::read(r)?;
        let sig = PayloadU16::read(r)?;

        Ok(Self { scheme, sig })
    }
}

/// Something that can verify a server certificate chain, and verify
/// signatures made by certificates.
pub trait ServerCertVerifier: Send + Sync {
    /// Verify the end-entity certificate `end_entity` is valid for the
    /// hostname `server_name` and chains to at least one trust anchor.
    ///
    /// `intermediates` contains all certificates other than `end_entity`
    /// that were sent as part of the server's Certificate message, in the
    /// order sent.
    ///
    /// `ocsp_response` is empty if no stapled OCSP response was received.
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, Error>;

    /// Verify a signature allegedly by the given server certificate over
    /// `message`, the TLS 1.3 CertificateVerify input.
    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error>;

    /// The signature schemes this verifier can handle, offered in our
    /// ClientHello `signature_algorithms` extension.
    fn supported_verify_schemes(&self) -> Vec<SignatureScheme>;
}

impl fmt::Debug for dyn ServerCertVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn ServerCertVerifier")
    }
}

/// The input the server signs in its CertificateVerify message.
/// RFC 8446 section 4.4.3.
pub(crate) fn construct_server_verify_message(handshake_hash: &HashOutput) -> Vec<u8> {
    let mut message = Vec::with_capacity(64 + 34 + handshake_hash.as_ref().len());
    message.resize(64, 0x20u8);
    message.extend_from_slice(b"TLS 1.3, server CertificateVerify");
    message.push(0x00);
    message.extend_from_slice(handshake_hash.as_ref());
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digitally_signed_round_trip() {
        let dss = DigitallySignedStruct::new(SignatureScheme::ED25519, vec![1, 2, 3]);
        let enc = dss.get_encoding();
        assert_eq!(enc, vec![0x08, 0x07, 0x00, 0x03, 0x01, 0x02, 0x03]);
        let parsed = DigitallySignedStruct::read_bytes(&enc).unwrap();
        assert_eq!(parsed.scheme, SignatureScheme::ED25519);
        assert_eq!(parsed.signature(), &[1, 2, 3]);
    }

    #[test]
    fn server_verify_message_layout() {
        let hash = HashOutput::new(&[0xab; 32]);
        let message = construct_server_verify_message(&hash);
        assert_eq!(&message[..64], &[0x20; 64]);
        assert_eq!(&message[64..97], b"TLS 1.3, server CertificateVerify");
        assert_eq!(message[97], 0x00);
        assert_eq!(&message[98..], &[0xab; 32]);
    }
}
