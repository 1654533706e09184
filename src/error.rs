use core::fmt;

use crate::enums::{AlertDescription, ContentType, HandshakeType};

/// This crate reports protocol errors using this type.
#[non_exhaustive]
#[derive(Debug, PartialEq, Clone)]
pub enum Error {
    /// We received a TLS message that isn't valid right now.
    /// `expect_types` lists the message types we can expect right now.
    /// `got_type` is the type we found.  This error is typically
    /// caused by a buggy TLS stack (the peer or this one), a broken
    /// network, or an attack.
    InappropriateMessage {
        /// Which types we expected
        expect_types: Vec<ContentType>,
        /// What type we received
        got_type: ContentType,
    },

    /// We received a TLS handshake message that isn't valid right now.
    /// `expect_types` lists the handshake message types we can expect
    /// right now.  `got_type` is the type we found.
    InappropriateHandshakeMessage {
        /// Which handshake type we expected
        expect_types: Vec<HandshakeType>,
        /// What handshake type we received
        got_type: HandshakeType,
    },

    /// The peer sent us a TLS message with invalid contents.
    InvalidMessage(InvalidMessage),

    /// We couldn't verify the authenticity of a message.  This is
    /// invariably fatal: the peer's Finished MAC or AEAD tag failed.
    DecryptError,

    /// The peer doesn't support a protocol version/feature we require.
    /// The parameter gives a hint as to what version/feature it is.
    PeerIncompatible(PeerIncompatible),

    /// The peer deviated from the standard TLS protocol.
    /// The parameter gives a hint where.
    PeerMisbehaved(PeerMisbehaved),

    /// We received a fatal alert.  This means the peer is unhappy.
    AlertReceived(AlertDescription),

    /// We saw an invalid certificate.
    ///
    /// The contained error is from the certificate validation trait
    /// implementation.
    InvalidCertificate(CertificateError),

    /// The peer sent an empty certificate chain.
    NoCertificatesPresented,

    /// The peer sent an oversized record/fragment.
    PeerSentOversizedRecord,

    /// We failed to acquire random bytes from the system.
    FailedToGetRandomBytes,

    /// We failed to figure out what time it currently is.
    FailedToGetCurrentTime,

    /// This function doesn't work until the TLS handshake
    /// is complete.
    HandshakeNotComplete,

    /// The caller misused the API.
    ///
    /// This only results from the ordering or parameter values of calls,
    /// never from the values of untrusted data.
    ApiMisuse(&'static str),

    /// A catch-all error for unlikely errors.
    General(String),
}

/// Determine which alert should be sent for a given error.
///
/// If this mapping fails, no alert is sent.
impl TryFrom<&Error> for AlertDescription {
    type Error = ();

    fn try_from(error: &Error) -> Result<Self, Self::Error> {
        Ok(match error {
            Error::DecryptError => Self::DecryptError,
            Error::InappropriateMessage { .. } | Error::InappropriateHandshakeMessage { .. } => {
                Self::UnexpectedMessage
            }
            Error::InvalidCertificate(e) => Self::from(e),
            Error::InvalidMessage(e) => Self::from(*e),
            Error::NoCertificatesPresented => Self::DecodeError,
            Error::PeerMisbehaved(e) => Self::from(*e),
            Error::PeerIncompatible(e) => Self::from(*e),
            Error::PeerSentOversizedRecord => Self::RecordOverflow,
            _ => return Err(()),
        })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InappropriateMessage {
                expect_types,
                got_type,
            } => write!(
                f,
                "received unexpected message: got {got_type:?} when expecting {expect_types:?}"
            ),
            Self::InappropriateHandshakeMessage {
                expect_types,
                got_type,
            } => write!(
                f,
                "received unexpected handshake message: got {got_type:?} when expecting {expect_types:?}"
            ),
            Self::InvalidMessage(typ) => {
                write!(f, "received corrupt message of type {typ:?}")
            }
            Self::PeerIncompatible(why) => write!(f, "peer is incompatible: {why:?}"),
            Self::PeerMisbehaved(why) => write!(f, "peer misbehaved: {why:?}"),
            Self::AlertReceived(alert) => write!(f, "received fatal alert: {alert:?}"),
            Self::InvalidCertificate(err) => write!(f, "invalid peer certificate: {err:?}"),
            Self::NoCertificatesPresented => write!(f, "peer sent no certificates"),
            Self::DecryptError => write!(f, "cannot decrypt peer's message"),
            Self::PeerSentOversizedRecord => write!(f, "peer sent excess record size"),
            Self::FailedToGetRandomBytes => write!(f, "failed to get random bytes"),
            Self::FailedToGetCurrentTime => write!(f, "failed to get current time"),
            Self::HandshakeNotComplete => write!(f, "handshake not complete"),
            Self::ApiMisuse(why) => write!(f, "API misuse: {why}"),
            Self::General(err) => write!(f, "unexpected error: {err}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<InvalidMessage> for Error {
    #[inline]
    fn from(e: InvalidMessage) -> Self {
        Self::InvalidMessage(e)
    }
}

impl From<PeerMisbehaved> for Error {
    #[inline]
    fn from(e: PeerMisbehaved) -> Self {
        Self::PeerMisbehaved(e)
    }
}

impl From<PeerIncompatible> for Error {
    #[inline]
    fn from(e: PeerIncompatible) -> Self {
        Self::PeerIncompatible(e)
    }
}

impl From<CertificateError> for Error {
    #[inline]
    fn from(e: CertificateError) -> Self {
        Self::InvalidCertificate(e)
    }
}

/// A corrupt TLS message payload that resulted in an error.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InvalidMessage {
    /// A peer sent a syntactically incorrect ChangeCipherSpec payload.
    InvalidCcs,
    /// An unknown content type was encountered during message decoding.
    InvalidContentType,
    /// Context was incorrectly attached to a certificate request or
    /// certificate message during a handshake.
    InvalidCertRequest,
    /// A message was zero-length when its record kind forbids it.
    InvalidEmptyPayload,
    /// A peer sent an unexpected key update request.
    InvalidKeyUpdate,
    /// A peer's server name could not be decoded.
    InvalidServerName,
    /// A TLS message payload was larger then allowed by the specification.
    MessageTooLarge,
    /// Message is shorter than the expected length.
    MessageTooShort,
    /// Missing data for the named handshake payload value.
    MissingData(&'static str),
    /// Trailing data found for the named handshake payload value.
    TrailingData(&'static str),
    /// An unknown TLS protocol version was encountered during message
    /// decoding.
    UnknownProtocolVersion,
    /// An unknown handshake message type was encountered.
    UnknownHandshakeType(u8),
    /// A peer sent a non-null compression method.
    UnsupportedCompression,
    /// A peer sent a message where a given extension type was repeated.
    DuplicateExtension(u16),
}

impl From<InvalidMessage> for AlertDescription {
    fn from(e: InvalidMessage) -> Self {
        match e {
            InvalidMessage::InvalidCcs | InvalidMessage::InvalidContentType => {
                Self::UnexpectedMessage
            }
            InvalidMessage::UnknownProtocolVersion => Self::ProtocolVersion,
            InvalidMessage::InvalidKeyUpdate | InvalidMessage::DuplicateExtension(_) => {
                Self::IllegalParameter
            }
            _ => Self::DecodeError,
        }
    }
}

/// The set of cases where we failed to make a connection because we thought
/// the peer was misbehaving.
///
/// This is `non_exhaustive`: we might add or stop using items here in minor
/// versions.  We also don't document what they mean.  Generally a user of
/// this crate shouldn't vary its behaviour on these error codes, and there
/// is nothing it can do to improve matters.
#[allow(missing_docs)]
#[non_exhaustive]
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum PeerMisbehaved {
    AttemptedDowngradeToTls12WhenTls13IsSupported,
    DowngradeAfterHelloRetryRequest,
    DuplicateCertificateEntryExtensions,
    DuplicateEncryptedExtensions,
    DuplicateHelloRetryRequestExtensions,
    DuplicateServerHelloExtensions,
    EchoedSessionIdDidNotMatch,
    IllegalHelloRetryRequestWithEmptyCookie,
    IllegalHelloRetryRequestWithNoChanges,
    IllegalHelloRetryRequestWithOfferedGroup,
    IllegalHelloRetryRequestWithUnofferedCipherSuite,
    IllegalHelloRetryRequestWithUnofferedNamedGroup,
    IllegalHelloRetryRequestWithUnsupportedVersion,
    IllegalMiddleboxChangeCipherSpec,
    IllegalTlsInnerPlaintext,
    IncorrectFinished,
    MessageInterleavedWithHandshakeMessage,
    PrematureApplicationData,
    ProtectedChangeCipherSpec,
    SelectedDifferentCipherSuiteAfterRetry,
    SelectedDifferentVersionAfterRetry,
    SelectedNonNullCompression,
    SelectedTls12UsingTls13VersionExtension,
    SelectedUnofferedCipherSuite,
    SelectedUnofferedVersion,
    SignedHandshakeWithUnadvertisedSigScheme,
    TooManyKeyUpdateRequests,
    UnsolicitedCertificateEntryExtension,
    UnsolicitedEncryptedExtension,
    UnsolicitedServerHelloExtension,
    WrongGroupForKeyShare,
}

impl From<PeerMisbehaved> for AlertDescription {
    fn from(e: PeerMisbehaved) -> Self {
        match e {
            PeerMisbehaved::UnsolicitedCertificateEntryExtension
            | PeerMisbehaved::UnsolicitedEncryptedExtension
            | PeerMisbehaved::UnsolicitedServerHelloExtension => Self::UnsupportedExtension,

            PeerMisbehaved::DowngradeAfterHelloRetryRequest
            | PeerMisbehaved::IllegalMiddleboxChangeCipherSpec
            | PeerMisbehaved::IllegalTlsInnerPlaintext
            | PeerMisbehaved::MessageInterleavedWithHandshakeMessage
            | PeerMisbehaved::PrematureApplicationData
            | PeerMisbehaved::ProtectedChangeCipherSpec => Self::UnexpectedMessage,

            PeerMisbehaved::DuplicateEncryptedExtensions => Self::DecodeError,

            PeerMisbehaved::IncorrectFinished => Self::DecryptError,

            _ => Self::IllegalParameter,
        }
    }
}

/// The set of cases where we failed to make a connection because a peer
/// doesn't support a TLS version/feature we require.
///
/// This is `non_exhaustive`: we might add or stop using items here in minor
/// versions.
#[allow(missing_docs)]
#[non_exhaustive]
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum PeerIncompatible {
    NoCertificateRequestSignatureSchemesInCommon,
    ServerSentHelloRetryRequestWithUnknownExtension,
    ServerSentPskOnlyServerHello,
    Tls12NotOffered,
    ServerDoesNotSupportTls13,
}

impl From<PeerIncompatible> for AlertDescription {
    fn from(e: PeerIncompatible) -> Self {
        match e {
            PeerIncompatible::ServerSentHelloRetryRequestWithUnknownExtension => {
                Self::UnsupportedExtension
            }
            PeerIncompatible::Tls12NotOffered | PeerIncompatible::ServerDoesNotSupportTls13 => {
                Self::ProtocolVersion
            }
            _ => Self::HandshakeFailure,
        }
    }
}

/// The ways in which certificate validators can express errors.
///
/// Note that the TLS protocol code interprets specifically these error
/// codes to send specific TLS alerts.  Therefore, if a custom certificate
/// validator uses incorrect errors the library as a whole will send alerts
/// that do not match the standard.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum CertificateError {
    /// The certificate is not correctly encoded.
    BadEncoding,

    /// The current time is after the `notAfter` time in the certificate.
    Expired,

    /// The current time is before the `notBefore` time in the certificate.
    NotValidYet,

    /// The certificate has been revoked.
    Revoked,

    /// The certificate contains an extension marked critical, but it was
    /// not processed by the certificate validator.
    UnhandledCriticalExtension,

    /// The certificate chain is not issued by a known root certificate.
    UnknownIssuer,

    /// A certificate is not correctly signed by the key of its alleged
    /// issuer.
    BadSignature,

    /// The subject names in an end-entity certificate do not include
    /// the expected name.
    NotValidForName,

    /// The certificate is being used for a different purpose than allowed.
    InvalidPurpose,

    /// The certificate is valid, but the handshake is rejected for other
    /// reasons.
    ApplicationVerificationFailure,

    /// Any other error.
    ///
    /// This can be used by custom verifiers to expose the underlying error
    /// (where they are not better described by the more specific errors
    /// above).
    Other(String),
}

impl From<&CertificateError> for AlertDescription {
    fn from(e: &CertificateError) -> Self {
        use CertificateError::*;
        match e {
            BadEncoding | UnhandledCriticalExtension | NotValidForName => Self::BadCertificate,
            Expired | NotValidYet => Self::CertificateExpired,
            Revoked => Self::CertificateRevoked,
            UnknownIssuer => Self::UnknownCa,
            BadSignature => Self::DecryptError,
            InvalidPurpose => Self::UnsupportedCertificate,
            ApplicationVerificationFailure => Self::AccessDenied,
            Other(..) => Self::CertificateUnknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_to_alert_mapping() {
        assert_eq!(
            AlertDescription::try_from(&Error::DecryptError),
            Ok(AlertDescription::DecryptError)
        );
        assert_eq!(
            AlertDescription::try_from(&Error::PeerSentOversizedRecord),
            Ok(AlertDescription::RecordOverflow)
        );
        assert_eq!(
            AlertDescription::try_from(&Error::NoCertificatesPresented),
            Ok(AlertDescription::DecodeError)
        );
        assert_eq!(
            AlertDescription::try_from(&Error::from(InvalidMessage::InvalidContentType)),
            Ok(AlertDescription::UnexpectedMessage)
        );
        assert_eq!(
            AlertDescription::try_from(&Error::from(InvalidMessage::UnknownProtocolVersion)),
            Ok(AlertDescription::ProtocolVersion)
        );
        assert_eq!(
            AlertDescription::try_from(&Error::from(
                PeerMisbehaved::ProtectedChangeCipherSpec
            )),
            Ok(AlertDescription::UnexpectedMessage)
        );
        assert_eq!(
            AlertDescription::try_from(&Error::from(
                PeerMisbehaved::EchoedSessionIdDidNotMatch
            )),
            Ok(AlertDescription::IllegalParameter)
        );
        // no alert for local failures
        assert!(AlertDescription::try_from(&Error::FailedToGetRandomBytes).is_err());
    }

    #[test]
    fn certificate_error_alerts() {
        assert_eq!(
            AlertDescription::try_from(&Error::from(CertificateError::UnknownIssuer)),
            Ok(AlertDescription::UnknownCa)
        );
        assert_eq!(
            AlertDescription::try_from(&Error::from(CertificateError::BadSignature)),
            Ok(AlertDescription::DecryptError)
        );
        assert_eq!(
            AlertDescription::try_from(&Error::from(CertificateError::Expired)),
            Ok(AlertDescription::CertificateExpired)
        );
    }
}
