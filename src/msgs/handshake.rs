use core::fmt;
use std::collections::BTreeSet;

use pki_types::CertificateDer;

use crate::enums::{
    CipherSuite, Compression, ExtensionType, HandshakeType, KeyUpdateRequest, NamedGroup,
    ProtocolVersion, SignatureScheme,
};
use crate::error::InvalidMessage;
use crate::msgs::base::{hex, Payload, PayloadU16, PayloadU8};
use crate::msgs::codec::{u24, Codec, LengthPrefixedBuffer, ListLength, Reader, TlsListElement};
use crate::verify::DigitallySignedStruct;

/// A certificate payload larger than this is rejected outright.
pub(crate) const CERTIFICATE_MAX_SIZE_LIMIT: usize = 0x1_0000;

#[derive(Clone, Copy, PartialEq)]
pub struct Random(pub [u8; 32]);

impl fmt::Debug for Random {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        hex(f, &self.0)
    }
}

impl Codec for Random {
    fn encode(&self, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&self.0);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let Some(bytes) = r.take(32) else {
            return Err(InvalidMessage::MissingData("Random"));
        };

        let mut opaque = [0; 32];
        opaque.clone_from_slice(bytes);
        Ok(Self(opaque))
    }
}

impl From<[u8; 32]> for Random {
    #[inline]
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// The fixed server random value that turns a ServerHello-shaped message
/// into a HelloRetryRequest.  RFC 8446 section 4.1.3.
pub(crate) const HELLO_RETRY_REQUEST_RANDOM: Random = Random([
    0xcf, 0x21, 0xad, 0x74, 0xe5, 0x9a, 0x61, 0x11, 0xbe, 0x1d, 0x8c, 0x02, 0x1e, 0x65, 0xb8, 0x91,
    0xc2, 0xa2, 0x11, 0x16, 0x7a, 0xbb, 0x8c, 0x5e, 0x07, 0x9e, 0x09, 0xe2, 0xc8, 0xa8, 0x33, 0x9c,
]);

/// Trailing bytes of the server random that signal a downgrade to TLS 1.2.
/// RFC 8446 section 4.1.3.
pub(crate) const DOWNGRADE_SENTINEL_TLS12: [u8; 8] =
    [0x44, 0x4f, 0x57, 0x4e, 0x47, 0x52, 0x44, 0x01];

/// Trailing bytes of the server random that signal a downgrade to TLS 1.1
/// or below.  RFC 8446 section 4.1.3.
pub(crate) const DOWNGRADE_SENTINEL_TLS11: [u8; 8] =
    [0x44, 0x4f, 0x57, 0x4e, 0x47, 0x52, 0x44, 0x00];

#[derive(Clone, Copy)]
pub struct SessionId {
    data: [u8; 32],
    len: usize,
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        hex(f, &self.data[..self.len])
    }
}

impl PartialEq for SessionId {
    fn eq(&self, other: &Self) -> bool {
        if self.len != other.len {
            return false;
        }

        let mut diff = 0u8;
        for i in 0..self.len {
            diff |= self.data[i] ^ other.data[i];
        }

        diff == 0u8
    }
}

impl Codec for SessionId {
    fn encode(&self, bytes: &mut Vec<u8>) {
        debug_assert!(self.len <= 32);
        bytes.push(self.len as u8);
        bytes.extend_from_slice(self.as_ref());
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let len = usize::from(u8::read(r)?);
        if len > 32 {
            return Err(InvalidMessage::TrailingData("SessionId"));
        }

        let Some(bytes) = r.take(len) else {
            return Err(InvalidMessage::MissingData("SessionId"));
        };

        let mut out = [0u8; 32];
        out[..len].clone_from_slice(&bytes[..len]);
        Ok(Self { data: out, len })
    }
}

impl SessionId {
    pub(crate) fn new(bytes: [u8; 32]) -> Self {
        Self {
            data: bytes,
            len: 32,
        }
    }

    pub fn empty() -> Self {
        Self {
            data: [0u8; 32],
            len: 0,
        }
    }
}

impl AsRef<[u8]> for SessionId {
    fn as_ref(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

/// An extension we do not interpret, carried opaquely.
#[derive(Clone, Debug)]
pub struct UnknownExtension {
    pub typ: ExtensionType,
    pub payload: Payload,
}

impl UnknownExtension {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.payload.encode(bytes);
    }

    fn read(typ: ExtensionType, r: &mut Reader<'_>) -> Self {
        let payload = Payload::read_rest(r);
        Self { typ, payload }
    }
}

// --- TLS 1.3 key shares ---
#[derive(Clone, Debug)]
pub struct KeyShareEntry {
    pub group: NamedGroup,
    pub payload: PayloadU16,
}

impl KeyShareEntry {
    pub fn new(group: NamedGroup, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            group,
            payload: PayloadU16::new(payload.into()),
        }
    }
}

impl Codec for KeyShareEntry {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.group.encode(bytes);
        self.payload.encode(bytes);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        Ok(Self {
            group: NamedGroup::read(r)?,
            payload: PayloadU16::read(r)?,
        })
    }
}

impl TlsListElement for ProtocolVersion {
    const SIZE_LEN: ListLength = ListLength::U8;
}

impl TlsListElement for NamedGroup {
    const SIZE_LEN: ListLength = ListLength::U16;
}

impl TlsListElement for SignatureScheme {
    const SIZE_LEN: ListLength = ListLength::U16;
}

impl TlsListElement for CipherSuite {
    const SIZE_LEN: ListLength = ListLength::U16;
}

impl TlsListElement for Compression {
    const SIZE_LEN: ListLength = ListLength::U8;
}

impl TlsListElement for KeyShareEntry {
    const SIZE_LEN: ListLength = ListLength::U16;
}

/// An extension sent in our ClientHello.
#[derive(Clone, Debug)]
pub enum ClientExtension {
    SupportedVersions(Vec<ProtocolVersion>),
    NamedGroups(Vec<NamedGroup>),
    SignatureAlgorithms(Vec<SignatureScheme>),
    KeyShare(Vec<KeyShareEntry>),
    ServerName(Vec<u8>),
    Cookie(PayloadU16),
    Unknown(UnknownExtension),
}

impl ClientExtension {
    pub fn ext_type(&self) -> ExtensionType {
        match self {
            Self::SupportedVersions(_) => ExtensionType::SupportedVersions,
            Self::NamedGroups(_) => ExtensionType::EllipticCurves,
            Self::SignatureAlgorithms(_) => ExtensionType::SignatureAlgorithms,
            Self::KeyShare(_) => ExtensionType::KeyShare,
            Self::ServerName(_) => ExtensionType::ServerName,
            Self::Cookie(_) => ExtensionType::Cookie,
            Self::Unknown(r) => r.typ,
        }
    }
}

impl Codec for ClientExtension {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.ext_type().encode(bytes);

        let nest = LengthPrefixedBuffer::new(ListLength::U16, bytes);
        match self {
            Self::SupportedVersions(r) => r.encode(nest.buf),
            Self::NamedGroups(r) => r.encode(nest.buf),
            Self::SignatureAlgorithms(r) => r.encode(nest.buf),
            Self::KeyShare(r) => r.encode(nest.buf),
            Self::ServerName(hostname) => {
                // RFC 6066: ServerNameList of a single host_name entry
                let name_list = LengthPrefixedBuffer::new(ListLength::U16, nest.buf);
                0u8.encode(name_list.buf);
                PayloadU16::encode_slice(hostname, name_list.buf);
            }
            Self::Cookie(r) => r.encode(nest.buf),
            Self::Unknown(r) => r.encode(nest.buf),
        }
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let typ = ExtensionType::read(r)?;
        let len = usize::from(u16::read(r)?);
        let mut sub = r.sub(len)?;

        let ext = match typ {
            ExtensionType::SupportedVersions => Self::SupportedVersions(Vec::read(&mut sub)?),
            ExtensionType::EllipticCurves => Self::NamedGroups(Vec::read(&mut sub)?),
            ExtensionType::SignatureAlgorithms => Self::SignatureAlgorithms(Vec::read(&mut sub)?),
            ExtensionType::KeyShare => Self::KeyShare(Vec::read(&mut sub)?),
            ExtensionType::ServerName => {
                let list_len = usize::from(u16::read(&mut sub)?);
                let mut names = sub.sub(list_len)?;
                let mut hostname = None;
                while names.any_left() {
                    let name_typ = u8::read(&mut names)?;
                    let body = PayloadU16::read(&mut names)?;
                    if name_typ == 0 && hostname.is_none() {
                        hostname = Some(body.0);
                    }
                }
                match hostname {
                    Some(hostname) => Self::ServerName(hostname),
                    None => return Err(InvalidMessage::InvalidServerName),
                }
            }
            ExtensionType::Cookie => Self::Cookie(PayloadU16::read(&mut sub)?),
            _ => Self::Unknown(UnknownExtension::read(typ, &mut sub)),
        };

        sub.expect_empty("ClientExtension")?;
        Ok(ext)
    }
}

impl TlsListElement for ClientExtension {
    const SIZE_LEN: ListLength = ListLength::U16;
}

/// An extension received in a ServerHello or EncryptedExtensions.
#[derive(Clone, Debug)]
pub enum ServerExtension {
    SupportedVersions(ProtocolVersion),
    KeyShare(KeyShareEntry),
    Unknown(UnknownExtension),
}

impl ServerExtension {
    pub fn ext_type(&self) -> ExtensionType {
        match self {
            Self::SupportedVersions(_) => ExtensionType::SupportedVersions,
            Self::KeyShare(_) => ExtensionType::KeyShare,
            Self::Unknown(r) => r.typ,
        }
    }
}

impl Codec for ServerExtension {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.ext_type().encode(bytes);

        let nest = LengthPrefixedBuffer::new(ListLength::U16, bytes);
        match self {
            Self::SupportedVersions(r) => r.encode(nest.buf),
            Self::KeyShare(r) => r.encode(nest.buf),
            Self::Unknown(r) => r.encode(nest.buf),
        }
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let typ = ExtensionType::read(r)?;
        let len = usize::from(u16::read(r)?);
        let mut sub = r.sub(len)?;

        let ext = match typ {
            ExtensionType::SupportedVersions => {
                Self::SupportedVersions(ProtocolVersion::read(&mut sub)?)
            }
            ExtensionType::KeyShare => Self::KeyShare(KeyShareEntry::read(&mut sub)?),
            _ => Self::Unknown(UnknownExtension::read(typ, &mut sub)),
        };

        sub.expect_empty("ServerExtension")?;
        Ok(ext)
    }
}

impl TlsListElement for ServerExtension {
    const SIZE_LEN: ListLength = ListLength::U16;
}

/// An extension received in a HelloRetryRequest.
///
/// The `key_share` extension carries a bare group request here rather than
/// a share, which is why this is a distinct type.
#[derive(Clone, Debug)]
pub enum HelloRetryExtension {
    KeyShare(NamedGroup),
    Cookie(PayloadU16),
    SupportedVersions(ProtocolVersion),
    Unknown(UnknownExtension),
}

impl HelloRetryExtension {
    pub fn ext_type(&self) -> ExtensionType {
        match self {
            Self::KeyShare(_) => ExtensionType::KeyShare,
            Self::Cookie(_) => ExtensionType::Cookie,
            Self::SupportedVersions(_) => ExtensionType::SupportedVersions,
            Self::Unknown(r) => r.typ,
        }
    }
}

impl Codec for HelloRetryExtension {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.ext_type().encode(bytes);

        let nest = LengthPrefixedBuffer::new(ListLength::U16, bytes);
        match self {
            Self::KeyShare(r) => r.encode(nest.buf),
            Self::Cookie(r) => r.encode(nest.buf),
            Self::SupportedVersions(r) => r.encode(nest.buf),
            Self::Unknown(r) => r.encode(nest.buf),
        }
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let typ = ExtensionType::read(r)?;
        let len = usize::from(u16::read(r)?);
        let mut sub = r.sub(len)?;

        let ext = match typ {
            ExtensionType::KeyShare => Self::KeyShare(NamedGroup::read(&mut sub)?),
            ExtensionType::Cookie => Self::Cookie(PayloadU16::read(&mut sub)?),
            ExtensionType::SupportedVersions => {
                Self::SupportedVersions(ProtocolVersion::read(&mut sub)?)
            }
            _ => Self::Unknown(UnknownExtension::read(typ, &mut sub)),
        };

        sub.expect_empty("HelloRetryExtension")?;
        Ok(ext)
    }
}

impl TlsListElement for HelloRetryExtension {
    const SIZE_LEN: ListLength = ListLength::U16;
}

#[derive(Clone, Debug)]
pub struct ClientHelloPayload {
    pub client_version: ProtocolVersion,
    pub random: Random,
    pub session_id: SessionId,
    pub cipher_suites: Vec<CipherSuite>,
    pub compression_methods: Vec<Compression>,
    pub extensions: Vec<ClientExtension>,
}

impl Codec for ClientHelloPayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.client_version.encode(bytes);
        self.random.encode(bytes);
        self.session_id.encode(bytes);
        self.cipher_suites.encode(bytes);
        self.compression_methods.encode(bytes);

        if !self.extensions.is_empty() {
            self.extensions.encode(bytes);
        }
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let mut ret = Self {
            client_version: ProtocolVersion::read(r)?,
            random: Random::read(r)?,
            session_id: SessionId::read(r)?,
            cipher_suites: Vec::read(r)?,
            compression_methods: Vec::read(r)?,
            extensions: Vec::new(),
        };

        if r.any_left() {
            ret.extensions = Vec::read(r)?;
        }

        Ok(ret)
    }
}

impl ClientHelloPayload {
    pub fn find_extension(&self, typ: ExtensionType) -> Option<&ClientExtension> {
        self.extensions
            .iter()
            .find(|ext| ext.ext_type() == typ)
    }

    pub fn sent_extensions(&self) -> Vec<ExtensionType> {
        self.extensions
            .iter()
            .map(ClientExtension::ext_type)
            .collect()
    }

    pub fn offered_suite(&self, suite: CipherSuite) -> bool {
        self.cipher_suites.contains(&suite)
    }

    pub fn offered_version(&self, version: ProtocolVersion) -> bool {
        match self.find_extension(ExtensionType::SupportedVersions) {
            Some(ClientExtension::SupportedVersions(versions)) => versions.contains(&version),
            _ => false,
        }
    }

    pub fn signature_schemes(&self) -> &[SignatureScheme] {
        match self.find_extension(ExtensionType::SignatureAlgorithms) {
            Some(ClientExtension::SignatureAlgorithms(schemes)) => schemes,
            _ => &[],
        }
    }

    /// Replace the key-share extension's contents with `entry`.
    pub(crate) fn replace_key_share(&mut self, entry: KeyShareEntry) {
        for ext in &mut self.extensions {
            if let ClientExtension::KeyShare(shares) = ext {
                *shares = vec![entry];
                return;
            }
        }
    }

    /// Install (or replace) the cookie echoed back after a
    /// HelloRetryRequest.
    pub(crate) fn set_cookie(&mut self, cookie: PayloadU16) {
        for ext in &mut self.extensions {
            if let ClientExtension::Cookie(existing) = ext {
                *existing = cookie;
                return;
            }
        }
        self.extensions
            .push(ClientExtension::Cookie(cookie));
    }
}

#[derive(Clone, Debug)]
pub struct ServerHelloPayload {
    pub legacy_version: ProtocolVersion,
    pub random: Random,
    pub session_id: SessionId,
    pub cipher_suite: CipherSuite,
    pub compression_method: Compression,
    pub extensions: Vec<ServerExtension>,
}

impl Codec for ServerHelloPayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.legacy_version.encode(bytes);
        self.random.encode(bytes);
        self.session_id.encode(bytes);
        self.cipher_suite.encode(bytes);
        self.compression_method.encode(bytes);

        if !self.extensions.is_empty() {
            self.extensions.encode(bytes);
        }
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let legacy_version = ProtocolVersion::read(r)?;
        let random = Random::read(r)?;
        Self::read_after_random(r, legacy_version, random)
    }
}

impl ServerHelloPayload {
    pub(crate) fn read_after_random(
        r: &mut Reader<'_>,
        legacy_version: ProtocolVersion,
        random: Random,
    ) -> Result<Self, InvalidMessage> {
        let mut ret = Self {
            legacy_version,
            random,
            session_id: SessionId::read(r)?,
            cipher_suite: CipherSuite::read(r)?,
            compression_method: Compression::read(r)?,
            extensions: Vec::new(),
        };

        if r.any_left() {
            ret.extensions = Vec::read(r)?;
        }

        Ok(ret)
    }

    pub fn ext_types(&self) -> Vec<ExtensionType> {
        self.extensions
            .iter()
            .map(ServerExtension::ext_type)
            .collect()
    }

    pub fn has_duplicate_extension(&self) -> bool {
        has_duplicates::<_, _, u16>(self.ext_types())
    }

    pub fn supported_versions(&self) -> Option<ProtocolVersion> {
        self.extensions.iter().find_map(|ext| match ext {
            ServerExtension::SupportedVersions(version) => Some(*version),
            _ => None,
        })
    }

    pub fn key_share(&self) -> Option<&KeyShareEntry> {
        self.extensions.iter().find_map(|ext| match ext {
            ServerExtension::KeyShare(entry) => Some(entry),
            _ => None,
        })
    }

    /// RFC 8446 section 4.1.3: the last eight bytes of the server random
    /// double as a downgrade protection signal.
    pub fn random_signals_downgrade(&self) -> Option<ProtocolVersion> {
        let tail = &self.random.0[24..];
        if tail == DOWNGRADE_SENTINEL_TLS12 {
            Some(ProtocolVersion::TLSv1_2)
        } else if tail == DOWNGRADE_SENTINEL_TLS11 {
            Some(ProtocolVersion::TLSv1_1)
        } else {
            None
        }
    }
}

#[derive(Clone, Debug)]
pub struct HelloRetryRequestPayload {
    pub legacy_version: ProtocolVersion,
    pub session_id: SessionId,
    pub cipher_suite: CipherSuite,
    pub extensions: Vec<HelloRetryExtension>,
}

impl HelloRetryRequestPayload {
    pub(crate) fn read_after_random(
        r: &mut Reader<'_>,
        legacy_version: ProtocolVersion,
    ) -> Result<Self, InvalidMessage> {
        let session_id = SessionId::read(r)?;
        let cipher_suite = CipherSuite::read(r)?;
        let compression = Compression::read(r)?;

        if compression != Compression::Null {
            return Err(InvalidMessage::UnsupportedCompression);
        }

        Ok(Self {
            legacy_version,
            session_id,
            cipher_suite,
            extensions: Vec::read(r)?,
        })
    }

    pub fn ext_types(&self) -> Vec<ExtensionType> {
        self.extensions
            .iter()
            .map(HelloRetryExtension::ext_type)
            .collect()
    }

    pub fn has_duplicate_extension(&self) -> bool {
        has_duplicates::<_, _, u16>(self.ext_types())
    }

    pub fn has_unknown_extension(&self) -> bool {
        self.extensions
            .iter()
            .any(|ext| matches!(ext, HelloRetryExtension::Unknown(_)))
    }

    pub fn requested_key_share_group(&self) -> Option<NamedGroup> {
        self.extensions.iter().find_map(|ext| match ext {
            HelloRetryExtension::KeyShare(group) => Some(*group),
            _ => None,
        })
    }

    pub fn cookie(&self) -> Option<&PayloadU16> {
        self.extensions.iter().find_map(|ext| match ext {
            HelloRetryExtension::Cookie(cookie) => Some(cookie),
            _ => None,
        })
    }

    pub fn supported_versions(&self) -> Option<ProtocolVersion> {
        self.extensions.iter().find_map(|ext| match ext {
            HelloRetryExtension::SupportedVersions(version) => Some(*version),
            _ => None,
        })
    }

    fn encode(&self, bytes: &mut Vec<u8>) {
        self.legacy_version.encode(bytes);
        HELLO_RETRY_REQUEST_RANDOM.encode(bytes);
        self.session_id.encode(bytes);
        self.cipher_suite.encode(bytes);
        Compression::Null.encode(bytes);
        self.extensions.encode(bytes);
    }
}

/// Reads a `Extension extensions<..>` block whose contents we carry
/// opaquely.
fn read_extension_block(r: &mut Reader<'_>) -> Result<Vec<UnknownExtension>, InvalidMessage> {
    let len = usize::from(u16::read(r)?);
    let mut sub = r.sub(len)?;

    let mut exts = Vec::new();
    while sub.any_left() {
        let typ = ExtensionType::read(&mut sub)?;
        let body_len = usize::from(u16::read(&mut sub)?);
        let mut body = sub.sub(body_len)?;
        exts.push(UnknownExtension::read(typ, &mut body));
    }
    Ok(exts)
}

fn encode_extension_block(exts: &[UnknownExtension], bytes: &mut Vec<u8>) {
    let nest = LengthPrefixedBuffer::new(ListLength::U16, bytes);
    for ext in exts {
        ext.typ.encode(nest.buf);
        PayloadU16::encode_slice(&ext.payload.0, nest.buf);
    }
}

#[derive(Clone, Debug)]
pub struct CertificateEntry {
    pub cert: CertificateDer<'static>,
    pub extensions: Vec<UnknownExtension>,
}

impl Codec for CertificateEntry {
    fn encode(&self, bytes: &mut Vec<u8>) {
        let nest = LengthPrefixedBuffer::new(
            ListLength::U24 {
                max: CERTIFICATE_MAX_SIZE_LIMIT,
            },
            bytes,
        );
        nest.buf.extend(self.cert.as_ref());
        drop(nest);
        encode_extension_block(&self.extensions, bytes);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let len = usize::from(u24::read(r)?);
        let mut body = r.sub(len)?;
        let cert = CertificateDer::from(body.rest().to_vec());
        let extensions = read_extension_block(r)?;

        Ok(Self { cert, extensions })
    }
}

impl TlsListElement for CertificateEntry {
    const SIZE_LEN: ListLength = ListLength::U24 {
        max: CERTIFICATE_MAX_SIZE_LIMIT,
    };
}

#[derive(Clone, Debug)]
pub struct CertificatePayloadTls13 {
    pub context: PayloadU8,
    pub entries: Vec<CertificateEntry>,
}

impl Codec for CertificatePayloadTls13 {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.context.encode(bytes);
        self.entries.encode(bytes);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        Ok(Self {
            context: PayloadU8::read(r)?,
            entries: Vec::read(r)?,
        })
    }
}

impl CertificatePayloadTls13 {
    pub fn any_entry_has_duplicate_extension(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| has_duplicates::<_, _, u16>(entry.extensions.iter().map(|ext| ext.typ)))
    }

    /// Return the type of the first entry extension that was not offered
    /// in our ClientHello.
    pub fn unsolicited_extension(&self, offered: &[ExtensionType]) -> Option<ExtensionType> {
        self.entries
            .iter()
            .flat_map(|entry| entry.extensions.iter())
            .map(|ext| ext.typ)
            .find(|typ| !offered.contains(typ))
    }

    pub fn into_certificate_chain(self) -> Vec<CertificateDer<'static>> {
        self.entries
            .into_iter()
            .map(|entry| entry.cert)
            .collect()
    }
}

/// An extension received in a CertificateRequest.
#[derive(Clone, Debug)]
pub enum CertReqExtension {
    SignatureAlgorithms(Vec<SignatureScheme>),
    Unknown(UnknownExtension),
}

impl CertReqExtension {
    pub fn ext_type(&self) -> ExtensionType {
        match self {
            Self::SignatureAlgorithms(_) => ExtensionType::SignatureAlgorithms,
            Self::Unknown(r) => r.typ,
        }
    }
}

impl Codec for CertReqExtension {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.ext_type().encode(bytes);

        let nest = LengthPrefixedBuffer::new(ListLength::U16, bytes);
        match self {
            Self::SignatureAlgorithms(r) => r.encode(nest.buf),
            Self::Unknown(r) => r.encode(nest.buf),
        }
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let typ = ExtensionType::read(r)?;
        let len = usize::from(u16::read(r)?);
        let mut sub = r.sub(len)?;

        let ext = match typ {
            ExtensionType::SignatureAlgorithms => Self::SignatureAlgorithms(Vec::read(&mut sub)?),
            _ => Self::Unknown(UnknownExtension::read(typ, &mut sub)),
        };

        sub.expect_empty("CertReqExtension")?;
        Ok(ext)
    }
}

impl TlsListElement for CertReqExtension {
    const SIZE_LEN: ListLength = ListLength::U16;
}

#[derive(Clone, Debug)]
pub struct CertificateRequestPayloadTls13 {
    pub context: PayloadU8,
    pub extensions: Vec<CertReqExtension>,
}

impl Codec for CertificateRequestPayloadTls13 {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.context.encode(bytes);
        self.extensions.encode(bytes);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        Ok(Self {
            context: PayloadU8::read(r)?,
            extensions: Vec::read(r)?,
        })
    }
}

impl CertificateRequestPayloadTls13 {
    pub fn sigalgs_extension(&self) -> Option<&[SignatureScheme]> {
        self.extensions.iter().find_map(|ext| match ext {
            CertReqExtension::SignatureAlgorithms(schemes) => Some(schemes.as_slice()),
            _ => None,
        })
    }
}

#[derive(Clone, Debug)]
pub struct NewSessionTicketPayloadTls13 {
    pub lifetime: u32,
    pub age_add: u32,
    pub nonce: PayloadU8,
    pub ticket: PayloadU16,
    pub extensions: Vec<UnknownExtension>,
}

impl Codec for NewSessionTicketPayloadTls13 {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.lifetime.encode(bytes);
        self.age_add.encode(bytes);
        self.nonce.encode(bytes);
        self.ticket.encode(bytes);
        encode_extension_block(&self.extensions, bytes);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        Ok(Self {
            lifetime: u32::read(r)?,
            age_add: u32::read(r)?,
            nonce: PayloadU8::read(r)?,
            ticket: PayloadU16::read(r)?,
            extensions: read_extension_block(r)?,
        })
    }
}

#[derive(Clone, Debug)]
pub enum HandshakePayload {
    ClientHello(ClientHelloPayload),
    ServerHello(ServerHelloPayload),
    HelloRetryRequest(HelloRetryRequestPayload),
    EncryptedExtensions(Vec<ServerExtension>),
    CertificateTls13(CertificatePayloadTls13),
    CertificateRequestTls13(CertificateRequestPayloadTls13),
    CertificateVerify(DigitallySignedStruct),
    Finished(Payload),
    NewSessionTicketTls13(NewSessionTicketPayloadTls13),
    KeyUpdate(KeyUpdateRequest),
    MessageHash(Payload),
    Unknown(Payload),
}

impl HandshakePayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        match self {
            Self::ClientHello(x) => x.encode(bytes),
            Self::ServerHello(x) => x.encode(bytes),
            Self::HelloRetryRequest(x) => x.encode(bytes),
            Self::EncryptedExtensions(x) => x.encode(bytes),
            Self::CertificateTls13(x) => x.encode(bytes),
            Self::CertificateRequestTls13(x) => x.encode(bytes),
            Self::CertificateVerify(x) => x.encode(bytes),
            Self::Finished(x) => x.encode(bytes),
            Self::NewSessionTicketTls13(x) => x.encode(bytes),
            Self::KeyUpdate(x) => x.encode(bytes),
            Self::MessageHash(x) => x.encode(bytes),
            Self::Unknown(x) => x.encode(bytes),
        }
    }
}

#[derive(Clone, Debug)]
pub struct HandshakeMessagePayload {
    pub typ: HandshakeType,
    pub payload: HandshakePayload,
}

impl Codec for HandshakeMessagePayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        // encode the type.  a HelloRetryRequest is encoded as a ServerHello.
        match self.typ {
            HandshakeType::HelloRetryRequest => HandshakeType::ServerHello,
            _ => self.typ,
        }
        .encode(bytes);

        let nest = LengthPrefixedBuffer::new(ListLength::U24 { max: usize::MAX }, bytes);
        self.payload.encode(nest.buf);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let mut typ = HandshakeType::read(r)?;
        let len = usize::from(u24::read(r)?);
        let mut sub = r.sub(len)?;

        let payload = match typ {
            HandshakeType::ClientHello => {
                HandshakePayload::ClientHello(ClientHelloPayload::read(&mut sub)?)
            }
            HandshakeType::ServerHello => {
                let legacy_version = ProtocolVersion::read(&mut sub)?;
                let random = Random::read(&mut sub)?;

                if random == HELLO_RETRY_REQUEST_RANDOM {
                    typ = HandshakeType::HelloRetryRequest;
                    HandshakePayload::HelloRetryRequest(HelloRetryRequestPayload::read_after_random(
                        &mut sub,
                        legacy_version,
                    )?)
                } else {
                    HandshakePayload::ServerHello(ServerHelloPayload::read_after_random(
                        &mut sub,
                        legacy_version,
                        random,
                    )?)
                }
            }
            HandshakeType::EncryptedExtensions => {
                HandshakePayload::EncryptedExtensions(Vec::read(&mut sub)?)
            }
            HandshakeType::Certificate => {
                HandshakePayload::CertificateTls13(CertificatePayloadTls13::read(&mut sub)?)
            }
            HandshakeType::CertificateRequest => HandshakePayload::CertificateRequestTls13(
                CertificateRequestPayloadTls13::read(&mut sub)?,
            ),
            HandshakeType::CertificateVerify => {
                HandshakePayload::CertificateVerify(DigitallySignedStruct::read(&mut sub)?)
            }
            HandshakeType::Finished => HandshakePayload::Finished(Payload::read_rest(&mut sub)),
            HandshakeType::NewSessionTicket => HandshakePayload::NewSessionTicketTls13(
                NewSessionTicketPayloadTls13::read(&mut sub)?,
            ),
            HandshakeType::KeyUpdate => {
                let request = KeyUpdateRequest::read(&mut sub)?;
                if let KeyUpdateRequest::Unknown(_) = request {
                    return Err(InvalidMessage::InvalidKeyUpdate);
                }
                HandshakePayload::KeyUpdate(request)
            }
            HandshakeType::MessageHash => {
                HandshakePayload::MessageHash(Payload::read_rest(&mut sub))
            }
            HandshakeType::Unknown(v) => return Err(InvalidMessage::UnknownHandshakeType(v)),
            _ => HandshakePayload::Unknown(Payload::read_rest(&mut sub)),
        };

        sub.expect_empty("HandshakeMessagePayload")?;
        Ok(Self { typ, payload })
    }
}

impl HandshakeMessagePayload {
    /// The synthetic `message_hash` message that replaces ClientHello1 in
    /// the transcript after a HelloRetryRequest.  RFC 8446 section 4.4.1.
    pub(crate) fn build_handshake_hash(hash: &[u8]) -> Self {
        Self {
            typ: HandshakeType::MessageHash,
            payload: HandshakePayload::MessageHash(Payload::new(hash.to_vec())),
        }
    }
}

pub(crate) fn has_duplicates<I: IntoIterator<Item = E>, E: Into<T>, T: Eq + Ord>(iter: I) -> bool {
    let mut seen = BTreeSet::new();

    for x in iter {
        if !seen.insert(x.into()) {
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_client_hello() -> ClientHelloPayload {
        ClientHelloPayload {
            client_version: ProtocolVersion::TLSv1_2,
            random: Random::from([1u8; 32]),
            session_id: SessionId::new([2u8; 32]),
            cipher_suites: vec![
                CipherSuite::TLS13_AES_128_GCM_SHA256,
                CipherSuite::TLS_EMPTY_RENEGOTIATION_INFO_SCSV,
            ],
            compression_methods: vec![Compression::Null],
            extensions: vec![
                ClientExtension::SupportedVersions(vec![ProtocolVersion::TLSv1_3]),
                ClientExtension::ServerName(b"localhost".to_vec()),
                ClientExtension::NamedGroups(vec![NamedGroup::X25519]),
                ClientExtension::SignatureAlgorithms(vec![SignatureScheme::ED25519]),
                ClientExtension::KeyShare(vec![KeyShareEntry::new(
                    NamedGroup::X25519,
                    &b"pubkey"[..],
                )]),
            ],
        }
    }

    #[test]
    fn client_hello_round_trip() {
        let hmp = HandshakeMessagePayload {
            typ: HandshakeType::ClientHello,
            payload: HandshakePayload::ClientHello(sample_client_hello()),
        };
        let bytes = hmp.get_encoding();
        let parsed = HandshakeMessagePayload::read_bytes(&bytes).unwrap();
        assert_eq!(parsed.typ, HandshakeType::ClientHello);
        assert_eq!(parsed.get_encoding(), bytes);

        let HandshakePayload::ClientHello(ch) = parsed.payload else {
            panic!("wrong payload");
        };
        assert!(ch.offered_version(ProtocolVersion::TLSv1_3));
        assert!(ch.offered_suite(CipherSuite::TLS13_AES_128_GCM_SHA256));
        assert_eq!(ch.signature_schemes(), &[SignatureScheme::ED25519]);
    }

    #[test]
    fn server_hello_with_hrr_random_parses_as_hrr() {
        let hrr = HelloRetryRequestPayload {
            legacy_version: ProtocolVersion::TLSv1_2,
            session_id: SessionId::new([2u8; 32]),
            cipher_suite: CipherSuite::TLS13_AES_128_GCM_SHA256,
            extensions: vec![
                HelloRetryExtension::SupportedVersions(ProtocolVersion::TLSv1_3),
                HelloRetryExtension::KeyShare(NamedGroup::secp256r1),
            ],
        };
        let hmp = HandshakeMessagePayload {
            typ: HandshakeType::HelloRetryRequest,
            payload: HandshakePayload::HelloRetryRequest(hrr),
        };
        let bytes = hmp.get_encoding();
        // encoded with the ServerHello message type
        assert_eq!(bytes[0], u8::from(HandshakeType::ServerHello));

        let parsed = HandshakeMessagePayload::read_bytes(&bytes).unwrap();
        assert_eq!(parsed.typ, HandshakeType::HelloRetryRequest);
        let HandshakePayload::HelloRetryRequest(hrr) = parsed.payload else {
            panic!("wrong payload");
        };
        assert_eq!(
            hrr.requested_key_share_group(),
            Some(NamedGroup::secp256r1)
        );
        assert!(!hrr.has_unknown_extension());
    }

    #[test]
    fn downgrade_sentinel_detection() {
        let mut random = [9u8; 32];
        random[24..].copy_from_slice(&DOWNGRADE_SENTINEL_TLS12);
        let sh = ServerHelloPayload {
            legacy_version: ProtocolVersion::TLSv1_2,
            random: Random::from(random),
            session_id: SessionId::empty(),
            cipher_suite: CipherSuite::TLS13_AES_128_GCM_SHA256,
            compression_method: Compression::Null,
            extensions: vec![],
        };
        assert_eq!(
            sh.random_signals_downgrade(),
            Some(ProtocolVersion::TLSv1_2)
        );
    }

    #[test]
    fn key_update_rejects_unknown_request() {
        // KeyUpdate with request_update = 2
        let bytes = [0x18, 0x00, 0x00, 0x01, 0x02];
        assert_eq!(
            HandshakeMessagePayload::read_bytes(&bytes).unwrap_err(),
            InvalidMessage::InvalidKeyUpdate
        );
    }

    #[test]
    fn certificate_payload_round_trip() {
        let payload = CertificatePayloadTls13 {
            context: PayloadU8::empty(),
            entries: vec![CertificateEntry {
                cert: CertificateDer::from(vec![0x30, 0x82, 0x01, 0x02]),
                extensions: vec![],
            }],
        };
        let bytes = payload.get_encoding();
        let parsed = CertificatePayloadTls13::read_bytes(&bytes).unwrap();
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(
            parsed.entries[0].cert.as_ref(),
            &[0x30, 0x82, 0x01, 0x02]
        );
    }

    #[test]
    fn session_id_mismatch_detected() {
        let a = SessionId::new([1u8; 32]);
        let mut other = [1u8; 32];
        other[31] = 2;
        let b = SessionId::new(other);
        assert!(a != b);
        assert!(a == SessionId::new([1u8; 32]));
    }
}
