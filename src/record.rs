//! The TLS record layer: buffers inbound bytes until whole records are
//! available, parses one record at a time, and fragments and protects
//! outbound plaintext into on-wire records.

use crate::crypto::{CipherState, Side};
use crate::enums::{ContentType, ProtocolVersion};
use crate::error::{Error, InvalidMessage, PeerMisbehaved};
use crate::log::trace;

/// Content type, version and length.
pub const TLS_HEADER_SIZE: usize = 1 + 2 + 2;

/// Maximum plaintext fragment length: 2^14.  RFC 8446 section 5.1.
pub const MAX_PLAINTEXT_SIZE: usize = 16_384;

/// Maximum protected fragment length: 2^14 plus an allowance of 256 bytes
/// for the inner content type, padding and AEAD expansion.  RFC 8446
/// section 5.2.
pub const MAX_CIPHERTEXT_SIZE_TLS13: usize = MAX_PLAINTEXT_SIZE + 256;

/// A decoded inbound record.
///
/// For protected records the payload has been decrypted, the inner content
/// type recovered into `typ`, and the record's sequence number stored in
/// `seq`.
#[derive(Debug)]
pub struct Record {
    pub typ: ContentType,
    pub seq: Option<u64>,
    pub payload: Vec<u8>,
}

/// The result of asking the record layer for the next inbound record.
#[derive(Debug)]
pub enum NextRecord {
    /// This many further bytes are required before a record can be
    /// produced.  This is a normal return value, not an error.
    NeedMore(usize),
    /// Exactly one record was consumed from the buffer.
    Record(Record),
}

/// Byte-level framing for one connection.
///
/// Inbound bytes are accumulated with [`RecordLayer::feed`] and consumed
/// with [`RecordLayer::next_record`].  Outbound plaintext is turned into
/// one or more on-wire records by [`RecordLayer::prepare`].
pub struct RecordLayer {
    side: Side,
    read_buffer: Vec<u8>,
    initial_record: bool,
}

impl RecordLayer {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            read_buffer: Vec::new(),
            initial_record: true,
        }
    }

    /// Append bytes received from the peer to the parse buffer.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.read_buffer
            .extend_from_slice(bytes);
    }

    /// Take any bytes not yet consumed out of the parse buffer.
    ///
    /// Used when this connection hands off to a different protocol
    /// implementation.
    pub fn take_residual(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.read_buffer)
    }

    /// Parse one record off the front of the buffer.
    ///
    /// `cipher_state` must be supplied once record protection is active;
    /// protected records arriving before then are a protocol violation.
    ///
    /// In the `NeedMore` case no state is mutated: calling again without
    /// further [`RecordLayer::feed`] returns the identical value.
    pub fn next_record(
        &mut self,
        cipher_state: Option<&mut dyn CipherState>,
    ) -> Result<NextRecord, Error> {
        if self.read_buffer.len() < TLS_HEADER_SIZE {
            return Ok(NextRecord::NeedMore(
                TLS_HEADER_SIZE - self.read_buffer.len(),
            ));
        }

        let typ = read_record_type(self.read_buffer[0])?;
        let legacy_version = u16::from_be_bytes([self.read_buffer[1], self.read_buffer[2]]);
        let fragment_len =
            usize::from(u16::from_be_bytes([self.read_buffer[3], self.read_buffer[4]]));

        // RFC 8446 5.1: the legacy version MUST be 0x0303, except that the
        // initial record a server receives MAY carry 0x0301.
        let accept_initial = self.initial_record && self.side == Side::Server;
        if legacy_version != 0x0303 && !(accept_initial && legacy_version == 0x0301) {
            return Err(InvalidMessage::UnknownProtocolVersion.into());
        }

        // RFC 8446 5.1, 5.2: length limits differ for protected and
        // unprotected records, and only application data may be empty.
        match typ {
            ContentType::ApplicationData => {
                if fragment_len > MAX_CIPHERTEXT_SIZE_TLS13 {
                    return Err(Error::PeerSentOversizedRecord);
                }
            }
            _ => {
                if fragment_len > MAX_PLAINTEXT_SIZE {
                    return Err(Error::PeerSentOversizedRecord);
                }
                if fragment_len == 0 {
                    return Err(InvalidMessage::InvalidEmptyPayload.into());
                }
            }
        }

        if self.read_buffer.len() < TLS_HEADER_SIZE + fragment_len {
            return Ok(NextRecord::NeedMore(
                TLS_HEADER_SIZE + fragment_len - self.read_buffer.len(),
            ));
        }

        let header: [u8; TLS_HEADER_SIZE] = self.read_buffer[..TLS_HEADER_SIZE]
            .try_into()
            .unwrap();
        let fragment = &self.read_buffer[TLS_HEADER_SIZE..TLS_HEADER_SIZE + fragment_len];

        // RFC 8446 5.: an unprotected change_cipher_spec must consist of
        // the single byte 0x01.
        if typ == ContentType::ChangeCipherSpec && fragment != [0x01] {
            return Err(InvalidMessage::InvalidCcs.into());
        }

        let mut record = Record {
            typ,
            seq: None,
            payload: fragment.to_vec(),
        };
        self.read_buffer
            .drain(..TLS_HEADER_SIZE + fragment_len);
        self.initial_record = false;

        if record.typ == ContentType::ApplicationData {
            let Some(cipher_state) = cipher_state else {
                return Err(PeerMisbehaved::PrematureApplicationData.into());
            };

            record.seq = Some(cipher_state.decrypt_record_fragment(&header, &mut record.payload)?);
            record.typ = unprotect_inner_type(&mut record.payload)?;

            if record.payload.len() > MAX_PLAINTEXT_SIZE {
                return Err(Error::PeerSentOversizedRecord);
            }
        }

        trace!("read record {:?} len {}", record.typ, record.payload.len());
        Ok(NextRecord::Record(record))
    }

    /// Fragment `plaintext` into one or more on-wire records, protecting
    /// them when `cipher_state` is supplied.
    pub fn prepare(
        &mut self,
        typ: ContentType,
        plaintext: &[u8],
        mut cipher_state: Option<&mut dyn CipherState>,
    ) -> Result<Vec<u8>, Error> {
        // RFC 8446 5.1: application data records must not be written to
        // the wire unprotected, and only application data fragments may be
        // zero-length.
        if typ == ContentType::ApplicationData && cipher_state.is_none() {
            return Err(Error::ApiMisuse(
                "application data must not be sent unprotected",
            ));
        }

        if plaintext.is_empty() && typ != ContentType::ApplicationData {
            return Err(Error::ApiMisuse(
                "zero-length fragments are only valid for application data",
            ));
        }

        if typ == ContentType::ChangeCipherSpec && plaintext != [0x01] {
            return Err(Error::ApiMisuse("invalid change_cipher_spec payload"));
        }

        let mut output = Vec::new();
        let mut chunks = plaintext.chunks(MAX_PLAINTEXT_SIZE);

        // A protected record is emitted even for empty plaintext; this
        // happens only for application data.
        let first: &[u8] = chunks.next().unwrap_or(&[]);

        for chunk in std::iter::once(first).chain(chunks) {
            match cipher_state.as_deref_mut() {
                Some(cipher_state) => {
                    // assemble the TLSInnerPlaintext structure; no padding
                    // is emitted
                    let mut fragment = Vec::with_capacity(chunk.len() + 1);
                    fragment.extend_from_slice(chunk);
                    fragment.push(u8::from(typ));

                    let ciphertext_len = cipher_state.encrypt_output_length(fragment.len());
                    let header =
                        self.encode_header(ContentType::ApplicationData, ciphertext_len);
                    cipher_state.encrypt_record_fragment(&header, &mut fragment)?;
                    debug_assert_eq!(fragment.len(), ciphertext_len);

                    output.extend_from_slice(&header);
                    output.extend_from_slice(&fragment);
                }
                None => {
                    let header = self.encode_header(typ, chunk.len());
                    output.extend_from_slice(&header);
                    output.extend_from_slice(chunk);
                }
            }
        }

        Ok(output)
    }

    /// A single unprotected `change_cipher_spec` record, sent to help
    /// traverse legacy middleboxes.  It must not be the first record.
    pub fn prepare_dummy_ccs(&mut self) -> Result<Vec<u8>, Error> {
        if self.initial_record {
            return Err(Error::ApiMisuse("CCS must not be the initial record"));
        }

        self.prepare(ContentType::ChangeCipherSpec, &[0x01], None)
    }

    fn encode_header(&mut self, typ: ContentType, len: usize) -> [u8; TLS_HEADER_SIZE] {
        // RFC 8446 5.1: 0x0303 for all records except the very first one a
        // client emits, which may carry 0x0301 for compatibility.
        let version = match self.side == Side::Client && self.initial_record {
            true => ProtocolVersion::TLSv1_0,
            false => ProtocolVersion::TLSv1_2,
        };
        self.initial_record = false;

        let len_bytes = (len as u16).to_be_bytes();
        let version = u16::from(version).to_be_bytes();
        [
            u8::from(typ),
            version[0],
            version[1],
            len_bytes[0],
            len_bytes[1],
        ]
    }
}

/// RFC 8446 5.: an unexpected record type terminates the connection with
/// an `unexpected_message` alert.
fn read_record_type(byte: u8) -> Result<ContentType, Error> {
    match ContentType::from(byte) {
        ContentType::Unknown(_) => Err(InvalidMessage::InvalidContentType.into()),
        typ => Ok(typ),
    }
}

/// Remove the zero padding and inner content type from a decrypted
/// `TLSInnerPlaintext`, returning the true record type.
fn unprotect_inner_type(payload: &mut Vec<u8>) -> Result<ContentType, Error> {
    loop {
        match payload.pop() {
            Some(0x00) => {}
            Some(byte) => {
                let typ = read_record_type(byte)?;
                // RFC 8446 5.: a protected change_cipher_spec is forbidden.
                if typ == ContentType::ChangeCipherSpec {
                    return Err(PeerMisbehaved::ProtectedChangeCipherSpec.into());
                }
                return Ok(typ);
            }
            None => return Err(PeerMisbehaved::IllegalTlsInnerPlaintext.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{CipherEpoch, HashOutput};

    /// Protection that appends a recognisable tag, for framing tests.
    struct TagCipher {
        seq: u64,
    }

    const TAG_LEN: usize = 16;
    const TAG_BYTE: u8 = 0x5a;

    impl CipherState for TagCipher {
        fn encrypt_output_length(&self, plaintext_len: usize) -> usize {
            plaintext_len + TAG_LEN
        }

        fn encrypt_record_fragment(
            &mut self,
            _header_aad: &[u8],
            fragment: &mut Vec<u8>,
        ) -> Result<(), Error> {
            fragment.extend_from_slice(&[TAG_BYTE; TAG_LEN]);
            Ok(())
        }

        fn decrypt_record_fragment(
            &mut self,
            _header_aad: &[u8],
            fragment: &mut Vec<u8>,
        ) -> Result<u64, Error> {
            if fragment.len() < TAG_LEN || fragment[fragment.len() - TAG_LEN..] != [TAG_BYTE; TAG_LEN]
            {
                return Err(Error::DecryptError);
            }
            fragment.truncate(fragment.len() - TAG_LEN);
            let seq = self.seq;
            self.seq += 1;
            Ok(seq)
        }

        fn advance_with_server_finished(&mut self, _: &HashOutput) {}
        fn advance_with_client_finished(&mut self, _: &HashOutput) {}
        fn update_read_keys(&mut self) {}
        fn update_write_keys(&mut self) {}

        fn sign_finished(&self, _: Side, _: &HashOutput) -> Vec<u8> {
            Vec::new()
        }

        fn epoch(&self) -> CipherEpoch {
            CipherEpoch::Handshake
        }
    }

    fn sent_layer() -> RecordLayer {
        // a layer that has already emitted its initial record
        let mut layer = RecordLayer::new(Side::Client);
        layer
            .prepare(ContentType::Handshake, &[0u8], None)
            .unwrap();
        layer
    }

    #[test]
    fn need_more_is_pure() {
        let mut layer = RecordLayer::new(Side::Client);
        for _ in 0..3 {
            assert!(matches!(
                layer.next_record(None).unwrap(),
                NextRecord::NeedMore(5)
            ));
        }
        layer.feed(&[0x16, 0x03, 0x03]);
        for _ in 0..3 {
            assert!(matches!(
                layer.next_record(None).unwrap(),
                NextRecord::NeedMore(2)
            ));
        }
        layer.feed(&[0x00, 0x02]);
        for _ in 0..3 {
            assert!(matches!(
                layer.next_record(None).unwrap(),
                NextRecord::NeedMore(2)
            ));
        }
    }

    #[test]
    fn parses_single_record() {
        let mut layer = RecordLayer::new(Side::Client);
        layer.feed(&[0x16, 0x03, 0x03, 0x00, 0x02, 0xab, 0xcd]);
        let NextRecord::Record(record) = layer.next_record(None).unwrap() else {
            panic!("expected record");
        };
        assert_eq!(record.typ, ContentType::Handshake);
        assert_eq!(record.payload, vec![0xab, 0xcd]);
        assert!(record.seq.is_none());
    }

    #[test]
    fn rejects_unknown_record_type() {
        let mut layer = RecordLayer::new(Side::Client);
        layer.feed(&[0x42, 0x03, 0x03, 0x00, 0x01, 0x00]);
        assert_eq!(
            layer.next_record(None).unwrap_err(),
            Error::InvalidMessage(InvalidMessage::InvalidContentType)
        );
    }

    #[test]
    fn rejects_bad_legacy_version() {
        let mut layer = RecordLayer::new(Side::Client);
        layer.feed(&[0x16, 0x03, 0x01, 0x00, 0x01, 0x00]);
        // a client never receives an initial record, so 0x0301 is invalid
        assert_eq!(
            layer.next_record(None).unwrap_err(),
            Error::InvalidMessage(InvalidMessage::UnknownProtocolVersion)
        );
    }

    #[test]
    fn server_accepts_0x0301_only_on_initial_record() {
        let mut layer = RecordLayer::new(Side::Server);
        layer.feed(&[0x16, 0x03, 0x01, 0x00, 0x01, 0xaa]);
        assert!(matches!(
            layer.next_record(None).unwrap(),
            NextRecord::Record(_)
        ));

        // the second record must carry 0x0303
        layer.feed(&[0x16, 0x03, 0x01, 0x00, 0x01, 0xaa]);
        assert_eq!(
            layer.next_record(None).unwrap_err(),
            Error::InvalidMessage(InvalidMessage::UnknownProtocolVersion)
        );
    }

    #[test]
    fn length_limits() {
        // handshake fragment of exactly 2^14 is accepted
        let mut layer = RecordLayer::new(Side::Client);
        let mut bytes = vec![0x16, 0x03, 0x03, 0x40, 0x00];
        bytes.extend(vec![0u8; MAX_PLAINTEXT_SIZE]);
        layer.feed(&bytes);
        assert!(matches!(
            layer.next_record(None).unwrap(),
            NextRecord::Record(_)
        ));

        // 2^14 + 1 is rejected
        let mut layer = RecordLayer::new(Side::Client);
        layer.feed(&[0x16, 0x03, 0x03, 0x40, 0x01]);
        assert_eq!(
            layer.next_record(None).unwrap_err(),
            Error::PeerSentOversizedRecord
        );

        // application data up to 2^14 + 256 is accepted...
        let mut layer = sent_layer();
        let mut bytes = vec![0x17, 0x03, 0x03, 0x41, 0x00];
        bytes.extend(vec![0u8; MAX_CIPHERTEXT_SIZE_TLS13]);
        layer.feed(&bytes);
        let mut cipher = TagCipher { seq: 0 };
        // (the all-zero "ciphertext" fails decryption, but only after the
        // length was accepted)
        assert_eq!(
            layer
                .next_record(Some(&mut cipher))
                .unwrap_err(),
            Error::DecryptError
        );

        // ...and 2^14 + 257 is not
        let mut layer = sent_layer();
        layer.feed(&[0x17, 0x03, 0x03, 0x41, 0x01]);
        assert_eq!(
            layer.next_record(None).unwrap_err(),
            Error::PeerSentOversizedRecord
        );
    }

    #[test]
    fn empty_fragment_rules() {
        // empty handshake fragment: decode_error
        let mut layer = RecordLayer::new(Side::Client);
        layer.feed(&[0x16, 0x03, 0x03, 0x00, 0x00]);
        assert_eq!(
            layer.next_record(None).unwrap_err(),
            Error::InvalidMessage(InvalidMessage::InvalidEmptyPayload)
        );

        // empty application data fragment: accepted (but requires keys)
        let mut layer = sent_layer();
        layer.feed(&[0x17, 0x03, 0x03, 0x00, 0x00]);
        let mut cipher = TagCipher { seq: 0 };
        assert_eq!(
            layer
                .next_record(Some(&mut cipher))
                .unwrap_err(),
            Error::DecryptError
        );
    }

    #[test]
    fn premature_application_data() {
        let mut layer = RecordLayer::new(Side::Client);
        layer.feed(&[0x17, 0x03, 0x03, 0x00, 0x01, 0x00]);
        assert_eq!(
            layer.next_record(None).unwrap_err(),
            Error::PeerMisbehaved(PeerMisbehaved::PrematureApplicationData)
        );
    }

    #[test]
    fn malformed_ccs_rejected() {
        let mut layer = RecordLayer::new(Side::Client);
        layer.feed(&[0x14, 0x03, 0x03, 0x00, 0x01, 0x02]);
        assert_eq!(
            layer.next_record(None).unwrap_err(),
            Error::InvalidMessage(InvalidMessage::InvalidCcs)
        );

        let mut layer = RecordLayer::new(Side::Client);
        layer.feed(&[0x14, 0x03, 0x03, 0x00, 0x02, 0x01, 0x01]);
        assert_eq!(
            layer.next_record(None).unwrap_err(),
            Error::InvalidMessage(InvalidMessage::InvalidCcs)
        );
    }

    #[test]
    fn protected_ccs_rejected() {
        let mut send = sent_layer();
        let mut cipher = TagCipher { seq: 0 };
        let wire = send
            .prepare(
                ContentType::ChangeCipherSpec,
                &[0x01],
                Some(&mut cipher),
            )
            .unwrap();

        let mut recv = RecordLayer::new(Side::Client);
        recv.feed(&wire);
        let mut cipher = TagCipher { seq: 0 };
        assert_eq!(
            recv.next_record(Some(&mut cipher))
                .unwrap_err(),
            Error::PeerMisbehaved(PeerMisbehaved::ProtectedChangeCipherSpec)
        );
    }

    #[test]
    fn first_client_record_uses_0x0301() {
        let mut layer = RecordLayer::new(Side::Client);
        let first = layer
            .prepare(ContentType::Handshake, &[0xaa], None)
            .unwrap();
        assert_eq!(&first[..5], &[0x16, 0x03, 0x01, 0x00, 0x01]);

        let second = layer
            .prepare(ContentType::Handshake, &[0xbb], None)
            .unwrap();
        assert_eq!(&second[..5], &[0x16, 0x03, 0x03, 0x00, 0x01]);
    }

    #[test]
    fn dummy_ccs_must_not_be_first() {
        let mut layer = RecordLayer::new(Side::Client);
        assert!(layer.prepare_dummy_ccs().is_err());

        let mut layer = sent_layer();
        let ccs = layer.prepare_dummy_ccs().unwrap();
        assert_eq!(ccs, vec![0x14, 0x03, 0x03, 0x00, 0x01, 0x01]);
    }

    #[test]
    fn refuses_unprotected_application_data() {
        let mut layer = sent_layer();
        assert!(layer
            .prepare(ContentType::ApplicationData, b"hi", None)
            .is_err());
    }

    #[test]
    fn refuses_empty_non_application_plaintext() {
        let mut layer = sent_layer();
        assert!(layer
            .prepare(ContentType::Handshake, &[], None)
            .is_err());
    }

    #[test]
    fn fragments_large_plaintext() {
        let mut layer = sent_layer();
        let plaintext = vec![7u8; MAX_PLAINTEXT_SIZE + 3];
        let wire = layer
            .prepare(ContentType::Handshake, &plaintext, None)
            .unwrap();
        assert_eq!(wire.len(), 2 * TLS_HEADER_SIZE + plaintext.len());
        assert_eq!(&wire[..5], &[0x16, 0x03, 0x03, 0x40, 0x00]);
        let second = 5 + MAX_PLAINTEXT_SIZE;
        assert_eq!(&wire[second..second + 5], &[0x16, 0x03, 0x03, 0x00, 0x03]);
    }

    #[test]
    fn protected_round_trip() {
        let mut send = sent_layer();
        let mut send_cipher = TagCipher { seq: 0 };
        let plaintext = vec![3u8; MAX_PLAINTEXT_SIZE + 100];
        let wire = send
            .prepare(
                ContentType::ApplicationData,
                &plaintext,
                Some(&mut send_cipher),
            )
            .unwrap();

        let mut recv = RecordLayer::new(Side::Client);
        let mut recv_cipher = TagCipher { seq: 0 };
        recv.feed(&wire);

        let mut recovered = Vec::new();
        let mut seqs = Vec::new();
        loop {
            match recv
                .next_record(Some(&mut recv_cipher))
                .unwrap()
            {
                NextRecord::Record(record) => {
                    assert_eq!(record.typ, ContentType::ApplicationData);
                    seqs.push(record.seq.unwrap());
                    recovered.extend(record.payload);
                }
                NextRecord::NeedMore(_) => break,
            }
        }

        assert_eq!(recovered, plaintext);
        assert_eq!(seqs, vec![0, 1]);
    }

    #[test]
    fn empty_protected_application_data_emits_one_record() {
        let mut send = sent_layer();
        let mut cipher = TagCipher { seq: 0 };
        let wire = send
            .prepare(ContentType::ApplicationData, &[], Some(&mut cipher))
            .unwrap();
        assert_eq!(wire.len(), TLS_HEADER_SIZE + 1 + TAG_LEN);

        let mut recv = RecordLayer::new(Side::Client);
        let mut cipher = TagCipher { seq: 0 };
        recv.feed(&wire);
        let NextRecord::Record(record) = recv
            .next_record(Some(&mut cipher))
            .unwrap()
        else {
            panic!("expected record");
        };
        assert_eq!(record.typ, ContentType::ApplicationData);
        assert!(record.payload.is_empty());
    }
}
