use std::sync::Arc;

use pki_types::{CertificateDer, ServerName};
use subtle::ConstantTimeEq;

use super::hs::{NextStateOrError, State};
use super::{ClientConfig, CommonState};
use crate::check::inappropriate_handshake_message;
use crate::crypto::Side;
use crate::enums::{
    AlertDescription, CipherSuite, ContentType, ExtensionType, HandshakeType, KeyUpdateRequest,
    ProtocolVersion,
};
use crate::error::{Error, InvalidMessage, PeerIncompatible, PeerMisbehaved};
use crate::hash_hs::HandshakeHash;
use crate::log::{debug, trace};
use crate::msgs::base::{Payload, PayloadU8};
use crate::msgs::handshake::{
    has_duplicates, CertificatePayloadTls13, ClientHelloPayload, HandshakeMessagePayload,
    HandshakePayload, ServerExtension,
};
use crate::msgs::message::{Message, MessagePayload};
use crate::verify::construct_server_verify_message;

pub(super) struct ExpectEncryptedExtensions {
    pub(super) config: Arc<ClientConfig>,
    pub(super) server_name: ServerName<'static>,
    pub(super) suite: CipherSuite,
    pub(super) transcript: HandshakeHash,
    pub(super) chp: ClientHelloPayload,
}

impl State for ExpectEncryptedExtensions {
    fn handle(self: Box<Self>, common: &mut CommonState, m: Message) -> NextStateOrError {
        let mut st = *self;
        let exts = require_handshake_msg!(
            m,
            HandshakeType::EncryptedExtensions,
            HandshakePayload::EncryptedExtensions
        )?;
        debug!("TLS 1.3 encrypted extensions: {exts:?}");
        st.transcript.add_message(&m);

        let ext_types: Vec<ExtensionType> = exts
            .iter()
            .map(ServerExtension::ext_type)
            .collect();
        if has_duplicates::<_, _, u16>(ext_types.iter().copied()) {
            return Err(common.send_fatal_alert(
                AlertDescription::DecodeError,
                PeerMisbehaved::DuplicateEncryptedExtensions,
            ));
        }

        let offered = st.chp.sent_extensions();
        for ext in exts {
            // hello-phase extensions must not reappear here
            let hello_phase = matches!(
                ext,
                ServerExtension::SupportedVersions(_) | ServerExtension::KeyShare(_)
            );
            if hello_phase || !offered.contains(&ext.ext_type()) {
                return Err(common.send_fatal_alert(
                    AlertDescription::UnsupportedExtension,
                    PeerMisbehaved::UnsolicitedEncryptedExtension,
                ));
            }
        }

        if let Some(events) = st.config.events() {
            events.examine_extensions(Side::Server, &ext_types);
        }

        Ok(Box::new(ExpectCertificateOrCertReq {
            config: st.config,
            server_name: st.server_name,
            suite: st.suite,
            transcript: st.transcript,
            chp: st.chp,
        }))
    }
}

struct ExpectCertificateOrCertReq {
    config: Arc<ClientConfig>,
    server_name: ServerName<'static>,
    suite: CipherSuite,
    transcript: HandshakeHash,
    chp: ClientHelloPayload,
}

impl State for ExpectCertificateOrCertReq {
    fn handle(self: Box<Self>, common: &mut CommonState, m: Message) -> NextStateOrError {
        match m.payload {
            MessagePayload::Handshake {
                parsed:
                    HandshakeMessagePayload {
                        payload: HandshakePayload::CertificateTls13(..),
                        ..
                    },
                ..
            } => Box::new(ExpectCertificate {
                config: self.config,
                server_name: self.server_name,
                suite: self.suite,
                transcript: self.transcript,
                chp: self.chp,
                client_auth_requested: false,
            })
            .handle(common, m),
            MessagePayload::Handshake {
                parsed:
                    HandshakeMessagePayload {
                        payload: HandshakePayload::CertificateRequestTls13(..),
                        ..
                    },
                ..
            } => Box::new(ExpectCertificateRequest {
                config: self.config,
                server_name: self.server_name,
                suite: self.suite,
                transcript: self.transcript,
                chp: self.chp,
            })
            .handle(common, m),
            payload => Err(inappropriate_handshake_message(
                &payload,
                &[ContentType::Handshake],
                &[
                    HandshakeType::Certificate,
                    HandshakeType::CertificateRequest,
                ],
            )),
        }
    }
}

struct ExpectCertificateRequest {
    config: Arc<ClientConfig>,
    server_name: ServerName<'static>,
    suite: CipherSuite,
    transcript: HandshakeHash,
    chp: ClientHelloPayload,
}

impl State for ExpectCertificateRequest {
    fn handle(self: Box<Self>, common: &mut CommonState, m: Message) -> NextStateOrError {
        let mut st = *self;
        let certreq = require_handshake_msg!(
            m,
            HandshakeType::CertificateRequest,
            HandshakePayload::CertificateRequestTls13
        )?;
        st.transcript.add_message(&m);
        debug!("got CertificateRequest {certreq:?}");

        // RFC 8446 4.3.2: the context must be empty during the handshake
        if !certreq.context.0.is_empty() {
            return Err(common.send_fatal_alert(
                AlertDescription::DecodeError,
                InvalidMessage::InvalidCertRequest,
            ));
        }

        // RFC 8446 4.3.2: the signature_algorithms extension must be given
        if certreq
            .sigalgs_extension()
            .map(<[_]>::is_empty)
            .unwrap_or(true)
        {
            return Err(common.send_fatal_alert(
                AlertDescription::HandshakeFailure,
                PeerIncompatible::NoCertificateRequestSignatureSchemesInCommon,
            ));
        }

        // We have no client certificate to offer; an empty Certificate
        // message goes out with our second flight.
        Ok(Box::new(ExpectCertificate {
            config: st.config,
            server_name: st.server_name,
            suite: st.suite,
            transcript: st.transcript,
            chp: st.chp,
            client_auth_requested: true,
        }))
    }
}

struct ExpectCertificate {
    config: Arc<ClientConfig>,
    server_name: ServerName<'static>,
    suite: CipherSuite,
    transcript: HandshakeHash,
    chp: ClientHelloPayload,
    client_auth_requested: bool,
}

impl State for ExpectCertificate {
    fn handle(self: Box<Self>, common: &mut CommonState, m: Message) -> NextStateOrError {
        let mut st = *self;
        st.transcript.add_message(&m);
        let cert_chain = require_handshake_msg_move!(
            m,
            HandshakeType::Certificate,
            HandshakePayload::CertificateTls13
        )?;

        // This is only non-empty for client auth.
        if !cert_chain.context.0.is_empty() {
            return Err(common.send_fatal_alert(
                AlertDescription::DecodeError,
                InvalidMessage::InvalidCertRequest,
            ));
        }

        if cert_chain.any_entry_has_duplicate_extension() {
            return Err(common.send_fatal_alert(
                AlertDescription::IllegalParameter,
                PeerMisbehaved::DuplicateCertificateEntryExtensions,
            ));
        }

        if cert_chain
            .unsolicited_extension(&st.chp.sent_extensions())
            .is_some()
        {
            return Err(common.send_fatal_alert(
                AlertDescription::UnsupportedExtension,
                PeerMisbehaved::UnsolicitedCertificateEntryExtension,
            ));
        }

        // RFC 8446 4.4.2.4: an empty Certificate message is fatal
        if cert_chain.entries.is_empty() {
            return Err(common.send_fatal_alert(
                AlertDescription::DecodeError,
                Error::NoCertificatesPresented,
            ));
        }

        let chain = cert_chain.into_certificate_chain();
        let (end_entity, intermediates) = match chain.split_first() {
            Some(split) => split,
            None => return Err(Error::NoCertificatesPresented),
        };

        let now = st
            .config
            .time_provider
            .current_time()
            .ok_or(Error::FailedToGetCurrentTime)?;

        // OCSP stapling is not implemented: the response is always empty.
        let cert_verified = st
            .config
            .verifier
            .verify_server_cert(end_entity, intermediates, &st.server_name, &[], now)
            .map_err(|err| common.send_cert_error_alert(err))?;

        Ok(Box::new(ExpectCertificateVerify {
            config: st.config,
            suite: st.suite,
            transcript: st.transcript,
            chp: st.chp,
            cert_chain: chain,
            client_auth_requested: st.client_auth_requested,
            cert_verified,
        }))
    }
}

struct ExpectCertificateVerify {
    config: Arc<ClientConfig>,
    suite: CipherSuite,
    transcript: HandshakeHash,
    chp: ClientHelloPayload,
    cert_chain: Vec<CertificateDer<'static>>,
    client_auth_requested: bool,
    cert_verified: crate::verify::ServerCertVerified,
}

impl State for ExpectCertificateVerify {
    fn handle(self: Box<Self>, common: &mut CommonState, m: Message) -> NextStateOrError {
        let mut st = *self;
        let cert_verify = require_handshake_msg!(
            m,
            HandshakeType::CertificateVerify,
            HandshakePayload::CertificateVerify
        )?;
        trace!("got CertificateVerify {cert_verify:?}");

        // RFC 8446 4.4.3: the scheme must be one we advertised
        if !st
            .chp
            .signature_schemes()
            .contains(&cert_verify.scheme)
        {
            return Err(common.send_fatal_alert(
                AlertDescription::IllegalParameter,
                PeerMisbehaved::SignedHandshakeWithUnadvertisedSigScheme,
            ));
        }

        // the signature covers the transcript as it stood before this
        // message
        let handshake_hash = st.transcript.current_hash();
        let message = construct_server_verify_message(&handshake_hash);

        let sig_verified = st
            .config
            .verifier
            .verify_tls13_signature(&message, &st.cert_chain[0], cert_verify)
            .map_err(|err| common.send_cert_error_alert(err))?;

        st.transcript.add_message(&m);
        common.peer_certificates = Some(st.cert_chain);

        Ok(Box::new(ExpectFinished {
            config: st.config,
            suite: st.suite,
            transcript: st.transcript,
            client_auth_requested: st.client_auth_requested,
            _cert_verified: st.cert_verified,
            _sig_verified: sig_verified,
        }))
    }
}

struct ExpectFinished {
    config: Arc<ClientConfig>,
    suite: CipherSuite,
    transcript: HandshakeHash,
    client_auth_requested: bool,
    _cert_verified: crate::verify::ServerCertVerified,
    _sig_verified: crate::verify::HandshakeSignatureValid,
}

impl State for ExpectFinished {
    fn handle(self: Box<Self>, common: &mut CommonState, m: Message) -> NextStateOrError {
        let mut st = *self;
        let finished =
            require_handshake_msg!(m, HandshakeType::Finished, HandshakePayload::Finished)?;

        // RFC 8446 4.4.4: the MAC covers the transcript as it stood
        // before this message
        let expect_verify_data = match common.cipher_state.as_deref() {
            Some(cipher_state) => {
                cipher_state.sign_finished(Side::Server, &st.transcript.current_hash())
            }
            None => return Err(Error::General("no cipher state at server Finished".into())),
        };

        if !bool::from(
            expect_verify_data
                .as_slice()
                .ct_eq(finished.0.as_slice()),
        ) {
            return Err(common.send_fatal_alert(
                AlertDescription::DecryptError,
                PeerMisbehaved::IncorrectFinished,
            ));
        }

        st.transcript.add_message(&m);
        let hash_after_server_finished = st.transcript.current_hash();

        // RFC 8446 5.: a dummy CCS from the peer is no longer tolerated
        common.ccs_permitted = false;

        // RFC 8446 D.4: dummy CCS before our second flight, unless one
        // already went out before a retried ClientHello
        if st.config.middlebox_compatibility_mode {
            common.send_fake_ccs()?;
        }

        if st.client_auth_requested {
            // we never hold a client certificate, so the answer is an
            // empty Certificate message
            let cert = Message {
                version: ProtocolVersion::TLSv1_3,
                payload: MessagePayload::handshake(HandshakeMessagePayload {
                    typ: HandshakeType::Certificate,
                    payload: HandshakePayload::CertificateTls13(CertificatePayloadTls13 {
                        context: PayloadU8::empty(),
                        entries: Vec::new(),
                    }),
                }),
            };
            st.transcript.add_message(&cert);
            common.send_msg(cert, true)?;
        }

        // our Finished is still protected by the handshake traffic keys
        let verify_data = match common.cipher_state.as_deref() {
            Some(cipher_state) => {
                cipher_state.sign_finished(Side::Client, &st.transcript.current_hash())
            }
            None => return Err(Error::General("no cipher state at client Finished".into())),
        };

        let finished_msg = Message {
            version: ProtocolVersion::TLSv1_3,
            payload: MessagePayload::handshake(HandshakeMessagePayload {
                typ: HandshakeType::Finished,
                payload: HandshakePayload::Finished(Payload::new(verify_data)),
            }),
        };
        st.transcript.add_message(&finished_msg);
        common.send_msg(finished_msg, true)?;
        let hash_after_client_finished = st.transcript.current_hash();

        // Now move to the application traffic keys.  The server side is
        // keyed by the transcript at its Finished, ours by the transcript
        // at our Finished; the order of these calls matters.
        let Some(cipher_state) = common.cipher_state.as_deref_mut() else {
            return Err(Error::General("no cipher state at handshake end".into()));
        };
        cipher_state.advance_with_server_finished(&hash_after_server_finished);
        cipher_state.advance_with_client_finished(&hash_after_client_finished);

        common.session_activated = true;
        debug!("handshake complete with {:?}", st.suite);
        if let Some(events) = st.config.events() {
            events.session_activated();
        }

        Ok(Box::new(ExpectTraffic {
            config: st.config,
            key_update_count: 0,
        }))
    }
}

/// Traffic transit state.  In this state we can be sent tickets, key
/// updates, and application data.
struct ExpectTraffic {
    config: Arc<ClientConfig>,
    key_update_count: usize,
}

impl ExpectTraffic {
    fn handle_key_update(
        &mut self,
        common: &mut CommonState,
        request: KeyUpdateRequest,
    ) -> Result<(), Error> {
        // a peer looping on KeyUpdate can force us into endless rekeying;
        // bound it
        self.key_update_count += 1;
        if self.key_update_count > self.config.max_peer_key_updates {
            return Err(common.send_fatal_alert(
                AlertDescription::IllegalParameter,
                PeerMisbehaved::TooManyKeyUpdateRequests,
            ));
        }

        debug!("got KeyUpdate {request:?}");
        match common.cipher_state.as_deref_mut() {
            Some(cipher_state) => cipher_state.update_read_keys(),
            None => return Err(Error::General("no cipher state at KeyUpdate".into())),
        }

        // RFC 8446 4.6.3: answer update_requested with a KeyUpdate of our
        // own before the next application data record
        if request == KeyUpdateRequest::UpdateRequested {
            common.send_msg(Message::build_key_update_notify(), true)?;
            if let Some(cipher_state) = common.cipher_state.as_deref_mut() {
                cipher_state.update_write_keys();
            }
        }

        Ok(())
    }
}

impl State for ExpectTraffic {
    fn handle(mut self: Box<Self>, common: &mut CommonState, m: Message) -> NextStateOrError {
        match m.payload {
            MessagePayload::ApplicationData(payload) => common
                .received_plaintext
                .extend(payload.0),
            MessagePayload::Handshake {
                parsed:
                    HandshakeMessagePayload {
                        payload: HandshakePayload::NewSessionTicketTls13(_),
                        ..
                    },
                ..
            } => {
                // resumption is not implemented; accept and discard
                debug!("ignoring NewSessionTicket");
            }
            MessagePayload::Handshake {
                parsed:
                    HandshakeMessagePayload {
                        payload: HandshakePayload::KeyUpdate(request),
                        ..
                    },
                ..
            } => self.handle_key_update(common, request)?,
            payload => {
                return Err(inappropriate_handshake_message(
                    &payload,
                    &[ContentType::ApplicationData, ContentType::Handshake],
                    &[HandshakeType::NewSessionTicket, HandshakeType::KeyUpdate],
                ));
            }
        }

        Ok(self)
    }
}
