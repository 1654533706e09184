use std::sync::Arc;

use pki_types::ServerName;

use super::{tls13, ClientConfig, CommonState, Tls12Handoff};
use crate::check::check_message;
use crate::crypto::{ActiveKeyExchange, Side};
use crate::enums::{
    AlertDescription, CipherSuite, Compression, ContentType, ExtensionType, HandshakeType,
    ProtocolVersion,
};
use crate::error::{Error, PeerIncompatible, PeerMisbehaved};
use crate::hash_hs::{HandshakeHash, HandshakeHashBuffer};
use crate::log::{debug, trace};
use crate::msgs::codec::Codec;
use crate::msgs::handshake::{
    ClientExtension, ClientHelloPayload, HandshakeMessagePayload, HandshakePayload, KeyShareEntry,
    Random, ServerHelloPayload, SessionId,
};
use crate::msgs::message::{Message, MessagePayload};

pub(super) type NextState = Box<dyn State>;
pub(super) type NextStateOrError = Result<NextState, Error>;

/// One step of the handshake state machine.
///
/// Each `handle()` implementation consumes a whole TLS message, and
/// returns either an error or the next state.
pub(super) trait State: Send {
    fn handle(self: Box<Self>, common: &mut CommonState, m: Message) -> NextStateOrError;
}

/// Build and send the ClientHello, returning the state that expects the
/// server's reply.
pub(super) fn start_handshake(
    config: Arc<ClientConfig>,
    server_name: ServerName<'static>,
    common: &mut CommonState,
) -> NextStateOrError {
    let mut random = [0u8; 32];
    config.random.fill(&mut random)?;
    let mut session_id = [0u8; 32];
    config.random.fill(&mut session_id)?;

    let group = config
        .kx_groups
        .first()
        .copied()
        .ok_or(Error::ApiMisuse("no kx groups configured"))?;
    let offered_key_share = group.start()?;

    let mut supported_versions = vec![ProtocolVersion::TLSv1_3];
    if config.allow_tls12 {
        supported_versions.push(ProtocolVersion::TLSv1_2);
    }

    let mut exts = Vec::new();
    if let ServerName::DnsName(dns) = &server_name {
        exts.push(ClientExtension::ServerName(
            dns.as_ref().as_bytes().to_vec(),
        ));
    }
    exts.push(ClientExtension::SupportedVersions(supported_versions));
    exts.push(ClientExtension::NamedGroups(
        config
            .kx_groups
            .iter()
            .map(|group| group.name())
            .collect(),
    ));
    exts.push(ClientExtension::SignatureAlgorithms(
        config
            .verifier
            .supported_verify_schemes(),
    ));
    exts.push(ClientExtension::KeyShare(vec![KeyShareEntry::new(
        offered_key_share.group(),
        offered_key_share.pub_key(),
    )]));

    let mut cipher_suites = config.cipher_suites.clone();
    // We don't do renegotiation at all, in fact.
    cipher_suites.push(CipherSuite::TLS_EMPTY_RENEGOTIATION_INFO_SCSV);

    let chp = ClientHelloPayload {
        client_version: ProtocolVersion::TLSv1_2,
        random: Random::from(random),
        session_id: SessionId::new(session_id),
        cipher_suites,
        compression_methods: vec![Compression::Null],
        extensions: exts,
    };

    let ch = Message {
        version: ProtocolVersion::TLSv1_3,
        payload: MessagePayload::handshake(HandshakeMessagePayload {
            typ: HandshakeType::ClientHello,
            payload: HandshakePayload::ClientHello(chp.clone()),
        }),
    };

    trace!("sending ClientHello");
    let mut transcript_buffer = HandshakeHashBuffer::new();
    transcript_buffer.add_message(&ch);
    common.send_msg(ch, false)?;
    common.ccs_permitted = true;

    Ok(Box::new(ExpectServerHelloOrHelloRetryRequest(
        ExpectServerHello {
            config,
            server_name,
            chp,
            offered_key_share,
            transcript_buffer,
            transcript: None,
            retried: None,
        },
    )))
}

/// What a HelloRetryRequest pinned down; the subsequent ServerHello may
/// not vary it.
struct RetryState {
    cipher_suite: CipherSuite,
    selected_version: ProtocolVersion,
}

struct ExpectServerHello {
    config: Arc<ClientConfig>,
    server_name: ServerName<'static>,
    chp: ClientHelloPayload,
    offered_key_share: Box<dyn ActiveKeyExchange>,
    transcript_buffer: HandshakeHashBuffer,
    transcript: Option<HandshakeHash>,
    retried: Option<RetryState>,
}

struct ExpectServerHelloOrHelloRetryRequest(ExpectServerHello);

/// The validation shared between ServerHello and HelloRetryRequest.
/// RFC 8446 sections 4.1.3 and 4.1.4.
fn validate_server_hello_ish(
    common: &mut CommonState,
    chp: &ClientHelloPayload,
    session_id_echo: &SessionId,
    cipher_suite: CipherSuite,
    selected_version: ProtocolVersion,
    ext_types: &[ExtensionType],
) -> Result<(), Error> {
    if session_id_echo != &chp.session_id {
        return Err(common.send_fatal_alert(
            AlertDescription::IllegalParameter,
            PeerMisbehaved::EchoedSessionIdDidNotMatch,
        ));
    }

    if !chp.offered_suite(cipher_suite) {
        return Err(common.send_fatal_alert(
            AlertDescription::IllegalParameter,
            PeerMisbehaved::SelectedUnofferedCipherSuite,
        ));
    }

    match selected_version {
        ProtocolVersion::TLSv1_3 if chp.offered_version(ProtocolVersion::TLSv1_3) => {}
        ProtocolVersion::TLSv1_2 => {
            return Err(common.send_fatal_alert(
                AlertDescription::IllegalParameter,
                PeerMisbehaved::SelectedTls12UsingTls13VersionExtension,
            ));
        }
        _ => {
            return Err(common.send_fatal_alert(
                AlertDescription::IllegalParameter,
                PeerMisbehaved::SelectedUnofferedVersion,
            ));
        }
    }

    // RFC 8446 4.1.4: no extensions we did not first offer, with the lone
    // exception of cookie
    let offered = chp.sent_extensions();
    for typ in ext_types {
        if *typ != ExtensionType::Cookie && !offered.contains(typ) {
            return Err(common.send_fatal_alert(
                AlertDescription::UnsupportedExtension,
                PeerMisbehaved::UnsolicitedServerHelloExtension,
            ));
        }
    }

    Ok(())
}

impl State for ExpectServerHello {
    fn handle(self: Box<Self>, common: &mut CommonState, m: Message) -> NextStateOrError {
        let st = *self;
        let sh =
            require_handshake_msg!(m, HandshakeType::ServerHello, HandshakePayload::ServerHello)?;
        trace!("got ServerHello {sh:?}");

        if sh.compression_method != Compression::Null {
            return Err(common.send_fatal_alert(
                AlertDescription::IllegalParameter,
                PeerMisbehaved::SelectedNonNullCompression,
            ));
        }

        if sh.has_duplicate_extension() {
            return Err(common.send_fatal_alert(
                AlertDescription::IllegalParameter,
                PeerMisbehaved::DuplicateServerHelloExtensions,
            ));
        }

        // A ServerHello without supported_versions is a server speaking
        // TLS 1.2 or below.
        let Some(selected_version) = sh.supported_versions() else {
            return st.handle_tls12_server_hello(common, sh);
        };

        validate_server_hello_ish(
            common,
            &st.chp,
            &sh.session_id,
            sh.cipher_suite,
            selected_version,
            &sh.ext_types(),
        )?;

        // RFC 8446 4.1.4: the ServerHello may not vary what the
        // HelloRetryRequest already pinned down.
        if let Some(retry) = &st.retried {
            if sh.cipher_suite != retry.cipher_suite {
                return Err(common.send_fatal_alert(
                    AlertDescription::IllegalParameter,
                    PeerMisbehaved::SelectedDifferentCipherSuiteAfterRetry,
                ));
            }
            if selected_version != retry.selected_version {
                return Err(common.send_fatal_alert(
                    AlertDescription::IllegalParameter,
                    PeerMisbehaved::SelectedDifferentVersionAfterRetry,
                ));
            }
        }

        // RFC 8446 4.1.3: downgrade protection sentinels
        if sh.random_signals_downgrade().is_some() {
            return Err(common.send_fatal_alert(
                AlertDescription::IllegalParameter,
                PeerMisbehaved::AttemptedDowngradeToTls12WhenTls13IsSupported,
            ));
        }

        // A ServerHello without a key share means PSK-only key
        // establishment, which we do not implement.
        let Some(their_share) = sh.key_share() else {
            return Err(common.send_fatal_alert(
                AlertDescription::HandshakeFailure,
                PeerIncompatible::ServerSentPskOnlyServerHello,
            ));
        };

        if their_share.group != st.offered_key_share.group() {
            return Err(common.send_fatal_alert(
                AlertDescription::IllegalParameter,
                PeerMisbehaved::WrongGroupForKeyShare,
            ));
        }

        let Some(hash) = st
            .config
            .hash_provider
            .for_suite(sh.cipher_suite)
        else {
            return Err(common.send_fatal_alert(
                AlertDescription::IllegalParameter,
                PeerMisbehaved::SelectedUnofferedCipherSuite,
            ));
        };
        debug!("using ciphersuite {:?}", sh.cipher_suite);

        let shared_secret = st
            .offered_key_share
            .complete(&their_share.payload.0)
            .map_err(|err| common.send_fatal_alert(AlertDescription::IllegalParameter, err))?;

        let mut transcript = match st.transcript {
            Some(transcript) => transcript,
            None => st.transcript_buffer.start_hash(hash),
        };
        transcript.add_message(&m);

        let cipher_state = st
            .config
            .cipher_state_factory
            .init_with_server_hello(
                Side::Client,
                shared_secret,
                sh.cipher_suite,
                &transcript.current_hash(),
            )?;
        common.cipher_state = Some(cipher_state);

        if let Some(events) = st.config.events() {
            events.examine_extensions(Side::Server, &sh.ext_types());
        }

        Ok(Box::new(tls13::ExpectEncryptedExtensions {
            config: st.config,
            server_name: st.server_name,
            suite: sh.cipher_suite,
            transcript,
            chp: st.chp,
        }))
    }
}

impl ExpectServerHello {
    /// The server answered with TLS 1.2 or below.  If that survives the
    /// downgrade checks, this instance is to be replaced by a TLS 1.2
    /// client; we surface the hand-off material and stop.
    fn handle_tls12_server_hello(
        self,
        common: &mut CommonState,
        sh: &ServerHelloPayload,
    ) -> NextStateOrError {
        // RFC 8446 4.1.4: a server must not downgrade after HelloRetryRequest
        if self.retried.is_some() {
            return Err(common.send_fatal_alert(
                AlertDescription::UnexpectedMessage,
                PeerMisbehaved::DowngradeAfterHelloRetryRequest,
            ));
        }

        // RFC 8446 4.1.3: check the downgrade protection sentinels
        if sh.random_signals_downgrade().is_some() {
            return Err(common.send_fatal_alert(
                AlertDescription::IllegalParameter,
                PeerMisbehaved::AttemptedDowngradeToTls12WhenTls13IsSupported,
            ));
        }

        // If TLS 1.2 is disabled by policy we never offered it, and there
        // is no client to hand off to.
        if !self.config.allow_tls12 {
            return Err(common.send_fatal_alert(
                AlertDescription::ProtocolVersion,
                PeerIncompatible::Tls12NotOffered,
            ));
        }

        // The selected legacy version must be one we offered.
        if !self
            .chp
            .offered_version(sh.legacy_version)
        {
            return Err(common.send_fatal_alert(
                AlertDescription::IllegalParameter,
                PeerMisbehaved::SelectedUnofferedVersion,
            ));
        }

        debug!("server chose {:?}; handing off", sh.legacy_version);

        let client_hello = HandshakeMessagePayload {
            typ: HandshakeType::ClientHello,
            payload: HandshakePayload::ClientHello(self.chp),
        }
        .get_encoding();

        common.handoff = Some(Tls12Handoff {
            client_hello,
            residual_input: common.record_layer.take_residual(),
            residual_handshake: Vec::new(),
        });
        common.handed_off = true;

        Ok(Box::new(ExpectHandoff))
    }
}

impl State for ExpectServerHelloOrHelloRetryRequest {
    fn handle(self: Box<Self>, common: &mut CommonState, m: Message) -> NextStateOrError {
        check_message(
            &m,
            &[ContentType::Handshake],
            &[HandshakeType::ServerHello, HandshakeType::HelloRetryRequest],
        )?;

        if m.is_handshake_type(HandshakeType::ServerHello) {
            Box::new(self.0).handle(common, m)
        } else {
            self.handle_hello_retry_request(common, m)
        }
    }
}

impl ExpectServerHelloOrHelloRetryRequest {
    fn handle_hello_retry_request(self, common: &mut CommonState, m: Message) -> NextStateOrError {
        let mut st = self.0;
        let hrr = require_handshake_msg!(
            m,
            HandshakeType::HelloRetryRequest,
            HandshakePayload::HelloRetryRequest
        )?;
        trace!("got HelloRetryRequest {hrr:?}");

        if hrr.has_duplicate_extension() {
            return Err(common.send_fatal_alert(
                AlertDescription::IllegalParameter,
                PeerMisbehaved::DuplicateHelloRetryRequestExtensions,
            ));
        }

        let Some(selected_version) = hrr.supported_versions() else {
            return Err(common.send_fatal_alert(
                AlertDescription::IllegalParameter,
                PeerMisbehaved::IllegalHelloRetryRequestWithUnsupportedVersion,
            ));
        };

        validate_server_hello_ish(
            common,
            &st.chp,
            &hrr.session_id,
            hrr.cipher_suite,
            selected_version,
            &hrr.ext_types(),
        )?;

        let cookie = hrr.cookie().cloned();
        if let Some(cookie) = &cookie {
            if cookie.0.is_empty() {
                return Err(common.send_fatal_alert(
                    AlertDescription::IllegalParameter,
                    PeerMisbehaved::IllegalHelloRetryRequestWithEmptyCookie,
                ));
            }
        }

        // RFC 8446 4.1.4: a retry must actually change something
        let req_group = hrr.requested_key_share_group();
        let offered_group = st.offered_key_share.group();

        if cookie.is_none() && req_group == Some(offered_group) {
            return Err(common.send_fatal_alert(
                AlertDescription::IllegalParameter,
                PeerMisbehaved::IllegalHelloRetryRequestWithOfferedGroup,
            ));
        }

        if cookie.is_none() && req_group.is_none() {
            return Err(common.send_fatal_alert(
                AlertDescription::IllegalParameter,
                PeerMisbehaved::IllegalHelloRetryRequestWithNoChanges,
            ));
        }

        let Some(hash) = st
            .config
            .hash_provider
            .for_suite(hrr.cipher_suite)
        else {
            return Err(common.send_fatal_alert(
                AlertDescription::IllegalParameter,
                PeerMisbehaved::IllegalHelloRetryRequestWithUnofferedCipherSuite,
            ));
        };

        let key_share = match req_group {
            Some(group) if group != offered_group => {
                let Some(skxg) = st.config.find_kx_group(group) else {
                    return Err(common.send_fatal_alert(
                        AlertDescription::IllegalParameter,
                        PeerMisbehaved::IllegalHelloRetryRequestWithUnofferedNamedGroup,
                    ));
                };
                skxg.start()?
            }
            _ => st.offered_key_share,
        };

        // RFC 8446 4.4.1: the transcript restarts with a synthetic
        // message_hash message standing in for ClientHello1
        let mut transcript = st.transcript_buffer.start_hash(hash);
        transcript.rollup_for_hrr();
        transcript.add_message(&m);

        st.chp
            .replace_key_share(KeyShareEntry::new(key_share.group(), key_share.pub_key()));
        if let Some(cookie) = cookie {
            st.chp.set_cookie(cookie);
        }

        // RFC 8446 D.4: dummy CCS immediately before the second flight
        if st.config.middlebox_compatibility_mode {
            common.send_fake_ccs()?;
        }

        let ch = Message {
            version: ProtocolVersion::TLSv1_3,
            payload: MessagePayload::handshake(HandshakeMessagePayload {
                typ: HandshakeType::ClientHello,
                payload: HandshakePayload::ClientHello(st.chp.clone()),
            }),
        };
        transcript.add_message(&ch);
        common.send_msg(ch, false)?;
        trace!("resent ClientHello");

        // RFC 8446 4.1.4: a second HelloRetryRequest is fatal, so the
        // next state expects exactly a ServerHello
        Ok(Box::new(ExpectServerHello {
            config: st.config,
            server_name: st.server_name,
            chp: st.chp,
            offered_key_share: key_share,
            transcript_buffer: HandshakeHashBuffer::new(),
            transcript: Some(transcript),
            retried: Some(RetryState {
                cipher_suite: hrr.cipher_suite,
                selected_version,
            }),
        }))
    }
}

/// Terminal state after a TLS 1.2 hand-off: nothing further is expected
/// from this instance.
struct ExpectHandoff;

impl State for ExpectHandoff {
    fn handle(self: Box<Self>, _common: &mut CommonState, m: Message) -> NextStateOrError {
        Err(crate::check::inappropriate_handshake_message(
            &m.payload,
            &[],
            &[],
        ))
    }
}
