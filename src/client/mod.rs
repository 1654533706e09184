//! The TLS 1.3 client: configuration, the connection object, and the
//! handshake state machine.

use std::sync::Arc;

use pki_types::{CertificateDer, ServerName};

use crate::crypto::{
    CipherState, CipherStateFactory, HashProvider, SecureRandom, Side, SupportedKxGroup,
    TimeProvider,
};
use crate::enums::{
    AlertDescription, AlertLevel, CipherSuite, ContentType, ExtensionType, NamedGroup,
};
use crate::error::{Error, PeerMisbehaved};
use crate::log::{debug, warn};
use crate::msgs::alert::AlertMessagePayload;
use crate::msgs::codec::Codec;
use crate::msgs::hsjoiner::HandshakeJoiner;
use crate::msgs::message::{Message, MessagePayload, PlainMessage};
use crate::record::{NextRecord, Record, RecordLayer};
use crate::verify::ServerCertVerifier;

mod hs;
mod tls13;


use hs::State;

/// Observational callbacks fired as the handshake progresses.
///
/// All methods have empty default implementations.
pub trait HandshakeEvents: Send + Sync {
    /// Called with the extension types present in each hello-phase message
    /// received from `side`.
    fn examine_extensions(&self, side: Side, extensions: &[ExtensionType]) {
        let _ = (side, extensions);
    }

    /// Called exactly once, after the client Finished has been emitted and
    /// the cipher state fully advanced to application traffic.
    fn session_activated(&self) {}
}

/// Common configuration for all connections made by a program.
///
/// There is no config *loading* here: the caller assembles this value,
/// plugging in the cryptographic collaborators.
#[derive(Clone)]
pub struct ClientConfig {
    /// Cipher suites offered, in preference order.
    pub cipher_suites: Vec<CipherSuite>,

    /// Key-exchange groups offered, in preference order.  The first group
    /// provides the ClientHello key share.
    pub kx_groups: Vec<&'static dyn SupportedKxGroup>,

    /// How to verify the server's certificate chain and handshake
    /// signature.
    pub verifier: Arc<dyn ServerCertVerifier>,

    /// Derives traffic secrets once a ServerHello fixes the connection
    /// parameters.
    pub cipher_state_factory: Arc<dyn CipherStateFactory>,

    /// Transcript hash implementations.
    pub hash_provider: &'static dyn HashProvider,

    /// Source of random bytes for hello randoms and session ids.
    pub random: Arc<dyn SecureRandom>,

    /// Source of the current time, for certificate validity.
    pub time_provider: Arc<dyn TimeProvider>,

    /// Observational callbacks, if any.
    pub events: Option<Arc<dyn HandshakeEvents>>,

    /// Whether a server choosing TLS 1.2 results in a [`Tls12Handoff`]
    /// rather than an error.  When false, TLS 1.2 is not offered at all.
    pub allow_tls12: bool,

    /// Middlebox compatibility mode: send a dummy change_cipher_spec
    /// record before the second flight.  RFC 8446 appendix D.4.
    pub middlebox_compatibility_mode: bool,

    /// How many peer-initiated KeyUpdates are tolerated over the life of
    /// the connection before it is torn down.
    pub max_peer_key_updates: usize,
}

impl ClientConfig {
    pub(crate) fn find_kx_group(&self, name: NamedGroup) -> Option<&'static dyn SupportedKxGroup> {
        self.kx_groups
            .iter()
            .copied()
            .find(|group| group.name() == name)
    }

    fn events(&self) -> Option<&dyn HandshakeEvents> {
        self.events.as_deref()
    }
}

/// The material a host needs to continue a connection with a TLS 1.2
/// client implementation, produced when the server negotiates TLS 1.2.
///
/// Constructing that client is outside the scope of this crate.
#[derive(Debug)]
pub struct Tls12Handoff {
    /// The wire encoding of the ClientHello handshake message we sent.
    pub client_hello: Vec<u8>,
    /// Inbound bytes past the ServerHello record that were never parsed.
    pub residual_input: Vec<u8>,
    /// Handshake-message bytes that shared a record with the ServerHello.
    pub residual_handshake: Vec<u8>,
}

/// Connection state shared between the connection object and the
/// handshake states.
pub(crate) struct CommonState {
    pub(crate) record_layer: RecordLayer,
    pub(crate) cipher_state: Option<Box<dyn CipherState>>,
    pub(crate) sendable_tls: Vec<u8>,
    pub(crate) received_plaintext: Vec<u8>,
    pub(crate) sent_fake_ccs: bool,
    /// A dummy CCS from the peer is tolerated between our first
    /// ClientHello and the server Finished.
    pub(crate) ccs_permitted: bool,
    pub(crate) session_activated: bool,
    pub(crate) peer_certificates: Option<Vec<CertificateDer<'static>>>,
    pub(crate) handoff: Option<Tls12Handoff>,
    pub(crate) handed_off: bool,
    pub(crate) peer_closed: bool,
    sent_alert: bool,
}

impl CommonState {
    fn new() -> Self {
        Self {
            record_layer: RecordLayer::new(Side::Client),
            cipher_state: None,
            sendable_tls: Vec::new(),
            received_plaintext: Vec::new(),
            sent_fake_ccs: false,
            ccs_permitted: false,
            session_activated: false,
            peer_certificates: None,
            handoff: None,
            handed_off: false,
            peer_closed: false,
            sent_alert: false,
        }
    }

    /// Encode and frame `m`, encrypting it when `encrypt` is set, and
    /// queue the result for the peer.
    pub(crate) fn send_msg(&mut self, m: Message, encrypt: bool) -> Result<(), Error> {
        let plain = PlainMessage::from(m);
        let cipher_state: Option<&mut dyn CipherState> = if encrypt {
            match self.cipher_state.as_mut() {
                Some(cs) => Some(&mut **cs),
                None => None,
            }
        } else {
            None
        };
        let wire = self
            .record_layer
            .prepare(plain.typ, &plain.payload.0, cipher_state)?;
        self.sendable_tls.extend(wire);
        Ok(())
    }

    /// Send a dummy change_cipher_spec record, at most once per
    /// connection.
    pub(crate) fn send_fake_ccs(&mut self) -> Result<(), Error> {
        if std::mem::replace(&mut self.sent_fake_ccs, true) {
            return Ok(());
        }

        let wire = self.record_layer.prepare_dummy_ccs()?;
        self.sendable_tls.extend(wire);
        Ok(())
    }

    /// Queue a fatal alert describing `desc` and return `err` for
    /// propagation to the caller.
    pub(crate) fn send_fatal_alert(
        &mut self,
        desc: AlertDescription,
        err: impl Into<Error>,
    ) -> Error {
        self.emit_alert(desc);
        err.into()
    }

    fn emit_alert(&mut self, desc: AlertDescription) {
        if std::mem::replace(&mut self.sent_alert, true) {
            return;
        }

        warn!("sending fatal alert {desc:?}");
        let m = Message::build_alert(AlertLevel::Fatal, desc);
        // failure to frame the alert loses it, but the connection is dead
        // either way
        let _ = self.send_msg(m, self.cipher_state.is_some());
    }

    /// An error from certificate or signature verification, translated
    /// into its alert.
    pub(crate) fn send_cert_error_alert(&mut self, err: Error) -> Error {
        let desc =
            AlertDescription::try_from(&err).unwrap_or(AlertDescription::BadCertificate);
        self.send_fatal_alert(desc, err)
    }

    fn next_record(&mut self) -> Result<NextRecord, Error> {
        let cipher_state: Option<&mut dyn CipherState> = match self.cipher_state.as_mut() {
            Some(cs) => Some(&mut **cs),
            None => None,
        };
        self.record_layer.next_record(cipher_state)
    }
}

/// A client-side TLS 1.3 connection.
///
/// The caller shuttles bytes: peer-to-us bytes go into
/// [`ClientConnection::read_tls`] followed by
/// [`ClientConnection::process_new_packets`]; us-to-peer bytes come out of
/// [`ClientConnection::take_tls_output`].
pub struct ClientConnection {
    common: CommonState,
    joiner: HandshakeJoiner,
    state: Option<Box<dyn State>>,
    error: Option<Error>,
}

impl ClientConnection {
    /// Make a new connection to `name`, queueing the ClientHello.
    pub fn new(config: Arc<ClientConfig>, name: ServerName<'static>) -> Result<Self, Error> {
        let mut common = CommonState::new();
        let state = hs::start_handshake(config, name, &mut common)?;

        Ok(Self {
            common,
            joiner: HandshakeJoiner::new(),
            state: Some(state),
            error: None,
        })
    }

    /// Add TLS bytes received from the peer.
    ///
    /// No parsing happens until [`ClientConnection::process_new_packets`]
    /// is called.
    pub fn read_tls(&mut self, bytes: &[u8]) {
        self.common.record_layer.feed(bytes);
    }

    /// Parse and process everything received so far.
    ///
    /// On error the connection is dead: a matching fatal alert has been
    /// queued for the peer (collect it with
    /// [`ClientConnection::take_tls_output`] and transmit it before
    /// closing), and all further calls fail with the same error.
    pub fn process_new_packets(&mut self) -> Result<(), Error> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }

        match self.process_inner() {
            Ok(()) => Ok(()),
            Err(err) => {
                // queue an alert if the failing site didn't already
                if let Ok(desc) = AlertDescription::try_from(&err) {
                    self.common.emit_alert(desc);
                }
                self.error = Some(err.clone());
                self.state = None;
                Err(err)
            }
        }
    }

    fn process_inner(&mut self) -> Result<(), Error> {
        loop {
            if self.common.handed_off || self.common.peer_closed {
                return Ok(());
            }

            let record = match self.common.next_record()? {
                NextRecord::NeedMore(_) => return Ok(()),
                NextRecord::Record(record) => record,
            };

            self.process_record(record)?;
        }
    }

    fn process_record(&mut self, record: Record) -> Result<(), Error> {
        match record.typ {
            ContentType::ChangeCipherSpec => {
                // RFC 8446 5.: tolerated and dropped between the first
                // ClientHello and the server Finished; fatal elsewhere.
                // It never enters the transcript.
                if !self.common.ccs_permitted {
                    return Err(self.common.send_fatal_alert(
                        AlertDescription::UnexpectedMessage,
                        PeerMisbehaved::IllegalMiddleboxChangeCipherSpec,
                    ));
                }
                debug!("dropping dummy change_cipher_spec");
                Ok(())
            }
            ContentType::Handshake => {
                self.joiner.take_fragment(&record.payload);
                loop {
                    let message = match self.joiner.next_message() {
                        Ok(Some(message)) => message,
                        Ok(None) => return Ok(()),
                        Err(err) => {
                            let desc = AlertDescription::from(err);
                            return Err(self.common.send_fatal_alert(desc, err));
                        }
                    };
                    self.dispatch(message)?;
                    if self.common.handoff.is_some() {
                        return Ok(());
                    }
                }
            }
            _ => {
                // changing protection or message type mid-way through a
                // fragmented handshake message is never legitimate
                if !self.joiner.is_aligned() {
                    return Err(self.common.send_fatal_alert(
                        AlertDescription::UnexpectedMessage,
                        PeerMisbehaved::MessageInterleavedWithHandshakeMessage,
                    ));
                }

                match record.typ {
                    ContentType::Alert => self.process_alert(&record.payload),
                    ContentType::ApplicationData => self.dispatch(Message {
                        version: crate::enums::ProtocolVersion::TLSv1_3,
                        payload: MessagePayload::ApplicationData(crate::msgs::base::Payload::new(
                            record.payload,
                        )),
                    }),
                    _ => Err(crate::error::InvalidMessage::InvalidContentType.into()),
                }
            }
        }
    }

    fn dispatch(&mut self, message: Message) -> Result<(), Error> {
        let Some(state) = self.state.take() else {
            return Err(Error::General("connection has failed".into()));
        };

        let had_cipher = self.common.cipher_state.is_some();
        let next = state.handle(&mut self.common, message)?;
        self.state = Some(next);

        // keys must not change while a fragmented handshake message is
        // pending: the two halves would sit under different protection
        if !had_cipher && self.common.cipher_state.is_some() && !self.joiner.is_aligned() {
            return Err(self.common.send_fatal_alert(
                AlertDescription::UnexpectedMessage,
                PeerMisbehaved::MessageInterleavedWithHandshakeMessage,
            ));
        }

        if let Some(handoff) = &mut self.common.handoff {
            handoff.residual_handshake = self.joiner.take_buffer();
        }

        Ok(())
    }

    fn process_alert(&mut self, payload: &[u8]) -> Result<(), Error> {
        let alert = AlertMessagePayload::read_bytes(payload)
            .map_err(Error::InvalidMessage)?;

        if alert.description == AlertDescription::CloseNotify {
            debug!("peer sent close_notify");
            self.common.peer_closed = true;
            return Ok(());
        }

        match alert.level {
            AlertLevel::Warning => {
                warn!("peer sent warning alert {:?}", alert.description);
                Ok(())
            }
            _ => Err(Error::AlertReceived(alert.description)),
        }
    }

    /// Collect the bytes queued for transmission to the peer.
    pub fn take_tls_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.common.sendable_tls)
    }

    /// Protect `data` as application data and queue it for the peer.
    ///
    /// Only valid once the handshake has completed.
    pub fn send_application_data(&mut self, data: &[u8]) -> Result<(), Error> {
        if !self.common.session_activated {
            return Err(Error::HandshakeNotComplete);
        }

        let cipher_state = self
            .common
            .cipher_state
            .as_deref_mut()
            .ok_or(Error::HandshakeNotComplete)?;
        let wire = self.common.record_layer.prepare(
            ContentType::ApplicationData,
            data,
            Some(cipher_state),
        )?;
        self.common.sendable_tls.extend(wire);
        Ok(())
    }

    /// Collect decrypted application data received from the peer.
    pub fn take_received_plaintext(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.common.received_plaintext)
    }

    /// True while the handshake is still in progress.
    pub fn is_handshaking(&self) -> bool {
        !self.common.session_activated && self.error.is_none() && !self.common.handed_off
    }

    /// True once the handshake has completed and application traffic may
    /// flow in both directions.
    pub fn is_session_activated(&self) -> bool {
        self.common.session_activated
    }

    /// True once the peer has sent close_notify.
    pub fn is_peer_closed(&self) -> bool {
        self.common.peer_closed
    }

    /// The validated certificate chain presented by the server, once the
    /// handshake has progressed far enough to know it.
    pub fn peer_cert_chain(&self) -> Option<&[CertificateDer<'static>]> {
        self.common
            .peer_certificates
            .as_deref()
    }

    /// If the server chose TLS 1.2, the material needed to hand this
    /// connection to a TLS 1.2 implementation.  This can be taken once.
    pub fn take_tls12_handoff(&mut self) -> Option<Tls12Handoff> {
        self.common.handoff.take()
    }
}
