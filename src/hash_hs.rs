use crate::crypto::{Hash, HashContext, HashOutput};
use crate::msgs::codec::Codec;
use crate::msgs::handshake::HandshakeMessagePayload;
use crate::msgs::message::{Message, MessagePayload};

/// Early stage buffering of handshake payloads.
///
/// Before the ServerHello fixes the cipher suite we do not know which hash
/// the transcript uses, so the messages are simply buffered.
#[derive(Clone)]
pub(crate) struct HandshakeHashBuffer {
    buffer: Vec<u8>,
}

impl HandshakeHashBuffer {
    pub(crate) fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Hash/buffer a handshake message.
    pub(crate) fn add_message(&mut self, m: &Message) {
        if let MessagePayload::Handshake { encoded, .. } = &m.payload {
            self.buffer
                .extend_from_slice(&encoded.0);
        }
    }

    /// We now know what hash function the transcript uses.
    pub(crate) fn start_hash(self, provider: &'static dyn Hash) -> HandshakeHash {
        let mut ctx = provider.start();
        ctx.update(&self.buffer);
        HandshakeHash { provider, ctx }
    }
}

/// A running hash of the handshake transcript, in wire order.
///
/// The hash "as it stood before message M" is obtained by calling
/// [`HandshakeHash::current_hash`] before [`HandshakeHash::add_message`];
/// the driver relies on that ordering for CertificateVerify and Finished.
pub(crate) struct HandshakeHash {
    provider: &'static dyn Hash,
    ctx: Box<dyn HashContext>,
}

impl HandshakeHash {
    /// Hash/buffer a handshake message.
    pub(crate) fn add_message(&mut self, m: &Message) -> &mut Self {
        if let MessagePayload::Handshake { encoded, .. } = &m.payload {
            self.add_raw(&encoded.0);
        }
        self
    }

    fn add_raw(&mut self, buf: &[u8]) -> &mut Self {
        self.ctx.update(buf);
        self
    }

    /// Take the current hash value, and encapsulate it in a
    /// 'message_hash' handshake message.  Start this hash again, with
    /// that message at the front.  RFC 8446 section 4.4.1.
    pub(crate) fn rollup_for_hrr(&mut self) {
        let old_ctx = std::mem::replace(&mut self.ctx, self.provider.start());
        let old_hash = old_ctx.finish();
        let synthetic = HandshakeMessagePayload::build_handshake_hash(old_hash.as_ref());

        self.add_raw(&synthetic.get_encoding());
    }

    /// Get the current hash value.
    pub(crate) fn current_hash(&self) -> HashOutput {
        self.ctx.fork_finish()
    }
}

impl Clone for HandshakeHash {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider,
            ctx: self.ctx.fork(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Hash as _;
    use crate::enums::HashAlgorithm;

    /// A stand-in hash for transcript mechanics: not cryptographic.
    #[derive(Clone)]
    struct FoldContext {
        state: u64,
    }

    impl HashContext for FoldContext {
        fn fork_finish(&self) -> HashOutput {
            self.clone().output()
        }

        fn fork(&self) -> Box<dyn HashContext> {
            Box::new(self.clone())
        }

        fn finish(self: Box<Self>) -> HashOutput {
            self.output()
        }

        fn update(&mut self, data: &[u8]) {
            for byte in data {
                self.state = (self.state ^ u64::from(*byte)).wrapping_mul(0x100_0000_01b3);
            }
        }
    }

    impl FoldContext {
        fn output(&self) -> HashOutput {
            let mut out = [0u8; 32];
            for (i, chunk) in out.chunks_mut(8).enumerate() {
                let word = self
                    .state
                    .wrapping_mul(i as u64 + 1)
                    .to_be_bytes();
                chunk.copy_from_slice(&word);
            }
            HashOutput::new(&out)
        }
    }

    struct FoldHash;

    impl crate::crypto::Hash for FoldHash {
        fn start(&self) -> Box<dyn HashContext> {
            Box::new(FoldContext {
                state: 0xcbf2_9ce4_8422_2325,
            })
        }

        fn output_len(&self) -> usize {
            32
        }

        fn algorithm(&self) -> HashAlgorithm {
            HashAlgorithm::SHA256
        }
    }

    static FOLD_HASH: FoldHash = FoldHash;

    fn handshake_message(bytes: &[u8]) -> Message {
        Message {
            version: crate::enums::ProtocolVersion::TLSv1_3,
            payload: MessagePayload::Handshake {
                parsed: crate::msgs::handshake::HandshakeMessagePayload::read_bytes(bytes)
                    .unwrap(),
                encoded: crate::msgs::base::Payload::new(bytes.to_vec()),
            },
        }
    }

    #[test]
    fn buffered_and_incremental_agree() {
        let finished = handshake_message(&[0x14, 0x00, 0x00, 0x01, 0xaa]);
        let key_update = handshake_message(&[0x18, 0x00, 0x00, 0x01, 0x00]);

        let mut buffer = HandshakeHashBuffer::new();
        buffer.add_message(&finished);
        let mut hash = buffer.start_hash(&FOLD_HASH);
        hash.add_message(&key_update);

        let expected = FOLD_HASH.hash(&[0x14, 0x00, 0x00, 0x01, 0xaa, 0x18, 0x00, 0x00, 0x01, 0x00]);
        assert_eq!(hash.current_hash().as_ref(), expected.as_ref());
    }

    #[test]
    fn non_handshake_messages_ignored() {
        let mut buffer = HandshakeHashBuffer::new();
        buffer.add_message(&Message {
            version: crate::enums::ProtocolVersion::TLSv1_3,
            payload: MessagePayload::ApplicationData(crate::msgs::base::Payload::new(
                b"ignored".to_vec(),
            )),
        });
        let hash = buffer.start_hash(&FOLD_HASH);
        assert_eq!(
            hash.current_hash().as_ref(),
            FOLD_HASH.hash(&[]).as_ref()
        );
    }

    #[test]
    fn hrr_rollup_substitutes_message_hash() {
        let ch1 = handshake_message(&[0x01, 0x00, 0x00, 0x02, 0x0a, 0x0b]);

        let mut buffer = HandshakeHashBuffer::new();
        buffer.add_message(&ch1);
        let mut hash = buffer.start_hash(&FOLD_HASH);
        hash.rollup_for_hrr();

        // independently build message_hash(Hash(ch1))
        let ch1_hash = FOLD_HASH.hash(&[0x01, 0x00, 0x00, 0x02, 0x0a, 0x0b]);
        let mut expected_input = vec![0xfe, 0x00, 0x00, 0x20];
        expected_input.extend_from_slice(ch1_hash.as_ref());
        let expected = FOLD_HASH.hash(&expected_input);

        assert_eq!(hash.current_hash().as_ref(), expected.as_ref());
    }

    #[test]
    fn current_hash_does_not_disturb_state() {
        let m = handshake_message(&[0x14, 0x00, 0x00, 0x01, 0xaa]);
        let mut buffer = HandshakeHashBuffer::new();
        buffer.add_message(&m);
        let hash = buffer.start_hash(&FOLD_HASH);

        let first = hash.current_hash();
        let second = hash.current_hash();
        assert_eq!(first.as_ref(), second.as_ref());
    }

    #[test]
    fn clone_forks_state() {
        let m = handshake_message(&[0x14, 0x00, 0x00, 0x01, 0xaa]);
        let mut hash = HandshakeHashBuffer::new().start_hash(&FOLD_HASH);
        let fork = hash.clone();
        hash.add_message(&m);
        assert_ne!(
            hash.current_hash().as_ref(),
            fork.current_hash().as_ref()
        );
    }
}
