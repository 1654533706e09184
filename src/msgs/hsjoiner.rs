use crate::error::InvalidMessage;
use crate::msgs::base::Payload;
use crate::msgs::codec::Codec;
use crate::msgs::handshake::HandshakeMessagePayload;
use crate::msgs::message::{Message, MessagePayload};

/// TLS allows for handshake messages of up to 16MB.  We restrict that
/// to 64KB to limit potential for denial-of-service.
const MAX_HANDSHAKE_SIZE: usize = 0xffff;

const HANDSHAKE_HEADER_SIZE: usize = 1 + 3;

/// Reassembles handshake messages out of the handshake record fragments
/// the record layer produces.
///
/// A single record may carry several handshake messages, and a single
/// handshake message may span several records; this type buffers bytes
/// until whole messages are available.
#[derive(Default)]
pub struct HandshakeJoiner {
    /// Completed handshake frames for output.
    buf: Vec<u8>,
}

impl HandshakeJoiner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Do we have any incomplete message bytes buffered?
    pub fn is_aligned(&self) -> bool {
        self.buf.is_empty()
    }

    /// Take the fragment of a handshake record.
    pub fn take_fragment(&mut self, fragment: &[u8]) {
        self.buf.extend_from_slice(fragment);
    }

    /// Take all buffered bytes, emptying the joiner.
    pub fn take_buffer(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }

    /// Try to take one complete handshake message off the front of the
    /// buffer.  `Ok(None)` means more fragments are needed.
    pub fn next_message(&mut self) -> Result<Option<Message>, InvalidMessage> {
        if self.buf.len() < HANDSHAKE_HEADER_SIZE {
            return Ok(None);
        }

        let body_len = usize::from(self.buf[1]) << 16
            | usize::from(self.buf[2]) << 8
            | usize::from(self.buf[3]);

        if body_len > MAX_HANDSHAKE_SIZE {
            return Err(InvalidMessage::MessageTooLarge);
        }

        let total = HANDSHAKE_HEADER_SIZE + body_len;
        if self.buf.len() < total {
            return Ok(None);
        }

        let encoded: Vec<u8> = self.buf.drain(..total).collect();
        let parsed = HandshakeMessagePayload::read_bytes(&encoded)?;

        Ok(Some(Message {
            version: crate::enums::ProtocolVersion::TLSv1_3,
            payload: MessagePayload::Handshake {
                parsed,
                encoded: Payload::new(encoded),
            },
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::HandshakeType;

    #[test]
    fn needs_more_bytes() {
        let mut joiner = HandshakeJoiner::new();
        joiner.take_fragment(&[0x14, 0x00, 0x00]);
        assert!(joiner.next_message().unwrap().is_none());
        assert!(!joiner.is_aligned());
    }

    #[test]
    fn joins_across_fragments() {
        let mut joiner = HandshakeJoiner::new();
        // Finished with a 4-byte body, split across two fragments
        joiner.take_fragment(&[0x14, 0x00, 0x00, 0x04, 0xaa, 0xbb]);
        assert!(joiner.next_message().unwrap().is_none());
        joiner.take_fragment(&[0xcc, 0xdd]);
        let m = joiner.next_message().unwrap().unwrap();
        assert!(m.is_handshake_type(HandshakeType::Finished));
        assert!(joiner.is_aligned());
    }

    #[test]
    fn two_messages_in_one_fragment() {
        let mut joiner = HandshakeJoiner::new();
        joiner.take_fragment(&[
            0x14, 0x00, 0x00, 0x02, 0x01, 0x02, // Finished
            0x18, 0x00, 0x00, 0x01, 0x00, // KeyUpdate
        ]);
        assert!(joiner
            .next_message()
            .unwrap()
            .unwrap()
            .is_handshake_type(HandshakeType::Finished));
        assert!(joiner
            .next_message()
            .unwrap()
            .unwrap()
            .is_handshake_type(HandshakeType::KeyUpdate));
        assert!(joiner.next_message().unwrap().is_none());
    }

    #[test]
    fn oversized_message_rejected() {
        let mut joiner = HandshakeJoiner::new();
        joiner.take_fragment(&[0x14, 0x01, 0x00, 0x01]);
        assert_eq!(
            joiner.next_message().unwrap_err(),
            InvalidMessage::MessageTooLarge
        );
    }
}
