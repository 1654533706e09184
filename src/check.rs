use crate::enums::{ContentType, HandshakeType};
use crate::error::Error;
use crate::log::warn;
use crate::msgs::message::{Message, MessagePayload};

/// For a Message $m, and a HandshakePayload enum member $payload_type,
/// return Ok(payload) if $m is both a handshake message and one that
/// has the given $payload_type.  If not, return Err(Error) quoting
/// $handshake_type as the expected handshake type.
macro_rules! require_handshake_msg(
  ( $m:expr, $handshake_type:path, $payload_type:path ) => (
    match &$m.payload {
        crate::msgs::message::MessagePayload::Handshake {
            parsed: crate::msgs::handshake::HandshakeMessagePayload {
                payload: $payload_type(hm),
                ..
            },
            ..
        } => Ok(hm),
        payload => Err($crate::check::inappropriate_handshake_message(
            payload,
            &[$crate::ContentType::Handshake],
            &[$handshake_type]))
    }
  )
);

/// Like require_handshake_msg, but moves the payload out of $m.
macro_rules! require_handshake_msg_move(
  ( $m:expr, $handshake_type:path, $payload_type:path ) => (
    match $m.payload {
        crate::msgs::message::MessagePayload::Handshake {
            parsed: crate::msgs::handshake::HandshakeMessagePayload {
                payload: $payload_type(hm),
                ..
            },
            ..
        } => Ok(hm),
        payload =>
            Err($crate::check::inappropriate_handshake_message(
                &payload,
                &[$crate::ContentType::Handshake],
                &[$handshake_type]))
    }
  )
);

/// Check `m` is a handshake message of one of the types in
/// `handshake_types`, or a non-handshake message of one of the types in
/// `content_types`.
pub(crate) fn check_message(
    m: &Message,
    content_types: &[ContentType],
    handshake_types: &[HandshakeType],
) -> Result<(), Error> {
    if let MessagePayload::Handshake { parsed, .. } = &m.payload {
        if !handshake_types.is_empty() && !handshake_types.contains(&parsed.typ) {
            return Err(inappropriate_handshake_message(
                &m.payload,
                content_types,
                handshake_types,
            ));
        }
    } else if !content_types.contains(&m.payload.content_type()) {
        return Err(inappropriate_message(&m.payload, content_types));
    }

    Ok(())
}

pub(crate) fn inappropriate_message(
    payload: &MessagePayload,
    content_types: &[ContentType],
) -> Error {
    warn!(
        "Received a {:?} message while expecting {content_types:?}",
        payload.content_type(),
    );
    Error::InappropriateMessage {
        expect_types: content_types.to_vec(),
        got_type: payload.content_type(),
    }
}

pub(crate) fn inappropriate_handshake_message(
    payload: &MessagePayload,
    content_types: &[ContentType],
    handshake_types: &[HandshakeType],
) -> Error {
    match payload {
        MessagePayload::Handshake { parsed, .. } => {
            warn!(
                "Received a {:?} handshake message while expecting {handshake_types:?}",
                parsed.typ
            );
            Error::InappropriateHandshakeMessage {
                expect_types: handshake_types.to_vec(),
                got_type: parsed.typ,
            }
        }
        payload => inappropriate_message(payload, content_types),
    }
}
