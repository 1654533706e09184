use crate::error::InvalidMessage;
use crate::msgs::codec::{Codec, Reader};

#[derive(Debug)]
pub struct ChangeCipherSpecPayload;

impl Codec for ChangeCipherSpecPayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        1u8.encode(bytes);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let typ = u8::read(r)?;
        if typ != 1 {
            return Err(InvalidMessage::InvalidCcs);
        }

        r.expect_empty("ChangeCipherSpecPayload")
            .map(|_| Self {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_single_0x01_byte_accepted() {
        assert!(ChangeCipherSpecPayload::read_bytes(&[0x01]).is_ok());
        assert!(ChangeCipherSpecPayload::read_bytes(&[0x02]).is_err());
        assert!(ChangeCipherSpecPayload::read_bytes(&[0x01, 0x01]).is_err());
        assert!(ChangeCipherSpecPayload::read_bytes(&[]).is_err());
    }
}
