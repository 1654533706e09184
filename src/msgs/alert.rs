use crate::enums::{AlertDescription, AlertLevel};
use crate::error::InvalidMessage;
use crate::msgs::codec::{Codec, Reader};

#[derive(Debug)]
pub struct AlertMessagePayload {
    pub level: AlertLevel,
    pub description: AlertDescription,
}

impl Codec for AlertMessagePayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.level.encode(bytes);
        self.description.encode(bytes);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let level = AlertLevel::read(r)?;
        let description = AlertDescription::read(r)?;
        r.expect_empty("AlertMessagePayload")?;

        Ok(Self { level, description })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let alert = AlertMessagePayload {
            level: AlertLevel::Fatal,
            description: AlertDescription::IllegalParameter,
        };
        let enc = alert.get_encoding();
        assert_eq!(enc, vec![0x02, 0x2f]);
        let parsed = AlertMessagePayload::read_bytes(&enc).unwrap();
        assert_eq!(parsed.level, AlertLevel::Fatal);
        assert_eq!(parsed.description, AlertDescription::IllegalParameter);
    }

    #[test]
    fn trailing_data_rejected() {
        assert!(AlertMessagePayload::read_bytes(&[0x02, 0x2f, 0x00]).is_err());
    }
}
