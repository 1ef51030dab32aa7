use std::fmt;

pub(crate) const HEADER: u8 = 0x55;

// Command table
pub(crate) const SERVO_MOVE_TIME_WRITE: u8 = 1;
pub(crate) const SERVO_POS_READ: u8 = 28;
pub(crate) const SERVO_LOAD_OR_UNLOAD_WRITE: u8 = 31;

pub(crate) const MAX_SERVO_ID: u8 = 253;
pub(crate) const MAX_POSITION: u16 = 1000;
pub(crate) const MAX_MOVE_TIME_MS: u16 = 30000;

/// Checksum over everything after the header: `!(id + len + cmd + params)`
pub(crate) fn calc_checksum(payload: &[u8]) -> u8 {
    let mut sum: u8 = 0;
    for b in payload {
        sum = sum.wrapping_add(*b);
    }
    !sum
}

#[derive(Debug, PartialEq, Clone)]
pub(crate) struct Instruction {
    id: u8,
    command: u8,
    params: Vec<u8>,
}

impl Instruction {
    pub(crate) fn move_time_write(id: u8, position: u16, time_ms: u16) -> Instruction {
        let [pos_low, pos_high] = position.to_le_bytes();
        let [time_low, time_high] = time_ms.to_le_bytes();
        Instruction {
            id,
            command: SERVO_MOVE_TIME_WRITE,
            params: vec![pos_low, pos_high, time_low, time_high],
        }
    }

    pub(crate) fn pos_read(id: u8) -> Instruction {
        Instruction {
            id,
            command: SERVO_POS_READ,
            params: vec![],
        }
    }

    pub(crate) fn load_or_unload_write(id: u8, load: bool) -> Instruction {
        Instruction {
            id,
            command: SERVO_LOAD_OR_UNLOAD_WRITE,
            params: vec![load as u8],
        }
    }

    pub(crate) fn serialize(&self) -> Vec<u8> {
        let len = (self.params.len() + 3) as u8;
        let mut data = vec![
            HEADER, // header
            HEADER,
            self.id, // ID
            len,     // Length
            self.command,
        ];
        data.extend(self.params.iter());
        let checksum = calc_checksum(&data[2..]);
        data.push(checksum);
        data
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "cmd {} to servo {} {:?}", self.command, self.id, self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_time_write_serialization() {
        let packet = Instruction::move_time_write(1, 500, 1000);
        let payload = packet.serialize();
        assert_eq!(
            payload,
            vec![0x55, 0x55, 0x01, 0x07, 0x01, 0xF4, 0x01, 0xE8, 0x03, 0x16]
        );
    }

    #[test]
    fn pos_read_serialization() {
        let packet = Instruction::pos_read(4);
        let payload = packet.serialize();
        assert_eq!(payload, vec![0x55, 0x55, 0x04, 0x03, 0x1C, 0xDC]);
    }

    #[test]
    fn unload_serialization() {
        let packet = Instruction::load_or_unload_write(2, false);
        let payload = packet.serialize();
        assert_eq!(payload, vec![0x55, 0x55, 0x02, 0x04, 0x1F, 0x00, 0xDA]);
    }

    #[test]
    fn checksum_wraps() {
        assert_eq!(calc_checksum(&[0xFF, 0x02]), !0x01);
        assert_eq!(calc_checksum(&[]), 0xFF);
    }
}
