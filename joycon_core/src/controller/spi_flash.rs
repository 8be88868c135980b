use super::report::subcommand::ProtocolError;
use super::Side;

// Ref: https://github.com/dekuNukem/Nintendo_Switch_Reverse_Engineering/blob/master/spi_flash_notes.md
pub const IMU_FACTORY_CALIBRATION: u32 = 0x6020;
pub const IMU_USER_CALIBRATION: u32 = 0x8028;
pub const IMU_PARAMETERS: u32 = 0x6080;

pub const STICK_CALIBRATION_LEN: u8 = 9;
pub const STICK_PARAMETERS_LEN: u8 = 18;
pub const IMU_CALIBRATION_LEN: u8 = 24;
pub const IMU_PARAMETERS_LEN: u8 = 6;

const READ_MAX_LEN: u8 = 0x1D;
const READ_HEADER_LEN: usize = 5;

pub fn stick_user_calibration(side: Side) -> u32 {
    match side {
        Side::Left => 0x8012,
        Side::Right => 0x801D,
    }
}

pub fn stick_factory_calibration(side: Side) -> u32 {
    match side {
        Side::Left => 0x603D,
        Side::Right => 0x6046,
    }
}

pub fn stick_parameters(side: Side) -> u32 {
    match side {
        Side::Left => 0x6086,
        Side::Right => 0x6098,
    }
}

/// Erased flash reads back as 0xFF, so a payload made only of 0xFF carries no
/// calibration.
pub fn is_unset(payload: &[u8]) -> bool {
    payload.iter().all(|&byte| byte == 0xFF)
}

/// A single `SpiFlashRead` request.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SpiReadRequest {
    address: u32,
    length: u8,
}

impl SpiReadRequest {
    pub fn new(address: u32, length: u8) -> Result<Self, ProtocolError> {
        if length == 0 || length > READ_MAX_LEN {
            return Err(ProtocolError::SpiLengthOutOfBounds(length));
        }
        Ok(Self { address, length })
    }

    // Only for the well-known regions, whose lengths are in bounds.
    pub(crate) const fn fixed(address: u32, length: u8) -> Self {
        Self { address, length }
    }

    pub fn address(&self) -> u32 {
        self.address
    }

    pub fn length(&self) -> u8 {
        self.length
    }

    /// `[address as LE u32, length]`
    pub fn to_payload(&self) -> [u8; READ_HEADER_LEN] {
        let addr = self.address.to_le_bytes();
        [addr[0], addr[1], addr[2], addr[3], self.length]
    }

    /// Checks the echoed header of a reply payload and returns the data that
    /// follows it.
    pub fn verify<'a>(&self, reply_data: &'a [u8]) -> Result<&'a [u8], ProtocolError> {
        let Some(header) = reply_data.get(..READ_HEADER_LEN) else {
            return Err(ProtocolError::SpiPayloadTooShort {
                expected: READ_HEADER_LEN + usize::from(self.length),
                actual: reply_data.len(),
            });
        };
        let echoed = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        if echoed != self.address {
            return Err(ProtocolError::SpiAddressMismatch {
                requested: self.address,
                echoed,
            });
        }
        if header[4] != self.length {
            return Err(ProtocolError::SpiLengthMismatch {
                requested: self.length,
                echoed: header[4],
            });
        }
        let end = READ_HEADER_LEN + usize::from(self.length);
        reply_data
            .get(READ_HEADER_LEN..end)
            .ok_or(ProtocolError::SpiPayloadTooShort {
                expected: end,
                actual: reply_data.len(),
            })
    }
}
