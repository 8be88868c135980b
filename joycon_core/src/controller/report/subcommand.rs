use bytes::Bytes;
use strum::Display;
use thiserror::Error;

// Ref: https://github.com/dekuNukem/Nintendo_Switch_Reverse_Engineering/blob/master/bluetooth_hid_subcommands_notes.md
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Subcommand {
    BluetoothManualPairing,
    RequestDeviceInfo,
    SetInputReportMode,
    SpiFlashRead,
    SetPlayerLights,
    SetHomeLight,
    EnableImu,
    SetImuSensitivity,
    EnableVibration,
}

impl Subcommand {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::BluetoothManualPairing),
            0x02 => Some(Self::RequestDeviceInfo),
            0x03 => Some(Self::SetInputReportMode),
            0x10 => Some(Self::SpiFlashRead),
            0x30 => Some(Self::SetPlayerLights),
            0x38 => Some(Self::SetHomeLight),
            0x40 => Some(Self::EnableImu),
            0x41 => Some(Self::SetImuSensitivity),
            0x48 => Some(Self::EnableVibration),
            _ => None,
        }
    }

    pub fn to_byte(&self) -> u8 {
        match self {
            Self::BluetoothManualPairing => 0x01,
            Self::RequestDeviceInfo => 0x02,
            Self::SetInputReportMode => 0x03,
            Self::SpiFlashRead => 0x10,
            Self::SetPlayerLights => 0x30,
            Self::SetHomeLight => 0x38,
            Self::EnableImu => 0x40,
            Self::SetImuSensitivity => 0x41,
            Self::EnableVibration => 0x48,
        }
    }
}

/// Values accepted by [`Subcommand::SetInputReportMode`].
pub mod report_mode {
    /// Replies only; standard reports are suspended.
    pub const SUBCOMMAND_ONLY: u8 = 0x3F;
    /// Standard full reports with IMU data at 60Hz (or 120Hz on Bluetooth).
    pub const STANDARD_FULL: u8 = 0x30;
}

/// Arguments of [`Subcommand::SetImuSensitivity`]. Decoded IMU samples are
/// scaled for the defaults.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ImuSensitivity {
    /// 0x00 ±250dps up to 0x03 ±2000dps.
    pub gyro: u8,
    /// 0x00 ±8G, 0x01 ±4G, 0x02 ±2G, 0x03 ±16G.
    pub accel: u8,
    /// 0x00 833Hz, 0x01 208Hz.
    pub gyro_rate: u8,
    /// Anti-aliasing bandwidth, 0x00 200Hz, 0x01 100Hz.
    pub accel_filter: u8,
}

impl ImuSensitivity {
    pub fn to_bytes(&self) -> [u8; 4] {
        [self.gyro, self.accel, self.gyro_rate, self.accel_filter]
    }
}

impl Default for ImuSensitivity {
    fn default() -> Self {
        Self {
            gyro: 0x03,
            accel: 0x00,
            gyro_rate: 0x01,
            accel_filter: 0x01,
        }
    }
}

#[derive(Clone, Error, Debug, Eq, PartialEq)]
pub enum ProtocolError {
    #[error("negative ack {ack:#04x} for `{subcommand}`")]
    NegativeAck { subcommand: Subcommand, ack: u8 },
    #[error("reply to {received:#04x} received while waiting for `{expected}`")]
    UnexpectedReply { expected: Subcommand, received: u8 },
    #[error("spi flash read address mismatch: requested {requested:#06x}, echoed {echoed:#06x}")]
    SpiAddressMismatch { requested: u32, echoed: u32 },
    #[error("spi flash read length mismatch: requested {requested}, echoed {echoed}")]
    SpiLengthMismatch { requested: u8, echoed: u8 },
    #[error("spi flash read payload truncated: expected {expected} bytes, got {actual}")]
    SpiPayloadTooShort { expected: usize, actual: usize },
    #[error("spi flash read length {0} is out of bounds")]
    SpiLengthOutOfBounds(u8),
    #[error("reply payload of `{subcommand}` is too short")]
    ReplyTooShort { subcommand: Subcommand },
}

/// Decoded reply carried by a 0x21 input report.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubcommandReply {
    ack: u8,
    subcommand_id: u8,
    data: Bytes,
}

impl SubcommandReply {
    pub fn new(ack: u8, subcommand_id: u8, data: impl Into<Bytes>) -> Self {
        Self {
            ack,
            subcommand_id,
            data: data.into(),
        }
    }

    pub fn ack(&self) -> u8 {
        self.ack
    }

    pub fn is_positive(&self) -> bool {
        self.ack & 0x80 != 0
    }

    pub fn subcommand_id(&self) -> u8 {
        self.subcommand_id
    }

    pub fn subcommand(&self) -> Option<Subcommand> {
        Subcommand::from_byte(self.subcommand_id)
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Accepts the reply as the answer to `subcommand`.
    pub fn expect(&self, subcommand: Subcommand) -> Result<&Bytes, ProtocolError> {
        if self.subcommand_id != subcommand.to_byte() {
            return Err(ProtocolError::UnexpectedReply {
                expected: subcommand,
                received: self.subcommand_id,
            });
        }
        if !self.is_positive() {
            return Err(ProtocolError::NegativeAck {
                subcommand,
                ack: self.ack,
            });
        }
        Ok(&self.data)
    }
}
