use super::report::subcommand::{ProtocolError, Subcommand};
use macaddr::MacAddr6;

const DEVICE_INFO_LEN: usize = 12;

/// Reply payload of `RequestDeviceInfo`.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct DeviceInfo {
    pub firmware_version: (u8, u8),
    /// 1: Joy-Con (L), 2: Joy-Con (R), 3: Pro Controller.
    pub kind: u8,
    pub mac_address: MacAddr6,
    /// Body/button colors are stored in SPI flash when set.
    pub uses_spi_colors: bool,
}

impl DeviceInfo {
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < DEVICE_INFO_LEN {
            return Err(ProtocolError::ReplyTooShort {
                subcommand: Subcommand::RequestDeviceInfo,
            });
        }
        // The address is sent big-endian.
        let mac_address = MacAddr6::new(data[4], data[5], data[6], data[7], data[8], data[9]);
        Ok(Self {
            firmware_version: (data[0], data[1]),
            kind: data[2],
            mac_address,
            uses_spi_colors: data[11] == 0x01,
        })
    }

    pub fn firmware_version_string(&self) -> String {
        format!("{}.{}", self.firmware_version.0, self.firmware_version.1)
    }
}
