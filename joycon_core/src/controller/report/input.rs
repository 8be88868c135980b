use super::subcommand::SubcommandReply;
use super::{ReportError, ReportResult};
use crate::controller::state::button::ButtonMask;
use crate::controller::{ControllerKind, Side};
use strum::Display;

/// Size of the receive buffer; every report this engine consumes fits in it.
pub const INPUT_REPORT_LEN: usize = 0x31;

const REPLY_MIN_LEN: usize = 15;
const STANDARD_MIN_LEN: usize = 49;

const BATTERY_OFFSET: usize = 2;
const BUTTONS_OFFSET: usize = 3;
const LEFT_STICK_OFFSET: usize = 6;
const RIGHT_STICK_OFFSET: usize = 9;
const ACK_OFFSET: usize = 13;
const REPLY_SUBCOMMAND_OFFSET: usize = 14;
const REPLY_DATA_OFFSET: usize = 15;
const REPLY_DATA_MAX_LEN: usize = 35;
const IMU_OFFSET: usize = 13;
const IMU_FRAME_LEN: usize = 12;

// Ref: https://github.com/dekuNukem/Nintendo_Switch_Reverse_Engineering/blob/master/bluetooth_hid_notes.md#input-reports
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum InputReportId {
    // 0x21 Standard input reports used for subcommand replies
    SubcommandReply,
    // 0x30..=0x33 Full input reports with IMU data
    Full(u8),
}

impl InputReportId {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x21 => Some(Self::SubcommandReply),
            0x30..=0x33 => Some(Self::Full(byte)),
            _ => None,
        }
    }

    pub fn to_byte(&self) -> u8 {
        match self {
            Self::SubcommandReply => 0x21,
            Self::Full(byte) => *byte,
        }
    }

    fn min_len(&self) -> usize {
        match self {
            Self::SubcommandReply => REPLY_MIN_LEN,
            Self::Full(_) => STANDARD_MIN_LEN,
        }
    }
}

#[derive(Clone, Copy, Default, Debug, Display, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum BatteryLevel {
    Empty,
    Critical,
    Low,
    Medium,
    Full,
    #[default]
    Unknown,
}

impl BatteryLevel {
    pub fn from_nibble(nibble: u8) -> Self {
        match nibble {
            0x0 => Self::Empty,
            0x2 => Self::Critical,
            0x4 => Self::Low,
            0x6 => Self::Medium,
            0x8 => Self::Full,
            _ => Self::Unknown,
        }
    }
}

#[derive(Clone, Copy, Default, Debug, Eq, PartialEq, Hash)]
pub struct ConnectionInfo {
    pub kind: ControllerKind,
    /// Powered from the Switch or a charging grip.
    pub powered: bool,
}

impl ConnectionInfo {
    pub fn from_nibble(nibble: u8) -> Self {
        Self {
            kind: ControllerKind::from_bits(nibble >> 1),
            powered: nibble & 1 != 0,
        }
    }
}

/// Two 12-bit stick readings packed in 3 bytes.
#[derive(Clone, Copy, Default, Debug, Eq, PartialEq, Hash)]
pub struct RawStick {
    pub x: u16,
    pub y: u16,
}

impl RawStick {
    pub fn from_bytes(bytes: [u8; 3]) -> Self {
        let x = u16::from(bytes[0]) | (u16::from(bytes[1] & 0x0F) << 8);
        let y = u16::from(bytes[1] >> 4) | (u16::from(bytes[2]) << 4);
        Self { x, y }
    }

    pub fn to_bytes(&self) -> [u8; 3] {
        [
            (self.x & 0xFF) as u8,
            ((self.x >> 8) & 0x0F) as u8 | (((self.y & 0x0F) as u8) << 4),
            (self.y >> 4) as u8,
        ]
    }
}

/// One of the three 6-axis sub-frames of a full report.
#[derive(Clone, Copy, Default, Debug, Eq, PartialEq, Hash)]
pub struct RawImuFrame {
    pub accel: [i16; 3],
    pub gyro: [i16; 3],
}

impl RawImuFrame {
    pub fn from_bytes(bytes: &[u8; IMU_FRAME_LEN]) -> Self {
        let value = |i: usize| i16::from_le_bytes([bytes[i * 2], bytes[i * 2 + 1]]);
        Self {
            accel: [value(0), value(1), value(2)],
            gyro: [value(3), value(4), value(5)],
        }
    }

    pub fn to_bytes(&self) -> [u8; IMU_FRAME_LEN] {
        let mut buf = [0u8; IMU_FRAME_LEN];
        for (i, value) in self.accel.iter().chain(self.gyro.iter()).enumerate() {
            buf[i * 2..i * 2 + 2].copy_from_slice(&value.to_le_bytes());
        }
        buf
    }
}

/// Borrowed view over a received report.
///
/// Construction validates the length against the report id, so accessors never
/// index out of bounds.
#[derive(Clone, Copy, Debug)]
pub struct InputReport<'a> {
    id: InputReportId,
    buf: &'a [u8],
}

impl<'a> InputReport<'a> {
    pub fn parse(buf: &'a [u8]) -> ReportResult<Self> {
        let Some(&id_byte) = buf.first() else {
            return Err(ReportError::Empty);
        };
        let Some(id) = InputReportId::from_byte(id_byte) else {
            return Err(ReportError::UnsupportedReportId(id_byte));
        };
        if buf.len() < id.min_len() {
            return Err(ReportError::TooShort {
                report_id: id_byte,
                expected: id.min_len(),
                actual: buf.len(),
            });
        }
        Ok(Self { id, buf })
    }

    pub fn id(&self) -> InputReportId {
        self.id
    }

    pub fn timer(&self) -> u8 {
        self.buf[1]
    }

    pub fn battery(&self) -> BatteryLevel {
        BatteryLevel::from_nibble(self.buf[BATTERY_OFFSET] >> 4)
    }

    pub fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo::from_nibble(self.buf[BATTERY_OFFSET] & 0x0F)
    }

    pub fn buttons(&self) -> ButtonMask {
        let bytes = &self.buf[BUTTONS_OFFSET..BUTTONS_OFFSET + 3];
        ButtonMask::from_bits(
            u32::from(bytes[0]) | (u32::from(bytes[1]) << 8) | (u32::from(bytes[2]) << 16),
        )
    }

    pub fn left_stick(&self) -> RawStick {
        self.stick_at(LEFT_STICK_OFFSET)
    }

    pub fn right_stick(&self) -> RawStick {
        self.stick_at(RIGHT_STICK_OFFSET)
    }

    /// The stick physically present on a controller of the given side.
    pub fn stick(&self, side: Side) -> RawStick {
        match side {
            Side::Left => self.left_stick(),
            Side::Right => self.right_stick(),
        }
    }

    fn stick_at(&self, offset: usize) -> RawStick {
        RawStick::from_bytes([self.buf[offset], self.buf[offset + 1], self.buf[offset + 2]])
    }

    pub fn subcommand_reply(&self) -> Option<SubcommandReply> {
        if self.id != InputReportId::SubcommandReply {
            return None;
        }
        let end = self.buf.len().min(REPLY_DATA_OFFSET + REPLY_DATA_MAX_LEN);
        Some(SubcommandReply::new(
            self.buf[ACK_OFFSET],
            self.buf[REPLY_SUBCOMMAND_OFFSET],
            self.buf[REPLY_DATA_OFFSET..end].to_vec(),
        ))
    }

    pub fn imu_frames(&self) -> Option<[RawImuFrame; 3]> {
        let InputReportId::Full(_) = self.id else {
            return None;
        };
        let mut frames = [RawImuFrame::default(); 3];
        for (i, frame) in frames.iter_mut().enumerate() {
            let start = IMU_OFFSET + i * IMU_FRAME_LEN;
            let mut bytes = [0u8; IMU_FRAME_LEN];
            bytes.copy_from_slice(&self.buf[start..start + IMU_FRAME_LEN]);
            *frame = RawImuFrame::from_bytes(&bytes);
        }
        Some(frames)
    }

    /// A full report with an all-zero 6-axis block means the IMU is off.
    pub fn is_imu_streaming(&self) -> bool {
        match self.id {
            InputReportId::Full(_) => self.buf[IMU_OFFSET..STANDARD_MIN_LEN]
                .iter()
                .any(|&byte| byte != 0),
            InputReportId::SubcommandReply => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::state::button::Button;

    fn full_report() -> Vec<u8> {
        let mut buf = vec![0u8; INPUT_REPORT_LEN];
        buf[0] = 0x30;
        buf
    }

    #[test]
    fn rejects_short_reports() {
        assert_eq!(InputReport::parse(&[]).unwrap_err(), ReportError::Empty);
        assert_eq!(
            InputReport::parse(&[0x30; 20]).unwrap_err(),
            ReportError::TooShort {
                report_id: 0x30,
                expected: 49,
                actual: 20,
            }
        );
        assert_eq!(
            InputReport::parse(&[0x21; 14]).unwrap_err(),
            ReportError::TooShort {
                report_id: 0x21,
                expected: 15,
                actual: 14,
            }
        );
        assert_eq!(
            InputReport::parse(&[0x3F; 49]).unwrap_err(),
            ReportError::UnsupportedReportId(0x3F)
        );
    }

    #[test]
    fn decodes_status_byte() {
        let mut buf = full_report();
        // Full battery, Joy-Con, powered.
        buf[2] = 0x87;
        let report = InputReport::parse(&buf).unwrap();
        assert_eq!(report.battery(), BatteryLevel::Full);
        assert_eq!(
            report.connection_info(),
            ConnectionInfo {
                kind: ControllerKind::JoyCon,
                powered: true,
            }
        );
        buf[2] = 0x30;
        let report = InputReport::parse(&buf).unwrap();
        assert_eq!(report.battery(), BatteryLevel::Unknown);
        assert_eq!(report.connection_info().kind, ControllerKind::ProOrGrip);
        assert!(!report.connection_info().powered);
    }

    #[test]
    fn decodes_buttons_and_sticks() {
        let mut buf = full_report();
        buf[3..6].copy_from_slice(&[0x01, 0x10, 0x80]);
        buf[6..9].copy_from_slice(&RawStick { x: 0x123, y: 0xABC }.to_bytes());
        buf[9..12].copy_from_slice(&[0x00, 0x08, 0x80]);
        let report = InputReport::parse(&buf).unwrap();
        let buttons = report.buttons();
        assert!(buttons.is_pressed(Button::Y));
        assert!(buttons.is_pressed(Button::Home));
        assert!(buttons.is_pressed(Button::Zl));
        assert!(!buttons.is_pressed(Button::A));
        assert_eq!(report.left_stick(), RawStick { x: 0x123, y: 0xABC });
        assert_eq!(report.stick(Side::Right), RawStick { x: 0x800, y: 0x800 });
    }

    #[test]
    fn decodes_subcommand_reply() {
        let mut buf = vec![0u8; INPUT_REPORT_LEN];
        buf[0] = 0x21;
        buf[13] = 0x90;
        buf[14] = 0x10;
        buf[15..20].copy_from_slice(&[0x12, 0x80, 0x00, 0x00, 0x09]);
        let report = InputReport::parse(&buf).unwrap();
        let reply = report.subcommand_reply().unwrap();
        assert!(reply.is_positive());
        assert_eq!(reply.subcommand_id(), 0x10);
        assert_eq!(reply.data().len(), 34);
        assert_eq!(&reply.data()[..5], &[0x12, 0x80, 0x00, 0x00, 0x09]);
        assert!(report.imu_frames().is_none());
        // Minimal replies carry no payload.
        let reply = InputReport::parse(&buf[..15])
            .unwrap()
            .subcommand_reply()
            .unwrap();
        assert!(reply.data().is_empty());
    }

    #[test]
    fn decodes_imu_frames() {
        let mut buf = full_report();
        let frame = RawImuFrame {
            accel: [-1, 2, 4096],
            gyro: [-300, 0, i16::MAX],
        };
        for i in 0..3 {
            buf[13 + i * 12..25 + i * 12].copy_from_slice(&frame.to_bytes());
        }
        let report = InputReport::parse(&buf).unwrap();
        assert!(report.is_imu_streaming());
        assert_eq!(report.imu_frames().unwrap(), [frame; 3]);
        let report = InputReport::parse(&buf[..49]).unwrap();
        assert_eq!(report.imu_frames().unwrap()[2], frame);
    }

    #[test]
    fn detects_idle_imu() {
        let buf = full_report();
        let report = InputReport::parse(&buf).unwrap();
        assert!(!report.is_imu_streaming());
    }
}
