use super::subcommand::Subcommand;
use crate::controller::rumble::RumbleData;
use bytes::{BufMut, Bytes, BytesMut};
use strum::Display;

// Ref: https://github.com/dekuNukem/Nintendo_Switch_Reverse_Engineering/blob/master/bluetooth_hid_notes.md#output-reports
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum OutputReportId {
    SubCommand,
    RumbleOnly,
}

impl OutputReportId {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::SubCommand),
            0x10 => Some(Self::RumbleOnly),
            _ => None,
        }
    }

    pub fn to_byte(&self) -> u8 {
        match self {
            Self::SubCommand => 0x01,
            Self::RumbleOnly => 0x10,
        }
    }
}

const HEADER_LEN: usize = 10;

/// Rolling 4-bit counter stamped on every outgoing report.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PacketCounter(u8);

impl PacketCounter {
    pub fn new() -> Self {
        Self(0)
    }

    /// Returns the current value and advances the counter, wrapping at 0x10.
    pub fn tick(&mut self) -> u8 {
        let current = self.0;
        self.0 = (self.0 + 1) % 0x10;
        current
    }

    pub fn peek(&self) -> u8 {
        self.0
    }
}

/// Builds outgoing reports.
///
/// `[report id, counter, rumble x8, subcommand id, payload..]` for
/// sub-commands and `[0x10, counter, rumble x8]` for rumble-only reports.
#[derive(Clone, Debug)]
pub struct OutputReport {
    buf: BytesMut,
}

impl OutputReport {
    pub fn with_subcommand(
        counter: &mut PacketCounter,
        rumble: &RumbleData,
        subcommand: Subcommand,
        payload: &[u8],
    ) -> Self {
        let mut buf = Self::header(OutputReportId::SubCommand, counter, rumble, payload.len() + 1);
        buf.put_u8(subcommand.to_byte());
        buf.put_slice(payload);
        Self { buf }
    }

    pub fn with_rumble_only(counter: &mut PacketCounter, rumble: &RumbleData) -> Self {
        let buf = Self::header(OutputReportId::RumbleOnly, counter, rumble, 0);
        Self { buf }
    }

    fn header(
        id: OutputReportId,
        counter: &mut PacketCounter,
        rumble: &RumbleData,
        extra: usize,
    ) -> BytesMut {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + extra);
        buf.put_u8(id.to_byte());
        buf.put_u8(counter.tick());
        buf.put_slice(rumble.as_bytes());
        buf
    }

    pub fn output_report_id(&self) -> Option<OutputReportId> {
        OutputReportId::from_byte(self.buf[0])
    }

    pub fn timer(&self) -> u8 {
        self.buf[1]
    }

    pub fn rumble_data(&self) -> &[u8] {
        &self.buf[2..HEADER_LEN]
    }

    pub fn subcommand(&self) -> Option<Subcommand> {
        self.buf.get(HEADER_LEN).copied().and_then(Subcommand::from_byte)
    }

    pub fn subcommand_data(&self) -> &[u8] {
        self.buf.get(HEADER_LEN + 1..).unwrap_or(&[])
    }

    pub fn data(&self) -> &[u8] {
        &self.buf[..]
    }

    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}
