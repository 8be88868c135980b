//! In-memory Joy-Con for tests. Answers sub-commands from a small flash
//! image and streams full reports once switched into standard mode.

use crate::controller::calibration::tests::{
    FACTORY_LEFT_STICK, FACTORY_RIGHT_STICK, IMU_FACTORY, IMU_PARAMETERS, STICK_PARAMETERS,
};
use crate::controller::report::input::{RawImuFrame, RawStick, INPUT_REPORT_LEN};
use crate::controller::report::subcommand::report_mode;
use crate::controller::spi_flash;
use crate::controller::state::button::{Button, ButtonMask};
use crate::controller::Side;
use crate::transport::{Transport, TransportError};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

const CENTER: RawStick = RawStick { x: 0x800, y: 0x800 };

#[derive(Debug)]
struct Inner {
    side: Side,
    flash: HashMap<u32, Vec<u8>>,
    pending: VecDeque<Vec<u8>>,
    writes: Vec<Vec<u8>>,
    report_mode: u8,
    imu_enabled: bool,
    timer: u8,
    buttons: ButtonMask,
    stick: RawStick,
    imu_frame: RawImuFrame,
    nack: HashSet<u8>,
    silent: HashSet<u8>,
    corrupt_spi_address: bool,
    disconnected: bool,
}

impl Inner {
    fn header(&mut self, id: u8) -> Vec<u8> {
        let mut buf = vec![0u8; INPUT_REPORT_LEN];
        buf[0] = id;
        buf[1] = self.timer;
        self.timer = self.timer.wrapping_add(1);
        // Full battery, Joy-Con, not powered.
        buf[2] = 0x86;
        let bits = self.buttons.bits().to_le_bytes();
        buf[3..6].copy_from_slice(&bits[..3]);
        let (left, right) = match self.side {
            Side::Left => (self.stick, CENTER),
            Side::Right => (CENTER, self.stick),
        };
        buf[6..9].copy_from_slice(&left.to_bytes());
        buf[9..12].copy_from_slice(&right.to_bytes());
        buf
    }

    fn standard_report(&mut self) -> Vec<u8> {
        let mut buf = self.header(0x30);
        if self.imu_enabled {
            let frame = self.imu_frame.to_bytes();
            for chunk in buf[13..49].chunks_exact_mut(frame.len()) {
                chunk.copy_from_slice(&frame);
            }
        }
        buf
    }

    fn read_flash(&self, address: u32, length: usize) -> Vec<u8> {
        match self.flash.get(&address) {
            Some(region) if region.len() >= length => region[..length].to_vec(),
            _ => vec![0xFF; length],
        }
    }

    fn handle_subcommand(&mut self, id: u8, payload: &[u8]) {
        if self.silent.contains(&id) {
            return;
        }
        let arg = payload.first().copied().unwrap_or_default();
        let (ack, data) = match id {
            0x02 => {
                let kind = match self.side {
                    Side::Left => 0x01,
                    Side::Right => 0x02,
                };
                let data = vec![
                    0x04, 0x21, kind, 0x02, 0x98, 0xB6, 0xE9, 0x12, 0x34, 0x56, 0x01, 0x01,
                ];
                (0x82, data)
            }
            0x03 => {
                self.report_mode = arg;
                (0x80, vec![])
            }
            0x10 => {
                let address = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
                let length = payload[4];
                let echoed = if self.corrupt_spi_address {
                    address + 1
                } else {
                    address
                };
                let mut data = echoed.to_le_bytes().to_vec();
                data.push(length);
                data.extend(self.read_flash(address, usize::from(length)));
                (0x90, data)
            }
            0x40 => {
                self.imu_enabled = arg == 0x01;
                (0x80, vec![])
            }
            _ => (0x80, vec![]),
        };
        let ack = if self.nack.contains(&id) { 0x00 } else { ack };
        let mut reply = self.header(0x21);
        reply[13] = ack;
        reply[14] = id;
        reply[15..15 + data.len()].copy_from_slice(&data);
        self.pending.push_back(reply);
    }
}

#[derive(Clone, Debug)]
pub(crate) struct FakeJoyCon {
    inner: Arc<Mutex<Inner>>,
}

impl FakeJoyCon {
    /// Carries factory calibration only; the user regions read as erased.
    pub(crate) fn new(side: Side) -> Self {
        let stick = match side {
            Side::Left => FACTORY_LEFT_STICK,
            Side::Right => FACTORY_RIGHT_STICK,
        };
        let flash = HashMap::from([
            (spi_flash::stick_factory_calibration(side), stick.to_vec()),
            (spi_flash::stick_parameters(side), STICK_PARAMETERS.to_vec()),
            (spi_flash::IMU_FACTORY_CALIBRATION, IMU_FACTORY.to_vec()),
            (spi_flash::IMU_PARAMETERS, IMU_PARAMETERS.to_vec()),
        ]);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                side,
                flash,
                pending: VecDeque::new(),
                writes: vec![],
                report_mode: report_mode::SUBCOMMAND_ONLY,
                imu_enabled: false,
                timer: 0,
                buttons: ButtonMask::default(),
                stick: CENTER,
                imu_frame: RawImuFrame {
                    accel: [0, 0, 4096],
                    gyro: [0, 0, 0],
                },
                nack: HashSet::new(),
                silent: HashSet::new(),
                corrupt_spi_address: false,
                disconnected: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn set_flash(&self, address: u32, data: &[u8]) {
        self.lock().flash.insert(address, data.to_vec());
    }

    pub(crate) fn set_input(&self, buttons: &[Button], stick: RawStick) {
        let mut inner = self.lock();
        inner.buttons = buttons.iter().copied().collect();
        inner.stick = stick;
    }

    /// Answers the sub-command with a negative ack.
    pub(crate) fn nack(&self, subcommand_id: u8) {
        self.lock().nack.insert(subcommand_id);
    }

    /// Never answers the sub-command.
    pub(crate) fn ignore(&self, subcommand_id: u8) {
        self.lock().silent.insert(subcommand_id);
    }

    pub(crate) fn corrupt_spi_address(&self) {
        self.lock().corrupt_spi_address = true;
    }

    pub(crate) fn disconnect(&self) {
        self.lock().disconnected = true;
    }

    pub(crate) fn inject(&self, report: Vec<u8>) {
        self.lock().pending.push_back(report);
    }

    pub(crate) fn report_mode(&self) -> u8 {
        self.lock().report_mode
    }

    pub(crate) fn written(&self) -> Vec<Vec<u8>> {
        self.lock().writes.clone()
    }

    /// Id and payload of every sub-command written so far.
    pub(crate) fn subcommands(&self) -> Vec<(u8, Vec<u8>)> {
        self.lock()
            .writes
            .iter()
            .filter(|buf| buf.first() == Some(&0x01) && buf.len() > 10)
            .map(|buf| (buf[10], buf[11..].to_vec()))
            .collect()
    }
}

impl Transport for FakeJoyCon {
    fn write(&self, buf: &[u8]) -> Result<usize, TransportError> {
        let mut inner = self.lock();
        if inner.disconnected {
            return Err(TransportError::Device("device disconnected".to_owned()));
        }
        inner.writes.push(buf.to_vec());
        if buf.first() == Some(&0x01) && buf.len() > 10 {
            inner.handle_subcommand(buf[10], &buf[11..]);
        }
        Ok(buf.len())
    }

    fn read_timeout(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        let (report, streaming) = {
            let mut inner = self.lock();
            if inner.disconnected {
                return Err(TransportError::Device("device disconnected".to_owned()));
            }
            match inner.pending.pop_front() {
                Some(report) => (Some(report), false),
                None if inner.report_mode == report_mode::STANDARD_FULL => {
                    (Some(inner.standard_report()), true)
                }
                None => (None, false),
            }
        };
        let Some(report) = report else {
            thread::sleep(timeout);
            return Ok(0);
        };
        if streaming {
            thread::sleep(Duration::from_millis(1));
        }
        let len = report.len().min(buf.len());
        buf[..len].copy_from_slice(&report[..len]);
        Ok(len)
    }

    fn set_blocking(&self, _blocking: bool) -> Result<(), TransportError> {
        Ok(())
    }
}
