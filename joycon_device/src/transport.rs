use hidapi::{HidDevice, HidError};
use joycon_core::transport::{Transport, TransportError};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// [`Transport`] over an open hidapi handle.
///
/// Reads and writes are serialized through a mutex; the reader only holds it
/// for one bounded read at a time.
pub struct HidTransport {
    device: Mutex<HidDevice>,
}

impl HidTransport {
    pub fn new(device: HidDevice) -> Self {
        Self {
            device: Mutex::new(device),
        }
    }

    fn device(&self) -> MutexGuard<'_, HidDevice> {
        self.device.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for HidTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HidTransport").finish_non_exhaustive()
    }
}

impl Transport for HidTransport {
    fn write(&self, buf: &[u8]) -> Result<usize, TransportError> {
        self.device().write(buf).map_err(hid_error)
    }

    fn read_timeout(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        self.device()
            .read_timeout(buf, timeout_millis(timeout))
            .map_err(hid_error)
    }

    fn set_blocking(&self, blocking: bool) -> Result<(), TransportError> {
        self.device().set_blocking_mode(blocking).map_err(hid_error)
    }
}

fn hid_error(err: HidError) -> TransportError {
    TransportError::Device(err.to_string())
}

// hidapi takes a signed millisecond count where -1 blocks forever.
fn timeout_millis(timeout: Duration) -> i32 {
    i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX)
}
