use std::time::Duration;
use thiserror::Error;

#[derive(Clone, Error, Debug)]
pub enum TransportError {
    #[error("operation called when transport is closed")]
    OperationWhileClosed,
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },
    #[error("device: {0}")]
    Device(String),
    #[error("io: {kind}; {message}")]
    Io {
        kind: std::io::ErrorKind,
        message: String,
    },
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Raw byte-stream to a single controller.
///
/// Implementations are driven from two threads at once: the reader calls
/// [`Transport::read_timeout`] in a loop while sub-commands are written from
/// another task, hence the `&self` receivers.
pub trait Transport: Send + Sync + 'static {
    fn write(&self, buf: &[u8]) -> Result<usize, TransportError>;

    /// Returns `Ok(0)` when nothing arrived within `timeout`.
    fn read_timeout(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError>;

    fn set_blocking(&self, blocking: bool) -> Result<(), TransportError>;
}

impl<T: Transport> Transport for std::sync::Arc<T> {
    fn write(&self, buf: &[u8]) -> Result<usize, TransportError> {
        (**self).write(buf)
    }

    fn read_timeout(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        (**self).read_timeout(buf, timeout)
    }

    fn set_blocking(&self, blocking: bool) -> Result<(), TransportError> {
        (**self).set_blocking(blocking)
    }
}

/// Writes the whole buffer or fails.
pub(crate) fn write_all(transport: &impl Transport, buf: &[u8]) -> Result<(), TransportError> {
    let written = transport.write(buf)?;
    if written < buf.len() {
        return Err(TransportError::ShortWrite {
            written,
            expected: buf.len(),
        });
    }
    Ok(())
}
