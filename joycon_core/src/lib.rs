use controller::report::subcommand::{ProtocolError, Subcommand};
use controller::report::ReportError;
use joycon_shared::event::EventError;
use std::time::Duration;
use thiserror::Error;
use transport::TransportError;

pub mod connection;
pub mod controller;
pub mod joycon;
pub mod registry;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;

#[derive(Clone, Error, Debug)]
pub enum Error {
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    #[error("protocol: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("report: {0}")]
    Report(#[from] ReportError),
    #[error("no reply for `{subcommand}` within {timeout:?}")]
    Timeout {
        subcommand: Subcommand,
        timeout: Duration,
    },
    #[error("product id {0:#06x} is not a Joy-Con")]
    InvalidProductId(u16),
    #[error("connection is being closed, aborting the requested action, action: {0}")]
    ActionAbortedDueToClosing(String),
    #[error("internal error: {0}")]
    Internal(InternalError),
}

#[derive(Clone, Error, Debug)]
pub enum InternalError {
    #[error("event: {0}")]
    Event(EventError),
}

impl From<EventError> for Error {
    fn from(err: EventError) -> Self {
        Self::Internal(InternalError::Event(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
