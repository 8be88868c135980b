use thiserror::Error;

pub mod input;
pub mod output;
pub mod subcommand;

#[derive(Clone, Error, Debug, Eq, PartialEq)]
pub enum ReportError {
    // Nothing was received. Readers usually skip it before decoding.
    #[error("the report is empty")]
    Empty,
    // Report is shorter than the minimum length of its claimed report id.
    #[error("report {report_id:#04x} is too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        report_id: u8,
        expected: usize,
        actual: usize,
    },
    // Report ids that carry nothing this engine consumes.
    #[error("unsupported input report id: {0:#04x}")]
    UnsupportedReportId(u8),
    // Input slices that are too short for the value being decoded.
    #[error("a length of the data is too short: expected {expected}, got {actual}")]
    DataTooShort { expected: usize, actual: usize },
}

pub type ReportResult<T> = Result<T, ReportError>;
