//! Error taxonomy shared across the daemon's components.
//!
//! Each component gets its own error enum so callers can match narrowly;
//! [`DaemonError`] aggregates them at the process boundary.

use thiserror::Error;

/// Errors from the CAT serial transport (`CatLink`).
#[derive(Debug, Error)]
pub enum CatError {
    #[error("radio rejected command with ?;")]
    Protocol,
    #[error("no response within the configured timeout")]
    Timeout,
    #[error("serial link closed")]
    LinkClosed,
    #[error("malformed frame (no terminating ';' within 64 bytes)")]
    MalformedFrame,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors from the typed radio facade (`RadioModel`).
#[derive(Debug, Error)]
pub enum RadioError {
    #[error(transparent)]
    Cat(#[from] CatError),
    #[error("{0} not available on this head type")]
    NotAvailable(&'static str),
    #[error("power source probe failed")]
    ProbeFailed,
}

/// Errors from the rigctl protocol front end (`HamlibTranslator`).
#[derive(Debug, Error)]
pub enum TranslatorError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("feature not available")]
    NotAvailable,
    #[error("protocol error")]
    Protocol,
    #[error("timeout")]
    Timeout,
}

impl TranslatorError {
    /// Maps this error to the RPRT code surfaced on the rigctl wire.
    pub fn rprt_code(&self) -> i32 {
        match self {
            TranslatorError::InvalidArgument(_) => -1,
            TranslatorError::Protocol => -2,
            TranslatorError::Timeout => -2,
            TranslatorError::NotAvailable => -11,
        }
    }
}

impl From<RadioError> for TranslatorError {
    fn from(e: RadioError) -> Self {
        match e {
            RadioError::Cat(CatError::Protocol) => TranslatorError::Protocol,
            RadioError::Cat(CatError::Timeout) => TranslatorError::Timeout,
            RadioError::Cat(CatError::LinkClosed) => TranslatorError::Protocol,
            RadioError::Cat(CatError::MalformedFrame) => TranslatorError::Protocol,
            RadioError::Cat(CatError::Io(_)) => TranslatorError::Protocol,
            RadioError::NotAvailable(_) => TranslatorError::NotAvailable,
            RadioError::ProbeFailed => TranslatorError::NotAvailable,
        }
    }
}

/// Errors from the audio streaming subsystem.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio session already active")]
    Busy,
    #[error("audio devices unconfigured")]
    Rejected,
    #[error("no frame within the heartbeat window")]
    Timeout,
    #[error("audio frame CRC mismatch")]
    CrcMismatch,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Top-level error aggregating every component for `main`.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Cat(#[from] CatError),
    #[error(transparent)]
    Radio(#[from] RadioError),
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
