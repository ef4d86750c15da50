//! Unified error types for the PawFeeds firmware.
//!
//! A single `Error` enum that every subsystem can convert into, plus a
//! classification ([`ErrorClass`]) that decides how the orchestrator reacts:
//! transient failures are retried, configuration failures during bring-up
//! are terminal, parse failures are entry-scoped, hardware bound-check
//! misses are logged only.

use core::fmt;

use crate::app::ports::{CloudError, StorageError};

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible domain operation funnels into this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A cloud call (auth, document store, realtime) failed.
    Cloud(CloudError),
    /// Persistent storage could not be read or written.
    Storage(StorageError),
    /// Persisted settings are missing or unusable.
    Config(&'static str),
    /// A remote document could not be understood.
    Parse(ParseError),
    /// An actuator command failed.
    Actuator(ActuatorError),
}

/// Reaction policy for an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Link flap, stream timeout, single failed call.  Retried.
    Transient,
    /// Missing owner, malformed saved credentials.
    Configuration,
    /// One malformed schedule or command.  Skipped.
    Parse,
    /// Actuator failure or bound-check miss.  Logged.
    Hardware,
}

impl ErrorClass {
    /// Whether an error of this class ends a bring-up step in ERROR.
    ///
    /// Registration has no retry: any failure there is terminal for the
    /// session, so the caller decides per state rather than per class.
    pub const fn is_fatal_during_bring_up(self) -> bool {
        matches!(self, Self::Configuration)
    }
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Cloud(_) => ErrorClass::Transient,
            Self::Storage(StorageError::NotFound) | Self::Config(_) => ErrorClass::Configuration,
            Self::Storage(_) => ErrorClass::Transient,
            Self::Parse(_) => ErrorClass::Parse,
            Self::Actuator(_) => ErrorClass::Hardware,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cloud(e) => write!(f, "cloud: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Parse(e) => write!(f, "parse: {e}"),
            Self::Actuator(e) => write!(f, "actuator: {e}"),
        }
    }
}

impl From<CloudError> for Error {
    fn from(e: CloudError) -> Self {
        Self::Cloud(e)
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Parse errors
// ---------------------------------------------------------------------------

/// A remote document or message did not have the expected shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Payload was not valid JSON or not the expected envelope.
    Json,
    /// A required field was absent.
    MissingField(&'static str),
    /// A field was present but its value is unusable.
    InvalidField(&'static str),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "malformed JSON"),
            Self::MissingField(name) => write!(f, "missing field `{name}`"),
            Self::InvalidField(name) => write!(f, "invalid field `{name}`"),
        }
    }
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

impl From<serde_json::Error> for ParseError {
    fn from(_: serde_json::Error) -> Self {
        Self::Json
    }
}

// ---------------------------------------------------------------------------
// Actuator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorError {
    /// PWM duty-cycle write failed.
    PwmWriteFailed,
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PwmWriteFailed => write!(f, "PWM write failed"),
        }
    }
}

impl From<ActuatorError> for Error {
    fn from(e: ActuatorError) -> Self {
        Self::Actuator(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;

impl std::error::Error for Error {}
impl std::error::Error for ParseError {}
impl std::error::Error for ActuatorError {}
