//! Error types for SCPI parsing and parameter validation

use thiserror::Error;

/// Errors that can occur while parsing protocol data
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Device sent nothing where a value was expected
    #[error("empty response")]
    EmptyResponse,

    /// Value is not a number
    #[error("invalid number: {0:?}")]
    InvalidNumber(String),

    /// Token does not map to any known variant
    #[error("unknown {what} token: {token:?}")]
    UnknownToken {
        /// What was being parsed (e.g. "modulation shape")
        what: &'static str,
        /// The raw token
        token: String,
    },

    /// Invalid line structure
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

/// A requested parameter lies outside the model's operating limits
///
/// Raised before anything is sent to the device.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LimitViolation {
    /// Frequency outside [min, max]
    #[error("frequency {value} Hz outside [{min}, {max}] Hz")]
    FrequencyOutOfRange { value: f64, min: f64, max: f64 },

    /// Power outside [min, max]
    #[error("power {value} dBm outside [{min}, {max}] dBm")]
    PowerOutOfRange { value: f64, min: f64, max: f64 },

    /// Sweep start is not below sweep stop
    #[error("sweep start {start} Hz must be below stop {stop} Hz")]
    SweepOrder { start: f64, stop: f64 },

    /// Step is zero, negative or not finite
    #[error("sweep step {0} Hz must be positive")]
    NonPositiveStep(f64),

    /// Step outside [min, max]
    #[error("sweep step {value} Hz outside [{min}, {max}] Hz")]
    StepOutOfRange { value: f64, min: f64, max: f64 },

    /// (stop - start) / step exceeds the entry limit
    #[error("sweep needs {entries} entries, limit is {max}")]
    TooManyEntries { entries: f64, max: u32 },

    /// The armed start (start - step) falls below the minimum frequency
    #[error("armed sweep start {armed} Hz below minimum frequency {min} Hz")]
    ArmedStartBelowMinimum { armed: f64, min: f64 },
}
