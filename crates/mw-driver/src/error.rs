//! Error types for the driver

use std::io;

use mw_protocol::{LimitViolation, Mode, ParseError};
use thiserror::Error;

use crate::reader::Readback;

/// Errors that can occur while talking to a source
///
/// Variants that involve the device name the command being attempted and,
/// where there is one, the raw response.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Session unavailable, broken or timed out
    #[error("transport error on {command:?}: {source}")]
    Transport {
        /// Command being written or awaited
        command: String,
        #[source]
        source: io::Error,
    },

    /// Session could not be opened
    #[error("cannot connect to {address}: {reason}")]
    Connection {
        /// Resource string used
        address: String,
        /// What went wrong
        reason: String,
    },

    /// Request outside the model's operating limits (nothing was sent)
    #[error("rejected: {0}")]
    Validation(#[from] LimitViolation),

    /// Capability not present on this model
    #[error("{mode} mode is not supported by {model}")]
    UnsupportedMode {
        /// Requested mode
        mode: Mode,
        /// Connected model
        model: String,
        /// Actual output settings at the time of the request, when they could be read
        fallback: Option<Box<Readback>>,
    },

    /// Device returned something unparseable or inconsistent
    #[error("unexpected response to {command:?}: {response:?} ({reason})")]
    Protocol {
        /// Command that produced the response
        command: String,
        /// Raw response
        response: String,
        /// Why it was rejected
        reason: String,
    },

    /// A poll loop ran out of attempts
    #[error("{command:?} not complete after {attempts} polls (last response {last_response:?})")]
    Timeout {
        /// Command being awaited
        command: String,
        /// Number of polls made
        attempts: u32,
        /// Last status response seen
        last_response: Option<String>,
    },

    /// A poll loop was aborted through the session's cancellation token
    #[error("{command:?} cancelled")]
    Cancelled {
        /// Command being awaited
        command: String,
    },

    /// The task owning the driver has stopped
    #[error("driver task is not running")]
    TaskStopped,
}

impl DriverError {
    /// Wrap a parse failure with the command and raw response
    pub fn protocol(command: impl Into<String>, response: &str, err: ParseError) -> Self {
        Self::Protocol {
            command: command.into(),
            response: response.trim().to_string(),
            reason: err.to_string(),
        }
    }

    /// Wrap an I/O failure with the command in flight
    pub fn transport(command: impl Into<String>, source: io::Error) -> Self {
        Self::Transport {
            command: command.into(),
            source,
        }
    }

    /// Returns true if the session should be considered dead
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Connection { .. } | Self::TaskStopped
        )
    }
}

/// Result type for driver operations
pub type Result<T> = std::result::Result<T, DriverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_names_command_and_response() {
        let err = DriverError::protocol(
            "LFO:SHAP?",
            "NOISE\n",
            ParseError::UnknownToken {
                what: "modulation shape",
                token: "NOISE".into(),
            },
        );
        let text = err.to_string();
        assert!(text.contains("LFO:SHAP?"));
        assert!(text.contains("NOISE"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_transport_is_fatal() {
        let err = DriverError::transport("*OPC?", io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(err.is_fatal());
        assert!(err.to_string().starts_with("transport error on \"*OPC?\""));
    }
}
