//! Microwave Source Protocol Library
//!
//! This crate provides the SCPI command vocabulary, response parsing and
//! per-model operating limits for Rohde & Schwarz SMB100A / SMBV100A
//! signal generators.
//!
//! # Architecture
//!
//! - [`ScpiCommand`] is the typed command table: every semantic operation the
//!   driver performs maps to exactly one variant, and [`EncodeCommand`] turns
//!   it into the line sent on the wire. `None` payloads are queries.
//! - [`codec::ScpiCodec`] is a streaming line parser used on the device side
//!   (simulator) to turn raw bytes back into [`ScpiCommand`]s.
//! - [`response`] holds the parsers for device replies. Unknown tokens are
//!   errors, not pass-through strings.
//! - [`models`] holds the model database and [`OperatingLimits`], including
//!   the client-side validation applied before any command is sent.
//!
//! No I/O happens in this crate.
//!
//! # Example
//!
//! ```rust
//! use mw_protocol::{EncodeCommand, FrequencyMode, ScpiCommand};
//!
//! let cmd = ScpiCommand::FrequencyMode(Some(FrequencyMode::Sweep));
//! assert_eq!(cmd.encode(), b"FREQ:MODE SWEEP\n");
//!
//! let parsed = ScpiCommand::parse("FREQ:MODE?").unwrap();
//! assert_eq!(parsed, ScpiCommand::FrequencyMode(None));
//! ```

pub mod codec;
pub mod command;
pub mod error;
pub mod models;
pub mod response;

pub use codec::ScpiCodec;
pub use command::{
    BandwidthMode, FrequencyMode, Mode, ModulationShape, ScpiCommand, SweepMode, SweepSpacing,
    TriggerEdge, TriggerSource,
};
pub use error::{LimitViolation, ParseError};
pub use models::{OperatingLimits, SourceDatabase, SourceModel};
pub use response::{DeviceErrorEntry, Identity};

/// Line terminator used in both directions
pub const TERMINATOR: u8 = b'\n';

/// Trait for protocol codecs that can parse incoming data streams
pub trait ProtocolCodec {
    /// The command type produced by this codec
    type Command;

    /// Push raw bytes into the codec's buffer
    fn push_bytes(&mut self, data: &[u8]);

    /// Try to extract the next complete command from the buffer
    fn next_command(&mut self) -> Option<Self::Command>;

    /// Try to extract the next complete command along with its raw bytes
    ///
    /// The raw bytes are kept so a command journal can show exactly what was
    /// received, including anything the parser did not understand.
    fn next_command_with_bytes(&mut self) -> Option<(Self::Command, Vec<u8>)>;

    /// Clear the internal buffer
    fn clear(&mut self);
}

/// Trait for commands that can be encoded to bytes
pub trait EncodeCommand {
    /// Encode this command to its wire format, terminator included
    fn encode(&self) -> Vec<u8>;
}
