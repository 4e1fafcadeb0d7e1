//! Streaming SCPI line codec
//!
//! Splits a byte stream into newline-terminated lines and parses each one
//! into a [`ScpiCommand`]. Carriage returns before the terminator are
//! dropped.

use crate::command::ScpiCommand;
use crate::{ProtocolCodec, TERMINATOR};

/// Maximum line length (reasonable limit to prevent buffer overflow)
const MAX_LINE_LEN: usize = 256;

/// Streaming SCPI codec
pub struct ScpiCodec {
    buffer: Vec<u8>,
}

impl ScpiCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_LINE_LEN),
        }
    }

    /// Number of buffered bytes not yet forming a complete line
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for ScpiCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolCodec for ScpiCodec {
    type Command = ScpiCommand;

    fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        // A runaway line without terminator: keep only the tail
        if self.buffer.len() > MAX_LINE_LEN * 4 && !self.buffer.contains(&TERMINATOR) {
            let start = self.buffer.len() - MAX_LINE_LEN;
            self.buffer = self.buffer[start..].to_vec();
        }
    }

    fn next_command(&mut self) -> Option<Self::Command> {
        self.next_command_with_bytes().map(|(cmd, _)| cmd)
    }

    fn next_command_with_bytes(&mut self) -> Option<(Self::Command, Vec<u8>)> {
        loop {
            let term_pos = self.buffer.iter().position(|&b| b == TERMINATOR)?;
            let raw: Vec<u8> = self.buffer.drain(..=term_pos).collect();

            let text = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let text = text.trim_end_matches('\r');
            if text.trim().is_empty() {
                continue;
            }

            let cmd = match ScpiCommand::parse(text) {
                Ok(cmd) => cmd,
                Err(e) => {
                    tracing::warn!("Failed to parse SCPI command {:?}: {}", text, e);
                    ScpiCommand::Unknown(text.to_string())
                }
            };

            return Some((cmd, raw));
        }
    }

    fn clear(&mut self) {
        self.buffer.clear();
    }
}
