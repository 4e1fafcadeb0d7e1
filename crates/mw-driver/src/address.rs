//! VISA-style resource strings

use std::fmt;
use std::str::FromStr;

use crate::error::DriverError;

/// Baud rate used when an `ASRL` address does not name one
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Where a source lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAddress {
    /// Raw SCPI socket, `TCPIP[n]::<host>::<port>::SOCKET`
    Socket { host: String, port: u16 },
    /// Serial line, `ASRL<path>::INSTR[?baud=<n>]`
    Serial { port: String, baud_rate: u32 },
    /// In-process virtual source, `SIM::<model>`
    Simulated { model: String },
}

impl FromStr for SessionAddress {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let address = s.trim();
        let invalid = |reason: &str| DriverError::Connection {
            address: address.to_string(),
            reason: reason.to_string(),
        };

        let upper = address.to_ascii_uppercase();
        if upper.starts_with("TCPIP") {
            let parts: Vec<&str> = address.split("::").collect();
            match parts.as_slice() {
                [board, host, port, kind]
                    if board[5..].chars().all(|c| c.is_ascii_digit())
                        && kind.eq_ignore_ascii_case("SOCKET") =>
                {
                    let port = port
                        .parse::<u16>()
                        .map_err(|_| invalid("invalid socket port"))?;
                    if host.is_empty() {
                        return Err(invalid("missing host"));
                    }
                    Ok(SessionAddress::Socket {
                        host: host.to_string(),
                        port,
                    })
                }
                [_, _, kind] if kind.eq_ignore_ascii_case("INSTR") => {
                    Err(invalid("VXI-11 instruments need a VISA library; use a ::SOCKET address"))
                }
                _ => Err(invalid("expected TCPIP::<host>::<port>::SOCKET")),
            }
        } else if upper.starts_with("ASRL") {
            let (resource, options) = match address.split_once('?') {
                Some((resource, options)) => (resource, Some(options)),
                None => (address, None),
            };
            let port = resource[4..]
                .strip_suffix("::INSTR")
                .or_else(|| resource[4..].strip_suffix("::instr"))
                .ok_or_else(|| invalid("expected ASRL<port>::INSTR"))?;
            if port.is_empty() {
                return Err(invalid("missing serial port"));
            }
            let mut baud_rate = DEFAULT_BAUD_RATE;
            for option in options.into_iter().flat_map(|o| o.split('&')) {
                match option.split_once('=') {
                    Some(("baud", value)) => {
                        baud_rate = value.parse().map_err(|_| invalid("invalid baud rate"))?;
                    }
                    _ => return Err(invalid("unknown serial option")),
                }
            }
            Ok(SessionAddress::Serial {
                port: port.to_string(),
                baud_rate,
            })
        } else if upper.starts_with("SIM::") {
            let model = &address[5..];
            if model.is_empty() {
                return Err(invalid("missing simulated model"));
            }
            Ok(SessionAddress::Simulated {
                model: model.to_string(),
            })
        } else if upper.starts_with("GPIB") {
            Err(invalid("GPIB needs a VISA library; use a TCPIP socket or ASRL address"))
        } else {
            Err(invalid("unrecognized resource string"))
        }
    }
}

impl fmt::Display for SessionAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionAddress::Socket { host, port } => write!(f, "TCPIP0::{}::{}::SOCKET", host, port),
            SessionAddress::Serial { port, baud_rate } if *baud_rate == DEFAULT_BAUD_RATE => {
                write!(f, "ASRL{}::INSTR", port)
            }
            SessionAddress::Serial { port, baud_rate } => {
                write!(f, "ASRL{}::INSTR?baud={}", port, baud_rate)
            }
            SessionAddress::Simulated { model } => write!(f, "SIM::{}", model),
        }
    }
}
