//! Parsers for device response lines
//!
//! Every parser takes the raw line as returned by the device (trailing
//! whitespace allowed) and produces a typed value. Unrecognized tokens are
//! errors, with one deliberate exception: [`parse_trigger_edge`].

use tracing::warn;

use crate::command::{BandwidthMode, FrequencyMode, ModulationShape, TriggerEdge};
use crate::error::ParseError;

/// Parsed `*IDN?` reply
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Identity {
    /// Manufacturer field
    pub manufacturer: String,
    /// Model field (e.g. "SMBV100A")
    pub model: String,
    /// Serial number field
    pub serial: String,
    /// Firmware version field
    pub firmware: String,
}

/// One entry of the device error queue (`SYST:ERR?`)
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceErrorEntry {
    /// SCPI error code (0 means "no error")
    pub code: i32,
    /// Error message text
    pub message: String,
}

impl DeviceErrorEntry {
    /// Returns true for the "0, No error" entry
    pub fn is_empty(&self) -> bool {
        self.code == 0
    }
}

/// Parse a numeric reply (`"2870000000"`, `"2.87E9"`, `"-1.5e+01"`)
pub fn parse_number(response: &str) -> Result<f64, ParseError> {
    let token = response.trim();
    if token.is_empty() {
        return Err(ParseError::EmptyResponse);
    }
    token
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ParseError::InvalidNumber(token.to_string()))
}

/// Parse a boolean reply (`1`/`0`, `ON`/`OFF`, or a number such as `1.0`)
pub fn parse_bool(response: &str) -> Result<bool, ParseError> {
    let token = response.trim();
    match token.to_ascii_uppercase().as_str() {
        "" => Err(ParseError::EmptyResponse),
        "ON" => Ok(true),
        "OFF" => Ok(false),
        _ => parse_number(token).map(|v| v as i64 != 0),
    }
}

/// Parse a `FREQ:MODE?` reply
pub fn parse_frequency_mode(response: &str) -> Result<FrequencyMode, ParseError> {
    FrequencyMode::from_scpi(response).ok_or_else(|| unknown("frequency mode", response))
}

/// Parse a `TRIG1:SLOP?` reply
///
/// Anything other than a recognized falling-edge token reports
/// [`TriggerEdge::Rising`]; an unrecognized token is logged.
pub fn parse_trigger_edge(response: &str) -> TriggerEdge {
    let token = response.trim().to_ascii_uppercase();
    if token.contains("NEG") {
        return TriggerEdge::Falling;
    }
    if !token.starts_with("POS") {
        warn!(
            "Unrecognized trigger polarity {:?}, reporting rising edge",
            response.trim()
        );
    }
    TriggerEdge::Rising
}

/// Parse an `LFO:SHAP?` reply
pub fn parse_modulation_shape(response: &str) -> Result<ModulationShape, ParseError> {
    ModulationShape::from_scpi(response).ok_or_else(|| unknown("modulation shape", response))
}

/// Parse an `FM:MODE?` reply
pub fn parse_bandwidth_mode(response: &str) -> Result<BandwidthMode, ParseError> {
    BandwidthMode::from_scpi(response).ok_or_else(|| unknown("bandwidth mode", response))
}

/// Parse an `*IDN?` reply: `<manufacturer>,<model>,<serial>,<firmware>`
pub fn parse_identity(response: &str) -> Result<Identity, ParseError> {
    let fields: Vec<&str> = response.trim().splitn(4, ',').map(str::trim).collect();
    match fields.as_slice() {
        [manufacturer, model, rest @ ..] if !model.is_empty() => Ok(Identity {
            manufacturer: manufacturer.to_string(),
            model: model.to_string(),
            serial: rest.first().map(|s| s.to_string()).unwrap_or_default(),
            firmware: rest.get(1).map(|s| s.to_string()).unwrap_or_default(),
        }),
        _ => Err(ParseError::InvalidFrame(format!(
            "identification reply has no model field: {:?}",
            response.trim()
        ))),
    }
}

/// Parse a `SYST:ERR?` reply: `<code>,"<message>"`
pub fn parse_error_entry(response: &str) -> Result<DeviceErrorEntry, ParseError> {
    let (code, message) = response
        .trim()
        .split_once(',')
        .ok_or_else(|| ParseError::InvalidFrame(format!("malformed error entry: {:?}", response)))?;
    let code = code
        .trim()
        .parse::<i32>()
        .map_err(|_| ParseError::InvalidNumber(code.trim().to_string()))?;
    Ok(DeviceErrorEntry {
        code,
        message: message.trim().trim_matches('"').to_string(),
    })
}

fn unknown(what: &'static str, token: &str) -> ParseError {
    ParseError::UnknownToken {
        what,
        token: token.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number_forms() {
        assert_eq!(parse_number("2870000000\n").unwrap(), 2.87e9);
        assert_eq!(parse_number("2.87E9").unwrap(), 2.87e9);
        assert_eq!(parse_number(" -1.5e+01 ").unwrap(), -15.0);
        assert_eq!(parse_number(""), Err(ParseError::EmptyResponse));
        assert!(matches!(parse_number("NaN"), Err(ParseError::InvalidNumber(_))));
    }

    #[test]
    fn test_parse_bool_forms() {
        assert!(parse_bool("1\n").unwrap());
        assert!(!parse_bool("0").unwrap());
        assert!(parse_bool("1.0").unwrap());
        assert!(parse_bool("on").unwrap());
        assert!(!parse_bool("OFF").unwrap());
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn test_trigger_edge_defaults_to_rising() {
        assert_eq!(parse_trigger_edge("NEG\n"), TriggerEdge::Falling);
        assert_eq!(parse_trigger_edge("POS\n"), TriggerEdge::Rising);
        assert_eq!(parse_trigger_edge("EITHER"), TriggerEdge::Rising);
        assert_eq!(parse_trigger_edge(""), TriggerEdge::Rising);
    }

    #[test]
    fn test_unrecognized_tokens_are_errors() {
        assert!(matches!(
            parse_modulation_shape("NOISE"),
            Err(ParseError::UnknownToken { what: "modulation shape", .. })
        ));
        assert!(parse_bandwidth_mode("NORM").is_err());
        assert!(parse_frequency_mode("CHIRP").is_err());
        assert_eq!(parse_bandwidth_mode("LNO\n").unwrap(), BandwidthMode::LowNoise);
    }

    #[test]
    fn test_parse_identity() {
        let id = parse_identity("Rohde&Schwarz,SMBV100A,1407.6004k02/259209,3.1.19.15-3.20.390.24\n")
            .unwrap();
        assert_eq!(id.manufacturer, "Rohde&Schwarz");
        assert_eq!(id.model, "SMBV100A");
        assert_eq!(id.serial, "1407.6004k02/259209");
        assert_eq!(id.firmware, "3.1.19.15-3.20.390.24");

        assert!(parse_identity("garbage").is_err());
    }

    #[test]
    fn test_parse_error_entry() {
        let entry = parse_error_entry("0,\"No error\"").unwrap();
        assert!(entry.is_empty());

        let entry = parse_error_entry("-222,\"Data out of range\"\n").unwrap();
        assert_eq!(entry.code, -222);
        assert_eq!(entry.message, "Data out of range");
    }
}
