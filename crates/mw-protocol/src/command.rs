//! Typed SCPI command table
//!
//! This module maps every semantic operation on the source to one
//! [`ScpiCommand`] variant. Set/query pairs share a variant: `Some(value)`
//! sets, `None` queries.

use std::fmt;

use crate::error::ParseError;
use crate::response::{parse_bool, parse_number};
use crate::EncodeCommand;

/// Output-generation mode of the source
///
/// `Off` is a semantic state: the hardware always reports a frequency mode,
/// even with output stopped. See [`FrequencyMode`] for the wire form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Mode {
    /// Output stopped
    Off,
    /// Single fixed frequency and power
    ContinuousWave,
    /// Programmed list of discrete frequencies
    List,
    /// Stepped frequency sweep, one step per trigger
    Sweep,
}

impl Mode {
    /// Returns a short lowercase name for the mode
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Off => "off",
            Mode::ContinuousWave => "cw",
            Mode::List => "list",
            Mode::Sweep => "sweep",
        }
    }

    /// Frequency mode that must be selected on the device for this mode
    pub fn frequency_mode(&self) -> Option<FrequencyMode> {
        match self {
            Mode::Off => None,
            Mode::ContinuousWave => Some(FrequencyMode::Cw),
            Mode::List => Some(FrequencyMode::List),
            Mode::Sweep => Some(FrequencyMode::Sweep),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Frequency mode as selected with `FREQ:MODE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FrequencyMode {
    /// Fixed frequency
    Cw,
    /// Frequency sweep
    Sweep,
    /// List mode
    List,
}

impl FrequencyMode {
    /// Argument used when selecting this mode
    pub fn as_scpi(&self) -> &'static str {
        match self {
            FrequencyMode::Cw => "CW",
            FrequencyMode::Sweep => "SWEEP",
            FrequencyMode::List => "LIST",
        }
    }

    /// Short form the device uses in query replies
    pub fn short_form(&self) -> &'static str {
        match self {
            FrequencyMode::Cw => "CW",
            FrequencyMode::Sweep => "SWE",
            FrequencyMode::List => "LIST",
        }
    }

    /// Parse a frequency mode token (short or long form, any case)
    pub fn from_scpi(token: &str) -> Option<Self> {
        match normalize(token).as_str() {
            "CW" | "FIX" | "FIXED" => Some(FrequencyMode::Cw),
            "SWE" | "SWEEP" => Some(FrequencyMode::Sweep),
            "LIST" => Some(FrequencyMode::List),
            _ => None,
        }
    }
}

impl From<FrequencyMode> for Mode {
    fn from(mode: FrequencyMode) -> Self {
        match mode {
            FrequencyMode::Cw => Mode::ContinuousWave,
            FrequencyMode::Sweep => Mode::Sweep,
            FrequencyMode::List => Mode::List,
        }
    }
}

/// Active edge of the external trigger input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TriggerEdge {
    /// Rising edge (`POS`)
    Rising,
    /// Falling edge (`NEG`)
    Falling,
}

impl TriggerEdge {
    /// Wire token
    pub fn as_scpi(&self) -> &'static str {
        match self {
            TriggerEdge::Rising => "POS",
            TriggerEdge::Falling => "NEG",
        }
    }

    /// Strict parse; see [`crate::response::parse_trigger_edge`] for the
    /// lenient reply parser
    pub fn from_scpi(token: &str) -> Option<Self> {
        match normalize(token).as_str() {
            "POS" | "POSITIVE" => Some(TriggerEdge::Rising),
            "NEG" | "NEGATIVE" => Some(TriggerEdge::Falling),
            _ => None,
        }
    }
}

/// Source of frequency-sweep step triggers (`TRIG:FSW:SOUR`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TriggerSource {
    /// Free running
    Auto,
    /// One step per trigger event
    Single,
    /// External trigger input
    External,
}

impl TriggerSource {
    /// Wire token
    pub fn as_scpi(&self) -> &'static str {
        match self {
            TriggerSource::Auto => "AUTO",
            TriggerSource::Single => "SING",
            TriggerSource::External => "EXT",
        }
    }

    /// Parse a trigger source token
    pub fn from_scpi(token: &str) -> Option<Self> {
        match normalize(token).as_str() {
            "AUTO" => Some(TriggerSource::Auto),
            "SING" | "SINGLE" => Some(TriggerSource::Single),
            "EXT" | "EXTERNAL" => Some(TriggerSource::External),
            _ => None,
        }
    }
}

/// Sweep run mode (`SWE:MODE`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SweepMode {
    /// Continuous sweep
    Auto,
    /// Manual stepping from the front panel
    Manual,
    /// One step per trigger
    Step,
}

impl SweepMode {
    /// Wire token
    pub fn as_scpi(&self) -> &'static str {
        match self {
            SweepMode::Auto => "AUTO",
            SweepMode::Manual => "MAN",
            SweepMode::Step => "STEP",
        }
    }

    /// Parse a sweep mode token
    pub fn from_scpi(token: &str) -> Option<Self> {
        match normalize(token).as_str() {
            "AUTO" => Some(SweepMode::Auto),
            "MAN" | "MANUAL" => Some(SweepMode::Manual),
            "STEP" => Some(SweepMode::Step),
            _ => None,
        }
    }
}

/// Sweep point spacing (`SWE:SPAC`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SweepSpacing {
    /// Linear spacing
    Linear,
    /// Logarithmic spacing
    Logarithmic,
}

impl SweepSpacing {
    /// Wire token
    pub fn as_scpi(&self) -> &'static str {
        match self {
            SweepSpacing::Linear => "LIN",
            SweepSpacing::Logarithmic => "LOG",
        }
    }

    /// Parse a spacing token
    pub fn from_scpi(token: &str) -> Option<Self> {
        match normalize(token).as_str() {
            "LIN" | "LINEAR" => Some(SweepSpacing::Linear),
            "LOG" | "LOGARITHMIC" => Some(SweepSpacing::Logarithmic),
            _ => None,
        }
    }
}

/// Low-frequency oscillator waveform used as modulation reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ModulationShape {
    Sine,
    Square,
    Pulse,
    Triangle,
    Trapezoid,
}

impl ModulationShape {
    /// Wire token
    pub fn as_scpi(&self) -> &'static str {
        match self {
            ModulationShape::Sine => "SINE",
            ModulationShape::Square => "SQU",
            ModulationShape::Pulse => "PULS",
            ModulationShape::Triangle => "TRI",
            ModulationShape::Trapezoid => "TRAP",
        }
    }

    /// Parse a shape token; accepts the short code or any longer spelling
    pub fn from_scpi(token: &str) -> Option<Self> {
        let token = normalize(token);
        // TRAP before TRI: both start with "TR"
        [
            ("SINE", ModulationShape::Sine),
            ("SQU", ModulationShape::Square),
            ("PULS", ModulationShape::Pulse),
            ("TRAP", ModulationShape::Trapezoid),
            ("TRI", ModulationShape::Triangle),
        ]
        .into_iter()
        .find(|(code, _)| token.starts_with(code))
        .map(|(_, shape)| shape)
    }
}

/// FM path bandwidth setting (`FM:MODE`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BandwidthMode {
    /// High modulation bandwidth
    HighBandwidth,
    /// Low phase noise
    LowNoise,
}

impl BandwidthMode {
    /// Wire token
    pub fn as_scpi(&self) -> &'static str {
        match self {
            BandwidthMode::HighBandwidth => "HBAN",
            BandwidthMode::LowNoise => "LNO",
        }
    }

    /// Parse a bandwidth mode token (short or long form)
    pub fn from_scpi(token: &str) -> Option<Self> {
        let token = normalize(token);
        if token.starts_with("HBAN") {
            Some(BandwidthMode::HighBandwidth)
        } else if token.starts_with("LNO") {
            Some(BandwidthMode::LowNoise)
        } else {
            None
        }
    }
}

/// One SCPI command line
#[derive(Debug, Clone, PartialEq)]
pub enum ScpiCommand {
    /// `*IDN?`
    Identify,
    /// `*CLS`
    ClearStatus,
    /// `*RST`
    Reset,
    /// `*WAI`
    Wait,
    /// `*OPC?`
    OperationComplete,
    /// `*TRG`
    Trigger,
    /// `SYST:ERR?`
    ErrorQuery,
    /// `OUTP:STAT ON|OFF` / `OUTP:STAT?`
    Output(Option<bool>),
    /// `FREQ:MODE CW|SWEEP|LIST` / `FREQ:MODE?`
    FrequencyMode(Option<FrequencyMode>),
    /// `FREQ <Hz>` / `FREQ?`
    Frequency(Option<f64>),
    /// `FREQ:STAR <Hz>` / `FREQ:STAR?`
    SweepStart(Option<f64>),
    /// `FREQ:STOP <Hz>` / `FREQ:STOP?`
    SweepStop(Option<f64>),
    /// `SWE:STEP:LIN <Hz>` / `SWE:STEP?`
    SweepStep(Option<f64>),
    /// `SWE:MODE AUTO|MAN|STEP` / `SWE:MODE?`
    SweepMode(Option<SweepMode>),
    /// `SWE:SPAC LIN|LOG` / `SWE:SPAC?`
    SweepSpacing(Option<SweepSpacing>),
    /// `ABOR:SWE`
    AbortSweep,
    /// `POW <dBm>` / `POW?`
    Power(Option<f64>),
    /// `TRIG1:SLOP POS|NEG` / `TRIG1:SLOP?`
    TriggerSlope(Option<TriggerEdge>),
    /// `TRIG:FSW:SOUR AUTO|SING|EXT` / `TRIG:FSW:SOUR?`
    SweepTriggerSource(Option<TriggerSource>),
    /// `LFO ON|OFF` / `LFO?`
    LfoState(Option<bool>),
    /// `LFO:SHAP <shape>` / `LFO:SHAP?`
    LfoShape(Option<ModulationShape>),
    /// `LFO:FREQ <Hz>` / `LFO:FREQ?`
    LfoFrequency(Option<f64>),
    /// `FM1:STAT ON|OFF` / `FM1:STAT?`
    FmState(Option<bool>),
    /// `FM1 <Hz>` / `FM1?`
    FmDeviation(Option<f64>),
    /// `FM:MODE HBAN|LNO` / `FM:MODE?`
    FmMode(Option<BandwidthMode>),
    /// Anything not in the table (raw line preserved)
    Unknown(String),
}

impl ScpiCommand {
    /// Returns true if the device answers this command with a response line
    pub fn is_query(&self) -> bool {
        match self {
            Self::Identify | Self::OperationComplete | Self::ErrorQuery => true,
            Self::ClearStatus
            | Self::Reset
            | Self::Wait
            | Self::Trigger
            | Self::AbortSweep
            | Self::Unknown(_) => false,
            Self::Output(v) | Self::LfoState(v) | Self::FmState(v) => v.is_none(),
            Self::Frequency(v)
            | Self::SweepStart(v)
            | Self::SweepStop(v)
            | Self::SweepStep(v)
            | Self::Power(v)
            | Self::LfoFrequency(v)
            | Self::FmDeviation(v) => v.is_none(),
            Self::FrequencyMode(v) => v.is_none(),
            Self::SweepMode(v) => v.is_none(),
            Self::SweepSpacing(v) => v.is_none(),
            Self::TriggerSlope(v) => v.is_none(),
            Self::SweepTriggerSource(v) => v.is_none(),
            Self::LfoShape(v) => v.is_none(),
            Self::FmMode(v) => v.is_none(),
        }
    }

    /// Render the command line without terminator
    pub fn to_line(&self) -> String {
        match self {
            Self::Identify => "*IDN?".to_string(),
            Self::ClearStatus => "*CLS".to_string(),
            Self::Reset => "*RST".to_string(),
            Self::Wait => "*WAI".to_string(),
            Self::OperationComplete => "*OPC?".to_string(),
            Self::Trigger => "*TRG".to_string(),
            Self::ErrorQuery => "SYST:ERR?".to_string(),
            Self::Output(v) => line("OUTP:STAT", v.map(on_off)),
            Self::FrequencyMode(v) => line("FREQ:MODE", v.map(|m| m.as_scpi().to_string())),
            Self::Frequency(v) => line("FREQ", v.map(format_value)),
            Self::SweepStart(v) => line("FREQ:STAR", v.map(format_value)),
            Self::SweepStop(v) => line("FREQ:STOP", v.map(format_value)),
            Self::SweepStep(Some(step)) => format!("SWE:STEP:LIN {}", format_value(*step)),
            Self::SweepStep(None) => "SWE:STEP?".to_string(),
            Self::SweepMode(v) => line("SWE:MODE", v.map(|m| m.as_scpi().to_string())),
            Self::SweepSpacing(v) => line("SWE:SPAC", v.map(|s| s.as_scpi().to_string())),
            Self::AbortSweep => "ABOR:SWE".to_string(),
            Self::Power(v) => line("POW", v.map(format_value)),
            Self::TriggerSlope(v) => line("TRIG1:SLOP", v.map(|e| e.as_scpi().to_string())),
            Self::SweepTriggerSource(v) => {
                line("TRIG:FSW:SOUR", v.map(|s| s.as_scpi().to_string()))
            }
            Self::LfoState(v) => line("LFO", v.map(on_off)),
            Self::LfoShape(v) => line("LFO:SHAP", v.map(|s| s.as_scpi().to_string())),
            Self::LfoFrequency(v) => line("LFO:FREQ", v.map(format_value)),
            Self::FmState(v) => line("FM1:STAT", v.map(on_off)),
            Self::FmDeviation(v) => line("FM1", v.map(format_value)),
            Self::FmMode(v) => line("FM:MODE", v.map(|m| m.as_scpi().to_string())),
            Self::Unknown(raw) => raw.clone(),
        }
    }

    /// Parse one command line (terminator already stripped)
    ///
    /// Headers are case-insensitive and may carry a leading colon. Lines
    /// whose header is not in the table parse to [`ScpiCommand::Unknown`];
    /// a known header with a malformed argument is an error.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ParseError::InvalidFrame("empty command".into()));
        }

        let (header, arg) = match line.split_once(char::is_whitespace) {
            Some((h, a)) => (h, Some(a.trim())),
            None => (line, None),
        };
        let header = header.trim_start_matches(':').to_ascii_uppercase();
        let (header, query) = match header.strip_suffix('?') {
            Some(h) => (h.to_string(), true),
            None => (header, false),
        };

        let cmd = match header.as_str() {
            "*IDN" if query => Self::Identify,
            "*OPC" if query => Self::OperationComplete,
            "*CLS" if !query => Self::ClearStatus,
            "*RST" if !query => Self::Reset,
            "*WAI" if !query => Self::Wait,
            "*TRG" if !query => Self::Trigger,
            "SYST:ERR" | "SYST:ERR:NEXT" if query => Self::ErrorQuery,
            "ABOR:SWE" if !query => Self::AbortSweep,
            "OUTP:STAT" | "OUTP" => Self::Output(setting(query, arg, parse_bool)?),
            "FREQ:MODE" => Self::FrequencyMode(setting(query, arg, |t| {
                FrequencyMode::from_scpi(t).ok_or_else(|| unknown("frequency mode", t))
            })?),
            "FREQ" | "FREQ:CW" => Self::Frequency(setting(query, arg, parse_number)?),
            "FREQ:STAR" | "FREQ:START" => Self::SweepStart(setting(query, arg, parse_number)?),
            "FREQ:STOP" => Self::SweepStop(setting(query, arg, parse_number)?),
            "SWE:STEP" | "SWE:STEP:LIN" => Self::SweepStep(setting(query, arg, parse_number)?),
            "SWE:MODE" => Self::SweepMode(setting(query, arg, |t| {
                SweepMode::from_scpi(t).ok_or_else(|| unknown("sweep mode", t))
            })?),
            "SWE:SPAC" => Self::SweepSpacing(setting(query, arg, |t| {
                SweepSpacing::from_scpi(t).ok_or_else(|| unknown("sweep spacing", t))
            })?),
            "POW" => Self::Power(setting(query, arg, parse_number)?),
            "TRIG1:SLOP" | "TRIG:SLOP" => Self::TriggerSlope(setting(query, arg, |t| {
                TriggerEdge::from_scpi(t).ok_or_else(|| unknown("trigger slope", t))
            })?),
            "TRIG:FSW:SOUR" => Self::SweepTriggerSource(setting(query, arg, |t| {
                TriggerSource::from_scpi(t).ok_or_else(|| unknown("trigger source", t))
            })?),
            "LFO" | "LFO:STAT" => Self::LfoState(setting(query, arg, parse_bool)?),
            "LFO:SHAP" => Self::LfoShape(setting(query, arg, |t| {
                ModulationShape::from_scpi(t).ok_or_else(|| unknown("modulation shape", t))
            })?),
            "LFO:FREQ" => Self::LfoFrequency(setting(query, arg, parse_number)?),
            "FM1:STAT" | "FM:STAT" => Self::FmState(setting(query, arg, parse_bool)?),
            "FM1" | "FM" | "FM1:DEV" | "FM:DEV" => {
                Self::FmDeviation(setting(query, arg, parse_number)?)
            }
            "FM:MODE" | "FM1:MODE" => Self::FmMode(setting(query, arg, |t| {
                BandwidthMode::from_scpi(t).ok_or_else(|| unknown("bandwidth mode", t))
            })?),
            _ => Self::Unknown(line.to_string()),
        };

        Ok(cmd)
    }
}

impl fmt::Display for ScpiCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

impl EncodeCommand for ScpiCommand {
    fn encode(&self) -> Vec<u8> {
        format!("{}\n", self.to_line()).into_bytes()
    }
}

/// Format a numeric argument (plain decimal, never exponent notation)
pub fn format_value(value: f64) -> String {
    format!("{}", value)
}

fn line(header: &str, arg: Option<String>) -> String {
    match arg {
        Some(arg) => format!("{} {}", header, arg),
        None => format!("{}?", header),
    }
}

fn on_off(on: bool) -> String {
    if on { "ON" } else { "OFF" }.to_string()
}

fn setting<T>(
    query: bool,
    arg: Option<&str>,
    parse: impl FnOnce(&str) -> Result<T, ParseError>,
) -> Result<Option<T>, ParseError> {
    if query {
        return Ok(None);
    }
    match arg {
        Some(arg) if !arg.is_empty() => parse(arg).map(Some),
        _ => Err(ParseError::InvalidFrame("missing argument".into())),
    }
}

fn unknown(what: &'static str, token: &str) -> ParseError {
    ParseError::UnknownToken {
        what,
        token: token.trim().to_string(),
    }
}

fn normalize(token: &str) -> String {
    token.trim().trim_matches('"').to_ascii_uppercase()
}
