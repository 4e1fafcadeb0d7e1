//! Virtual microwave source
//!
//! Provides a simulated SMB100A / SMBV100A that answers the driver's SCPI
//! vocabulary. Out-of-range settings are clamped the way the instrument
//! does (with an error queued), values are quantized to the instrument's
//! resolution, and completion and output-state latency can be dialled in to
//! exercise the driver's poll loops.

use std::collections::VecDeque;

use mw_protocol::command::format_value;
use mw_protocol::{
    BandwidthMode, DeviceErrorEntry, FrequencyMode, Mode, ModulationShape, ScpiCommand,
    SourceDatabase, SourceModel, SweepMode, SweepSpacing, TriggerEdge, TriggerSource,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Frequency resolution in Hz
pub const FREQUENCY_RESOLUTION: f64 = 0.01;

/// Power resolution in dB
pub const POWER_RESOLUTION: f64 = 0.01;

/// Received lines kept in the journal; older ones are dropped
pub const JOURNAL_CAPACITY: usize = 4096;

/// Errors creating a virtual source
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimError {
    /// Model name not in the source database
    #[error("unknown source model: {0}")]
    UnknownModel(String),
}

/// Configuration for creating a virtual source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualSourceConfig {
    /// Display name/identifier
    pub id: String,
    /// Model to emulate (must be in the source database)
    pub model: String,
    /// `*OPC?` replies answered with `0` after each setting command
    #[serde(default)]
    pub busy_polls: u32,
    /// `OUTP:STAT?` replies still reporting the previous state after a change
    #[serde(default)]
    pub output_settle_polls: u32,
    /// Ignore `OUTP:STAT ON|OFF` entirely (a hung output stage)
    #[serde(default)]
    pub frozen_output: bool,
    /// Reply sent to `TRIG1:SLOP?` instead of the real setting
    #[serde(default)]
    pub slope_reply_override: Option<String>,
}

impl Default for VirtualSourceConfig {
    fn default() -> Self {
        Self {
            id: "Virtual Source".to_string(),
            model: "SMBV100A".to_string(),
            busy_polls: 0,
            output_settle_polls: 0,
            frozen_output: false,
            slope_reply_override: None,
        }
    }
}

/// Point-in-time copy of the simulated instrument state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSnapshot {
    pub frequency_mode: FrequencyMode,
    pub output: bool,
    pub cw_frequency: f64,
    pub power: f64,
    pub sweep_start: f64,
    pub sweep_stop: f64,
    pub sweep_step: f64,
    pub sweep_mode: SweepMode,
    pub sweep_spacing: SweepSpacing,
    /// Frequency the sweep currently outputs
    pub sweep_position: f64,
    pub trigger_slope: TriggerEdge,
    pub trigger_source: TriggerSource,
    pub lfo_on: bool,
    pub fm_on: bool,
    pub lfo_shape: ModulationShape,
    pub lfo_frequency: f64,
    pub fm_deviation: f64,
    pub fm_mode: BandwidthMode,
    /// Manual triggers received
    pub trigger_count: u32,
    /// Lines received, in order, up to [`JOURNAL_CAPACITY`] most recent
    pub received_commands: Vec<String>,
}

/// A simulated SMB/SMBV source
#[derive(Debug)]
pub struct VirtualSource {
    config: VirtualSourceConfig,
    model: SourceModel,
    frequency_mode: FrequencyMode,
    output: bool,
    /// Output change not yet visible: (target, status queries left)
    output_pending: Option<(bool, u32)>,
    cw_frequency: f64,
    power: f64,
    sweep_start: f64,
    sweep_stop: f64,
    sweep_step: f64,
    sweep_mode: SweepMode,
    sweep_spacing: SweepSpacing,
    sweep_position: f64,
    trigger_slope: TriggerEdge,
    trigger_source: TriggerSource,
    lfo_on: bool,
    fm_on: bool,
    lfo_shape: ModulationShape,
    lfo_frequency: f64,
    fm_deviation: f64,
    fm_mode: BandwidthMode,
    busy: u32,
    trigger_count: u32,
    errors: VecDeque<DeviceErrorEntry>,
    received_commands: VecDeque<String>,
}

impl VirtualSource {
    /// Create a virtual source of a known model with default behaviour
    pub fn new(id: impl Into<String>, model: &str) -> Result<Self, SimError> {
        Self::from_config(VirtualSourceConfig {
            id: id.into(),
            model: model.to_string(),
            ..Default::default()
        })
    }

    /// Create a virtual source from configuration
    pub fn from_config(config: VirtualSourceConfig) -> Result<Self, SimError> {
        let model = SourceDatabase::by_model(&config.model)
            .ok_or_else(|| SimError::UnknownModel(config.model.clone()))?;
        let mut source = Self {
            config,
            model,
            frequency_mode: FrequencyMode::Cw,
            output: false,
            output_pending: None,
            cw_frequency: 0.0,
            power: 0.0,
            sweep_start: 0.0,
            sweep_stop: 0.0,
            sweep_step: 0.0,
            sweep_mode: SweepMode::Auto,
            sweep_spacing: SweepSpacing::Linear,
            sweep_position: 0.0,
            trigger_slope: TriggerEdge::Rising,
            trigger_source: TriggerSource::Auto,
            lfo_on: false,
            fm_on: false,
            lfo_shape: ModulationShape::Sine,
            lfo_frequency: 0.0,
            fm_deviation: 0.0,
            fm_mode: BandwidthMode::LowNoise,
            busy: 0,
            trigger_count: 0,
            errors: VecDeque::new(),
            received_commands: VecDeque::new(),
        };
        source.reset();
        Ok(source)
    }

    /// Get the identifier
    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// Get the emulated model
    pub fn model(&self) -> &SourceModel {
        &self.model
    }

    /// Semantic mode as seen from the front panel
    pub fn mode(&self) -> Mode {
        if self.output {
            self.frequency_mode.into()
        } else {
            Mode::Off
        }
    }

    /// Frequency currently at the RF output
    pub fn output_frequency(&self) -> f64 {
        match self.frequency_mode {
            FrequencyMode::Sweep => self.sweep_position,
            FrequencyMode::Cw | FrequencyMode::List => self.cw_frequency,
        }
    }

    /// Copy the current state
    pub fn snapshot(&self) -> SourceSnapshot {
        SourceSnapshot {
            frequency_mode: self.frequency_mode,
            output: self.output,
            cw_frequency: self.cw_frequency,
            power: self.power,
            sweep_start: self.sweep_start,
            sweep_stop: self.sweep_stop,
            sweep_step: self.sweep_step,
            sweep_mode: self.sweep_mode,
            sweep_spacing: self.sweep_spacing,
            sweep_position: self.sweep_position,
            trigger_slope: self.trigger_slope,
            trigger_source: self.trigger_source,
            lfo_on: self.lfo_on,
            fm_on: self.fm_on,
            lfo_shape: self.lfo_shape,
            lfo_frequency: self.lfo_frequency,
            fm_deviation: self.fm_deviation,
            fm_mode: self.fm_mode,
            trigger_count: self.trigger_count,
            received_commands: self.received_commands.iter().cloned().collect(),
        }
    }

    /// Most recent lines received, oldest first
    pub fn received_commands(&self) -> &VecDeque<String> {
        &self.received_commands
    }

    /// Forget the received-command journal
    pub fn clear_received(&mut self) {
        self.received_commands.clear();
    }

    /// Change the output from the front panel (no command involved)
    pub fn front_panel_output(&mut self, on: bool) {
        self.output_pending = None;
        self.apply_output(on);
    }

    /// Change the frequency mode from the front panel
    pub fn front_panel_frequency_mode(&mut self, mode: FrequencyMode) {
        self.frequency_mode = mode;
    }

    /// Process one received line, returning the reply (if any)
    pub fn process_line(&mut self, line: &str) -> Option<String> {
        let cmd = ScpiCommand::parse(line).unwrap_or_else(|e| {
            warn!("Virtual source {} failed to parse {:?}: {}", self.id(), line, e);
            ScpiCommand::Unknown(line.trim().to_string())
        });
        self.process_command(&cmd, line.trim())
    }

    /// Process a parsed command; `raw` is journaled as received
    pub fn process_command(&mut self, cmd: &ScpiCommand, raw: &str) -> Option<String> {
        if self.received_commands.len() == JOURNAL_CAPACITY {
            self.received_commands.pop_front();
        }
        self.received_commands.push_back(raw.to_string());
        debug!("Virtual source {} <- {}", self.id(), raw);

        if !cmd.is_query() && !matches!(cmd, ScpiCommand::Wait | ScpiCommand::Unknown(_)) {
            self.busy = self.config.busy_polls;
        }

        match cmd {
            ScpiCommand::Identify => Some(format!(
                "{},{},1407.6004k02/100000,3.1.19.15-3.20.390.24",
                self.model.manufacturer, self.model.model
            )),
            ScpiCommand::ClearStatus => {
                self.errors.clear();
                None
            }
            ScpiCommand::Reset => {
                self.reset();
                None
            }
            ScpiCommand::Wait => None,
            ScpiCommand::OperationComplete => {
                if self.busy > 0 {
                    self.busy -= 1;
                    Some("0".to_string())
                } else {
                    Some("1".to_string())
                }
            }
            ScpiCommand::Trigger => {
                self.trigger_count += 1;
                if self.frequency_mode == FrequencyMode::Sweep && self.output {
                    self.sweep_position = (self.sweep_position + self.sweep_step)
                        .min(self.sweep_stop);
                }
                None
            }
            ScpiCommand::ErrorQuery => {
                let entry = self.errors.pop_front().unwrap_or(DeviceErrorEntry {
                    code: 0,
                    message: "No error".to_string(),
                });
                Some(format!("{},\"{}\"", entry.code, entry.message))
            }
            ScpiCommand::Output(Some(on)) => {
                if self.config.frozen_output {
                    warn!("Virtual source {} output stage frozen", self.id());
                } else if self.config.output_settle_polls > 0 {
                    self.output_pending = Some((*on, self.config.output_settle_polls));
                } else {
                    self.apply_output(*on);
                }
                None
            }
            ScpiCommand::Output(None) => {
                if let Some((target, remaining)) = self.output_pending {
                    if remaining == 0 {
                        self.output_pending = None;
                        self.apply_output(target);
                    } else {
                        self.output_pending = Some((target, remaining - 1));
                    }
                }
                Some(bool_reply(self.output))
            }
            ScpiCommand::FrequencyMode(Some(FrequencyMode::List)) => {
                self.push_error(-221, "Settings conflict;list mode not available");
                None
            }
            ScpiCommand::FrequencyMode(Some(mode)) => {
                self.frequency_mode = *mode;
                None
            }
            ScpiCommand::FrequencyMode(None) => Some(self.frequency_mode.short_form().to_string()),
            ScpiCommand::Frequency(Some(hz)) => {
                self.cw_frequency = self.clamp_frequency(*hz);
                None
            }
            ScpiCommand::Frequency(None) => Some(format_value(self.cw_frequency)),
            ScpiCommand::SweepStart(Some(hz)) => {
                self.sweep_start = self.clamp_frequency(*hz);
                self.sweep_position = self.sweep_start;
                None
            }
            ScpiCommand::SweepStart(None) => Some(format_value(self.sweep_start)),
            ScpiCommand::SweepStop(Some(hz)) => {
                self.sweep_stop = self.clamp_frequency(*hz);
                None
            }
            ScpiCommand::SweepStop(None) => Some(format_value(self.sweep_stop)),
            ScpiCommand::SweepStep(Some(hz)) => {
                let limits = &self.model.limits;
                let (min, max) = (limits.sweep_min_step, limits.sweep_max_step);
                self.sweep_step = self.clamp(*hz, min, max, FREQUENCY_RESOLUTION);
                None
            }
            ScpiCommand::SweepStep(None) => Some(format_value(self.sweep_step)),
            ScpiCommand::SweepMode(Some(mode)) => {
                self.sweep_mode = *mode;
                None
            }
            ScpiCommand::SweepMode(None) => Some(self.sweep_mode.as_scpi().to_string()),
            ScpiCommand::SweepSpacing(Some(spacing)) => {
                self.sweep_spacing = *spacing;
                None
            }
            ScpiCommand::SweepSpacing(None) => Some(self.sweep_spacing.as_scpi().to_string()),
            ScpiCommand::AbortSweep => {
                self.sweep_position = self.sweep_start;
                None
            }
            ScpiCommand::Power(Some(dbm)) => {
                let limits = &self.model.limits;
                let (min, max) = (limits.min_power, limits.max_power);
                self.power = self.clamp(*dbm, min, max, POWER_RESOLUTION);
                None
            }
            ScpiCommand::Power(None) => Some(format_value(self.power)),
            ScpiCommand::TriggerSlope(Some(edge)) => {
                self.trigger_slope = *edge;
                None
            }
            ScpiCommand::TriggerSlope(None) => Some(
                self.config
                    .slope_reply_override
                    .clone()
                    .unwrap_or_else(|| self.trigger_slope.as_scpi().to_string()),
            ),
            ScpiCommand::SweepTriggerSource(Some(source)) => {
                self.trigger_source = *source;
                None
            }
            ScpiCommand::SweepTriggerSource(None) => {
                Some(self.trigger_source.as_scpi().to_string())
            }
            ScpiCommand::LfoState(Some(on)) => {
                self.lfo_on = *on;
                None
            }
            ScpiCommand::LfoState(None) => Some(bool_reply(self.lfo_on)),
            ScpiCommand::LfoShape(Some(shape)) => {
                self.lfo_shape = *shape;
                None
            }
            ScpiCommand::LfoShape(None) => Some(self.lfo_shape.as_scpi().to_string()),
            ScpiCommand::LfoFrequency(Some(hz)) => {
                self.lfo_frequency = self.clamp(*hz, 0.1, 1e6, FREQUENCY_RESOLUTION);
                None
            }
            ScpiCommand::LfoFrequency(None) => Some(format_value(self.lfo_frequency)),
            ScpiCommand::FmState(Some(on)) => {
                self.fm_on = *on;
                None
            }
            ScpiCommand::FmState(None) => Some(bool_reply(self.fm_on)),
            ScpiCommand::FmDeviation(Some(hz)) => {
                self.fm_deviation = self.clamp(*hz, 0.0, 16e6, FREQUENCY_RESOLUTION);
                None
            }
            ScpiCommand::FmDeviation(None) => Some(format_value(self.fm_deviation)),
            ScpiCommand::FmMode(Some(mode)) => {
                self.fm_mode = *mode;
                None
            }
            ScpiCommand::FmMode(None) => Some(self.fm_mode.as_scpi().to_string()),
            ScpiCommand::Unknown(raw) => {
                warn!("Virtual source {} received unknown command {:?}", self.id(), raw);
                self.push_error(-113, "Undefined header");
                None
            }
        }
    }

    /// Restore `*RST` defaults (the journal is kept)
    fn reset(&mut self) {
        self.frequency_mode = FrequencyMode::Cw;
        self.output = false;
        self.output_pending = None;
        self.cw_frequency = 1e9;
        self.power = -30.0;
        self.sweep_start = 100e6;
        self.sweep_stop = 500e6;
        self.sweep_step = 1e6;
        self.sweep_mode = SweepMode::Auto;
        self.sweep_spacing = SweepSpacing::Linear;
        self.sweep_position = self.sweep_start;
        self.trigger_slope = TriggerEdge::Rising;
        self.trigger_source = TriggerSource::Auto;
        self.lfo_on = false;
        self.fm_on = false;
        self.lfo_shape = ModulationShape::Sine;
        self.lfo_frequency = 1e3;
        self.fm_deviation = 1e3;
        self.fm_mode = BandwidthMode::LowNoise;
    }

    fn apply_output(&mut self, on: bool) {
        if on && !self.output && self.frequency_mode == FrequencyMode::Sweep {
            self.sweep_position = self.sweep_start;
        }
        self.output = on;
    }

    fn clamp_frequency(&mut self, hz: f64) -> f64 {
        let (min, max) = (self.model.limits.min_frequency, self.model.limits.max_frequency);
        self.clamp(hz, min, max, FREQUENCY_RESOLUTION)
    }

    /// Clamp to [min, max] (queueing a range error) and quantize
    fn clamp(&mut self, value: f64, min: f64, max: f64, resolution: f64) -> f64 {
        let clamped = value.clamp(min, max);
        if clamped != value {
            self.push_error(-222, "Data out of range");
        }
        let scale = (1.0 / resolution).round();
        (clamped * scale).round() / scale
    }

    fn push_error(&mut self, code: i32, message: &str) {
        self.errors.push_back(DeviceErrorEntry {
            code,
            message: message.to_string(),
        });
    }
}

fn bool_reply(on: bool) -> String {
    if on { "1" } else { "0" }.to_string()
}
