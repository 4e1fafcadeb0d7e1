//! Source model database
//!
//! This module contains the operating limits of each supported source model
//! and the client-side validation applied before a command reaches the
//! device. Limits are resolved once per connection and never mutated.

use std::time::Duration;

use crate::error::LimitViolation;
use crate::Mode;

/// Operating limits of a specific model (static version for database)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperatingLimitsStatic {
    /// Modes the model can run
    pub supported_modes: &'static [Mode],
    /// Minimum output power in dBm
    pub min_power: f64,
    /// Maximum output power in dBm
    pub max_power: f64,
    /// Minimum frequency in Hz
    pub min_frequency: f64,
    /// Maximum frequency in Hz
    pub max_frequency: f64,
    /// Minimum list step in Hz
    pub list_min_step: f64,
    /// Maximum number of list entries
    pub list_max_entries: u32,
    /// Minimum sweep step in Hz
    pub sweep_min_step: f64,
    /// Maximum number of sweep entries
    pub sweep_max_entries: u32,
}

/// Operating limits of a specific model (owned version)
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OperatingLimits {
    /// Modes the model can run (`Off` is always allowed)
    pub supported_modes: Vec<Mode>,
    /// Minimum output power in dBm
    pub min_power: f64,
    /// Maximum output power in dBm
    pub max_power: f64,
    /// Minimum frequency in Hz
    pub min_frequency: f64,
    /// Maximum frequency in Hz
    pub max_frequency: f64,
    /// Minimum list step in Hz
    pub list_min_step: f64,
    /// Maximum list step in Hz
    pub list_max_step: f64,
    /// Maximum number of list entries
    pub list_max_entries: u32,
    /// Minimum sweep step in Hz
    pub sweep_min_step: f64,
    /// Maximum sweep step in Hz
    pub sweep_max_step: f64,
    /// Maximum number of sweep entries
    pub sweep_max_entries: u32,
}

impl From<OperatingLimitsStatic> for OperatingLimits {
    fn from(s: OperatingLimitsStatic) -> Self {
        // The largest usable step is the full frequency span
        let span = s.max_frequency - s.min_frequency;
        Self {
            supported_modes: s.supported_modes.to_vec(),
            min_power: s.min_power,
            max_power: s.max_power,
            min_frequency: s.min_frequency,
            max_frequency: s.max_frequency,
            list_min_step: s.list_min_step,
            list_max_step: span,
            list_max_entries: s.list_max_entries,
            sweep_min_step: s.sweep_min_step,
            sweep_max_step: span,
            sweep_max_entries: s.sweep_max_entries,
        }
    }
}

impl OperatingLimits {
    /// Apply a configured power ceiling
    ///
    /// The ceiling only ever lowers `max_power`.
    pub fn with_max_power(mut self, ceiling: Option<f64>) -> Self {
        if let Some(ceiling) = ceiling {
            if ceiling < self.max_power {
                self.max_power = ceiling;
            }
        }
        self
    }

    /// Returns whether the model can run the given mode
    pub fn supports(&self, mode: Mode) -> bool {
        mode == Mode::Off || self.supported_modes.contains(&mode)
    }

    /// Check a CW frequency
    pub fn check_frequency(&self, hz: f64) -> Result<(), LimitViolation> {
        if !(self.min_frequency..=self.max_frequency).contains(&hz) {
            return Err(LimitViolation::FrequencyOutOfRange {
                value: hz,
                min: self.min_frequency,
                max: self.max_frequency,
            });
        }
        Ok(())
    }

    /// Check an output power
    pub fn check_power(&self, dbm: f64) -> Result<(), LimitViolation> {
        if !(self.min_power..=self.max_power).contains(&dbm) {
            return Err(LimitViolation::PowerOutOfRange {
                value: dbm,
                min: self.min_power,
                max: self.max_power,
            });
        }
        Ok(())
    }

    /// Number of steps a sweep from `start` to `stop` takes
    pub fn sweep_entries(start: f64, stop: f64, step: f64) -> f64 {
        (stop - start) / step
    }

    /// Check a complete sweep definition
    ///
    /// Besides the step and entry bounds, the armed start (`start - step`,
    /// see the driver's sweep arming) must itself be a legal frequency.
    pub fn check_sweep(&self, start: f64, stop: f64, step: f64) -> Result<(), LimitViolation> {
        if !(step.is_finite() && step > 0.0) {
            return Err(LimitViolation::NonPositiveStep(step));
        }
        if start >= stop {
            return Err(LimitViolation::SweepOrder { start, stop });
        }
        self.check_frequency(start)?;
        self.check_frequency(stop)?;
        if !(self.sweep_min_step..=self.sweep_max_step).contains(&step) {
            return Err(LimitViolation::StepOutOfRange {
                value: step,
                min: self.sweep_min_step,
                max: self.sweep_max_step,
            });
        }
        let entries = Self::sweep_entries(start, stop, step);
        if entries > f64::from(self.sweep_max_entries) {
            return Err(LimitViolation::TooManyEntries {
                entries,
                max: self.sweep_max_entries,
            });
        }
        let armed = start - step;
        if armed < self.min_frequency {
            return Err(LimitViolation::ArmedStartBelowMinimum {
                armed,
                min: self.min_frequency,
            });
        }
        Ok(())
    }
}

/// Information about a specific source model (static version)
#[derive(Debug, Clone, Copy)]
pub struct SourceModelStatic {
    /// Manufacturer name
    pub manufacturer: &'static str,
    /// Model name as reported in `*IDN?`
    pub model: &'static str,
    /// Time a frequency step takes to settle, in microseconds
    pub frequency_switch_us: u64,
    /// Operating limits
    pub limits: OperatingLimitsStatic,
}

/// Information about a specific source model (owned version)
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SourceModel {
    /// Manufacturer name
    pub manufacturer: String,
    /// Model name as reported in `*IDN?`
    pub model: String,
    /// Time a frequency step takes to settle, in microseconds
    pub frequency_switch_us: u64,
    /// Operating limits
    pub limits: OperatingLimits,
}

impl SourceModel {
    /// Settle time after a manual trigger
    pub fn frequency_switch_time(&self) -> Duration {
        Duration::from_micros(self.frequency_switch_us)
    }
}

impl From<&SourceModelStatic> for SourceModel {
    fn from(s: &SourceModelStatic) -> Self {
        Self {
            manufacturer: s.manufacturer.to_string(),
            model: s.model.to_string(),
            frequency_switch_us: s.frequency_switch_us,
            limits: s.limits.into(),
        }
    }
}

/// Database of known source models
pub struct SourceDatabase;

impl SourceDatabase {
    /// Look up a model by the name reported in `*IDN?` (case-insensitive)
    pub fn by_model(name: &str) -> Option<SourceModel> {
        let name = name.trim();
        SOURCES
            .iter()
            .find(|m| m.model.eq_ignore_ascii_case(name))
            .map(|m| m.into())
    }

    /// Get all known models
    pub fn all() -> impl Iterator<Item = SourceModel> {
        SOURCES.iter().map(|m| m.into())
    }

    /// Model whose limits apply when the identified model is unknown
    pub fn default_model() -> SourceModel {
        (&SOURCES[0]).into()
    }
}

static MODES_CW_SWEEP: &[Mode] = &[Mode::ContinuousWave, Mode::Sweep];

// SMBV100A first: it is the default for unidentified models
static SOURCES: &[SourceModelStatic] = &[
    SourceModelStatic {
        manufacturer: "Rohde&Schwarz",
        model: "SMBV100A",
        frequency_switch_us: 3_000,
        limits: OperatingLimitsStatic {
            supported_modes: MODES_CW_SWEEP,
            min_power: -145.0,
            max_power: 30.0,
            min_frequency: 9e3,
            max_frequency: 6e9,
            list_min_step: 0.1,
            list_max_entries: 1,
            sweep_min_step: 0.1,
            sweep_max_entries: 10_001,
        },
    },
    SourceModelStatic {
        manufacturer: "Rohde&Schwarz",
        model: "SMB100A",
        frequency_switch_us: 3_000,
        limits: OperatingLimitsStatic {
            supported_modes: MODES_CW_SWEEP,
            min_power: -145.0,
            max_power: 30.0,
            min_frequency: 9e3,
            max_frequency: 3.2e9,
            list_min_step: 0.1,
            list_max_entries: 1,
            sweep_min_step: 0.1,
            sweep_max_entries: 10_001,
        },
    },
];
