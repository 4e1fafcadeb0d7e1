//! Device state reader
//!
//! Read-only queries, parsed into typed values. Nothing is cached: the
//! device is the source of truth because its front panel can change state
//! between driver calls.

use mw_protocol::response::{
    parse_bandwidth_mode, parse_bool, parse_error_entry, parse_frequency_mode, parse_identity,
    parse_modulation_shape, parse_number, parse_trigger_edge,
};
use mw_protocol::{
    BandwidthMode, DeviceErrorEntry, FrequencyMode, Identity, Mode, ModulationShape, ScpiCommand,
    TriggerEdge, TriggerSource,
};
use serde::{Deserialize, Serialize};

use crate::channel::CommandChannel;
use crate::error::{DriverError, Result};

/// Selected mode and whether RF output is on
///
/// The hardware keeps a frequency mode while the output is off, so `mode`
/// is never [`Mode::Off`] here; see [`OutputState::effective_mode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputState {
    pub mode: Mode,
    pub is_running: bool,
}

impl OutputState {
    /// `Off` when stopped, otherwise the selected mode
    pub fn effective_mode(&self) -> Mode {
        if self.is_running {
            self.mode
        } else {
            Mode::Off
        }
    }
}

/// Output frequency, shaped by the selected mode
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FrequencyReading {
    /// Single frequency in Hz (CW, and list fallback)
    Cw(f64),
    /// Sweep definition in Hz; `start` is the first stepped frequency
    Sweep { start: f64, stop: f64, step: f64 },
}

impl FrequencyReading {
    /// The CW frequency, if this is one
    pub fn cw(&self) -> Option<f64> {
        match self {
            FrequencyReading::Cw(hz) => Some(*hz),
            FrequencyReading::Sweep { .. } => None,
        }
    }
}

/// Actual settings read back after a change
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Readback {
    pub frequency: FrequencyReading,
    /// dBm
    pub power: f64,
    pub mode: Mode,
}

/// Reference (LFO-driven FM) settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceReadback {
    pub shape: ModulationShape,
    /// LFO frequency in Hz
    pub center_frequency: f64,
    pub bandwidth_mode: BandwidthMode,
    /// FM deviation in Hz
    pub deviation: f64,
}

/// On/off state of the two reference paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceState {
    pub fm_on: bool,
    pub lfo_on: bool,
}

/// Typed read-only queries against a channel
pub struct DeviceStateReader<'a> {
    channel: &'a mut CommandChannel,
}

impl<'a> DeviceStateReader<'a> {
    pub fn new(channel: &'a mut CommandChannel) -> Self {
        Self { channel }
    }

    /// Output state and selected frequency mode
    pub async fn status(&mut self) -> Result<OutputState> {
        let is_running = self
            .channel
            .query_parsed(&ScpiCommand::Output(None), parse_bool)
            .await?;
        let mode = self
            .channel
            .query_parsed(&ScpiCommand::FrequencyMode(None), parse_frequency_mode)
            .await?;
        Ok(OutputState {
            mode: mode.into(),
            is_running,
        })
    }

    /// Current frequency, shaped by the selected mode
    ///
    /// In sweep mode the device holds the armed start, one step below the
    /// first frequency actually output, so `start` is reported as
    /// `armed + step`.
    pub async fn frequency(&mut self) -> Result<FrequencyReading> {
        let mode = self
            .channel
            .query_parsed(&ScpiCommand::FrequencyMode(None), parse_frequency_mode)
            .await?;
        match mode {
            FrequencyMode::Cw | FrequencyMode::List => {
                let hz = self
                    .channel
                    .query_parsed(&ScpiCommand::Frequency(None), parse_number)
                    .await?;
                Ok(FrequencyReading::Cw(hz))
            }
            FrequencyMode::Sweep => {
                let armed = self
                    .channel
                    .query_parsed(&ScpiCommand::SweepStart(None), parse_number)
                    .await?;
                let stop = self
                    .channel
                    .query_parsed(&ScpiCommand::SweepStop(None), parse_number)
                    .await?;
                let step = self
                    .channel
                    .query_parsed(&ScpiCommand::SweepStep(None), parse_number)
                    .await?;
                Ok(FrequencyReading::Sweep {
                    start: armed + step,
                    stop,
                    step,
                })
            }
        }
    }

    /// Output power in dBm
    pub async fn power(&mut self) -> Result<f64> {
        self.channel
            .query_parsed(&ScpiCommand::Power(None), parse_number)
            .await
    }

    /// Frequency, power and selected mode in one go
    pub async fn readback(&mut self) -> Result<Readback> {
        let frequency = self.frequency().await?;
        let power = self.power().await?;
        let OutputState { mode, .. } = self.status().await?;
        Ok(Readback {
            frequency,
            power,
            mode,
        })
    }

    /// External trigger polarity
    ///
    /// Anything but a falling-edge token reads as [`TriggerEdge::Rising`].
    pub async fn trigger_edge(&mut self) -> Result<TriggerEdge> {
        let response = self.channel.query(&ScpiCommand::TriggerSlope(None)).await?;
        Ok(parse_trigger_edge(&response))
    }

    /// Trigger source of the frequency sweep
    pub async fn sweep_trigger_source(&mut self) -> Result<TriggerSource> {
        let cmd = ScpiCommand::SweepTriggerSource(None);
        let response = self.channel.query(&cmd).await?;
        TriggerSource::from_scpi(&response).ok_or_else(|| DriverError::Protocol {
            command: cmd.to_line(),
            response: response.clone(),
            reason: "unknown trigger source".to_string(),
        })
    }

    /// Whether the FM and LFO paths are on
    pub async fn reference_state(&mut self) -> Result<ReferenceState> {
        let fm_on = self
            .channel
            .query_parsed(&ScpiCommand::FmState(None), parse_bool)
            .await?;
        let lfo_on = self
            .channel
            .query_parsed(&ScpiCommand::LfoState(None), parse_bool)
            .await?;
        Ok(ReferenceState { fm_on, lfo_on })
    }

    /// All four reference settings; unknown short codes are protocol errors
    pub async fn reference(&mut self) -> Result<ReferenceReadback> {
        let shape = self
            .channel
            .query_parsed(&ScpiCommand::LfoShape(None), parse_modulation_shape)
            .await?;
        let center_frequency = self
            .channel
            .query_parsed(&ScpiCommand::LfoFrequency(None), parse_number)
            .await?;
        let deviation = self
            .channel
            .query_parsed(&ScpiCommand::FmDeviation(None), parse_number)
            .await?;
        let bandwidth_mode = self
            .channel
            .query_parsed(&ScpiCommand::FmMode(None), parse_bandwidth_mode)
            .await?;
        Ok(ReferenceReadback {
            shape,
            center_frequency,
            bandwidth_mode,
            deviation,
        })
    }

    /// Parsed `*IDN?` record
    pub async fn identity(&mut self) -> Result<Identity> {
        self.channel
            .query_parsed(&ScpiCommand::Identify, parse_identity)
            .await
    }

    /// Pop the oldest entry of the device error queue
    pub async fn next_error(&mut self) -> Result<DeviceErrorEntry> {
        self.channel
            .query_parsed(&ScpiCommand::ErrorQuery, parse_error_entry)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use mw_sim::{spawn_virtual_source, FrontPanelAction, VirtualSource, VirtualSourceHandle};

    use crate::config::PollConfig;

    fn setup() -> (CommandChannel, VirtualSourceHandle) {
        let source = VirtualSource::new("reader", "SMBV100A").unwrap();
        let (stream, handle) = spawn_virtual_source(source);
        let channel =
            CommandChannel::new(stream, "reader", Duration::from_secs(1), PollConfig::default());
        (channel, handle)
    }

    #[tokio::test]
    async fn test_status_follows_front_panel() {
        let (mut channel, handle) = setup();

        let status = DeviceStateReader::new(&mut channel).status().await.unwrap();
        assert_eq!(
            status,
            OutputState {
                mode: Mode::ContinuousWave,
                is_running: false
            }
        );
        assert_eq!(status.effective_mode(), Mode::Off);

        handle
            .front_panel(FrontPanelAction::SetFrequencyMode(FrequencyMode::Sweep))
            .await;
        handle.front_panel(FrontPanelAction::SetOutput(true)).await;

        let status = DeviceStateReader::new(&mut channel).status().await.unwrap();
        assert_eq!(status.effective_mode(), Mode::Sweep);
    }

    #[tokio::test]
    async fn test_frequency_shape_depends_on_mode() {
        let (mut channel, _handle) = setup();
        let mut reader = DeviceStateReader::new(&mut channel);

        assert_eq!(reader.frequency().await.unwrap(), FrequencyReading::Cw(1e9));

        for cmd in [
            ScpiCommand::FrequencyMode(Some(FrequencyMode::Sweep)),
            ScpiCommand::SweepStart(Some(999e6)),
            ScpiCommand::SweepStop(Some(2e9)),
            ScpiCommand::SweepStep(Some(1e6)),
        ] {
            reader.channel.send(&cmd).await.unwrap();
        }

        assert_eq!(
            reader.frequency().await.unwrap(),
            FrequencyReading::Sweep {
                start: 1e9,
                stop: 2e9,
                step: 1e6
            }
        );
    }

    #[test]
    fn test_frequency_reading_json() {
        let cw = Readback {
            frequency: FrequencyReading::Cw(2.87e9),
            power: -10.0,
            mode: Mode::ContinuousWave,
        };
        let json = serde_json::to_value(cw).unwrap();
        assert_eq!(json["frequency"]["kind"], "cw");
        assert_eq!(json["frequency"]["value"], 2.87e9);
        assert_eq!(serde_json::from_value::<Readback>(json).unwrap(), cw);

        let sweep = FrequencyReading::Sweep {
            start: 1e9,
            stop: 2e9,
            step: 1e6,
        };
        let json = serde_json::to_value(sweep).unwrap();
        assert_eq!(json["kind"], "sweep");
        assert_eq!(json["value"]["step"], 1e6);
        assert_eq!(serde_json::from_value::<FrequencyReading>(json).unwrap(), sweep);
    }

    #[tokio::test]
    async fn test_reference_defaults() {
        let (mut channel, _handle) = setup();
        let mut reader = DeviceStateReader::new(&mut channel);

        assert_eq!(
            reader.reference_state().await.unwrap(),
            ReferenceState {
                fm_on: false,
                lfo_on: false
            }
        );
        assert_eq!(
            reader.reference().await.unwrap(),
            ReferenceReadback {
                shape: ModulationShape::Sine,
                center_frequency: 1e3,
                bandwidth_mode: BandwidthMode::LowNoise,
                deviation: 1e3,
            }
        );
    }

    #[tokio::test]
    async fn test_identity_and_error_queue() {
        let (mut channel, _handle) = setup();
        let mut reader = DeviceStateReader::new(&mut channel);

        let identity = reader.identity().await.unwrap();
        assert_eq!(identity.model, "SMBV100A");

        reader
            .channel
            .send(&ScpiCommand::Frequency(Some(9e9)))
            .await
            .unwrap();
        assert_eq!(reader.next_error().await.unwrap().code, -222);
        assert!(reader.next_error().await.unwrap().is_empty());
    }
}
