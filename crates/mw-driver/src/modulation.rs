//! Modulation controller
//!
//! The reference is an FM path driven by the internal LFO. Both paths are
//! switched together.

use mw_protocol::{BandwidthMode, ModulationShape, ScpiCommand};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::channel::CommandChannel;
use crate::error::Result;
use crate::reader::{DeviceStateReader, ReferenceReadback, ReferenceState};

/// Reference parameters to change; `None` leaves a setting alone
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSettings {
    pub shape: Option<ModulationShape>,
    /// LFO frequency in Hz
    pub center_frequency: Option<f64>,
    pub bandwidth_mode: Option<BandwidthMode>,
    /// FM deviation in Hz
    pub deviation: Option<f64>,
}

/// Reference modulation for one session
pub struct ModulationController<'a> {
    channel: &'a mut CommandChannel,
}

impl<'a> ModulationController<'a> {
    pub fn new(channel: &'a mut CommandChannel) -> Self {
        Self { channel }
    }

    /// Switch the reference off, apply `settings` and read all four back
    ///
    /// The reference is left off.
    pub async fn set_reference(&mut self, settings: ReferenceSettings) -> Result<ReferenceReadback> {
        self.disable_reference().await?;

        if let Some(shape) = settings.shape {
            self.channel
                .command_wait(&ScpiCommand::LfoShape(Some(shape)))
                .await?;
        }
        if let Some(hz) = settings.center_frequency {
            self.channel
                .command_wait(&ScpiCommand::LfoFrequency(Some(hz)))
                .await?;
        }
        if let Some(hz) = settings.deviation {
            self.channel
                .command_wait(&ScpiCommand::FmDeviation(Some(hz)))
                .await?;
        }
        if let Some(mode) = settings.bandwidth_mode {
            self.channel
                .command_wait(&ScpiCommand::FmMode(Some(mode)))
                .await?;
        }

        DeviceStateReader::new(self.channel).reference().await
    }

    /// Turn FM and LFO on and wait until both report on
    pub async fn enable_reference(&mut self) -> Result<()> {
        self.switch_reference(true).await
    }

    /// Turn FM and LFO off and wait until both report off
    pub async fn disable_reference(&mut self) -> Result<()> {
        self.switch_reference(false).await
    }

    async fn switch_reference(&mut self, on: bool) -> Result<()> {
        let target = ReferenceState {
            fm_on: on,
            lfo_on: on,
        };
        let mut state = DeviceStateReader::new(self.channel).reference_state().await?;
        if state == target {
            return Ok(());
        }
        if state.fm_on != on {
            self.channel.command_wait(&ScpiCommand::FmState(Some(on))).await?;
        }
        if state.lfo_on != on {
            self.channel.command_wait(&ScpiCommand::LfoState(Some(on))).await?;
        }

        let command = if on { "FM1:STAT ON; LFO ON" } else { "FM1:STAT OFF; LFO OFF" };
        let mut poller = self.channel.poller(command);
        loop {
            state = DeviceStateReader::new(self.channel).reference_state().await?;
            if state == target {
                info!("{}: reference {}", self.channel.name(), if on { "on" } else { "off" });
                return Ok(());
            }
            poller.wait(format!("{:?}", state)).await?;
        }
    }
}
