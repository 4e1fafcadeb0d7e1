//! Mode controller
//!
//! Owns the output state machine: {CW, List, Sweep} x {running, stopped}.
//! Transitions are ordered (stop, select mode, start) and each step is
//! confirmed before the next is issued. Requests are validated against the
//! model's [`OperatingLimits`](mw_protocol::OperatingLimits) before anything
//! is written.

use mw_protocol::response::parse_bool;
use mw_protocol::{
    FrequencyMode, Mode, ScpiCommand, SourceModel, SweepMode, SweepSpacing, TriggerSource,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::channel::CommandChannel;
use crate::error::{DriverError, Result};
use crate::reader::{DeviceStateReader, OutputState, Readback};

/// Sweep settings; start, stop and step are only applied together
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepRequest {
    /// First frequency output, in Hz
    pub start: Option<f64>,
    /// Last frequency output, in Hz
    pub stop: Option<f64>,
    /// Step in Hz
    pub step: Option<f64>,
    /// dBm
    pub power: Option<f64>,
}

impl SweepRequest {
    pub fn new(start: f64, stop: f64, step: f64) -> Self {
        Self {
            start: Some(start),
            stop: Some(stop),
            step: Some(step),
            power: None,
        }
    }

    pub fn with_power(mut self, dbm: f64) -> Self {
        self.power = Some(dbm);
        self
    }

    /// The frequency triple, if complete
    fn range(&self) -> Option<(f64, f64, f64)> {
        Some((self.start?, self.stop?, self.step?))
    }
}

/// Mode transitions and output settings for one session
pub struct ModeController<'a> {
    channel: &'a mut CommandChannel,
    model: &'a SourceModel,
}

impl<'a> ModeController<'a> {
    pub fn new(channel: &'a mut CommandChannel, model: &'a SourceModel) -> Self {
        Self { channel, model }
    }

    fn reader(&mut self) -> DeviceStateReader<'_> {
        DeviceStateReader::new(self.channel)
    }

    /// Current output state, read from the device
    pub async fn status(&mut self) -> Result<OutputState> {
        self.reader().status().await
    }

    /// Select `target` as the frequency mode
    ///
    /// Nothing is written when `target` is already selected. A running
    /// output in a different mode is stopped first and left stopped.
    pub async fn switch_to(&mut self, target: Mode) -> Result<OutputState> {
        let Some(frequency_mode) = self.selectable(target).await? else {
            self.off().await?;
            return self.status().await;
        };

        let status = self.status().await?;
        if status.mode == target {
            debug!("{} already in {} mode", self.channel.name(), target);
            return Ok(status);
        }
        if status.is_running {
            self.off().await?;
        }

        info!("{}: switching {} -> {}", self.channel.name(), status.mode, target);
        self.channel
            .command_wait(&ScpiCommand::FrequencyMode(Some(frequency_mode)))
            .await?;
        Ok(OutputState {
            mode: target,
            is_running: false,
        })
    }

    /// Stop RF output and wait until the device reports it stopped
    pub async fn off(&mut self) -> Result<()> {
        if !self.status().await?.is_running {
            return Ok(());
        }

        let cmd = ScpiCommand::Output(Some(false));
        self.channel.send(&cmd).await?;
        self.channel.send(&ScpiCommand::Wait).await?;

        let mut poller = self.channel.poller(cmd.to_line());
        loop {
            let response = self.channel.query(&ScpiCommand::Output(None)).await?;
            let running = parse_bool(&response)
                .map_err(|e| DriverError::protocol("OUTP:STAT?", &response, e))?;
            if !running {
                break;
            }
            poller.wait(response).await?;
        }
        info!("{}: output off", self.channel.name());
        Ok(())
    }

    /// Start RF output in `mode` and wait until the device reports it running
    ///
    /// Already running in `mode` is a no-op; running in another mode is
    /// stopped first. `Mode::Off` is the same as [`ModeController::off`].
    pub async fn turn_on(&mut self, mode: Mode) -> Result<OutputState> {
        let Some(frequency_mode) = self.selectable(mode).await? else {
            self.off().await?;
            return self.status().await;
        };

        let status = self.status().await?;
        if status.is_running {
            if status.mode == mode {
                return Ok(status);
            }
            self.off().await?;
        }
        if status.mode != mode {
            self.channel
                .command_wait(&ScpiCommand::FrequencyMode(Some(frequency_mode)))
                .await?;
        }

        let cmd = ScpiCommand::Output(Some(true));
        self.channel.send(&cmd).await?;
        self.channel.send(&ScpiCommand::Wait).await?;

        let mut poller = self.channel.poller(cmd.to_line());
        loop {
            let status = self.status().await?;
            if status.is_running {
                info!("{}: output on in {} mode", self.channel.name(), status.mode);
                return Ok(status);
            }
            poller.wait(format!("{:?}", status)).await?;
        }
    }

    /// Switch to CW and set frequency and/or power
    ///
    /// Values are checked against the limits first; an out-of-range request
    /// fails with [`DriverError::Validation`] and nothing is written. The
    /// returned values are read back, as the device quantizes them.
    pub async fn set_cw(&mut self, frequency: Option<f64>, power: Option<f64>) -> Result<Readback> {
        let limits = &self.model.limits;
        if let Some(hz) = frequency {
            limits.check_frequency(hz)?;
        }
        if let Some(dbm) = power {
            limits.check_power(dbm)?;
        }

        self.switch_to(Mode::ContinuousWave).await?;

        if let Some(hz) = frequency {
            self.channel
                .command_wait(&ScpiCommand::Frequency(Some(hz)))
                .await?;
        }
        if let Some(dbm) = power {
            self.channel.command_wait(&ScpiCommand::Power(Some(dbm))).await?;
        }

        self.reader().readback().await
    }

    /// Stop output, switch to sweep and program a stepped linear sweep
    ///
    /// The device is armed one step below `start`, so the first trigger
    /// outputs `start` itself; the readback reports the logical start.
    /// A partial start/stop/step triple is ignored.
    pub async fn set_sweep(&mut self, request: SweepRequest) -> Result<Readback> {
        let limits = &self.model.limits;
        let range = request.range();
        if let Some((start, stop, step)) = range {
            limits.check_sweep(start, stop, step)?;
        } else if request.start.is_some() || request.stop.is_some() || request.step.is_some() {
            warn!(
                "{}: incomplete sweep range {:?}, keeping the programmed one",
                self.channel.name(),
                request
            );
        }
        if let Some(dbm) = request.power {
            limits.check_power(dbm)?;
        }

        self.off().await?;
        self.switch_to(Mode::Sweep).await?;

        if let Some((start, stop, step)) = range {
            self.channel
                .command_wait(&ScpiCommand::SweepMode(Some(SweepMode::Step)))
                .await?;
            self.channel
                .command_wait(&ScpiCommand::SweepSpacing(Some(SweepSpacing::Linear)))
                .await?;
            self.channel
                .command_wait(&ScpiCommand::SweepStart(Some(start - step)))
                .await?;
            self.channel
                .command_wait(&ScpiCommand::SweepStop(Some(stop)))
                .await?;
            self.channel
                .command_wait(&ScpiCommand::SweepStep(Some(step)))
                .await?;
        }
        if let Some(dbm) = request.power {
            self.channel.command_wait(&ScpiCommand::Power(Some(dbm))).await?;
        }
        self.channel
            .command_wait(&ScpiCommand::SweepTriggerSource(Some(TriggerSource::Single)))
            .await?;

        self.reader().readback().await
    }

    /// Abort the running sweep and rearm it at the start
    pub async fn reset_sweep_position(&mut self) -> Result<()> {
        self.channel.command_wait(&ScpiCommand::AbortSweep).await
    }

    /// Start list output; never available on this family
    pub async fn list_on(&mut self) -> Result<OutputState> {
        Err(self.unsupported(Mode::List).await)
    }

    /// Program a frequency list; never available on this family
    ///
    /// The error carries the current settings as a fallback.
    pub async fn set_list(&mut self, _frequencies: &[f64], _power: Option<f64>) -> Result<Readback> {
        Err(self.unsupported(Mode::List).await)
    }

    /// Rewind the frequency list; never available on this family
    pub async fn reset_list_position(&mut self) -> Result<()> {
        Err(self.unsupported(Mode::List).await)
    }

    /// Frequency mode for `mode`, `None` for `Off`, or an unsupported-mode error
    async fn selectable(&mut self, mode: Mode) -> Result<Option<FrequencyMode>> {
        if !self.model.limits.supports(mode) {
            return Err(self.unsupported(mode).await);
        }
        Ok(mode.frequency_mode())
    }

    async fn unsupported(&mut self, mode: Mode) -> DriverError {
        let fallback = match self.reader().readback().await {
            Ok(readback) => Some(Box::new(readback)),
            Err(e) => {
                warn!("{}: no fallback readback: {}", self.channel.name(), e);
                None
            }
        };
        DriverError::UnsupportedMode {
            mode,
            model: self.model.model.clone(),
            fallback,
        }
    }
}
