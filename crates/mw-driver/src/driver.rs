//! Source driver handle
//!
//! A [`SourceDriver`] is the explicit handle to one connected source: it
//! owns the [`CommandChannel`] and the model record resolved at connect
//! time, and hands out short-lived controllers that borrow both.

use mw_protocol::{
    Identity, Mode, OperatingLimits, ScpiCommand, SourceDatabase, SourceModel, TriggerEdge,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::address::SessionAddress;
use crate::channel::CommandChannel;
use crate::config::DriverConfig;
use crate::error::Result;
use crate::mode::{ModeController, SweepRequest};
use crate::modulation::{ModulationController, ReferenceSettings};
use crate::reader::{DeviceStateReader, FrequencyReading, OutputState, ReferenceReadback, Readback};
use crate::transport::{self, Transport};
use crate::trigger::TriggerController;

/// Connected source
#[derive(Debug)]
pub struct SourceDriver {
    channel: CommandChannel,
    identity: Identity,
    model: SourceModel,
}

impl SourceDriver {
    /// Open the session named by `config.address` and identify the device
    pub async fn connect(config: &DriverConfig) -> Result<Self> {
        let address: SessionAddress = config.address.parse()?;
        let stream = transport::open(&address, config.timeout()).await?;
        Self::from_stream(stream, address.to_string(), config).await
    }

    /// Identify and initialise a device on an already open stream
    pub async fn from_stream<T>(stream: T, name: impl Into<String>, config: &DriverConfig) -> Result<Self>
    where
        T: Transport + 'static,
    {
        let mut channel = CommandChannel::new(stream, name, config.timeout(), config.poll);

        let identity = DeviceStateReader::new(&mut channel).identity().await?;
        let model = match SourceDatabase::by_model(&identity.model) {
            Some(model) => model,
            None => {
                let fallback = SourceDatabase::default_model();
                warn!(
                    "Unknown source model {:?}, using {} limits",
                    identity.model, fallback.model
                );
                fallback
            }
        };
        let model = SourceModel {
            limits: model.limits.with_max_power(config.max_power_dbm),
            ..model
        };
        info!(
            "{} {} connected on {} (serial {})",
            identity.manufacturer,
            identity.model,
            channel.name(),
            identity.serial
        );

        if config.reset_on_connect {
            channel.command_wait(&ScpiCommand::ClearStatus).await?;
            channel.command_wait(&ScpiCommand::Reset).await?;
        }

        Ok(Self {
            channel,
            identity,
            model,
        })
    }

    /// Close the session
    pub async fn disconnect(mut self) -> Result<()> {
        info!("Disconnecting {}", self.channel.name());
        self.channel.shutdown().await
    }

    /// Operating limits resolved at connect time
    pub fn limits(&self) -> &OperatingLimits {
        &self.model.limits
    }

    /// Model record whose limits apply
    pub fn model(&self) -> &SourceModel {
        &self.model
    }

    /// Identification reported by the device
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Token that aborts the polls of the running or next operation
    ///
    /// Once it fires, the operation after the cancelled one starts with a
    /// fresh token; take a new one from here to cancel that.
    pub fn cancel_token(&mut self) -> CancellationToken {
        self.channel.arm_cancel()
    }

    pub fn reader(&mut self) -> DeviceStateReader<'_> {
        self.channel.arm_cancel();
        DeviceStateReader::new(&mut self.channel)
    }

    pub fn mode(&mut self) -> ModeController<'_> {
        self.channel.arm_cancel();
        ModeController::new(&mut self.channel, &self.model)
    }

    pub fn trigger(&mut self) -> TriggerController<'_> {
        self.channel.arm_cancel();
        TriggerController::new(&mut self.channel, &self.model)
    }

    pub fn modulation(&mut self) -> ModulationController<'_> {
        self.channel.arm_cancel();
        ModulationController::new(&mut self.channel)
    }

    pub async fn status(&mut self) -> Result<OutputState> {
        self.reader().status().await
    }

    pub async fn frequency(&mut self) -> Result<FrequencyReading> {
        self.reader().frequency().await
    }

    pub async fn power(&mut self) -> Result<f64> {
        self.reader().power().await
    }

    pub async fn off(&mut self) -> Result<()> {
        self.mode().off().await
    }

    pub async fn turn_on(&mut self, mode: Mode) -> Result<OutputState> {
        self.mode().turn_on(mode).await
    }

    pub async fn switch_to(&mut self, mode: Mode) -> Result<OutputState> {
        self.mode().switch_to(mode).await
    }

    pub async fn set_cw(&mut self, frequency: Option<f64>, power: Option<f64>) -> Result<Readback> {
        self.mode().set_cw(frequency, power).await
    }

    pub async fn set_sweep(&mut self, request: SweepRequest) -> Result<Readback> {
        self.mode().set_sweep(request).await
    }

    pub async fn reset_sweep_position(&mut self) -> Result<()> {
        self.mode().reset_sweep_position().await
    }

    pub async fn list_on(&mut self) -> Result<OutputState> {
        self.mode().list_on().await
    }

    pub async fn set_list(&mut self, frequencies: &[f64], power: Option<f64>) -> Result<Readback> {
        self.mode().set_list(frequencies, power).await
    }

    pub async fn reset_list_position(&mut self) -> Result<()> {
        self.mode().reset_list_position().await
    }

    pub async fn set_external_trigger(&mut self, edge: TriggerEdge) -> Result<TriggerEdge> {
        self.trigger().set_external_trigger(edge).await
    }

    pub async fn set_internal_trigger(&mut self) -> Result<()> {
        self.trigger().set_internal_trigger().await
    }

    pub async fn fire_trigger(&mut self) -> Result<()> {
        self.trigger().fire_trigger().await
    }

    pub async fn set_reference(&mut self, settings: ReferenceSettings) -> Result<ReferenceReadback> {
        self.modulation().set_reference(settings).await
    }

    pub async fn enable_reference(&mut self) -> Result<()> {
        self.modulation().enable_reference().await
    }

    pub async fn disable_reference(&mut self) -> Result<()> {
        self.modulation().disable_reference().await
    }
}
