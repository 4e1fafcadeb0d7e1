//! Trigger controller

use mw_protocol::{ScpiCommand, SourceModel, TriggerEdge, TriggerSource};
use tracing::debug;

use crate::channel::CommandChannel;
use crate::error::Result;
use crate::mode::ModeController;
use crate::reader::DeviceStateReader;

/// Trigger edge/source configuration and manual triggering
pub struct TriggerController<'a> {
    channel: &'a mut CommandChannel,
    model: &'a SourceModel,
}

impl<'a> TriggerController<'a> {
    pub fn new(channel: &'a mut CommandChannel, model: &'a SourceModel) -> Self {
        Self { channel, model }
    }

    /// Step on external trigger edges; returns the polarity read back
    ///
    /// Output is stopped first. An unrecognized polarity reply reads as
    /// [`TriggerEdge::Rising`].
    pub async fn set_external_trigger(&mut self, edge: TriggerEdge) -> Result<TriggerEdge> {
        ModeController::new(self.channel, self.model).off().await?;
        self.channel
            .command_wait(&ScpiCommand::TriggerSlope(Some(edge)))
            .await?;
        DeviceStateReader::new(self.channel).trigger_edge().await
    }

    /// Step once per internal (software) trigger
    pub async fn set_internal_trigger(&mut self) -> Result<()> {
        ModeController::new(self.channel, self.model).off().await?;
        self.channel
            .command_wait(&ScpiCommand::SweepTriggerSource(Some(TriggerSource::Single)))
            .await
    }

    /// Send one trigger pulse, then pause for the frequency switch time
    ///
    /// The pause is a fixed wait; the device does not confirm the step.
    pub async fn fire_trigger(&mut self) -> Result<()> {
        self.channel.send(&ScpiCommand::Trigger).await?;
        let settle = self.model.frequency_switch_time();
        debug!("{}: trigger sent, settling {:?}", self.channel.name(), settle);
        tokio::time::sleep(settle).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use mw_protocol::{Mode, SourceDatabase};
    use mw_sim::{spawn_virtual_source, VirtualSource, VirtualSourceConfig, VirtualSourceHandle};

    use crate::config::PollConfig;

    fn setup(config: VirtualSourceConfig) -> (CommandChannel, SourceModel, VirtualSourceHandle) {
        let model = SourceDatabase::by_model(&config.model).unwrap();
        let source = VirtualSource::from_config(config).unwrap();
        let (stream, handle) = spawn_virtual_source(source);
        let poll = PollConfig {
            interval_ms: 1,
            max_attempts: 50,
        };
        let channel = CommandChannel::new(stream, "trigger", Duration::from_secs(1), poll);
        (channel, model, handle)
    }

    #[tokio::test]
    async fn test_external_trigger_stops_output() {
        let (mut channel, model, handle) = setup(VirtualSourceConfig::default());
        ModeController::new(&mut channel, &model)
            .turn_on(Mode::ContinuousWave)
            .await
            .unwrap();

        let edge = TriggerController::new(&mut channel, &model)
            .set_external_trigger(TriggerEdge::Falling)
            .await
            .unwrap();

        assert_eq!(edge, TriggerEdge::Falling);
        let snapshot = handle.snapshot().await.unwrap();
        assert!(!snapshot.output);
        assert_eq!(snapshot.trigger_slope, TriggerEdge::Falling);
    }

    #[tokio::test]
    async fn test_unrecognized_polarity_reads_rising() {
        let (mut channel, model, _handle) = setup(VirtualSourceConfig {
            slope_reply_override: Some("EITH".into()),
            ..Default::default()
        });

        let edge = TriggerController::new(&mut channel, &model)
            .set_external_trigger(TriggerEdge::Falling)
            .await
            .unwrap();
        assert_eq!(edge, TriggerEdge::Rising);
    }

    #[tokio::test]
    async fn test_internal_trigger_arms_single_step() {
        let (mut channel, model, handle) = setup(VirtualSourceConfig::default());

        TriggerController::new(&mut channel, &model)
            .set_internal_trigger()
            .await
            .unwrap();

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.trigger_source, TriggerSource::Single);
    }

    #[tokio::test]
    async fn test_fire_trigger_is_blind_wait() {
        let (mut channel, model, handle) = setup(VirtualSourceConfig {
            busy_polls: 100,
            ..Default::default()
        });

        let started = Instant::now();
        TriggerController::new(&mut channel, &model)
            .fire_trigger()
            .await
            .unwrap();
        assert!(started.elapsed() >= model.frequency_switch_time());

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.trigger_count, 1);
        assert_eq!(snapshot.received_commands, vec!["*TRG"]);
    }
}
