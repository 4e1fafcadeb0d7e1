//! Source actor
//!
//! One task owns the [`SourceDriver`]; every other task talks to it through
//! a [`SourceClient`]. Requests are handled strictly one after another, so
//! the session never sees two commands in flight no matter how many
//! clients exist.
//!
//! Each request runs under its own cancel token; [`SourceClient::cancel`]
//! aborts the poll of the request being handled and nothing after it.
//!
//! # Example
//!
//! ```rust,no_run
//! use mw_driver::{spawn_source_actor, DriverConfig, SourceDriver};
//! use mw_protocol::Mode;
//!
//! # async fn run() -> mw_driver::Result<()> {
//! let driver = SourceDriver::connect(&DriverConfig::new("SIM::SMBV100A")).await?;
//! let client = spawn_source_actor(driver);
//!
//! client.set_cw(Some(2.87e9), Some(-10.0)).await?;
//! client.turn_on(Mode::ContinuousWave).await?;
//! client.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use mw_protocol::{Identity, Mode, OperatingLimits, TriggerEdge};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::driver::SourceDriver;
use crate::error::{DriverError, Result};
use crate::mode::SweepRequest;
use crate::modulation::ReferenceSettings;
use crate::reader::{FrequencyReading, OutputState, ReferenceReadback, Readback};

type Reply<T> = oneshot::Sender<Result<T>>;

/// Requests handled by the source actor
#[derive(Debug)]
pub enum SourceActorCommand {
    Status(Reply<OutputState>),
    Frequency(Reply<FrequencyReading>),
    Power(Reply<f64>),
    Off(Reply<()>),
    TurnOn(Mode, Reply<OutputState>),
    SwitchTo(Mode, Reply<OutputState>),
    SetCw {
        frequency: Option<f64>,
        power: Option<f64>,
        response: Reply<Readback>,
    },
    SetSweep(SweepRequest, Reply<Readback>),
    ResetSweepPosition(Reply<()>),
    ListOn(Reply<OutputState>),
    SetList {
        frequencies: Vec<f64>,
        power: Option<f64>,
        response: Reply<Readback>,
    },
    ResetListPosition(Reply<()>),
    SetExternalTrigger(TriggerEdge, Reply<TriggerEdge>),
    SetInternalTrigger(Reply<()>),
    FireTrigger(Reply<()>),
    SetReference(ReferenceSettings, Reply<ReferenceReadback>),
    EnableReference(Reply<()>),
    DisableReference(Reply<()>),
    /// Disconnect and stop the actor
    Shutdown(Reply<()>),
}

/// Run the source actor until shutdown or until every client is gone
///
/// The cancel token of each request is published on `cancel_tx` before the
/// request runs.
pub async fn run_source_actor(
    mut driver: SourceDriver,
    mut cmd_rx: mpsc::Receiver<SourceActorCommand>,
    cancel_tx: watch::Sender<CancellationToken>,
) {
    info!("Source actor started for {}", driver.identity().model);

    while let Some(cmd) = cmd_rx.recv().await {
        debug!("Source actor handling {:?}", cmd);
        cancel_tx.send_replace(driver.cancel_token());
        match cmd {
            SourceActorCommand::Status(tx) => {
                let _ = tx.send(driver.status().await);
            }
            SourceActorCommand::Frequency(tx) => {
                let _ = tx.send(driver.frequency().await);
            }
            SourceActorCommand::Power(tx) => {
                let _ = tx.send(driver.power().await);
            }
            SourceActorCommand::Off(tx) => {
                let _ = tx.send(driver.off().await);
            }
            SourceActorCommand::TurnOn(mode, tx) => {
                let _ = tx.send(driver.turn_on(mode).await);
            }
            SourceActorCommand::SwitchTo(mode, tx) => {
                let _ = tx.send(driver.switch_to(mode).await);
            }
            SourceActorCommand::SetCw {
                frequency,
                power,
                response,
            } => {
                let _ = response.send(driver.set_cw(frequency, power).await);
            }
            SourceActorCommand::SetSweep(request, tx) => {
                let _ = tx.send(driver.set_sweep(request).await);
            }
            SourceActorCommand::ResetSweepPosition(tx) => {
                let _ = tx.send(driver.reset_sweep_position().await);
            }
            SourceActorCommand::ListOn(tx) => {
                let _ = tx.send(driver.list_on().await);
            }
            SourceActorCommand::SetList {
                frequencies,
                power,
                response,
            } => {
                let _ = response.send(driver.set_list(&frequencies, power).await);
            }
            SourceActorCommand::ResetListPosition(tx) => {
                let _ = tx.send(driver.reset_list_position().await);
            }
            SourceActorCommand::SetExternalTrigger(edge, tx) => {
                let _ = tx.send(driver.set_external_trigger(edge).await);
            }
            SourceActorCommand::SetInternalTrigger(tx) => {
                let _ = tx.send(driver.set_internal_trigger().await);
            }
            SourceActorCommand::FireTrigger(tx) => {
                let _ = tx.send(driver.fire_trigger().await);
            }
            SourceActorCommand::SetReference(settings, tx) => {
                let _ = tx.send(driver.set_reference(settings).await);
            }
            SourceActorCommand::EnableReference(tx) => {
                let _ = tx.send(driver.enable_reference().await);
            }
            SourceActorCommand::DisableReference(tx) => {
                let _ = tx.send(driver.disable_reference().await);
            }
            SourceActorCommand::Shutdown(tx) => {
                info!("Shutdown requested for source actor");
                let _ = tx.send(driver.disconnect().await);
                return;
            }
        }
    }

    debug!("All source clients dropped");
    if let Err(e) = driver.disconnect().await {
        warn!("Disconnect failed: {}", e);
    }
}

/// Spawn the actor for `driver` and return a client for it
pub fn spawn_source_actor(mut driver: SourceDriver) -> SourceClient {
    let identity = driver.identity().clone();
    let limits = driver.limits().clone();
    let (cancel_tx, cancel) = watch::channel(driver.cancel_token());
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    tokio::spawn(run_source_actor(driver, cmd_rx, cancel_tx));
    SourceClient {
        cmd_tx,
        identity,
        limits,
        cancel,
    }
}

/// Cloneable handle to a source actor
#[derive(Debug, Clone)]
pub struct SourceClient {
    cmd_tx: mpsc::Sender<SourceActorCommand>,
    identity: Identity,
    limits: OperatingLimits,
    cancel: watch::Receiver<CancellationToken>,
}

impl SourceClient {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn limits(&self) -> &OperatingLimits {
        &self.limits
    }

    /// Abort the poll of the request being handled
    ///
    /// Requests queued behind it run normally.
    pub fn cancel(&self) {
        self.cancel.borrow().cancel();
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> SourceActorCommand) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| DriverError::TaskStopped)?;
        rx.await.map_err(|_| DriverError::TaskStopped)?
    }

    pub async fn status(&self) -> Result<OutputState> {
        self.request(SourceActorCommand::Status).await
    }

    pub async fn frequency(&self) -> Result<FrequencyReading> {
        self.request(SourceActorCommand::Frequency).await
    }

    pub async fn power(&self) -> Result<f64> {
        self.request(SourceActorCommand::Power).await
    }

    pub async fn off(&self) -> Result<()> {
        self.request(SourceActorCommand::Off).await
    }

    pub async fn turn_on(&self, mode: Mode) -> Result<OutputState> {
        self.request(|tx| SourceActorCommand::TurnOn(mode, tx)).await
    }

    /// Select `mode` without starting the output
    pub async fn switch_to(&self, mode: Mode) -> Result<OutputState> {
        self.request(|tx| SourceActorCommand::SwitchTo(mode, tx)).await
    }

    pub async fn set_cw(&self, frequency: Option<f64>, power: Option<f64>) -> Result<Readback> {
        self.request(|response| SourceActorCommand::SetCw {
            frequency,
            power,
            response,
        })
        .await
    }

    pub async fn set_sweep(&self, request: SweepRequest) -> Result<Readback> {
        self.request(|tx| SourceActorCommand::SetSweep(request, tx)).await
    }

    pub async fn reset_sweep_position(&self) -> Result<()> {
        self.request(SourceActorCommand::ResetSweepPosition).await
    }

    pub async fn list_on(&self) -> Result<OutputState> {
        self.request(SourceActorCommand::ListOn).await
    }

    pub async fn set_list(&self, frequencies: Vec<f64>, power: Option<f64>) -> Result<Readback> {
        self.request(|response| SourceActorCommand::SetList {
            frequencies,
            power,
            response,
        })
        .await
    }

    pub async fn reset_list_position(&self) -> Result<()> {
        self.request(SourceActorCommand::ResetListPosition).await
    }

    pub async fn set_external_trigger(&self, edge: TriggerEdge) -> Result<TriggerEdge> {
        self.request(|tx| SourceActorCommand::SetExternalTrigger(edge, tx))
            .await
    }

    pub async fn set_internal_trigger(&self) -> Result<()> {
        self.request(SourceActorCommand::SetInternalTrigger).await
    }

    pub async fn fire_trigger(&self) -> Result<()> {
        self.request(SourceActorCommand::FireTrigger).await
    }

    pub async fn set_reference(&self, settings: ReferenceSettings) -> Result<ReferenceReadback> {
        self.request(|tx| SourceActorCommand::SetReference(settings, tx))
            .await
    }

    pub async fn enable_reference(&self) -> Result<()> {
        self.request(SourceActorCommand::EnableReference).await
    }

    pub async fn disable_reference(&self) -> Result<()> {
        self.request(SourceActorCommand::DisableReference).await
    }

    /// Disconnect the source and stop the actor
    pub async fn shutdown(&self) -> Result<()> {
        self.request(SourceActorCommand::Shutdown).await
    }
}
