//! Virtual source actor task
//!
//! Owns a [`VirtualSource`] and serves it over an async stream. The task
//! uses a select! loop to:
//! - Read SCPI lines from the connection stream and answer queries
//! - Apply front-panel actions and hand out snapshots from a channel
//! - Stop on shutdown or when the connection closes

use std::io;

use mw_protocol::{FrequencyMode, ProtocolCodec, ScpiCodec};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{SourceSnapshot, VirtualSource};

/// Buffer size of the in-memory connection
const DUPLEX_BUFFER: usize = 4096;

/// Action performed at the instrument's front panel
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrontPanelAction {
    /// Press RF ON/OFF
    SetOutput(bool),
    /// Select the frequency mode
    SetFrequencyMode(FrequencyMode),
}

/// Commands that can be sent to a virtual source actor
#[derive(Debug)]
pub enum VirtualSourceCommand {
    /// Change state behind the driver's back; `done` fires once applied
    FrontPanel {
        action: FrontPanelAction,
        done: oneshot::Sender<()>,
    },
    /// Request a copy of the current state
    Snapshot(oneshot::Sender<SourceSnapshot>),
    /// Shutdown the virtual source actor
    Shutdown,
}

/// Run the virtual source actor task
///
/// Every complete line read from `stream` is processed by the source; a
/// reply, when the line produced one, is written back newline-terminated.
pub async fn run_virtual_source_task<S>(
    mut stream: S,
    mut source: VirtualSource,
    mut cmd_rx: mpsc::Receiver<VirtualSourceCommand>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut codec = ScpiCodec::new();
    let mut buf = [0u8; 1024];
    let mut panel_open = true;

    info!(
        "Starting virtual source task for {} ({})",
        source.id(),
        source.model().model
    );

    loop {
        tokio::select! {
            result = stream.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        debug!("Virtual source stream closed for {}", source.id());
                        break;
                    }
                    Ok(n) => {
                        codec.push_bytes(&buf[..n]);
                        while let Some((cmd, raw)) = codec.next_command_with_bytes() {
                            let line = String::from_utf8_lossy(&raw);
                            let line = line.trim();
                            if let Some(reply) = source.process_command(&cmd, line) {
                                debug!("Virtual source {} -> {}", source.id(), reply);
                                stream.write_all(reply.as_bytes()).await?;
                                stream.write_all(b"\n").await?;
                                stream.flush().await?;
                            }
                        }
                    }
                    Err(e) => {
                        warn!("Virtual source {} stream error: {}", source.id(), e);
                        return Err(e);
                    }
                }
            }

            cmd = cmd_rx.recv(), if panel_open => {
                match cmd {
                    Some(VirtualSourceCommand::FrontPanel { action, done }) => {
                        info!("Virtual source {} front panel: {:?}", source.id(), action);
                        match action {
                            FrontPanelAction::SetOutput(on) => source.front_panel_output(on),
                            FrontPanelAction::SetFrequencyMode(mode) => {
                                source.front_panel_frequency_mode(mode)
                            }
                        }
                        let _ = done.send(());
                    }
                    Some(VirtualSourceCommand::Snapshot(reply)) => {
                        let _ = reply.send(source.snapshot());
                    }
                    Some(VirtualSourceCommand::Shutdown) => {
                        info!("Shutdown requested for virtual source {}", source.id());
                        break;
                    }
                    None => {
                        // Keep serving the stream without a controlling handle
                        debug!("Command channel closed for virtual source {}", source.id());
                        panel_open = false;
                    }
                }
            }
        }
    }

    info!("Virtual source task ended for {}", source.id());
    Ok(())
}

/// Handle to a spawned virtual source task
#[derive(Debug)]
pub struct VirtualSourceHandle {
    cmd_tx: mpsc::Sender<VirtualSourceCommand>,
    task: JoinHandle<io::Result<()>>,
}

impl VirtualSourceHandle {
    /// Get a copy of the current instrument state
    ///
    /// Returns `None` once the task has ended.
    pub async fn snapshot(&self) -> Option<SourceSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(VirtualSourceCommand::Snapshot(tx))
            .await
            .ok()?;
        rx.await.ok()
    }

    /// Perform a front-panel action and wait until it has been applied
    pub async fn front_panel(&self, action: FrontPanelAction) {
        let (done, applied) = oneshot::channel();
        if self
            .cmd_tx
            .send(VirtualSourceCommand::FrontPanel { action, done })
            .await
            .is_ok()
        {
            let _ = applied.await;
        }
    }

    /// Stop the task and wait for it to finish
    pub async fn shutdown(self) -> io::Result<()> {
        let _ = self.cmd_tx.send(VirtualSourceCommand::Shutdown).await;
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(io::Error::other(e)),
        }
    }
}

/// Spawn a virtual source on an in-memory stream
///
/// Returns the driver's end of the connection and a handle to the task.
/// Must be called from within a tokio runtime.
pub fn spawn_virtual_source(source: VirtualSource) -> (DuplexStream, VirtualSourceHandle) {
    let (client, server) = tokio::io::duplex(DUPLEX_BUFFER);
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let task = tokio::spawn(run_virtual_source_task(server, source, cmd_rx));
    (client, VirtualSourceHandle { cmd_tx, task })
}
