//! Command channel
//!
//! The only path to the device. One command is written at a time, and a
//! query's response is read before anything else is sent; `&mut self` on
//! every operation keeps a second caller out. Settings are confirmed with
//! `*WAI` followed by `*OPC?` polls, bounded by [`PollConfig`] and abortable
//! through the channel's [`CancellationToken`].

use std::io;
use std::time::Duration;

use mw_protocol::response::parse_bool;
use mw_protocol::{EncodeCommand, ParseError, ScpiCommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufStream};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::PollConfig;
use crate::error::{DriverError, Result};
use crate::transport::Transport;

/// Serialized command/response access to one device session
pub struct CommandChannel {
    io: BufStream<Box<dyn Transport>>,
    name: String,
    timeout: Duration,
    poll: PollConfig,
    cancel: CancellationToken,
    line: String,
}

impl CommandChannel {
    /// Wrap an open session
    ///
    /// `timeout` bounds every individual write and read.
    pub fn new<T>(io: T, name: impl Into<String>, timeout: Duration, poll: PollConfig) -> Self
    where
        T: Transport + 'static,
    {
        Self {
            io: BufStream::new(Box::new(io) as Box<dyn Transport>),
            name: name.into(),
            timeout,
            poll,
            cancel: CancellationToken::new(),
            line: String::with_capacity(64),
        }
    }

    /// Session name used in log messages
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn poll_config(&self) -> PollConfig {
        self.poll
    }

    /// Token that aborts the polls of the running operation
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Token for the next operation, replacing one that has already fired
    pub fn arm_cancel(&mut self) -> CancellationToken {
        if self.cancel.is_cancelled() {
            debug!("{}: cancel token re-armed", self.name);
            self.cancel = CancellationToken::new();
        }
        self.cancel.clone()
    }

    /// Write one command
    pub async fn send(&mut self, cmd: &ScpiCommand) -> Result<()> {
        let line = cmd.to_line();
        debug!("{} -> {}", self.name, line);
        let data = cmd.encode();
        let timeout = self.timeout;
        let io = &mut self.io;
        let write = async move {
            io.write_all(&data).await?;
            io.flush().await
        };
        with_timeout(timeout, write)
            .await
            .map_err(|e| DriverError::transport(line, e))
    }

    /// Write a query and read its one-line response (terminator stripped)
    pub async fn query(&mut self, cmd: &ScpiCommand) -> Result<String> {
        self.send(cmd).await?;

        self.line.clear();
        let read = with_timeout(self.timeout, self.io.read_line(&mut self.line)).await;
        match read {
            Ok(0) => Err(DriverError::transport(
                cmd.to_line(),
                io::Error::new(io::ErrorKind::UnexpectedEof, "session closed by device"),
            )),
            Ok(_) => {
                let response = self.line.trim_end_matches(['\r', '\n']).to_string();
                debug!("{} <- {}", self.name, response);
                Ok(response)
            }
            Err(e) => Err(DriverError::transport(cmd.to_line(), e)),
        }
    }

    /// Query and parse the response, reporting parse failures as protocol errors
    pub async fn query_parsed<T>(
        &mut self,
        cmd: &ScpiCommand,
        parse: impl FnOnce(&str) -> std::result::Result<T, ParseError>,
    ) -> Result<T> {
        let response = self.query(cmd).await?;
        parse(&response).map_err(|e| DriverError::protocol(cmd.to_line(), &response, e))
    }

    /// Write a setting and wait until the device reports it complete
    pub async fn command_wait(&mut self, cmd: &ScpiCommand) -> Result<()> {
        self.send(cmd).await?;
        self.await_completion(&cmd.to_line()).await
    }

    /// Send `*WAI` and poll `*OPC?` until it reports done
    ///
    /// `command` names the setting being confirmed in errors.
    pub async fn await_completion(&mut self, command: &str) -> Result<()> {
        self.send(&ScpiCommand::Wait).await?;
        let mut poller = self.poller(command);
        loop {
            let response = self.query(&ScpiCommand::OperationComplete).await?;
            let done = parse_bool(&response).map_err(|e| {
                DriverError::protocol(ScpiCommand::OperationComplete.to_line(), &response, e)
            })?;
            if done {
                return Ok(());
            }
            poller.wait(response).await?;
        }
    }

    /// Start a bounded poll loop on behalf of `command`
    pub fn poller(&self, command: impl Into<String>) -> Poller {
        Poller {
            command: command.into(),
            interval: self.poll.interval(),
            max_attempts: self.poll.max_attempts,
            attempts: 0,
            cancel: self.cancel.clone(),
        }
    }

    /// Close the session
    pub async fn shutdown(&mut self) -> Result<()> {
        with_timeout(self.timeout, self.io.shutdown())
            .await
            .map_err(|e| DriverError::transport("<shutdown>", e))
    }
}

impl std::fmt::Debug for CommandChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandChannel")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("poll", &self.poll)
            .finish_non_exhaustive()
    }
}

/// Attempt counter for one poll loop
#[derive(Debug)]
pub struct Poller {
    command: String,
    interval: Duration,
    max_attempts: u32,
    attempts: u32,
    cancel: CancellationToken,
}

impl Poller {
    /// Record an unsatisfied poll and sleep until the next one
    ///
    /// Fails with [`DriverError::Timeout`] once the attempts are used up, or
    /// [`DriverError::Cancelled`] as soon as the token fires.
    pub async fn wait(&mut self, last_response: String) -> Result<()> {
        self.attempts += 1;
        if self.attempts >= self.max_attempts {
            return Err(DriverError::Timeout {
                command: self.command.clone(),
                attempts: self.attempts,
                last_response: Some(last_response),
            });
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(DriverError::Cancelled {
                command: self.command.clone(),
            }),
            _ = tokio::time::sleep(self.interval) => Ok(()),
        }
    }

    /// Polls recorded so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

async fn with_timeout<T>(
    timeout: Duration,
    fut: impl std::future::Future<Output = io::Result<T>>,
) -> io::Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("no response within {} ms", timeout.as_millis()),
        )),
    }
}
