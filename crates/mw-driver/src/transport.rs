//! Session transports
//!
//! Opens the byte stream behind a [`SessionAddress`]: a raw SCPI socket, a
//! serial line, or an in-process virtual source.

use std::time::Duration;

use mw_sim::{spawn_virtual_source, VirtualSource};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_serial::SerialPortBuilderExt;
use tracing::info;

use crate::address::SessionAddress;
use crate::error::{DriverError, Result};

/// Any byte stream a [`CommandChannel`](crate::CommandChannel) can drive
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Open the session for `address`, giving up after `timeout`
pub async fn open(address: &SessionAddress, timeout: Duration) -> Result<Box<dyn Transport>> {
    let connection_error = |reason: String| DriverError::Connection {
        address: address.to_string(),
        reason,
    };

    match address {
        SessionAddress::Socket { host, port } => {
            let stream = tokio::time::timeout(timeout, TcpStream::connect((host.as_str(), *port)))
                .await
                .map_err(|_| connection_error(format!("no answer within {} ms", timeout.as_millis())))?
                .map_err(|e| connection_error(e.to_string()))?;
            stream
                .set_nodelay(true)
                .map_err(|e| connection_error(e.to_string()))?;
            info!("Connected to {}:{}", host, port);
            Ok(Box::new(stream))
        }
        SessionAddress::Serial { port, baud_rate } => {
            let stream = tokio_serial::new(port, *baud_rate)
                .timeout(timeout)
                .open_native_async()
                .map_err(|e| connection_error(e.to_string()))?;
            info!("Opened serial port {} at {} baud", port, baud_rate);
            Ok(Box::new(stream))
        }
        SessionAddress::Simulated { model } => {
            let source = VirtualSource::new(format!("sim-{}", model), model)
                .map_err(|e| connection_error(e.to_string()))?;
            let (stream, _handle) = spawn_virtual_source(source);
            info!("Started virtual {}", model);
            Ok(Box::new(stream))
        }
    }
}
