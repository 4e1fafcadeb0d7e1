//! Driver for R&S SMB100A / SMBV100A microwave sources
//!
//! The device is controlled entirely through SCPI over one session. Every
//! setting is confirmed complete before the next command is written, and
//! the device's selected mode decides which settings are legal.
//!
//! - [`CommandChannel`]: one command at a time, completion polling
//! - [`DeviceStateReader`]: typed read-only queries
//! - [`ModeController`]: off / CW / sweep transitions and settings
//! - [`TriggerController`]: trigger edge, source and manual pulses
//! - [`ModulationController`]: LFO-driven FM reference
//! - [`SourceDriver`]: the connected handle tying them together
//! - [`SourceClient`]: shared access through a single owning task
//!
//! # Example
//!
//! ```rust,no_run
//! use mw_driver::{DriverConfig, SourceDriver, SweepRequest};
//! use mw_protocol::Mode;
//!
//! # async fn run() -> mw_driver::Result<()> {
//! let config = DriverConfig::new("TCPIP0::192.168.1.20::5025::SOCKET");
//! let mut driver = SourceDriver::connect(&config).await?;
//!
//! let readback = driver.set_sweep(SweepRequest::new(2.8e9, 2.95e9, 1e6).with_power(-10.0)).await?;
//! println!("armed {:?}", readback.frequency);
//! driver.turn_on(Mode::Sweep).await?;
//! driver.fire_trigger().await?;
//! driver.off().await?;
//! driver.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod actor;
pub mod address;
pub mod channel;
pub mod config;
pub mod driver;
pub mod error;
pub mod mode;
pub mod modulation;
pub mod ports;
pub mod reader;
pub mod transport;
pub mod trigger;

pub use actor::{run_source_actor, spawn_source_actor, SourceActorCommand, SourceClient};
pub use address::SessionAddress;
pub use channel::{CommandChannel, Poller};
pub use config::{DriverConfig, PollConfig};
pub use driver::SourceDriver;
pub use error::{DriverError, Result};
pub use mode::{ModeController, SweepRequest};
pub use modulation::{ModulationController, ReferenceSettings};
pub use ports::{enumerate_ports, SerialPortInfo};
pub use reader::{
    DeviceStateReader, FrequencyReading, OutputState, Readback, ReferenceReadback, ReferenceState,
};
pub use transport::Transport;
pub use trigger::TriggerController;
