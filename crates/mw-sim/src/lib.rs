//! Microwave Source Simulation Library
//!
//! This crate provides a simulated R&S SMB100A / SMBV100A for exercising the
//! driver without hardware. It includes:
//!
//! - **VirtualSource**: Answers the SCPI vocabulary with instrument-like
//!   clamping, quantization and configurable completion latency
//! - **run_virtual_source_task**: Serves a source over any async stream
//!
//! # Example
//!
//! ```rust
//! use mw_sim::VirtualSource;
//!
//! let mut source = VirtualSource::new("bench", "SMB100A").unwrap();
//!
//! source.process_line("FREQ 2870000000");
//! assert_eq!(source.process_line("FREQ?").as_deref(), Some("2870000000"));
//! assert_eq!(*source.received_commands(), ["FREQ 2870000000", "FREQ?"]);
//! ```

pub mod source;
pub mod source_task;

pub use source::{SimError, SourceSnapshot, VirtualSource, VirtualSourceConfig};
pub use source_task::{
    run_virtual_source_task, spawn_virtual_source, FrontPanelAction, VirtualSourceCommand,
    VirtualSourceHandle,
};
