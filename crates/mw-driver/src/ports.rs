//! Serial port enumeration
//!
//! Lists candidate ports for `ASRL` addresses.

use serialport::{available_ports, SerialPortType};
use tracing::info;

use crate::address::{SessionAddress, DEFAULT_BAUD_RATE};
use crate::error::{DriverError, Result};

/// Information about a serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPortInfo {
    /// Port name (e.g., /dev/ttyUSB0, COM3)
    pub port: String,
    /// USB Vendor ID (if USB)
    pub vid: Option<u16>,
    /// USB Product ID (if USB)
    pub pid: Option<u16>,
    /// USB serial number (if available)
    pub serial_number: Option<String>,
    /// USB manufacturer string
    pub manufacturer: Option<String>,
    /// USB product string
    pub product: Option<String>,
}

impl SerialPortInfo {
    fn from_serialport(name: String, port_type: &SerialPortType) -> Self {
        match port_type {
            SerialPortType::UsbPort(usb) => Self {
                port: name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                serial_number: usb.serial_number.clone(),
                manufacturer: usb.manufacturer.clone(),
                product: usb.product.clone(),
            },
            _ => Self {
                port: name,
                vid: None,
                pid: None,
                serial_number: None,
                manufacturer: None,
                product: None,
            },
        }
    }

    /// Resource string for this port at the default baud rate
    pub fn address(&self) -> SessionAddress {
        SessionAddress::Serial {
            port: self.port.clone(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }

    /// Short human-readable description
    pub fn description(&self) -> String {
        match (&self.manufacturer, &self.product) {
            (Some(m), Some(p)) => format!("{} {}", m, p),
            (None, Some(p)) => p.clone(),
            (Some(m), None) => m.clone(),
            (None, None) => match (self.vid, self.pid) {
                (Some(vid), Some(pid)) => format!("USB {:04X}:{:04X}", vid, pid),
                _ => "Unknown".to_string(),
            },
        }
    }
}

/// Port name fragments never worth offering
const SKIP_PATTERNS: &[&str] = &["Bluetooth", "debug"];

/// Enumerate serial ports, skipping Bluetooth and debug ports
pub fn enumerate_ports() -> Result<Vec<SerialPortInfo>> {
    info!("Enumerating serial ports...");
    let ports = available_ports().map_err(|e| DriverError::Connection {
        address: "ASRL".to_string(),
        reason: format!("port enumeration failed: {}", e),
    })?;

    let result: Vec<_> = ports
        .into_iter()
        .map(|p| SerialPortInfo::from_serialport(p.port_name, &p.port_type))
        .filter(|p| !should_skip(&p.port))
        .collect();

    info!("Found {} serial port(s)", result.len());
    Ok(result)
}

fn should_skip(port: &str) -> bool {
    SKIP_PATTERNS.iter().any(|pattern| port.contains(pattern))
}
