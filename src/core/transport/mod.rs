//! Serial link transport
//!
//! One physical connection to the receiver over a serial port. The link
//! trait exists as the seam between the connection manager and the real
//! hardware so lifecycle logic can be tested against a scripted link.

mod serial;

pub use serial::{available_ports, SerialLink, SerialLinkConfig, KNOWN_VENDOR_IDS};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Link-level error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Opening the port failed for an unspecific reason
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Opening the port did not finish within the bound
    #[error("Connection timeout after {0} seconds")]
    Timeout(u64),

    /// The port path does not exist
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// No permission to open the port
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Another process holds the port
    #[error("Port already in use: {0}")]
    PortInUse(String),

    /// I/O error on an open link
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Operation attempted without an open link
    #[error("Not connected")]
    NotConnected,

    /// The device side went away
    #[error("Disconnected")]
    Disconnected,

    /// Write-side failure
    #[error("Send error: {0}")]
    SendError(String),
}

impl TransportError {
    /// Whether this fault forces a connection teardown.
    ///
    /// Access, configuration and existence failures mean the link is gone;
    /// everything else is reported but leaves the connection open.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::PermissionDenied(_)
            | Self::PortNotFound(_)
            | Self::PortInUse(_)
            | Self::Disconnected
            | Self::NotConnected => true,
            Self::IoError(e) => matches!(
                e.kind(),
                std::io::ErrorKind::PermissionDenied
                    | std::io::ErrorKind::NotFound
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::ConnectionReset
            ),
            Self::ConnectionFailed(_) | Self::Timeout(_) | Self::SendError(_) => false,
        }
    }
}

/// Identity of an enumerated serial port, as reported by the OS.
///
/// The USB descriptor fields are what rediscovery matches against after the
/// device re-enumerates under a new path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    /// OS port path (e.g. `/dev/ttyUSB0`, `COM3`)
    pub path: String,
    /// USB vendor id, when the port is a USB bridge
    pub vendor_id: Option<u16>,
    /// USB product id
    pub product_id: Option<u16>,
    /// USB serial number string
    pub serial_number: Option<String>,
    /// USB manufacturer string
    pub manufacturer: Option<String>,
}

impl PortInfo {
    /// Whether `other` is plausibly the same physical device: exact serial
    /// number match when both sides have one, otherwise VID/PID match.
    pub fn same_device(&self, other: &PortInfo) -> bool {
        match (&self.serial_number, &other.serial_number) {
            (Some(a), Some(b)) => a == b,
            _ => {
                self.vendor_id.is_some()
                    && self.vendor_id == other.vendor_id
                    && self.product_id == other.product_id
            }
        }
    }
}

/// The single physical link to the device.
///
/// Implemented by [`SerialLink`] in production and by scripted mocks in
/// connection-manager tests.
#[async_trait]
pub trait LinkTrait: Send + Sync {
    /// Open the link exclusively
    async fn open(&mut self) -> Result<(), TransportError>;

    /// Close the link (best effort)
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Whether the link is currently open
    fn is_open(&self) -> bool;

    /// Write and flush `data`
    async fn write(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Read whatever bytes are available; empty on a quiet link
    async fn read_chunk(&mut self) -> Result<Bytes, TransportError>;

    /// The port path this link is bound to
    fn port_path(&self) -> &str;

    /// Identity of the connected device, when known
    fn identity(&self) -> Option<PortInfo>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(TransportError::PermissionDenied("/dev/ttyUSB0".into()).is_fatal());
        assert!(TransportError::PortNotFound("/dev/ttyUSB0".into()).is_fatal());
        assert!(TransportError::Disconnected.is_fatal());
        assert!(
            TransportError::IoError(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
                .is_fatal()
        );

        assert!(!TransportError::Timeout(10).is_fatal());
        assert!(!TransportError::SendError("buffer full".into()).is_fatal());
        assert!(
            !TransportError::IoError(std::io::Error::from(std::io::ErrorKind::TimedOut))
                .is_fatal()
        );
    }

    #[test]
    fn test_same_device_prefers_serial_number() {
        let a = PortInfo {
            path: "/dev/ttyUSB0".into(),
            vendor_id: Some(0x10C4),
            product_id: Some(0xEA60),
            serial_number: Some("A1B2".into()),
            manufacturer: None,
        };
        let mut b = a.clone();
        b.path = "/dev/ttyUSB3".into();
        assert!(a.same_device(&b));

        b.serial_number = Some("OTHER".into());
        assert!(!a.same_device(&b), "serial mismatch trumps VID/PID");

        b.serial_number = None;
        assert!(a.same_device(&b), "falls back to VID/PID");
    }
}
