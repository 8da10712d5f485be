//! Serial port link implementation

use super::{LinkTrait, PortInfo, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serialport::{SerialPort, SerialPortType};
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// USB vendor ids of the serial bridges this device class ships with:
/// Silicon Labs CP210x, WCH CH340, Espressif native USB, FTDI.
pub const KNOWN_VENDOR_IDS: &[u16] = &[0x10C4, 0x1A86, 0x303A, 0x0403];

/// Serial link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialLinkConfig {
    /// Port path (e.g. `/dev/ttyUSB0`, `COM3`)
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
}

impl SerialLinkConfig {
    /// Create a configuration for the given port and baud rate
    pub fn new(port: &str, baud_rate: u32) -> Self {
        Self {
            port: port.to_string(),
            baud_rate,
        }
    }
}

impl Default for SerialLinkConfig {
    fn default() -> Self {
        Self::new("/dev/ttyUSB0", 115_200)
    }
}

/// The physical serial link to the receiver.
pub struct SerialLink {
    config: SerialLinkConfig,
    port: Arc<Mutex<Option<Box<dyn SerialPort + Send>>>>,
    identity: Option<PortInfo>,
}

impl SerialLink {
    /// Create an unopened link
    pub fn new(config: SerialLinkConfig) -> Self {
        Self {
            config,
            port: Arc::new(Mutex::new(None)),
            identity: None,
        }
    }
}

#[async_trait]
impl LinkTrait for SerialLink {
    async fn open(&mut self) -> Result<(), TransportError> {
        let port = serialport::new(&self.config.port, self.config.baud_rate)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => {
                    TransportError::PortNotFound(self.config.port.clone())
                }
                serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
                    TransportError::PermissionDenied(self.config.port.clone())
                }
                _ => TransportError::ConnectionFailed(e.to_string()),
            })?;

        // Hold the control lines low. The receiver wires DTR/RTS to its
        // reset/boot pins; toggling them on open would reboot it.
        let mut port = port;
        if let Err(e) = port.write_data_terminal_ready(false) {
            debug!("could not clear DTR on {}: {}", self.config.port, e);
        }
        if let Err(e) = port.write_request_to_send(false) {
            debug!("could not clear RTS on {}: {}", self.config.port, e);
        }

        self.identity = available_ports()
            .into_iter()
            .find(|p| p.path == self.config.port);

        *self.port.lock() = Some(port);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        *self.port.lock() = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.lock().is_some()
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let mut guard = self.port.lock();
        let port = guard.as_mut().ok_or(TransportError::NotConnected)?;

        let written = port.write(data).map_err(TransportError::IoError)?;
        port.flush().map_err(TransportError::IoError)?;
        Ok(written)
    }

    async fn read_chunk(&mut self) -> Result<Bytes, TransportError> {
        let mut guard = self.port.lock();
        let port = guard.as_mut().ok_or(TransportError::NotConnected)?;

        let mut buffer = vec![0u8; 1024];
        match port.read(&mut buffer) {
            Ok(0) => Err(TransportError::Disconnected),
            Ok(n) => {
                buffer.truncate(n);
                Ok(Bytes::from(buffer))
            }
            // A quiet link is not an error
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(Bytes::new()),
            Err(e) => Err(TransportError::IoError(e)),
        }
    }

    fn port_path(&self) -> &str {
        &self.config.port
    }

    fn identity(&self) -> Option<PortInfo> {
        self.identity.clone()
    }
}

/// Enumerate the serial ports currently visible to the OS.
pub fn available_ports() -> Vec<PortInfo> {
    let ports = match serialport::available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            debug!("port enumeration failed: {e}");
            return Vec::new();
        }
    };

    ports
        .into_iter()
        .map(|p| match p.port_type {
            SerialPortType::UsbPort(usb) => PortInfo {
                path: p.port_name,
                vendor_id: Some(usb.vid),
                product_id: Some(usb.pid),
                serial_number: usb.serial_number,
                manufacturer: usb.manufacturer,
            },
            _ => PortInfo {
                path: p.port_name,
                vendor_id: None,
                product_id: None,
                serial_number: None,
                manufacturer: None,
            },
        })
        .collect()
}
