//! Host-to-device command set
//!
//! Commands are single letters (plus the `D:<level>` verbosity form),
//! newline-terminated on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Maximum device-side verbosity level accepted by `D:<level>`
pub const MAX_VERBOSITY: u8 = 3;

/// A command understood by the receiver firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceCommand {
    /// `S` — start streaming sensor data
    StartStreaming,
    /// `X` — stop streaming sensor data
    StopStreaming,
    /// `C` — check sensor status
    CheckSensors,
    /// `I` — (re)initialize sensors
    InitSensors,
    /// `P` — liveness ping
    Ping,
    /// `N` — restart the sensor node
    RestartNode,
    /// `R` — restart the receiver
    RestartReceiver,
    /// `Q` — quit the receiver
    QuitReceiver,
    /// `D:<0-3>` — set device-side log verbosity
    SetVerbosity(u8),
}

impl DeviceCommand {
    /// Wire encoding, newline-terminated.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::StartStreaming => b"S\n".to_vec(),
            Self::StopStreaming => b"X\n".to_vec(),
            Self::CheckSensors => b"C\n".to_vec(),
            Self::InitSensors => b"I\n".to_vec(),
            Self::Ping => b"P\n".to_vec(),
            Self::RestartNode => b"N\n".to_vec(),
            Self::RestartReceiver => b"R\n".to_vec(),
            Self::QuitReceiver => b"Q\n".to_vec(),
            Self::SetVerbosity(level) => format!("D:{}\n", level.min(&MAX_VERBOSITY)).into_bytes(),
        }
    }

    /// Parse a command code as typed on a CLI (`S`, `x`, `D:2`, ...).
    pub fn parse(code: &str) -> Option<Self> {
        let code = code.trim();
        if let Some(level) = code
            .strip_prefix("D:")
            .or_else(|| code.strip_prefix("d:"))
        {
            let level = level.parse::<u8>().ok()?;
            if level > MAX_VERBOSITY {
                return None;
            }
            return Some(Self::SetVerbosity(level));
        }

        match code.to_ascii_uppercase().as_str() {
            "S" => Some(Self::StartStreaming),
            "X" => Some(Self::StopStreaming),
            "C" => Some(Self::CheckSensors),
            "I" => Some(Self::InitSensors),
            "P" => Some(Self::Ping),
            "N" => Some(Self::RestartNode),
            "R" => Some(Self::RestartReceiver),
            "Q" => Some(Self::QuitReceiver),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartStreaming => write!(f, "S"),
            Self::StopStreaming => write!(f, "X"),
            Self::CheckSensors => write!(f, "C"),
            Self::InitSensors => write!(f, "I"),
            Self::Ping => write!(f, "P"),
            Self::RestartNode => write!(f, "N"),
            Self::RestartReceiver => write!(f, "R"),
            Self::QuitReceiver => write!(f, "Q"),
            Self::SetVerbosity(level) => write!(f, "D:{level}"),
        }
    }
}

/// Command dispatch failure, surfaced to the caller of `send_command`.
#[derive(Error, Debug)]
pub enum CommandError {
    /// The write or flush did not finish within the timeout
    #[error("Command {command} timed out after {timeout_secs}s")]
    Timeout {
        /// The command that was being sent
        command: DeviceCommand,
        /// The bound that expired
        timeout_secs: u64,
    },

    /// The underlying write failed
    #[error("Command {command} failed: {source}")]
    WriteFailed {
        /// The command that was being sent
        command: DeviceCommand,
        /// Link-level cause
        source: crate::core::transport::TransportError,
    },

    /// No connection to send on
    #[error("Command {command} rejected: not connected")]
    NotConnected {
        /// The command that was being sent
        command: DeviceCommand,
    },
}
