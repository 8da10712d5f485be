//! Record types produced by the stream demultiplexer and decoder

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Severity of a device log line, inferred from markers embedded by the
/// device firmware (`[DEBUG]`, `[WARNING]`, `[ERROR]`; anything else is info).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    /// Debug-level line (includes heartbeat chatter)
    Debug,
    /// Informational line
    Info,
    /// Warning line
    Warning,
    /// Error line
    Error,
}

impl fmt::Display for LogSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A single human-readable log line forwarded from the device.
///
/// Ephemeral: forwarded to subscribers once, never retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// The log line with the `LOG:` prefix stripped
    pub message: String,
    /// Severity inferred from embedded markers
    pub severity: LogSeverity,
}

impl LogRecord {
    /// Build a log record from a raw line, inferring severity from markers.
    ///
    /// Heartbeat and link-timeout chatter is demoted to debug so default
    /// consumers can filter it, matching the monitor tooling's behavior.
    pub fn from_line(line: &str) -> Self {
        let severity = if line.contains("[ERROR]") {
            LogSeverity::Error
        } else if line.contains("[WARNING]") {
            LogSeverity::Warning
        } else if line.contains("[DEBUG]")
            || line.contains("HEARTBEAT")
            || line.to_lowercase().contains("timed out")
        {
            LogSeverity::Debug
        } else {
            LogSeverity::Info
        };

        Self {
            message: line.to_string(),
            severity,
        }
    }
}

/// One decoded telemetry frame: a device-assigned 16-bit sequence number
/// plus per-sensor orientation quaternions.
///
/// Immutable after creation. `sensors` maps sensor id to exactly four
/// finite components `[w, x, y, z]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorFrame {
    /// 16-bit sequence counter assigned by the device, wraps at 65536
    pub sequence: u16,
    /// Sensor id -> orientation quaternion
    pub sensors: BTreeMap<u8, [f64; 4]>,
}

/// One self-delimited unit extracted from the raw byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// A `LOG:` line
    Log(LogRecord),
    /// A `DATA:` (or bare `SEQ:`) payload, not yet structurally decoded
    Data(String),
}

/// Payload delivered to subscribers, serialized as JSON on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Payload {
    /// A forwarded device log line
    #[serde(rename = "log")]
    Log {
        /// Log message text
        message: String,
        /// Inferred severity
        severity: LogSeverity,
    },
    /// A decoded telemetry frame
    #[serde(rename = "sensorData")]
    SensorData {
        /// Host-side receive timestamp
        timestamp: DateTime<Utc>,
        /// Device sequence number
        sequence: u16,
        /// Sensor id -> quaternion
        sensors: BTreeMap<u8, [f64; 4]>,
    },
}

impl Payload {
    /// Wrap a log record for delivery
    pub fn from_log(record: &LogRecord) -> Self {
        Self::Log {
            message: record.message.clone(),
            severity: record.severity,
        }
    }

    /// Wrap a decoded frame for delivery, stamping it with the current time
    pub fn from_frame(frame: &SensorFrame) -> Self {
        Self::SensorData {
            timestamp: Utc::now(),
            sequence: frame.sequence,
            sensors: frame.sensors.clone(),
        }
    }
}
