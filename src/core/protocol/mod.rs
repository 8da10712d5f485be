//! Device text protocol: framing, decoding and continuity accounting
//!
//! The device emits a one-directional text stream of `LOG:` lines and
//! `DATA:` telemetry frames over the serial link. This module turns raw
//! bytes into typed records:
//!
//! raw bytes -> [`FrameDemux`] -> [`Record`] -> [`decoder::decode`] ->
//! [`SensorFrame`] -> [`ContinuityTracker`]

pub mod continuity;
pub mod decoder;
pub mod demux;
pub mod record;

pub use continuity::{ContinuityCounters, ContinuityTracker, Observation, MAX_PLAUSIBLE_GAP};
pub use decoder::decode;
pub use demux::{FrameDemux, RAW_BUFFER_CEILING, RAW_BUFFER_KEEP};
pub use record::{LogRecord, LogSeverity, Payload, Record, SensorFrame};
