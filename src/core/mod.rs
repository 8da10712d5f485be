//! Core functionality of the telemetry bridge
//!
//! This module provides:
//! - Transport layer for the serial link to the receiver
//! - Connection lifecycle management (watchdog, rediscovery)
//! - Stream demultiplexing and sensor packet decoding
//! - Sequence continuity accounting
//! - Record fan-out to subscribers

pub mod command;
pub mod connection;
pub mod hub;
pub mod pipeline;
pub mod protocol;
pub mod transport;
