//! # Mocaplink Core Library
//!
//! Serial telemetry bridge for wearable motion-capture sensor nodes. The
//! receiver interleaves binary-ish sensor frames and human-readable log
//! lines on one serial stream; this library demultiplexes that stream,
//! decodes per-sensor quaternion frames, accounts for lost and reordered
//! frames across 16-bit sequence wraparound, and fans typed records out to
//! any number of subscribers.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mocaplink_core::core::connection::{ConnectionConfig, ConnectionManager};
//! use mocaplink_core::core::command::DeviceCommand;
//! use mocaplink_core::core::hub::Hub;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let hub = Arc::new(Hub::default());
//!     let manager = ConnectionManager::new(hub.clone(), ConnectionConfig::default());
//!
//!     manager.connect("/dev/ttyUSB0", 115_200).await?;
//!     manager.send_command(DeviceCommand::StartStreaming).await?;
//!
//!     let mut events = manager.subscribe_events();
//!     while let Ok(event) = events.recv().await {
//!         println!("{event:?}");
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::config::AppConfig;
pub use crate::core::command::{CommandError, DeviceCommand};
pub use crate::core::connection::{
    ConnectionConfig, ConnectionEvent, ConnectionManager, ConnectionState,
};
pub use crate::core::hub::{Hub, HubConfig, SinkError, SubscriberHandle, SubscriberSink};
pub use crate::core::pipeline::{PipelineStats, TelemetryPipeline};
pub use crate::core::protocol::{
    decode, ContinuityCounters, ContinuityTracker, FrameDemux, LogRecord, LogSeverity, Payload,
    Record, SensorFrame,
};
pub use crate::core::transport::{
    available_ports, LinkTrait, PortInfo, SerialLink, SerialLinkConfig, TransportError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
