//! Subscriber hub
//!
//! Fans decoded records out to any number of independent subscribers.
//! Delivery is best-effort and isolated per subscriber: one failing or
//! panicking sink never stalls ingestion or the other sinks, and no
//! backpressure is applied upstream toward the device.
//!
//! Sensor frames take the eager path (delivered inside `publish`); log
//! lines are queued and drained on the next flush tick so bursty device
//! logging cannot starve frame delivery.

use crate::core::protocol::Payload;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Log lines buffered between flush ticks; beyond this the oldest are
/// dropped (best-effort delivery, stale logs are worth less than fresh ones)
const LOG_QUEUE_LIMIT: usize = 1024;

/// Delivery failure reported by a sink
#[derive(Error, Debug)]
pub enum SinkError {
    /// The sink could not accept the payload
    #[error("delivery failed: {0}")]
    Delivery(String),
    /// The sink is closed and will never accept anything again
    #[error("sink closed")]
    Closed,
}

/// An opaque record consumer.
///
/// Local sinks can rely on the default liveness implementation; network
/// sinks should answer probes so the hub can reap dead peers.
pub trait SubscriberSink: Send + Sync {
    /// Deliver one serialized record
    fn deliver(&self, payload: &Payload) -> Result<(), SinkError>;

    /// Whether the sink answered the probe sent last cycle.
    /// Local in-process sinks are always alive.
    fn is_alive(&self) -> bool {
        true
    }

    /// Initiate a liveness probe (ping). No-op for local sinks.
    fn ping(&self) {}
}

/// Handle returned by [`Hub::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberHandle(Uuid);

/// Hub timing configuration
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Liveness probe period for network sinks
    pub probe_interval: Duration,
    /// Deferred log delivery tick
    pub log_flush_interval: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(30),
            log_flush_interval: Duration::from_millis(50),
        }
    }
}

struct Entry {
    sink: Box<dyn SubscriberSink>,
    delivery_errors: u64,
}

/// The subscriber set and fan-out machinery.
pub struct Hub {
    subscribers: RwLock<HashMap<Uuid, Entry>>,
    log_queue: Mutex<VecDeque<Payload>>,
    config: HubConfig,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl Hub {
    /// Create a hub with the given timing configuration
    pub fn new(config: HubConfig) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            log_queue: Mutex::new(VecDeque::new()),
            config,
        }
    }

    /// Register a sink. The hub owns it until unsubscribed or reaped.
    pub fn subscribe(&self, sink: Box<dyn SubscriberSink>) -> SubscriberHandle {
        let id = Uuid::new_v4();
        self.subscribers.write().insert(
            id,
            Entry {
                sink,
                delivery_errors: 0,
            },
        );
        debug!("subscriber {id} registered");
        SubscriberHandle(id)
    }

    /// Remove a sink. Unknown handles are ignored.
    pub fn unsubscribe(&self, handle: SubscriberHandle) {
        if self.subscribers.write().remove(&handle.0).is_some() {
            debug!("subscriber {} removed", handle.0);
        }
    }

    /// Number of currently registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Publish one record. Never blocks on a subscriber.
    ///
    /// Sensor frames are fanned out immediately; log lines are deferred to
    /// the next flush tick.
    pub fn publish(&self, payload: Payload) {
        match payload {
            Payload::SensorData { .. } => self.deliver_to_all(&payload),
            Payload::Log { .. } => {
                let mut queue = self.log_queue.lock();
                if queue.len() >= LOG_QUEUE_LIMIT {
                    queue.pop_front();
                }
                queue.push_back(payload);
            }
        }
    }

    /// Drain the deferred log queue to all subscribers.
    pub fn flush_logs(&self) {
        loop {
            let payload = {
                let mut queue = self.log_queue.lock();
                match queue.pop_front() {
                    Some(p) => p,
                    None => return,
                }
            };
            self.deliver_to_all(&payload);
        }
    }

    /// Run one liveness probe cycle: reap sinks that did not answer the
    /// previous probe, then ping the survivors.
    pub fn run_probe_cycle(&self) {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|id, entry| {
            let alive = entry.sink.is_alive();
            if !alive {
                warn!("subscriber {id} failed liveness probe, dropping");
            }
            alive
        });
        for entry in subscribers.values() {
            entry.sink.ping();
        }
    }

    fn deliver_to_all(&self, payload: &Payload) {
        let mut subscribers = self.subscribers.write();
        for (id, entry) in subscribers.iter_mut() {
            let outcome = catch_unwind(AssertUnwindSafe(|| entry.sink.deliver(payload)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    entry.delivery_errors += 1;
                    debug!("delivery to {id} failed: {e}");
                }
                Err(_) => {
                    entry.delivery_errors += 1;
                    warn!("subscriber {id} panicked during delivery");
                }
            }
        }
    }

    /// Spawn the flush and probe timers. Tasks stop when the hub is dropped
    /// by all owners.
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let flush_hub = Arc::downgrade(self);
        let flush_interval = self.config.log_flush_interval;
        let flush_task = tokio::spawn(async move {
            let mut tick = tokio::time::interval(flush_interval);
            loop {
                tick.tick().await;
                match flush_hub.upgrade() {
                    Some(hub) => hub.flush_logs(),
                    None => break,
                }
            }
        });

        let probe_hub = Arc::downgrade(self);
        let probe_interval = self.config.probe_interval;
        let probe_task = tokio::spawn(async move {
            let mut tick = tokio::time::interval(probe_interval);
            // The first tick fires immediately; skip it so freshly attached
            // sinks get a full cycle to answer.
            tick.tick().await;
            loop {
                tick.tick().await;
                match probe_hub.upgrade() {
                    Some(hub) => hub.run_probe_cycle(),
                    None => break,
                }
            }
        });

        vec![flush_task, probe_task]
    }
}
