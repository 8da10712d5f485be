//! Device connection lifecycle management
//!
//! Owns the single physical link to the receiver: the lifecycle state
//! machine, command dispatch, the activity watchdog and rediscovery of the
//! device after it re-enumerates under a new port path.
//!
//! All lifecycle transitions (connect / disconnect / reconnect) are
//! serialized through one async mutex, so only one transition is ever in
//! flight; a rediscovery-driven reconnect runs to completion before any new
//! `connect` call is accepted.

use crate::core::command::{CommandError, DeviceCommand};
use crate::core::hub::Hub;
use crate::core::pipeline::{PipelineStats, TelemetryPipeline};
use crate::core::protocol::{LogRecord, Payload};
use crate::core::transport::{
    available_ports, LinkTrait, PortInfo, SerialLink, SerialLinkConfig, TransportError,
    KNOWN_VENDOR_IDS,
};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No link
    Disconnected,
    /// Opening the link
    Connecting,
    /// Link open, pipeline running
    Connected,
    /// Tearing the link down
    Disconnecting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnecting => write!(f, "disconnecting"),
        }
    }
}

/// Status notifications emitted by the connection manager
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Lifecycle state changed
    StateChanged(ConnectionState),
    /// A link was established
    Connected {
        /// Bound port path
        port: String,
        /// Baud rate in effect
        baud_rate: u32,
    },
    /// The link was torn down
    Disconnected {
        /// Human-readable reason
        reason: String,
    },
    /// The device re-enumerated and was reconnected on a new port
    Rediscovered {
        /// Port the device was bound to before the reset
        previous_port: String,
        /// Port it came back on
        new_port: String,
    },
    /// The bound port vanished and no matching device was found
    RediscoveryFailed {
        /// Port the device was bound to
        previous_port: String,
    },
}

/// Timing configuration for the connection manager
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Bound on `connect`
    pub connect_timeout: Duration,
    /// Default bound on `send_command`
    pub command_timeout: Duration,
    /// Watchdog check period
    pub watchdog_interval: Duration,
    /// Idle time after which the watchdog pings the device
    pub idle_threshold: Duration,
    /// Period of the port-vanished rediscovery check
    pub rediscovery_interval: Duration,
    /// Wait after a re-enumeration before reopening, so the OS can settle
    /// the new port node
    pub settle_delay: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(5),
            watchdog_interval: Duration::from_secs(30),
            idle_threshold: Duration::from_secs(60),
            rediscovery_interval: Duration::from_secs(2),
            settle_delay: Duration::from_secs(1),
        }
    }
}

/// Builds a link for a port/baud pair. Swapped out in tests.
pub type LinkFactory = dyn Fn(&str, u32) -> Box<dyn LinkTrait> + Send + Sync;

/// Enumerates ports for the rediscovery check. Swapped out in tests.
pub type PortsProvider = dyn Fn() -> Vec<PortInfo> + Send + Sync;

/// Everything the lifecycle transitions mutate, behind one lock.
struct ConnState {
    state: ConnectionState,
    port: Option<String>,
    baud_rate: u32,
    identity: Option<PortInfo>,
    last_activity: Instant,
}

/// The single authoritative connection to the device.
pub struct ConnectionManager {
    state: RwLock<ConnState>,
    link: tokio::sync::Mutex<Option<Box<dyn LinkTrait>>>,
    /// Serializes lifecycle transitions; held across a whole
    /// teardown-settle-reconnect sequence.
    lifecycle: tokio::sync::Mutex<()>,
    pipeline: Mutex<TelemetryPipeline>,
    hub: Arc<Hub>,
    config: ConnectionConfig,
    event_tx: broadcast::Sender<ConnectionEvent>,
    /// Bumped on every teardown; background tasks from an older session
    /// observe the change and exit.
    generation: AtomicU64,
    link_factory: Box<LinkFactory>,
    ports_provider: Box<PortsProvider>,
}

impl ConnectionManager {
    /// Create a manager driving real serial hardware
    pub fn new(hub: Arc<Hub>, config: ConnectionConfig) -> Arc<Self> {
        Self::with_factories(
            hub,
            config,
            Box::new(|port, baud| {
                Box::new(SerialLink::new(SerialLinkConfig::new(port, baud)))
            }),
            Box::new(available_ports),
        )
    }

    /// Create a manager with injected link and port enumeration seams
    pub fn with_factories(
        hub: Arc<Hub>,
        config: ConnectionConfig,
        link_factory: Box<LinkFactory>,
        ports_provider: Box<PortsProvider>,
    ) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(256);
        Arc::new(Self {
            state: RwLock::new(ConnState {
                state: ConnectionState::Disconnected,
                port: None,
                baud_rate: 0,
                identity: None,
                last_activity: Instant::now(),
            }),
            link: tokio::sync::Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
            pipeline: Mutex::new(TelemetryPipeline::new(hub.clone())),
            hub,
            config,
            event_tx,
            generation: AtomicU64::new(0),
            link_factory,
            ports_provider,
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.state.read().state
    }

    /// Port the connection is bound to, when connected
    pub fn bound_port(&self) -> Option<String> {
        self.state.read().port.clone()
    }

    /// Session pipeline counters
    pub fn stats(&self) -> PipelineStats {
        self.pipeline.lock().stats()
    }

    /// The hub records are fanned out through
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Subscribe to status notifications
    pub fn subscribe_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.event_tx.subscribe()
    }

    /// Open the connection to `port` at `baud_rate`.
    ///
    /// Any previous session is fully torn down first (link closed, raw
    /// buffer and counters reset); only then is the new link opened. Bounded
    /// by [`ConnectionConfig::connect_timeout`].
    pub async fn connect(self: &Arc<Self>, port: &str, baud_rate: u32) -> Result<(), TransportError> {
        let _guard = self.lifecycle.lock().await;
        if self.state() != ConnectionState::Disconnected {
            self.teardown_locked("superseded by new connect request").await;
        }
        self.connect_locked(port, baud_rate).await
    }

    /// Close the connection. Idempotent: always ends in `Disconnected`,
    /// close errors are logged rather than surfaced.
    pub async fn disconnect(self: &Arc<Self>) {
        let _guard = self.lifecycle.lock().await;
        if self.state() != ConnectionState::Disconnected {
            self.teardown_locked("disconnect requested").await;
        }
    }

    /// Send a command to the device, bounded by the configured timeout.
    ///
    /// If the connection closes while the command is waiting for the link,
    /// the command fails fast with `NotConnected` instead of hanging.
    pub async fn send_command(&self, command: DeviceCommand) -> Result<(), CommandError> {
        let timeout = self.config.command_timeout;
        let encoded = command.encode();

        let write = async {
            let mut link = self.link.lock().await;
            match link.as_mut() {
                Some(link) => link.write(&encoded).await.map(|_| ()),
                None => Err(TransportError::NotConnected),
            }
        };

        match tokio::time::timeout(timeout, write).await {
            Ok(Ok(())) => {
                self.state.write().last_activity = Instant::now();
                debug!("sent command {command}");
                Ok(())
            }
            Ok(Err(TransportError::NotConnected)) => Err(CommandError::NotConnected { command }),
            Ok(Err(source)) => Err(CommandError::WriteFailed { command, source }),
            Err(_) => Err(CommandError::Timeout {
                command,
                timeout_secs: timeout.as_secs(),
            }),
        }
    }

    /// List the serial ports currently visible to the OS
    pub fn list_available_ports(&self) -> Vec<PortInfo> {
        (self.ports_provider)()
    }

    // --- internals -------------------------------------------------------

    fn set_state(&self, new_state: ConnectionState) {
        self.state.write().state = new_state;
        let _ = self.event_tx.send(ConnectionEvent::StateChanged(new_state));
    }

    /// Establish a new session. Caller holds the lifecycle lock and has
    /// ensured the previous session is gone.
    async fn connect_locked(
        self: &Arc<Self>,
        port: &str,
        baud_rate: u32,
    ) -> Result<(), TransportError> {
        self.set_state(ConnectionState::Connecting);
        info!("connecting to {port} at {baud_rate} baud");

        let mut link = (self.link_factory)(port, baud_rate);
        let opened = tokio::time::timeout(self.config.connect_timeout, link.open()).await;
        let error = match opened {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(_) => Some(TransportError::Timeout(self.config.connect_timeout.as_secs())),
        };
        if let Some(e) = error {
            self.set_state(ConnectionState::Disconnected);
            // Surfaced to the caller and mirrored to observers.
            self.hub.publish(Payload::from_log(&LogRecord::from_line(&format!(
                "[ERROR] connect to {port} failed: {e}"
            ))));
            self.hub.flush_logs();
            return Err(e);
        }

        let identity = link.identity();
        *self.link.lock().await = Some(link);
        // New session, new counting epoch: no stale partial record or
        // counter survives a reconnect.
        self.pipeline.lock().reset();

        {
            let mut state = self.state.write();
            state.port = Some(port.to_string());
            state.baud_rate = baud_rate;
            state.identity = identity;
            state.last_activity = Instant::now();
        }
        self.set_state(ConnectionState::Connected);
        let _ = self.event_tx.send(ConnectionEvent::Connected {
            port: port.to_string(),
            baud_rate,
        });

        let generation = self.generation.load(Ordering::SeqCst);
        self.spawn_read_loop(generation);
        self.spawn_watchdog(generation);
        self.spawn_rediscovery(generation);
        Ok(())
    }

    /// Tear the session down. Caller holds the lifecycle lock. Best-effort:
    /// always ends in `Disconnected`.
    async fn teardown_locked(self: &Arc<Self>, reason: &str) {
        self.set_state(ConnectionState::Disconnecting);
        // Stale background tasks see the bump and exit.
        self.generation.fetch_add(1, Ordering::SeqCst);

        if let Some(mut link) = self.link.lock().await.take() {
            if let Err(e) = link.close().await {
                warn!("error closing link: {e}");
            }
        }

        {
            let mut state = self.state.write();
            state.port = None;
            state.identity = None;
        }
        self.set_state(ConnectionState::Disconnected);
        info!("disconnected: {reason}");
        let _ = self.event_tx.send(ConnectionEvent::Disconnected {
            reason: reason.to_string(),
        });
        // Observers on the record path get the notification too.
        self.hub.publish(Payload::from_log(&LogRecord::from_line(&format!(
            "[WARNING] link disconnected: {reason}"
        ))));
        self.hub.flush_logs();
    }

    /// Teardown entry point for background tasks (acquires the lifecycle
    /// lock itself). `generation` guards against a newer session: a stale
    /// task must never tear down its successor.
    async fn teardown_from_task(self: &Arc<Self>, generation: u64, reason: &str) {
        let _guard = self.lifecycle.lock().await;
        if self.generation.load(Ordering::SeqCst) == generation {
            self.teardown_locked(reason).await;
        }
    }

    fn session_live(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
            && self.state() == ConnectionState::Connected
    }

    /// The per-chunk ingestion loop: bytes off the link into the pipeline.
    fn spawn_read_loop(self: &Arc<Self>, generation: u64) {
        let manager = self.clone();
        tokio::spawn(async move {
            loop {
                if !manager.session_live(generation) {
                    break;
                }

                let chunk = {
                    let mut link = manager.link.lock().await;
                    match link.as_mut() {
                        Some(link) => link.read_chunk().await,
                        None => break,
                    }
                };

                match chunk {
                    Ok(bytes) if !bytes.is_empty() => {
                        manager.state.write().last_activity = Instant::now();
                        manager.pipeline.lock().ingest_chunk(&bytes);
                    }
                    Ok(_) => {
                        // Quiet link; don't spin.
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                    Err(e) if e.is_fatal() => {
                        warn!("fatal link fault: {e}");
                        manager
                            .teardown_from_task(generation, &format!("link fault: {e}"))
                            .await;
                        break;
                    }
                    Err(e) => {
                        // Non-fatal: report and keep the connection open.
                        warn!("link error (non-fatal): {e}");
                        manager.hub.publish(Payload::from_log(&LogRecord::from_line(
                            &format!("[WARNING] link error: {e}"),
                        )));
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        });
    }

    /// Liveness watchdog: ping the device when the link has been silent for
    /// too long; tear down if the ping cannot be sent.
    fn spawn_watchdog(self: &Arc<Self>, generation: u64) {
        let manager = self.clone();
        let interval = self.config.watchdog_interval;
        let idle_threshold = self.config.idle_threshold;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.tick().await; // immediate first tick
            loop {
                tick.tick().await;
                if !manager.session_live(generation) {
                    break;
                }

                let idle = manager.state.read().last_activity.elapsed();
                if idle < idle_threshold {
                    continue;
                }

                debug!("no traffic for {}s, probing device", idle.as_secs());
                if let Err(e) = manager.send_command(DeviceCommand::Ping).await {
                    warn!("liveness probe failed: {e}");
                    manager
                        .teardown_from_task(generation, "no response to liveness probe")
                        .await;
                    break;
                }
            }
        });
    }

    /// Rediscovery: when the bound port path disappears from the enumerated
    /// list (typical after a device-side reset and USB re-enumeration),
    /// locate the same physical device among the current ports and
    /// reconnect to it.
    fn spawn_rediscovery(self: &Arc<Self>, generation: u64) {
        let manager = self.clone();
        let interval = self.config.rediscovery_interval;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.tick().await;
            loop {
                tick.tick().await;
                if !manager.session_live(generation) {
                    break;
                }

                let (bound_port, identity, baud_rate) = {
                    let state = manager.state.read();
                    match &state.port {
                        Some(port) => (port.clone(), state.identity.clone(), state.baud_rate),
                        None => break,
                    }
                };

                let ports = (manager.ports_provider)();
                if ports.iter().any(|p| p.path == bound_port) {
                    continue;
                }

                info!("bound port {bound_port} vanished, searching for the device");
                let candidate = find_candidate(&ports, identity.as_ref());

                // Whole teardown-settle-reconnect runs under the lifecycle
                // lock: not cancellable once started.
                let _guard = manager.lifecycle.lock().await;
                if manager.generation.load(Ordering::SeqCst) != generation {
                    break;
                }

                match candidate {
                    Some(new_port) => {
                        manager
                            .teardown_locked("device re-enumerated, reconnecting")
                            .await;
                        tokio::time::sleep(manager.config.settle_delay).await;
                        match manager.connect_locked(&new_port, baud_rate).await {
                            Ok(()) => {
                                info!("device rediscovered on {new_port}");
                                let _ = manager.event_tx.send(ConnectionEvent::Rediscovered {
                                    previous_port: bound_port,
                                    new_port,
                                });
                            }
                            Err(e) => {
                                warn!("rediscovery reconnect to {new_port} failed: {e}");
                                let _ =
                                    manager.event_tx.send(ConnectionEvent::RediscoveryFailed {
                                        previous_port: bound_port,
                                    });
                            }
                        }
                    }
                    None => {
                        warn!("device not found among {} available ports", ports.len());
                        let _ = manager.event_tx.send(ConnectionEvent::RediscoveryFailed {
                            previous_port: bound_port,
                        });
                        manager
                            .teardown_locked("port disappeared, device not rediscovered")
                            .await;
                    }
                }
                break;
            }
        });
    }
}

/// Pick the port most likely to be the same physical device: exact identity
/// match first, then known USB-UART vendor signatures with the
/// lowest-numbered port winning ties.
fn find_candidate(ports: &[PortInfo], identity: Option<&PortInfo>) -> Option<String> {
    if let Some(identity) = identity {
        if let Some(port) = ports.iter().find(|p| identity.same_device(p)) {
            return Some(port.path.clone());
        }
    }

    let mut known: Vec<&PortInfo> = ports
        .iter()
        .filter(|p| p.vendor_id.is_some_and(|vid| KNOWN_VENDOR_IDS.contains(&vid)))
        .collect();
    known.sort_by(|a, b| a.path.cmp(&b.path));
    known.first().map(|p| p.path.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicBool;

    /// Scripted link: serves queued chunks, records writes, fails on demand.
    struct MockLink {
        path: String,
        open: bool,
        identity: Option<PortInfo>,
        chunks: Arc<Mutex<VecDeque<Bytes>>>,
        writes: Arc<Mutex<Vec<Vec<u8>>>>,
        fail_writes: Arc<AtomicBool>,
    }

    #[async_trait]
    impl LinkTrait for MockLink {
        async fn open(&mut self) -> Result<(), TransportError> {
            self.open = true;
            Ok(())
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            self.open = false;
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open
        }

        async fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(TransportError::SendError("scripted failure".into()));
            }
            self.writes.lock().push(data.to_vec());
            Ok(data.len())
        }

        async fn read_chunk(&mut self) -> Result<Bytes, TransportError> {
            Ok(self.chunks.lock().pop_front().unwrap_or_default())
        }

        fn port_path(&self) -> &str {
            &self.path
        }

        fn identity(&self) -> Option<PortInfo> {
            self.identity.clone()
        }
    }

    struct Rig {
        manager: Arc<ConnectionManager>,
        chunks: Arc<Mutex<VecDeque<Bytes>>>,
        writes: Arc<Mutex<Vec<Vec<u8>>>>,
        fail_writes: Arc<AtomicBool>,
        ports: Arc<Mutex<Vec<PortInfo>>>,
    }

    fn rig(config: ConnectionConfig) -> Rig {
        let chunks: Arc<Mutex<VecDeque<Bytes>>> = Arc::default();
        let writes: Arc<Mutex<Vec<Vec<u8>>>> = Arc::default();
        let fail_writes = Arc::new(AtomicBool::new(false));
        let ports = Arc::new(Mutex::new(vec![usb_port(
            "/dev/ttyUSB0",
            0x10C4,
            Some("S1"),
        )]));

        let (c, w, f, p) = (chunks.clone(), writes.clone(), fail_writes.clone(), ports.clone());
        let manager = ConnectionManager::with_factories(
            Arc::new(Hub::default()),
            config,
            Box::new(move |path, _baud| {
                Box::new(MockLink {
                    path: path.to_string(),
                    open: false,
                    identity: Some(usb_port(path, 0x10C4, Some("S1"))),
                    chunks: c.clone(),
                    writes: w.clone(),
                    fail_writes: f.clone(),
                })
            }),
            Box::new(move || p.lock().clone()),
        );

        Rig {
            manager,
            chunks,
            writes,
            fail_writes,
            ports,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_then_idempotent_disconnect() {
        let rig = rig(ConnectionConfig::default());
        rig.manager.connect("/dev/ttyUSB0", 115_200).await.unwrap();
        assert_eq!(rig.manager.state(), ConnectionState::Connected);
        assert_eq!(rig.manager.bound_port().as_deref(), Some("/dev/ttyUSB0"));

        rig.manager.disconnect().await;
        assert_eq!(rig.manager.state(), ConnectionState::Disconnected);
        assert_eq!(rig.manager.bound_port(), None);

        // Second disconnect is a no-op, not an error.
        rig.manager.disconnect().await;
        assert_eq!(rig.manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_command_requires_connection() {
        let rig = rig(ConnectionConfig::default());
        let err = rig
            .manager
            .send_command(DeviceCommand::StartStreaming)
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::NotConnected { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_reaches_the_wire() {
        let rig = rig(ConnectionConfig::default());
        rig.manager.connect("/dev/ttyUSB0", 115_200).await.unwrap();
        rig.manager
            .send_command(DeviceCommand::StartStreaming)
            .await
            .unwrap();
        assert!(rig.writes.lock().contains(&b"S\n".to_vec()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_starts_fresh_session() {
        let rig = rig(ConnectionConfig::default());
        rig.manager.connect("/dev/ttyUSB0", 115_200).await.unwrap();

        // A stream with a gap, plus a trailing partial record.
        rig.chunks.lock().push_back(Bytes::from_static(
            b"DATA:SEQ:1,S0:[1,0,0,0]DATA:SEQ:5,S0:[1,0,0,0]DATA:SEQ:6",
        ));
        tokio::time::sleep(Duration::from_millis(500)).await;
        let stats = rig.manager.stats();
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.continuity.missed, 3);

        // Connecting again tears the old session down and resets every
        // counter and the partial-record buffer.
        rig.manager.connect("/dev/ttyUSB0", 115_200).await.unwrap();
        let stats = rig.manager.stats();
        assert_eq!(stats.frames, 0);
        assert_eq!(stats.continuity.missed, 0);
        assert_eq!(stats.continuity.last_sequence, None);
        assert_eq!(rig.manager.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_pings_idle_link() {
        let rig = rig(ConnectionConfig::default());
        rig.manager.connect("/dev/ttyUSB0", 115_200).await.unwrap();

        // Quiet link: after the idle threshold the next watchdog tick pings.
        tokio::time::sleep(Duration::from_secs(95)).await;
        assert!(rig.writes.lock().contains(&b"P\n".to_vec()));
        assert_eq!(rig.manager.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_tears_down_unresponsive_link() {
        let rig = rig(ConnectionConfig::default());
        rig.manager.connect("/dev/ttyUSB0", 115_200).await.unwrap();

        rig.fail_writes.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(rig.manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rediscovery_follows_the_device() {
        let rig = rig(ConnectionConfig::default());
        let mut events = rig.manager.subscribe_events();
        rig.manager.connect("/dev/ttyUSB0", 115_200).await.unwrap();

        // Device resets and re-enumerates with the same serial number on a
        // different port path.
        *rig.ports.lock() = vec![usb_port("/dev/ttyUSB1", 0x10C4, Some("S1"))];
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(rig.manager.state(), ConnectionState::Connected);
        assert_eq!(rig.manager.bound_port().as_deref(), Some("/dev/ttyUSB1"));

        let mut rediscovered = false;
        while let Ok(event) = events.try_recv() {
            if let ConnectionEvent::Rediscovered { new_port, .. } = event {
                assert_eq!(new_port, "/dev/ttyUSB1");
                rediscovered = true;
            }
        }
        assert!(rediscovered, "expected a Rediscovered notification");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rediscovery_gives_up_without_a_candidate() {
        let rig = rig(ConnectionConfig::default());
        let mut events = rig.manager.subscribe_events();
        rig.manager.connect("/dev/ttyUSB0", 115_200).await.unwrap();

        // Port vanishes and nothing plausible replaces it.
        *rig.ports.lock() = vec![usb_port("/dev/ttyACM9", 0xBEEF, None)];
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(rig.manager.state(), ConnectionState::Disconnected);
        let mut failed = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, ConnectionEvent::RediscoveryFailed { .. }) {
                failed = true;
            }
        }
        assert!(failed, "expected a RediscoveryFailed notification");
    }

    fn usb_port(path: &str, vid: u16, serial: Option<&str>) -> PortInfo {
        PortInfo {
            path: path.into(),
            vendor_id: Some(vid),
            product_id: Some(0xEA60),
            serial_number: serial.map(String::from),
            manufacturer: None,
        }
    }

    #[test]
    fn test_candidate_prefers_identity_match() {
        let identity = usb_port("/dev/ttyUSB0", 0x10C4, Some("A1"));
        let ports = vec![
            usb_port("/dev/ttyUSB1", 0x10C4, Some("B2")),
            usb_port("/dev/ttyUSB2", 0x10C4, Some("A1")),
        ];
        assert_eq!(
            find_candidate(&ports, Some(&identity)),
            Some("/dev/ttyUSB2".into())
        );
    }

    #[test]
    fn test_candidate_falls_back_to_vendor_signature() {
        let ports = vec![
            usb_port("/dev/ttyUSB3", 0x1A86, None),
            usb_port("/dev/ttyUSB1", 0x10C4, None),
            // Unknown vendor never matches
            usb_port("/dev/ttyUSB0", 0xDEAD, None),
        ];
        assert_eq!(find_candidate(&ports, None), Some("/dev/ttyUSB1".into()));
    }

    #[test]
    fn test_no_candidate_among_unknown_vendors() {
        let ports = vec![usb_port("/dev/ttyACM0", 0xBEEF, None)];
        assert_eq!(find_candidate(&ports, None), None);
    }
}
