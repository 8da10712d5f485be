//! Ingestion pipeline
//!
//! Per received chunk: demultiplex, decode, account continuity, publish.
//! Runs on the connection's read loop, so each call is O(chunk) — the
//! demultiplexer's bounded buffer guarantees no pass ever scans the whole
//! stream history.

use crate::core::hub::Hub;
use crate::core::protocol::{
    decode, ContinuityCounters, ContinuityTracker, FrameDemux, LogSeverity, Payload, Record,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Counters accumulated over one connection session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStats {
    /// Raw bytes ingested
    pub bytes_received: u64,
    /// Records extracted by the demultiplexer
    pub records: u64,
    /// Telemetry frames that decoded successfully
    pub frames: u64,
    /// Frames seen per sensor id
    pub sensor_counts: BTreeMap<u8, u64>,
    /// Log lines forwarded
    pub log_lines: u64,
    /// DATA records that failed structural decoding
    pub decode_failures: u64,
    /// Continuity counters (missed / out-of-order / last sequence)
    pub continuity: ContinuityCounters,
}

/// The demux → decode → track → publish chain for one connection.
pub struct TelemetryPipeline {
    demux: FrameDemux,
    tracker: ContinuityTracker,
    hub: Arc<Hub>,
    stats: PipelineStats,
}

impl TelemetryPipeline {
    /// Create a pipeline feeding the given hub
    pub fn new(hub: Arc<Hub>) -> Self {
        Self {
            demux: FrameDemux::new(),
            tracker: ContinuityTracker::new(),
            hub,
            stats: PipelineStats::default(),
        }
    }

    /// Ingest one chunk from the link.
    ///
    /// Parsing-layer problems never escape: framing noise is dropped
    /// silently and structural decode failures are logged at debug level.
    /// Returns the number of records processed.
    pub fn ingest_chunk(&mut self, bytes: &[u8]) -> usize {
        self.stats.bytes_received += bytes.len() as u64;

        let records = self.demux.ingest(bytes);
        let count = records.len();
        self.stats.records += count as u64;

        for record in records {
            match record {
                Record::Log(log) => {
                    self.stats.log_lines += 1;
                    // Mirror device chatter into the host log at the
                    // inferred level.
                    match log.severity {
                        LogSeverity::Debug => debug!("device: {}", log.message),
                        LogSeverity::Info => info!("device: {}", log.message),
                        LogSeverity::Warning => warn!("device: {}", log.message),
                        LogSeverity::Error => error!("device: {}", log.message),
                    }
                    self.hub.publish(Payload::from_log(&log));
                }
                Record::Data(payload) => match decode(&payload) {
                    Some(frame) => {
                        self.stats.frames += 1;
                        for id in frame.sensors.keys() {
                            *self.stats.sensor_counts.entry(*id).or_insert(0) += 1;
                        }
                        let obs = self.tracker.observe(frame.sequence);
                        if obs.missed_delta > 0 {
                            debug!(
                                "sequence gap: {} frame(s) missed before #{}",
                                obs.missed_delta, frame.sequence
                            );
                        }
                        if obs.out_of_order {
                            debug!("out-of-order frame #{}", frame.sequence);
                        }
                        self.hub.publish(Payload::from_frame(&frame));
                    }
                    None => {
                        self.stats.decode_failures += 1;
                        debug!("undecodable DATA record ({} bytes)", payload.len());
                    }
                },
            }
        }

        self.stats.continuity = self.tracker.counters();
        count
    }

    /// Snapshot of the session counters
    pub fn stats(&self) -> PipelineStats {
        let mut stats = self.stats.clone();
        stats.continuity = self.tracker.counters();
        stats
    }

    /// Start a fresh session epoch: clears the raw buffer, the continuity
    /// counters and the statistics. Called on every (re)connect.
    pub fn reset(&mut self) {
        self.demux.reset();
        self.tracker.reset();
        self.stats = PipelineStats::default();
    }

    /// Bytes currently buffered awaiting record completion
    pub fn buffered(&self) -> usize {
        self.demux.buffered()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hub::{SinkError, SubscriberSink};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct CollectingSink {
        payloads: Mutex<Vec<Payload>>,
    }

    impl SubscriberSink for CollectingSink {
        fn deliver(&self, payload: &Payload) -> Result<(), SinkError> {
            self.payloads.lock().push(payload.clone());
            Ok(())
        }
    }

    fn pipeline_with_sink() -> (TelemetryPipeline, Arc<Hub>, Arc<CollectingSink>) {
        let hub = Arc::new(Hub::default());
        let sink = Arc::new(CollectingSink::default());
        let sink_ref = sink.clone();
        struct Fwd(Arc<CollectingSink>);
        impl SubscriberSink for Fwd {
            fn deliver(&self, payload: &Payload) -> Result<(), SinkError> {
                self.0.deliver(payload)
            }
        }
        hub.subscribe(Box::new(Fwd(sink_ref)));
        (TelemetryPipeline::new(hub.clone()), hub, sink)
    }

    #[test]
    fn test_end_to_end_frame_flow() {
        let (mut pipeline, _hub, sink) = pipeline_with_sink();

        pipeline.ingest_chunk(b"DATA:SEQ:1,S0:[1,0,0,0]DATA:SEQ:2,S0:[0,1,0,0]DATA:");
        let payloads = sink.payloads.lock();
        assert_eq!(payloads.len(), 2);
        match &payloads[0] {
            Payload::SensorData { sequence, .. } => assert_eq!(*sequence, 1),
            other => panic!("expected sensorData, got {other:?}"),
        }

        let stats = pipeline.stats();
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.records, 2);
        assert_eq!(stats.sensor_counts[&0], 2);
        assert_eq!(stats.continuity.last_sequence, Some(2));
    }

    #[test]
    fn test_logs_take_deferred_path() {
        let (mut pipeline, hub, sink) = pipeline_with_sink();

        pipeline.ingest_chunk(b"LOG:booting\n");
        assert!(sink.payloads.lock().is_empty());

        hub.flush_logs();
        assert_eq!(sink.payloads.lock().len(), 1);
        assert_eq!(pipeline.stats().log_lines, 1);
    }

    #[test]
    fn test_malformed_record_does_not_halt_ingestion() {
        let (mut pipeline, _hub, sink) = pipeline_with_sink();

        // Middle record is pure noise; neighbors must still decode.
        pipeline
            .ingest_chunk(b"DATA:SEQ:1,S0:[1,0,0,0]DATA:****noise****DATA:SEQ:2,S0:[0,1,0,0]DATA:");
        let stats = pipeline.stats();
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.decode_failures, 1);
        assert_eq!(sink.payloads.lock().len(), 2);
    }

    #[test]
    fn test_missed_frames_counted_through_pipeline() {
        let (mut pipeline, _hub, _sink) = pipeline_with_sink();

        pipeline.ingest_chunk(b"DATA:SEQ:1,S0:[1,0,0,0]DATA:SEQ:5,S0:[1,0,0,0]DATA:");
        assert_eq!(pipeline.stats().continuity.missed, 3);
    }

    #[test]
    fn test_reset_clears_everything() {
        let (mut pipeline, _hub, _sink) = pipeline_with_sink();

        pipeline.ingest_chunk(b"DATA:SEQ:1,S0:[1,0,0,0]DATA:partial");
        assert!(pipeline.buffered() > 0);
        assert!(pipeline.stats().bytes_received > 0);

        pipeline.reset();
        assert_eq!(pipeline.buffered(), 0);
        let stats = pipeline.stats();
        assert_eq!(stats.bytes_received, 0);
        assert_eq!(stats.continuity.last_sequence, None);
    }
}
