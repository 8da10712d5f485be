//! Stream frame demultiplexer
//!
//! Turns the device's unstructured byte stream into discrete records.
//! The wire format is textual and sentinel-delimited:
//!
//! - `LOG:<free text>\n` — one log line
//! - `DATA:SEQ:<u16>,S<id>:[w,x,y,z],...` — one telemetry frame, delimited
//!   by the *next* `DATA:` marker
//! - bare `SEQ:<u16>,...` — firmware variant that omits the `DATA:` prefix,
//!   delimited by the next `SEQ:` (or `DATA:`) marker
//!
//! The demultiplexer is chunk-boundary independent: feeding the same logical
//! stream split at arbitrary byte offsets yields the same record sequence.
//! Incomplete trailing data (including a sentinel split across two reads)
//! stays buffered and is re-attempted on the next call.

use super::record::{LogRecord, Record};

/// Ceiling on the raw accumulation buffer. The device's counter can corrupt
/// or the link can desync into a markerless byte soup; past this point the
/// buffer is truncated rather than allowed to grow without bound.
pub const RAW_BUFFER_CEILING: usize = 8 * 1024;

/// Tail kept after a safety-valve truncation, enough to hold any partial
/// record that may still complete.
pub const RAW_BUFFER_KEEP: usize = 1024;

const DATA_MARKER: &[u8] = b"DATA:";
const LOG_MARKER: &[u8] = b"LOG:";
const SEQ_MARKER: &[u8] = b"SEQ:";

/// Find `needle` in `haystack` starting at `from`.
fn find_from(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

/// Streaming demultiplexer over the device byte protocol.
///
/// Owns the raw accumulation buffer; the buffer is mutated only here and
/// reset on reconnect via [`FrameDemux::reset`].
#[derive(Debug, Default)]
pub struct FrameDemux {
    buffer: Vec<u8>,
}

impl FrameDemux {
    /// Create an empty demultiplexer
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes currently buffered awaiting completion
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop all buffered bytes. Called on reconnect: a new session must not
    /// inherit a partial record from the previous link.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Append `bytes` and extract every complete record.
    ///
    /// Records are returned in stream order. Parsing stops at the first
    /// incomplete record; everything from its start marker onward stays
    /// buffered. Consumed bytes are sliced off once per call.
    pub fn ingest(&mut self, bytes: &[u8]) -> Vec<Record> {
        self.buffer.extend_from_slice(bytes);

        let mut records = Vec::new();
        let mut consumed = 0;

        loop {
            match self.next_record(consumed) {
                Some((record, end)) => {
                    records.push(record);
                    consumed = end;
                }
                None => break,
            }
        }

        if consumed > 0 {
            self.buffer.drain(0..consumed);
        }

        // Safety valve: a markerless (or never-completing) stream must not
        // grow the buffer indefinitely. Lossy, but real records are a few
        // hundred bytes so anything this large is already garbage.
        if self.buffer.len() > RAW_BUFFER_CEILING {
            let start = self.buffer.len() - RAW_BUFFER_KEEP;
            self.buffer.drain(0..start);
        }

        records
    }

    /// Extract the earliest complete record at or after `from`.
    ///
    /// Returns the record and the offset just past its consumed span, or
    /// `None` if the earliest candidate is still incomplete (which blocks
    /// everything behind it, preserving stream order across chunk splits).
    fn next_record(&self, from: usize) -> Option<(Record, usize)> {
        let buf = &self.buffer;

        let data_pos = find_from(buf, DATA_MARKER, from);
        let log_pos = find_from(buf, LOG_MARKER, from);
        // A SEQ: token directly after a DATA: marker is the body of that
        // record, not a bare frame; the earliest-marker rule below already
        // prefers the DATA: marker in that case.
        let seq_pos = find_from(buf, SEQ_MARKER, from);

        let earliest = [data_pos, log_pos, seq_pos].into_iter().flatten().min()?;

        if Some(earliest) == data_pos {
            let body = earliest + DATA_MARKER.len();
            let end = find_from(buf, DATA_MARKER, body)?;
            let payload = String::from_utf8_lossy(&buf[body..end]).into_owned();
            Some((Record::Data(payload), end))
        } else if Some(earliest) == log_pos {
            let body = earliest + LOG_MARKER.len();
            let newline = find_from(buf, b"\n", body);
            let next_log = find_from(buf, LOG_MARKER, body);
            let next_data = find_from(buf, DATA_MARKER, body);
            let end = [newline, next_log, next_data].into_iter().flatten().min()?;

            let line = String::from_utf8_lossy(&buf[body..end]);
            let line = line.trim_end_matches('\r');
            let record = Record::Log(LogRecord::from_line(line));

            // Only the newline delimiter itself is part of this record.
            let consumed = if Some(end) == newline { end + 1 } else { end };
            Some((record, consumed))
        } else {
            // Bare SEQ: frame (firmware variant without the DATA: wrapper).
            // Terminated by the next SEQ: marker, or by a DATA: marker if the
            // stream switches back to the primary grammar.
            let body = earliest + SEQ_MARKER.len();
            let next_seq = find_from(buf, SEQ_MARKER, body);
            let next_data = find_from(buf, DATA_MARKER, body);
            let end = [next_seq, next_data].into_iter().flatten().min()?;
            let payload = String::from_utf8_lossy(&buf[earliest..end]).into_owned();
            Some((Record::Data(payload), end))
        }
    }
}
