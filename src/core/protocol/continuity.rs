//! Sequence continuity tracking
//!
//! Consumes the decoded 16-bit sequence numbers and accounts for lost and
//! out-of-order frames across counter wraparound. The tracker never reorders
//! anything: it re-synchronizes to the latest observed value and only keeps
//! counters.

use serde::Serialize;

/// Largest forward gap still believed to be genuine packet loss.
///
/// A device reset or counter corruption shows up as a jump of tens of
/// thousands; counting that as loss would wreck the statistics, so anything
/// past this bound is discarded as noise.
pub const MAX_PLAUSIBLE_GAP: u16 = 1000;

/// Loss/reorder counters for one connection session.
///
/// Reset on every transition to Connected: a new session is a new counting
/// epoch.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ContinuityCounters {
    /// Last observed sequence number, `None` until the first frame
    pub last_sequence: Option<u16>,
    /// Total frames inferred lost from forward gaps
    pub missed: u64,
    /// Frames that arrived stale or duplicated
    pub out_of_order: u64,
}

/// Result of observing one sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// Frames newly inferred as missed by this observation
    pub missed_delta: u64,
    /// Whether this frame arrived out of order
    pub out_of_order: bool,
}

/// Tracks sequence continuity under 16-bit wraparound.
#[derive(Debug, Default)]
pub struct ContinuityTracker {
    counters: ContinuityCounters,
}

impl ContinuityTracker {
    /// Create a tracker with an unset epoch
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current counters
    pub fn counters(&self) -> ContinuityCounters {
        self.counters
    }

    /// Start a new counting epoch (new connection session)
    pub fn reset(&mut self) {
        self.counters = ContinuityCounters::default();
    }

    /// Observe one decoded sequence number.
    ///
    /// The first observation only records the epoch start. Afterwards a
    /// forward gap below [`MAX_PLAUSIBLE_GAP`] is counted as missed frames,
    /// a larger jump is dropped as counter noise, and anything behind the
    /// expected value is counted as out-of-order. `last_sequence` always
    /// moves to the observed value.
    pub fn observe(&mut self, sequence: u16) -> Observation {
        let result = match self.counters.last_sequence {
            None => Observation {
                missed_delta: 0,
                out_of_order: false,
            },
            Some(last) => {
                let expected = last.wrapping_add(1);
                let gap = sequence.wrapping_sub(expected);

                if gap == 0 {
                    Observation {
                        missed_delta: 0,
                        out_of_order: false,
                    }
                } else if gap < MAX_PLAUSIBLE_GAP {
                    self.counters.missed += u64::from(gap);
                    Observation {
                        missed_delta: u64::from(gap),
                        out_of_order: false,
                    }
                } else if last.wrapping_sub(sequence) < MAX_PLAUSIBLE_GAP {
                    // Shortly behind the last observed value: a stale or
                    // duplicated frame.
                    self.counters.out_of_order += 1;
                    Observation {
                        missed_delta: 0,
                        out_of_order: true,
                    }
                } else {
                    // Implausibly large jump in either direction: device
                    // reset or counter corruption, not loss.
                    Observation {
                        missed_delta: 0,
                        out_of_order: false,
                    }
                }
            }
        };

        self.counters.last_sequence = Some(sequence);
        result
    }
}
