//! Sensor packet decoder
//!
//! Parses one demultiplexed DATA payload into a [`SensorFrame`]. The scan is
//! position-based substring search rather than regex: this runs once per
//! frame on the link's read path and must stay cheap.
//!
//! Payload grammar (fields in any order after `SEQ:`, junk ignored):
//!
//! ```text
//! SEQ:<u16>,S<id>:[<w>,<x>,<y>,<z>],S<id>:[...]...
//! ```

use super::record::SensorFrame;
use std::collections::BTreeMap;
use tracing::debug;

/// Number of components in an orientation quaternion
const QUAT_COMPONENTS: usize = 4;

/// Decode one DATA payload.
///
/// Malformed sensor entries (wrong component count, non-numeric, non-finite)
/// are skipped without aborting the rest of the payload. Returns `None` when
/// neither a sequence number nor any sensor entry was found — pure noise,
/// dropped silently per the pipeline's propagation policy.
pub fn decode(payload: &str) -> Option<SensorFrame> {
    let sequence = parse_sequence(payload);
    let sensors = parse_sensors(payload);

    if sequence.is_none() && sensors.is_empty() {
        return None;
    }

    if sequence.is_none() {
        debug!("frame without SEQ token, {} sensor entries", sensors.len());
    }

    Some(SensorFrame {
        sequence: sequence.unwrap_or(0),
        sensors,
    })
}

/// Locate `SEQ:` and parse the integer up to the following comma (or end).
fn parse_sequence(payload: &str) -> Option<u16> {
    let start = payload.find("SEQ:")? + 4;
    let rest = &payload[start..];
    let end = rest.find(',').unwrap_or(rest.len());
    rest[..end].trim().parse::<u16>().ok()
}

/// Scan for `S<digit>` entries and collect the valid ones.
fn parse_sensors(payload: &str) -> BTreeMap<u8, [f64; 4]> {
    let bytes = payload.as_bytes();
    let mut sensors = BTreeMap::new();
    let mut pos = 0;

    while pos < bytes.len() {
        // Next 'S' immediately followed by a digit. "SEQ:" never matches
        // because 'E' is not a digit.
        let Some(off) = bytes[pos..]
            .iter()
            .position(|&b| b == b'S')
            .map(|p| p + pos)
        else {
            break;
        };

        if off + 1 >= bytes.len() || !bytes[off + 1].is_ascii_digit() {
            pos = off + 1;
            continue;
        }

        match parse_entry(payload, off + 1) {
            Some((id, quat, next)) => {
                sensors.insert(id, quat);
                pos = next;
            }
            None => {
                // Malformed entry: skip just this token and keep scanning.
                pos = off + 1;
            }
        }
    }

    sensors
}

/// Parse one `<id>:[c0,c1,c2,c3]` entry starting at the id digit.
///
/// Returns the sensor id, the quaternion and the offset past the closing
/// bracket. `None` if the entry is structurally invalid or does not hold
/// exactly four finite components.
fn parse_entry(payload: &str, id_start: usize) -> Option<(u8, [f64; 4], usize)> {
    let rest = &payload[id_start..];
    let colon = rest.find(':')?;
    let id = rest[..colon].parse::<u8>().ok()?;

    let after_colon = &rest[colon + 1..];
    if !after_colon.starts_with('[') {
        return None;
    }
    let close = after_colon.find(']')?;
    let body = &after_colon[1..close];

    let mut quat = [0f64; QUAT_COMPONENTS];
    let mut count = 0;
    for part in body.split(',') {
        let value = part.trim().parse::<f64>().ok()?;
        if !value.is_finite() {
            return None;
        }
        if count == QUAT_COMPONENTS {
            return None;
        }
        quat[count] = value;
        count += 1;
    }
    if count != QUAT_COMPONENTS {
        debug!("sensor {id} entry has {count} components, skipping");
        return None;
    }

    let next = id_start + colon + 1 + close + 1;
    Some((id, quat, next))
}
