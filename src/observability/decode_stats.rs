//! Counters for records the normalizer drops instead of failing on.
//!
//! A malformed payload must not abort an otherwise-good stream, but the
//! drops should still be visible: each one is counted here and logged at
//! DEBUG with a truncated sample of the offending payload.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

static SWALLOWED_RECORDS: AtomicU64 = AtomicU64::new(0);
static UNRECOGNIZED_RECORDS: AtomicU64 = AtomicU64::new(0);

const PAYLOAD_SAMPLE_LEN: usize = 120;

/// Count a record whose payload failed to parse as JSON.
pub fn record_swallowed(payload: &str) {
    SWALLOWED_RECORDS.fetch_add(1, Ordering::Relaxed);
    debug!(
        payload = payload_sample(payload),
        "swallowed undecodable stream record"
    );
}

/// Count a well-formed record that matched no known provider shape.
pub fn record_unrecognized(payload: &str) {
    UNRECOGNIZED_RECORDS.fetch_add(1, Ordering::Relaxed);
    debug!(
        payload = payload_sample(payload),
        "ignored unrecognized stream record"
    );
}

#[must_use]
pub fn swallowed_total() -> u64 {
    SWALLOWED_RECORDS.load(Ordering::Relaxed)
}

#[must_use]
pub fn unrecognized_total() -> u64 {
    UNRECOGNIZED_RECORDS.load(Ordering::Relaxed)
}

fn payload_sample(payload: &str) -> &str {
    let mut end = payload.len().min(PAYLOAD_SAMPLE_LEN);
    while end > 0 && !payload.is_char_boundary(end) {
        end -= 1;
    }
    &payload[..end]
}
