//! Duplicate suppression for detected stops.
//!
//! Two stops are treated as the same event when their start times are at most
//! [`DEDUP_TOLERANCE_MINUTES`] apart. Interval overlap is not checked: a rerun
//! that sees a stop with a shifted start (for example because the window
//! boundary cut it differently) is logged again.

use crate::detect::AutoStop;
use chrono::Duration;

pub const DEDUP_TOLERANCE_MINUTES: i64 = 5;

/// `true` when `candidate` should be appended to the log.
pub fn accept_or_reject(candidate: &AutoStop, existing: &[AutoStop]) -> bool {
    let tolerance = Duration::minutes(DEDUP_TOLERANCE_MINUTES);
    !existing
        .iter()
        .any(|e| (e.start - candidate.start).abs() <= tolerance)
}

/// Filter a batch of candidates against `existing`, treating candidates
/// accepted earlier in the batch as existing for later ones.
pub fn filter_new(candidates: Vec<AutoStop>, existing: &[AutoStop]) -> Vec<AutoStop> {
    let mut seen: Vec<AutoStop> = existing.to_vec();
    let mut accepted = Vec::new();
    for candidate in candidates {
        if accept_or_reject(&candidate, &seen) {
            seen.push(candidate.clone());
            accepted.push(candidate);
        }
    }
    accepted
}
