//! Progress ledger.
//!
//! Aggregate progress is always recomputed from the full entry set, never
//! kept as an incremental counter. Recomputation is idempotent under replay
//! and independent of delivery order.

use crate::challenges::types::ProgressEntry;

/// Sum of all entry values for one participant.
pub fn total_progress(entries: &[ProgressEntry]) -> f64 {
    entries.iter().map(|e| e.value).sum()
}

/// Whether the accumulated total meets the challenge goal.
pub fn goal_reached(total: f64, goal_value: f64) -> bool {
    total >= goal_value
}
