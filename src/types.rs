//! Shared identifier and location types.
//!
//! All entity identifiers are SQLite rowids. User id 0 is reserved for
//! system-originated live messages and never assigned to a stored user.

use serde::{Deserialize, Serialize};

/// User identifier.
pub type UserId = i64;

/// Challenge identifier.
pub type ChallengeId = i64;

/// Battle identifier.
pub type BattleId = i64;

/// Sender id used for engine-originated live messages.
pub const SYSTEM_SENDER: UserId = 0;

/// A geographic coordinate pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}
