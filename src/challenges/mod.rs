//! Challenge subsystem.
//!
//! Long-running, multi-participant, goal-based competitions with append-only
//! progress entries.

pub mod ledger;
pub mod manager;
pub mod types;

pub use manager::{ChallengeError, ChallengeManager};
pub use types::*;
