//! Leaderboards module.
//!
//! Provides per-challenge rankings and the global points leaderboard.

pub mod rankings;

pub use rankings::{ChallengeStanding, GlobalStanding, LeaderboardError, LeaderboardService};
