//! RepForge - Real-time Competitive Progress Engine
//!
//! Coordinates the two competition modes of a fitness social platform:
//! long-running goal-based challenges and short, timed head-to-head battles
//! with live rep tracking. Every change fans out best-effort to currently
//! connected users through an in-process connection registry.

pub mod battles;
pub mod challenges;
pub mod config;
pub mod geo;
pub mod leaderboards;
pub mod realtime;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use battles::manager::BattleManager;
pub use challenges::manager::ChallengeManager;
pub use config::EngineConfig;
pub use leaderboards::rankings::LeaderboardService;
pub use realtime::{ConnectionRegistry, LiveMessage, MessageKind, Notifier};
pub use storage::Database;
