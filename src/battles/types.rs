//! Core types for head-to-head battles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{BattleId, UserId};

/// Battle lifecycle status.
///
/// Transitions: pending → in_progress | cancelled,
/// in_progress → completed | cancelled. Terminal states never regress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BattleStatus {
    /// Waiting for the opponent to accept
    Pending,
    /// Countdown sent, clock running
    InProgress,
    /// Finished with a recorded result
    Completed,
    /// Declined or cancelled before completion
    Cancelled,
}

impl BattleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BattleStatus::Pending => "pending",
            BattleStatus::InProgress => "in_progress",
            BattleStatus::Completed => "completed",
            BattleStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BattleStatus::Pending),
            "in_progress" => Some(BattleStatus::InProgress),
            "completed" => Some(BattleStatus::Completed),
            "cancelled" => Some(BattleStatus::Cancelled),
            _ => None,
        }
    }

    /// Whether the status admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BattleStatus::Completed | BattleStatus::Cancelled)
    }
}

/// A short, timed, head-to-head competition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Battle {
    pub id: BattleId,
    pub creator_id: UserId,
    pub opponent_id: Option<UserId>,
    pub exercise_type: String,
    pub duration_secs: u32,
    pub is_quick_challenge: bool,
    pub status: BattleStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub winner_id: Option<UserId>,
}

impl Battle {
    /// Both enrolled participants, in creator-first order.
    pub fn participants(&self) -> Vec<UserId> {
        let mut ids = vec![self.creator_id];
        if let Some(opponent) = self.opponent_id {
            ids.push(opponent);
        }
        ids
    }

    /// Whether the user is enrolled in this battle.
    pub fn involves(&self, user_id: UserId) -> bool {
        self.creator_id == user_id || self.opponent_id == Some(user_id)
    }
}

/// Latest rep count for one battle participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattlePerformance {
    pub battle_id: BattleId,
    pub user_id: UserId,
    pub reps: u32,
    pub submitted_at: DateTime<Utc>,
}

/// Events emitted as battles resolve.
#[derive(Debug, Clone)]
pub enum BattleEvent {
    /// A battle reached completed status.
    Completed {
        battle_id: BattleId,
        winner_id: Option<UserId>,
    },
}
