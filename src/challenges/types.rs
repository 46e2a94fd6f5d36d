//! Core types for goal-based challenges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ChallengeId, UserId};

/// Goal type for challenges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalType {
    /// Accumulate X repetitions
    Reps,
    /// Lift X weight units total
    Weight,
    /// Cover X distance units
    Distance,
    /// Train X duration units
    Duration,
    /// Show up X times
    Frequency,
}

impl GoalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalType::Reps => "reps",
            GoalType::Weight => "weight",
            GoalType::Distance => "distance",
            GoalType::Duration => "duration",
            GoalType::Frequency => "frequency",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "reps" => Some(GoalType::Reps),
            "weight" => Some(GoalType::Weight),
            "distance" => Some(GoalType::Distance),
            "duration" => Some(GoalType::Duration),
            "frequency" => Some(GoalType::Frequency),
            _ => None,
        }
    }
}

/// Challenge lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeStatus {
    Active,
    Completed,
    Cancelled,
}

impl ChallengeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeStatus::Active => "active",
            ChallengeStatus::Completed => "completed",
            ChallengeStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ChallengeStatus::Active),
            "completed" => Some(ChallengeStatus::Completed),
            "cancelled" => Some(ChallengeStatus::Cancelled),
            _ => None,
        }
    }
}

/// Challenge definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub id: ChallengeId,
    pub creator_id: UserId,
    pub goal_type: GoalType,
    pub goal_value: f64,
    pub exercise: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: ChallengeStatus,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

/// A user's accumulated standing within a challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantProgress {
    pub id: i64,
    pub challenge_id: ChallengeId,
    pub user_id: UserId,
    pub joined_at: DateTime<Utc>,
    pub current_progress: f64,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One immutable contribution record toward a challenge goal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub id: i64,
    pub challenge_id: ChallengeId,
    pub user_id: UserId,
    pub value: f64,
    pub note: Option<String>,
    pub proof_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Parameters for creating a challenge.
#[derive(Debug, Clone)]
pub struct NewChallenge {
    pub goal_type: GoalType,
    pub goal_value: f64,
    pub exercise: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_public: bool,
}

/// Events emitted for the external gamification subsystem.
#[derive(Debug, Clone)]
pub enum ChallengeEvent {
    /// A participant reached the challenge goal for the first time.
    GoalReached {
        challenge_id: ChallengeId,
        user_id: UserId,
        completed_at: DateTime<Utc>,
    },
}
