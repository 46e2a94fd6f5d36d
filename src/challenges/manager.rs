//! Challenge management.
//!
//! Handles challenge creation, participation, progress recording, and
//! completion. Progress is always recomputed from the full entry set via the
//! ledger, and every change fans out to the other participants.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;
use tokio::sync::broadcast;

use super::ledger;
use super::types::{
    Challenge, ChallengeEvent, ChallengeStatus, GoalType, NewChallenge, ParticipantProgress,
    ProgressEntry,
};
use crate::realtime::Notifier;
use crate::storage::database::{parse_timestamp, parse_timestamp_opt};
use crate::storage::{Database, StoreError};
use crate::types::{ChallengeId, UserId};

/// Challenge manager.
pub struct ChallengeManager {
    db: Arc<Database>,
    notifier: Notifier,
    event_tx: broadcast::Sender<ChallengeEvent>,
}

impl ChallengeManager {
    /// Create a new challenge manager.
    pub fn new(db: Arc<Database>, notifier: Notifier) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            db,
            notifier,
            event_tx,
        }
    }

    /// Subscribe to challenge events (goal completions).
    pub fn subscribe(&self) -> broadcast::Receiver<ChallengeEvent> {
        self.event_tx.subscribe()
    }

    /// Create a new challenge; the creator is auto-enrolled.
    pub fn create_challenge(
        &self,
        creator_id: UserId,
        new: NewChallenge,
    ) -> Result<Challenge, ChallengeError> {
        if new.goal_value <= 0.0 {
            return Err(ChallengeError::Validation(
                "goal value must be positive".to_string(),
            ));
        }
        if new.start_date >= new.end_date {
            return Err(ChallengeError::Validation(
                "start date must precede end date".to_string(),
            ));
        }

        let now = Utc::now();
        let conn = self.db.connection();

        conn.execute(
            "INSERT INTO challenges (creator_id, goal_type, goal_value, exercise, start_date, end_date, status, is_public, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                creator_id,
                new.goal_type.as_str(),
                new.goal_value,
                new.exercise,
                new.start_date.to_rfc3339(),
                new.end_date.to_rfc3339(),
                ChallengeStatus::Active.as_str(),
                new.is_public,
                now.to_rfc3339(),
            ],
        )
        .map_err(StoreError::from)?;

        let challenge_id = conn.last_insert_rowid();

        conn.execute(
            "INSERT INTO challenge_participants (challenge_id, user_id, joined_at)
             VALUES (?1, ?2, ?3)",
            params![challenge_id, creator_id, now.to_rfc3339()],
        )
        .map_err(StoreError::from)?;

        tracing::info!(challenge_id, creator_id, "challenge created");

        Ok(Challenge {
            id: challenge_id,
            creator_id,
            goal_type: new.goal_type,
            goal_value: new.goal_value,
            exercise: new.exercise,
            start_date: new.start_date,
            end_date: new.end_date,
            status: ChallengeStatus::Active,
            is_public: new.is_public,
            created_at: now,
        })
    }

    /// Join an active challenge.
    pub fn join_challenge(
        &self,
        user_id: UserId,
        challenge_id: ChallengeId,
    ) -> Result<ParticipantProgress, ChallengeError> {
        let conn = self.db.connection();

        let challenge = Self::get_challenge_with(&conn, challenge_id)?
            .ok_or(ChallengeError::NotFound(challenge_id))?;

        if challenge.status != ChallengeStatus::Active {
            return Err(ChallengeError::ChallengeClosed);
        }

        if Self::get_progress_with(&conn, challenge_id, user_id)?.is_some() {
            return Err(ChallengeError::AlreadyParticipating);
        }

        let now = Utc::now();
        conn.execute(
            "INSERT INTO challenge_participants (challenge_id, user_id, joined_at)
             VALUES (?1, ?2, ?3)",
            params![challenge_id, user_id, now.to_rfc3339()],
        )
        .map_err(StoreError::from)?;

        Ok(ParticipantProgress {
            id: conn.last_insert_rowid(),
            challenge_id,
            user_id,
            joined_at: now,
            current_progress: 0.0,
            completed: false,
            completed_at: None,
        })
    }

    /// Leave a challenge. Historical progress entries are retained.
    pub fn leave_challenge(
        &self,
        user_id: UserId,
        challenge_id: ChallengeId,
    ) -> Result<(), ChallengeError> {
        let conn = self.db.connection();

        let removed = conn
            .execute(
                "DELETE FROM challenge_participants WHERE challenge_id = ?1 AND user_id = ?2",
                params![challenge_id, user_id],
            )
            .map_err(StoreError::from)?;

        if removed == 0 {
            return Err(ChallengeError::NotParticipating);
        }

        Ok(())
    }

    /// Append a progress entry and recompute the participant's standing.
    ///
    /// The new total is the sum over the full entry set; completion flips
    /// false→true at most once and never reverts. Other participants (and the
    /// creator, when someone else recorded) receive a progress fan-out.
    pub fn record_progress(
        &self,
        challenge_id: ChallengeId,
        user_id: UserId,
        value: f64,
        note: Option<String>,
        proof_ref: Option<String>,
    ) -> Result<ParticipantProgress, ChallengeError> {
        if value <= 0.0 {
            return Err(ChallengeError::Validation(
                "progress value must be positive".to_string(),
            ));
        }

        let now = Utc::now();
        let challenge;
        let updated;
        let newly_completed;
        let recipients;
        {
            let conn = self.db.connection();

            challenge = Self::get_challenge_with(&conn, challenge_id)?
                .ok_or(ChallengeError::NotFound(challenge_id))?;

            let current = Self::get_progress_with(&conn, challenge_id, user_id)?
                .ok_or(ChallengeError::NotParticipating)?;

            conn.execute(
                "INSERT INTO progress_entries (challenge_id, user_id, value, note, proof_ref, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![challenge_id, user_id, value, note, proof_ref, now.to_rfc3339()],
            )
            .map_err(StoreError::from)?;

            let entries = Self::entries_with(&conn, challenge_id, user_id)?;
            let total = ledger::total_progress(&entries);

            newly_completed =
                !current.completed && ledger::goal_reached(total, challenge.goal_value);
            let completed = current.completed || newly_completed;
            let completed_at = if newly_completed {
                Some(now)
            } else {
                current.completed_at
            };

            conn.execute(
                "UPDATE challenge_participants
                 SET current_progress = ?3, completed = ?4, completed_at = ?5
                 WHERE challenge_id = ?1 AND user_id = ?2",
                params![
                    challenge_id,
                    user_id,
                    total,
                    completed,
                    completed_at.map(|dt| dt.to_rfc3339()),
                ],
            )
            .map_err(StoreError::from)?;

            updated = ParticipantProgress {
                id: current.id,
                challenge_id,
                user_id,
                joined_at: current.joined_at,
                current_progress: total,
                completed,
                completed_at,
            };

            let mut ids: Vec<UserId> = Self::participants_with(&conn, challenge_id)?
                .into_iter()
                .map(|p| p.user_id)
                .filter(|&id| id != user_id)
                .collect();
            if challenge.creator_id != user_id && !ids.contains(&challenge.creator_id) {
                ids.push(challenge.creator_id);
            }
            recipients = ids;
        }

        self.notifier.challenge_progress(
            &challenge,
            user_id,
            updated.current_progress,
            updated.completed,
            &recipients,
        );

        if newly_completed {
            tracing::info!(challenge_id, user_id, "challenge goal reached");
            let _ = self.event_tx.send(ChallengeEvent::GoalReached {
                challenge_id,
                user_id,
                completed_at: now,
            });
        }

        Ok(updated)
    }

    /// Cancel a challenge (creator only).
    pub fn cancel_challenge(
        &self,
        challenge_id: ChallengeId,
        user_id: UserId,
    ) -> Result<Challenge, ChallengeError> {
        let conn = self.db.connection();

        let mut challenge = Self::get_challenge_with(&conn, challenge_id)?
            .ok_or(ChallengeError::NotFound(challenge_id))?;

        if challenge.creator_id != user_id {
            return Err(ChallengeError::Forbidden);
        }
        if challenge.status != ChallengeStatus::Active {
            return Err(ChallengeError::ChallengeClosed);
        }

        conn.execute(
            "UPDATE challenges SET status = ?2 WHERE id = ?1",
            params![challenge_id, ChallengeStatus::Cancelled.as_str()],
        )
        .map_err(StoreError::from)?;

        challenge.status = ChallengeStatus::Cancelled;
        Ok(challenge)
    }

    /// Close active challenges whose end date has passed.
    ///
    /// Explicit sweep invoked by the host application; there is no background
    /// expiry task. Returns the number of challenges closed.
    pub fn close_expired(&self, now: DateTime<Utc>) -> Result<usize, ChallengeError> {
        let conn = self.db.connection();

        let closed = conn
            .execute(
                "UPDATE challenges SET status = ?1 WHERE status = ?2 AND end_date < ?3",
                params![
                    ChallengeStatus::Completed.as_str(),
                    ChallengeStatus::Active.as_str(),
                    now.to_rfc3339(),
                ],
            )
            .map_err(StoreError::from)?;

        if closed > 0 {
            tracing::info!(closed, "expired challenges closed");
        }

        Ok(closed)
    }

    /// Get a challenge by id.
    pub fn get_challenge(&self, challenge_id: ChallengeId) -> Result<Challenge, ChallengeError> {
        let conn = self.db.connection();
        Self::get_challenge_with(&conn, challenge_id)?.ok_or(ChallengeError::NotFound(challenge_id))
    }

    /// All public challenges still open for joining.
    pub fn list_public_challenges(&self) -> Result<Vec<Challenge>, ChallengeError> {
        let conn = self.db.connection();
        let mut stmt = conn
            .prepare(
                "SELECT id, creator_id, goal_type, goal_value, exercise, start_date, end_date, status, is_public, created_at
                 FROM challenges
                 WHERE is_public = 1 AND status = 'active'
                 ORDER BY created_at DESC",
            )
            .map_err(StoreError::from)?;

        let challenges = stmt
            .query_map([], Self::row_to_challenge)
            .map_err(StoreError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)?;

        Ok(challenges)
    }

    /// All live participant standings for a challenge, in join order.
    pub fn participants(
        &self,
        challenge_id: ChallengeId,
    ) -> Result<Vec<ParticipantProgress>, ChallengeError> {
        let conn = self.db.connection();
        Self::participants_with(&conn, challenge_id).map_err(ChallengeError::from)
    }

    /// A participant's standing within a challenge.
    pub fn progress(
        &self,
        challenge_id: ChallengeId,
        user_id: UserId,
    ) -> Result<ParticipantProgress, ChallengeError> {
        let conn = self.db.connection();
        Self::get_progress_with(&conn, challenge_id, user_id)?
            .ok_or(ChallengeError::NotParticipating)
    }

    /// All progress entries for a participant, oldest first.
    pub fn entries(
        &self,
        challenge_id: ChallengeId,
        user_id: UserId,
    ) -> Result<Vec<ProgressEntry>, ChallengeError> {
        let conn = self.db.connection();
        Self::entries_with(&conn, challenge_id, user_id).map_err(ChallengeError::from)
    }

    // ---- row helpers (called with the connection already locked) ----

    fn get_challenge_with(
        conn: &Connection,
        challenge_id: ChallengeId,
    ) -> Result<Option<Challenge>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT id, creator_id, goal_type, goal_value, exercise, start_date, end_date, status, is_public, created_at
             FROM challenges WHERE id = ?1",
        )?;

        let challenge = stmt
            .query_row(params![challenge_id], Self::row_to_challenge)
            .optional()?;

        Ok(challenge)
    }

    fn get_progress_with(
        conn: &Connection,
        challenge_id: ChallengeId,
        user_id: UserId,
    ) -> Result<Option<ParticipantProgress>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT id, challenge_id, user_id, joined_at, current_progress, completed, completed_at
             FROM challenge_participants WHERE challenge_id = ?1 AND user_id = ?2",
        )?;

        let progress = stmt
            .query_row(params![challenge_id, user_id], Self::row_to_progress)
            .optional()?;

        Ok(progress)
    }

    fn participants_with(
        conn: &Connection,
        challenge_id: ChallengeId,
    ) -> Result<Vec<ParticipantProgress>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT id, challenge_id, user_id, joined_at, current_progress, completed, completed_at
             FROM challenge_participants WHERE challenge_id = ?1
             ORDER BY joined_at, id",
        )?;

        let participants = stmt
            .query_map(params![challenge_id], Self::row_to_progress)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(participants)
    }

    fn entries_with(
        conn: &Connection,
        challenge_id: ChallengeId,
        user_id: UserId,
    ) -> Result<Vec<ProgressEntry>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT id, challenge_id, user_id, value, note, proof_ref, created_at
             FROM progress_entries WHERE challenge_id = ?1 AND user_id = ?2
             ORDER BY created_at, id",
        )?;

        let entries = stmt
            .query_map(params![challenge_id, user_id], |row| {
                let created_str: String = row.get(6)?;
                Ok(ProgressEntry {
                    id: row.get(0)?,
                    challenge_id: row.get(1)?,
                    user_id: row.get(2)?,
                    value: row.get(3)?,
                    note: row.get(4)?,
                    proof_ref: row.get(5)?,
                    created_at: parse_timestamp(&created_str),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    fn row_to_challenge(row: &rusqlite::Row<'_>) -> rusqlite::Result<Challenge> {
        let goal_type_str: String = row.get(2)?;
        let start_str: String = row.get(5)?;
        let end_str: String = row.get(6)?;
        let status_str: String = row.get(7)?;
        let created_str: String = row.get(9)?;

        Ok(Challenge {
            id: row.get(0)?,
            creator_id: row.get(1)?,
            goal_type: GoalType::from_str(&goal_type_str).unwrap_or(GoalType::Reps),
            goal_value: row.get(3)?,
            exercise: row.get(4)?,
            start_date: parse_timestamp(&start_str),
            end_date: parse_timestamp(&end_str),
            status: ChallengeStatus::from_str(&status_str).unwrap_or(ChallengeStatus::Active),
            is_public: row.get(8)?,
            created_at: parse_timestamp(&created_str),
        })
    }

    fn row_to_progress(row: &rusqlite::Row<'_>) -> rusqlite::Result<ParticipantProgress> {
        let joined_str: String = row.get(3)?;
        let completed_str: Option<String> = row.get(6)?;

        Ok(ParticipantProgress {
            id: row.get(0)?,
            challenge_id: row.get(1)?,
            user_id: row.get(2)?,
            joined_at: parse_timestamp(&joined_str),
            current_progress: row.get(4)?,
            completed: row.get(5)?,
            completed_at: parse_timestamp_opt(completed_str),
        })
    }
}

/// Challenge errors.
#[derive(Debug, thiserror::Error)]
pub enum ChallengeError {
    #[error("Invalid challenge input: {0}")]
    Validation(String),

    #[error("Challenge not found: {0}")]
    NotFound(ChallengeId),

    #[error("Challenge is not active")]
    ChallengeClosed,

    #[error("Already participating in this challenge")]
    AlreadyParticipating,

    #[error("Not participating in this challenge")]
    NotParticipating,

    #[error("Only the challenge creator may do that")]
    Forbidden,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
