//! Battle management.
//!
//! Handles the battle state machine (pending → in_progress → completed /
//! cancelled), quick challenge broadcast to nearby users, live rep updates,
//! and the countdown clock that drives automatic completion.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::sleep;

use super::scheduler::BattleScheduler;
use super::types::{Battle, BattleEvent, BattlePerformance, BattleStatus};
use crate::geo;
use crate::realtime::Notifier;
use crate::storage::database::{parse_timestamp, parse_timestamp_opt};
use crate::storage::{Database, StoreError, UserStore};
use crate::types::{BattleId, Location, UserId};

/// Battle configuration constants.
pub mod constants {
    /// Countdown steps before "GO" (3, 2, 1)
    pub const COUNTDOWN_STEPS: u8 = 3;

    /// Seconds between countdown steps
    pub const COUNTDOWN_STEP_SECS: u64 = 1;

    /// Broadcast radius for quick challenges (miles)
    pub const NEARBY_RADIUS_MILES: f64 = 5.0;

    /// Store retries before auto-completion falls back
    pub const COMPLETION_RETRY_ATTEMPTS: u32 = 3;

    /// Backoff between auto-completion retries (ms)
    pub const COMPLETION_RETRY_BACKOFF_MS: u64 = 500;
}

/// Battle manager.
pub struct BattleManager {
    db: Arc<Database>,
    notifier: Notifier,
    scheduler: Arc<BattleScheduler>,
    event_tx: broadcast::Sender<BattleEvent>,
    nearby_radius_miles: f64,
}

impl BattleManager {
    /// Create a new battle manager.
    pub fn new(db: Arc<Database>, notifier: Notifier) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            db,
            notifier,
            scheduler: Arc::new(BattleScheduler::new()),
            event_tx,
            nearby_radius_miles: constants::NEARBY_RADIUS_MILES,
        }
    }

    /// Override the quick challenge broadcast radius.
    pub fn with_nearby_radius(mut self, miles: f64) -> Self {
        self.nearby_radius_miles = miles;
        self
    }

    /// Subscribe to battle events (completions).
    pub fn subscribe(&self) -> broadcast::Receiver<BattleEvent> {
        self.event_tx.subscribe()
    }

    /// Whether a clock task is pending for the battle.
    pub fn has_pending_clock(&self, battle_id: BattleId) -> bool {
        self.scheduler.is_scheduled(battle_id)
    }

    /// Create a battle against a chosen opponent (or none yet).
    ///
    /// When an opponent is set, a best-effort invitation is pushed to them.
    pub fn create_battle(
        &self,
        creator_id: UserId,
        exercise_type: &str,
        duration_secs: u32,
        opponent_id: Option<UserId>,
    ) -> Result<Battle, BattleError> {
        if duration_secs == 0 {
            return Err(BattleError::Validation(
                "battle duration must be positive".to_string(),
            ));
        }
        if opponent_id == Some(creator_id) {
            return Err(BattleError::Validation(
                "cannot battle yourself".to_string(),
            ));
        }

        let battle = self.insert_battle(creator_id, exercise_type, duration_secs, opponent_id, false)?;

        if let Some(opponent) = opponent_id {
            self.notifier.battle_invitation(&battle, opponent);
        }

        Ok(battle)
    }

    /// Create a quick challenge and broadcast it to nearby connected users.
    ///
    /// Recipients are connected users (other than the creator) whose last
    /// known location is within the broadcast radius of the creator's; each
    /// message carries the live distance. Without a stored creator location
    /// no broadcast happens.
    pub fn create_quick_challenge(
        &self,
        creator_id: UserId,
        exercise_type: &str,
        duration_secs: u32,
    ) -> Result<Battle, BattleError> {
        if duration_secs == 0 {
            return Err(BattleError::Validation(
                "battle duration must be positive".to_string(),
            ));
        }

        let battle = self.insert_battle(creator_id, exercise_type, duration_secs, None, true)?;

        let nearby = self.nearby_connected_users(creator_id)?;
        if nearby.is_empty() {
            tracing::debug!(battle_id = battle.id, "quick challenge: nobody in range");
        }
        for (user_id, distance) in nearby {
            self.notifier.nearby_challenge(&battle, user_id, distance);
        }

        Ok(battle)
    }

    /// Accept a pending battle and start its clock.
    ///
    /// For an invited battle only the chosen opponent may accept. For a quick
    /// challenge any user except the creator may accept; acceptance binds
    /// them as the opponent, and the pending-state guard makes the first
    /// acceptance win.
    pub fn accept_battle(&self, battle_id: BattleId, user_id: UserId) -> Result<Battle, BattleError> {
        let now = Utc::now();
        let mut battle;
        {
            let conn = self.db.connection();
            battle =
                Self::get_battle_with(&conn, battle_id)?.ok_or(BattleError::NotFound(battle_id))?;

            if battle.status != BattleStatus::Pending {
                return Err(BattleError::InvalidState(battle.status));
            }

            match battle.opponent_id {
                Some(opponent) if opponent == user_id => {}
                None if battle.is_quick_challenge && user_id != battle.creator_id => {}
                _ => return Err(BattleError::Forbidden),
            }

            let updated = conn
                .execute(
                    "UPDATE battles SET opponent_id = ?2, status = ?3, started_at = ?4
                     WHERE id = ?1 AND status = 'pending'",
                    params![
                        battle_id,
                        user_id,
                        BattleStatus::InProgress.as_str(),
                        now.to_rfc3339(),
                    ],
                )
                .map_err(StoreError::from)?;

            if updated == 0 {
                // Lost a concurrent accept/cancel; report the fresh status.
                let fresh = Self::get_battle_with(&conn, battle_id)?
                    .ok_or(BattleError::NotFound(battle_id))?;
                return Err(BattleError::InvalidState(fresh.status));
            }

            battle.opponent_id = Some(user_id);
            battle.status = BattleStatus::InProgress;
            battle.started_at = Some(now);
        }

        tracing::info!(battle_id, user_id, "battle accepted");
        let participants = battle.participants();
        self.notifier.battle_status(&battle, user_id, &participants);

        let handle = tokio::spawn(run_battle_clock(
            self.db.clone(),
            self.notifier.clone(),
            self.scheduler.clone(),
            self.event_tx.clone(),
            battle_id,
            participants,
            battle.duration_secs,
        ));
        self.scheduler.track(battle_id, handle);

        Ok(battle)
    }

    /// Decline a pending battle invitation.
    pub fn decline_battle(&self, battle_id: BattleId, user_id: UserId) -> Result<Battle, BattleError> {
        let mut battle;
        {
            let conn = self.db.connection();
            battle =
                Self::get_battle_with(&conn, battle_id)?.ok_or(BattleError::NotFound(battle_id))?;

            if battle.status != BattleStatus::Pending {
                return Err(BattleError::InvalidState(battle.status));
            }
            if battle.opponent_id != Some(user_id) {
                return Err(BattleError::Forbidden);
            }

            conn.execute(
                "UPDATE battles SET status = ?2 WHERE id = ?1",
                params![battle_id, BattleStatus::Cancelled.as_str()],
            )
            .map_err(StoreError::from)?;

            battle.status = BattleStatus::Cancelled;
        }

        tracing::info!(battle_id, user_id, "battle declined");
        self.notifier
            .battle_status(&battle, user_id, &battle.participants());

        Ok(battle)
    }

    /// Cancel a battle that has not yet finished.
    ///
    /// Either participant may cancel. A pending clock is aborted so the
    /// cancelled battle can never be completed by its timer.
    pub fn cancel_battle(&self, battle_id: BattleId, user_id: UserId) -> Result<Battle, BattleError> {
        let mut battle;
        {
            let conn = self.db.connection();
            battle =
                Self::get_battle_with(&conn, battle_id)?.ok_or(BattleError::NotFound(battle_id))?;

            if !battle.involves(user_id) {
                return Err(BattleError::Forbidden);
            }
            if battle.status.is_terminal() {
                return Err(BattleError::InvalidState(battle.status));
            }

            conn.execute(
                "UPDATE battles SET status = ?2 WHERE id = ?1",
                params![battle_id, BattleStatus::Cancelled.as_str()],
            )
            .map_err(StoreError::from)?;

            battle.status = BattleStatus::Cancelled;
        }

        self.scheduler.cancel(battle_id);
        tracing::info!(battle_id, user_id, "battle cancelled");
        self.notifier
            .battle_status(&battle, user_id, &battle.participants());

        Ok(battle)
    }

    /// Submit a live rep count during a battle.
    ///
    /// The performance row is replaced, never accumulated; only the latest
    /// value per user is authoritative.
    pub fn submit_reps(
        &self,
        battle_id: BattleId,
        user_id: UserId,
        reps: u32,
    ) -> Result<BattlePerformance, BattleError> {
        let now = Utc::now();
        let battle;
        {
            let conn = self.db.connection();
            battle =
                Self::get_battle_with(&conn, battle_id)?.ok_or(BattleError::NotFound(battle_id))?;

            if battle.status != BattleStatus::InProgress {
                return Err(BattleError::InvalidState(battle.status));
            }
            if !battle.involves(user_id) {
                return Err(BattleError::Forbidden);
            }

            conn.execute(
                "INSERT INTO battle_performances (battle_id, user_id, reps, submitted_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(battle_id, user_id)
                 DO UPDATE SET reps = excluded.reps, submitted_at = excluded.submitted_at",
                params![battle_id, user_id, reps, now.to_rfc3339()],
            )
            .map_err(StoreError::from)?;
        }

        let performance = BattlePerformance {
            battle_id,
            user_id,
            reps,
            submitted_at: now,
        };

        self.notifier
            .rep_update(&performance, &battle.participants());

        Ok(performance)
    }

    /// Complete an in-progress battle and determine the winner.
    ///
    /// No-op returning the stored record unless the battle is in progress.
    pub fn complete_battle(&self, battle_id: BattleId) -> Result<Battle, BattleError> {
        finalize_battle(&self.db, &self.notifier, &self.event_tx, battle_id)
    }

    /// Get a battle by id.
    pub fn get_battle(&self, battle_id: BattleId) -> Result<Battle, BattleError> {
        let conn = self.db.connection();
        Self::get_battle_with(&conn, battle_id)?.ok_or(BattleError::NotFound(battle_id))
    }

    /// Latest performance rows for a battle.
    pub fn performances(&self, battle_id: BattleId) -> Result<Vec<BattlePerformance>, BattleError> {
        let conn = self.db.connection();
        performances_with(&conn, battle_id).map_err(BattleError::from)
    }

    fn insert_battle(
        &self,
        creator_id: UserId,
        exercise_type: &str,
        duration_secs: u32,
        opponent_id: Option<UserId>,
        is_quick_challenge: bool,
    ) -> Result<Battle, BattleError> {
        let now = Utc::now();
        let conn = self.db.connection();

        conn.execute(
            "INSERT INTO battles (creator_id, opponent_id, exercise_type, duration_secs, is_quick_challenge, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                creator_id,
                opponent_id,
                exercise_type,
                duration_secs,
                is_quick_challenge,
                BattleStatus::Pending.as_str(),
                now.to_rfc3339(),
            ],
        )
        .map_err(StoreError::from)?;

        let battle_id = conn.last_insert_rowid();
        tracing::info!(battle_id, creator_id, is_quick_challenge, "battle created");

        Ok(Battle {
            id: battle_id,
            creator_id,
            opponent_id,
            exercise_type: exercise_type.to_string(),
            duration_secs,
            is_quick_challenge,
            status: BattleStatus::Pending,
            created_at: now,
            started_at: None,
            completed_at: None,
            winner_id: None,
        })
    }

    /// Connected users within the broadcast radius of the creator, with
    /// their live distance in miles.
    fn nearby_connected_users(
        &self,
        creator_id: UserId,
    ) -> Result<Vec<(UserId, f64)>, BattleError> {
        let connected = self.notifier.registry().connected_ids();

        let conn = self.db.connection();
        let users = UserStore::new(&conn);

        let origin: Location = match users.get_user(creator_id)?.and_then(|u| u.last_location) {
            Some(location) => location,
            None => return Ok(Vec::new()),
        };

        let mut nearby = Vec::new();
        for user_id in connected {
            if user_id == creator_id {
                continue;
            }
            let location = match users.get_user(user_id)?.and_then(|u| u.last_location) {
                Some(location) => location,
                None => continue,
            };
            let distance = geo::distance_between(origin, location);
            if distance <= self.nearby_radius_miles {
                nearby.push((user_id, distance));
            }
        }

        Ok(nearby)
    }

    fn get_battle_with(
        conn: &Connection,
        battle_id: BattleId,
    ) -> Result<Option<Battle>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT id, creator_id, opponent_id, exercise_type, duration_secs, is_quick_challenge,
                    status, created_at, started_at, completed_at, winner_id
             FROM battles WHERE id = ?1",
        )?;

        let battle = stmt
            .query_row(params![battle_id], row_to_battle)
            .optional()?;

        Ok(battle)
    }
}

fn row_to_battle(row: &rusqlite::Row<'_>) -> rusqlite::Result<Battle> {
    let status_str: String = row.get(6)?;
    let created_str: String = row.get(7)?;
    let started_str: Option<String> = row.get(8)?;
    let completed_str: Option<String> = row.get(9)?;

    Ok(Battle {
        id: row.get(0)?,
        creator_id: row.get(1)?,
        opponent_id: row.get(2)?,
        exercise_type: row.get(3)?,
        duration_secs: row.get(4)?,
        is_quick_challenge: row.get(5)?,
        status: BattleStatus::from_str(&status_str).unwrap_or(BattleStatus::Pending),
        created_at: parse_timestamp(&created_str),
        started_at: parse_timestamp_opt(started_str),
        completed_at: parse_timestamp_opt(completed_str),
        winner_id: row.get(10)?,
    })
}

fn performances_with(
    conn: &Connection,
    battle_id: BattleId,
) -> Result<Vec<BattlePerformance>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT battle_id, user_id, reps, submitted_at
         FROM battle_performances WHERE battle_id = ?1",
    )?;

    let performances = stmt
        .query_map(params![battle_id], |row| {
            let submitted_str: String = row.get(3)?;
            Ok(BattlePerformance {
                battle_id: row.get(0)?,
                user_id: row.get(1)?,
                reps: row.get(2)?,
                submitted_at: parse_timestamp(&submitted_str),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(performances)
}

/// Pick the winner from a performance set.
///
/// Deterministic tiebreak: reps descending, then earliest final submission,
/// then lowest user id. An empty set has no winner.
pub fn determine_winner(performances: &[BattlePerformance]) -> Option<UserId> {
    let mut ranked: Vec<&BattlePerformance> = performances.iter().collect();
    ranked.sort_by(|a, b| {
        b.reps
            .cmp(&a.reps)
            .then(a.submitted_at.cmp(&b.submitted_at))
            .then(a.user_id.cmp(&b.user_id))
    });
    ranked.first().map(|p| p.user_id)
}

/// Complete a battle if it is still in progress.
///
/// Idempotent: the status-guarded update means only one caller performs the
/// transition, sends fan-out, and emits the completion event; every other
/// caller gets the already-settled record back.
fn finalize_battle(
    db: &Database,
    notifier: &Notifier,
    event_tx: &broadcast::Sender<BattleEvent>,
    battle_id: BattleId,
) -> Result<Battle, BattleError> {
    let now = Utc::now();
    let mut battle;
    let performances;
    {
        let conn = db.connection();
        battle =
            BattleManager::get_battle_with(&conn, battle_id)?.ok_or(BattleError::NotFound(battle_id))?;

        if battle.status != BattleStatus::InProgress {
            return Ok(battle);
        }

        performances = performances_with(&conn, battle_id)?;
        let winner_id = determine_winner(&performances);

        let updated = conn
            .execute(
                "UPDATE battles SET status = ?2, completed_at = ?3, winner_id = ?4
                 WHERE id = ?1 AND status = 'in_progress'",
                params![
                    battle_id,
                    BattleStatus::Completed.as_str(),
                    now.to_rfc3339(),
                    winner_id,
                ],
            )
            .map_err(StoreError::from)?;

        if updated == 0 {
            // Another caller settled the battle first.
            return BattleManager::get_battle_with(&conn, battle_id)?
                .ok_or(BattleError::NotFound(battle_id));
        }

        battle.status = BattleStatus::Completed;
        battle.completed_at = Some(now);
        battle.winner_id = winner_id;
    }

    tracing::info!(battle_id, winner_id = ?battle.winner_id, "battle completed");
    notifier.battle_complete(&battle, &performances, &battle.participants());
    let _ = event_tx.send(BattleEvent::Completed {
        battle_id,
        winner_id: battle.winner_id,
    });

    Ok(battle)
}

/// Mark a battle completed without a winner after repeated store failures.
fn finalize_battle_fallback(db: &Database, battle_id: BattleId) -> Result<(), StoreError> {
    let conn = db.connection();
    conn.execute(
        "UPDATE battles SET status = ?2, completed_at = ?3, winner_id = NULL
         WHERE id = ?1 AND status = 'in_progress'",
        params![
            battle_id,
            BattleStatus::Completed.as_str(),
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// The clock for one accepted battle.
///
/// Sends countdown 3 immediately, then 2 and 1 at one-second steps, then 0
/// with "GO" and the authoritative start time, sleeps out the battle
/// duration, and invokes completion exactly once. The four countdown
/// messages are strictly ordered and precede completion by construction.
async fn run_battle_clock(
    db: Arc<Database>,
    notifier: Notifier,
    scheduler: Arc<BattleScheduler>,
    event_tx: broadcast::Sender<BattleEvent>,
    battle_id: BattleId,
    participants: Vec<UserId>,
    duration_secs: u32,
) {
    for step in (1..=constants::COUNTDOWN_STEPS).rev() {
        notifier.countdown(battle_id, &participants, step, None);
        sleep(Duration::from_secs(constants::COUNTDOWN_STEP_SECS)).await;
    }
    notifier.countdown(battle_id, &participants, 0, Some(Utc::now()));

    sleep(Duration::from_secs(duration_secs as u64)).await;

    let mut attempts = 0;
    loop {
        match finalize_battle(&db, &notifier, &event_tx, battle_id) {
            Ok(_) => break,
            Err(BattleError::Store(e)) if attempts < constants::COMPLETION_RETRY_ATTEMPTS => {
                attempts += 1;
                tracing::warn!(battle_id, attempts, "auto-completion store failure: {e}");
                sleep(Duration::from_millis(constants::COMPLETION_RETRY_BACKOFF_MS)).await;
            }
            Err(e) => {
                // Do not leave the battle stuck in progress.
                tracing::error!(battle_id, "auto-completion failed: {e}");
                if let Err(e) = finalize_battle_fallback(&db, battle_id) {
                    tracing::error!(battle_id, "completion fallback failed: {e}");
                }
                break;
            }
        }
    }

    scheduler.finish(battle_id);
}

/// Battle errors.
#[derive(Debug, thiserror::Error)]
pub enum BattleError {
    #[error("Invalid battle input: {0}")]
    Validation(String),

    #[error("Battle not found: {0}")]
    NotFound(BattleId),

    #[error("Not a participant in this battle")]
    Forbidden,

    #[error("Battle state does not allow that: {}", .0.as_str())]
    InvalidState(BattleStatus),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
