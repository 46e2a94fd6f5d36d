//! Leaderboard rankings service.
//!
//! Ranks participants within a challenge and all users globally by points.

use rusqlite::params;
use std::collections::HashSet;
use std::sync::Arc;

use crate::storage::{Database, StoreError, UserStore};
use crate::types::{ChallengeId, UserId};

/// Points awarded per challenge joined.
const POINTS_PER_CHALLENGE: i64 = 10;

/// Points awarded per completed challenge.
const POINTS_PER_COMPLETION: i64 = 50;

/// One row of a challenge leaderboard.
#[derive(Debug, Clone)]
pub struct ChallengeStanding {
    pub user_id: UserId,
    pub display_name: String,
    pub progress: f64,
    pub completed: bool,
    pub is_friend: bool,
}

/// One row of the global points leaderboard.
#[derive(Debug, Clone)]
pub struct GlobalStanding {
    pub rank: u32,
    pub user_id: UserId,
    pub display_name: String,
    pub points: i64,
}

/// Leaderboard service.
pub struct LeaderboardService {
    db: Arc<Database>,
}

impl LeaderboardService {
    /// Create a new leaderboard service.
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Participants of a challenge ranked by progress.
    ///
    /// Ordering is progress descending with a stable tiebreak on join order
    /// then user id. When a viewer is supplied, rows are flagged with
    /// whether that participant is one of the viewer's friends.
    pub fn challenge_leaderboard(
        &self,
        challenge_id: ChallengeId,
        viewer_id: Option<UserId>,
    ) -> Result<Vec<ChallengeStanding>, LeaderboardError> {
        let conn = self.db.connection();

        let exists = conn
            .prepare("SELECT id FROM challenges WHERE id = ?1")
            .map_err(StoreError::from)?
            .exists(params![challenge_id])
            .map_err(StoreError::from)?;
        if !exists {
            return Err(LeaderboardError::ChallengeNotFound(challenge_id));
        }

        let friends: HashSet<UserId> = match viewer_id {
            Some(viewer) => UserStore::new(&conn)
                .friend_ids(viewer)?
                .into_iter()
                .collect(),
            None => HashSet::new(),
        };

        let mut stmt = conn
            .prepare(
                "SELECT cp.user_id, u.display_name, cp.current_progress, cp.completed
                 FROM challenge_participants cp
                 LEFT JOIN users u ON cp.user_id = u.id
                 WHERE cp.challenge_id = ?1
                 ORDER BY cp.current_progress DESC, cp.joined_at ASC, cp.user_id ASC",
            )
            .map_err(StoreError::from)?;

        let standings = stmt
            .query_map(params![challenge_id], |row| {
                let user_id: UserId = row.get(0)?;
                let display_name: Option<String> = row.get(1)?;
                Ok((
                    user_id,
                    display_name,
                    row.get::<_, f64>(2)?,
                    row.get::<_, bool>(3)?,
                ))
            })
            .map_err(StoreError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)?
            .into_iter()
            .map(|(user_id, display_name, progress, completed)| ChallengeStanding {
                user_id,
                display_name: display_name.unwrap_or_else(|| "Unknown".to_string()),
                progress,
                completed,
                is_friend: friends.contains(&user_id),
            })
            .collect();

        Ok(standings)
    }

    /// Every user ranked by accumulated points.
    ///
    /// Points are 10 per challenge joined, 1 per current-progress unit
    /// (floored), and 50 per completed challenge, summed across all
    /// challenges. Rank is the 1-based position, points descending.
    pub fn global_leaderboard(&self) -> Result<Vec<GlobalStanding>, LeaderboardError> {
        let conn = self.db.connection();

        let mut rows = conn
            .prepare(
                "SELECT u.id, u.display_name,
                        COUNT(cp.id),
                        COALESCE(SUM(cp.current_progress), 0),
                        COALESCE(SUM(cp.completed), 0)
                 FROM users u
                 LEFT JOIN challenge_participants cp ON cp.user_id = u.id
                 GROUP BY u.id, u.display_name",
            )
            .map_err(StoreError::from)?
            .query_map([], |row| {
                let user_id: UserId = row.get(0)?;
                let display_name: String = row.get(1)?;
                let joined: i64 = row.get(2)?;
                let progress: f64 = row.get(3)?;
                let completions: i64 = row.get(4)?;
                Ok((user_id, display_name, joined, progress, completions))
            })
            .map_err(StoreError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)?
            .into_iter()
            .map(|(user_id, display_name, joined, progress, completions)| {
                let points = joined * POINTS_PER_CHALLENGE
                    + progress.floor() as i64
                    + completions * POINTS_PER_COMPLETION;
                (user_id, display_name, points)
            })
            .collect::<Vec<_>>();

        rows.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));

        Ok(rows
            .into_iter()
            .enumerate()
            .map(|(i, (user_id, display_name, points))| GlobalStanding {
                rank: i as u32 + 1,
                user_id,
                display_name,
                points,
            })
            .collect())
    }
}

/// Leaderboard errors.
#[derive(Debug, thiserror::Error)]
pub enum LeaderboardError {
    #[error("Challenge not found: {0}")]
    ChallengeNotFound(ChallengeId),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
