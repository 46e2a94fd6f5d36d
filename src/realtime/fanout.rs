//! Notification fan-out.
//!
//! Composes live messages for every engine event family and dispatches them
//! through the connection registry. Misses (recipient offline, channel
//! closed) are expected and swallowed.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;

use crate::battles::types::{Battle, BattlePerformance};
use crate::challenges::types::Challenge;
use crate::realtime::protocol::{LiveMessage, MessageKind};
use crate::realtime::registry::ConnectionRegistry;
use crate::types::{BattleId, UserId};

/// Composes and dispatches live messages.
#[derive(Clone)]
pub struct Notifier {
    registry: Arc<ConnectionRegistry>,
}

impl Notifier {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this notifier dispatches through.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    fn dispatch(&self, message: LiveMessage) {
        let receiver = message.receiver_id;
        if !self.registry.send(receiver, message) {
            tracing::debug!(receiver, "fan-out miss: recipient not connected");
        }
    }

    /// Invite a chosen opponent to a battle.
    pub fn battle_invitation(&self, battle: &Battle, opponent: UserId) {
        self.dispatch(LiveMessage::from_user(
            MessageKind::BattleInvitation,
            battle.creator_id,
            opponent,
            json!({
                "battle_id": battle.id,
                "from_user_id": battle.creator_id,
                "exercise_type": battle.exercise_type,
                "duration_secs": battle.duration_secs,
            }),
        ));
    }

    /// Announce a quick challenge to one nearby user, with live distance.
    pub fn nearby_challenge(&self, battle: &Battle, recipient: UserId, distance_miles: f64) {
        self.dispatch(LiveMessage::from_user(
            MessageKind::NearbyChallenge,
            battle.creator_id,
            recipient,
            json!({
                "battle_id": battle.id,
                "from_user_id": battle.creator_id,
                "exercise_type": battle.exercise_type,
                "duration_secs": battle.duration_secs,
                "distance_miles": distance_miles,
            }),
        ));
    }

    /// Push a battle status transition to the given recipients.
    pub fn battle_status(&self, battle: &Battle, actor: UserId, recipients: &[UserId]) {
        for &recipient in recipients {
            self.dispatch(LiveMessage::from_user(
                MessageKind::StatusChange,
                actor,
                recipient,
                json!({
                    "battle_id": battle.id,
                    "status": battle.status.as_str(),
                    "actor_id": actor,
                }),
            ));
        }
    }

    /// Send one countdown step to the given recipients.
    ///
    /// Step 0 carries the "GO" marker and the authoritative start time.
    pub fn countdown(
        &self,
        battle_id: BattleId,
        recipients: &[UserId],
        step: u8,
        start_time: Option<DateTime<Utc>>,
    ) {
        for &recipient in recipients {
            let data = match start_time {
                Some(start) => json!({
                    "battle_id": battle_id,
                    "countdown": step,
                    "message": "GO",
                    "start_time": start.to_rfc3339(),
                }),
                None => json!({
                    "battle_id": battle_id,
                    "countdown": step,
                }),
            };
            self.dispatch(LiveMessage::system(MessageKind::Countdown, recipient, data));
        }
    }

    /// Push a live rep count to the given recipients.
    pub fn rep_update(&self, performance: &BattlePerformance, recipients: &[UserId]) {
        for &recipient in recipients {
            self.dispatch(LiveMessage::from_user(
                MessageKind::RepUpdate,
                performance.user_id,
                recipient,
                json!({
                    "battle_id": performance.battle_id,
                    "user_id": performance.user_id,
                    "reps": performance.reps,
                    "submitted_at": performance.submitted_at.to_rfc3339(),
                }),
            ));
        }
    }

    /// Push the completion summary with a per-recipient winner flag.
    pub fn battle_complete(
        &self,
        battle: &Battle,
        performances: &[BattlePerformance],
        recipients: &[UserId],
    ) {
        let rows: Vec<_> = performances
            .iter()
            .map(|p| {
                json!({
                    "user_id": p.user_id,
                    "reps": p.reps,
                    "submitted_at": p.submitted_at.to_rfc3339(),
                })
            })
            .collect();

        for &recipient in recipients {
            self.dispatch(LiveMessage::system(
                MessageKind::BattleComplete,
                recipient,
                json!({
                    "battle_id": battle.id,
                    "winner_id": battle.winner_id,
                    "is_winner": battle.winner_id == Some(recipient),
                    "performances": rows,
                }),
            ));
        }
    }

    /// Push a challenge progress update to the given recipients.
    pub fn challenge_progress(
        &self,
        challenge: &Challenge,
        actor: UserId,
        current_progress: f64,
        completed: bool,
        recipients: &[UserId],
    ) {
        for &recipient in recipients {
            self.dispatch(LiveMessage::from_user(
                MessageKind::ChallengeProgress,
                actor,
                recipient,
                json!({
                    "challenge_id": challenge.id,
                    "user_id": actor,
                    "current_progress": current_progress,
                    "goal_value": challenge.goal_value,
                    "completed": completed,
                }),
            ));
        }
    }
}
