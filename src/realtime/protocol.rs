//! Live message definitions.
//!
//! Defines the envelope pushed to connected users. The transport layer
//! (WebSocket routing) lives outside the engine; it serializes these
//! envelopes as JSON text frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{UserId, SYSTEM_SENDER};

/// Message families carried over live connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Battle invitation to a chosen opponent
    BattleInvitation,
    /// Quick challenge broadcast to nearby users
    NearbyChallenge,
    /// Battle status transition (accepted, declined, cancelled)
    StatusChange,
    /// Countdown tick before a battle starts
    Countdown,
    /// Live rep count update during a battle
    RepUpdate,
    /// Battle completion summary
    BattleComplete,
    /// Challenge progress update
    ChallengeProgress,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::BattleInvitation => "battle_invitation",
            MessageKind::NearbyChallenge => "nearby_challenge",
            MessageKind::StatusChange => "status_change",
            MessageKind::Countdown => "countdown",
            MessageKind::RepUpdate => "rep_update",
            MessageKind::BattleComplete => "battle_complete",
            MessageKind::ChallengeProgress => "challenge_progress",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "battle_invitation" => Some(MessageKind::BattleInvitation),
            "nearby_challenge" => Some(MessageKind::NearbyChallenge),
            "status_change" => Some(MessageKind::StatusChange),
            "countdown" => Some(MessageKind::Countdown),
            "rep_update" => Some(MessageKind::RepUpdate),
            "battle_complete" => Some(MessageKind::BattleComplete),
            "challenge_progress" => Some(MessageKind::ChallengeProgress),
            _ => None,
        }
    }
}

/// Envelope for one message to one recipient.
///
/// `sender_id` 0 marks engine-originated messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub data: Value,
}

impl LiveMessage {
    /// Build an engine-originated message.
    pub fn system(kind: MessageKind, receiver_id: UserId, data: Value) -> Self {
        Self {
            kind,
            sender_id: SYSTEM_SENDER,
            receiver_id,
            data,
        }
    }

    /// Build a user-originated message.
    pub fn from_user(kind: MessageKind, sender_id: UserId, receiver_id: UserId, data: Value) -> Self {
        Self {
            kind,
            sender_id,
            receiver_id,
            data,
        }
    }

    /// Serialize the envelope to a JSON text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize an envelope from a JSON text frame.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
