//! Integration tests for the battle subsystem.
//!
//! Drives the full state machine with paused tokio time: countdown, live rep
//! updates, automatic completion, cancellation, and quick challenge
//! broadcast.

mod common;

use std::time::Duration;

use common::{create_user, engine, place_user};
use repforge::battles::{BattleError, BattleStatus};
use repforge::realtime::{LiveMessage, MessageKind};
use tokio::sync::mpsc::UnboundedReceiver;

fn drain(rx: &mut UnboundedReceiver<LiveMessage>) -> Vec<LiveMessage> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}

fn kinds(messages: &[LiveMessage]) -> Vec<MessageKind> {
    messages.iter().map(|m| m.kind).collect()
}

#[tokio::test]
async fn test_invitation_fan_out() {
    let engine = engine();
    let creator = create_user(&engine, "Creator");
    let opponent = create_user(&engine, "Opponent");

    let mut opponent_rx = engine.registry.register(opponent);

    let battle = engine
        .battles
        .create_battle(creator, "pushups", 30, Some(opponent))
        .unwrap();
    assert_eq!(battle.status, BattleStatus::Pending);

    let invitation = opponent_rx.try_recv().unwrap();
    assert_eq!(invitation.kind, MessageKind::BattleInvitation);
    assert_eq!(invitation.sender_id, creator);
    assert_eq!(invitation.data["battle_id"], battle.id);
}

#[tokio::test]
async fn test_create_battle_validation() {
    let engine = engine();
    let creator = create_user(&engine, "Creator");

    assert!(matches!(
        engine.battles.create_battle(creator, "pushups", 0, None),
        Err(BattleError::Validation(_))
    ));
    assert!(matches!(
        engine.battles.create_battle(creator, "pushups", 30, Some(creator)),
        Err(BattleError::Validation(_))
    ));
}

/// Scenario: the opponent declines. The battle cancels and no countdown is
/// ever sent.
#[tokio::test]
async fn test_decline_cancels_without_countdown() {
    let engine = engine();
    let creator = create_user(&engine, "Creator");
    let opponent = create_user(&engine, "Opponent");

    let mut creator_rx = engine.registry.register(creator);
    let mut opponent_rx = engine.registry.register(opponent);

    let battle = engine
        .battles
        .create_battle(creator, "squats", 10, Some(opponent))
        .unwrap();

    let declined = engine.battles.decline_battle(battle.id, opponent).unwrap();
    assert_eq!(declined.status, BattleStatus::Cancelled);
    assert!(!engine.battles.has_pending_clock(battle.id));

    let creator_kinds = kinds(&drain(&mut creator_rx));
    let opponent_kinds = kinds(&drain(&mut opponent_rx));
    assert!(creator_kinds.contains(&MessageKind::StatusChange));
    assert!(!creator_kinds.contains(&MessageKind::Countdown));
    assert!(!opponent_kinds.contains(&MessageKind::Countdown));
}

#[tokio::test]
async fn test_accept_requires_invited_opponent() {
    let engine = engine();
    let creator = create_user(&engine, "Creator");
    let opponent = create_user(&engine, "Opponent");
    let stranger = create_user(&engine, "Stranger");

    let battle = engine
        .battles
        .create_battle(creator, "pushups", 30, Some(opponent))
        .unwrap();

    assert!(matches!(
        engine.battles.accept_battle(battle.id, stranger),
        Err(BattleError::Forbidden)
    ));
    assert!(matches!(
        engine.battles.accept_battle(battle.id, creator),
        Err(BattleError::Forbidden)
    ));
    assert!(matches!(
        engine.battles.accept_battle(999, opponent),
        Err(BattleError::NotFound(999))
    ));
}

/// Scenario: a full battle. Countdown runs 3-2-1-GO, both submit reps, the
/// clock completes the battle exactly once, and only the winner's summary
/// has the winner flag set.
#[tokio::test(start_paused = true)]
async fn test_full_battle_auto_completes() {
    let engine = engine();
    let u1 = create_user(&engine, "U1");
    let u2 = create_user(&engine, "U2");

    let mut rx1 = engine.registry.register(u1);
    let mut rx2 = engine.registry.register(u2);

    let battle = engine
        .battles
        .create_battle(u1, "pushups", 10, Some(u2))
        .unwrap();

    let accepted = engine.battles.accept_battle(battle.id, u2).unwrap();
    assert_eq!(accepted.status, BattleStatus::InProgress);
    assert!(accepted.started_at.is_some());

    engine.battles.submit_reps(battle.id, u1, 15).unwrap();
    engine.battles.submit_reps(battle.id, u2, 22).unwrap();

    // Countdown lead (3s) + duration (10s), generously padded.
    tokio::time::sleep(Duration::from_secs(20)).await;

    let settled = engine.battles.get_battle(battle.id).unwrap();
    assert_eq!(settled.status, BattleStatus::Completed);
    assert_eq!(settled.winner_id, Some(u2));
    assert!(settled.completed_at.is_some());
    assert!(!engine.battles.has_pending_clock(battle.id));

    let to_u1 = drain(&mut rx1);
    let to_u2 = drain(&mut rx2);

    // Countdown steps arrive strictly ordered and precede completion.
    for messages in [&to_u1, &to_u2] {
        let countdown: Vec<i64> = messages
            .iter()
            .filter(|m| m.kind == MessageKind::Countdown)
            .map(|m| m.data["countdown"].as_i64().unwrap())
            .collect();
        assert_eq!(countdown, vec![3, 2, 1, 0]);

        let last_countdown = messages
            .iter()
            .rposition(|m| m.kind == MessageKind::Countdown)
            .unwrap();
        let completion = messages
            .iter()
            .position(|m| m.kind == MessageKind::BattleComplete)
            .unwrap();
        assert!(last_countdown < completion);
    }

    // The GO message carries the start time.
    let go = to_u1
        .iter()
        .find(|m| m.kind == MessageKind::Countdown && m.data["countdown"] == 0)
        .unwrap();
    assert_eq!(go.data["message"], "GO");
    assert!(go.data["start_time"].is_string());

    // Exactly one completion summary each, winner flag only for the winner.
    let summaries_u1: Vec<_> = to_u1
        .iter()
        .filter(|m| m.kind == MessageKind::BattleComplete)
        .collect();
    let summaries_u2: Vec<_> = to_u2
        .iter()
        .filter(|m| m.kind == MessageKind::BattleComplete)
        .collect();
    assert_eq!(summaries_u1.len(), 1);
    assert_eq!(summaries_u2.len(), 1);
    assert_eq!(summaries_u1[0].data["is_winner"], false);
    assert_eq!(summaries_u2[0].data["is_winner"], true);
    assert_eq!(summaries_u1[0].data["winner_id"], u2);
    assert_eq!(
        summaries_u1[0].data["performances"].as_array().unwrap().len(),
        2
    );
}

#[tokio::test(start_paused = true)]
async fn test_rep_updates_replace_and_fan_out() {
    let engine = engine();
    let u1 = create_user(&engine, "U1");
    let u2 = create_user(&engine, "U2");

    let mut rx2 = engine.registry.register(u2);

    let battle = engine
        .battles
        .create_battle(u1, "situps", 60, Some(u2))
        .unwrap();
    engine.battles.accept_battle(battle.id, u2).unwrap();
    drain(&mut rx2);

    engine.battles.submit_reps(battle.id, u1, 5).unwrap();
    engine.battles.submit_reps(battle.id, u1, 9).unwrap();

    // The latest value replaces, never accumulates.
    let performances = engine.battles.performances(battle.id).unwrap();
    assert_eq!(performances.len(), 1);
    assert_eq!(performances[0].reps, 9);

    let updates: Vec<_> = drain(&mut rx2)
        .into_iter()
        .filter(|m| m.kind == MessageKind::RepUpdate)
        .collect();
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[1].data["reps"], 9);
    assert!(updates[1].data["submitted_at"].is_string());
}

#[tokio::test]
async fn test_submit_reps_guards() {
    let engine = engine();
    let u1 = create_user(&engine, "U1");
    let u2 = create_user(&engine, "U2");
    let stranger = create_user(&engine, "Stranger");

    let battle = engine
        .battles
        .create_battle(u1, "pushups", 30, Some(u2))
        .unwrap();

    // Not started yet.
    assert!(matches!(
        engine.battles.submit_reps(battle.id, u1, 5),
        Err(BattleError::InvalidState(BattleStatus::Pending))
    ));

    engine.battles.accept_battle(battle.id, u2).unwrap();
    assert!(matches!(
        engine.battles.submit_reps(battle.id, stranger, 5),
        Err(BattleError::Forbidden)
    ));
}

/// Cancelling mid-countdown aborts the clock; the battle never completes.
#[tokio::test(start_paused = true)]
async fn test_cancel_prevents_stale_completion() {
    let engine = engine();
    let u1 = create_user(&engine, "U1");
    let u2 = create_user(&engine, "U2");

    let mut rx1 = engine.registry.register(u1);

    let battle = engine
        .battles
        .create_battle(u1, "pushups", 10, Some(u2))
        .unwrap();
    engine.battles.accept_battle(battle.id, u2).unwrap();

    // Let the countdown begin, then cancel before the clock elapses.
    tokio::time::sleep(Duration::from_secs(1)).await;
    let cancelled = engine.battles.cancel_battle(battle.id, u1).unwrap();
    assert_eq!(cancelled.status, BattleStatus::Cancelled);
    assert!(!engine.battles.has_pending_clock(battle.id));

    tokio::time::sleep(Duration::from_secs(60)).await;

    let settled = engine.battles.get_battle(battle.id).unwrap();
    assert_eq!(settled.status, BattleStatus::Cancelled);
    assert_eq!(settled.winner_id, None);

    let complete_count = drain(&mut rx1)
        .iter()
        .filter(|m| m.kind == MessageKind::BattleComplete)
        .count();
    assert_eq!(complete_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_complete_battle_is_idempotent() {
    let engine = engine();
    let u1 = create_user(&engine, "U1");
    let u2 = create_user(&engine, "U2");

    let mut rx2 = engine.registry.register(u2);

    let battle = engine
        .battles
        .create_battle(u1, "pushups", 10, Some(u2))
        .unwrap();
    engine.battles.accept_battle(battle.id, u2).unwrap();
    engine.battles.submit_reps(battle.id, u2, 12).unwrap();

    let first = engine.battles.complete_battle(battle.id).unwrap();
    assert_eq!(first.status, BattleStatus::Completed);
    assert_eq!(first.winner_id, Some(u2));

    let second = engine.battles.complete_battle(battle.id).unwrap();
    assert_eq!(second.status, BattleStatus::Completed);
    assert_eq!(second.winner_id, Some(u2));
    assert_eq!(second.completed_at, first.completed_at);

    // The clock fires later and must not complete again.
    tokio::time::sleep(Duration::from_secs(60)).await;

    let complete_count = drain(&mut rx2)
        .iter()
        .filter(|m| m.kind == MessageKind::BattleComplete)
        .count();
    assert_eq!(complete_count, 1);
}

#[tokio::test]
async fn test_cancel_guards() {
    let engine = engine();
    let u1 = create_user(&engine, "U1");
    let u2 = create_user(&engine, "U2");
    let stranger = create_user(&engine, "Stranger");

    let battle = engine
        .battles
        .create_battle(u1, "pushups", 30, Some(u2))
        .unwrap();

    assert!(matches!(
        engine.battles.cancel_battle(battle.id, stranger),
        Err(BattleError::Forbidden)
    ));

    engine.battles.cancel_battle(battle.id, u2).unwrap();
    assert!(matches!(
        engine.battles.cancel_battle(battle.id, u1),
        Err(BattleError::InvalidState(BattleStatus::Cancelled))
    ));
}

/// Scenario: quick challenge broadcast reaches only connected users inside
/// the radius, with the live distance attached.
#[tokio::test]
async fn test_quick_challenge_nearby_broadcast() {
    let engine = engine();
    let creator = create_user(&engine, "Creator");
    let near = create_user(&engine, "Near");
    let far = create_user(&engine, "Far");

    place_user(&engine, creator, 30.0, -97.0);
    place_user(&engine, near, 30.029, -97.0); // ~2 miles north
    place_user(&engine, far, 30.116, -97.0); // ~8 miles north

    let mut creator_rx = engine.registry.register(creator);
    let mut near_rx = engine.registry.register(near);
    let mut far_rx = engine.registry.register(far);

    let battle = engine
        .battles
        .create_quick_challenge(creator, "burpees", 45)
        .unwrap();
    assert!(battle.is_quick_challenge);
    assert_eq!(battle.opponent_id, None);

    let to_near = near_rx.try_recv().unwrap();
    assert_eq!(to_near.kind, MessageKind::NearbyChallenge);
    let distance = to_near.data["distance_miles"].as_f64().unwrap();
    assert!((1.5..2.5).contains(&distance), "got {distance}");

    assert!(far_rx.try_recv().is_err());
    assert!(creator_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_quick_challenge_without_location_skips_broadcast() {
    let engine = engine();
    let creator = create_user(&engine, "Creator");
    let near = create_user(&engine, "Near");
    place_user(&engine, near, 30.0, -97.0);

    let mut near_rx = engine.registry.register(near);

    // Creator has no stored location; the battle still gets created.
    let battle = engine
        .battles
        .create_quick_challenge(creator, "burpees", 45)
        .unwrap();
    assert_eq!(battle.status, BattleStatus::Pending);
    assert!(near_rx.try_recv().is_err());
}

/// Accepting a quick challenge binds the accepter as the opponent; the
/// pending-state guard makes the first acceptance win.
#[tokio::test(start_paused = true)]
async fn test_quick_challenge_acceptance_binds_opponent() {
    let engine = engine();
    let creator = create_user(&engine, "Creator");
    let first = create_user(&engine, "First");
    let second = create_user(&engine, "Second");

    let battle = engine
        .battles
        .create_quick_challenge(creator, "burpees", 45)
        .unwrap();

    assert!(matches!(
        engine.battles.accept_battle(battle.id, creator),
        Err(BattleError::Forbidden)
    ));

    let accepted = engine.battles.accept_battle(battle.id, first).unwrap();
    assert_eq!(accepted.opponent_id, Some(first));
    assert_eq!(accepted.status, BattleStatus::InProgress);

    assert!(matches!(
        engine.battles.accept_battle(battle.id, second),
        Err(BattleError::InvalidState(BattleStatus::InProgress))
    ));
}
