//! Shared test fixtures for engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use repforge::battles::BattleManager;
use repforge::challenges::ChallengeManager;
use repforge::leaderboards::LeaderboardService;
use repforge::realtime::{ConnectionRegistry, Notifier};
use repforge::storage::{Database, UserStore};
use repforge::types::{Location, UserId};

/// A fully wired engine over an in-memory store.
pub struct TestEngine {
    pub db: Arc<Database>,
    pub registry: Arc<ConnectionRegistry>,
    pub challenges: ChallengeManager,
    pub battles: BattleManager,
    pub leaderboards: LeaderboardService,
}

pub fn engine() -> TestEngine {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let registry = Arc::new(ConnectionRegistry::new());
    let notifier = Notifier::new(registry.clone());

    TestEngine {
        challenges: ChallengeManager::new(db.clone(), notifier.clone()),
        battles: BattleManager::new(db.clone(), notifier),
        leaderboards: LeaderboardService::new(db.clone()),
        db,
        registry,
    }
}

pub fn create_user(engine: &TestEngine, name: &str) -> UserId {
    let conn = engine.db.connection();
    UserStore::new(&conn).create_user(name).unwrap().id
}

pub fn place_user(engine: &TestEngine, user_id: UserId, latitude: f64, longitude: f64) {
    let conn = engine.db.connection();
    UserStore::new(&conn)
        .update_location(user_id, Location::new(latitude, longitude))
        .unwrap();
}

pub fn befriend(engine: &TestEngine, user_id: UserId, friend_id: UserId) {
    let conn = engine.db.connection();
    UserStore::new(&conn).add_friend(user_id, friend_id).unwrap();
}
