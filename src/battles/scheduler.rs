//! Battle clock scheduling.
//!
//! Keeps one cancellable clock task per battle, keyed by battle id.
//! Cancelling a battle aborts its clock so a stale timer can never complete
//! a battle that was independently cancelled.

use std::collections::HashMap;
use std::sync::Mutex;
use tokio::task::JoinHandle;

use crate::types::BattleId;

/// Registry of in-flight battle clock tasks.
pub struct BattleScheduler {
    tasks: Mutex<HashMap<BattleId, JoinHandle<()>>>,
}

impl BattleScheduler {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Track a spawned clock task for a battle.
    ///
    /// A task already tracked under the same id is aborted and replaced.
    pub fn track(&self, battle_id: BattleId, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(previous) = tasks.insert(battle_id, handle) {
            previous.abort();
        }
    }

    /// Abort and forget the clock for a battle. Returns whether one existed.
    pub fn cancel(&self, battle_id: BattleId) -> bool {
        match self.tasks.lock().unwrap().remove(&battle_id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Forget a clock that ran to completion on its own.
    pub fn finish(&self, battle_id: BattleId) {
        self.tasks.lock().unwrap().remove(&battle_id);
    }

    /// Whether a clock is currently tracked for the battle.
    pub fn is_scheduled(&self, battle_id: BattleId) -> bool {
        self.tasks.lock().unwrap().contains_key(&battle_id)
    }
}

impl Default for BattleScheduler {
    fn default() -> Self {
        Self::new()
    }
}
