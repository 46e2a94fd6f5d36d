//! Database schema definitions for the competition engine.

/// SQL schema for creating all engine tables.
pub const SCHEMA: &str = r#"
-- Users known to the engine
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    display_name TEXT NOT NULL,
    last_latitude REAL,
    last_longitude REAL,
    created_at TEXT NOT NULL
);

-- Friendships (directed; a row per direction)
CREATE TABLE IF NOT EXISTS friendships (
    user_id INTEGER NOT NULL REFERENCES users(id),
    friend_id INTEGER NOT NULL REFERENCES users(id),
    created_at TEXT NOT NULL,
    PRIMARY KEY (user_id, friend_id)
);

-- Goal-based challenges
CREATE TABLE IF NOT EXISTS challenges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    creator_id INTEGER NOT NULL REFERENCES users(id),
    goal_type TEXT NOT NULL,
    goal_value REAL NOT NULL,
    exercise TEXT,
    start_date TEXT NOT NULL,
    end_date TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    is_public INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

-- Live participant standing within a challenge
CREATE TABLE IF NOT EXISTS challenge_participants (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    challenge_id INTEGER NOT NULL REFERENCES challenges(id),
    user_id INTEGER NOT NULL REFERENCES users(id),
    joined_at TEXT NOT NULL,
    current_progress REAL NOT NULL DEFAULT 0,
    completed INTEGER NOT NULL DEFAULT 0,
    completed_at TEXT,
    UNIQUE(challenge_id, user_id)
);

-- Append-only contribution records; survive participant removal
CREATE TABLE IF NOT EXISTS progress_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    challenge_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    value REAL NOT NULL,
    note TEXT,
    proof_ref TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_progress_entries_participant
    ON progress_entries(challenge_id, user_id);

-- Head-to-head timed battles
CREATE TABLE IF NOT EXISTS battles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    creator_id INTEGER NOT NULL REFERENCES users(id),
    opponent_id INTEGER REFERENCES users(id),
    exercise_type TEXT NOT NULL,
    duration_secs INTEGER NOT NULL,
    is_quick_challenge INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT,
    winner_id INTEGER
);

-- Latest rep count per battle participant; upserted, never duplicated
CREATE TABLE IF NOT EXISTS battle_performances (
    battle_id INTEGER NOT NULL REFERENCES battles(id),
    user_id INTEGER NOT NULL REFERENCES users(id),
    reps INTEGER NOT NULL,
    submitted_at TEXT NOT NULL,
    PRIMARY KEY (battle_id, user_id)
);
"#;

/// SQL for creating the schema version tracking table.
pub const SCHEMA_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
"#;

/// Current schema version.
pub const CURRENT_VERSION: i32 = 1;
