//! User data storage operations.
//!
//! Provides persistence for:
//! - User records (display name, last known location)
//! - Friendships (backs the leaderboard friend flag)

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::storage::database::StoreError;
use crate::types::{Location, UserId};

/// A user known to the engine.
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    pub last_location: Option<Location>,
    pub created_at: DateTime<Utc>,
}

/// Store view over user and friendship rows.
pub struct UserStore<'a> {
    conn: &'a Connection,
}

impl<'a> UserStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert a new user and return the persisted record.
    pub fn create_user(&self, display_name: &str) -> Result<User, StoreError> {
        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO users (display_name, created_at) VALUES (?1, ?2)",
            params![display_name, now.to_rfc3339()],
        )?;

        Ok(User {
            id: self.conn.last_insert_rowid(),
            display_name: display_name.to_string(),
            last_location: None,
            created_at: now,
        })
    }

    /// Look up a user by id.
    pub fn get_user(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, display_name, last_latitude, last_longitude, created_at
             FROM users WHERE id = ?1",
        )?;

        let user = stmt
            .query_row(params![user_id], Self::row_to_user)
            .optional()?;

        Ok(user)
    }

    /// Update a user's last known location.
    pub fn update_location(&self, user_id: UserId, location: Location) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE users SET last_latitude = ?2, last_longitude = ?3 WHERE id = ?1",
            params![user_id, location.latitude, location.longitude],
        )?;
        Ok(())
    }

    /// Record a friendship edge from `user_id` to `friend_id`.
    pub fn add_friend(&self, user_id: UserId, friend_id: UserId) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO friendships (user_id, friend_id, created_at)
             VALUES (?1, ?2, ?3)",
            params![user_id, friend_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Ids of everyone the given user counts as a friend.
    pub fn friend_ids(&self, user_id: UserId) -> Result<Vec<UserId>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT friend_id FROM friendships WHERE user_id = ?1")?;

        let ids = stmt
            .query_map(params![user_id], |row| row.get(0))?
            .collect::<Result<Vec<UserId>, _>>()?;

        Ok(ids)
    }

    /// Display name for a user, if the row exists.
    pub fn display_name(&self, user_id: UserId) -> Result<Option<String>, StoreError> {
        let name = self
            .conn
            .query_row(
                "SELECT display_name FROM users WHERE id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name)
    }

    fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
        let lat: Option<f64> = row.get(2)?;
        let lon: Option<f64> = row.get(3)?;
        let created_str: String = row.get(4)?;

        Ok(User {
            id: row.get(0)?,
            display_name: row.get(1)?,
            last_location: match (lat, lon) {
                (Some(latitude), Some(longitude)) => Some(Location {
                    latitude,
                    longitude,
                }),
                _ => None,
            },
            created_at: DateTime::parse_from_rfc3339(&created_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    #[test]
    fn test_create_and_get_user() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();
        let store = UserStore::new(&conn);

        let user = store.create_user("Avery").unwrap();
        assert!(user.id > 0);

        let fetched = store.get_user(user.id).unwrap().unwrap();
        assert_eq!(fetched.display_name, "Avery");
        assert!(fetched.last_location.is_none());
    }

    #[test]
    fn test_missing_user_is_none() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();
        let store = UserStore::new(&conn);

        assert!(store.get_user(999).unwrap().is_none());
    }

    #[test]
    fn test_update_location() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();
        let store = UserStore::new(&conn);

        let user = store.create_user("Avery").unwrap();
        store
            .update_location(user.id, Location::new(30.0, -97.0))
            .unwrap();

        let fetched = store.get_user(user.id).unwrap().unwrap();
        let loc = fetched.last_location.unwrap();
        assert_eq!(loc.latitude, 30.0);
        assert_eq!(loc.longitude, -97.0);
    }

    #[test]
    fn test_friend_ids() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();
        let store = UserStore::new(&conn);

        let a = store.create_user("A").unwrap();
        let b = store.create_user("B").unwrap();
        let c = store.create_user("C").unwrap();

        store.add_friend(a.id, b.id).unwrap();
        store.add_friend(a.id, b.id).unwrap(); // duplicate is ignored
        store.add_friend(b.id, c.id).unwrap();

        let friends = store.friend_ids(a.id).unwrap();
        assert_eq!(friends, vec![b.id]);
    }
}
