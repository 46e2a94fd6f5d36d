//! Storage module for the durable Store.
//!
//! Wraps SQLite behind a `Database` handle and per-domain store views.

pub mod database;
pub mod schema;
pub mod users;

pub use database::{Database, StoreError};
pub use users::{User, UserStore};
