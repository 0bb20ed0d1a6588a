//! SQLite storage backend for the fulfilment engine.

mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;

/// Embedded schema migrations. Test harnesses and deployment tooling run these against a fresh database.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("src/sqlite/migrations");
