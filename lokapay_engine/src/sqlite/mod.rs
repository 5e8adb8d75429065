//! SQLite database module for the Lokapay payment engine.

mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
