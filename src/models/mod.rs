//! Persistent records behind the object store binding.
//!
//! These map one-to-one onto the SQLite tables created by
//! `migrations/0001_init.sql` via `sqlx::FromRow`.

pub mod bucket;
pub mod metadata;
pub mod object;
