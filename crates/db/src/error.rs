//! Typed error type for the db crate.
//!
//! `NotFound` is only produced by point lookups and the locked record read;
//! list and aggregate queries return empty results instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("row not found")]
    NotFound,

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}
