//! `db` crate — pure persistence layer.
//!
//! Provides a connection pool, typed row structs, and repository functions
//! for every table in the sqlward schema.  No business logic lives here:
//! record statuses and step states travel as plain strings, and the `engine`
//! crate owns their typed forms.

pub mod error;
pub mod models;
pub mod pool;
pub mod repository;

pub use error::DbError;
pub use pool::DbPool;
