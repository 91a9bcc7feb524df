//! Row-level storage operations.
//!
//! Everything here takes a `SqliteConnection` so callers decide the
//! transaction scope. The engine in [`crate::service`] is the only consumer;
//! it owns validation and policy while these functions own the SQL.

pub mod message;
pub mod queue;
pub mod tenant;
