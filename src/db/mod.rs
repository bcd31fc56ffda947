//! Database module: pending/finished request stores backed by SQLite.
//!
//! - `model`: edit and filter inputs accepted by the repository.
//! - `repo`: SQL-only functions that map rows into domain records.
//!
//! External modules import from `panel_purge::db`; the repository API is
//! re-exported here.

pub mod model;
pub mod repo;

pub use repo::*;

pub use model::{FinishedFilter, PendingEdit};
