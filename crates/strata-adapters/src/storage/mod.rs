//! Connections and command execution.
//!
//! - [`connection`] - The connection trait, physical commands, readers, scopes
//! - [`executor`] - Runs commands inside connection scopes with logging
//! - [`batch`] - Raw SQL batches
//! - [`sqlite`] - SQLite backend

pub mod batch;
pub mod connection;
pub mod executor;
#[cfg(feature = "sqlite")]
pub mod sqlite;
