//! # strata-engine
//!
//! The query side of Strata: turning a caller's expression tree into a
//! cached, parameterized SQL command and running it.
//!
//! ## Modules
//!
//! - [`database`] - The `Database` facade binding a model to a connection
//! - [`config`] - Configuration options
//! - [`query`] - Preprocessing, parsing, translation, caching, compilation and execution

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod database;
pub mod query;

pub use config::Config;
pub use database::Database;
pub use query::{
    AsyncQueryResults, CacheStats, CompiledQuery, QueryCompiler, QueryContext, QueryResults,
};
