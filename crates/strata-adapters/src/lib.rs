//! # strata-adapters
//!
//! Adapters layer for Strata: SQL dialects and generation, relational
//! command plumbing, and connection backends.
//!
//! ## Modules
//!
//! - [`sql`] - Dialects, literals, null semantics, the SQL generator, commands, type mappers
//! - [`storage`] - Connection abstraction, statement execution, batching, SQLite backend

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod sql;
pub mod storage;

pub use sql::ParameterValues;
pub use sql::command::{ParameterList, RelationalCommand, RelationalCommandBuilder, RelationalParameter};
pub use sql::dialect::{DialectKind, SqlDialect, SqlServerDialect, SqliteDialect};
pub use sql::generator::{GeneratedSql, SqlGenerator};
pub use storage::batch::{RelationalSqlExecutor, SqlBatchBuilder};
pub use storage::connection::{DataReader, DbCommand, DbParameter, RelationalConnection};
pub use storage::executor::SqlStatementExecutor;
#[cfg(feature = "sqlite")]
pub use storage::sqlite::SqliteConnection;
