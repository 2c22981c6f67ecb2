//! # Strata
//!
//! An embeddable object-relational query pipeline. You describe a query as
//! an expression tree over entity sets, Strata turns it into parameterized
//! SQL, caches the compiled shape, and materializes the rows.
//!
//! Start with a [`Model`] describing your entities, bind it to a connection
//! with [`Database`], and build queries with [`Queryable`].
//!
//! ## Features
//!
//! | Feature | Notes |
//! | ------- | ----- |
//! | `sqlite` | SQLite connection via `rusqlite`, enabled by default |
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use strata::{Database, Model, Queryable, ValueType};
//!
//! let mut builder = Model::builder();
//! builder.entity("Customer", |e| {
//!     e.property("Id", ValueType::Int32)
//!         .optional_property("Name", ValueType::String)
//!         .key(&["Id"]);
//! });
//! let model = Arc::new(builder.build()?);
//!
//! let db = Database::sqlite_in_memory(Arc::clone(&model))?;
//! db.execute_sql_command(
//!     "CREATE TABLE \"Customer\" (\"Id\" INTEGER PRIMARY KEY, \"Name\" TEXT)",
//!     &[],
//! )?;
//! db.execute_sql_command(
//!     "INSERT INTO \"Customer\" VALUES ({0}, {1})",
//!     &[1.into(), "Ada".into()],
//! )?;
//!
//! let query = Queryable::new(model, "Customer")
//!     .filter(|c| c.get("Id").eq(1))
//!     .select(|c| c.get("Name"));
//! let names = db
//!     .execute::<Option<String>>(query.expr())?
//!     .collect::<strata::Result<Vec<_>>>()?;
//! assert_eq!(names, vec![Some("Ada".to_string())]);
//! # Ok::<(), strata::Error>(())
//! ```

// The database facade and its configuration
pub use strata_engine::{
    AsyncQueryResults, CacheStats, CompiledQuery, Config, Database, QueryResults,
};

// Building queries and models
pub use strata_core::{
    ClientFunction, EntityType, Expr, FromValue, Materialize, Model, ModelBuilder, Queryable,
    Row, ValueBuffer,
};

// Values, types and errors
pub use strata_common::{Error, MetadataError, Result, Value, ValueType};

// Connections, dialects and raw commands
#[cfg(feature = "sqlite")]
pub use strata_adapters::SqliteConnection;
pub use strata_adapters::{
    DialectKind, RelationalCommand, RelationalConnection, SqlBatchBuilder, SqlDialect,
};

pub use tokio_util::sync::CancellationToken;

/// Lower-level building blocks, for hosts that assemble their own pipeline.
pub mod pipeline {
    pub use strata_adapters::sql::translators::{MethodCallTranslator, MethodCallTranslators};
    pub use strata_adapters::{GeneratedSql, SqlGenerator, SqlStatementExecutor};
    pub use strata_engine::query::{
        EvaluatableFilter, QueryCompiler, QueryContext, QueryExecutor, QueryPreprocessor,
        RelationalTranslator, parse_query,
    };
}
