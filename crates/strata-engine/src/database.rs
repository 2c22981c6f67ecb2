//! The Strata database facade.

use std::sync::Arc;

use strata_adapters::{
    RelationalCommand, RelationalConnection, RelationalSqlExecutor, SqlStatementExecutor,
};
use strata_common::types::Value;
use strata_common::utils::error::Result;
use strata_core::expression::Expr;
use strata_core::metadata::Model;
use strata_core::storage::Materialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::query::{
    AsyncQueryResults, CacheStats, CompiledQuery, QueryCompiler, QueryContext, QueryExecutor,
    QueryResults,
};

/// A metadata model bound to a connection.
///
/// Compiled queries are cached per database; every execution gets its own
/// [`QueryContext`].
pub struct Database {
    config: Config,
    connection: Arc<dyn RelationalConnection>,
    compiler: QueryCompiler,
    executor: QueryExecutor,
    sql: RelationalSqlExecutor,
}

impl Database {
    /// Creates a database over `connection`.
    #[must_use]
    pub fn new(model: Arc<Model>, connection: Arc<dyn RelationalConnection>, config: Config) -> Self {
        let dialect = config.dialect.dialect();
        let statements = SqlStatementExecutor::new(config.sensitive_data_logging);
        info!(
            model = model.id(),
            dialect = dialect.name(),
            "Creating database"
        );
        Self {
            compiler: QueryCompiler::new(model, Arc::clone(&dialect), config.cache_capacity),
            executor: QueryExecutor::new(Arc::clone(&connection), Arc::clone(&dialect), statements),
            sql: RelationalSqlExecutor::new(statements, Arc::clone(&connection), dialect),
            connection,
            config,
        }
    }

    /// Creates a database over a private in-memory SQLite database.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot create the database.
    #[cfg(feature = "sqlite")]
    pub fn sqlite_in_memory(model: Arc<Model>) -> Result<Self> {
        let connection = strata_adapters::SqliteConnection::open_in_memory()?;
        Ok(Self::new(model, Arc::new(connection), Config::sqlite()))
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the connection.
    #[must_use]
    pub fn connection(&self) -> &Arc<dyn RelationalConnection> {
        &self.connection
    }

    /// Returns the metadata model.
    #[must_use]
    pub fn model(&self) -> &Arc<Model> {
        self.compiler.model()
    }

    /// Returns compiled-query cache counters.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.compiler.cache_stats()
    }

    /// Compiles `expr` for synchronous execution.
    ///
    /// # Errors
    ///
    /// Returns parameterization, parse, and translation errors.
    pub fn compile_query(&self, expr: &Expr) -> Result<Arc<CompiledQuery>> {
        self.compiler.compile_query(expr, &mut QueryContext::new())
    }

    /// Compiles `expr` for async execution.
    ///
    /// # Errors
    ///
    /// Returns parameterization, parse, and translation errors.
    pub fn compile_async_query(&self, expr: &Expr) -> Result<Arc<CompiledQuery>> {
        self.compiler.compile_async_query(expr, &mut QueryContext::new())
    }

    /// Executes a query returning a sequence.
    ///
    /// Compilation errors are returned immediately; execution errors are
    /// yielded by the sequence.
    ///
    /// # Errors
    ///
    /// Returns parameterization, parse, and translation errors.
    pub fn execute<T: Materialize>(&self, expr: &Expr) -> Result<QueryResults<T>> {
        let mut context = QueryContext::new();
        let compiled = self.compiler.compile_query(expr, &mut context)?;
        Ok(self.executor.execute(compiled, context))
    }

    /// Executes a query returning one value.
    ///
    /// # Errors
    ///
    /// Returns compilation and execution errors, and
    /// [`Error::InvalidOperation`](strata_common::Error::InvalidOperation)
    /// when the query has no (or, for `Single`, more than one) element.
    pub fn execute_single<T: Materialize>(&self, expr: &Expr) -> Result<T> {
        let mut context = QueryContext::new();
        let compiled = self.compiler.compile_query(expr, &mut context)?;
        self.executor.execute_single(&compiled, &context)
    }

    /// Executes a query returning an async sequence.
    ///
    /// # Errors
    ///
    /// Returns parameterization, parse, and translation errors.
    pub fn execute_async<T>(&self, expr: &Expr, cancel: CancellationToken) -> Result<AsyncQueryResults<T>>
    where
        T: Materialize + Send + 'static,
    {
        let mut context = QueryContext::with_cancellation(cancel);
        let compiled = self.compiler.compile_async_query(expr, &mut context)?;
        Ok(self.executor.execute_async(compiled, context))
    }

    /// Async [`execute_single`](Self::execute_single).
    ///
    /// # Errors
    ///
    /// As [`execute_single`](Self::execute_single), plus
    /// [`Error::Cancelled`](strata_common::Error::Cancelled).
    pub async fn execute_single_async<T: Materialize>(
        &self,
        expr: &Expr,
        cancel: CancellationToken,
    ) -> Result<T> {
        let mut context = QueryContext::with_cancellation(cancel);
        let compiled = self.compiler.compile_async_query(expr, &mut context)?;
        self.executor.execute_single_async(&compiled, &context).await
    }

    /// Executes raw SQL; `{0}`, `{1}`, ... refer to `parameters`.
    ///
    /// # Errors
    ///
    /// Returns formatting and execution errors.
    pub fn execute_sql_command(&self, sql: &str, parameters: &[Value]) -> Result<u64> {
        self.sql.execute_sql_command(sql, parameters)
    }

    /// Async [`execute_sql_command`](Self::execute_sql_command).
    ///
    /// # Errors
    ///
    /// Returns formatting, execution, and cancellation errors.
    pub async fn execute_sql_command_async(
        &self,
        sql: &str,
        parameters: &[Value],
        cancel: &CancellationToken,
    ) -> Result<u64> {
        self.sql
            .execute_sql_command_async(sql, parameters, cancel)
            .await
    }

    /// Executes commands in order in one connection scope, stopping at the
    /// first failure.
    ///
    /// # Errors
    ///
    /// Returns the first failing command's error.
    pub fn execute_batch(&self, commands: &[RelationalCommand]) -> Result<u64> {
        self.sql.execute_batch(commands)
    }

    /// Returns the command one execution of `expr` would run.
    ///
    /// # Errors
    ///
    /// Returns compilation and generation errors.
    pub fn generate_sql(&self, expr: &Expr) -> Result<RelationalCommand> {
        let mut context = QueryContext::new();
        let compiled = self.compiler.compile_query(expr, &mut context)?;
        let generated = compiled.generate(context.parameter_values(), self.compiler.dialect().as_ref())?;
        Ok(generated.command)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.config)
            .field("connection", &self.connection)
            .field("compiler", &self.compiler)
            .finish_non_exhaustive()
    }
}
