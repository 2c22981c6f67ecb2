//! Building and running batches of raw SQL commands.

use std::sync::Arc;

use strata_common::types::Value;
use strata_common::utils::error::Result;
use tokio_util::sync::CancellationToken;

use super::connection::{DbCommand, RelationalConnection};
use super::executor::SqlStatementExecutor;
use crate::sql::ParameterValues;
use crate::sql::command::{RelationalCommand, RelationalCommandBuilder};
use crate::sql::dialect::SqlDialect;

/// Splits SQL text into separately executed commands.
///
/// Text is appended to the current command until [`end_batch`] closes it.
/// A batch without text produces no command.
///
/// [`end_batch`]: SqlBatchBuilder::end_batch
#[derive(Debug)]
pub struct SqlBatchBuilder {
    prefix: String,
    current: RelationalCommandBuilder,
    commands: Vec<RelationalCommand>,
}

impl SqlBatchBuilder {
    /// Creates a builder whose commands use the dialect's parameter prefix.
    #[must_use]
    pub fn new(dialect: &dyn SqlDialect) -> Self {
        let prefix = dialect.parameter_prefix().to_string();
        Self {
            current: RelationalCommandBuilder::new(prefix.clone()),
            prefix,
            commands: Vec::new(),
        }
    }

    /// Appends to the current command.
    pub fn append(&mut self, text: impl AsRef<str>) -> &mut Self {
        self.current.append(text);
        self
    }

    /// Appends a line to the current command.
    pub fn append_line(&mut self, text: impl AsRef<str>) -> &mut Self {
        self.current.append_line(text);
        self
    }

    /// Indents subsequent lines of the current command.
    pub fn increment_indent(&mut self) -> &mut Self {
        self.current.increment_indent();
        self
    }

    /// Outdents subsequent lines of the current command.
    pub fn decrement_indent(&mut self) -> &mut Self {
        self.current.decrement_indent();
        self
    }

    /// Closes the current command.
    pub fn end_batch(&mut self) -> &mut Self {
        let finished = std::mem::replace(
            &mut self.current,
            RelationalCommandBuilder::new(self.prefix.clone()),
        );
        if !finished.is_empty() {
            self.commands.push(finished.build());
        }
        self
    }

    /// Commands closed so far.
    #[must_use]
    pub fn commands(&self) -> &[RelationalCommand] {
        &self.commands
    }

    /// Closes the current command and returns all commands.
    #[must_use]
    pub fn build(mut self) -> Vec<RelationalCommand> {
        self.end_batch();
        self.commands
    }
}

/// Executes raw SQL and command batches.
#[derive(Debug, Clone)]
pub struct RelationalSqlExecutor {
    statement_executor: SqlStatementExecutor,
    connection: Arc<dyn RelationalConnection>,
    dialect: Arc<dyn SqlDialect>,
}

impl RelationalSqlExecutor {
    /// Creates an executor over `connection`.
    #[must_use]
    pub fn new(
        statement_executor: SqlStatementExecutor,
        connection: Arc<dyn RelationalConnection>,
        dialect: Arc<dyn SqlDialect>,
    ) -> Self {
        Self {
            statement_executor,
            connection,
            dialect,
        }
    }

    fn format_command(&self, sql: &str, parameters: &[Value]) -> Result<DbCommand> {
        let mut builder = RelationalCommandBuilder::new(self.dialect.parameter_prefix());
        builder.append_format(sql, parameters)?;
        builder
            .build()
            .create_command(&ParameterValues::new(), self.dialect.type_mapper())
    }

    fn bind_all(&self, commands: &[RelationalCommand]) -> Result<Vec<DbCommand>> {
        let values = ParameterValues::new();
        commands
            .iter()
            .map(|c| c.create_command(&values, self.dialect.type_mapper()))
            .collect()
    }

    /// Executes SQL whose `{0}`, `{1}`, ... placeholders refer to `parameters`.
    pub fn execute_sql_command(&self, sql: &str, parameters: &[Value]) -> Result<u64> {
        let command = self.format_command(sql, parameters)?;
        self.statement_executor
            .execute_non_query(&self.connection, std::slice::from_ref(&command))
    }

    /// Async [`execute_sql_command`](Self::execute_sql_command).
    pub async fn execute_sql_command_async(
        &self,
        sql: &str,
        parameters: &[Value],
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let command = self.format_command(sql, parameters)?;
        self.statement_executor
            .execute_non_query_async(&self.connection, std::slice::from_ref(&command), cancel)
            .await
    }

    /// Executes commands in order inside one connection scope, stopping at
    /// the first failure.
    pub fn execute_batch(&self, commands: &[RelationalCommand]) -> Result<u64> {
        let commands = self.bind_all(commands)?;
        self.statement_executor
            .execute_non_query(&self.connection, &commands)
    }

    /// Async [`execute_batch`](Self::execute_batch).
    pub async fn execute_batch_async(
        &self,
        commands: &[RelationalCommand],
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let commands = self.bind_all(commands)?;
        self.statement_executor
            .execute_non_query_async(&self.connection, &commands, cancel)
            .await
    }
}
