//! Statement execution inside connection scopes.
//!
//! Every operation opens the connection, logs the bound command, runs it,
//! and closes the connection again, whether the operation succeeded or not.

use std::sync::Arc;

use strata_common::types::Value;
use strata_common::utils::error::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::connection::{ConnectionScope, DataReader, DbCommand, RelationalConnection, ScopedReader};

/// Executes physical commands against a connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlStatementExecutor {
    sensitive_data_logging: bool,
}

impl SqlStatementExecutor {
    /// Creates an executor; parameter values are logged only when
    /// `sensitive_data_logging` is set.
    #[must_use]
    pub fn new(sensitive_data_logging: bool) -> Self {
        Self {
            sensitive_data_logging,
        }
    }

    fn log_command(&self, command: &DbCommand) {
        info!(
            target: "strata::command",
            "Executing DbCommand: {}",
            command.describe(self.sensitive_data_logging)
        );
    }

    /// Executes a batch of non-query commands in one scope, stopping at the
    /// first failure. Returns the total number of affected rows.
    pub fn execute_non_query(
        &self,
        connection: &Arc<dyn RelationalConnection>,
        commands: &[DbCommand],
    ) -> Result<u64> {
        let scope = ConnectionScope::open(connection)?;
        let mut affected = 0;
        for command in commands {
            self.log_command(command);
            affected += scope.connection().execute_non_query(command)?;
        }
        debug!(commands = commands.len(), affected, "Executed non-query batch");
        Ok(affected)
    }

    /// Executes a command and returns its scalar result.
    pub fn execute_scalar(
        &self,
        connection: &Arc<dyn RelationalConnection>,
        command: &DbCommand,
    ) -> Result<Value> {
        let scope = ConnectionScope::open(connection)?;
        self.log_command(command);
        scope.connection().execute_scalar(command)
    }

    /// Executes a query; the connection stays open until the reader is dropped.
    pub fn execute_reader(
        &self,
        connection: &Arc<dyn RelationalConnection>,
        command: &DbCommand,
    ) -> Result<ScopedReader> {
        let scope = ConnectionScope::open(connection)?;
        self.log_command(command);
        let reader = scope.connection().execute_reader(command)?;
        Ok(ScopedReader::new(reader, scope))
    }

    /// Async [`execute_non_query`](Self::execute_non_query).
    pub async fn execute_non_query_async(
        &self,
        connection: &Arc<dyn RelationalConnection>,
        commands: &[DbCommand],
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let scope = ConnectionScope::open_async(connection, cancel).await?;
        let mut affected = 0;
        for command in commands {
            self.log_command(command);
            affected += scope
                .connection()
                .execute_non_query_async(command, cancel)
                .await?;
        }
        Ok(affected)
    }

    /// Async [`execute_scalar`](Self::execute_scalar).
    pub async fn execute_scalar_async(
        &self,
        connection: &Arc<dyn RelationalConnection>,
        command: &DbCommand,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let scope = ConnectionScope::open_async(connection, cancel).await?;
        self.log_command(command);
        scope
            .connection()
            .execute_scalar_async(command, cancel)
            .await
    }

    /// Async [`execute_reader`](Self::execute_reader).
    pub async fn execute_reader_async(
        &self,
        connection: &Arc<dyn RelationalConnection>,
        command: &DbCommand,
        cancel: &CancellationToken,
    ) -> Result<ScopedReader> {
        let scope = ConnectionScope::open_async(connection, cancel).await?;
        self.log_command(command);
        let reader = scope
            .connection()
            .execute_reader_async(command, cancel)
            .await?;
        Ok(ScopedReader::new(reader, scope))
    }
}

/// Reads every remaining row of `reader`.
pub fn read_all(reader: &mut dyn DataReader) -> Result<Vec<Vec<Value>>> {
    let mut rows = Vec::new();
    while let Some(row) = reader.next_row()? {
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::connection::BufferedReader;
    use parking_lot::Mutex;
    use strata_common::utils::error::Error;

    /// Records calls; fails the command whose text is "FAIL".
    #[derive(Debug, Default)]
    struct RecordingConnection {
        open_count: Mutex<usize>,
        executed: Mutex<Vec<String>>,
    }

    impl RelationalConnection for RecordingConnection {
        fn open(&self) -> Result<()> {
            *self.open_count.lock() += 1;
            Ok(())
        }

        fn close(&self) -> Result<()> {
            let mut count = self.open_count.lock();
            *count = count.saturating_sub(1);
            Ok(())
        }

        fn is_open(&self) -> bool {
            *self.open_count.lock() > 0
        }

        fn execute_non_query(&self, command: &DbCommand) -> Result<u64> {
            if command.text == "FAIL" {
                return Err(Error::execution(std::io::Error::other("syntax error")));
            }
            self.executed.lock().push(command.text.clone());
            Ok(1)
        }

        fn execute_scalar(&self, _command: &DbCommand) -> Result<Value> {
            Ok(Value::Int32(42))
        }

        fn execute_reader(&self, _command: &DbCommand) -> Result<Box<dyn DataReader>> {
            Ok(Box::new(BufferedReader::new(
                1,
                vec![vec![Value::Int32(1)], vec![Value::Int32(2)]],
            )))
        }
    }

    fn setup() -> (Arc<RecordingConnection>, Arc<dyn RelationalConnection>) {
        let recording = Arc::new(RecordingConnection::default());
        let connection: Arc<dyn RelationalConnection> = recording.clone();
        (recording, connection)
    }

    #[test]
    fn test_batch_stops_at_first_failure() {
        let (recording, connection) = setup();
        let commands = vec![
            DbCommand::new("ONE"),
            DbCommand::new("FAIL"),
            DbCommand::new("THREE"),
        ];
        let result = SqlStatementExecutor::default().execute_non_query(&connection, &commands);
        assert!(matches!(result, Err(Error::Execution(_))));
        assert_eq!(*recording.executed.lock(), vec!["ONE".to_string()]);
        assert!(!connection.is_open());
    }

    #[test]
    fn test_reader_holds_connection_open() {
        let (_, connection) = setup();
        let mut reader = SqlStatementExecutor::default()
            .execute_reader(&connection, &DbCommand::new("SELECT"))
            .unwrap();
        assert!(connection.is_open());
        assert_eq!(read_all(&mut reader).unwrap().len(), 2);
        drop(reader);
        assert!(!connection.is_open());
    }

    #[tokio::test]
    async fn test_async_scalar() {
        let (_, connection) = setup();
        let value = SqlStatementExecutor::new(true)
            .execute_scalar_async(&connection, &DbCommand::new("SELECT"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(value, Value::Int32(42));
        assert!(!connection.is_open());
    }
}
