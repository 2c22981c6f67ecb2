//! SQLite connection backed by `rusqlite`.
//!
//! SQLite calls are blocking, so the async operations run them on tokio's
//! blocking pool and race them against cancellation. Result sets are read
//! into memory while the connection lock is held.
//!
//! An in-memory database lives only as long as its physical connection, so
//! that connection is created eagerly and kept when the open count drops to
//! zero. File databases are physically closed at zero.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::Connection;
use rusqlite::types::{Value as SqliteValue, ValueRef};
use strata_common::types::Value;
use strata_common::utils::error::{Error, Result};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::connection::{BufferedReader, DataReader, DbCommand, RelationalConnection};
use crate::sql::literal::{DATE_TIME_FORMAT, DATE_TIME_OFFSET_FORMAT};

#[derive(Debug)]
struct Inner {
    connection: Option<Connection>,
    open_count: usize,
}

/// A SQLite database connection.
#[derive(Debug, Clone)]
pub struct SqliteConnection {
    inner: Arc<Mutex<Inner>>,
    path: Option<PathBuf>,
}

impl SqliteConnection {
    /// Creates a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let connection = Connection::open_in_memory().map_err(Error::execution)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                connection: Some(connection),
                open_count: 0,
            })),
            path: None,
        })
    }

    /// Creates a connection to a database file; nothing is opened yet.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                connection: None,
                open_count: 0,
            })),
            path: Some(path.as_ref().to_path_buf()),
        }
    }

    /// Database file path; `None` for in-memory databases.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn with_connection<T>(
        inner: &Mutex<Inner>,
        f: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        let guard = inner.lock();
        if guard.open_count == 0 {
            return Err(Error::Internal("connection is not open".to_string()));
        }
        let connection = guard
            .connection
            .as_ref()
            .ok_or_else(|| Error::Internal("connection is not open".to_string()))?;
        f(connection)
    }

    fn non_query(inner: &Mutex<Inner>, command: &DbCommand) -> Result<u64> {
        Self::with_connection(inner, |connection| {
            let mut statement = prepare(connection, command)?;
            let changed = statement.raw_execute().map_err(Error::execution)?;
            Ok(changed as u64)
        })
    }

    fn query(inner: &Mutex<Inner>, command: &DbCommand) -> Result<BufferedReader> {
        Self::with_connection(inner, |connection| {
            let mut statement = prepare(connection, command)?;
            let field_count = statement.column_count();
            let mut rows = statement.raw_query();
            let mut buffered = Vec::new();
            while let Some(row) = rows.next().map_err(Error::execution)? {
                let mut values = Vec::with_capacity(field_count);
                for i in 0..field_count {
                    values.push(from_sqlite(row.get_ref(i).map_err(Error::execution)?)?);
                }
                buffered.push(values);
            }
            Ok(BufferedReader::new(field_count, buffered))
        })
    }

    fn scalar(inner: &Mutex<Inner>, command: &DbCommand) -> Result<Value> {
        let mut reader = Self::query(inner, command)?;
        Ok(reader
            .next_row()?
            .and_then(|row| row.into_iter().next())
            .unwrap_or(Value::Null))
    }

    async fn run_blocking<T: Send + 'static>(
        cancel: &CancellationToken,
        f: impl FnOnce() -> Result<T> + Send + 'static,
    ) -> Result<T> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let task = tokio::task::spawn_blocking(f);
        tokio::select! {
            () = cancel.cancelled() => Err(Error::Cancelled),
            joined = task => joined
                .map_err(|e| Error::Internal(format!("blocking SQLite task failed: {e}")))?,
        }
    }
}

fn prepare<'c>(connection: &'c Connection, command: &DbCommand) -> Result<rusqlite::Statement<'c>> {
    let mut statement = connection.prepare(&command.text).map_err(Error::execution)?;
    for parameter in &command.parameters {
        let index = statement
            .parameter_index(&parameter.name)
            .map_err(Error::execution)?
            .ok_or_else(|| {
                Error::Internal(format!(
                    "parameter '{}' does not occur in the command text",
                    parameter.name
                ))
            })?;
        statement
            .raw_bind_parameter(index, to_sqlite(&parameter.value)?)
            .map_err(Error::execution)?;
    }
    Ok(statement)
}

fn to_sqlite(value: &Value) -> Result<SqliteValue> {
    Ok(match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(b) => SqliteValue::Integer(i64::from(*b)),
        Value::Int32(i) => SqliteValue::Integer(i64::from(*i)),
        Value::Int64(i) => SqliteValue::Integer(*i),
        Value::Decimal(d) => SqliteValue::Text(d.to_string()),
        Value::Float64(f) => SqliteValue::Real(*f),
        Value::String(s) => SqliteValue::Text(s.clone()),
        Value::Bytes(b) => SqliteValue::Blob(b.clone()),
        Value::DateTime(dt) => SqliteValue::Text(dt.format(DATE_TIME_FORMAT).to_string()),
        Value::DateTimeOffset(dt) => {
            SqliteValue::Text(dt.format(DATE_TIME_OFFSET_FORMAT).to_string())
        }
        Value::Guid(g) => SqliteValue::Text(g.to_string()),
        Value::List(_) => {
            return Err(Error::Generation(
                "list values cannot be bound as a single parameter".to_string(),
            ));
        }
    })
}

fn from_sqlite(value: ValueRef<'_>) -> Result<Value> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int64(i),
        ValueRef::Real(f) => Value::Float64(f),
        ValueRef::Text(bytes) => Value::String(
            String::from_utf8(bytes.to_vec()).map_err(|e| Error::Materialization(e.to_string()))?,
        ),
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    })
}

#[async_trait]
impl RelationalConnection for SqliteConnection {
    fn open(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.connection.is_none() {
            let path = self
                .path
                .as_ref()
                .ok_or_else(|| Error::Internal("in-memory database was dropped".to_string()))?;
            debug!(path = %path.display(), "Opening SQLite database");
            inner.connection = Some(Connection::open(path).map_err(Error::execution)?);
        }
        inner.open_count += 1;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.open_count == 0 {
            return Ok(());
        }
        inner.open_count -= 1;
        if inner.open_count == 0 && self.path.is_some() {
            if let Some(connection) = inner.connection.take() {
                connection.close().map_err(|(_, e)| Error::execution(e))?;
            }
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.inner.lock().open_count > 0
    }

    fn execute_non_query(&self, command: &DbCommand) -> Result<u64> {
        Self::non_query(&self.inner, command)
    }

    fn execute_scalar(&self, command: &DbCommand) -> Result<Value> {
        Self::scalar(&self.inner, command)
    }

    fn execute_reader(&self, command: &DbCommand) -> Result<Box<dyn DataReader>> {
        Ok(Box::new(Self::query(&self.inner, command)?))
    }

    async fn open_async(&self, cancel: &CancellationToken) -> Result<()> {
        let this = self.clone();
        Self::run_blocking(cancel, move || this.open()).await
    }

    async fn execute_non_query_async(
        &self,
        command: &DbCommand,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let inner = Arc::clone(&self.inner);
        let command = command.clone();
        Self::run_blocking(cancel, move || Self::non_query(&inner, &command)).await
    }

    async fn execute_scalar_async(
        &self,
        command: &DbCommand,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let inner = Arc::clone(&self.inner);
        let command = command.clone();
        Self::run_blocking(cancel, move || Self::scalar(&inner, &command)).await
    }

    async fn execute_reader_async(
        &self,
        command: &DbCommand,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn DataReader>> {
        let inner = Arc::clone(&self.inner);
        let command = command.clone();
        let reader = Self::run_blocking(cancel, move || Self::query(&inner, &command)).await?;
        Ok(Box::new(reader))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::connection::DbParameter;
    use tempfile::tempdir;

    fn parameter(name: &str, value: Value) -> DbParameter {
        DbParameter {
            name: name.to_string(),
            value,
            store_type: None,
            nullable: true,
        }
    }

    #[test]
    fn test_in_memory_survives_close() {
        let connection = SqliteConnection::open_in_memory().unwrap();
        connection.open().unwrap();
        connection
            .execute_non_query(&DbCommand::new("CREATE TABLE T (Id INTEGER, Name TEXT)"))
            .unwrap();
        connection.close().unwrap();
        assert!(!connection.is_open());

        connection.open().unwrap();
        let insert = DbCommand {
            text: "INSERT INTO T VALUES (@id, @name)".to_string(),
            parameters: vec![
                parameter("@id", Value::Int32(1)),
                parameter("@name", Value::from("Ann")),
            ],
        };
        assert_eq!(connection.execute_non_query(&insert).unwrap(), 1);
        let count = connection
            .execute_scalar(&DbCommand::new("SELECT COUNT(*) FROM T"))
            .unwrap();
        assert_eq!(count, Value::Int64(1));
        connection.close().unwrap();
    }

    #[test]
    fn test_requires_open() {
        let connection = SqliteConnection::open_in_memory().unwrap();
        let result = connection.execute_scalar(&DbCommand::new("SELECT 1"));
        assert!(matches!(result, Err(Error::Internal(_))));
    }

    #[test]
    fn test_file_database_closes_at_zero() {
        let dir = tempdir().unwrap();
        let connection = SqliteConnection::file(dir.path().join("test.db"));
        connection.open().unwrap();
        connection.open().unwrap();
        connection.close().unwrap();
        assert!(connection.is_open());
        connection.close().unwrap();
        assert!(!connection.is_open());
        assert!(connection.inner.lock().connection.is_none());
    }

    #[tokio::test]
    async fn test_async_reader() {
        let connection = SqliteConnection::open_in_memory().unwrap();
        let cancel = CancellationToken::new();
        connection.open_async(&cancel).await.unwrap();
        let mut reader = connection
            .execute_reader_async(&DbCommand::new("SELECT 1, 'x', NULL"), &cancel)
            .await
            .unwrap();
        assert_eq!(reader.field_count(), 3);
        assert_eq!(
            reader.next_row_async(&cancel).await.unwrap(),
            Some(vec![Value::Int64(1), Value::from("x"), Value::Null])
        );
        connection.close().unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let connection = SqliteConnection::open_in_memory().unwrap();
        connection.open().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = connection
            .execute_non_query_async(&DbCommand::new("SELECT 1"), &cancel)
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
