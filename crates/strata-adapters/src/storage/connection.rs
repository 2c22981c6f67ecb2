//! Connection abstraction.
//!
//! A [`RelationalConnection`] is opened and closed in matched pairs; the
//! physical connection stays open while at least one scope holds it.
//! [`ConnectionScope`] pairs them automatically, closing on every exit path.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use strata_common::types::Value;
use strata_common::utils::error::{Error, Result};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// A bound parameter of a physical command.
#[derive(Debug, Clone, PartialEq)]
pub struct DbParameter {
    /// Name including the dialect prefix.
    pub name: String,
    /// Bound value.
    pub value: Value,
    /// Store type, when one could be determined.
    pub store_type: Option<&'static str>,
    /// Whether the parameter accepts null.
    pub nullable: bool,
}

/// A physical command: SQL text with bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct DbCommand {
    /// SQL text.
    pub text: String,
    /// Bound parameters.
    pub parameters: Vec<DbParameter>,
}

impl DbCommand {
    /// Creates a command without parameters.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: Vec::new(),
        }
    }

    /// Renders the command for logging.
    ///
    /// Parameter values are shown only when `sensitive` is set; otherwise
    /// every value renders as `'?'`.
    #[must_use]
    pub fn describe(&self, sensitive: bool) -> String {
        let parameters = self
            .parameters
            .iter()
            .map(|p| {
                let value = if sensitive {
                    format!("'{}'", p.value)
                } else {
                    "'?'".to_string()
                };
                match p.store_type {
                    Some(store_type) => format!("{}={value} ({store_type})", p.name),
                    None => format!("{}={value}", p.name),
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("[Parameters=[{parameters}]]\n{}", self.text)
    }
}

/// Forward-only access to the rows of a result set.
#[async_trait]
pub trait DataReader: Send {
    /// Number of columns per row.
    fn field_count(&self) -> usize;

    /// Advances to the next row; `None` at the end.
    fn next_row(&mut self) -> Result<Option<Vec<Value>>>;

    /// Advances to the next row, honouring cancellation.
    async fn next_row_async(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<Value>>> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.next_row()
    }
}

/// A reader over rows already fetched into memory.
#[derive(Debug, Default)]
pub struct BufferedReader {
    field_count: usize,
    rows: VecDeque<Vec<Value>>,
}

impl BufferedReader {
    /// Creates a reader over `rows`.
    #[must_use]
    pub fn new(field_count: usize, rows: Vec<Vec<Value>>) -> Self {
        Self {
            field_count,
            rows: rows.into(),
        }
    }
}

impl DataReader for BufferedReader {
    fn field_count(&self) -> usize {
        self.field_count
    }

    fn next_row(&mut self) -> Result<Option<Vec<Value>>> {
        Ok(self.rows.pop_front())
    }
}

/// A database connection commands execute on.
///
/// `open` and `close` nest: each `open` must be matched by one `close`, and
/// only the outermost pair touches the physical connection.
#[async_trait]
pub trait RelationalConnection: Send + Sync + fmt::Debug {
    /// Opens the connection or increments its open count.
    fn open(&self) -> Result<()>;

    /// Decrements the open count, closing the connection at zero.
    fn close(&self) -> Result<()>;

    /// Returns true while at least one open is outstanding.
    fn is_open(&self) -> bool;

    /// Executes a command that returns no rows.
    fn execute_non_query(&self, command: &DbCommand) -> Result<u64>;

    /// Executes a command and returns the first column of the first row.
    fn execute_scalar(&self, command: &DbCommand) -> Result<Value>;

    /// Executes a query.
    fn execute_reader(&self, command: &DbCommand) -> Result<Box<dyn DataReader>>;

    /// Async [`open`](Self::open).
    async fn open_async(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.open()
    }

    /// Async [`execute_non_query`](Self::execute_non_query).
    async fn execute_non_query_async(
        &self,
        command: &DbCommand,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.execute_non_query(command)
    }

    /// Async [`execute_scalar`](Self::execute_scalar).
    async fn execute_scalar_async(
        &self,
        command: &DbCommand,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.execute_scalar(command)
    }

    /// Async [`execute_reader`](Self::execute_reader).
    async fn execute_reader_async(
        &self,
        command: &DbCommand,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn DataReader>> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.execute_reader(command)
    }
}

/// Holds a connection open until dropped.
pub struct ConnectionScope {
    connection: Arc<dyn RelationalConnection>,
}

impl ConnectionScope {
    /// Opens `connection` for the lifetime of the scope.
    pub fn open(connection: &Arc<dyn RelationalConnection>) -> Result<Self> {
        connection.open()?;
        Ok(Self {
            connection: Arc::clone(connection),
        })
    }

    /// Async [`open`](Self::open).
    pub async fn open_async(
        connection: &Arc<dyn RelationalConnection>,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        connection.open_async(cancel).await?;
        Ok(Self {
            connection: Arc::clone(connection),
        })
    }

    /// The scoped connection.
    #[must_use]
    pub fn connection(&self) -> &dyn RelationalConnection {
        self.connection.as_ref()
    }
}

impl Drop for ConnectionScope {
    fn drop(&mut self) {
        if let Err(e) = self.connection.close() {
            warn!("Failed to close connection: {e}");
        }
    }
}

impl fmt::Debug for ConnectionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionScope")
            .field("connection", &self.connection)
            .finish()
    }
}

/// A reader that keeps its connection open until it is dropped.
pub struct ScopedReader {
    reader: Box<dyn DataReader>,
    // dropped after the reader
    _scope: ConnectionScope,
}

impl ScopedReader {
    /// Ties `reader` to `scope`.
    #[must_use]
    pub fn new(reader: Box<dyn DataReader>, scope: ConnectionScope) -> Self {
        Self {
            reader,
            _scope: scope,
        }
    }
}

#[async_trait]
impl DataReader for ScopedReader {
    fn field_count(&self) -> usize {
        self.reader.field_count()
    }

    fn next_row(&mut self) -> Result<Option<Vec<Value>>> {
        self.reader.next_row()
    }

    async fn next_row_async(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<Value>>> {
        self.reader.next_row_async(cancel).await
    }
}

impl fmt::Debug for ScopedReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedReader")
            .field("field_count", &self.reader.field_count())
            .finish_non_exhaustive()
    }
}
