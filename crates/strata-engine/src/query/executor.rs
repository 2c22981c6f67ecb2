//! Query execution.
//!
//! Sequences are lazy: nothing touches the database until the first item
//! is requested, and failures surface from that point of enumeration. The
//! connection stays open while a reader is live and closes when the
//! sequence is exhausted, fails, or is dropped.

use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use futures::stream;
use strata_adapters::storage::connection::ScopedReader;
use strata_adapters::{DataReader, DbCommand, RelationalConnection, SqlDialect, SqlStatementExecutor};
use strata_common::types::{Value, ValueType};
use strata_common::utils::error::{Error, Result};
use strata_core::query_model::{NullResult, OutputInfo, SingleKind};
use strata_core::storage::{Materialize, ValueBuffer, ValueBufferFactory};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::compiler::CompiledQuery;
use super::context::QueryContext;

/// Runs compiled queries against a connection.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    connection: Arc<dyn RelationalConnection>,
    dialect: Arc<dyn SqlDialect>,
    statements: SqlStatementExecutor,
}

impl QueryExecutor {
    /// Creates an executor.
    #[must_use]
    pub fn new(
        connection: Arc<dyn RelationalConnection>,
        dialect: Arc<dyn SqlDialect>,
        statements: SqlStatementExecutor,
    ) -> Self {
        Self {
            connection,
            dialect,
            statements,
        }
    }

    /// Returns a lazy sequence over the query's rows.
    #[must_use]
    pub fn execute<T: Materialize>(
        &self,
        compiled: Arc<CompiledQuery>,
        context: QueryContext,
    ) -> QueryResults<T> {
        QueryResults {
            state: ReadState::Pending {
                executor: self.clone(),
                compiled,
                context,
            },
            _item: PhantomData,
        }
    }

    /// Executes a query that produces one value: an aggregate, an element
    /// operator, or the first row of a sequence.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] when the sequence is empty (or
    /// holds more than one element for `Single`), besides generation and
    /// execution errors.
    pub fn execute_single<T: Materialize>(
        &self,
        compiled: &CompiledQuery,
        context: &QueryContext,
    ) -> Result<T> {
        let (mut reader, factory) = self.open_reader(compiled, context)?;
        let mut rows = Vec::new();
        while let Some(raw) = reader.next_row()? {
            rows.push(factory.create(raw)?);
        }
        drop(reader);
        let row = single_row(&compiled.output, rows, factory.types().len())?;
        T::materialize(&row)
    }

    /// Returns a lazy async sequence over the query's rows.
    pub fn execute_async<T>(
        &self,
        compiled: Arc<CompiledQuery>,
        context: QueryContext,
    ) -> AsyncQueryResults<T>
    where
        T: Materialize + Send + 'static,
    {
        let initial = AsyncState::Pending {
            executor: self.clone(),
            compiled,
            context,
        };
        Box::pin(stream::unfold(initial, |state| async move {
            match state {
                AsyncState::Pending {
                    executor,
                    compiled,
                    context,
                } => match executor.open_reader_async(&compiled, &context).await {
                    Ok((reader, factory)) => {
                        next_async(reader, factory, context.cancellation().clone()).await
                    }
                    Err(e) => Some((Err(e), AsyncState::Done)),
                },
                AsyncState::Reading {
                    reader,
                    factory,
                    cancel,
                } => next_async(reader, factory, cancel).await,
                AsyncState::Done => None,
            }
        }))
    }

    /// Async [`execute_single`](Self::execute_single).
    ///
    /// # Errors
    ///
    /// As [`execute_single`](Self::execute_single), plus [`Error::Cancelled`].
    pub async fn execute_single_async<T: Materialize>(
        &self,
        compiled: &CompiledQuery,
        context: &QueryContext,
    ) -> Result<T> {
        let (mut reader, factory) = self.open_reader_async(compiled, context).await?;
        let mut rows = Vec::new();
        while let Some(raw) = reader.next_row_async(context.cancellation()).await? {
            rows.push(factory.create(raw)?);
        }
        drop(reader);
        let row = single_row(&compiled.output, rows, factory.types().len())?;
        T::materialize(&row)
    }

    /// Generates and binds the command for one execution.
    fn prepare(
        &self,
        compiled: &CompiledQuery,
        context: &QueryContext,
    ) -> Result<(DbCommand, ValueBufferFactory)> {
        let values = context.parameter_values();
        let generated = compiled.generate(values, self.dialect.as_ref())?;
        let command = generated
            .command
            .create_command(values, self.dialect.type_mapper())?;
        Ok((command, generated.value_buffer_factory))
    }

    fn open_reader(
        &self,
        compiled: &CompiledQuery,
        context: &QueryContext,
    ) -> Result<(ScopedReader, ValueBufferFactory)> {
        if context.cancellation().is_cancelled() {
            return Err(Error::Cancelled);
        }
        let (command, factory) = self.prepare(compiled, context)?;
        let reader = self.statements.execute_reader(&self.connection, &command)?;
        Ok((reader, factory))
    }

    async fn open_reader_async(
        &self,
        compiled: &CompiledQuery,
        context: &QueryContext,
    ) -> Result<(ScopedReader, ValueBufferFactory)> {
        let (command, factory) = self.prepare(compiled, context)?;
        let reader = self
            .statements
            .execute_reader_async(&self.connection, &command, context.cancellation())
            .await?;
        Ok((reader, factory))
    }
}

/// Lazy results of a synchronous query.
pub struct QueryResults<T> {
    state: ReadState,
    _item: PhantomData<fn() -> T>,
}

/// Lazy results of an async query.
pub type AsyncQueryResults<T> = Pin<Box<dyn Stream<Item = Result<T>> + Send>>;

enum ReadState {
    Pending {
        executor: QueryExecutor,
        compiled: Arc<CompiledQuery>,
        context: QueryContext,
    },
    Reading {
        reader: ScopedReader,
        factory: ValueBufferFactory,
    },
    Done,
}

impl<T: Materialize> Iterator for QueryResults<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match std::mem::replace(&mut self.state, ReadState::Done) {
                ReadState::Pending {
                    executor,
                    compiled,
                    context,
                } => match executor.open_reader(&compiled, &context) {
                    Ok((reader, factory)) => self.state = ReadState::Reading { reader, factory },
                    Err(e) => return Some(Err(e)),
                },
                ReadState::Reading { mut reader, factory } => {
                    // Leaving the state at Done drops the reader and closes
                    // the connection
                    return match reader.next_row() {
                        Ok(Some(raw)) => {
                            let item = factory.create(raw).and_then(|row| T::materialize(&row));
                            if item.is_ok() {
                                self.state = ReadState::Reading { reader, factory };
                            }
                            Some(item)
                        }
                        Ok(None) => None,
                        Err(e) => Some(Err(e)),
                    };
                }
                ReadState::Done => return None,
            }
        }
    }
}

impl<T> std::fmt::Debug for QueryResults<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            ReadState::Pending { .. } => "pending",
            ReadState::Reading { .. } => "reading",
            ReadState::Done => "done",
        };
        f.debug_struct("QueryResults").field("state", &state).finish()
    }
}

enum AsyncState {
    Pending {
        executor: QueryExecutor,
        compiled: Arc<CompiledQuery>,
        context: QueryContext,
    },
    Reading {
        reader: ScopedReader,
        factory: ValueBufferFactory,
        cancel: CancellationToken,
    },
    Done,
}

async fn next_async<T: Materialize>(
    mut reader: ScopedReader,
    factory: ValueBufferFactory,
    cancel: CancellationToken,
) -> Option<(Result<T>, AsyncState)> {
    match reader.next_row_async(&cancel).await {
        Ok(Some(raw)) => match factory.create(raw).and_then(|row| T::materialize(&row)) {
            Ok(item) => Some((
                Ok(item),
                AsyncState::Reading {
                    reader,
                    factory,
                    cancel,
                },
            )),
            Err(e) => Some((Err(e), AsyncState::Done)),
        },
        Ok(None) => None,
        Err(e) => Some((Err(e), AsyncState::Done)),
    }
}

/// Reduces the rows of a single-valued query to its result row.
fn single_row(output: &OutputInfo, rows: Vec<ValueBuffer>, width: usize) -> Result<ValueBuffer> {
    let count = rows.len();
    let mut rows = rows.into_iter();
    match output {
        OutputInfo::Single {
            value_type,
            kind: SingleKind::Aggregate { on_null },
        } => {
            let row = rows.next().unwrap_or_else(|| ValueBuffer::nulls(width));
            if !row.value(0).is_some_and(Value::is_null) {
                return Ok(row);
            }
            match on_null {
                NullResult::Null => Ok(row),
                NullResult::Zero => zero(value_type),
                NullResult::NoElements => Err(no_elements()),
            }
        }
        OutputInfo::Single {
            kind: SingleKind::First { or_default },
            ..
        } => first_or_default(rows.next(), *or_default, width),
        OutputInfo::Single {
            kind: SingleKind::Single { or_default },
            ..
        } => {
            if count > 1 {
                return Err(Error::InvalidOperation(
                    "Sequence contains more than one element".to_string(),
                ));
            }
            first_or_default(rows.next(), *or_default, width)
        }
        OutputInfo::Sequence { .. } => {
            debug!(rows = count, "Taking the first row of a sequence for a single result");
            first_or_default(rows.next(), false, width)
        }
    }
}

fn first_or_default(row: Option<ValueBuffer>, or_default: bool, width: usize) -> Result<ValueBuffer> {
    match row {
        Some(row) => Ok(row),
        None if or_default => Ok(ValueBuffer::nulls(width)),
        None => Err(no_elements()),
    }
}

fn zero(ty: &ValueType) -> Result<ValueBuffer> {
    ValueBufferFactory::new(vec![ty.clone()]).create(vec![Value::Int32(0)])
}

fn no_elements() -> Error {
    Error::InvalidOperation("Sequence contains no elements".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(value: Value) -> ValueBuffer {
        ValueBuffer::new(vec![value])
    }

    fn aggregate(value_type: ValueType, on_null: NullResult) -> OutputInfo {
        OutputInfo::Single {
            value_type,
            kind: SingleKind::Aggregate { on_null },
        }
    }

    #[test]
    fn test_sum_of_nothing_is_zero() {
        let output = aggregate(ValueType::Decimal, NullResult::Zero);
        let result = single_row(&output, vec![row(Value::Null)], 1).unwrap();
        assert_eq!(result.value(0), Some(&Value::Decimal(0.into())));
    }

    #[test]
    fn test_max_of_nothing_fails() {
        let output = aggregate(ValueType::Int32, NullResult::NoElements);
        let err = single_row(&output, vec![row(Value::Null)], 1).unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
    }

    #[test]
    fn test_nullable_aggregate_keeps_null() {
        let output = aggregate(ValueType::Int32.make_nullable(), NullResult::Null);
        let result = single_row(&output, vec![row(Value::Null)], 1).unwrap();
        assert_eq!(result.value(0), Some(&Value::Null));
    }

    #[test]
    fn test_single_rejects_two_rows() {
        let output = OutputInfo::Single {
            value_type: ValueType::Int32,
            kind: SingleKind::Single { or_default: true },
        };
        let err = single_row(&output, vec![row(1.into()), row(2.into())], 1).unwrap_err();
        assert_eq!(
            err.to_string(),
            Error::InvalidOperation("Sequence contains more than one element".to_string())
                .to_string()
        );
    }

    #[test]
    fn test_first_or_default_of_nothing_is_null() {
        let output = OutputInfo::Single {
            value_type: ValueType::String,
            kind: SingleKind::First { or_default: true },
        };
        let result = single_row(&output, Vec::new(), 2).unwrap();
        assert_eq!(result.len(), 2);
        assert!(result.values().iter().all(Value::is_null));

        let output = OutputInfo::Single {
            value_type: ValueType::String,
            kind: SingleKind::First { or_default: false },
        };
        assert!(single_row(&output, Vec::new(), 2).is_err());
    }
}
