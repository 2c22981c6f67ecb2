//! Per-execution query state.

use strata_adapters::ParameterValues;
use strata_common::types::Value;
use tokio_util::sync::CancellationToken;

/// State owned by a single query execution.
///
/// Parameter extraction fills the parameter table; the executor binds it
/// into the generated command. A context is never shared between
/// executions.
#[derive(Debug, Default)]
pub struct QueryContext {
    parameters: ParameterValues,
    cancellation: CancellationToken,
}

impl QueryContext {
    /// Creates an empty context that is never cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty context observing `cancellation`.
    #[must_use]
    pub fn with_cancellation(cancellation: CancellationToken) -> Self {
        Self {
            parameters: ParameterValues::new(),
            cancellation,
        }
    }

    /// Records a parameter value.
    pub fn add_parameter(&mut self, name: impl Into<String>, value: Value) {
        self.parameters.insert(name.into(), value);
    }

    /// Number of recorded parameters.
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    /// Recorded parameter values, in extraction order.
    #[must_use]
    pub fn parameter_values(&self) -> &ParameterValues {
        &self.parameters
    }

    /// The cancellation signal checked at command execution.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}
