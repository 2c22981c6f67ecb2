//! Query preprocessing: evaluability analysis followed by parameter extraction.

use std::sync::Arc;

use strata_common::utils::error::Result;
use strata_core::expression::Expr;

use super::context::QueryContext;
use super::evaluatable::{EvaluatableFilter, NullEvaluatableFilter, PartialEvaluationInfo};
use super::parameter_extractor::ParameterExtractor;

/// Turns a caller's expression into its parameterized shape.
#[derive(Clone)]
pub struct QueryPreprocessor {
    filter: Arc<dyn EvaluatableFilter>,
}

impl QueryPreprocessor {
    /// Creates a preprocessor with a custom evaluatable filter.
    #[must_use]
    pub fn new(filter: Arc<dyn EvaluatableFilter>) -> Self {
        Self { filter }
    }

    /// Extracts every closed subtree of `expr` into `context`'s parameters.
    ///
    /// # Errors
    ///
    /// Returns a parameterization error when a closed subtree fails to
    /// evaluate.
    pub fn preprocess(&self, expr: &Expr, context: &mut QueryContext) -> Result<Expr> {
        let info = PartialEvaluationInfo::analyze(expr, self.filter.as_ref());
        ParameterExtractor::new(&info, context).extract(expr)
    }
}

impl Default for QueryPreprocessor {
    fn default() -> Self {
        Self::new(Arc::new(NullEvaluatableFilter))
    }
}

impl std::fmt::Debug for QueryPreprocessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryPreprocessor").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_common::types::ValueType;

    #[test]
    fn test_filter_keeps_function_calls() {
        struct KeepFunctions;
        impl EvaluatableFilter for KeepFunctions {
            fn is_evaluatable(&self, expr: &Expr) -> bool {
                !matches!(expr, Expr::Function { .. })
            }
        }

        let now = strata_core::ClientFunction::new("Now", |_| Ok(7.into()));
        let expr = Expr::parameter("x", ValueType::Int32)
            .eq(Expr::function(now, Vec::new(), ValueType::Int32));

        let mut context = QueryContext::new();
        let rewritten = QueryPreprocessor::default()
            .preprocess(&expr, &mut context)
            .unwrap();
        assert_eq!(rewritten.to_string(), "(x == __p_0)");

        let mut context = QueryContext::new();
        let kept = QueryPreprocessor::new(Arc::new(KeepFunctions))
            .preprocess(&expr, &mut context)
            .unwrap();
        assert_eq!(kept.to_string(), "(x == Now())");
        assert_eq!(context.parameter_count(), 0);
    }
}
