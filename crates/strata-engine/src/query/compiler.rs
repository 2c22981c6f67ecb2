//! Query compilation.
//!
//! Compiling runs preprocessing on every call, since captured values differ
//! between executions, and then looks the parameterized shape up in the
//! cache. Only a miss parses and translates.

use std::sync::Arc;

use strata_adapters::sql::translators::MethodCallTranslators;
use strata_adapters::{GeneratedSql, ParameterValues, SqlDialect, SqlGenerator};
use strata_common::utils::error::Result;
use strata_core::expression::Expr;
use strata_core::metadata::Model;
use strata_core::query_model::OutputInfo;
use strata_core::relational::SelectExpr;
use tracing::debug;

use super::cache::{CacheStats, CompiledQueryCache, cache_key};
use super::context::QueryContext;
use super::parser::parse_query;
use super::preprocessor::QueryPreprocessor;
use super::translator::RelationalTranslator;

/// A query shape ready for execution.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    /// The parsed query model, printed.
    pub shape: String,
    /// What the query returns.
    pub output: OutputInfo,
    /// The relational tree SQL is generated from.
    pub select: SelectExpr,
    /// Compiled for the async execution path.
    pub is_async: bool,
}

impl CompiledQuery {
    /// Generates the command for one execution.
    ///
    /// Generation is value-aware: comparisons against null parameters and
    /// list parameters are rewritten using `values`, so the text can differ
    /// between executions of the same compiled query.
    ///
    /// # Errors
    ///
    /// Returns a generation error when the tree has no SQL form in `dialect`.
    pub fn generate(&self, values: &ParameterValues, dialect: &dyn SqlDialect) -> Result<GeneratedSql> {
        SqlGenerator::new(dialect, values).generate(&self.select)
    }
}

/// Compiles and caches queries against one model.
pub struct QueryCompiler {
    model: Arc<Model>,
    dialect: Arc<dyn SqlDialect>,
    translators: Arc<MethodCallTranslators>,
    preprocessor: QueryPreprocessor,
    cache: CompiledQueryCache,
}

impl QueryCompiler {
    /// Creates a compiler with default translators and preprocessing.
    #[must_use]
    pub fn new(model: Arc<Model>, dialect: Arc<dyn SqlDialect>, cache_capacity: Option<usize>) -> Self {
        Self {
            model,
            dialect,
            translators: Arc::new(MethodCallTranslators::default()),
            preprocessor: QueryPreprocessor::default(),
            cache: CompiledQueryCache::new(cache_capacity),
        }
    }

    /// Replaces the method call translators.
    #[must_use]
    pub fn with_translators(mut self, translators: MethodCallTranslators) -> Self {
        self.translators = Arc::new(translators);
        self
    }

    /// Replaces the preprocessor.
    #[must_use]
    pub fn with_preprocessor(mut self, preprocessor: QueryPreprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    /// The model queries are compiled against.
    #[must_use]
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// The dialect commands are generated for.
    #[must_use]
    pub fn dialect(&self) -> &Arc<dyn SqlDialect> {
        &self.dialect
    }

    /// Cache counters.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Compiles `expr` for synchronous execution, recording its parameter
    /// values in `context`.
    ///
    /// # Errors
    ///
    /// Returns parameterization, parse, and translation errors.
    pub fn compile_query(&self, expr: &Expr, context: &mut QueryContext) -> Result<Arc<CompiledQuery>> {
        self.compile_cached(expr, context, false)
    }

    /// Compiles `expr` for async execution.
    ///
    /// Async entries are cached apart from sync ones.
    ///
    /// # Errors
    ///
    /// Returns parameterization, parse, and translation errors.
    pub fn compile_async_query(
        &self,
        expr: &Expr,
        context: &mut QueryContext,
    ) -> Result<Arc<CompiledQuery>> {
        self.compile_cached(expr, context, true)
    }

    fn compile_cached(
        &self,
        expr: &Expr,
        context: &mut QueryContext,
        is_async: bool,
    ) -> Result<Arc<CompiledQuery>> {
        let parameterized = self.preprocessor.preprocess(expr, context)?;
        let key = cache_key(&self.model, &parameterized, is_async);
        self.cache
            .get_or_add(&key, || self.compile(&parameterized, is_async))
    }

    fn compile(&self, expr: &Expr, is_async: bool) -> Result<CompiledQuery> {
        let query = parse_query(expr)?;
        let output = query.output_info();
        let select = RelationalTranslator::new(&self.model, self.dialect.as_ref(), &self.translators)
            .translate(&query)?;
        debug!(query = %query, is_async, "Compiled query model");
        Ok(CompiledQuery {
            shape: query.to_string(),
            output,
            select,
            is_async,
        })
    }
}

impl std::fmt::Debug for QueryCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCompiler")
            .field("model", &self.model.id())
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_adapters::SqliteDialect;
    use strata_common::types::{Value, ValueType};
    use strata_core::Queryable;

    fn model() -> Arc<Model> {
        let mut builder = Model::builder();
        builder.entity("Customer", |e| {
            e.property("Id", ValueType::Int32)
                .optional_property("Name", ValueType::String)
                .key(&["Id"]);
        });
        Arc::new(builder.build().unwrap())
    }

    fn compiler() -> QueryCompiler {
        QueryCompiler::new(model(), Arc::new(SqliteDialect::default()), None)
    }

    fn by_name(name: Option<&str>) -> Expr {
        let value = name.map_or(Value::Null, Value::from);
        Queryable::new(model(), "Customer")
            .filter(|c| c.get("Name").eq(Expr::capture_typed("name", value, ValueType::String)))
            .into_expr()
    }

    #[test]
    fn test_same_shape_compiles_once() {
        let compiler = compiler();
        let mut first = QueryContext::new();
        let a = compiler.compile_query(&by_name(Some("x")), &mut first).unwrap();
        let mut second = QueryContext::new();
        let b = compiler.compile_query(&by_name(Some("y")), &mut second).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(compiler.cache_stats().misses, 1);
        assert_eq!(
            second.parameter_values().get("__name_0"),
            Some(&Value::from("y"))
        );
    }

    #[test]
    fn test_async_is_cached_separately() {
        let compiler = compiler();
        let expr = by_name(Some("x"));
        let sync = compiler.compile_query(&expr, &mut QueryContext::new()).unwrap();
        let async_ = compiler.compile_async_query(&expr, &mut QueryContext::new()).unwrap();
        assert!(!sync.is_async);
        assert!(async_.is_async);
        assert_eq!(compiler.cache_stats().size, 2);
    }

    #[test]
    fn test_generation_depends_on_null_values() {
        let compiler = compiler();
        let dialect = SqliteDialect::default();

        let mut context = QueryContext::new();
        let compiled = compiler.compile_query(&by_name(None), &mut context).unwrap();
        let sql = compiled.generate(context.parameter_values(), &dialect).unwrap();
        assert!(sql.command.text().ends_with("WHERE \"c\".\"Name\" IS NULL"));

        let mut context = QueryContext::new();
        let compiled = compiler.compile_query(&by_name(Some("a")), &mut context).unwrap();
        let sql = compiled.generate(context.parameter_values(), &dialect).unwrap();
        assert!(sql.command.text().contains("\"c\".\"Name\" = @__name_0"));
    }
}
