//! Query processing pipeline.
//!
//! This module takes a caller's expression tree to rows:
//!
//! - **Evaluatable**: marks subtrees whose value is fixed for one execution
//! - **Parameter extractor**: replaces those subtrees with named parameters
//! - **Preprocessor**: runs both over an incoming expression
//! - **Parser**: turns operator chains into query models via the node-type registry
//! - **Translator**: maps query models onto relational select expressions
//! - **Cache**: compiled queries keyed by parameterized shape
//! - **Compiler**: orchestrates preprocessing, caching, parsing and translation
//! - **Executor**: generates, binds and runs commands, materializing results

pub mod cache;
pub mod compiler;
pub mod context;
pub mod evaluatable;
pub mod executor;
pub mod parameter_extractor;
pub mod parser;
pub mod preprocessor;
pub mod translator;

pub use cache::{CacheStats, CompiledQueryCache, cache_key};
pub use compiler::{CompiledQuery, QueryCompiler};
pub use context::QueryContext;
pub use evaluatable::{EvaluatableFilter, NullEvaluatableFilter, PartialEvaluationInfo};
pub use executor::{AsyncQueryResults, QueryExecutor, QueryResults};
pub use parameter_extractor::{PARAMETER_PREFIX, ParameterExtractor};
pub use parser::{NODE_TYPES, NodeTypeRegistry, QueryParser, parse_query};
pub use preprocessor::QueryPreprocessor;
pub use translator::RelationalTranslator;
