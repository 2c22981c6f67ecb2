//! SQL text generation and relational command plumbing.
//!
//! - [`dialect`] - Provider hooks: quoting, literals, paging, concatenation
//! - [`literal`] - Canonical literal rendering and parsing
//! - [`type_mapper`] - Store types for parameters and casts
//! - [`translators`] - Instance method and member translations to SQL functions
//! - [`null_semantics`] - Three-valued to two-valued predicate rewriting
//! - [`generator`] - The SELECT-tree to SQL text visitor
//! - [`command`] - Relational commands, parameter lists, and bound commands

pub mod command;
pub mod dialect;
pub mod generator;
pub mod literal;
pub mod null_semantics;
pub mod translators;
pub mod type_mapper;

use indexmap::IndexMap;
use strata_common::types::Value;

/// Runtime parameter values of one execution, keyed by parameter name
/// without the dialect prefix.
pub type ParameterValues = IndexMap<String, Value>;
