//! # strata-core
//!
//! Core data structures for the Strata query pipeline.
//!
//! ## Modules
//!
//! - [`expression`] - Query expression trees, the queryable builder, and local evaluation
//! - [`metadata`] - Entity/property/navigation metadata and its validating builder
//! - [`query_model`] - Clause-structured form of a parsed query
//! - [`relational`] - SQL-shaped intermediate tree consumed by the SQL generator
//! - [`storage`] - Result row buffers and typed materialization

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod expression;
pub mod metadata;
pub mod query_model;
pub mod relational;
pub mod storage;

pub use expression::{BinaryOp, ClientFunction, Expr, Queryable, Row, UnaryOp};
pub use metadata::{EntityType, Model, ModelBuilder, Navigation, Property};
pub use query_model::{NullResult, OutputInfo, QueryModel, ResultOperator, SingleKind};
pub use relational::{SelectExpr, SqlBinaryOp, SqlExpr, TableSource};
pub use storage::{FromValue, Materialize, ValueBuffer, ValueBufferFactory};
