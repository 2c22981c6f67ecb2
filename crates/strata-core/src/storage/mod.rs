//! Result rows and typed materialization.
//!
//! - [`buffer`] - One result row ([`ValueBuffer`]) and the factory that
//!   coerces raw driver values to the projected column types
//! - [`materialize`] - Conversions from values and rows into Rust types
//!
//! Drivers report a narrow set of storage classes (SQLite knows only
//! integers, reals, text, and blobs). The [`ValueBufferFactory`] built by
//! the SQL generator widens them back to the types the query projected, so
//! materialization never has to guess.

pub mod buffer;
pub mod materialize;

pub use buffer::{ValueBuffer, ValueBufferFactory};
pub use materialize::{FromValue, Materialize};
