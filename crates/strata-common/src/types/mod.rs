//! Core type definitions for Strata.
//!
//! - [`Value`]: a runtime scalar (or in-memory list) flowing through parameters and rows
//! - [`ValueType`]: the static type of a query expression node or column

mod value;
mod value_type;

pub use value::Value;
pub use value_type::ValueType;
