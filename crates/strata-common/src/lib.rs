//! # strata-common
//!
//! Foundation layer for Strata: values, types, errors, and text utilities.
//!
//! This crate provides the fundamental building blocks used by all other
//! Strata crates. It has no internal dependencies and should be kept minimal.
//!
//! ## Modules
//!
//! - [`types`] - Runtime values ([`Value`]) and their static types ([`ValueType`])
//! - [`utils`] - Utility functions and helpers (errors, hashing, SQL text building)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod types;
pub mod utils;

// Re-export commonly used types at crate root
pub use types::{Value, ValueType};
pub use utils::error::{Error, MetadataError, Result};
pub use utils::strings::IndentedStringBuilder;
