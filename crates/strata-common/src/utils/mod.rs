//! Utility functions and helpers.

pub mod error;
pub mod hash;
pub mod strings;
