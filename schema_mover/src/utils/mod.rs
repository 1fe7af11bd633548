//! Utilities for SchemaMover
//!
//! This module provides utility functions used across the library.

pub mod logging;
pub mod naming;

// Re-export key utility functions
pub use naming::{preview, unquote_identifier, IgnoreRules, TempNameGenerator};
