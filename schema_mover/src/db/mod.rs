//! Database module for SchemaMover
//!
//! This module handles the adapter boundary, connections and plan execution.

pub mod adapter;
pub mod connection;
pub mod executor;

// Re-export key types
pub use adapter::{CatalogRow, DatabaseAdapter};
pub use connection::DatabaseConnection;
pub use executor::{ExecutionReport, PlanExecutor};
