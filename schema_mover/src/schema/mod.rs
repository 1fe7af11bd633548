//! Schema module for SchemaMover
//!
//! This module handles extraction of the desired schema, introspection of the live
//! one, and the plan that reconciles them.

pub mod extractor;
pub mod introspector;
pub mod reconciler;
pub mod scanner;
pub mod types;

// Re-export key types
pub use extractor::SchemaExtractor;
pub use introspector::Introspector;
pub use reconciler::ReconciliationEngine;
pub use types::{
    ColumnDefinition, DesiredSchema, DesiredStatement, LiveObject, LiveObjectKind, LiveSchema,
    Operation, Phase, ReconciliationPlan, RoutineKind, StatementKind,
};
