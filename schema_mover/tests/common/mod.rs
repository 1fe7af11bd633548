//! Scripted database adapter for integration tests
//!
//! [`FakeCatalog`] describes what a target database contains and answers the catalog
//! queries of both dialects; [`MockAdapter`] records executed statements and fails
//! the ones matching configured needles.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use schema_mover::schema::ColumnDefinition;
use schema_mover::{CatalogRow, DatabaseAdapter, Error, Result};

#[derive(Debug, Clone, Default)]
pub struct FakeCatalog {
    pub catalog: String,
    pub tables: Vec<(String, Vec<ColumnDefinition>)>,
    pub views: Vec<String>,
    /// name, `PROCEDURE`/`FUNCTION`, identity arguments
    pub routines: Vec<(String, String, Option<String>)>,
    /// name, table
    pub triggers: Vec<(String, String)>,
    /// table, name
    pub indexes: Vec<(String, String)>,
    /// table, name
    pub primary_keys: Vec<(String, String)>,
    /// table, name, referenced table
    pub foreign_keys: Vec<(String, String, String)>,
}

impl FakeCatalog {
    pub fn new(catalog: &str) -> Self {
        Self {
            catalog: catalog.to_string(),
            ..Default::default()
        }
    }

    pub fn table(mut self, name: &str, columns: Vec<ColumnDefinition>) -> Self {
        self.tables.push((name.to_string(), columns));
        self
    }

    pub fn view(mut self, name: &str) -> Self {
        self.views.push(name.to_string());
        self
    }

    pub fn procedure(mut self, name: &str) -> Self {
        self.routines
            .push((name.to_string(), "PROCEDURE".to_string(), None));
        self
    }

    pub fn function(mut self, name: &str, arguments: &str) -> Self {
        self.routines.push((
            name.to_string(),
            "FUNCTION".to_string(),
            Some(arguments.to_string()),
        ));
        self
    }

    pub fn trigger(mut self, name: &str, table: &str) -> Self {
        self.triggers.push((name.to_string(), table.to_string()));
        self
    }

    pub fn index(mut self, table: &str, name: &str) -> Self {
        self.indexes.push((table.to_string(), name.to_string()));
        self
    }

    pub fn primary_key(mut self, table: &str, name: &str) -> Self {
        self.primary_keys.push((table.to_string(), name.to_string()));
        self
    }

    pub fn foreign_key(mut self, table: &str, name: &str, references: &str) -> Self {
        self.foreign_keys
            .push((table.to_string(), name.to_string(), references.to_string()));
        self
    }

    /// Answer a catalog query the way the matching dialect expects
    pub fn respond(&self, sql: &str, params: &[&str]) -> Vec<CatalogRow> {
        let sql = sql.to_lowercase();
        let param = |i: usize| params.get(i).copied().unwrap_or_default();

        if sql.contains("database()") || sql.contains("current_schema()") {
            return vec![CatalogRow::new().with("name", &self.catalog)];
        }
        if param(0) != self.catalog {
            return Vec::new();
        }

        if sql.contains("information_schema.columns") || sql.contains("pg_attribute") {
            return self
                .tables
                .iter()
                .filter(|(name, _)| name == param(1))
                .flat_map(|(_, columns)| columns.iter().map(column_row))
                .collect();
        }
        if sql.contains("table_constraints") {
            let primary = self.primary_keys.iter().map(|(table, name)| {
                CatalogRow::new()
                    .with("table_name", table)
                    .with("name", name)
                    .with("constraint_type", "PRIMARY KEY")
            });
            let foreign = self.foreign_keys.iter().map(|(table, name, _)| {
                CatalogRow::new()
                    .with("table_name", table)
                    .with("name", name)
                    .with("constraint_type", "FOREIGN KEY")
            });
            return primary.chain(foreign).collect();
        }
        if sql.contains("key_column_usage") || sql.contains("confrelid") {
            return self
                .foreign_keys
                .iter()
                .filter(|(_, _, referenced)| referenced == param(1))
                .map(|(table, name, _)| {
                    CatalogRow::new().with("table_name", table).with("name", name)
                })
                .collect();
        }
        if sql.contains("information_schema.statistics") || sql.contains("pg_index x") {
            return self
                .indexes
                .iter()
                .map(|(table, name)| CatalogRow::new().with("table_name", table).with("name", name))
                .collect();
        }
        if sql.contains("information_schema.routines") || sql.contains("pg_proc") {
            return self
                .routines
                .iter()
                .map(|(name, kind, arguments)| {
                    let row = CatalogRow::new().with("name", name).with("routine_type", kind);
                    match arguments {
                        Some(arguments) => row.with("arguments", arguments),
                        None => row.with_null("arguments"),
                    }
                })
                .collect();
        }
        if sql.contains("information_schema.triggers") {
            return self
                .triggers
                .iter()
                .map(|(name, table)| CatalogRow::new().with("name", name).with("table_name", table))
                .collect();
        }
        if sql.contains("information_schema.views") {
            return self
                .views
                .iter()
                .map(|name| CatalogRow::new().with("name", name))
                .collect();
        }
        if sql.contains("information_schema.tables") {
            return self
                .tables
                .iter()
                .map(|(name, _)| CatalogRow::new().with("name", name))
                .collect();
        }
        Vec::new()
    }
}

/// Row carrying both dialects' column metadata
fn column_row(column: &ColumnDefinition) -> CatalogRow {
    let row = CatalogRow::new()
        .with("name", &column.name)
        .with("column_type", &column.sql_type)
        .with("is_nullable", if column.nullable { "YES" } else { "NO" })
        .with("extra", if column.is_serial { "auto_increment" } else { "" })
        .with("column_key", if column.is_primary_key { "PRI" } else { "" })
        .with("is_identity", if column.is_serial { "YES" } else { "NO" })
        .with("is_primary_key", if column.is_primary_key { "YES" } else { "NO" });
    match &column.default_value {
        Some(default) => row.with("column_default", default),
        None => row.with_null("column_default"),
    }
}

/// In-memory adapter backed by a [`FakeCatalog`]
pub struct MockAdapter {
    catalog: FakeCatalog,
    failures: Vec<String>,
    executed: Mutex<Vec<String>>,
    queries: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl MockAdapter {
    pub fn new(catalog: FakeCatalog) -> Self {
        Self {
            catalog,
            failures: Vec::new(),
            executed: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Make every statement containing `needle` fail
    pub fn failing_on(mut self, needle: &str) -> Self {
        self.failures.push(needle.to_string());
        self
    }

    /// Statements that were attempted, in order, including failed ones
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DatabaseAdapter for MockAdapter {
    async fn query(&self, sql: &str, params: &[&str]) -> Result<Vec<CatalogRow>> {
        self.queries.lock().unwrap().push(sql.to_string());
        Ok(self.catalog.respond(sql, params))
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        self.executed.lock().unwrap().push(sql.to_string());
        if self.failures.iter().any(|needle| sql.contains(needle.as_str())) {
            return Err(Error::DatabaseError(format!("refused: {}", sql)));
        }
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Columns of the `test` table used across scenarios
pub fn test_table_columns() -> Vec<ColumnDefinition> {
    vec![
        ColumnDefinition::new("id", "int(11)")
            .nullable(false)
            .serial()
            .primary_key(),
        ColumnDefinition::new("bar", "varchar(255)"),
        ColumnDefinition::new("foo", "varchar(255)").default("'x'"),
    ]
}
