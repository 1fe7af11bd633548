//! MySQL / MariaDB dialect

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{
    column_values, constraints_from_rows, indexes_from_rows, is_numeric_literal,
    referencing_from_rows, routines_from_rows, take_keyword, triggers_from_rows, Dialect,
    DialectKind, ScanOptions,
};
use crate::db::adapter::DatabaseAdapter;
use crate::error::{Error, Result};
use crate::schema::types::{
    ColumnDefinition, DesiredStatement, LiveConstraint, LiveIndex, LiveRoutine, LiveTrigger,
    StatementKind,
};

static AUTO_INCREMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bAUTO_INCREMENT\b").unwrap());

const CURRENT_DATABASE: &str = "SELECT DATABASE() AS name";

const TABLES: &str = "SELECT TABLE_NAME AS name
    FROM INFORMATION_SCHEMA.TABLES
    WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'
    ORDER BY TABLE_NAME";

const VIEWS: &str = "SELECT TABLE_NAME AS name
    FROM INFORMATION_SCHEMA.VIEWS
    WHERE TABLE_SCHEMA = ?
    ORDER BY TABLE_NAME";

const ROUTINES: &str = "SELECT ROUTINE_TYPE AS routine_type, ROUTINE_NAME AS name
    FROM INFORMATION_SCHEMA.ROUTINES
    WHERE ROUTINE_SCHEMA = ?
    ORDER BY ROUTINE_NAME";

const TRIGGERS: &str = "SELECT TRIGGER_NAME AS name, EVENT_OBJECT_TABLE AS table_name
    FROM INFORMATION_SCHEMA.TRIGGERS
    WHERE TRIGGER_SCHEMA = ?
    ORDER BY TRIGGER_NAME";

const INDEXES: &str = "SELECT DISTINCT TABLE_NAME AS table_name, INDEX_NAME AS name
    FROM INFORMATION_SCHEMA.STATISTICS
    WHERE TABLE_SCHEMA = ? AND INDEX_NAME <> 'PRIMARY' AND NON_UNIQUE = 1
    ORDER BY TABLE_NAME, INDEX_NAME";

const CONSTRAINTS: &str = "SELECT TABLE_NAME AS table_name, CONSTRAINT_NAME AS name,
        CONSTRAINT_TYPE AS constraint_type
    FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS
    WHERE CONSTRAINT_SCHEMA = ? AND CONSTRAINT_TYPE IN ('FOREIGN KEY', 'PRIMARY KEY')
    ORDER BY TABLE_NAME, CONSTRAINT_NAME";

const REFERENCING: &str = "SELECT DISTINCT TABLE_NAME AS table_name, CONSTRAINT_NAME AS name
    FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
    WHERE TABLE_SCHEMA = ? AND REFERENCED_TABLE_NAME = ?
    ORDER BY TABLE_NAME, CONSTRAINT_NAME";

const COLUMNS: &str = "SELECT COLUMN_NAME AS name, COLUMN_TYPE AS column_type,
        IS_NULLABLE AS is_nullable, COLUMN_DEFAULT AS column_default,
        EXTRA AS extra, COLUMN_KEY AS column_key
    FROM INFORMATION_SCHEMA.COLUMNS
    WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
    ORDER BY ORDINAL_POSITION";

/// MySQL-family dialect: `AUTO_INCREMENT`, `CHANGE COLUMN`, procedures for top-level control flow
#[derive(Debug, Clone, Default)]
pub struct MySqlDialect;

impl MySqlDialect {
    pub fn new() -> Self {
        Self
    }

    /// Render a catalog `COLUMN_DEFAULT` the way it would be written after `DEFAULT`
    fn live_default(&self, value: Option<&str>, extra: &str) -> Option<String> {
        let value = value?;
        if value.eq_ignore_ascii_case("NULL") {
            return None;
        }
        let expression = extra.to_uppercase().contains("DEFAULT_GENERATED")
            || value.to_uppercase().starts_with("CURRENT_TIMESTAMP")
            || value.starts_with('\'')
            || is_numeric_literal(value);
        if expression {
            Some(value.to_string())
        } else {
            Some(self.quote(value))
        }
    }

    fn column_clause(&self, column: &ColumnDefinition) -> String {
        let mut sql = format!("{} {}", column.name, column.sql_type);
        if !column.nullable {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &column.default_value {
            sql.push_str(&format!(" DEFAULT {}", default));
        }
        if column.is_serial {
            sql.push_str(" AUTO_INCREMENT");
        }
        sql
    }
}

#[async_trait]
impl Dialect for MySqlDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::MySql
    }

    fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            backslash_escapes: true,
            dollar_quotes: false,
        }
    }

    fn is_serial_column(&self, column: &mut String) -> bool {
        take_keyword(column, &AUTO_INCREMENT)
    }

    fn quote(&self, value: &str) -> String {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
    }

    fn add_column(&self, table: &str, column: &ColumnDefinition) -> String {
        let mut sql = format!("ALTER TABLE {} ADD COLUMN {}", table, self.column_clause(column));
        if column.is_primary_key {
            sql.push_str(" PRIMARY KEY");
        }
        sql
    }

    fn alter_column(&self, table: &str, column: &ColumnDefinition) -> Vec<String> {
        vec![format!(
            "ALTER TABLE {} CHANGE COLUMN {} {}",
            table,
            column.name,
            self.column_clause(column)
        )]
    }

    fn drop_constraint_statement(&self, table: &str, constraint: &str) -> String {
        if constraint.eq_ignore_ascii_case("PRIMARY") {
            format!("ALTER TABLE {} DROP PRIMARY KEY", table)
        } else {
            format!("ALTER TABLE {} DROP FOREIGN KEY {}", table, constraint)
        }
    }

    fn drop_index_statement(&self, table: &str, index: &str) -> String {
        format!("ALTER TABLE {} DROP INDEX {}", table, index)
    }

    fn drop_if_exists(&self, statement: &DesiredStatement) -> Option<String> {
        let keyword = match statement.kind {
            StatementKind::View => "VIEW",
            StatementKind::Routine(kind) => kind.keyword(),
            StatementKind::Trigger => "TRIGGER",
            _ => return None,
        };
        Some(format!("DROP {} IF EXISTS {}", keyword, statement.name))
    }

    fn drop_live_view(&self, name: &str) -> String {
        format!("DROP VIEW {}", name)
    }

    fn drop_live_routine(&self, routine: &LiveRoutine) -> String {
        format!("DROP {} {}", routine.kind.keyword(), routine.name)
    }

    fn drop_live_trigger(&self, trigger: &LiveTrigger) -> String {
        format!("DROP TRIGGER {}", trigger.name)
    }

    fn wrap_conditional(&self, sql: &str, temp_name: &str) -> Vec<String> {
        vec![
            format!("DROP PROCEDURE IF EXISTS {}", temp_name),
            format!("CREATE PROCEDURE {}()\nBEGIN\n{};\nEND", temp_name, sql),
            format!("CALL {}()", temp_name),
            format!("DROP PROCEDURE {}", temp_name),
        ]
    }

    fn session_setup(&self) -> Vec<String> {
        vec!["SET FOREIGN_KEY_CHECKS = 0".to_string()]
    }

    fn session_teardown(&self) -> Vec<String> {
        vec!["SET FOREIGN_KEY_CHECKS = 1".to_string()]
    }

    async fn current_catalog(&self, db: &dyn DatabaseAdapter) -> Result<String> {
        let rows = db.query(CURRENT_DATABASE, &[]).await?;
        rows.first()
            .and_then(|row| row.get("name"))
            .map(str::to_string)
            .ok_or_else(|| Error::IntrospectionError("no database selected".to_string()))
    }

    async fn list_tables(&self, db: &dyn DatabaseAdapter, catalog: &str) -> Result<Vec<String>> {
        column_values(&db.query(TABLES, &[catalog]).await?, "name")
    }

    async fn list_views(&self, db: &dyn DatabaseAdapter, catalog: &str) -> Result<Vec<String>> {
        column_values(&db.query(VIEWS, &[catalog]).await?, "name")
    }

    async fn list_routines(
        &self,
        db: &dyn DatabaseAdapter,
        catalog: &str,
    ) -> Result<Vec<LiveRoutine>> {
        routines_from_rows(&db.query(ROUTINES, &[catalog]).await?)
    }

    async fn list_triggers(
        &self,
        db: &dyn DatabaseAdapter,
        catalog: &str,
    ) -> Result<Vec<LiveTrigger>> {
        triggers_from_rows(&db.query(TRIGGERS, &[catalog]).await?)
    }

    async fn list_indexes(
        &self,
        db: &dyn DatabaseAdapter,
        catalog: &str,
    ) -> Result<Vec<LiveIndex>> {
        indexes_from_rows(&db.query(INDEXES, &[catalog]).await?)
    }

    async fn list_constraints(
        &self,
        db: &dyn DatabaseAdapter,
        catalog: &str,
    ) -> Result<Vec<LiveConstraint>> {
        constraints_from_rows(&db.query(CONSTRAINTS, &[catalog]).await?)
    }

    async fn list_referencing_constraints(
        &self,
        db: &dyn DatabaseAdapter,
        catalog: &str,
        table: &str,
    ) -> Result<Vec<LiveConstraint>> {
        referencing_from_rows(&db.query(REFERENCING, &[catalog, table]).await?, table)
    }

    async fn get_table_columns(
        &self,
        db: &dyn DatabaseAdapter,
        catalog: &str,
        table: &str,
    ) -> Result<Vec<ColumnDefinition>> {
        let rows = db.query(COLUMNS, &[catalog, table]).await?;
        rows.iter()
            .map(|row| {
                let extra = row.get("extra").unwrap_or_default();
                Ok(ColumnDefinition {
                    name: row.require("name")?.to_string(),
                    sql_type: row.require("column_type")?.to_string(),
                    nullable: row
                        .get("is_nullable")
                        .map_or(true, |v| v.eq_ignore_ascii_case("YES")),
                    default_value: self.live_default(row.get("column_default"), extra),
                    is_serial: extra.to_lowercase().contains("auto_increment"),
                    is_primary_key: row.get("column_key") == Some("PRI"),
                    references: None,
                })
            })
            .collect()
    }
}
