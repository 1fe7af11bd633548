//! PostgreSQL dialect

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{
    collapse_whitespace, column_values, constraints_from_rows, indexes_from_rows, mask_literals,
    referencing_from_rows, routines_from_rows, take_keyword, triggers_from_rows, Dialect,
    DialectKind, ScanOptions,
};
use crate::db::adapter::DatabaseAdapter;
use crate::error::{Error, Result};
use crate::schema::types::{
    ColumnDefinition, DesiredStatement, LiveConstraint, LiveIndex, LiveRoutine, LiveTrigger,
    StatementKind,
};

static SERIAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(SMALL|BIG)?SERIAL\b").unwrap());
static IDENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bGENERATED\s+(ALWAYS|BY\s+DEFAULT)\s+AS\s+IDENTITY(\s*\([^)]*\))?").unwrap()
});

const CURRENT_SCHEMA: &str = "SELECT current_schema()::text AS name";

const TABLES: &str = "SELECT table_name::text AS name
    FROM information_schema.tables
    WHERE table_schema = $1 AND table_type = 'BASE TABLE'
    ORDER BY table_name";

const VIEWS: &str = "SELECT table_name::text AS name
    FROM information_schema.views
    WHERE table_schema = $1
    ORDER BY table_name";

const ROUTINES: &str = "SELECT p.proname::text AS name,
        CASE p.prokind WHEN 'p' THEN 'PROCEDURE' ELSE 'FUNCTION' END AS routine_type,
        pg_get_function_identity_arguments(p.oid)::text AS arguments
    FROM pg_proc p
    JOIN pg_namespace n ON n.oid = p.pronamespace
    WHERE n.nspname = $1 AND p.prokind IN ('f', 'p')
        AND NOT EXISTS (
            SELECT 1 FROM pg_depend d WHERE d.objid = p.oid AND d.deptype = 'e'
        )
    ORDER BY p.proname";

const TRIGGERS: &str = "SELECT DISTINCT trigger_name::text AS name,
        event_object_table::text AS table_name
    FROM information_schema.triggers
    WHERE trigger_schema = $1
    ORDER BY 1";

const INDEXES: &str = "SELECT t.relname::text AS table_name, i.relname::text AS name
    FROM pg_index x
    JOIN pg_class i ON i.oid = x.indexrelid
    JOIN pg_class t ON t.oid = x.indrelid
    JOIN pg_namespace n ON n.oid = t.relnamespace
    WHERE n.nspname = $1 AND NOT x.indisprimary
        AND NOT EXISTS (
            SELECT 1 FROM pg_constraint c
            WHERE c.conindid = x.indexrelid AND c.contype IN ('p', 'u', 'x')
        )
    ORDER BY t.relname, i.relname";

const CONSTRAINTS: &str = "SELECT table_name::text AS table_name,
        constraint_name::text AS name, constraint_type::text AS constraint_type
    FROM information_schema.table_constraints
    WHERE constraint_schema = $1 AND constraint_type IN ('FOREIGN KEY', 'PRIMARY KEY')
    ORDER BY table_name, constraint_name";

const REFERENCING: &str = "SELECT DISTINCT t.relname::text AS table_name, c.conname::text AS name
    FROM pg_constraint c
    JOIN pg_class t ON t.oid = c.conrelid
    JOIN pg_class r ON r.oid = c.confrelid
    JOIN pg_namespace n ON n.oid = r.relnamespace
    WHERE c.contype = 'f' AND n.nspname = $1 AND r.relname = $2
    ORDER BY 1, 2";

const COLUMNS: &str = "SELECT a.attname::text AS name,
        format_type(a.atttypid, a.atttypmod)::text AS column_type,
        CASE WHEN a.attnotnull THEN 'NO' ELSE 'YES' END AS is_nullable,
        pg_get_expr(d.adbin, d.adrelid)::text AS column_default,
        CASE WHEN a.attidentity IN ('a', 'd') THEN 'YES' ELSE 'NO' END AS is_identity,
        CASE WHEN EXISTS (
            SELECT 1 FROM pg_index i
            WHERE i.indrelid = c.oid AND i.indisprimary AND a.attnum = ANY(i.indkey)
        ) THEN 'YES' ELSE 'NO' END AS is_primary_key
    FROM pg_attribute a
    JOIN pg_class c ON c.oid = a.attrelid
    JOIN pg_namespace n ON n.oid = c.relnamespace
    LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
    WHERE n.nspname = $1 AND c.relname = $2 AND a.attnum > 0 AND NOT a.attisdropped
    ORDER BY a.attnum";

/// PostgreSQL-family dialect: `SERIAL`, multi-clause `ALTER COLUMN`, plpgsql wrappers
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    pub fn new() -> Self {
        Self
    }

    /// Column type to declare when adding a serial column
    fn serial_type(sql_type: &str) -> String {
        match sql_type.to_lowercase().as_str() {
            "integer" | "int" | "int4" => "SERIAL".to_string(),
            "bigint" | "int8" => "BIGSERIAL".to_string(),
            "smallint" | "int2" => "SMALLSERIAL".to_string(),
            other => format!("{} GENERATED BY DEFAULT AS IDENTITY", other),
        }
    }
}

#[async_trait]
impl Dialect for PostgresDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            backslash_escapes: false,
            dollar_quotes: true,
        }
    }

    /// `SERIAL` variants are rewritten to their underlying integer type
    fn is_serial_column(&self, column: &mut String) -> bool {
        let masked = mask_literals(column);
        let replacement = SERIAL.captures(&masked).map(|caps| {
            let range = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
            let base = match caps.get(1).map(|m| m.as_str().to_uppercase()) {
                Some(prefix) if prefix == "BIG" => "bigint",
                Some(_) => "smallint",
                None => "integer",
            };
            (range, base)
        });
        if let Some((range, base)) = replacement {
            column.replace_range(range, base);
            *column = collapse_whitespace(column);
            return true;
        }
        take_keyword(column, &IDENTITY)
    }

    fn quote(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    fn add_column(&self, table: &str, column: &ColumnDefinition) -> String {
        let sql_type = if column.is_serial {
            Self::serial_type(&column.sql_type)
        } else {
            column.sql_type.clone()
        };
        let mut sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column.name, sql_type);
        if !column.nullable {
            sql.push_str(" NOT NULL");
        }
        if let (Some(default), false) = (&column.default_value, column.is_serial) {
            sql.push_str(&format!(" DEFAULT {}", default));
        }
        if column.is_primary_key {
            sql.push_str(" PRIMARY KEY");
        }
        sql
    }

    fn alter_column(&self, table: &str, column: &ColumnDefinition) -> Vec<String> {
        let name = &column.name;
        let mut clauses = vec![format!(
            "ALTER COLUMN {} TYPE {} USING {}::{}",
            name, column.sql_type, name, column.sql_type
        )];
        clauses.push(if column.nullable {
            format!("ALTER COLUMN {} DROP NOT NULL", name)
        } else {
            format!("ALTER COLUMN {} SET NOT NULL", name)
        });
        // serial columns keep their sequence default
        if !column.is_serial {
            clauses.push(match &column.default_value {
                Some(default) => format!("ALTER COLUMN {} SET DEFAULT {}", name, default),
                None => format!("ALTER COLUMN {} DROP DEFAULT", name),
            });
        }
        vec![format!("ALTER TABLE {} {}", table, clauses.join(", "))]
    }

    fn drop_constraint_statement(&self, table: &str, constraint: &str) -> String {
        format!("ALTER TABLE {} DROP CONSTRAINT IF EXISTS {}", table, constraint)
    }

    fn drop_index_statement(&self, _table: &str, index: &str) -> String {
        format!("DROP INDEX IF EXISTS {}", index)
    }

    fn drop_if_exists(&self, statement: &DesiredStatement) -> Option<String> {
        match statement.kind {
            StatementKind::View => Some(format!("DROP VIEW IF EXISTS {} CASCADE", statement.name)),
            StatementKind::Routine(kind) => Some(format!(
                "DROP {} IF EXISTS {} CASCADE",
                kind.keyword(),
                statement.name
            )),
            StatementKind::Trigger => Some(match &statement.table {
                Some(table) => format!("DROP TRIGGER IF EXISTS {} ON {}", statement.name, table),
                None => format!("DROP TRIGGER IF EXISTS {}", statement.name),
            }),
            _ => None,
        }
    }

    fn drop_live_view(&self, name: &str) -> String {
        format!("DROP VIEW IF EXISTS {} CASCADE", name)
    }

    fn drop_live_routine(&self, routine: &LiveRoutine) -> String {
        format!(
            "DROP {} IF EXISTS {}({}) CASCADE",
            routine.kind.keyword(),
            routine.name,
            routine.arguments.as_deref().unwrap_or_default()
        )
    }

    fn drop_live_trigger(&self, trigger: &LiveTrigger) -> String {
        format!("DROP TRIGGER IF EXISTS {} ON {}", trigger.name, trigger.table)
    }

    fn wrap_conditional(&self, sql: &str, temp_name: &str) -> Vec<String> {
        vec![
            format!("DROP FUNCTION IF EXISTS {}()", temp_name),
            format!(
                "CREATE FUNCTION {}() RETURNS void AS $body$\nBEGIN\n{};\nEND;\n$body$ LANGUAGE plpgsql",
                temp_name, sql
            ),
            format!("SELECT {}()", temp_name),
            format!("DROP FUNCTION {}()", temp_name),
        ]
    }

    async fn current_catalog(&self, db: &dyn DatabaseAdapter) -> Result<String> {
        let rows = db.query(CURRENT_SCHEMA, &[]).await?;
        rows.first()
            .and_then(|row| row.get("name"))
            .map(str::to_string)
            .ok_or_else(|| Error::IntrospectionError("no current schema".to_string()))
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
                let default = row.get("column_default");
                let is_serial = row.get("is_identity") == Some("YES")
                    || default.map_or(false, |d| d.starts_with("nextval("));
                Ok(ColumnDefinition {
                    name: row.require("name")?.to_string(),
                    sql_type: row.require("column_type")?.to_string(),
                    nullable: row.get("is_nullable") != Some("NO"),
                    default_value: if is_serial {
                        None
                    } else {
                        default.map(str::to_string)
                    },
                    is_serial,
                    is_primary_key: row.get("is_primary_key") == Some("YES"),
                    references: None,
                })
            })
            .collect()
    }
}
