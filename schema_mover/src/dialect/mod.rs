//! Dialect capabilities
//!
//! Every vendor difference lives behind the [`Dialect`] trait: column keyword
//! detection, DDL rendering, conditional wrapping and catalog queries. Callers
//! select an implementation once with [`dialect_for`] and never branch on the
//! dialect afterwards.

pub mod mysql;
pub mod postgres;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::db::adapter::{CatalogRow, DatabaseAdapter};
use crate::error::{Error, Result};
use crate::schema::types::{
    ColumnDefinition, ConstraintKind, DesiredStatement, LiveConstraint, LiveIndex, LiveRoutine,
    LiveTrigger, RoutineKind,
};

pub use mysql::MySqlDialect;
pub use postgres::PostgresDialect;

/// Supported database families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    MySql,
    Postgres,
}

impl DialectKind {
    /// Infer the dialect from a DSN scheme (`mysql://`, `postgres://`) or a PDO-style
    /// prefix (`pgsql:`)
    pub fn from_dsn(dsn: &str) -> Result<Self> {
        let scheme = dsn
            .split_once(':')
            .map(|(scheme, _)| scheme)
            .unwrap_or_default();
        scheme.parse().map_err(|_| {
            Error::ConfigError(format!("Cannot infer a dialect from DSN `{}`", dsn))
        })
    }
}

impl FromStr for DialectKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(DialectKind::MySql),
            "postgres" | "postgresql" | "pgsql" | "pg" => Ok(DialectKind::Postgres),
            other => Err(Error::ConfigError(format!("Unsupported dialect: {}", other))),
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialectKind::MySql => write!(f, "mysql"),
            DialectKind::Postgres => write!(f, "postgres"),
        }
    }
}

/// Lexical rules the statement scanner needs to know about
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOptions {
    /// `\'` escapes a quote inside a string literal
    pub backslash_escapes: bool,
    /// `$tag$ ... $tag$` delimits a literal body
    pub dollar_quotes: bool,
}

/// Build the dialect for a kind
pub fn dialect_for(kind: DialectKind) -> Box<dyn Dialect> {
    match kind {
        DialectKind::MySql => Box::new(MySqlDialect::new()),
        DialectKind::Postgres => Box::new(PostgresDialect::new()),
    }
}

/// Per-family capability interface consulted by the extractor, introspector and engine
#[async_trait]
pub trait Dialect: Send + Sync {
    fn kind(&self) -> DialectKind;

    fn scan_options(&self) -> ScanOptions;

    /// Detect and remove the serial marker from a column clause
    fn is_serial_column(&self, column: &mut String) -> bool;

    /// Detect and remove `PRIMARY KEY` from a column clause
    fn is_primary_key_column(&self, column: &mut String) -> bool {
        take_keyword(column, &PRIMARY_KEY)
    }

    /// Detect and remove `NOT NULL` / `NULL` from a column clause
    fn is_nullable_column(&self, column: &mut String) -> bool {
        if take_keyword(column, &NOT_NULL) {
            return false;
        }
        take_keyword(column, &NULL);
        true
    }

    /// Extract and remove the `DEFAULT` expression from a column clause
    fn default_value(&self, column: &mut String) -> Option<String> {
        take_default(column)
    }

    /// Parse one column clause of a `CREATE TABLE` body
    fn parse_column(&self, clause: &str) -> Result<ColumnDefinition> {
        let mut text = clause.trim().to_string();
        // `ON DELETE SET DEFAULT` belongs to the reference, so it goes first
        let references = take_references(&mut text);
        let default_value = self.default_value(&mut text);
        let nullable = self.is_nullable_column(&mut text);
        let is_serial = self.is_serial_column(&mut text);
        let is_primary_key = self.is_primary_key_column(&mut text);
        take_keyword(&mut text, &UNIQUE);

        let (name, sql_type) = split_name(&text)
            .ok_or_else(|| Error::parse(clause, "column definition has no name"))?;
        if sql_type.is_empty() {
            return Err(Error::parse(clause, "column definition has no type"));
        }

        Ok(ColumnDefinition {
            name,
            sql_type,
            nullable: nullable && !is_primary_key,
            default_value,
            is_serial,
            is_primary_key,
            references,
        })
    }

    /// Quote a literal for use as a default value
    fn quote(&self, value: &str) -> String;

    fn add_column(&self, table: &str, column: &ColumnDefinition) -> String;

    fn alter_column(&self, table: &str, column: &ColumnDefinition) -> Vec<String>;

    fn drop_column(&self, table: &str, column: &str) -> String {
        format!("ALTER TABLE {} DROP COLUMN {}", table, column)
    }

    fn add_primary_key(&self, table: &str, column: &str) -> String {
        format!("ALTER TABLE {} ADD PRIMARY KEY({})", table, column)
    }

    fn add_foreign_key(&self, table: &str, column: &str, references: &str) -> String {
        format!(
            "ALTER TABLE {} ADD FOREIGN KEY ({}) REFERENCES {}",
            table, column, references
        )
    }

    /// Re-add a table-level key clause taken verbatim from a `CREATE TABLE` body
    fn add_table_constraint(&self, table: &str, clause: &str) -> String {
        format!("ALTER TABLE {} ADD {}", table, clause)
    }

    fn drop_constraint_statement(&self, table: &str, constraint: &str) -> String;

    fn drop_index_statement(&self, table: &str, index: &str) -> String;

    /// `DROP <kind> IF EXISTS` for a hoisted view, routine or trigger; `None` for indexes
    fn drop_if_exists(&self, statement: &DesiredStatement) -> Option<String>;

    fn drop_live_view(&self, name: &str) -> String;

    fn drop_live_routine(&self, routine: &LiveRoutine) -> String;

    fn drop_live_trigger(&self, trigger: &LiveTrigger) -> String;

    fn drop_table_statement(&self, table: &str) -> String {
        format!("DROP TABLE {} CASCADE", table)
    }

    /// Wrap a top-level conditional block in a disposable routine named `temp_name`:
    /// drop, create, call, drop again
    fn wrap_conditional(&self, sql: &str, temp_name: &str) -> Vec<String>;

    /// Statements run before the rest of the plan
    fn session_setup(&self) -> Vec<String> {
        Vec::new()
    }

    /// Statements run after the rest of the plan
    fn session_teardown(&self) -> Vec<String> {
        Vec::new()
    }

    /// Name of the catalog (database or schema) the connection works in
    async fn current_catalog(&self, db: &dyn DatabaseAdapter) -> Result<String>;

    async fn list_tables(&self, db: &dyn DatabaseAdapter, catalog: &str) -> Result<Vec<String>>;

    async fn list_views(&self, db: &dyn DatabaseAdapter, catalog: &str) -> Result<Vec<String>>;

    async fn list_routines(
        &self,
        db: &dyn DatabaseAdapter,
        catalog: &str,
    ) -> Result<Vec<LiveRoutine>>;

    async fn list_triggers(
        &self,
        db: &dyn DatabaseAdapter,
        catalog: &str,
    ) -> Result<Vec<LiveTrigger>>;

    async fn list_indexes(&self, db: &dyn DatabaseAdapter, catalog: &str)
        -> Result<Vec<LiveIndex>>;

    /// Foreign and primary keys, foreign keys first
    async fn list_constraints(
        &self,
        db: &dyn DatabaseAdapter,
        catalog: &str,
    ) -> Result<Vec<LiveConstraint>>;

    /// Foreign keys on other tables that reference `table`
    async fn list_referencing_constraints(
        &self,
        db: &dyn DatabaseAdapter,
        catalog: &str,
        table: &str,
    ) -> Result<Vec<LiveConstraint>>;

    async fn get_table_columns(
        &self,
        db: &dyn DatabaseAdapter,
        catalog: &str,
        table: &str,
    ) -> Result<Vec<ColumnDefinition>>;
}

static PRIMARY_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bPRIMARY\s+KEY\b").unwrap());
static NOT_NULL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bNOT\s+NULL\b").unwrap());
static NULL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bNULL\b").unwrap());
static UNIQUE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bUNIQUE(\s+KEY)?\b").unwrap());
static DEFAULT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bDEFAULT\s+").unwrap());
static REFERENCES: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bREFERENCES\s+").unwrap());
static REFERENCE_OPTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)^\s*(MATCH\s+(FULL|PARTIAL|SIMPLE)",
        r"|ON\s+(DELETE|UPDATE)\s+(CASCADE|RESTRICT|NO\s+ACTION|SET\s+NULL|SET\s+DEFAULT)",
        r"|NOT\s+DEFERRABLE|DEFERRABLE|INITIALLY\s+(DEFERRED|IMMEDIATE))\b",
    ))
    .unwrap()
});
static NUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?$").unwrap());

/// Copy of `text` with the inside of every quoted span blanked out.
///
/// Byte offsets are preserved, so a match found in the copy addresses the same span of
/// `text` while keywords written inside literals and quoted names never match.
pub(crate) fn mask_literals(text: &str) -> String {
    fn blank(masked: &mut String, c: char) {
        masked.extend(std::iter::repeat('_').take(c.len_utf8()));
    }

    let mut masked = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match quote {
            Some('\'') if c == '\\' => {
                masked.push('_');
                if let Some(escaped) = chars.next() {
                    blank(&mut masked, escaped);
                }
            }
            Some(q) if c == q => {
                if chars.peek() == Some(&q) {
                    chars.next();
                    masked.push_str("__");
                } else {
                    quote = None;
                    masked.push(c);
                }
            }
            Some(_) => blank(&mut masked, c),
            None => {
                if matches!(c, '\'' | '"' | '`') {
                    quote = Some(c);
                }
                masked.push(c);
            }
        }
    }
    masked
}

/// Remove the first match of `pattern` outside literals, reporting whether it matched
pub(crate) fn take_keyword(column: &mut String, pattern: &Regex) -> bool {
    let range = match pattern.find(&mask_literals(column)) {
        Some(m) => m.range(),
        None => return false,
    };
    column.replace_range(range, " ");
    *column = collapse_whitespace(column);
    true
}

/// Remove `DEFAULT <expr>` from `column` and return the expression.
///
/// The expression is a quoted literal, a parenthesised expression, or a bare token
/// optionally followed by a call's argument list; a trailing `::type` cast is kept.
/// `DEFAULT NULL` yields `None`.
pub(crate) fn take_default(column: &mut String) -> Option<String> {
    // `GENERATED BY DEFAULT AS IDENTITY` is not a default expression
    let masked = mask_literals(column);
    let (start, expr_start) = DEFAULT
        .find_iter(&masked)
        .find(|m| {
            let before = column[..m.start()].trim_end();
            !before.to_uppercase().ends_with(" BY")
        })
        .map(|m| (m.start(), m.end()))?;
    let rest = &column[expr_start..];
    let mut len = expression_len(rest);
    // casts such as '{}'::jsonb or 'x'::character varying
    while rest[len..].starts_with("::") {
        let cast = &rest[len + 2..];
        let mut cast_len = token_len(cast);
        if cast[cast_len..].starts_with('(') {
            cast_len += parenthesised_len(&cast[cast_len..]);
        }
        let mut tail = &cast[cast_len..];
        while let Some(word) = continuation_word(tail) {
            cast_len += word;
            tail = &cast[cast_len..];
        }
        len += 2 + cast_len;
    }

    let expression = rest[..len].trim().to_string();
    column.replace_range(start..expr_start + len, " ");
    *column = collapse_whitespace(column);

    if expression.is_empty() || expression.eq_ignore_ascii_case("NULL") {
        None
    } else {
        Some(expression)
    }
}

/// Remove an inline `REFERENCES` clause and return its target.
///
/// The target is the referenced table, its optional column list and any `MATCH`,
/// `ON DELETE`/`ON UPDATE` or deferral options; constraint words after it stay in `column`.
pub(crate) fn take_references(column: &mut String) -> Option<String> {
    let (start, target_start) = {
        let masked = mask_literals(column);
        let m = REFERENCES.find(&masked)?;
        (m.start(), m.end())
    };
    let rest = &column[target_start..];
    let mut len = match rest.chars().next() {
        Some(q @ ('`' | '"')) => rest[1..].find(q).map_or(rest.len(), |i| i + 2),
        _ => token_len(rest),
    };
    let list = rest[len..].trim_start();
    if list.starts_with('(') {
        len = rest.len() - list.len() + parenthesised_len(list);
    }
    while let Some(option) = REFERENCE_OPTION.find(&rest[len..]) {
        len += option.end();
    }

    let target = collapse_whitespace(&rest[..len]);
    column.replace_range(start..target_start + len, " ");
    *column = collapse_whitespace(column);
    if target.is_empty() {
        None
    } else {
        Some(target)
    }
}

fn expression_len(text: &str) -> usize {
    let bytes = text.as_bytes();
    match bytes.first() {
        Some(b'\'') => quoted_len(text),
        Some(b'(') => parenthesised_len(text),
        Some(_) => {
            let mut len = token_len(text);
            if text[len..].starts_with('(') {
                len += parenthesised_len(&text[len..]);
            }
            len
        }
        None => 0,
    }
}

fn quoted_len(text: &str) -> usize {
    let bytes = text.as_bytes();
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\'' if bytes.get(i + 1) == Some(&b'\'') => i += 2,
            b'\'' => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn parenthesised_len(text: &str) -> usize {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' => {
                i += quoted_len(&text[i..]);
                continue;
            }
            b'(' => depth += 1,
            b')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}

fn token_len(text: &str) -> usize {
    text.find(|c: char| c.is_whitespace() || c == '(' || c == ',' || c == ':')
        .unwrap_or(text.len())
}

/// Multi-word cast targets (`character varying`, `timestamp without time zone`)
fn continuation_word(tail: &str) -> Option<usize> {
    const WORDS: [&str; 6] = ["varying", "precision", "without", "with", "time", "zone"];
    let trimmed = tail.trim_start();
    let skipped = tail.len() - trimmed.len();
    if skipped == 0 {
        return None;
    }
    let word_len = token_len(trimmed);
    let word = &trimmed[..word_len];
    if WORDS.iter().any(|w| w.eq_ignore_ascii_case(word)) {
        Some(skipped + word_len)
    } else {
        None
    }
}

/// Split a remaining column clause into its unquoted name and its type text
pub(crate) fn split_name(text: &str) -> Option<(String, String)> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let name_len = match text.chars().next() {
        Some(q @ ('`' | '"')) => text[1..].find(q).map(|i| i + 2).unwrap_or(text.len()),
        _ => text.find(char::is_whitespace).unwrap_or(text.len()),
    };
    let name = crate::utils::naming::unquote_identifier(&text[..name_len]);
    let sql_type = collapse_whitespace(&text[name_len..]);
    Some((name, sql_type))
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn is_numeric_literal(value: &str) -> bool {
    NUMERIC.is_match(value)
}

/// Read a single text column from every row
pub(crate) fn column_values(rows: &[CatalogRow], column: &str) -> Result<Vec<String>> {
    rows.iter()
        .map(|row| row.require(column).map(str::to_string))
        .collect()
}

/// Rows with `name`, `routine_type` and an optional `arguments` column
pub(crate) fn routines_from_rows(rows: &[CatalogRow]) -> Result<Vec<LiveRoutine>> {
    rows.iter()
        .map(|row| {
            let routine_type = row.require("routine_type")?;
            let kind = RoutineKind::from_catalog(routine_type).ok_or_else(|| {
                Error::IntrospectionError(format!("unknown routine type `{}`", routine_type))
            })?;
            Ok(LiveRoutine {
                kind,
                name: row.require("name")?.to_string(),
                arguments: row.get("arguments").map(str::to_string),
            })
        })
        .collect()
}

pub(crate) fn triggers_from_rows(rows: &[CatalogRow]) -> Result<Vec<LiveTrigger>> {
    rows.iter()
        .map(|row| {
            Ok(LiveTrigger {
                name: row.require("name")?.to_string(),
                table: row.require("table_name")?.to_string(),
            })
        })
        .collect()
}

pub(crate) fn indexes_from_rows(rows: &[CatalogRow]) -> Result<Vec<LiveIndex>> {
    rows.iter()
        .map(|row| {
            Ok(LiveIndex {
                table: row.require("table_name")?.to_string(),
                name: row.require("name")?.to_string(),
            })
        })
        .collect()
}

/// Rows with `table_name`, `name` and `constraint_type`; foreign keys are ordered first
pub(crate) fn constraints_from_rows(rows: &[CatalogRow]) -> Result<Vec<LiveConstraint>> {
    let mut constraints = rows
        .iter()
        .map(|row| {
            let constraint_type = row.require("constraint_type")?;
            let kind = ConstraintKind::from_catalog(constraint_type).ok_or_else(|| {
                Error::IntrospectionError(format!(
                    "unexpected constraint type `{}`",
                    constraint_type
                ))
            })?;
            Ok(LiveConstraint {
                table: row.require("table_name")?.to_string(),
                name: row.require("name")?.to_string(),
                kind,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    constraints.sort_by_key(|c| c.kind);
    Ok(constraints)
}

/// Foreign keys on tables other than `table`, from rows with `table_name` and `name`
pub(crate) fn referencing_from_rows(
    rows: &[CatalogRow],
    table: &str,
) -> Result<Vec<LiveConstraint>> {
    let mut constraints = Vec::new();
    for row in rows {
        let owner = row.require("table_name")?;
        if owner == table {
            continue;
        }
        constraints.push(LiveConstraint {
            table: owner.to_string(),
            name: row.require("name")?.to_string(),
            kind: ConstraintKind::ForeignKey,
        });
    }
    Ok(constraints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("mysql://root@localhost/app", DialectKind::MySql)]
    #[case("mariadb://localhost/app", DialectKind::MySql)]
    #[case("postgres://localhost/app", DialectKind::Postgres)]
    #[case("postgresql://localhost/app", DialectKind::Postgres)]
    #[case("pgsql:dbname=app;host=localhost", DialectKind::Postgres)]
    #[case("mysql:dbname=app;host=localhost", DialectKind::MySql)]
    fn test_dialect_from_dsn(#[case] dsn: &str, #[case] expected: DialectKind) {
        assert_eq!(DialectKind::from_dsn(dsn).unwrap(), expected);
    }

    #[test]
    fn test_unknown_dialect() {
        assert!(DialectKind::from_dsn("sqlite://file.db").is_err());
        assert!(DialectKind::from_dsn("no scheme").is_err());
        assert!("oracle".parse::<DialectKind>().is_err());
    }

    #[rstest]
    #[case("x int DEFAULT 0 NOT NULL", Some("0"), "x int NOT NULL")]
    #[case("x varchar(10) NOT NULL DEFAULT 'a b'", Some("'a b'"), "x varchar(10) NOT NULL")]
    #[case("x text DEFAULT 'it''s'", Some("'it''s'"), "x text")]
    #[case("x timestamp DEFAULT now()", Some("now()"), "x timestamp")]
    #[case("x jsonb DEFAULT '{}'::jsonb NOT NULL", Some("'{}'::jsonb"), "x jsonb NOT NULL")]
    #[case(
        "x varchar DEFAULT 'a'::character varying",
        Some("'a'::character varying"),
        "x varchar"
    )]
    #[case("x int DEFAULT -1", Some("-1"), "x int")]
    #[case("x int DEFAULT (1 + 2)", Some("(1 + 2)"), "x int")]
    #[case("x int DEFAULT NULL", None, "x int")]
    #[case("x int COMMENT 'default 5' DEFAULT 6", Some("6"), "x int COMMENT 'default 5'")]
    #[case("x int", None, "x int")]
    fn test_take_default(
        #[case] input: &str,
        #[case] expected: Option<&str>,
        #[case] remaining: &str,
    ) {
        let mut column = input.to_string();
        assert_eq!(take_default(&mut column).as_deref(), expected);
        assert_eq!(column, remaining);
    }

    #[rstest]
    #[case(
        "owner int NOT NULL REFERENCES users(id) ON DELETE CASCADE",
        Some("users(id) ON DELETE CASCADE"),
        "owner int NOT NULL"
    )]
    #[case("owner int REFERENCES users(id) NOT NULL", Some("users(id)"), "owner int NOT NULL")]
    #[case(
        "owner int REFERENCES `users` (`id`) MATCH FULL ON DELETE NO ACTION UNIQUE",
        Some("`users` (`id`) MATCH FULL ON DELETE NO ACTION"),
        "owner int UNIQUE"
    )]
    #[case("note text DEFAULT 'references x'", None, "note text DEFAULT 'references x'")]
    fn test_take_references(
        #[case] input: &str,
        #[case] expected: Option<&str>,
        #[case] remaining: &str,
    ) {
        let mut column = input.to_string();
        assert_eq!(take_references(&mut column).as_deref(), expected);
        assert_eq!(column, remaining);
    }

    #[test]
    fn test_mask_literals_keeps_offsets() {
        let text = "a 'it\\'s é' \"Null\" `k` 'o''k' NULL";
        let masked = mask_literals(text);
        assert_eq!(masked.len(), text.len());
        assert_eq!(masked, "a '________' \"____\" `_` '____' NULL");
    }

    #[rstest]
    #[case("c int COMMENT 'never null'", false, "c int COMMENT 'never null'")]
    #[case("c int NOT NULL COMMENT 'may be null'", true, "c int COMMENT 'may be null'")]
    fn test_take_keyword_skips_literals(
        #[case] input: &str,
        #[case] matched: bool,
        #[case] remaining: &str,
    ) {
        let mut column = input.to_string();
        assert_eq!(take_keyword(&mut column, &NOT_NULL), matched);
        assert_eq!(column, remaining);
    }

    #[test]
    fn test_split_name() {
        assert_eq!(
            split_name("`order` int(11) unsigned"),
            Some(("order".to_string(), "int(11) unsigned".to_string()))
        );
        assert_eq!(
            split_name("\"Name\"   varchar(255)"),
            Some(("Name".to_string(), "varchar(255)".to_string()))
        );
        assert_eq!(split_name("   "), None);
    }
}
