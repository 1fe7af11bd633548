//! Schema extraction
//!
//! Turns desired-schema text into an ordered list of [`DesiredStatement`]s. Column
//! clauses are parsed through the dialect, which owns the vendor keywords
//! (`AUTO_INCREMENT`, `SERIAL`, ...).

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::{debug, warn};

use super::scanner::{split_statements, strip_comments};
use super::types::{DesiredSchema, DesiredStatement, RoutineKind, StatementKind};
use crate::dialect::{collapse_whitespace, Dialect, ScanOptions};
use crate::error::{Error, Result};
use crate::utils::logging::LOG_PREVIEW_CHARS;
use crate::utils::naming::{preview, unquote_identifier};

const NAME: &str = r#"((?:`[^`]+`|"[^"]+"|[\w$]+)(?:\s*\.\s*(?:`[^`]+`|"[^"]+"|[\w$]+))*)"#;

static CREATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?is)^CREATE\s+(?:OR\s+REPLACE\s+)?(?:ALGORITHM\s*=\s*\w+\s+)?(?:DEFINER\s*=\s*\S+\s+)?(?:SQL\s+SECURITY\s+\w+\s+)?(?:CONSTRAINT\s+)?(TABLE|VIEW|PROCEDURE|FUNCTION|TRIGGER|UNIQUE\s+INDEX|INDEX)\s+(?:CONCURRENTLY\s+)?(?:IF\s+NOT\s+EXISTS\s+)?{}",
        NAME
    ))
    .unwrap()
});
static ALTER_TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?is)^ALTER\s+TABLE\s+(?:ONLY\s+)?(?:IF\s+EXISTS\s+)?{}",
        NAME
    ))
    .unwrap()
});
static DATA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?is)^(?:INSERT\s+(?:IGNORE\s+)?(?:INTO\s+)?|REPLACE\s+(?:INTO\s+)?|UPDATE\s+(?:IGNORE\s+)?(?:ONLY\s+)?|DELETE\s+FROM\s+(?:ONLY\s+)?){}",
        NAME
    ))
    .unwrap()
});
static ON_TABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?is)\bON\s+(?:ONLY\s+)?{}", NAME)).unwrap());
static LEADING_WORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z_]+)(?:\s+([A-Za-z_]+))?").unwrap());

/// Column-list entries that declare keys or checks rather than columns
const CONSTRAINT_WORDS: [&str; 10] = [
    "CONSTRAINT", "PRIMARY", "FOREIGN", "UNIQUE", "INDEX", "KEY", "CHECK", "FULLTEXT", "SPATIAL",
    "EXCLUDE",
];

/// Extracts desired statements using one dialect's column rules
pub struct SchemaExtractor<'a> {
    dialect: &'a dyn Dialect,
}

impl<'a> SchemaExtractor<'a> {
    pub fn new(dialect: &'a dyn Dialect) -> Self {
        Self { dialect }
    }

    /// Strip comments, split into statements and classify each one.
    ///
    /// Fails on the first statement that has no recognised shape. Duplicate named
    /// statements are logged and the first occurrence is kept.
    pub fn extract(&self, text: &str) -> Result<DesiredSchema> {
        let options = self.dialect.scan_options();
        let text = strip_comments(text, options)?;
        let mut statements = Vec::new();
        let mut seen = HashSet::new();
        let mut conditionals = 0;

        for raw in split_statements(&text, options)? {
            let statement = self.classify(&raw, &mut conditionals)?;
            if !statement.kind.is_one_shot()
                && !seen.insert((statement.kind, statement.name.clone()))
            {
                warn!(
                    kind = %statement.kind,
                    name = %statement.name,
                    "Duplicate definition ignored; the first one wins"
                );
                continue;
            }
            debug!(
                kind = %statement.kind,
                name = %statement.name,
                "Extracted statement"
            );
            statements.push(statement);
        }

        Ok(DesiredSchema::new(statements))
    }

    fn classify(&self, raw: &str, conditionals: &mut usize) -> Result<DesiredStatement> {
        let (first, second) = leading_words(raw)
            .ok_or_else(|| Error::parse(raw, "statement does not start with a keyword"))?;

        match first.as_str() {
            "CREATE" => self.classify_create(raw),
            "ALTER" => {
                let caps = ALTER_TABLE.captures(raw).ok_or_else(|| {
                    Error::parse(raw, format!("unrecognised statement ALTER {}", second))
                })?;
                let table = unquote_identifier(&caps[1]);
                let mut statement = DesiredStatement::new(StatementKind::Alter, &table, raw);
                statement.table = Some(table);
                Ok(statement)
            }
            "IF" => {
                *conditionals += 1;
                Ok(DesiredStatement::new(
                    StatementKind::Conditional,
                    &format!("if_block_{}", conditionals),
                    raw,
                ))
            }
            "INSERT" | "REPLACE" | "UPDATE" | "DELETE" => {
                let table = DATA
                    .captures(raw)
                    .map(|caps| unquote_identifier(&caps[1]))
                    .ok_or_else(|| Error::parse(raw, "cannot determine the target table"))?;
                let mut statement = DesiredStatement::new(StatementKind::Data, &table, raw);
                statement.table = Some(table);
                Ok(statement)
            }
            _ if second.is_empty() => Err(Error::parse(raw, "expected a keyword pair")),
            _ => Err(Error::UnsupportedStatement {
                keyword: format!("{} {}", first, second),
                statement: preview(raw, LOG_PREVIEW_CHARS),
            }),
        }
    }

    fn classify_create(&self, raw: &str) -> Result<DesiredStatement> {
        let caps = CREATE
            .captures(raw)
            .ok_or_else(|| Error::parse(raw, "unrecognised CREATE statement"))?;
        let keyword = collapse_whitespace(&caps[1]).to_uppercase();
        let name = unquote_identifier(&caps[2]);
        let name_end = caps.get(2).map_or(0, |m| m.end());

        let kind = match keyword.as_str() {
            "TABLE" => StatementKind::Table,
            "VIEW" => StatementKind::View,
            "PROCEDURE" => StatementKind::Routine(RoutineKind::Procedure),
            "FUNCTION" => StatementKind::Routine(RoutineKind::Function),
            "TRIGGER" => StatementKind::Trigger,
            _ => StatementKind::Index,
        };
        let mut statement = DesiredStatement::new(kind, &name, raw);

        match kind {
            StatementKind::Table => self.parse_table_body(&mut statement, &raw[name_end..])?,
            StatementKind::Trigger | StatementKind::Index => {
                if kind == StatementKind::Index && name.eq_ignore_ascii_case("ON") {
                    return Err(Error::parse(raw, "index must be named"));
                }
                let table = ON_TABLE
                    .captures(&raw[name_end..])
                    .map(|caps| unquote_identifier(&caps[1]))
                    .ok_or_else(|| Error::parse(raw, format!("{} has no ON clause", keyword)))?;
                statement.table = Some(table);
            }
            _ => {}
        }

        Ok(statement)
    }

    /// Split the parenthesised body into column definitions and key clauses.
    ///
    /// A body that copies another table with `LIKE` lists only part of the columns, so such
    /// tables keep `columns` unset and are not diffed.
    fn parse_table_body(&self, statement: &mut DesiredStatement, rest: &str) -> Result<()> {
        let options = self.dialect.scan_options();
        let body = match parenthesised_body(rest, options) {
            Some(body) => body,
            None => {
                debug!(table = %statement.name, "Table has no column list; columns are not diffed");
                return Ok(());
            }
        };

        let entries: Vec<String> = split_top_level(body, options)
            .into_iter()
            .map(|entry| collapse_whitespace(&entry))
            .filter(|entry| !entry.is_empty())
            .collect();
        if entries.iter().any(|entry| first_word(entry) == "LIKE") {
            debug!(table = %statement.name, "Table is copied with LIKE; columns are not diffed");
            return Ok(());
        }

        let mut columns = Vec::new();
        for entry in entries {
            if CONSTRAINT_WORDS.contains(&first_word(&entry).as_str()) {
                if is_key_clause(&entry) {
                    statement.constraints.push(entry);
                }
                continue;
            }
            columns.push(self.dialect.parse_column(&entry)?);
        }
        statement.columns = Some(columns);
        Ok(())
    }
}

fn first_word(entry: &str) -> String {
    entry
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_uppercase()
}

fn leading_words(raw: &str) -> Option<(String, String)> {
    let caps = LEADING_WORDS.captures(raw.trim_start())?;
    let first = caps[1].to_uppercase();
    let second = caps
        .get(2)
        .map(|m| m.as_str().to_uppercase())
        .unwrap_or_default();
    Some((first, second))
}

/// Primary and foreign keys are re-added after phase 1 drops them; other clauses survive
fn is_key_clause(entry: &str) -> bool {
    let upper = entry.to_uppercase();
    let words: Vec<&str> = upper.split_whitespace().collect();
    match words.first().copied() {
        Some("PRIMARY") | Some("FOREIGN") => true,
        Some("CONSTRAINT") => matches!(words.get(2).copied(), Some("PRIMARY") | Some("FOREIGN")),
        _ => false,
    }
}

/// Text between the first `(` and its matching `)`
fn parenthesised_body(text: &str, options: ScanOptions) -> Option<&str> {
    let open = text.find('(')?;
    let head = text[..open].trim();
    // `CREATE TABLE t AS SELECT (...)`
    if !head.is_empty() {
        return None;
    }
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = open;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(b'\'') if b == b'\\' && options.backslash_escapes => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'\'' | b'"' | b'`' => quote = Some(b),
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(&text[open + 1..i]);
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    None
}

/// Split on commas outside parentheses and quotes
fn split_top_level(body: &str, options: ScanOptions) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        current.push(c);
        match quote {
            Some('\'') if c == '\\' && options.backslash_escapes => {
                current.extend(chars.next());
            }
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                ',' if depth == 0 => {
                    current.pop();
                    parts.push(std::mem::take(&mut current));
                }
                _ => {}
            },
        }
    }
    parts.push(current);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{MySqlDialect, PostgresDialect};
    use crate::schema::types::ColumnDefinition;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn extract_mysql(sql: &str) -> Result<DesiredSchema> {
        let dialect = MySqlDialect::new();
        SchemaExtractor::new(&dialect).extract(sql)
    }

    #[test]
    fn test_extract_table_columns() {
        let schema = extract_mysql(
            "-- users\nCREATE TABLE users (
                id int NOT NULL AUTO_INCREMENT PRIMARY KEY,
                name varchar(255) NOT NULL DEFAULT '',
                price decimal(10, 2) DEFAULT 0.00,
                owner int REFERENCES owners(id),
                UNIQUE KEY uniq_name (name),
                INDEX idx_price (price),
                CONSTRAINT fk_x FOREIGN KEY (owner) REFERENCES owners(id)
            ) ENGINE=InnoDB;",
        )
        .unwrap();

        assert_eq!(schema.statements.len(), 1);
        let table = &schema.statements[0];
        assert_eq!(table.kind, StatementKind::Table);
        assert_eq!(table.name, "users");
        assert_eq!(
            table.constraints,
            vec!["CONSTRAINT fk_x FOREIGN KEY (owner) REFERENCES owners(id)".to_string()]
        );

        let columns = table.columns.as_ref().unwrap();
        assert_eq!(
            columns[0],
            ColumnDefinition::new("id", "int").nullable(false).serial().primary_key()
        );
        assert_eq!(
            columns[1],
            ColumnDefinition::new("name", "varchar(255)").nullable(false).default("''")
        );
        assert_eq!(columns[2].sql_type, "decimal(10, 2)");
        assert_eq!(columns[2].default_value.as_deref(), Some("0.00"));
        assert_eq!(columns[3].references.as_deref(), Some("owners(id)"));
        assert_eq!(columns.len(), 4);
    }

    #[rstest]
    #[case("CREATE VIEW v AS SELECT 1", StatementKind::View, "v")]
    #[case("CREATE OR REPLACE VIEW `v2` AS SELECT 1", StatementKind::View, "v2")]
    #[case(
        "CREATE ALGORITHM=UNDEFINED DEFINER=`root`@`localhost` SQL SECURITY DEFINER VIEW v3 AS SELECT 1",
        StatementKind::View,
        "v3"
    )]
    #[case(
        "CREATE PROCEDURE p() BEGIN SELECT 1; END",
        StatementKind::Routine(RoutineKind::Procedure),
        "p"
    )]
    #[case(
        "CREATE DEFINER=CURRENT_USER FUNCTION f(a int) RETURNS int RETURN a",
        StatementKind::Routine(RoutineKind::Function),
        "f"
    )]
    #[case("CREATE TABLE IF NOT EXISTS db.t (id int)", StatementKind::Table, "t")]
    #[case("ALTER TABLE t ADD INDEX (a)", StatementKind::Alter, "t")]
    #[case("INSERT INTO t (a) VALUES (1)", StatementKind::Data, "t")]
    #[case("UPDATE t SET a = 1", StatementKind::Data, "t")]
    #[case("DELETE FROM t WHERE a = 1", StatementKind::Data, "t")]
    fn test_classify(#[case] sql: &str, #[case] kind: StatementKind, #[case] name: &str) {
        let schema = extract_mysql(sql).unwrap();
        assert_eq!(schema.statements[0].kind, kind);
        assert_eq!(schema.statements[0].name, name);
        assert_eq!(schema.statements[0].raw_sql, sql);
    }

    #[test]
    fn test_trigger_and_index_record_their_table() {
        let schema = extract_mysql(
            "CREATE TRIGGER trg BEFORE INSERT ON `test` FOR EACH ROW SET NEW.a = 1;
             CREATE UNIQUE INDEX idx_a ON test (a);",
        )
        .unwrap();
        assert_eq!(schema.statements[0].kind, StatementKind::Trigger);
        assert_eq!(schema.statements[0].table.as_deref(), Some("test"));
        assert_eq!(schema.statements[1].kind, StatementKind::Index);
        assert_eq!(schema.statements[1].name, "idx_a");
        assert_eq!(schema.statements[1].table.as_deref(), Some("test"));
    }

    #[test]
    fn test_conditionals_are_numbered_in_order() {
        let schema = extract_mysql(
            "IF 1 = 1 THEN SELECT 1; END IF;
             ALTER TABLE t ADD COLUMN x int;
             IF 2 = 2 THEN SELECT 2; END IF;",
        )
        .unwrap();
        let names: Vec<_> = schema.statements.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["if_block_1", "t", "if_block_2"]);
        assert_eq!(schema.one_shots().count(), 3);
    }

    #[test]
    fn test_duplicates_keep_the_first_definition() {
        let schema = extract_mysql(
            "CREATE TABLE t (a int);
             CREATE TABLE t (b int);
             CREATE VIEW v AS SELECT 1;
             CREATE VIEW v AS SELECT 2;",
        )
        .unwrap();
        assert_eq!(schema.statements.len(), 2);
        assert_eq!(schema.statements[0].raw_sql, "CREATE TABLE t (a int)");
        assert_eq!(schema.statements[1].raw_sql, "CREATE VIEW v AS SELECT 1");
    }

    #[test]
    fn test_malformed_statements_abort_extraction() {
        assert!(matches!(
            extract_mysql("CREATE TABLE a (id int); CREATE SEQUENCE s;"),
            Err(Error::ParseError { .. })
        ));
        assert!(matches!(
            extract_mysql("ALTER VIEW v AS SELECT 1;"),
            Err(Error::ParseError { .. })
        ));
        assert!(matches!(
            extract_mysql("(SELECT 1);"),
            Err(Error::ParseError { .. })
        ));
        assert!(matches!(
            extract_mysql("GRANT ALL ON t TO u;"),
            Err(Error::UnsupportedStatement { .. })
        ));
        assert!(matches!(
            extract_mysql("CREATE TRIGGER trg BEFORE INSERT;"),
            Err(Error::ParseError { .. })
        ));
    }

    #[test]
    fn test_postgres_functions_and_serials() {
        let dialect = PostgresDialect::new();
        let schema = SchemaExtractor::new(&dialect)
            .extract(
                "CREATE TABLE test (id SERIAL PRIMARY KEY, bar varchar(10) NOT NULL DEFAULT 'x'::character varying);
                 CREATE OR REPLACE FUNCTION touch() RETURNS trigger AS $$
                 BEGIN
                     NEW.bar := 'y';
                     RETURN NEW;
                 END;
                 $$ LANGUAGE plpgsql;
                 CREATE TRIGGER trg BEFORE UPDATE ON test FOR EACH ROW EXECUTE PROCEDURE touch();",
            )
            .unwrap();

        assert_eq!(schema.statements.len(), 3);
        let columns = schema.statements[0].columns.as_ref().unwrap();
        assert_eq!(
            columns[0],
            ColumnDefinition::new("id", "integer").nullable(false).serial().primary_key()
        );
        assert_eq!(
            columns[1].default_value.as_deref(),
            Some("'x'::character varying")
        );
        assert_eq!(
            schema.statements[1].kind,
            StatementKind::Routine(RoutineKind::Function)
        );
        assert_eq!(schema.statements[1].name, "touch");
        assert_eq!(schema.statements[2].table.as_deref(), Some("test"));
    }

    #[test]
    fn test_table_without_column_list() {
        let schema = extract_mysql("CREATE TABLE copy AS SELECT (1) AS a;").unwrap();
        assert_eq!(schema.statements[0].kind, StatementKind::Table);
        assert_eq!(schema.statements[0].columns, None);
    }

    #[rstest]
    #[case("CREATE TABLE t2 (LIKE t1 INCLUDING ALL);")]
    #[case("CREATE TABLE t2 (extra int, like t1);")]
    fn test_table_copied_with_like_is_not_diffed(#[case] sql: &str) {
        let dialect = PostgresDialect::new();
        let schema = SchemaExtractor::new(&dialect).extract(sql).unwrap();
        assert_eq!(schema.statements[0].name, "t2");
        assert_eq!(schema.statements[0].columns, None);
        assert!(schema.statements[0].constraints.is_empty());
    }

    #[test]
    fn test_backslash_escaped_quote_in_default() {
        let schema = extract_mysql(
            r"CREATE TABLE notes (
                title varchar(20) NOT NULL DEFAULT 'it\'s, (really) fine',
                body text,
                PRIMARY KEY (title)
            );",
        )
        .unwrap();
        let columns = schema.statements[0].columns.as_ref().unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(
            columns[0].default_value.as_deref(),
            Some(r"'it\'s, (really) fine'")
        );
        assert_eq!(columns[1], ColumnDefinition::new("body", "text"));
        assert_eq!(schema.statements[0].constraints, vec!["PRIMARY KEY (title)"]);
    }

    #[test]
    fn test_empty_schema() {
        assert!(extract_mysql("  -- nothing here\n").unwrap().is_empty());
    }
}
