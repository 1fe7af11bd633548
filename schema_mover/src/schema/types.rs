//! Type definitions for desired and live schema objects, and the plan built from them

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Kind of stored routine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoutineKind {
    Procedure,
    Function,
}

impl RoutineKind {
    /// SQL keyword for this routine kind
    pub fn keyword(&self) -> &'static str {
        match self {
            RoutineKind::Procedure => "PROCEDURE",
            RoutineKind::Function => "FUNCTION",
        }
    }

    /// Parse a catalog `ROUTINE_TYPE` value
    pub fn from_catalog(value: &str) -> Option<Self> {
        match value.to_uppercase().as_str() {
            "PROCEDURE" => Some(RoutineKind::Procedure),
            "FUNCTION" => Some(RoutineKind::Function),
            _ => None,
        }
    }
}

/// Kind of a top-level statement found in the desired schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatementKind {
    Table,
    View,
    Routine(RoutineKind),
    Trigger,
    Index,
    Alter,
    Conditional,
    Data,
}

impl StatementKind {
    /// Views, routines, triggers and indexes are dropped and recreated on every run
    pub fn is_hoisted(&self) -> bool {
        matches!(
            self,
            StatementKind::View
                | StatementKind::Routine(_)
                | StatementKind::Trigger
                | StatementKind::Index
        )
    }

    /// Bare `ALTER TABLE`, conditionals and data statements are replayed once the
    /// structure is final
    pub fn is_one_shot(&self) -> bool {
        matches!(
            self,
            StatementKind::Alter | StatementKind::Conditional | StatementKind::Data
        )
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatementKind::Table => "TABLE",
            StatementKind::View => "VIEW",
            StatementKind::Routine(kind) => kind.keyword(),
            StatementKind::Trigger => "TRIGGER",
            StatementKind::Index => "INDEX",
            StatementKind::Alter => "ALTER",
            StatementKind::Conditional => "CONDITIONAL",
            StatementKind::Data => "DATA",
        };
        write!(f, "{}", s)
    }
}

/// A single column as declared in a `CREATE TABLE` body or read back from the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub sql_type: String,
    pub nullable: bool,
    /// SQL expression as it should appear after `DEFAULT`
    pub default_value: Option<String>,
    pub is_serial: bool,
    pub is_primary_key: bool,
    /// Everything after an inline `REFERENCES` keyword
    pub references: Option<String>,
}

impl ColumnDefinition {
    /// Create a new nullable column with the given name and type
    pub fn new(name: &str, sql_type: &str) -> Self {
        Self {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            nullable: true,
            default_value: None,
            is_serial: false,
            is_primary_key: false,
            references: None,
        }
    }

    /// Set whether the column is nullable
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Set a default expression for the column
    pub fn default(mut self, default: &str) -> Self {
        self.default_value = Some(default.to_string());
        self
    }

    pub fn serial(mut self) -> Self {
        self.is_serial = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }
}

/// One top-level statement hoisted out of the desired schema text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredStatement {
    pub kind: StatementKind,
    pub name: String,
    /// Verbatim statement text, without the trailing terminator
    pub raw_sql: String,
    /// Columns of a `CREATE TABLE`, in declaration order
    pub columns: Option<Vec<ColumnDefinition>>,
    /// Table-level key clauses of a `CREATE TABLE` (`PRIMARY KEY (..)`, `FOREIGN KEY ..`)
    pub constraints: Vec<String>,
    /// Table a trigger, index, `ALTER TABLE` or data statement operates on
    pub table: Option<String>,
}

impl DesiredStatement {
    /// Create a statement with no column or constraint information
    pub fn new(kind: StatementKind, name: &str, raw_sql: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
            raw_sql: raw_sql.to_string(),
            columns: None,
            constraints: Vec::new(),
            table: None,
        }
    }
}

/// The desired schema: every recognised statement, in source order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredSchema {
    pub statements: Vec<DesiredStatement>,
}

impl DesiredSchema {
    pub fn new(statements: Vec<DesiredStatement>) -> Self {
        Self { statements }
    }

    pub fn tables(&self) -> impl Iterator<Item = &DesiredStatement> {
        self.statements
            .iter()
            .filter(|s| s.kind == StatementKind::Table)
    }

    pub fn hoisted(&self) -> impl Iterator<Item = &DesiredStatement> {
        self.statements.iter().filter(|s| s.kind.is_hoisted())
    }

    pub fn one_shots(&self) -> impl Iterator<Item = &DesiredStatement> {
        self.statements.iter().filter(|s| s.kind.is_one_shot())
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Kind of an object present in the live database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiveObjectKind {
    Table,
    View,
    Routine(RoutineKind),
    Trigger,
}

/// An object currently present in the target database, with its precomputed drop statements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveObject {
    pub name: String,
    pub kind: LiveObjectKind,
    /// Dependency-safe drop sequence; for tables, referencing constraints come first
    pub drop_statements: Vec<String>,
}

/// A routine as listed by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveRoutine {
    pub kind: RoutineKind,
    pub name: String,
    /// Identity argument list, where the dialect needs it to address the routine
    pub arguments: Option<String>,
}

/// A trigger as listed by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveTrigger {
    pub name: String,
    pub table: String,
}

/// An index as listed by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveIndex {
    pub table: String,
    pub name: String,
}

/// Kind of key constraint dropped before table changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConstraintKind {
    ForeignKey,
    PrimaryKey,
}

impl ConstraintKind {
    pub fn from_catalog(value: &str) -> Option<Self> {
        match value.to_uppercase().as_str() {
            "FOREIGN KEY" => Some(ConstraintKind::ForeignKey),
            "PRIMARY KEY" => Some(ConstraintKind::PrimaryKey),
            _ => None,
        }
    }
}

/// A foreign or primary key constraint as listed by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveConstraint {
    pub table: String,
    pub name: String,
    pub kind: ConstraintKind,
}

/// Everything the introspector found in the target database
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveSchema {
    /// Views, routines, triggers and base tables, in enumeration order
    pub objects: Vec<LiveObject>,
    /// Key constraints, foreign keys first
    pub constraints: Vec<LiveConstraint>,
    pub indexes: Vec<LiveIndex>,
    /// Columns of live tables the desired schema also declares
    pub columns: HashMap<String, Vec<ColumnDefinition>>,
}

impl LiveSchema {
    pub fn tables(&self) -> impl Iterator<Item = &LiveObject> {
        self.objects
            .iter()
            .filter(|o| o.kind == LiveObjectKind::Table)
    }

    /// Live spelling of a table name; identifiers are compared case-insensitively
    pub fn live_table_name(&self, name: &str) -> Option<&str> {
        self.tables()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .map(|t| t.name.as_str())
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.live_table_name(name).is_some()
    }
}

/// Plan phase an operation belongs to, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    Setup,
    DropRecreatables,
    ReconcileTables,
    RecreateObjects,
    ReplayStatements,
    DropObsoleteTables,
    Teardown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Setup => "setup",
            Phase::DropRecreatables => "drop-recreatables",
            Phase::ReconcileTables => "reconcile-tables",
            Phase::RecreateObjects => "recreate-objects",
            Phase::ReplayStatements => "replay-statements",
            Phase::DropObsoleteTables => "drop-obsolete-tables",
            Phase::Teardown => "teardown",
        };
        write!(f, "{}", s)
    }
}

/// A single SQL statement of the plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub phase: Phase,
    pub sql: String,
    /// Failure is collected instead of aborting the run
    pub expected_to_fail: bool,
}

impl Operation {
    /// `ALTER` and `CREATE` statements may legitimately fail against objects already in shape
    pub fn new(phase: Phase, sql: impl Into<String>) -> Self {
        let sql = sql.into();
        let keyword = sql
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_uppercase();
        let expected_to_fail = keyword == "ALTER" || keyword == "CREATE";
        Self {
            phase,
            sql,
            expected_to_fail,
        }
    }
}

/// Ordered sequence of operations converging the live database on the desired schema
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationPlan {
    pub operations: Vec<Operation>,
}

impl ReconciliationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, phase: Phase, sql: impl Into<String>) {
        self.operations.push(Operation::new(phase, sql));
    }

    pub fn extend<I, S>(&mut self, phase: Phase, statements: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for sql in statements {
            self.push(phase, sql);
        }
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter()
    }

    /// Statement texts in plan order
    pub fn statements(&self) -> Vec<&str> {
        self.operations.iter().map(|op| op.sql.as_str()).collect()
    }

    /// Statement texts of a single phase, in plan order
    pub fn phase(&self, phase: Phase) -> Vec<&str> {
        self.operations
            .iter()
            .filter(|op| op.phase == phase)
            .map(|op| op.sql.as_str())
            .collect()
    }

    /// The plan as a script, every statement followed by `;`
    pub fn render(&self) -> String {
        self.operations
            .iter()
            .map(|op| format!("{};\n", op.sql))
            .collect()
    }

    /// Number of operations per phase, in phase order
    pub fn phase_counts(&self) -> Vec<(Phase, usize)> {
        let mut counts: Vec<(Phase, usize)> = Vec::new();
        for op in &self.operations {
            match counts.last_mut() {
                Some((phase, count)) if *phase == op.phase => *count += 1,
                _ => counts.push((op.phase, 1)),
            }
        }
        counts
    }
}
