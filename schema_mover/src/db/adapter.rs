//! Database adapter boundary
//!
//! The reconciler only ever talks to a database through [`DatabaseAdapter`]: catalog
//! queries come back as [`CatalogRow`]s of optional text values, and plan statements
//! are executed one at a time.

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::error::{Error, Result};

/// Query execution and connection lifecycle for one target
#[async_trait]
pub trait DatabaseAdapter: Send + Sync {
    /// Run a catalog query with positional text parameters
    async fn query(&self, sql: &str, params: &[&str]) -> Result<Vec<CatalogRow>>;

    /// Execute a single statement, discarding any result
    async fn execute(&self, sql: &str) -> Result<()>;

    /// Release the connection
    async fn close(&self);
}

/// One catalog row, every value decoded as optional text and keyed by lower-case column label
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogRow {
    values: IndexMap<String, Option<String>>,
}

impl CatalogRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style non-null value, mostly for scripted adapters
    pub fn with(mut self, column: &str, value: impl Into<String>) -> Self {
        self.insert(column, Some(value.into()));
        self
    }

    pub fn with_null(mut self, column: &str) -> Self {
        self.insert(column, None);
        self
    }

    pub fn insert(&mut self, column: &str, value: Option<String>) {
        self.values.insert(column.to_lowercase(), value);
    }

    /// Value of a column, `None` when absent or SQL NULL
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values
            .get(&column.to_lowercase())
            .and_then(|v| v.as_deref())
    }

    /// Value of a column that must be present and non-null
    pub fn require(&self, column: &str) -> Result<&str> {
        self.get(column).ok_or_else(|| {
            Error::IntrospectionError(format!("catalog row has no value for `{}`", column))
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Option<String>)> for CatalogRow {
    fn from_iter<I: IntoIterator<Item = (K, Option<String>)>>(iter: I) -> Self {
        let mut row = CatalogRow::new();
        for (column, value) in iter {
            row.insert(&column.into(), value);
        }
        row
    }
}
