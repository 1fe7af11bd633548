//! Live schema introspection
//!
//! An [`Introspector`] is built for a single run. It asks the dialect's catalog queries
//! what exists in the target and precomputes a dependency-safe drop sequence for every
//! object it finds.

use tracing::{debug, info};

use super::types::{DesiredSchema, LiveObject, LiveObjectKind, LiveSchema};
use crate::db::adapter::DatabaseAdapter;
use crate::dialect::Dialect;
use crate::error::Result;

pub struct Introspector<'a> {
    db: &'a dyn DatabaseAdapter,
    dialect: &'a dyn Dialect,
    catalog: String,
}

impl<'a> Introspector<'a> {
    /// Resolve the connection's current catalog and build an introspector for it
    pub async fn new(db: &'a dyn DatabaseAdapter, dialect: &'a dyn Dialect) -> Result<Self> {
        let catalog = dialect.current_catalog(db).await?;
        debug!(catalog = %catalog, "Resolved current catalog");
        Ok(Self::with_catalog(db, dialect, &catalog))
    }

    pub fn with_catalog(
        db: &'a dyn DatabaseAdapter,
        dialect: &'a dyn Dialect,
        catalog: &str,
    ) -> Self {
        Self {
            db,
            dialect,
            catalog: catalog.to_string(),
        }
    }

    pub fn catalog(&self) -> &str {
        &self.catalog
    }

    /// Enumerate views, routines, triggers and base tables, in that order, plus the key
    /// constraints and indexes phase 1 drops.
    ///
    /// Each table's drop sequence starts with the foreign keys other tables hold on it.
    pub async fn enumerate(&self) -> Result<LiveSchema> {
        let db = self.db;
        let catalog = self.catalog.as_str();
        let mut objects = Vec::new();

        for view in self.dialect.list_views(db, catalog).await? {
            objects.push(LiveObject {
                drop_statements: vec![self.dialect.drop_live_view(&view)],
                name: view,
                kind: LiveObjectKind::View,
            });
        }

        for routine in self.dialect.list_routines(db, catalog).await? {
            objects.push(LiveObject {
                name: routine.name.clone(),
                kind: LiveObjectKind::Routine(routine.kind),
                drop_statements: vec![self.dialect.drop_live_routine(&routine)],
            });
        }

        for trigger in self.dialect.list_triggers(db, catalog).await? {
            objects.push(LiveObject {
                name: trigger.name.clone(),
                kind: LiveObjectKind::Trigger,
                drop_statements: vec![self.dialect.drop_live_trigger(&trigger)],
            });
        }

        for table in self.dialect.list_tables(db, catalog).await? {
            let mut drop_statements: Vec<String> = self
                .dialect
                .list_referencing_constraints(db, catalog, &table)
                .await?
                .iter()
                .map(|c| self.dialect.drop_constraint_statement(&c.table, &c.name))
                .collect();
            drop_statements.push(self.dialect.drop_table_statement(&table));
            objects.push(LiveObject {
                name: table,
                kind: LiveObjectKind::Table,
                drop_statements,
            });
        }

        let constraints = self.dialect.list_constraints(db, catalog).await?;
        let indexes = self.dialect.list_indexes(db, catalog).await?;

        info!(
            catalog = %catalog,
            objects = objects.len(),
            constraints = constraints.len(),
            indexes = indexes.len(),
            "Enumerated live schema"
        );

        Ok(LiveSchema {
            objects,
            constraints,
            indexes,
            ..Default::default()
        })
    }

    /// Read the columns of every live table the desired schema also declares
    pub async fn load_table_columns(
        &self,
        live: &mut LiveSchema,
        desired: &DesiredSchema,
    ) -> Result<()> {
        for table in desired.tables() {
            if live.columns.contains_key(&table.name) {
                continue;
            }
            let Some(live_name) = live.live_table_name(&table.name).map(str::to_string) else {
                continue;
            };
            let columns = self
                .dialect
                .get_table_columns(self.db, &self.catalog, &live_name)
                .await?;
            debug!(table = %table.name, columns = columns.len(), "Loaded live columns");
            live.columns.insert(table.name.clone(), columns);
        }
        Ok(())
    }

    /// Enumerate the live schema and load the columns the engine will diff
    pub async fn inspect(&self, desired: &DesiredSchema) -> Result<LiveSchema> {
        let mut live = self.enumerate().await?;
        self.load_table_columns(&mut live, desired).await?;
        Ok(live)
    }
}
