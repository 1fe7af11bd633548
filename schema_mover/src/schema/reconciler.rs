//! Reconciliation engine
//!
//! Builds the ordered plan that converges a live database on the desired schema:
//!
//! 1. drop recreatable objects (keys, indexes, views, routines, triggers)
//! 2. create missing tables and diff the columns of existing ones
//! 3. recreate views, routines, triggers and indexes from the desired schema
//! 4. replay bare `ALTER TABLE`, conditional and data statements
//! 5. drop live tables the desired schema no longer declares
//!
//! Dialect session statements bracket the five phases. Later phases rely on earlier
//! ones having run, so the plan is strictly a sequence.

use std::collections::HashMap;
use tracing::{debug, info};

use super::types::{
    ColumnDefinition, DesiredSchema, DesiredStatement, LiveObjectKind, LiveSchema, Phase,
    ReconciliationPlan, StatementKind,
};
use crate::dialect::Dialect;
use crate::utils::naming::{IgnoreRules, TempNameGenerator};

pub struct ReconciliationEngine<'a> {
    dialect: &'a dyn Dialect,
    ignore: IgnoreRules,
    temp_names: TempNameGenerator,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(dialect: &'a dyn Dialect, ignore: IgnoreRules) -> Self {
        Self {
            dialect,
            ignore,
            temp_names: TempNameGenerator::new(),
        }
    }

    /// Use a specific generator for the disposable routines wrapping conditionals
    pub fn with_temp_names(mut self, temp_names: TempNameGenerator) -> Self {
        self.temp_names = temp_names;
        self
    }

    /// Build the plan for one run
    pub fn plan(&self, desired: &DesiredSchema, live: &LiveSchema) -> ReconciliationPlan {
        let mut plan = ReconciliationPlan::new();

        plan.extend(Phase::Setup, self.dialect.session_setup());
        self.drop_recreatables(live, &mut plan);
        self.reconcile_tables(desired, live, &mut plan);
        self.recreate_objects(desired, &mut plan);
        self.replay_statements(desired, &mut plan);
        self.drop_obsolete_tables(desired, live, &mut plan);
        plan.extend(Phase::Teardown, self.dialect.session_teardown());

        for (phase, count) in plan.phase_counts() {
            debug!(phase = %phase, operations = count, "Planned phase");
        }
        info!(operations = plan.len(), "Reconciliation plan built");
        plan
    }

    fn is_ignored(&self, name: &str) -> bool {
        self.ignore.matches(name)
    }

    /// Phase 1: every live key, index, view, routine and trigger, whether or not it is still wanted
    fn drop_recreatables(&self, live: &LiveSchema, plan: &mut ReconciliationPlan) {
        for constraint in &live.constraints {
            if self.is_ignored(&constraint.name) || self.is_ignored(&constraint.table) {
                debug!(
                    constraint = %constraint.name,
                    table = %constraint.table,
                    "Ignoring constraint"
                );
                continue;
            }
            plan.push(
                Phase::DropRecreatables,
                self.dialect
                    .drop_constraint_statement(&constraint.table, &constraint.name),
            );
        }

        for index in &live.indexes {
            if self.is_ignored(&index.name) || self.is_ignored(&index.table) {
                debug!(index = %index.name, table = %index.table, "Ignoring index");
                continue;
            }
            plan.push(
                Phase::DropRecreatables,
                self.dialect.drop_index_statement(&index.table, &index.name),
            );
        }

        for object in live
            .objects
            .iter()
            .filter(|o| o.kind != LiveObjectKind::Table)
        {
            if self.is_ignored(&object.name) {
                debug!(name = %object.name, "Ignoring live object");
                continue;
            }
            plan.extend(Phase::DropRecreatables, object.drop_statements.iter().cloned());
        }
    }

    /// Phase 2: create missing tables verbatim and diff columns of existing ones by name
    fn reconcile_tables(
        &self,
        desired: &DesiredSchema,
        live: &LiveSchema,
        plan: &mut ReconciliationPlan,
    ) {
        for table in desired.tables() {
            if !live.has_table(&table.name) {
                plan.push(Phase::ReconcileTables, table.raw_sql.clone());
                continue;
            }
            if self.is_ignored(&table.name) {
                debug!(table = %table.name, "Ignoring existing table");
                continue;
            }
            let Some(desired_columns) = &table.columns else {
                debug!(table = %table.name, "No column list to diff");
                continue;
            };
            let Some(live_columns) = live.columns.get(&table.name) else {
                debug!(table = %table.name, "Live columns were not loaded");
                continue;
            };
            self.diff_columns(table, desired_columns, live_columns, plan);
        }
    }

    fn diff_columns(
        &self,
        table: &DesiredStatement,
        desired: &[ColumnDefinition],
        live: &[ColumnDefinition],
        plan: &mut ReconciliationPlan,
    ) {
        let name = table.name.as_str();
        let desired_by_name: HashMap<String, &ColumnDefinition> = desired
            .iter()
            .map(|c| (c.name.to_lowercase(), c))
            .collect();
        let live_by_name: HashMap<String, &ColumnDefinition> =
            live.iter().map(|c| (c.name.to_lowercase(), c)).collect();

        for column in live {
            if !desired_by_name.contains_key(&column.name.to_lowercase()) {
                plan.push(
                    Phase::ReconcileTables,
                    self.dialect.drop_column(name, &column.name),
                );
            }
        }

        for column in desired {
            if live_by_name.contains_key(&column.name.to_lowercase()) {
                plan.extend(Phase::ReconcileTables, self.dialect.alter_column(name, column));
                if column.is_primary_key {
                    plan.push(
                        Phase::ReconcileTables,
                        self.dialect.add_primary_key(name, &column.name),
                    );
                }
            } else {
                plan.push(Phase::ReconcileTables, self.dialect.add_column(name, column));
            }
        }

        // keys dropped in phase 1 come back from the desired definition
        for column in desired {
            if let Some(references) = &column.references {
                plan.push(
                    Phase::ReconcileTables,
                    self.dialect.add_foreign_key(name, &column.name, references),
                );
            }
        }
        for clause in &table.constraints {
            plan.push(
                Phase::ReconcileTables,
                self.dialect.add_table_constraint(name, clause),
            );
        }
    }

    /// Phase 3: `DROP ... IF EXISTS` then the verbatim definition, in source order
    fn recreate_objects(&self, desired: &DesiredSchema, plan: &mut ReconciliationPlan) {
        for statement in desired.hoisted() {
            if self.is_ignored(&statement.name) {
                debug!(name = %statement.name, kind = %statement.kind, "Ignoring desired object");
                continue;
            }
            if let Some(drop) = self.dialect.drop_if_exists(statement) {
                plan.push(Phase::RecreateObjects, drop);
            }
            plan.push(Phase::RecreateObjects, statement.raw_sql.clone());
        }
    }

    /// Phase 4: one-shot statements in source order; conditionals run inside a disposable routine
    fn replay_statements(&self, desired: &DesiredSchema, plan: &mut ReconciliationPlan) {
        for statement in desired.one_shots() {
            match statement.kind {
                StatementKind::Conditional => {
                    let temp_name = self.temp_names.next_name();
                    plan.extend(
                        Phase::ReplayStatements,
                        self.dialect.wrap_conditional(&statement.raw_sql, &temp_name),
                    );
                }
                _ => plan.push(Phase::ReplayStatements, statement.raw_sql.clone()),
            }
        }
    }

    /// Phase 5: cascading drops of live tables that are neither desired nor ignored
    fn drop_obsolete_tables(
        &self,
        desired: &DesiredSchema,
        live: &LiveSchema,
        plan: &mut ReconciliationPlan,
    ) {
        for table in live.tables() {
            let wanted = desired
                .tables()
                .any(|t| t.name.eq_ignore_ascii_case(&table.name));
            if wanted {
                continue;
            }
            if self.is_ignored(&table.name) {
                debug!(table = %table.name, "Ignoring obsolete table");
                continue;
            }
            plan.extend(Phase::DropObsoleteTables, table.drop_statements.iter().cloned());
        }
    }
}
