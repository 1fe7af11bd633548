//! SchemaMover: reconciles live databases with a declarative SQL schema
//!
//! The desired schema is plain SQL: `CREATE TABLE`/`VIEW`/`PROCEDURE`/`FUNCTION`/`TRIGGER`/
//! `INDEX` statements plus one-shot `ALTER TABLE`, conditional and data statements.
//! SchemaMover introspects each target database, builds an ordered plan that brings
//! it in line with that schema, and either prints or executes the plan.

pub mod config;
pub mod db;
pub mod dialect;
pub mod error;
pub mod schema;
pub mod utils;

use futures::future::join_all;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

// Re-export main types for easier access
pub use config::{Config, TargetConfig};
pub use db::adapter::{CatalogRow, DatabaseAdapter};
pub use db::connection::DatabaseConnection;
pub use db::executor::{ExecutionReport, PlanExecutor};
pub use dialect::{dialect_for, Dialect, DialectKind};
pub use error::{Error, Result, SoftExecutionError};
pub use schema::{
    DesiredSchema, Introspector, Phase, ReconciliationEngine, ReconciliationPlan,
    SchemaExtractor,
};
pub use utils::naming::IgnoreRules;

/// Load a configuration file and prepare a client for one of its targets
pub fn init(config_path: impl AsRef<Path>, target: &str) -> Result<SchemaMover> {
    let config = config::load_from_file(config_path)?;
    SchemaMover::new(target, config.target(target)?, &config.base_dir)
}

/// What to do with each target's plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Build the plan and execute it
    Migrate,
    /// Build the plan and hand it back for printing
    Propose,
    /// Build the plan to prove the target and its schema are usable
    Test,
}

/// Successful result of a command against one target
#[derive(Debug)]
pub enum CommandOutput {
    Migrated(ExecutionReport),
    Proposed(ReconciliationPlan),
    Tested(Vec<(Phase, usize)>),
}

/// Result of a command against one named target
#[derive(Debug)]
pub struct TargetOutcome {
    pub target: String,
    pub result: Result<CommandOutput>,
}

impl TargetOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// The client for reconciling one target
pub struct SchemaMover {
    name: String,
    target: TargetConfig,
    base_dir: PathBuf,
    dialect: Box<dyn Dialect>,
    ignore: IgnoreRules,
}

impl SchemaMover {
    /// Validate a target's configuration and select its dialect
    pub fn new(name: &str, target: &TargetConfig, base_dir: &Path) -> Result<Self> {
        target.validate()?;
        let dialect = dialect_for(target.dialect_kind()?);
        let ignore = target.ignore_rules()?;

        Ok(Self {
            name: name.to_string(),
            target: target.clone(),
            base_dir: base_dir.to_path_buf(),
            dialect,
            ignore,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// Read the schema files in configured order and extract the desired statements
    pub fn load_desired_schema(&self) -> Result<DesiredSchema> {
        let paths = self.target.resolve_schema_paths(&self.base_dir)?;
        let mut text = String::new();
        for path in &paths {
            let contents = fs::read_to_string(path).map_err(|e| {
                Error::ConfigError(format!("Failed to read schema file {}: {}", path.display(), e))
            })?;
            text.push_str(&contents);
            text.push('\n');
        }

        let desired = SchemaExtractor::new(self.dialect()).extract(&text)?;
        info!(
            target_name = %self.name,
            files = paths.len(),
            statements = desired.statements.len(),
            "Loaded desired schema"
        );
        Ok(desired)
    }

    /// Open the target's connection
    pub async fn connect(&self) -> Result<DatabaseConnection> {
        DatabaseConnection::connect(&self.target, self.dialect.kind()).await
    }

    /// Introspect the live database and build the reconciliation plan
    pub async fn plan(
        &self,
        db: &dyn DatabaseAdapter,
        desired: &DesiredSchema,
    ) -> Result<ReconciliationPlan> {
        let introspector = Introspector::new(db, self.dialect()).await?;
        let live = introspector.inspect(desired).await?;
        let engine = ReconciliationEngine::new(self.dialect(), self.ignore.clone());
        Ok(engine.plan(desired, &live))
    }

    /// Build the plan without executing it
    pub async fn propose(
        &self,
        db: &dyn DatabaseAdapter,
        desired: &DesiredSchema,
    ) -> Result<ReconciliationPlan> {
        self.plan(db, desired).await
    }

    /// Build the plan and execute it
    pub async fn migrate(
        &self,
        db: &dyn DatabaseAdapter,
        desired: &DesiredSchema,
    ) -> Result<ExecutionReport> {
        let plan = self.plan(db, desired).await?;
        PlanExecutor::new(db, &self.name).execute(&plan).await
    }

    /// Build the plan and report its size per phase
    pub async fn test(
        &self,
        db: &dyn DatabaseAdapter,
        desired: &DesiredSchema,
    ) -> Result<Vec<(Phase, usize)>> {
        let plan = self.plan(db, desired).await?;
        Ok(plan.phase_counts())
    }

    /// Load the schema and run a command against an already open adapter
    pub async fn run_with(
        &self,
        db: &dyn DatabaseAdapter,
        command: Command,
    ) -> Result<CommandOutput> {
        let desired = self.load_desired_schema()?;
        self.dispatch(db, &desired, command).await
    }

    /// Parse the schema, connect, run the command and close the connection.
    ///
    /// A schema that fails to parse aborts the target before it is connected to.
    pub async fn run(&self, command: Command) -> Result<CommandOutput> {
        let desired = self.load_desired_schema()?;
        let connection = self.connect().await?;
        let result = self.dispatch(&connection, &desired, command).await;
        connection.close().await;
        result
    }

    async fn dispatch(
        &self,
        db: &dyn DatabaseAdapter,
        desired: &DesiredSchema,
        command: Command,
    ) -> Result<CommandOutput> {
        match command {
            Command::Propose => self.propose(db, desired).await.map(CommandOutput::Proposed),
            Command::Test => self.test(db, desired).await.map(CommandOutput::Tested),
            Command::Migrate => self.migrate(db, desired).await.map(CommandOutput::Migrated),
        }
    }
}

async fn run_target(config: &Config, name: &str, command: Command) -> Result<CommandOutput> {
    let mover = SchemaMover::new(name, config.target(name)?, &config.base_dir)?;
    mover.run(command).await
}

/// Run a command against every named target concurrently.
///
/// Each target gets its own connection and its own outcome; a failing or unknown target
/// never stops the others.
pub async fn run_targets(
    config: &Config,
    targets: &[String],
    command: Command,
) -> Vec<TargetOutcome> {
    let runs = targets.iter().map(|name| async move {
        let result = run_target(config, name, command).await;

        match &result {
            Ok(CommandOutput::Migrated(report)) if report.has_soft_failures() => {
                warn!(
                    target_name = %name,
                    soft_failures = report.soft_failures.len(),
                    "Target migrated with soft failures"
                )
            }
            Ok(_) => info!(target_name = %name, "Target done"),
            Err(e) => error!(target_name = %name, error = %e, "Target failed"),
        }

        TargetOutcome {
            target: name.clone(),
            result,
        }
    });

    join_all(runs).await
}
