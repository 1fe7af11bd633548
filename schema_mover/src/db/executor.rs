//! Plan executor
//!
//! Runs a reconciliation plan statement by statement on one connection.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::db::adapter::DatabaseAdapter;
use crate::error::{Error, Result, SoftExecutionError};
use crate::schema::types::ReconciliationPlan;
use crate::utils::logging::LOG_PREVIEW_CHARS;
use crate::utils::naming::preview;

/// Header printed above collected soft failures
pub const SOFT_FAILURE_NOTICE: &str =
    "these operations raised an error; this might not indicate a problem";

/// Outcome of a plan that ran to completion
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    /// Operations the database accepted
    pub executed: usize,
    /// `ALTER`/`CREATE` operations the database rejected
    pub soft_failures: Vec<SoftExecutionError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionReport {
    pub fn has_soft_failures(&self) -> bool {
        !self.soft_failures.is_empty()
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// Human-readable list of soft failures, if there were any
    pub fn summary(&self) -> Option<String> {
        if self.soft_failures.is_empty() {
            return None;
        }
        let mut summary = format!("{}:", SOFT_FAILURE_NOTICE);
        for failure in &self.soft_failures {
            summary.push_str("\n  ");
            summary.push_str(&failure.to_string());
        }
        Some(summary)
    }
}

/// Executes plans against one database, in order, stopping at the first hard failure
pub struct PlanExecutor<'a> {
    db: &'a dyn DatabaseAdapter,
    target: &'a str,
}

impl<'a> PlanExecutor<'a> {
    pub fn new(db: &'a dyn DatabaseAdapter, target: &'a str) -> Self {
        Self { db, target }
    }

    /// Execute every operation of the plan.
    ///
    /// A failing `ALTER`/`CREATE` is recorded and execution continues; any other failure
    /// aborts the remaining operations and is returned as [`Error::HardExecutionError`].
    pub async fn execute(&self, plan: &ReconciliationPlan) -> Result<ExecutionReport> {
        let started_at = Utc::now();
        let mut executed = 0;
        let mut soft_failures = Vec::new();

        info!(target_name = %self.target, operations = plan.len(), "Executing plan");

        for operation in plan.iter() {
            let statement = preview(&operation.sql, LOG_PREVIEW_CHARS);
            debug!(
                target_name = %self.target,
                phase = %operation.phase,
                statement = %statement,
                "Executing"
            );

            match self.db.execute(&operation.sql).await {
                Ok(()) => executed += 1,
                Err(e) if operation.expected_to_fail => {
                    debug!(
                        target_name = %self.target,
                        statement = %statement,
                        error = %e,
                        "Operation failed softly"
                    );
                    soft_failures.push(SoftExecutionError {
                        statement: operation.sql.clone(),
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    error!(
                        target_name = %self.target,
                        phase = %operation.phase,
                        statement = %statement,
                        error = %e,
                        "Operation failed; aborting remaining operations"
                    );
                    return Err(Error::HardExecutionError {
                        statement: operation.sql.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        let report = ExecutionReport {
            executed,
            soft_failures,
            started_at,
            finished_at: Utc::now(),
        };

        if let Some(summary) = report.summary() {
            warn!(target_name = %self.target, "{}", summary);
        }
        info!(
            target_name = %self.target,
            executed = report.executed,
            soft_failures = report.soft_failures.len(),
            elapsed_ms = report.duration().num_milliseconds(),
            "Plan executed"
        );

        Ok(report)
    }
}
