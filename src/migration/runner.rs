use super::engine::{MigrationEngine, StepReport};
use super::error::{MigrationError, Result};
use super::step::MigrationStep;
use crate::ledger::LedgerKey;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{Instrument, Level, event, info_span};
use uuid::Uuid;

/// Explicitly registered steps, kept in registration order.
#[derive(Default)]
pub struct StepRegistry {
    steps: Vec<Arc<dyn MigrationStep>>,
    keys: HashSet<LedgerKey>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, step: impl MigrationStep + 'static) -> Result<&mut Self> {
        self.register_arc(Arc::new(step))
    }

    pub fn register_arc(&mut self, step: Arc<dyn MigrationStep>) -> Result<&mut Self> {
        if !self.keys.insert(step.key().clone()) {
            return Err(MigrationError::DuplicateStep(step.key().clone()));
        }
        self.steps.push(step);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn keys(&self) -> Vec<LedgerKey> {
        self.steps.iter().map(|s| s.key().clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn MigrationStep>> {
        self.steps.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub steps: Vec<StepReport>,
}

impl RunReport {
    pub fn applied(&self) -> Vec<&LedgerKey> {
        self.steps.iter().filter(|s| s.is_applied()).map(|s| &s.key).collect()
    }

    pub fn skipped(&self) -> Vec<&LedgerKey> {
        self.steps.iter().filter(|s| !s.is_applied()).map(|s| &s.key).collect()
    }
}

/// A run that stopped early. Steps in `completed` stay committed; the failing
/// step left the store unchanged.
#[derive(Error, Debug)]
#[error("Migration run {run_id} stopped at {}: {source}", stopped_at(.failed_step))]
pub struct RunError {
    pub run_id: Uuid,
    pub failed_step: Option<LedgerKey>,
    pub completed: Vec<StepReport>,
    #[source]
    pub source: MigrationError,
}

fn stopped_at(step: &Option<LedgerKey>) -> String {
    match step {
        Some(key) => format!("step '{}'", key),
        None => "ledger setup".to_string(),
    }
}

/// Sequential driver: for each registered step, `needs_migration` then `run`.
/// Never retries; the first failure ends the run.
///
/// # Example
///
/// ```
/// # tokio_test::block_on(async {
/// use migration_ledger::prelude::*;
/// use std::sync::Arc;
///
/// let store = Arc::new(MemoryStore::new());
/// store.execute("CREATE TABLE events (tenant TEXT)").await.unwrap();
///
/// let mut registry = StepRegistry::new();
/// registry
///     .register(
///         RenameStep::builder("events", "0001_tenant_to_brand")
///             .rename_column("events", "tenant", "brand")
///             .build()
///             .unwrap(),
///     )
///     .unwrap();
///
/// let runner = Runner::new(MigrationEngine::new(store), registry);
/// let report = runner.run().await.unwrap();
/// assert_eq!(report.applied().len(), 1);
///
/// // Already in the ledger: the second run skips it.
/// assert!(runner.run().await.unwrap().applied().is_empty());
/// # });
/// ```
pub struct Runner {
    engine: MigrationEngine,
    registry: StepRegistry,
}

impl Runner {
    pub fn new(engine: MigrationEngine, registry: StepRegistry) -> Self {
        Self { engine, registry }
    }

    pub fn engine(&self) -> &MigrationEngine {
        &self.engine
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    /// Steps whose guard currently says they need to run.
    pub async fn pending(&self) -> Result<Vec<LedgerKey>> {
        let mut pending = Vec::new();
        for step in self.registry.iter() {
            if self.engine.needs_migration(step.as_ref()).await? {
                pending.push(step.key().clone());
            }
        }
        Ok(pending)
    }

    pub async fn run(&self) -> std::result::Result<RunReport, RunError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("migration.run", run_id = %run_id, steps = self.registry.len());
        self.run_all(run_id).instrument(span).await
    }

    async fn run_all(&self, run_id: Uuid) -> std::result::Result<RunReport, RunError> {
        if let Err(source) = self.engine.prepare().await {
            event!(Level::ERROR, error = %source, "ledger setup failed");
            return Err(RunError {
                run_id,
                failed_step: None,
                completed: Vec::new(),
                source,
            });
        }

        let mut completed = Vec::with_capacity(self.registry.len());
        for step in self.registry.iter() {
            match self.engine.apply(step.as_ref()).await {
                Ok(report) => completed.push(report),
                Err(source) => {
                    event!(Level::ERROR, step = %step.key(), error = %source, "migration run aborted");
                    return Err(RunError {
                        run_id,
                        failed_step: Some(step.key().clone()),
                        completed,
                        source,
                    });
                }
            }
        }

        let report = RunReport { run_id, steps: completed };
        event!(
            Level::INFO,
            applied = report.applied().len(),
            skipped = report.skipped().len(),
            "migration run finished"
        );
        Ok(report)
    }
}
