use super::error::{MigrationError, Result};
use super::step::{MigrationStep, StoreReader};
use super::transaction::StepTransaction;
use crate::config::EngineConfig;
use crate::ledger::{Ledger, LedgerKey, LedgerRecord};
use crate::storage::Store;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, Level, event, info_span};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StepOutcome {
    /// `needs_migration` was false; nothing was executed.
    Skipped,
    Applied { statements: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub key: LedgerKey,
    pub outcome: StepOutcome,
    pub applied_at: Option<DateTime<Utc>>,
    pub elapsed_ms: u64,
}

impl StepReport {
    fn skipped(key: LedgerKey) -> Self {
        Self {
            key,
            outcome: StepOutcome::Skipped,
            applied_at: None,
            elapsed_ms: 0,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self.outcome, StepOutcome::Applied { .. })
    }
}

/// Decides and executes migration steps against one store.
pub struct MigrationEngine {
    store: Arc<dyn Store>,
    ledger: Ledger,
    config: EngineConfig,
}

impl MigrationEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            ledger: Ledger::default(),
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(store: Arc<dyn Store>, config: EngineConfig) -> Result<Self> {
        let ledger = Ledger::new(config.ledger.clone())?;
        Ok(Self { store, ledger, config })
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Make sure the ledger table is there.
    pub async fn prepare(&self) -> Result<()> {
        self.ledger.ensure_schema(self.store.as_ref()).await
    }

    pub fn reader(&self) -> StoreReader<'_> {
        StoreReader::new(self.store.as_ref(), &self.ledger)
    }

    /// A step already in the ledger never needs migration; otherwise its own
    /// guard decides. Evaluated against committed state on every call.
    pub async fn needs_migration(&self, step: &dyn MigrationStep) -> Result<bool> {
        let reader = self.reader();
        if reader.has_record(step.key()).await? {
            return Ok(false);
        }
        step.needs_migration(&reader).await
    }

    /// Check the guard, then run the step if it is needed.
    pub async fn apply(&self, step: &dyn MigrationStep) -> Result<StepReport> {
        if !self.needs_migration(step).await? {
            event!(Level::INFO, step = %step.key(), "migration step not needed");
            return Ok(StepReport::skipped(step.key().clone()));
        }
        self.run(step).await
    }

    /// Run the step unconditionally: body, ledger record, commit. Any failure
    /// rolls the whole transaction back.
    pub async fn run(&self, step: &dyn MigrationStep) -> Result<StepReport> {
        let key = step.key().clone();
        let span = info_span!("migration.step", step = %key);
        self.run_step(step, key).instrument(span).await
    }

    async fn run_step(&self, step: &dyn MigrationStep, key: LedgerKey) -> Result<StepReport> {
        let started = Instant::now();
        let tx = self
            .store
            .begin()
            .await
            .map_err(|e| MigrationError::from_store(format!("starting step {}", key), e))?;
        let mut tx = StepTransaction::new(key.clone(), tx, self.config.log_statements);
        event!(Level::DEBUG, description = step.description().unwrap_or(""), "migration step started");

        match self.run_body(step, &mut tx).await {
            Ok(record) => {
                let statements = tx.commit().await?;
                let elapsed_ms = started.elapsed().as_millis() as u64;
                event!(Level::INFO, statements, elapsed_ms, "migration step applied");
                Ok(StepReport {
                    key,
                    outcome: StepOutcome::Applied { statements },
                    applied_at: Some(record.applied_at),
                    elapsed_ms,
                })
            }
            Err(err) => {
                event!(Level::ERROR, error = %err, "migration step failed, rolling back");
                if let Err(rollback_err) = tx.rollback().await {
                    event!(Level::WARN, error = %rollback_err, "rollback reported an error");
                }
                Err(err)
            }
        }
    }

    async fn run_body(&self, step: &dyn MigrationStep, tx: &mut StepTransaction) -> Result<LedgerRecord> {
        // A forced re-run stops here before touching data. The unique ledger
        // insert below still catches a writer that slipped in concurrently.
        if tx.has_own_record(&self.ledger).await? {
            return Err(MigrationError::ConstraintViolation {
                step: tx.step().clone(),
                detail: "the ledger already holds this record".to_string(),
            });
        }
        step.run(tx).await?;
        tx.record_applied(&self.ledger).await
    }
}
