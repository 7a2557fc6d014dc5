// ============================================================================
// Migration Ledger Library
// ============================================================================
//
// Decides which pre-authored migration steps still have to run and applies
// each one exactly once, inside a single store transaction that also records
// it in the ledger.
//
// ============================================================================

pub mod config;
pub mod core;
pub mod ledger;
pub mod migration;
pub mod prelude;
pub mod result;
pub mod storage;
pub mod transaction;
mod evaluator;
mod executor;
mod expression;
mod parser;

// Re-export main types for convenience
pub use config::{EngineConfig, LedgerConfig};
pub use core::{DataType, StoreError, Value};
pub use ledger::{Ledger, LedgerKey, LedgerRecord};
pub use migration::{
    Guard, MatchMode, MigrationEngine, MigrationError, MigrationStep, RenameOperation, RenameStep,
    RunError, RunReport, Runner, StepOutcome, StepRegistry, StepReport, StepTransaction,
    StoreReader, ValueScope,
};
pub use result::QueryResult;
pub use storage::{MemoryStore, SqlStatement, Store, StoreTransaction};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_apply_declarative_step() {
        let store = Arc::new(MemoryStore::new());
        store.execute("CREATE TABLE events (tenant TEXT)").await.unwrap();

        let engine = MigrationEngine::new(store.clone());
        engine.prepare().await.unwrap();

        let step = RenameStep::builder("events", "rename_tenant_brand")
            .rename_column("events", "tenant", "brand")
            .build()
            .unwrap();

        let report = engine.apply(&step).await.unwrap();
        assert!(report.is_applied());
        assert!(!engine.needs_migration(&step).await.unwrap());
    }
}
