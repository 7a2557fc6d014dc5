use super::error::{MigrationError, Result};
use super::transaction::StepTransaction;
use crate::ledger::{Ledger, LedgerKey};
use crate::result::QueryResult;
use crate::storage::{SqlStatement, Store, TableSchema};
use async_trait::async_trait;

/// One unit of schema/data transformation.
///
/// `needs_migration` must be side-effect free and is evaluated fresh on every
/// call. `run` performs the mutation inside the transaction it is given; the
/// engine records the ledger entry and commits afterwards.
#[async_trait]
pub trait MigrationStep: Send + Sync {
    fn key(&self) -> &LedgerKey;

    fn description(&self) -> Option<&str> {
        None
    }

    async fn needs_migration(&self, reader: &StoreReader<'_>) -> Result<bool>;

    async fn run(&self, tx: &mut StepTransaction) -> Result<()>;
}

/// Read-only, committed view of the store used by guard predicates.
pub struct StoreReader<'a> {
    store: &'a dyn Store,
    ledger: &'a Ledger,
}

impl<'a> StoreReader<'a> {
    pub fn new(store: &'a dyn Store, ledger: &'a Ledger) -> Self {
        Self { store, ledger }
    }

    pub fn ledger(&self) -> &Ledger {
        self.ledger
    }

    pub async fn has_record(&self, key: &LedgerKey) -> Result<bool> {
        self.ledger.has_record(self.store, key).await
    }

    pub async fn describe_table(&self, table: &str) -> Result<Option<TableSchema>> {
        self.store
            .describe_table(table)
            .await
            .map_err(|e| MigrationError::from_store(format!("describing table '{}'", table), e))
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.describe_table(table).await?.is_some())
    }

    pub async fn column_exists(&self, table: &str, column: &str) -> Result<bool> {
        Ok(self
            .describe_table(table)
            .await?
            .is_some_and(|schema| schema.has_column(column)))
    }

    pub async fn query(&self, stmt: &SqlStatement) -> Result<QueryResult> {
        self.store
            .query(stmt)
            .await
            .map_err(|e| MigrationError::from_store("evaluating a guard query", e))
    }
}
