// ============================================================================
// Ledger Engine
// ============================================================================
//
// Durable record of which (namespace, name) migrations have been applied.
// The unique constraint over (namespace, name) turns a duplicate application
// into a ConstraintViolation instead of a silent second run.
//
// ============================================================================

pub mod record;

pub use record::{LedgerKey, LedgerRecord};

use crate::config::LedgerConfig;
use crate::core::{StoreError, Value};
use crate::migration::error::{MigrationError, Result};
use crate::storage::{SqlStatement, Store, StoreTransaction};
use chrono::Utc;
use log::debug;

#[derive(Debug, Clone)]
pub struct Ledger {
    config: LedgerConfig,
}

impl Ledger {
    pub fn new(config: LedgerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn table(&self) -> &str {
        &self.config.table
    }

    /// Make sure the ledger table exists with the configured columns.
    pub async fn ensure_schema(&self, store: &dyn Store) -> Result<()> {
        let context = "checking the ledger schema";
        let schema = store
            .describe_table(&self.config.table)
            .await
            .map_err(|e| MigrationError::from_store(context, e))?;

        match schema {
            Some(schema) => {
                for column in [
                    &self.config.namespace_column,
                    &self.config.name_column,
                    &self.config.applied_at_column,
                ] {
                    if !schema.has_column(column) {
                        return Err(MigrationError::InvalidConfig(format!(
                            "ledger table '{}' has no column '{}'",
                            self.config.table, column
                        )));
                    }
                }
                Ok(())
            }
            None if self.config.create_if_missing => {
                let context = "creating the ledger table";
                let mut tx = store
                    .begin()
                    .await
                    .map_err(|e| MigrationError::from_store(context, e))?;
                tx.execute(&self.create_statement())
                    .await
                    .map_err(|e| MigrationError::from_store(context, e))?;
                tx.commit()
                    .await
                    .map_err(|e| MigrationError::from_store(context, e))?;
                debug!("Created ledger table '{}'", self.config.table);
                Ok(())
            }
            None => Err(MigrationError::InvalidConfig(format!(
                "ledger table '{}' does not exist and create_if_missing is off",
                self.config.table
            ))),
        }
    }

    /// Committed read: in-flight transactions are never observed.
    pub async fn has_record(&self, store: &dyn Store, key: &LedgerKey) -> Result<bool> {
        match store.query(&self.lookup_statement(key)).await {
            Ok(result) => Ok(!result.is_empty()),
            Err(StoreError::TableNotFound(table)) if table == self.config.table => Ok(false),
            Err(e) => Err(MigrationError::from_store(format!("checking ledger record {}", key), e)),
        }
    }

    /// Lookup through an open transaction.
    pub async fn has_record_in(&self, tx: &mut dyn StoreTransaction, key: &LedgerKey) -> Result<bool> {
        match tx.query(&self.lookup_statement(key)).await {
            Ok(result) => Ok(!result.is_empty()),
            Err(StoreError::TableNotFound(table)) if table == self.config.table => Ok(false),
            Err(e) => Err(MigrationError::from_store(format!("checking ledger record {}", key), e)),
        }
    }

    /// Insert the record inside the caller's transaction. It persists only if
    /// that transaction commits.
    pub async fn record_applied(&self, tx: &mut dyn StoreTransaction, key: &LedgerKey) -> Result<LedgerRecord> {
        let record = LedgerRecord::new(key.clone(), Utc::now());
        tx.execute(&self.insert_statement(&record))
            .await
            .map_err(|e| match e {
                StoreError::ConstraintViolation(detail) => MigrationError::ConstraintViolation {
                    step: key.clone(),
                    detail,
                },
                other => MigrationError::from_store(format!("recording {}", key), other),
            })?;
        Ok(record)
    }

    /// All committed records in insertion order.
    pub async fn records(&self, store: &dyn Store) -> Result<Vec<LedgerRecord>> {
        let sql = format!(
            "SELECT {}, {}, {} FROM {}",
            self.config.namespace_column,
            self.config.name_column,
            self.config.applied_at_column,
            self.config.table
        );
        let result = match store.query(&SqlStatement::new(sql)).await {
            Ok(result) => result,
            Err(StoreError::TableNotFound(table)) if table == self.config.table => return Ok(Vec::new()),
            Err(e) => return Err(MigrationError::from_store("listing ledger records", e)),
        };
        result
            .rows
            .iter()
            .map(|row| LedgerRecord::from_row(row).map_err(MigrationError::Store))
            .collect()
    }

    pub(crate) fn insert_statement(&self, record: &LedgerRecord) -> SqlStatement {
        SqlStatement::new(format!(
            "INSERT INTO {} ({}, {}, {}) VALUES ($1, $2, $3)",
            self.config.table,
            self.config.namespace_column,
            self.config.name_column,
            self.config.applied_at_column
        ))
        .bind(record.key.namespace.as_str())
        .bind(record.key.name.as_str())
        .bind(Value::Timestamp(record.applied_at))
    }

    fn lookup_statement(&self, key: &LedgerKey) -> SqlStatement {
        SqlStatement::new(format!(
            "SELECT {} FROM {} WHERE {} = $1 AND {} = $2",
            self.config.name_column, self.config.table, self.config.namespace_column, self.config.name_column
        ))
        .bind(key.namespace.as_str())
        .bind(key.name.as_str())
    }

    fn create_statement(&self) -> SqlStatement {
        let c = &self.config;
        SqlStatement::new(format!(
            "CREATE TABLE IF NOT EXISTS {} ({} TEXT NOT NULL, {} TEXT NOT NULL, {} TIMESTAMP NOT NULL, UNIQUE ({}, {}))",
            c.table, c.namespace_column, c.name_column, c.applied_at_column, c.namespace_column, c.name_column
        ))
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self {
            config: LedgerConfig::default(),
        }
    }
}
