use super::error::{MigrationError, Result};
use crate::core::StoreError;
use crate::ledger::{Ledger, LedgerKey, LedgerRecord};
use crate::result::QueryResult;
use crate::storage::{SqlStatement, StoreTransaction};
use chrono::Utc;
use tracing::{Level, event};

/// The transaction handed to a step's `run`.
///
/// It belongs to exactly one step for the duration of the call and numbers
/// every statement, so a failure names the statement that caused it. The
/// engine commits or rolls it back; steps never see the boundary.
pub struct StepTransaction {
    step: LedgerKey,
    tx: Box<dyn StoreTransaction>,
    statements: usize,
    log_statements: bool,
}

impl StepTransaction {
    pub(crate) fn new(step: LedgerKey, tx: Box<dyn StoreTransaction>, log_statements: bool) -> Self {
        Self {
            step,
            tx,
            statements: 0,
            log_statements,
        }
    }

    /// Key of the step this transaction belongs to.
    pub fn step(&self) -> &LedgerKey {
        &self.step
    }

    /// Statements issued so far, reads included.
    pub fn statement_count(&self) -> usize {
        self.statements
    }

    pub async fn execute(&mut self, stmt: SqlStatement) -> Result<QueryResult> {
        let index = self.next_index(&stmt);
        let result = self.tx.execute(&stmt).await;
        self.map_result(index, &stmt, result)
    }

    /// Read through the transaction, seeing the step's own earlier writes.
    pub async fn query(&mut self, stmt: SqlStatement) -> Result<QueryResult> {
        let index = self.next_index(&stmt);
        let result = self.tx.query(&stmt).await;
        self.map_result(index, &stmt, result)
    }

    /// Error for a step body that gives up on its own.
    pub fn fail(&self, message: impl Into<String>) -> MigrationError {
        MigrationError::StepFailed {
            step: self.step.clone(),
            message: message.into(),
        }
    }

    pub(crate) async fn has_own_record(&mut self, ledger: &Ledger) -> Result<bool> {
        ledger.has_record_in(self.tx.as_mut(), &self.step).await
    }

    /// Insert the step's ledger record as the last statement of the transaction.
    pub(crate) async fn record_applied(&mut self, ledger: &Ledger) -> Result<LedgerRecord> {
        let record = LedgerRecord::new(self.step.clone(), Utc::now());
        let stmt = ledger.insert_statement(&record);
        let index = self.next_index(&stmt);
        match self.tx.execute(&stmt).await {
            Err(StoreError::ConstraintViolation(detail)) => Err(MigrationError::ConstraintViolation {
                step: self.step.clone(),
                detail,
            }),
            other => self.map_result(index, &stmt, other).map(|_| record),
        }
    }

    pub(crate) async fn commit(mut self) -> Result<usize> {
        let context = format!("committing step {}", self.step);
        self.tx
            .commit()
            .await
            .map_err(|e| MigrationError::from_store(context, e))?;
        Ok(self.statements)
    }

    pub(crate) async fn rollback(mut self) -> Result<()> {
        let context = format!("rolling back step {}", self.step);
        self.tx
            .rollback()
            .await
            .map_err(|e| MigrationError::from_store(context, e))
    }

    fn next_index(&mut self, stmt: &SqlStatement) -> usize {
        let index = self.statements;
        self.statements += 1;
        if self.log_statements {
            event!(Level::DEBUG, step = %self.step, index, sql = %stmt.sql, "step statement");
        }
        index
    }

    fn map_result(
        &self,
        index: usize,
        stmt: &SqlStatement,
        result: crate::core::Result<QueryResult>,
    ) -> Result<QueryResult> {
        result.map_err(|source| {
            if source.is_unavailable() {
                MigrationError::unavailable(format!("running step {} (statement #{})", self.step, index), source)
            } else {
                MigrationError::PartialStatementFailure {
                    step: self.step.clone(),
                    statement_index: index,
                    statement: stmt.sql.clone(),
                    source,
                }
            }
        })
    }
}
