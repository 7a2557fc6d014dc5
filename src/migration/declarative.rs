use super::error::{MigrationError, Result};
use super::guard::Guard;
use super::rename::{MatchMode, RenameOperation, ValueScope};
use super::step::{MigrationStep, StoreReader};
use super::transaction::StepTransaction;
use crate::ledger::LedgerKey;
use crate::storage::SqlStatement;
use async_trait::async_trait;
use tracing::{Level, event};

/// A step made of rename operations and auxiliary SQL, gated by a [`Guard`].
///
/// Operations run in declaration order, then the auxiliary statements, all in
/// the one transaction the engine hands to `run`.
#[derive(Debug, Clone)]
pub struct RenameStep {
    key: LedgerKey,
    guard: Guard,
    operations: Vec<RenameOperation>,
    statements: Vec<SqlStatement>,
    description: Option<String>,
}

impl RenameStep {
    pub fn builder(namespace: &str, name: &str) -> RenameStepBuilder {
        RenameStepBuilder {
            key: LedgerKey::new(namespace, name),
            guard: Guard::Always,
            operations: Vec::new(),
            statements: Vec::new(),
            description: None,
        }
    }

    pub fn guard(&self) -> &Guard {
        &self.guard
    }

    pub fn operations(&self) -> &[RenameOperation] {
        &self.operations
    }

    pub fn statements(&self) -> &[SqlStatement] {
        &self.statements
    }
}

#[async_trait]
impl MigrationStep for RenameStep {
    fn key(&self) -> &LedgerKey {
        &self.key
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    async fn needs_migration(&self, reader: &StoreReader<'_>) -> Result<bool> {
        self.guard.evaluate(reader).await
    }

    async fn run(&self, tx: &mut StepTransaction) -> Result<()> {
        for operation in &self.operations {
            let changed = operation.apply(tx).await?;
            event!(Level::DEBUG, operation = %operation, changed, "rename operation applied");
        }
        for stmt in &self.statements {
            tx.execute(stmt.clone()).await?;
        }
        Ok(())
    }
}

pub struct RenameStepBuilder {
    key: LedgerKey,
    guard: Guard,
    operations: Vec<RenameOperation>,
    statements: Vec<SqlStatement>,
    description: Option<String>,
}

impl RenameStepBuilder {
    pub fn guard(mut self, guard: Guard) -> Self {
        self.guard = guard;
        self
    }

    pub fn operation(mut self, operation: RenameOperation) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn rename_column(self, table: &str, old: &str, new: &str) -> Self {
        self.operation(RenameOperation::column(table, old, new))
    }

    pub fn rename_value(self, scope: ValueScope, old: &str, new: &str, mode: MatchMode) -> Self {
        self.operation(RenameOperation::value(scope, old, new, mode))
    }

    /// Auxiliary SQL, run after all rename operations.
    pub fn statement(mut self, stmt: impl Into<SqlStatement>) -> Self {
        self.statements.push(stmt.into());
        self
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn build(self) -> Result<RenameStep> {
        if self.key.namespace.is_empty() || self.key.name.is_empty() {
            return Err(MigrationError::InvalidConfig(format!(
                "step key '{}' needs both a namespace and a name",
                self.key
            )));
        }
        if self.operations.is_empty() && self.statements.is_empty() {
            return Err(MigrationError::InvalidConfig(format!(
                "step '{}' has nothing to do",
                self.key
            )));
        }
        for operation in &self.operations {
            operation.validate()?;
        }

        Ok(RenameStep {
            key: self.key,
            guard: self.guard,
            operations: self.operations,
            statements: self.statements,
            description: self.description,
        })
    }
}
