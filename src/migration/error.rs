use crate::core::StoreError;
use crate::ledger::LedgerKey;
use thiserror::Error;

/// Errors surfaced by the ledger, the engine and the runner.
///
/// Every variant raised while a step is running is reported after its
/// transaction rolled back, so a step-scoped error always means the store is
/// exactly as it was before the step started.
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Store unavailable while {context}: {source}; nothing was committed")]
    StoreUnavailable {
        context: String,
        #[source]
        source: StoreError,
    },

    #[error("Step '{step}' is already recorded in the ledger ({detail}); the store was left unchanged")]
    ConstraintViolation { step: LedgerKey, detail: String },

    #[error(
        "Step '{step}' failed at statement #{statement_index} `{statement}`: {source}; the store was left unchanged"
    )]
    PartialStatementFailure {
        step: LedgerKey,
        statement_index: usize,
        statement: String,
        #[source]
        source: StoreError,
    },

    #[error("Step '{step}' failed: {message}; the store was left unchanged")]
    StepFailed { step: LedgerKey, message: String },

    #[error("Step '{0}' is registered more than once")]
    DuplicateStep(LedgerKey),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MigrationError {
    pub(crate) fn unavailable(context: impl Into<String>, source: StoreError) -> Self {
        MigrationError::StoreUnavailable {
            context: context.into(),
            source,
        }
    }

    /// Map a store error raised outside any step body.
    pub(crate) fn from_store(context: impl Into<String>, source: StoreError) -> Self {
        if source.is_unavailable() {
            Self::unavailable(context, source)
        } else {
            MigrationError::Store(source)
        }
    }

    /// The step this error is about, if it is step-scoped.
    pub fn step(&self) -> Option<&LedgerKey> {
        match self {
            MigrationError::ConstraintViolation { step, .. }
            | MigrationError::PartialStatementFailure { step, .. }
            | MigrationError::StepFailed { step, .. }
            | MigrationError::DuplicateStep(step) => Some(step),
            _ => None,
        }
    }

    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, MigrationError::StoreUnavailable { .. })
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, MigrationError::ConstraintViolation { .. })
    }
}

pub type Result<T> = std::result::Result<T, MigrationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_step() {
        let err = MigrationError::PartialStatementFailure {
            step: LedgerKey::new("events", "rename_tenant_brand"),
            statement_index: 1,
            statement: "UPDATE events SET app = $1".into(),
            source: StoreError::ExecutionError("boom".into()),
        };
        let message = err.to_string();
        assert!(message.contains("events/rename_tenant_brand"));
        assert!(message.contains("#1"));
        assert!(message.contains("left unchanged"));
        assert_eq!(err.step(), Some(&LedgerKey::new("events", "rename_tenant_brand")));
    }

    #[test]
    fn test_store_error_classification() {
        let err = MigrationError::from_store("checking", StoreError::Unavailable("down".into()));
        assert!(err.is_store_unavailable());

        let err = MigrationError::from_store("checking", StoreError::TableNotFound("t".into()));
        assert!(matches!(err, MigrationError::Store(_)));
        assert!(err.step().is_none());
    }
}
