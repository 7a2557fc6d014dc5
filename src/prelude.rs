//! Everything needed to declare and run migrations.
//!
//! ```
//! use migration_ledger::prelude::*;
//! ```

pub use crate::config::{EngineConfig, LedgerConfig};
pub use crate::ledger::{Ledger, LedgerKey, LedgerRecord};
pub use crate::migration::{
    Guard, MatchMode, MigrationEngine, MigrationError, MigrationStep, RenameOperation, RenameStep,
    RunError, RunReport, Runner, StepOutcome, StepRegistry, StepReport, StepTransaction,
    StoreReader, ValueScope,
};
pub use crate::storage::{MemoryStore, SqlStatement, Store, StoreTransaction};
pub use crate::{QueryResult, StoreError, Value};
