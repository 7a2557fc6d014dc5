// ============================================================================
// Migration Module
// ============================================================================
//
// Steps, guards and rename operations, plus the engine that applies a step
// exactly once and the runner that drives a registry of steps in order.
//
// Step lifecycle:
//   NotNeeded ──needs_migration──> Running ──commit──> Applied
//                                     │
//                                     └──any error──> rolled back (NotNeeded)
//
// ============================================================================

pub mod builtin;
pub mod declarative;
pub mod engine;
pub mod error;
pub mod guard;
pub mod rename;
pub mod runner;
pub mod step;
pub mod transaction;

pub use declarative::{RenameStep, RenameStepBuilder};
pub use engine::{MigrationEngine, StepOutcome, StepReport};
pub use error::MigrationError;
pub use guard::Guard;
pub use rename::{MatchMode, RenameOperation, ValueScope, replace_symbol};
pub use runner::{RunError, RunReport, Runner, StepRegistry};
pub use step::{MigrationStep, StoreReader};
pub use transaction::StepTransaction;
