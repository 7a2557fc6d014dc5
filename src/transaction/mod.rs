// ============================================================================
// Transaction Module
// ============================================================================
//
// Transaction identity and lifecycle for store transactions.
//
// Isolation comes from Copy-on-Write catalog snapshots: a transaction works
// on its own clone of the committed catalog and commit installs it whole.
//
// ============================================================================

pub mod state;

pub use state::{Transaction, TransactionId, TransactionState};
