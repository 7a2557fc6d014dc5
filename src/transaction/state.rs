// ============================================================================
// Transaction State Management
// ============================================================================
//
// Each transaction moves through defined states: Active -> Committed/Aborted.
// Terminal states are final; any further use reports the transaction closed.
//
// ============================================================================

use crate::core::{Result, StoreError};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Generate a new unique transaction ID
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// State transitions:
/// ```text
/// Active ──commit──> Committed
///   │
///   └──rollback──> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::Aborted)
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// Lifecycle bookkeeping for one store transaction.
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    state: TransactionState,
    /// Committed version the transaction's snapshot was taken from
    base_version: u64,
    statement_count: usize,
    start_time: std::time::Instant,
}

impl Transaction {
    pub fn new(id: TransactionId, base_version: u64) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            base_version,
            statement_count: 0,
            start_time: std::time::Instant::now(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn base_version(&self) -> u64 {
        self.base_version
    }

    /// Statements executed so far, including failed ones
    pub fn statement_count(&self) -> usize {
        self.statement_count
    }

    pub fn duration(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// # Errors
    /// `TransactionClosed` once the transaction is committed or aborted
    pub fn ensure_active(&self) -> Result<()> {
        if self.state.is_active() {
            Ok(())
        } else {
            Err(StoreError::TransactionClosed(self.id.as_u64()))
        }
    }

    /// Count one more statement and return its zero-based index.
    pub fn next_statement(&mut self) -> Result<usize> {
        self.ensure_active()?;
        let index = self.statement_count;
        self.statement_count += 1;
        Ok(index)
    }

    pub fn commit(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.state = TransactionState::Committed;
        Ok(())
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.state = TransactionState::Aborted;
        Ok(())
    }
}
