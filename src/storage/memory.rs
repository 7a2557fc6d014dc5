use super::{Catalog, SqlStatement, Store, StoreTransaction, TableSchema};
use crate::core::{Result, StoreError};
use crate::executor::{ExecutionContext, ExecutorPipeline};
use crate::parser::SqlParserAdapter;
use crate::parser::ast::Statement;
use crate::result::QueryResult;
use crate::transaction::{Transaction, TransactionId};
use async_trait::async_trait;
use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

const NO_FAULT: usize = usize::MAX;

/// Committed state: the catalog plus a version bumped on every commit.
#[derive(Debug, Default)]
struct StoreState {
    catalog: Catalog,
    version: u64,
}

struct Inner {
    state: RwLock<StoreState>,
    /// Held by the open transaction for its whole lifetime (single writer).
    writer: Arc<Mutex<()>>,
    available: AtomicBool,
    fault_after: AtomicUsize,
    parser: SqlParserAdapter,
    pipeline: ExecutorPipeline,
}

/// In-memory reference store.
///
/// Readers always see the last committed catalog. A transaction works on its
/// own Copy-on-Write clone of that catalog and commit installs the clone in one
/// step, so a rolled back or dropped transaction leaves no trace.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(StoreState::default()),
                writer: Arc::new(Mutex::new(())),
                available: AtomicBool::new(true),
                fault_after: AtomicUsize::new(NO_FAULT),
                parser: SqlParserAdapter::new(),
                pipeline: ExecutorPipeline::with_default_executors(),
            }),
        }
    }

    /// Simulate losing (or regaining) the connection to the store.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::SeqCst)
    }

    /// Let the next transaction execute `statements` statements, then fail the
    /// one after. Reads through the transaction are not counted.
    pub fn inject_fault_after(&self, statements: usize) {
        self.inner.fault_after.store(statements, Ordering::SeqCst);
    }

    /// Number of commits so far.
    pub async fn version(&self) -> u64 {
        self.inner.state.read().await.version
    }

    pub async fn table_names(&self) -> Vec<String> {
        self.inner.state.read().await.catalog.list_tables()
    }

    /// Run a statement in its own transaction.
    pub async fn execute(&self, stmt: impl Into<SqlStatement>) -> Result<QueryResult> {
        let stmt = stmt.into();
        let mut tx = self.begin().await?;
        let result = tx.execute(&stmt).await?;
        tx.commit().await?;
        Ok(result)
    }

    /// Committed read from plain SQL.
    pub async fn fetch(&self, stmt: impl Into<SqlStatement>) -> Result<QueryResult> {
        Store::query(self, &stmt.into()).await
    }

    fn check_available(&self) -> Result<()> {
        check_available(&self.inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("available", &self.is_available())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        self.check_available()?;

        let guard = self.inner.writer.clone().lock_owned().await;
        let (working, version) = {
            let state = self.inner.state.read().await;
            (state.catalog.clone(), state.version)
        };

        let fault_after = match self.inner.fault_after.swap(NO_FAULT, Ordering::SeqCst) {
            NO_FAULT => None,
            n => Some(n),
        };

        let txn = Transaction::new(TransactionId::new(), version);
        debug!("BEGIN {} at version {}", txn.id(), version);

        Ok(Box::new(MemoryTransaction {
            inner: self.inner.clone(),
            txn,
            working,
            fault_after,
            _writer: Some(guard),
        }))
    }

    async fn query(&self, stmt: &SqlStatement) -> Result<QueryResult> {
        self.check_available()?;
        let statements = parse_read_only(&self.inner, stmt)?;
        // Reads run against a throwaway clone of the committed catalog.
        let mut snapshot = self.inner.state.read().await.catalog.clone();
        debug!("QUERY {}", stmt);
        run_script(&self.inner, &mut snapshot, &statements, stmt)
    }

    async fn describe_table(&self, name: &str) -> Result<Option<TableSchema>> {
        self.check_available()?;
        Ok(self.inner.state.read().await.catalog.schema(name))
    }
}

/// Transaction on a [`MemoryStore`].
pub struct MemoryTransaction {
    inner: Arc<Inner>,
    txn: Transaction,
    working: Catalog,
    fault_after: Option<usize>,
    _writer: Option<OwnedMutexGuard<()>>,
}

impl MemoryTransaction {
    pub fn id(&self) -> TransactionId {
        self.txn.id()
    }

    fn finish(&mut self) {
        self._writer = None;
        self.working = Catalog::new();
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn execute(&mut self, stmt: &SqlStatement) -> Result<QueryResult> {
        check_available(&self.inner)?;
        let index = self.txn.next_statement()?;

        if self.fault_after == Some(index) {
            return Err(StoreError::ExecutionError(format!(
                "Injected fault at statement {} of {}",
                index + 1,
                self.txn.id()
            )));
        }

        let statements = self.inner.parser.parse(&stmt.sql)?;
        debug!("{} #{}: {}", self.txn.id(), index, stmt);

        // A script either applies completely or not at all.
        let before = self.working.clone();
        let result = run_script(&self.inner, &mut self.working, &statements, stmt);
        if result.is_err() {
            self.working = before;
        }
        result
    }

    async fn query(&mut self, stmt: &SqlStatement) -> Result<QueryResult> {
        check_available(&self.inner)?;
        self.txn.ensure_active()?;
        let statements = parse_read_only(&self.inner, stmt)?;
        run_script(&self.inner, &mut self.working, &statements, stmt)
    }

    async fn commit(&mut self) -> Result<()> {
        self.txn.ensure_active()?;
        if let Err(e) = check_available(&self.inner) {
            self.txn.rollback()?;
            self.finish();
            return Err(e);
        }

        let mut state = self.inner.state.write().await;
        state.catalog = std::mem::take(&mut self.working);
        state.version += 1;
        self.txn.commit()?;
        debug!(
            "COMMIT {}: {} statements, version {} -> {}, {:?}",
            self.txn.id(),
            self.txn.statement_count(),
            self.txn.base_version(),
            state.version,
            self.txn.duration()
        );
        drop(state);

        self.finish();
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.txn.rollback()?;
        debug!(
            "ROLLBACK {} after {} statements",
            self.txn.id(),
            self.txn.statement_count()
        );
        self.finish();
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if self.txn.state().is_active() {
            debug!("{} dropped while active, rolling back", self.txn.id());
        }
    }
}

fn check_available(inner: &Inner) -> Result<()> {
    if inner.available.load(Ordering::SeqCst) {
        Ok(())
    } else {
        Err(StoreError::Unavailable("memory store is offline".into()))
    }
}

fn parse_read_only(inner: &Inner, stmt: &SqlStatement) -> Result<Vec<Statement>> {
    let statements = inner.parser.parse(&stmt.sql)?;
    if let Some(write) = statements.iter().find(|s| !matches!(s, Statement::Query(_))) {
        return Err(StoreError::UnsupportedOperation(format!(
            "{} is not allowed in a read-only query",
            write.kind()
        )));
    }
    Ok(statements)
}

fn run_script(
    inner: &Inner,
    catalog: &mut Catalog,
    statements: &[Statement],
    stmt: &SqlStatement,
) -> Result<QueryResult> {
    let mut result = QueryResult::empty();
    for statement in statements {
        let mut ctx = ExecutionContext::new(catalog, &stmt.params);
        result.merge(inner.pipeline.execute(statement, &mut ctx)?);
    }
    Ok(result)
}
