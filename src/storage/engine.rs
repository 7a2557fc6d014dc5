use super::table::TableSchema;
use crate::core::{Result, Value};
use crate::result::QueryResult;
use async_trait::async_trait;
use std::fmt;

/// Opaque SQL text plus positional parameters (`$1`, `$2`, ...).
///
/// The migration layer hands statements to the store as-is; only the store
/// interprets them.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl SqlStatement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Bind the next positional parameter.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }
}

impl fmt::Display for SqlStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)?;
        if !self.params.is_empty() {
            let params: Vec<String> = self.params.iter().map(|p| p.to_string()).collect();
            write!(f, " [{}]", params.join(", "))?;
        }
        Ok(())
    }
}

impl From<&str> for SqlStatement {
    fn from(sql: &str) -> Self {
        Self::new(sql)
    }
}

impl From<String> for SqlStatement {
    fn from(sql: String) -> Self {
        Self::new(sql)
    }
}

/// A persistent store the migration engine runs against.
#[async_trait]
pub trait Store: Send + Sync {
    /// Open a transaction. Its writes are invisible to everyone else until commit.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;

    /// Read committed state only.
    async fn query(&self, stmt: &SqlStatement) -> Result<QueryResult>;

    /// Committed schema of a table, `None` if it does not exist.
    async fn describe_table(&self, name: &str) -> Result<Option<TableSchema>>;
}

/// Transaction-scoped handle. Dropping an unfinished transaction rolls it back.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn execute(&mut self, stmt: &SqlStatement) -> Result<QueryResult>;

    /// Read through the transaction, seeing its own uncommitted writes.
    async fn query(&mut self, stmt: &SqlStatement) -> Result<QueryResult>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;
}
