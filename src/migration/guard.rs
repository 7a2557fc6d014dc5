use super::error::Result;
use super::step::StoreReader;
use crate::ledger::LedgerKey;
use async_recursion::async_recursion;
use std::fmt;

/// Predicate deciding whether a step still needs to run.
///
/// Always evaluated against committed state and never cached: the store may
/// change between two evaluations (process restarts, other migration histories).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Guard {
    #[default]
    Always,
    /// Another migration (possibly from an unrelated history) has committed.
    RecordPresent(LedgerKey),
    RecordAbsent(LedgerKey),
    TableExists(String),
    ColumnExists { table: String, column: String },
    Not(Box<Guard>),
    /// Short-circuits on the first false guard.
    All(Vec<Guard>),
    /// Short-circuits on the first true guard.
    Any(Vec<Guard>),
}

impl Guard {
    pub fn record_present(namespace: &str, name: &str) -> Self {
        Guard::RecordPresent(LedgerKey::new(namespace, name))
    }

    pub fn record_absent(namespace: &str, name: &str) -> Self {
        Guard::RecordAbsent(LedgerKey::new(namespace, name))
    }

    pub fn table_exists(table: &str) -> Self {
        Guard::TableExists(table.to_string())
    }

    pub fn column_exists(table: &str, column: &str) -> Self {
        Guard::ColumnExists {
            table: table.to_string(),
            column: column.to_string(),
        }
    }

    pub fn negate(guard: Guard) -> Self {
        Guard::Not(Box::new(guard))
    }

    #[async_recursion]
    pub async fn evaluate<'r>(&self, reader: &StoreReader<'r>) -> Result<bool> {
        match self {
            Guard::Always => Ok(true),
            Guard::RecordPresent(key) => reader.has_record(key).await,
            Guard::RecordAbsent(key) => Ok(!reader.has_record(key).await?),
            Guard::TableExists(table) => reader.table_exists(table).await,
            Guard::ColumnExists { table, column } => reader.column_exists(table, column).await,
            Guard::Not(inner) => Ok(!inner.evaluate(reader).await?),
            Guard::All(guards) => {
                for guard in guards {
                    if !guard.evaluate(reader).await? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Guard::Any(guards) => {
                for guard in guards {
                    if guard.evaluate(reader).await? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |guards: &[Guard], sep: &str| {
            guards.iter().map(|g| g.to_string()).collect::<Vec<_>>().join(sep)
        };
        match self {
            Guard::Always => write!(f, "always"),
            Guard::RecordPresent(key) => write!(f, "recorded({})", key),
            Guard::RecordAbsent(key) => write!(f, "not recorded({})", key),
            Guard::TableExists(table) => write!(f, "table({})", table),
            Guard::ColumnExists { table, column } => write!(f, "column({}.{})", table, column),
            Guard::Not(inner) => write!(f, "not {}", inner),
            Guard::All(guards) => write!(f, "({})", join(guards, " and ")),
            Guard::Any(guards) => write!(f, "({})", join(guards, " or ")),
        }
    }
}
