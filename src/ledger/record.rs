use crate::core::{Row, StoreError, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one migration: unique name within a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LedgerKey {
    pub namespace: String,
    pub name: String,
}

impl LedgerKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// One applied migration. `applied_at` is informational; presence is what counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub key: LedgerKey,
    pub applied_at: DateTime<Utc>,
}

impl LedgerRecord {
    pub fn new(key: LedgerKey, applied_at: DateTime<Utc>) -> Self {
        Self { key, applied_at }
    }

    /// Decode a `(namespace, name, applied_at)` row.
    pub(crate) fn from_row(row: &Row) -> Result<Self, StoreError> {
        match row.as_slice() {
            [Value::Text(namespace), Value::Text(name), applied_at] => {
                let applied_at = applied_at.as_timestamp().ok_or_else(|| {
                    StoreError::TypeMismatch(format!(
                        "ledger applied_at must be a TIMESTAMP, got {}",
                        applied_at.type_name()
                    ))
                })?;
                Ok(Self {
                    key: LedgerKey::new(namespace.clone(), name.clone()),
                    applied_at,
                })
            }
            _ => Err(StoreError::TypeMismatch(format!(
                "malformed ledger row: {:?}",
                row
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_row() {
        let now = Utc::now();
        let record =
            LedgerRecord::from_row(&vec!["events".into(), "0001".into(), Value::Timestamp(now)]).unwrap();
        assert_eq!(record.key, LedgerKey::new("events", "0001"));
        assert_eq!(record.applied_at, now);

        assert!(LedgerRecord::from_row(&vec!["events".into(), Value::Null, Value::Timestamp(now)]).is_err());
        assert!(LedgerRecord::from_row(&vec!["events".into(), "0001".into(), "yesterday".into()]).is_err());
    }
}
