use super::error::{MigrationError, Result};
use super::transaction::StepTransaction;
use crate::config::validate_identifier;
use crate::core::Value;
use crate::storage::SqlStatement;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchMode {
    /// The whole stored value equals the old symbol.
    #[default]
    Exact,
    /// The old symbol is embedded in a composite value (`authentik.tenants.EventType`).
    Substring,
}

/// Rows and column a value rename applies to.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueScope {
    pub table: String,
    pub column: String,
    /// Extra `column = value` conditions every touched row must satisfy
    pub filter: Vec<(String, Value)>,
}

impl ValueScope {
    pub fn new(table: &str, column: &str) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            filter: Vec::new(),
        }
    }

    pub fn where_eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filter.push((column.to_string(), value.into()));
        self
    }

    /// Render the filter as `AND ...` conditions, numbering placeholders from
    /// `first_param`. Returns the SQL fragment and the values to bind.
    fn render_filter(&self, first_param: usize) -> (String, Vec<Value>) {
        let mut sql = String::new();
        let mut params = Vec::new();
        for (column, value) in &self.filter {
            if value.is_null() {
                sql.push_str(&format!(" AND {} IS NULL", column));
            } else {
                params.push(value.clone());
                sql.push_str(&format!(" AND {} = ${}", column, first_param + params.len() - 1));
            }
        }
        (sql, params)
    }
}

/// A scoped substitution of an old symbol for a new one.
#[derive(Debug, Clone, PartialEq)]
pub enum RenameOperation {
    /// Structural: one `ALTER TABLE ... RENAME COLUMN`.
    Column { table: String, old: String, new: String },
    /// Stored values, guarded by exact match so re-application is a no-op.
    Value {
        scope: ValueScope,
        old: String,
        new: String,
        mode: MatchMode,
    },
}

impl RenameOperation {
    pub fn column(table: &str, old: &str, new: &str) -> Self {
        RenameOperation::Column {
            table: table.to_string(),
            old: old.to_string(),
            new: new.to_string(),
        }
    }

    pub fn value(scope: ValueScope, old: &str, new: &str, mode: MatchMode) -> Self {
        RenameOperation::Value {
            scope,
            old: old.to_string(),
            new: new.to_string(),
            mode,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let (old, new) = match self {
            RenameOperation::Column { table, old, new } => {
                validate_identifier("table", table)?;
                validate_identifier("column", old)?;
                validate_identifier("column", new)?;
                (old, new)
            }
            RenameOperation::Value { scope, old, new, .. } => {
                validate_identifier("table", &scope.table)?;
                validate_identifier("column", &scope.column)?;
                for (column, _) in &scope.filter {
                    validate_identifier("filter column", column)?;
                }
                (old, new)
            }
        };
        if old.is_empty() {
            return Err(MigrationError::InvalidConfig(format!("{}: old symbol is empty", self)));
        }
        if old == new {
            return Err(MigrationError::InvalidConfig(format!("{}: old and new symbol are equal", self)));
        }
        Ok(())
    }

    /// Issue this operation's statements. Returns the number of rows (or
    /// columns) changed.
    pub async fn apply(&self, tx: &mut StepTransaction) -> Result<u64> {
        match self {
            RenameOperation::Column { table, old, new } => {
                tx.execute(SqlStatement::new(format!(
                    "ALTER TABLE {} RENAME COLUMN {} TO {}",
                    table, old, new
                )))
                .await?;
                Ok(1)
            }
            RenameOperation::Value {
                scope,
                old,
                new,
                mode: MatchMode::Exact,
            } => {
                let (filter, filter_params) = scope.render_filter(3);
                let stmt = SqlStatement::new(format!(
                    "UPDATE {table} SET {col} = $1 WHERE {col} = $2{filter}",
                    table = scope.table,
                    col = scope.column,
                    filter = filter
                ))
                .bind(new.as_str())
                .bind(old.as_str());
                let mut params = stmt.params.clone();
                params.extend(filter_params);
                Ok(tx.execute(stmt.with_params(params)).await?.rows_affected)
            }
            RenameOperation::Value {
                scope,
                old,
                new,
                mode: MatchMode::Substring,
            } => apply_substring(tx, scope, old, new).await,
        }
    }
}

/// Read the distinct candidate values, compute replacements here and write
/// them back in one UPDATE. Each row is matched against the value it had
/// before the pass, so a replacement that equals another candidate is never
/// rewritten a second time.
async fn apply_substring(tx: &mut StepTransaction, scope: &ValueScope, old: &str, new: &str) -> Result<u64> {
    let (filter, filter_params) = scope.render_filter(1);
    let select = SqlStatement::new(format!(
        "SELECT DISTINCT {col} FROM {table} WHERE {col} IS NOT NULL{filter}",
        col = scope.column,
        table = scope.table,
        filter = filter
    ))
    .with_params(filter_params);
    let candidates = tx.query(select).await?;

    let mut rewrites = Vec::new();
    for row in &candidates.rows {
        let Some(current) = row.first().and_then(Value::as_str) else {
            continue;
        };
        let replaced = replace_symbol(current, old, new);
        if replaced != current {
            rewrites.push((current.to_string(), replaced));
        }
    }
    if rewrites.is_empty() {
        return Ok(0);
    }

    let mut params = Vec::with_capacity(rewrites.len() * 2);
    let mut branches = String::new();
    let mut matched = Vec::with_capacity(rewrites.len());
    for (current, replaced) in rewrites {
        params.push(Value::from(current));
        params.push(Value::from(replaced));
        branches.push_str(&format!(" WHEN ${} THEN ${}", params.len() - 1, params.len()));
        matched.push(format!("${}", params.len() - 1));
    }
    let (filter, filter_params) = scope.render_filter(params.len() + 1);
    params.extend(filter_params);

    let update = SqlStatement::new(format!(
        "UPDATE {table} SET {col} = CASE {col}{branches} END WHERE {col} IN ({matched}){filter}",
        table = scope.table,
        col = scope.column,
        branches = branches,
        matched = matched.join(", "),
        filter = filter
    ))
    .with_params(params);
    Ok(tx.execute(update).await?.rows_affected)
}

/// Replace every occurrence of `old` in `value` with `new`, except occurrences
/// that already sit inside an occurrence of `new`.
pub fn replace_symbol(value: &str, old: &str, new: &str) -> String {
    if old.is_empty() {
        return value.to_string();
    }

    // Byte ranges covered by `new`, overlapping matches included.
    let mut protected = Vec::new();
    if !new.is_empty() {
        let mut start = 0;
        while let Some(pos) = value[start..].find(new) {
            let at = start + pos;
            protected.push(at..at + new.len());
            let step = value[at..].chars().next().map_or(1, char::len_utf8);
            start = at + step;
        }
    }

    let mut out = String::with_capacity(value.len());
    let mut last = 0;
    for (at, _) in value.match_indices(old) {
        let end = at + old.len();
        if protected.iter().any(|range| range.start <= at && end <= range.end) {
            continue;
        }
        out.push_str(&value[last..at]);
        out.push_str(new);
        last = end;
    }
    out.push_str(&value[last..]);
    out
}

impl fmt::Display for RenameOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenameOperation::Column { table, old, new } => {
                write!(f, "rename column {}.{} -> {}", table, old, new)
            }
            RenameOperation::Value { scope, old, new, mode } => {
                write!(f, "rename {:?} value in {}.{} '{}' -> '{}'", mode, scope.table, scope.column, old, new)?;
                if !scope.filter.is_empty() {
                    let filter: Vec<String> = scope.filter.iter().map(|(c, v)| format!("{} = {}", c, v)).collect();
                    write!(f, " where {}", filter.join(" and "))?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerKey;
    use crate::storage::{MemoryStore, Store};

    #[test]
    fn test_replace_symbol_composite_value() {
        assert_eq!(
            replace_symbol("authentik.tenants.EventType", "authentik.tenants", "authentik.brands"),
            "authentik.brands.EventType"
        );
        assert_eq!(replace_symbol("authentik_tenants", "tenant", "brand"), "authentik_brands");
        assert_eq!(replace_symbol("tenant_tenant", "tenant", "brand"), "brand_brand");
        assert_eq!(replace_symbol("unrelated", "tenant", "brand"), "unrelated");
    }

    #[test]
    fn test_replace_symbol_is_idempotent_when_new_contains_old() {
        let once = replace_symbol("can_view_tenant", "tenant", "tenant_brand");
        assert_eq!(once, "can_view_tenant_brand");
        assert_eq!(replace_symbol(&once, "tenant", "tenant_brand"), once);

        // Mixed: one migrated occurrence, one not.
        assert_eq!(
            replace_symbol("tenant_brand/tenant", "tenant", "tenant_brand"),
            "tenant_brand/tenant_brand"
        );
    }

    #[test]
    fn test_validate() {
        assert!(RenameOperation::column("events", "tenant", "brand").validate().is_ok());
        assert!(RenameOperation::column("events", "tenant", "tenant").validate().is_err());
        assert!(RenameOperation::column("events; --", "tenant", "brand").validate().is_err());

        let scope = ValueScope::new("types", "name").where_eq("app label", "x");
        assert!(RenameOperation::value(scope, "a", "b", MatchMode::Exact).validate().is_err());
        let scope = ValueScope::new("types", "name");
        assert!(RenameOperation::value(scope, "", "b", MatchMode::Exact).validate().is_err());
    }

    async fn step_tx(store: &MemoryStore) -> StepTransaction {
        StepTransaction::new(LedgerKey::new("test", "rename"), store.begin().await.unwrap(), false)
    }

    #[tokio::test]
    async fn test_scoped_exact_rename() {
        let store = MemoryStore::new();
        store
            .execute("CREATE TABLE permissions (app TEXT, name TEXT)")
            .await
            .unwrap();
        store
            .execute(
                "INSERT INTO permissions VALUES ('authentik_brands', 'tenant'), ('other', 'tenant'), (NULL, 'tenant')",
            )
            .await
            .unwrap();

        let op = RenameOperation::value(
            ValueScope::new("permissions", "name").where_eq("app", "authentik_brands"),
            "tenant",
            "brand",
            MatchMode::Exact,
        );
        let mut tx = step_tx(&store).await;
        assert_eq!(op.apply(&mut tx).await.unwrap(), 1);
        assert_eq!(op.apply(&mut tx).await.unwrap(), 0);
        tx.commit().await.unwrap();

        let names = store
            .fetch("SELECT name FROM permissions")
            .await
            .unwrap()
            .column_values("name")
            .unwrap();
        assert_eq!(names, vec![Value::from("brand"), Value::from("tenant"), Value::from("tenant")]);
    }

    #[tokio::test]
    async fn test_substring_rename_touches_only_matching_values() {
        let store = MemoryStore::new();
        store.execute("CREATE TABLE events (app TEXT)").await.unwrap();
        store
            .execute(
                "INSERT INTO events VALUES ('authentik.tenants'), ('authentik.tenants.api'), \
                 ('authentik.brands'), ('authentik.core'), (NULL)",
            )
            .await
            .unwrap();

        let op = RenameOperation::value(
            ValueScope::new("events", "app"),
            "authentik.tenants",
            "authentik.brands",
            MatchMode::Substring,
        );
        let mut tx = step_tx(&store).await;
        assert_eq!(op.apply(&mut tx).await.unwrap(), 2);
        assert_eq!(op.apply(&mut tx).await.unwrap(), 0);
        tx.commit().await.unwrap();

        let apps = store.fetch("SELECT app FROM events").await.unwrap().column_values("app").unwrap();
        assert_eq!(
            apps,
            vec![
                Value::from("authentik.brands"),
                Value::from("authentik.brands.api"),
                Value::from("authentik.brands"),
                Value::from("authentik.core"),
                Value::Null,
            ]
        );
    }

    #[tokio::test]
    async fn test_substring_rename_rewrites_each_row_once() {
        let store = MemoryStore::new();
        store.execute("CREATE TABLE t (v TEXT)").await.unwrap();
        // 'aabb' -> 'aab' equals the other candidate, which itself becomes 'aa'.
        store.execute("INSERT INTO t VALUES ('aabb'), ('aab')").await.unwrap();

        let op = RenameOperation::value(ValueScope::new("t", "v"), "ab", "a", MatchMode::Substring);
        let mut tx = step_tx(&store).await;
        assert_eq!(op.apply(&mut tx).await.unwrap(), 2);
        assert_eq!(tx.statement_count(), 2);
        tx.commit().await.unwrap();

        let values = store.fetch("SELECT v FROM t").await.unwrap().column_values("v").unwrap();
        assert_eq!(values, vec![Value::from("aab"), Value::from("aa")]);
    }
}
