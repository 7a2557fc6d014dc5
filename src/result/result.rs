use crate::core::{Row, Value};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// Rows inserted, updated or deleted by a DML statement
    pub rows_affected: u64,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            rows_affected: 0,
        }
    }

    pub fn affected(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            ..Self::default()
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values of one column, in row order.
    pub fn column_values(&self, name: &str) -> Option<Vec<Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[idx].clone()).collect())
    }

    /// Fold the result of a later statement of the same script into this one.
    pub(crate) fn merge(&mut self, next: QueryResult) {
        self.rows_affected += next.rows_affected;
        if !next.columns.is_empty() {
            self.columns = next.columns;
            self.rows = next.rows;
        }
    }
}
