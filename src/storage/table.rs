use crate::core::{Column, Result, Row, Schema, StoreError, Value};
use im::OrdMap;

pub type RowId = u64;

#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    name: String,
    schema: Schema,
    /// Unique constraints as column positions; positions survive column renames.
    unique: Vec<Vec<usize>>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            schema: Schema::new(columns),
            unique: Vec::new(),
        }
    }

    /// Add a unique constraint over the named columns.
    pub fn with_unique<S: AsRef<str>>(mut self, columns: &[S]) -> Result<Self> {
        let positions = columns
            .iter()
            .map(|c| {
                self.schema
                    .find_column_index(c.as_ref())
                    .ok_or_else(|| StoreError::ColumnNotFound(c.as_ref().to_string(), self.name.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        if positions.is_empty() {
            return Err(StoreError::ExecutionError("UNIQUE constraint needs at least one column".into()));
        }
        if !self.unique.contains(&positions) {
            self.unique.push(positions);
        }
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.schema.find_column_index(column).is_some()
    }

    /// Unique constraints resolved to their current column names.
    pub fn unique_constraints(&self) -> Vec<Vec<String>> {
        let columns = self.schema.columns();
        self.unique
            .iter()
            .map(|positions| positions.iter().map(|&i| columns[i].name.clone()).collect())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct Table {
    schema: TableSchema,
    rows: OrdMap<RowId, Row>,
    next_row_id: RowId,
}

impl Table {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: OrdMap::new(),
            next_row_id: 0,
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn scan(&self) -> Vec<(RowId, Row)> {
        self.rows.iter().map(|(id, row)| (*id, row.clone())).collect()
    }

    pub fn insert(&mut self, row: Row) -> Result<RowId> {
        let row = self.validate_row(row)?;
        self.check_uniqueness(&row, None)?;

        let id = self.next_row_id;
        self.next_row_id += 1;
        self.rows.insert(id, row);
        Ok(id)
    }

    pub fn update(&mut self, id: RowId, row: Row) -> Result<()> {
        if !self.rows.contains_key(&id) {
            return Err(StoreError::ExecutionError(format!(
                "Row {} not found in table '{}'",
                id,
                self.schema.name()
            )));
        }
        let row = self.validate_row(row)?;
        self.check_uniqueness(&row, Some(id))?;
        self.rows.insert(id, row);
        Ok(())
    }

    pub fn delete(&mut self, id: RowId) -> bool {
        self.rows.remove(&id).is_some()
    }

    pub fn rename_column(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        let table = self.schema.name.clone();
        self.schema.schema.rename_column(&table, old_name, new_name)
    }

    fn validate_row(&self, row: Row) -> Result<Row> {
        let columns = self.schema.schema().columns();
        if row.len() != columns.len() {
            return Err(StoreError::ExecutionError(format!(
                "Expected {} columns, got {}",
                columns.len(),
                row.len()
            )));
        }
        columns
            .iter()
            .zip(row)
            .map(|(column, value)| {
                let value = column.data_type.cast_value(&value)?;
                column.validate(&value)?;
                Ok(value)
            })
            .collect()
    }

    fn check_uniqueness(&self, row: &Row, ignore_id: Option<RowId>) -> Result<()> {
        for positions in &self.schema.unique {
            // NULLs never collide, as in SQL.
            if positions.iter().any(|&i| row[i].is_null()) {
                continue;
            }
            let collides = self.rows.iter().any(|(id, existing)| {
                Some(*id) != ignore_id && positions.iter().all(|&i| existing[i] == row[i])
            });
            if collides {
                let columns = self.schema.schema().columns();
                let names: Vec<&str> = positions.iter().map(|&i| columns[i].name.as_str()).collect();
                let values: Vec<String> = positions.iter().map(|&i| display_value(&row[i])).collect();
                return Err(StoreError::ConstraintViolation(format!(
                    "Unique constraint violation on '{}' ({}): ({}) already exists",
                    self.schema.name(),
                    names.join(", "),
                    values.join(", ")
                )));
            }
        }
        Ok(())
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Text(s) => format!("'{}'", s),
        other => other.to_string(),
    }
}
