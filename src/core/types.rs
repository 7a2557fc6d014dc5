use super::{DataType, Result, StoreError, Value};

pub type Row = Vec<Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn validate(&self, value: &Value) -> Result<()> {
        if value.is_null() {
            if !self.nullable {
                return Err(StoreError::ConstraintViolation(format!(
                    "Column '{}' cannot be NULL",
                    self.name
                )));
            }
            return Ok(());
        }

        if !self.data_type.is_compatible(value) {
            return Err(StoreError::TypeMismatch(format!(
                "Column '{}' expects type {}, got {}",
                self.name,
                self.data_type,
                value.type_name()
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn find_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|col| col.name == name)
    }

    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.find_column_index(name).map(|idx| &self.columns[idx])
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Rename a column in place. Column positions, and therefore stored rows, are untouched.
    pub(crate) fn rename_column(&mut self, table: &str, old_name: &str, new_name: &str) -> Result<()> {
        if self.find_column_index(new_name).is_some() {
            return Err(StoreError::ColumnExists(new_name.to_string(), table.to_string()));
        }
        let idx = self
            .find_column_index(old_name)
            .ok_or_else(|| StoreError::ColumnNotFound(old_name.to_string(), table.to_string()))?;
        self.columns[idx].name = new_name.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new(vec![
            Column::new("id", DataType::Integer).not_null(),
            Column::new("tenant", DataType::Text),
        ])
    }

    #[test]
    fn test_rename_column() {
        let mut schema = schema();
        schema.rename_column("events", "tenant", "brand").unwrap();
        assert_eq!(schema.find_column_index("brand"), Some(1));
        assert!(schema.get_column("tenant").is_none());
    }

    #[test]
    fn test_rename_column_rejects_collision_and_missing() {
        let mut schema = schema();
        assert_eq!(
            schema.rename_column("events", "tenant", "id"),
            Err(StoreError::ColumnExists("id".into(), "events".into()))
        );
        assert_eq!(
            schema.rename_column("events", "missing", "brand"),
            Err(StoreError::ColumnNotFound("missing".into(), "events".into()))
        );
    }

    #[test]
    fn test_not_null_validation() {
        let schema = schema();
        assert!(schema.columns()[0].validate(&Value::Null).is_err());
        assert!(schema.columns()[1].validate(&Value::Null).is_ok());
        assert!(schema.columns()[1].validate(&Value::Integer(1)).is_err());
    }
}
