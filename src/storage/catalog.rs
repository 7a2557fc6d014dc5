use crate::core::{Result, StoreError};
use super::{Table, TableSchema};

/// Catalog of tables.
///
/// Backed by an `im` persistent map, so cloning is O(1) and a clone is an
/// isolated snapshot: a transaction works on its own clone and commit
/// swaps it in (Copy-on-Write).
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: im::HashMap<String, Table>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_table(&mut self, schema: TableSchema) -> Result<()> {
        let name = schema.name().to_string();
        if self.tables.contains_key(&name) {
            return Err(StoreError::TableExists(name));
        }
        self.tables.insert(name, Table::new(schema));
        Ok(())
    }

    pub fn table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))
    }

    pub fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))
    }

    pub fn schema(&self, name: &str) -> Option<TableSchema> {
        self.tables.get(name).map(|t| t.schema().clone())
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn list_tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Column, DataType};

    #[test]
    fn test_clone_is_isolated_snapshot() {
        let mut catalog = Catalog::new();
        catalog
            .create_table(TableSchema::new("events", vec![Column::new("tenant", DataType::Text)]))
            .unwrap();

        let snapshot = catalog.clone();
        catalog.table_mut("events").unwrap().insert(vec!["t1".into()]).unwrap();
        catalog.table_mut("events").unwrap().rename_column("tenant", "brand").unwrap();

        assert_eq!(snapshot.table("events").unwrap().row_count(), 0);
        assert!(snapshot.schema("events").unwrap().has_column("tenant"));
        assert!(catalog.schema("events").unwrap().has_column("brand"));
    }

    #[test]
    fn test_duplicate_table() {
        let mut catalog = Catalog::new();
        let schema = TableSchema::new("t", vec![Column::new("id", DataType::Integer)]);
        catalog.create_table(schema.clone()).unwrap();
        assert_eq!(catalog.create_table(schema), Err(StoreError::TableExists("t".into())));
    }
}
