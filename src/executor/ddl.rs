use super::{ExecutionContext, Executor};
use crate::core::{Column, Result, StoreError};
use crate::parser::ast::{AlterTableOperation, AlterTableStmt, CreateTableStmt, Statement};
use crate::result::QueryResult;
use crate::storage::TableSchema;
use log::debug;

// ============================================================================
// CREATE TABLE
// ============================================================================

pub struct CreateTableExecutor;

impl Executor for CreateTableExecutor {
    fn name(&self) -> &'static str {
        "CREATE TABLE"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(stmt, Statement::CreateTable(_))
    }

    fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        match stmt {
            Statement::CreateTable(create) => self.execute_create(create, ctx),
            _ => unreachable!(),
        }
    }
}

impl CreateTableExecutor {
    fn execute_create(&self, create: &CreateTableStmt, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        if ctx.catalog.table_exists(&create.table_name) {
            if create.if_not_exists {
                debug!("Table '{}' already exists, skipping", create.table_name);
                return Ok(QueryResult::empty());
            }
            return Err(StoreError::TableExists(create.table_name.clone()));
        }

        let mut seen = std::collections::HashSet::new();
        for def in &create.columns {
            if !seen.insert(def.name.as_str()) {
                return Err(StoreError::ColumnExists(def.name.clone(), create.table_name.clone()));
            }
        }

        let columns = create
            .columns
            .iter()
            .map(|def| {
                let column = Column::new(def.name.clone(), def.data_type.clone());
                if def.nullable { column } else { column.not_null() }
            })
            .collect();

        let mut schema = TableSchema::new(create.table_name.clone(), columns);
        for def in create.columns.iter().filter(|def| def.unique) {
            schema = schema.with_unique(&[def.name.as_str()])?;
        }
        for constraint in &create.unique {
            schema = schema.with_unique(constraint.as_slice())?;
        }

        ctx.catalog.create_table(schema)?;
        debug!("Created table '{}'", create.table_name);
        Ok(QueryResult::empty())
    }
}

// ============================================================================
// ALTER TABLE
// ============================================================================

pub struct AlterTableExecutor;

impl Executor for AlterTableExecutor {
    fn name(&self) -> &'static str {
        "ALTER TABLE"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(stmt, Statement::AlterTable(_))
    }

    fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        match stmt {
            Statement::AlterTable(alter) => self.execute_alter(alter, ctx),
            _ => unreachable!(),
        }
    }
}

impl AlterTableExecutor {
    fn execute_alter(&self, alter: &AlterTableStmt, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        let table = ctx.catalog.table_mut(&alter.table_name)?;
        match &alter.operation {
            AlterTableOperation::RenameColumn { old_name, new_name } => {
                table.rename_column(old_name, new_name)?;
                debug!(
                    "Renamed column '{}.{}' to '{}'",
                    alter.table_name, old_name, new_name
                );
            }
        }
        Ok(QueryResult::empty())
    }
}
