// ============================================================================
// src/parser/adapter.rs - sqlparser AST -> internal statements
// ============================================================================

use sqlparser::ast as sql_ast;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use crate::core::{DataType, Result, StoreError};
use crate::parser::ast::*;
use crate::parser::expr::ExpressionConverter;

pub struct SqlParserAdapter {
    dialect: PostgreSqlDialect,
    expr_converter: ExpressionConverter,
}

impl SqlParserAdapter {
    pub fn new() -> Self {
        Self {
            dialect: PostgreSqlDialect {},
            expr_converter: ExpressionConverter::new(),
        }
    }

    /// Parse a script of one or more `;`-separated statements.
    pub fn parse(&self, sql: &str) -> Result<Vec<Statement>> {
        let trimmed = sql.trim().trim_end_matches(';').trim().to_uppercase();
        if matches!(
            trimmed.as_str(),
            "BEGIN" | "BEGIN TRANSACTION" | "START TRANSACTION" | "COMMIT" | "COMMIT TRANSACTION"
                | "ROLLBACK" | "ROLLBACK TRANSACTION"
        ) {
            return Ok(vec![Statement::TransactionControl(trimmed)]);
        }

        let external_stmts = Parser::parse_sql(&self.dialect, sql)
            .map_err(|e| StoreError::ParseError(e.to_string()))?;

        if external_stmts.is_empty() {
            return Err(StoreError::ParseError("No statement found".into()));
        }

        external_stmts
            .into_iter()
            .map(|stmt| self.convert_statement(stmt))
            .collect()
    }

    fn convert_statement(&self, stmt: sql_ast::Statement) -> Result<Statement> {
        match stmt {
            sql_ast::Statement::CreateTable(create) => {
                Ok(Statement::CreateTable(self.convert_create_table(create)?))
            }
            sql_ast::Statement::AlterTable { name, operations, .. } => {
                let mut operations = operations.into_iter();
                match (operations.next(), operations.next()) {
                    (Some(operation), None) => {
                        Ok(Statement::AlterTable(self.convert_alter_table(name, operation)?))
                    }
                    _ => Err(StoreError::UnsupportedOperation(
                        "Only single ALTER TABLE operation supported".into(),
                    )),
                }
            }
            sql_ast::Statement::Insert(insert) => Ok(Statement::Insert(self.convert_insert(insert)?)),
            sql_ast::Statement::Query(query) => Ok(Statement::Query(self.convert_query(*query)?)),
            sql_ast::Statement::Delete(delete) => Ok(Statement::Delete(self.convert_delete(delete)?)),
            sql_ast::Statement::Update { table, assignments, selection, .. } => {
                Ok(Statement::Update(self.convert_update(table, assignments, selection)?))
            }
            sql_ast::Statement::StartTransaction { .. } => Ok(Statement::TransactionControl("BEGIN".into())),
            sql_ast::Statement::Commit { .. } => Ok(Statement::TransactionControl("COMMIT".into())),
            sql_ast::Statement::Rollback { .. } => Ok(Statement::TransactionControl("ROLLBACK".into())),
            other => Err(StoreError::UnsupportedOperation(format!(
                "Statement type not supported: {}",
                other
            ))),
        }
    }

    fn convert_create_table(&self, create: sql_ast::CreateTable) -> Result<CreateTableStmt> {
        let table_name = extract_table_name(&create.name)?;
        let columns = create
            .columns
            .into_iter()
            .map(|col| self.convert_column_def(col))
            .collect::<Result<Vec<_>>>()?;

        let mut unique = Vec::new();
        for constraint in create.constraints {
            match constraint {
                sql_ast::TableConstraint::Unique { columns, .. }
                | sql_ast::TableConstraint::PrimaryKey { columns, .. } => {
                    unique.push(columns.iter().map(|c| unquote(&c.to_string())).collect());
                }
                other => {
                    return Err(StoreError::UnsupportedOperation(format!(
                        "Unsupported table constraint: {}",
                        other
                    )));
                }
            }
        }

        Ok(CreateTableStmt {
            table_name,
            columns,
            unique,
            if_not_exists: create.if_not_exists,
        })
    }

    fn convert_column_def(&self, col: sql_ast::ColumnDef) -> Result<ColumnDef> {
        let data_type = self.convert_data_type(&col.data_type)?;
        let nullable = !col
            .options
            .iter()
            .any(|opt| matches!(opt.option, sql_ast::ColumnOption::NotNull));
        let unique = col
            .options
            .iter()
            .any(|opt| matches!(opt.option, sql_ast::ColumnOption::Unique { .. }));

        Ok(ColumnDef {
            name: col.name.value,
            data_type,
            nullable,
            unique,
        })
    }

    fn convert_data_type(&self, dt: &sql_ast::DataType) -> Result<DataType> {
        match dt {
            sql_ast::DataType::Int(_)
            | sql_ast::DataType::Integer(_)
            | sql_ast::DataType::BigInt(_) => Ok(DataType::Integer),

            sql_ast::DataType::Float(_)
            | sql_ast::DataType::Double(_)
            | sql_ast::DataType::Real => Ok(DataType::Float),

            sql_ast::DataType::Text
            | sql_ast::DataType::Varchar(_)
            | sql_ast::DataType::Char(_)
            | sql_ast::DataType::String(_) => Ok(DataType::Text),

            sql_ast::DataType::Boolean | sql_ast::DataType::Bool => Ok(DataType::Boolean),

            sql_ast::DataType::Timestamp(..) => Ok(DataType::Timestamp),

            _ => Err(StoreError::TypeMismatch(format!("Unsupported data type: {}", dt))),
        }
    }

    fn convert_alter_table(
        &self,
        name: sql_ast::ObjectName,
        operation: sql_ast::AlterTableOperation,
    ) -> Result<AlterTableStmt> {
        let table_name = extract_table_name(&name)?;
        let operation = match operation {
            sql_ast::AlterTableOperation::RenameColumn { old_column_name, new_column_name } => {
                AlterTableOperation::RenameColumn {
                    old_name: old_column_name.value,
                    new_name: new_column_name.value,
                }
            }
            other => {
                return Err(StoreError::UnsupportedOperation(format!(
                    "Unsupported ALTER TABLE operation: {}",
                    other
                )));
            }
        };

        Ok(AlterTableStmt { table_name, operation })
    }

    fn convert_insert(&self, insert: sql_ast::Insert) -> Result<InsertStmt> {
        let table_name = unquote(&insert.table.to_string());

        let columns = if insert.columns.is_empty() {
            None
        } else {
            Some(insert.columns.into_iter().map(|id| id.value).collect())
        };

        let values = if let Some(source) = insert.source {
            if let sql_ast::SetExpr::Values(vals) = *source.body {
                vals.rows
                    .into_iter()
                    .map(|row| {
                        row.into_iter()
                            .map(|expr| self.expr_converter.convert(expr))
                            .collect::<Result<Vec<_>>>()
                    })
                    .collect::<Result<Vec<_>>>()?
            } else {
                return Err(StoreError::UnsupportedOperation("Only VALUES clause supported".into()));
            }
        } else {
            Vec::new()
        };

        Ok(InsertStmt {
            table_name,
            columns,
            values,
        })
    }

    fn convert_update(
        &self,
        table: sql_ast::TableWithJoins,
        assignments: Vec<sql_ast::Assignment>,
        selection: Option<sql_ast::Expr>,
    ) -> Result<UpdateStmt> {
        let table_name = self.single_table_name(table, "UPDATE")?;

        let assignments = assignments
            .into_iter()
            .map(|assign| {
                let column = match assign.target {
                    sql_ast::AssignmentTarget::ColumnName(col_name) => extract_table_name(&col_name)?,
                    _ => {
                        return Err(StoreError::UnsupportedOperation(
                            "Only simple column names supported in UPDATE".into(),
                        ));
                    }
                };
                let value = self.expr_converter.convert(assign.value)?;
                Ok(Assignment { column, value })
            })
            .collect::<Result<Vec<_>>>()?;

        let selection = selection
            .map(|expr| self.expr_converter.convert(expr))
            .transpose()?;

        Ok(UpdateStmt {
            table_name,
            assignments,
            selection,
        })
    }

    fn convert_delete(&self, delete: sql_ast::Delete) -> Result<DeleteStmt> {
        let tables = match delete.from {
            sql_ast::FromTable::WithFromKeyword(tables) | sql_ast::FromTable::WithoutKeyword(tables) => tables,
        };
        let table = tables
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::ParseError("DELETE requires a table".into()))?;
        let table_name = self.single_table_name(table, "DELETE")?;

        let selection = delete
            .selection
            .map(|expr| self.expr_converter.convert(expr))
            .transpose()?;

        Ok(DeleteStmt { table_name, selection })
    }

    fn convert_query(&self, query: sql_ast::Query) -> Result<QueryStmt> {
        let sql_ast::SetExpr::Select(select) = *query.body else {
            return Err(StoreError::UnsupportedOperation("Only SELECT queries supported".into()));
        };
        let select = *select;

        let mut from = select.from.into_iter();
        let table_name = match (from.next(), from.next()) {
            (Some(table), None) => self.single_table_name(table, "SELECT")?,
            _ => {
                return Err(StoreError::UnsupportedOperation(
                    "SELECT must read from exactly one table".into(),
                ));
            }
        };

        let projection = select
            .projection
            .into_iter()
            .map(|item| self.convert_select_item(item))
            .collect::<Result<Vec<_>>>()?;

        let selection = select
            .selection
            .map(|expr| self.expr_converter.convert(expr))
            .transpose()?;

        Ok(QueryStmt {
            distinct: select.distinct.is_some(),
            projection,
            table_name,
            selection,
        })
    }

    fn convert_select_item(&self, item: sql_ast::SelectItem) -> Result<SelectItem> {
        match item {
            sql_ast::SelectItem::Wildcard(_) => Ok(SelectItem::Wildcard),
            sql_ast::SelectItem::UnnamedExpr(expr) => Ok(SelectItem::Expr {
                expr: self.expr_converter.convert(expr)?,
                alias: None,
            }),
            sql_ast::SelectItem::ExprWithAlias { expr, alias } => Ok(SelectItem::Expr {
                expr: self.expr_converter.convert(expr)?,
                alias: Some(alias.value),
            }),
            _ => Err(StoreError::UnsupportedOperation("Unsupported select item".into())),
        }
    }

    fn single_table_name(&self, table: sql_ast::TableWithJoins, statement: &str) -> Result<String> {
        if !table.joins.is_empty() {
            return Err(StoreError::UnsupportedOperation(format!(
                "JOIN is not supported in {}",
                statement
            )));
        }
        match table.relation {
            sql_ast::TableFactor::Table { name, .. } => extract_table_name(&name),
            _ => Err(StoreError::UnsupportedOperation(format!(
                "Complex table references not supported in {}",
                statement
            ))),
        }
    }
}

impl Default for SqlParserAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn extract_table_name(name: &sql_ast::ObjectName) -> Result<String> {
    name.0
        .last()
        .map(|ident| unquote(&ident.to_string()))
        .ok_or_else(|| StoreError::ParseError("Invalid table name".into()))
}

fn unquote(ident: &str) -> String {
    ident.trim_matches('"').to_string()
}

// ============================================================================
// TESTS
// ============================================================================
