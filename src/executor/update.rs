use super::{ExecutionContext, Executor};
use crate::core::{Result, StoreError};
use crate::evaluator::EvaluationContext;
use crate::parser::ast::{Statement, UpdateStmt};
use crate::result::QueryResult;

pub struct UpdateExecutor;

impl Executor for UpdateExecutor {
    fn name(&self) -> &'static str {
        "UPDATE"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(stmt, Statement::Update(_))
    }

    fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        match stmt {
            Statement::Update(update) => self.execute_update(update, ctx),
            _ => unreachable!(),
        }
    }
}

impl UpdateExecutor {
    fn execute_update(&self, update: &UpdateStmt, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        let params = ctx.params;
        let table = ctx.catalog.table_mut(&update.table_name)?;
        let schema = table.schema().schema().clone();
        let evaluator = EvaluationContext::new(&update.table_name, &schema, params);

        let targets = update
            .assignments
            .iter()
            .map(|assignment| {
                schema
                    .find_column_index(&assignment.column)
                    .map(|idx| (idx, &assignment.value))
                    .ok_or_else(|| {
                        StoreError::ColumnNotFound(assignment.column.clone(), update.table_name.clone())
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        // Every assignment sees the row as it was before the statement.
        let mut changes = Vec::new();
        for (id, row) in table.scan() {
            if !evaluator.matches(update.selection.as_ref(), &row)? {
                continue;
            }
            let mut new_row = row.clone();
            for (idx, expr) in &targets {
                new_row[*idx] = evaluator.evaluate(expr, &row)?;
            }
            changes.push((id, new_row));
        }

        let updated = changes.len() as u64;
        for (id, new_row) in changes {
            table.update(id, new_row)?;
        }

        Ok(QueryResult::affected(updated))
    }
}
