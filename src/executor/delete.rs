use super::{ExecutionContext, Executor};
use crate::core::Result;
use crate::evaluator::EvaluationContext;
use crate::parser::ast::{DeleteStmt, Statement};
use crate::result::QueryResult;

pub struct DeleteExecutor;

impl Executor for DeleteExecutor {
    fn name(&self) -> &'static str {
        "DELETE"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(stmt, Statement::Delete(_))
    }

    fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        match stmt {
            Statement::Delete(delete) => self.execute_delete(delete, ctx),
            _ => unreachable!(),
        }
    }
}

impl DeleteExecutor {
    fn execute_delete(&self, delete: &DeleteStmt, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        let params = ctx.params;
        let table = ctx.catalog.table_mut(&delete.table_name)?;
        let schema = table.schema().schema().clone();
        let evaluator = EvaluationContext::new(&delete.table_name, &schema, params);

        let mut doomed = Vec::new();
        for (id, row) in table.scan() {
            if evaluator.matches(delete.selection.as_ref(), &row)? {
                doomed.push(id);
            }
        }

        let deleted = doomed.into_iter().filter(|id| table.delete(*id)).count() as u64;
        Ok(QueryResult::affected(deleted))
    }
}
