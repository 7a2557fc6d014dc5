use super::ExecutionContext;
use crate::core::{Result, StoreError};
use crate::parser::ast::Statement;
use crate::result::QueryResult;
use log::debug;

pub trait Executor: Send + Sync {
    /// Executor name for diagnostics
    fn name(&self) -> &'static str;

    fn can_handle(&self, stmt: &Statement) -> bool;

    fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult>;
}

pub struct ExecutorPipeline {
    executors: Vec<Box<dyn Executor>>,
}

impl ExecutorPipeline {
    pub fn new() -> Self {
        Self {
            executors: Vec::new(),
        }
    }

    /// Pipeline with every built-in executor registered.
    pub fn with_default_executors() -> Self {
        use super::{ddl, delete, dml, query, update};

        let mut pipeline = Self::new();
        pipeline.register(Box::new(ddl::CreateTableExecutor));
        pipeline.register(Box::new(ddl::AlterTableExecutor));
        pipeline.register(Box::new(dml::InsertExecutor));
        pipeline.register(Box::new(update::UpdateExecutor));
        pipeline.register(Box::new(delete::DeleteExecutor));
        pipeline.register(Box::new(query::QueryExecutor));
        pipeline
    }

    pub fn register(&mut self, executor: Box<dyn Executor>) {
        self.executors.push(executor);
    }

    /// Execute one statement. A failing statement leaves the catalog as it was
    /// before the statement started.
    pub fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        if let Statement::TransactionControl(control) = stmt {
            return Err(StoreError::UnsupportedOperation(format!(
                "'{}' is not allowed here: transaction boundaries are managed by the store handle",
                control
            )));
        }

        let executor = self.executor_for(stmt)?;
        debug!("{} executor: {}", executor.name(), stmt.kind());

        let before = ctx.catalog.clone();
        let result = executor.execute(stmt, ctx);
        if result.is_err() {
            *ctx.catalog = before;
        }
        result
    }
}

impl ExecutorPipeline {
    fn executor_for(&self, stmt: &Statement) -> Result<&dyn Executor> {
        self.executors
            .iter()
            .find(|executor| executor.can_handle(stmt))
            .map(|executor| executor.as_ref())
            .ok_or_else(|| StoreError::UnsupportedOperation(format!("No executor found for {}", stmt.kind())))
    }
}

impl Default for ExecutorPipeline {
    fn default() -> Self {
        Self::with_default_executors()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::SqlParserAdapter;

    fn route(pipeline: &ExecutorPipeline, sql: &str) -> Result<&'static str> {
        let stmt = SqlParserAdapter::new().parse(sql)?.remove(0);
        Ok(pipeline.executor_for(&stmt)?.name())
    }

    #[test]
    fn test_statements_reach_their_executor() {
        let pipeline = ExecutorPipeline::with_default_executors();
        assert_eq!(route(&pipeline, "UPDATE t SET v = 'a'").unwrap(), "UPDATE");
        assert_eq!(route(&pipeline, "SELECT v FROM t").unwrap(), "SELECT");
        assert_eq!(route(&pipeline, "DELETE FROM t").unwrap(), "DELETE");

        let empty = ExecutorPipeline::new();
        assert!(matches!(
            route(&empty, "SELECT v FROM t"),
            Err(StoreError::UnsupportedOperation(_))
        ));
    }
}
