use super::{ExecutionContext, Executor};
use crate::core::{Result, Row, StoreError, Value};
use crate::evaluator::EvaluationContext;
use crate::parser::ast::{InsertStmt, Statement};
use crate::result::QueryResult;

pub struct InsertExecutor;

impl Executor for InsertExecutor {
    fn name(&self) -> &'static str {
        "INSERT"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(stmt, Statement::Insert(_))
    }

    fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        match stmt {
            Statement::Insert(insert) => self.execute_insert(insert, ctx),
            _ => unreachable!(),
        }
    }
}

impl InsertExecutor {
    fn execute_insert(&self, insert: &InsertStmt, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        let params = ctx.params;
        let table = ctx.catalog.table_mut(&insert.table_name)?;
        let schema = table.schema().schema().clone();

        // Target position for each supplied value.
        let positions: Vec<usize> = match &insert.columns {
            Some(columns) => columns
                .iter()
                .map(|name| {
                    schema
                        .find_column_index(name)
                        .ok_or_else(|| StoreError::ColumnNotFound(name.clone(), insert.table_name.clone()))
                })
                .collect::<Result<_>>()?,
            None => (0..schema.column_count()).collect(),
        };

        let evaluator = EvaluationContext::new(&insert.table_name, &schema, params);
        let mut inserted = 0u64;

        for values in &insert.values {
            if values.len() != positions.len() {
                return Err(StoreError::ExecutionError(format!(
                    "INSERT into '{}' expects {} values, got {}",
                    insert.table_name,
                    positions.len(),
                    values.len()
                )));
            }

            let mut row: Row = vec![Value::Null; schema.column_count()];
            for (expr, &idx) in values.iter().zip(&positions) {
                row[idx] = evaluator.evaluate_constant(expr)?;
            }

            table.insert(row)?;
            inserted += 1;
        }

        Ok(QueryResult::affected(inserted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorPipeline;
    use crate::parser::SqlParserAdapter;
    use crate::storage::Catalog;

    fn run(catalog: &mut Catalog, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let pipeline = ExecutorPipeline::with_default_executors();
        let mut result = QueryResult::empty();
        for stmt in SqlParserAdapter::new().parse(sql)? {
            let mut ctx = ExecutionContext::new(catalog, params);
            result.merge(pipeline.execute(&stmt, &mut ctx)?);
        }
        Ok(result)
    }

    #[test]
    fn test_insert_with_columns_and_params() {
        let mut catalog = Catalog::new();
        run(&mut catalog, "CREATE TABLE t (a TEXT, b INTEGER, c TEXT)", &[]).unwrap();
        let result = run(
            &mut catalog,
            "INSERT INTO t (c, a) VALUES ($1, 'x'), ('z', $2)",
            &["first".into(), "y".into()],
        )
        .unwrap();
        assert_eq!(result.rows_affected, 2);

        let rows: Vec<Row> = catalog.table("t").unwrap().scan().into_iter().map(|(_, r)| r).collect();
        assert_eq!(rows[0], vec![Value::from("x"), Value::Null, Value::from("first")]);
        assert_eq!(rows[1], vec![Value::from("y"), Value::Null, Value::from("z")]);
    }

    #[test]
    fn test_failed_multi_row_insert_leaves_table_unchanged() {
        let mut catalog = Catalog::new();
        run(&mut catalog, "CREATE TABLE t (k TEXT UNIQUE)", &[]).unwrap();
        run(&mut catalog, "INSERT INTO t VALUES ('a')", &[]).unwrap();

        let err = run(&mut catalog, "INSERT INTO t VALUES ('b'), ('a')", &[]).unwrap_err();
        assert!(err.is_constraint_violation());
        assert_eq!(catalog.table("t").unwrap().row_count(), 1);
    }

    #[test]
    fn test_missing_parameter() {
        let mut catalog = Catalog::new();
        run(&mut catalog, "CREATE TABLE t (k TEXT)", &[]).unwrap();
        let err = run(&mut catalog, "INSERT INTO t VALUES ($1)", &[]).unwrap_err();
        assert!(matches!(err, StoreError::ExecutionError(_)));
    }
}
