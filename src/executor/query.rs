use super::{ExecutionContext, Executor};
use crate::core::{Result, Row, StoreError};
use crate::evaluator::EvaluationContext;
use crate::parser::ast::{Expr, QueryStmt, SelectItem, Statement};
use crate::result::QueryResult;
use std::collections::HashSet;

pub struct QueryExecutor;

impl Executor for QueryExecutor {
    fn name(&self) -> &'static str {
        "SELECT"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(stmt, Statement::Query(_))
    }

    fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        match stmt {
            Statement::Query(query) => self.execute_query(query, ctx),
            _ => unreachable!(),
        }
    }
}

impl QueryExecutor {
    fn execute_query(&self, query: &QueryStmt, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        let table = ctx.catalog.table(&query.table_name)?;
        let schema = table.schema().schema();
        let evaluator = EvaluationContext::new(&query.table_name, schema, ctx.params);

        let mut columns = Vec::new();
        let mut exprs = Vec::new();
        for item in &query.projection {
            match item {
                SelectItem::Wildcard => {
                    for name in schema.column_names() {
                        exprs.push(Expr::Column(name.clone()));
                        columns.push(name);
                    }
                }
                SelectItem::Expr { expr, alias } => {
                    columns.push(alias.clone().unwrap_or_else(|| output_name(expr)));
                    exprs.push(expr.clone());
                }
            }
        }
        if exprs.is_empty() {
            return Err(StoreError::ExecutionError("SELECT needs at least one column".into()));
        }

        let mut rows = Vec::new();
        let mut seen: HashSet<Row> = HashSet::new();
        for (_, row) in table.scan() {
            if !evaluator.matches(query.selection.as_ref(), &row)? {
                continue;
            }
            let projected = exprs
                .iter()
                .map(|expr| evaluator.evaluate(expr, &row))
                .collect::<Result<Row>>()?;
            if query.distinct && !seen.insert(projected.clone()) {
                continue;
            }
            rows.push(projected);
        }

        Ok(QueryResult::new(columns, rows))
    }
}

fn output_name(expr: &Expr) -> String {
    match expr {
        Expr::Column(name) => name.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;
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

    fn seeded() -> Catalog {
        let mut catalog = Catalog::new();
        run(&mut catalog, "CREATE TABLE roles (tenant TEXT, name TEXT)", &[]).unwrap();
        run(
            &mut catalog,
            "INSERT INTO roles VALUES ('t1', 'admin'), ('t1', 'viewer'), ('t2', 'admin'), (NULL, 'guest')",
            &[],
        )
        .unwrap();
        catalog
    }

    #[test]
    fn test_select_where_and_alias() {
        let mut catalog = seeded();
        let result = run(
            &mut catalog,
            "SELECT name AS role FROM roles WHERE tenant = $1",
            &["t1".into()],
        )
        .unwrap();
        assert_eq!(result.columns, vec!["role".to_string()]);
        assert_eq!(result.rows, vec![vec![Value::from("admin")], vec![Value::from("viewer")]]);
    }

    #[test]
    fn test_select_distinct() {
        let mut catalog = seeded();
        let result = run(&mut catalog, "SELECT DISTINCT name FROM roles", &[]).unwrap();
        assert_eq!(result.row_count(), 3);
    }

    #[test]
    fn test_null_never_matches_equality() {
        let mut catalog = seeded();
        let result = run(&mut catalog, "SELECT * FROM roles WHERE tenant != 't1'", &[]).unwrap();
        assert_eq!(result.rows, vec![vec![Value::from("t2"), Value::from("admin")]]);

        let result = run(&mut catalog, "SELECT name FROM roles WHERE tenant IS NULL", &[]).unwrap();
        assert_eq!(result.rows, vec![vec![Value::from("guest")]]);
    }

    #[test]
    fn test_select_with_delete() {
        let mut catalog = seeded();
        let result = run(
            &mut catalog,
            "DELETE FROM roles WHERE name = 'admin'; SELECT name FROM roles",
            &[],
        )
        .unwrap();
        assert_eq!(result.rows_affected, 2);
        assert_eq!(result.row_count(), 2);
    }
}
