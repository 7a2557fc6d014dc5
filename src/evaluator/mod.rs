use crate::core::{Result, Schema, StoreError, Value};
use crate::expression::pattern::eval_like;
use crate::parser::ast::{BinaryOp, Expr};
use std::cmp::Ordering;

/// Evaluates expressions against a single row of one table.
pub struct EvaluationContext<'a> {
    table: &'a str,
    schema: &'a Schema,
    params: &'a [Value],
}

impl<'a> EvaluationContext<'a> {
    pub fn new(table: &'a str, schema: &'a Schema, params: &'a [Value]) -> Self {
        Self { table, schema, params }
    }

    /// Evaluate without a row: literals, parameters and functions over them.
    pub fn evaluate_constant(&self, expr: &Expr) -> Result<Value> {
        self.evaluate(expr, &[])
    }

    /// WHERE semantics: a missing predicate selects every row, NULL selects none.
    pub fn matches(&self, predicate: Option<&Expr>, row: &[Value]) -> Result<bool> {
        match predicate {
            Some(expr) => Ok(self.evaluate(expr, row)?.is_true()),
            None => Ok(true),
        }
    }

    pub fn evaluate(&self, expr: &Expr, row: &[Value]) -> Result<Value> {
        match expr {
            Expr::Column(name) => {
                let idx = self
                    .schema
                    .find_column_index(name)
                    .ok_or_else(|| StoreError::ColumnNotFound(name.clone(), self.table.to_string()))?;
                row.get(idx).cloned().ok_or_else(|| {
                    StoreError::ExecutionError(format!("Column '{}' is not available here", name))
                })
            }
            Expr::Literal(val) => Ok(val.clone()),
            Expr::Parameter(idx) => self.params.get(*idx).cloned().ok_or_else(|| {
                StoreError::ExecutionError(format!(
                    "Missing value for parameter ${} ({} bound)",
                    idx + 1,
                    self.params.len()
                ))
            }),
            Expr::BinaryOp { left, op, right } => self.evaluate_binary(left, *op, right, row),
            Expr::Not(inner) => match self.evaluate(inner, row)? {
                Value::Boolean(b) => Ok(Value::Boolean(!b)),
                Value::Null => Ok(Value::Null),
                other => Err(StoreError::TypeMismatch(format!(
                    "NOT expects BOOLEAN, got {}",
                    other.type_name()
                ))),
            },
            Expr::IsNull { expr, negated } => {
                let is_null = self.evaluate(expr, row)?.is_null();
                Ok(Value::Boolean(is_null != *negated))
            }
            Expr::Like { expr, pattern, negated } => {
                let value = self.evaluate(expr, row)?;
                let pattern = self.evaluate(pattern, row)?;
                match (value, pattern) {
                    (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
                    (Value::Text(text), Value::Text(pattern)) => {
                        Ok(Value::Boolean(eval_like(&text, &pattern)? != *negated))
                    }
                    (v, p) => Err(StoreError::TypeMismatch(format!(
                        "LIKE expects TEXT operands, got {} and {}",
                        v.type_name(),
                        p.type_name()
                    ))),
                }
            }
            Expr::In { expr, list, negated } => {
                let value = self.evaluate(expr, row)?;
                if value.is_null() {
                    return Ok(Value::Null);
                }
                for item in list {
                    if self.evaluate(item, row)? == value {
                        return Ok(Value::Boolean(!*negated));
                    }
                }
                Ok(Value::Boolean(*negated))
            }
            Expr::Function { name, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.evaluate(arg, row))
                    .collect::<Result<Vec<_>>>()?;
                call_function(name, args)
            }
            Expr::Case { operand, branches, else_result } => {
                let operand = operand.as_deref().map(|e| self.evaluate(e, row)).transpose()?;
                for (when, then) in branches {
                    let hit = match &operand {
                        // Simple form: NULL never equals anything.
                        Some(value) => !value.is_null() && self.evaluate(when, row)? == *value,
                        None => self.evaluate(when, row)?.is_true(),
                    };
                    if hit {
                        return self.evaluate(then, row);
                    }
                }
                match else_result {
                    Some(expr) => self.evaluate(expr, row),
                    None => Ok(Value::Null),
                }
            }
        }
    }

    fn evaluate_binary(&self, left: &Expr, op: BinaryOp, right: &Expr, row: &[Value]) -> Result<Value> {
        let l = self.evaluate(left, row)?;
        let r = self.evaluate(right, row)?;

        match op {
            BinaryOp::And => match (&l, &r) {
                (Value::Boolean(false), _) | (_, Value::Boolean(false)) => Ok(Value::Boolean(false)),
                (Value::Boolean(true), Value::Boolean(true)) => Ok(Value::Boolean(true)),
                _ => Ok(Value::Null),
            },
            BinaryOp::Or => match (&l, &r) {
                (Value::Boolean(true), _) | (_, Value::Boolean(true)) => Ok(Value::Boolean(true)),
                (Value::Boolean(false), Value::Boolean(false)) => Ok(Value::Boolean(false)),
                _ => Ok(Value::Null),
            },
            _ => {
                if l.is_null() || r.is_null() {
                    return Ok(Value::Null);
                }
                let ordering = l.compare(&r)?;
                let result = match op {
                    BinaryOp::Eq => ordering == Ordering::Equal,
                    BinaryOp::NotEq => ordering != Ordering::Equal,
                    BinaryOp::Lt => ordering == Ordering::Less,
                    BinaryOp::LtEq => ordering != Ordering::Greater,
                    BinaryOp::Gt => ordering == Ordering::Greater,
                    BinaryOp::GtEq => ordering != Ordering::Less,
                    BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
                };
                Ok(Value::Boolean(result))
            }
        }
    }
}

fn call_function(name: &str, args: Vec<Value>) -> Result<Value> {
    if args.iter().any(Value::is_null) {
        return Ok(Value::Null);
    }

    match (name, args.as_slice()) {
        ("replace", [Value::Text(s), Value::Text(from), Value::Text(to)]) => {
            // Postgres: replacing an empty string is a no-op
            if from.is_empty() {
                Ok(Value::Text(s.clone()))
            } else {
                Ok(Value::Text(s.replace(from.as_str(), to)))
            }
        }
        ("lower", [Value::Text(s)]) => Ok(Value::Text(s.to_lowercase())),
        ("upper", [Value::Text(s)]) => Ok(Value::Text(s.to_uppercase())),
        ("length", [Value::Text(s)]) => Ok(Value::Integer(s.chars().count() as i64)),
        _ => Err(StoreError::UnsupportedOperation(format!(
            "Unsupported function call {}({})",
            name,
            args.iter().map(Value::type_name).collect::<Vec<_>>().join(", ")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Column, DataType, Row};

    fn schema() -> Schema {
        Schema::new(vec![
            Column::new("app", DataType::Text),
            Column::new("name", DataType::Text),
        ])
    }

    fn col(name: &str) -> Box<Expr> {
        Box::new(Expr::Column(name.into()))
    }

    fn text(s: &str) -> Expr {
        Expr::Literal(Value::Text(s.into()))
    }

    #[test]
    fn test_replace_function() {
        let schema = schema();
        let ctx = EvaluationContext::new("django_migrations", &schema, &[]);
        let row: Row = vec!["authentik_brands".into(), "0005_import_from_tenants".into()];
        let expr = Expr::Function {
            name: "replace".into(),
            args: vec![Expr::Column("name".into()), text("tenant"), text("brand")],
        };
        assert_eq!(ctx.evaluate(&expr, &row).unwrap(), Value::Text("0005_import_from_brands".into()));
    }

    #[test]
    fn test_where_with_parameters() {
        let schema = schema();
        let params = vec![Value::Text("authentik_brands".into())];
        let ctx = EvaluationContext::new("django_migrations", &schema, &params);
        let predicate = Expr::BinaryOp {
            left: col("app"),
            op: BinaryOp::Eq,
            right: Box::new(Expr::Parameter(0)),
        };

        let hit: Row = vec!["authentik_brands".into(), "0001".into()];
        let miss: Row = vec!["authentik_events".into(), "0001".into()];
        assert!(ctx.matches(Some(&predicate), &hit).unwrap());
        assert!(!ctx.matches(Some(&predicate), &miss).unwrap());
        assert!(ctx.matches(None, &miss).unwrap());
    }

    #[test]
    fn test_null_comparison_selects_nothing() {
        let schema = schema();
        let ctx = EvaluationContext::new("t", &schema, &[]);
        let row: Row = vec![Value::Null, "x".into()];
        let predicate = Expr::BinaryOp { left: col("app"), op: BinaryOp::Eq, right: Box::new(text("a")) };
        assert!(!ctx.matches(Some(&predicate), &row).unwrap());
    }

    #[test]
    fn test_missing_parameter() {
        let schema = schema();
        let ctx = EvaluationContext::new("t", &schema, &[]);
        assert!(ctx.evaluate_constant(&Expr::Parameter(0)).is_err());
    }

    #[test]
    fn test_simple_case() {
        let schema = schema();
        let params = vec![Value::from("aabb"), Value::from("aab"), Value::from("aab"), Value::from("aa")];
        let ctx = EvaluationContext::new("t", &schema, &params);
        let expr = Expr::Case {
            operand: Some(col("app")),
            branches: vec![
                (Expr::Parameter(0), Expr::Parameter(1)),
                (Expr::Parameter(2), Expr::Parameter(3)),
            ],
            else_result: None,
        };

        let row: Row = vec!["aabb".into(), "x".into()];
        assert_eq!(ctx.evaluate(&expr, &row).unwrap(), Value::from("aab"));
        let row: Row = vec!["aab".into(), "x".into()];
        assert_eq!(ctx.evaluate(&expr, &row).unwrap(), Value::from("aa"));
        let row: Row = vec![Value::Null, "x".into()];
        assert_eq!(ctx.evaluate(&expr, &row).unwrap(), Value::Null);
    }
}
