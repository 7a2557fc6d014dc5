use sqlparser::ast as sql_ast;
use crate::core::{Result, StoreError, Value};
use crate::parser::ast::{BinaryOp, Expr};

/// Converts sqlparser expressions into our `Expr`.
pub struct ExpressionConverter;

impl ExpressionConverter {
    pub fn new() -> Self {
        Self
    }

    pub fn convert(&self, expr: sql_ast::Expr) -> Result<Expr> {
        match expr {
            sql_ast::Expr::Identifier(ident) => Ok(Expr::Column(ident.value)),
            // `t.col` - single-table statements only, keep the column part
            sql_ast::Expr::CompoundIdentifier(idents) => idents
                .into_iter()
                .last()
                .map(|ident| Expr::Column(ident.value))
                .ok_or_else(|| StoreError::ParseError("Empty compound identifier".into())),
            sql_ast::Expr::Value(val) => self.convert_value(&val.value),
            sql_ast::Expr::Nested(inner) => self.convert(*inner),
            sql_ast::Expr::BinaryOp { left, op, right } => Ok(Expr::BinaryOp {
                left: Box::new(self.convert(*left)?),
                op: self.convert_binary_op(&op)?,
                right: Box::new(self.convert(*right)?),
            }),
            sql_ast::Expr::UnaryOp { op, expr } => match op {
                sql_ast::UnaryOperator::Not => Ok(Expr::Not(Box::new(self.convert(*expr)?))),
                sql_ast::UnaryOperator::Minus => match self.convert(*expr)? {
                    Expr::Literal(Value::Integer(i)) => Ok(Expr::Literal(Value::Integer(-i))),
                    Expr::Literal(Value::Float(f)) => Ok(Expr::Literal(Value::Float(-f))),
                    other => Err(StoreError::UnsupportedOperation(format!(
                        "Unary minus is only supported on numeric literals, got {}",
                        other
                    ))),
                },
                _ => Err(StoreError::UnsupportedOperation(format!(
                    "Unsupported unary operator: {:?}",
                    op
                ))),
            },
            sql_ast::Expr::IsNull(inner) => Ok(Expr::IsNull {
                expr: Box::new(self.convert(*inner)?),
                negated: false,
            }),
            sql_ast::Expr::IsNotNull(inner) => Ok(Expr::IsNull {
                expr: Box::new(self.convert(*inner)?),
                negated: true,
            }),
            sql_ast::Expr::Like { negated, expr, pattern, .. } => Ok(Expr::Like {
                expr: Box::new(self.convert(*expr)?),
                pattern: Box::new(self.convert(*pattern)?),
                negated,
            }),
            sql_ast::Expr::InList { expr, list, negated } => Ok(Expr::In {
                expr: Box::new(self.convert(*expr)?),
                list: list
                    .into_iter()
                    .map(|e| self.convert(e))
                    .collect::<Result<Vec<_>>>()?,
                negated,
            }),
            sql_ast::Expr::Function(func) => self.convert_function(func),
            sql_ast::Expr::Case {
                operand,
                conditions,
                else_result,
                ..
            } => Ok(Expr::Case {
                operand: operand.map(|e| self.convert(*e).map(Box::new)).transpose()?,
                branches: conditions
                    .into_iter()
                    .map(|when| -> Result<(Expr, Expr)> {
                        Ok((self.convert(when.condition)?, self.convert(when.result)?))
                    })
                    .collect::<Result<Vec<_>>>()?,
                else_result: else_result.map(|e| self.convert(*e).map(Box::new)).transpose()?,
            }),
            other => Err(StoreError::UnsupportedOperation(format!(
                "Unsupported expression: {}",
                other
            ))),
        }
    }

    fn convert_function(&self, func: sql_ast::Function) -> Result<Expr> {
        let name = func.name.to_string().to_lowercase();
        let args = match func.args {
            sql_ast::FunctionArguments::List(arg_list) => arg_list
                .args
                .into_iter()
                .map(|arg| match arg {
                    sql_ast::FunctionArg::Unnamed(sql_ast::FunctionArgExpr::Expr(e)) => self.convert(e),
                    _ => Err(StoreError::UnsupportedOperation(
                        "Only unnamed expression arguments supported in functions".into(),
                    )),
                })
                .collect::<Result<Vec<_>>>()?,
            sql_ast::FunctionArguments::None => Vec::new(),
            sql_ast::FunctionArguments::Subquery(_) => {
                return Err(StoreError::UnsupportedOperation(
                    "Subquery function arguments are not supported".into(),
                ));
            }
        };

        Ok(Expr::Function { name, args })
    }

    pub fn convert_value(&self, val: &sql_ast::Value) -> Result<Expr> {
        let value = match val {
            sql_ast::Value::Number(n, _) => {
                if let Ok(i) = n.parse::<i64>() {
                    Value::Integer(i)
                } else if let Ok(f) = n.parse::<f64>() {
                    Value::Float(f)
                } else {
                    return Err(StoreError::TypeMismatch(format!("Invalid number: {}", n)));
                }
            }
            sql_ast::Value::SingleQuotedString(s) | sql_ast::Value::DoubleQuotedString(s) => {
                Value::Text(s.clone())
            }
            sql_ast::Value::Boolean(b) => Value::Boolean(*b),
            sql_ast::Value::Null => Value::Null,
            sql_ast::Value::Placeholder(p) => return parse_placeholder(p),
            _ => {
                return Err(StoreError::UnsupportedOperation(format!(
                    "Unsupported value: {}",
                    val
                )));
            }
        };
        Ok(Expr::Literal(value))
    }

    fn convert_binary_op(&self, op: &sql_ast::BinaryOperator) -> Result<BinaryOp> {
        use sql_ast::BinaryOperator as SqlOp;

        match op {
            SqlOp::Eq => Ok(BinaryOp::Eq),
            SqlOp::NotEq => Ok(BinaryOp::NotEq),
            SqlOp::Lt => Ok(BinaryOp::Lt),
            SqlOp::LtEq => Ok(BinaryOp::LtEq),
            SqlOp::Gt => Ok(BinaryOp::Gt),
            SqlOp::GtEq => Ok(BinaryOp::GtEq),
            SqlOp::And => Ok(BinaryOp::And),
            SqlOp::Or => Ok(BinaryOp::Or),
            _ => Err(StoreError::UnsupportedOperation(format!(
                "Unsupported binary operator: {}",
                op
            ))),
        }
    }
}

impl Default for ExpressionConverter {
    fn default() -> Self {
        Self::new()
    }
}

/// `$1` -> `Parameter(0)`
fn parse_placeholder(placeholder: &str) -> Result<Expr> {
    placeholder
        .strip_prefix('$')
        .and_then(|n| n.parse::<usize>().ok())
        .filter(|n| *n >= 1)
        .map(|n| Expr::Parameter(n - 1))
        .ok_or_else(|| {
            StoreError::ParseError(format!(
                "Unsupported placeholder '{}', expected $1, $2, ...",
                placeholder
            ))
        })
}
