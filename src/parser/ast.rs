use crate::core::{DataType, Value};
use std::fmt;

/// Root statement type
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateTable(CreateTableStmt),
    AlterTable(AlterTableStmt),
    Insert(InsertStmt),
    Update(UpdateStmt),
    Delete(DeleteStmt),
    Query(QueryStmt),
    /// BEGIN / COMMIT / ROLLBACK found inside a script.
    TransactionControl(String),
}

impl Statement {
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::CreateTable(_) => "CREATE TABLE",
            Statement::AlterTable(_) => "ALTER TABLE",
            Statement::Insert(_) => "INSERT",
            Statement::Update(_) => "UPDATE",
            Statement::Delete(_) => "DELETE",
            Statement::Query(_) => "SELECT",
            Statement::TransactionControl(_) => "TRANSACTION CONTROL",
        }
    }
}

/// CREATE TABLE statement
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableStmt {
    pub table_name: String,
    pub columns: Vec<ColumnDef>,
    /// Table-level `UNIQUE (a, b)` constraints
    pub unique: Vec<Vec<String>>,
    pub if_not_exists: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub unique: bool,
}

/// ALTER TABLE statement
#[derive(Debug, Clone, PartialEq)]
pub struct AlterTableStmt {
    pub table_name: String,
    pub operation: AlterTableOperation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlterTableOperation {
    RenameColumn { old_name: String, new_name: String },
}

/// INSERT statement
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStmt {
    pub table_name: String,
    pub columns: Option<Vec<String>>, // None = all columns
    pub values: Vec<Vec<Expr>>,
}

/// UPDATE statement
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStmt {
    pub table_name: String,
    pub assignments: Vec<Assignment>,
    pub selection: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: String,
    pub value: Expr,
}

/// DELETE statement
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStmt {
    pub table_name: String,
    pub selection: Option<Expr>,
}

/// SELECT over a single table
#[derive(Debug, Clone, PartialEq)]
pub struct QueryStmt {
    pub distinct: bool,
    pub projection: Vec<SelectItem>,
    pub table_name: String,
    pub selection: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Wildcard,
    Expr { expr: Expr, alias: Option<String> },
}

/// Expression types
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference
    Column(String),

    /// Literal value
    Literal(Value),

    /// Parameter placeholder, zero-based (`$1` is `Parameter(0)`)
    Parameter(usize),

    BinaryOp {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },

    Not(Box<Expr>),

    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
    },

    In {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },

    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },

    /// Scalar function call (replace, lower, upper, length)
    Function { name: String, args: Vec<Expr> },

    /// `CASE [operand] WHEN .. THEN .. [ELSE ..] END`
    Case {
        operand: Option<Box<Expr>>,
        branches: Vec<(Expr, Expr)>,
        else_result: Option<Box<Expr>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(name) => write!(f, "{}", name),
            Expr::Literal(Value::Text(s)) => write!(f, "'{}'", s),
            Expr::Literal(val) => write!(f, "{}", val),
            Expr::Parameter(idx) => write!(f, "${}", idx + 1),
            Expr::BinaryOp { left, op, right } => write!(f, "({} {} {})", left, op, right),
            Expr::Not(expr) => write!(f, "NOT {}", expr),
            Expr::Like { expr, pattern, negated } => {
                write!(f, "{} {}LIKE {}", expr, if *negated { "NOT " } else { "" }, pattern)
            }
            Expr::In { expr, list, negated } => {
                let list_str: Vec<String> = list.iter().map(|e| e.to_string()).collect();
                write!(f, "{} {}IN ({})", expr, if *negated { "NOT " } else { "" }, list_str.join(", "))
            }
            Expr::IsNull { expr, negated } => {
                write!(f, "{} IS {}NULL", expr, if *negated { "NOT " } else { "" })
            }
            Expr::Function { name, args } => {
                let args_str: Vec<String> = args.iter().map(|e| e.to_string()).collect();
                write!(f, "{}({})", name, args_str.join(", "))
            }
            Expr::Case { operand, branches, else_result } => {
                write!(f, "CASE")?;
                if let Some(operand) = operand {
                    write!(f, " {}", operand)?;
                }
                for (when, then) in branches {
                    write!(f, " WHEN {} THEN {}", when, then)?;
                }
                if let Some(else_result) = else_result {
                    write!(f, " ELSE {}", else_result)?;
                }
                write!(f, " END")
            }
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOp::Eq => write!(f, "="),
            BinaryOp::NotEq => write!(f, "!="),
            BinaryOp::Lt => write!(f, "<"),
            BinaryOp::LtEq => write!(f, "<="),
            BinaryOp::Gt => write!(f, ">"),
            BinaryOp::GtEq => write!(f, ">="),
            BinaryOp::And => write!(f, "AND"),
            BinaryOp::Or => write!(f, "OR"),
        }
    }
}
