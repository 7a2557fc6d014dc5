use crate::core::Value;
use crate::storage::Catalog;

/// Execution state for one statement: the transaction's working catalog
/// plus the positional parameters bound to the statement.
pub struct ExecutionContext<'a> {
    pub catalog: &'a mut Catalog,
    pub params: &'a [Value],
}

impl<'a> ExecutionContext<'a> {
    pub fn new(catalog: &'a mut Catalog, params: &'a [Value]) -> Self {
        Self { catalog, params }
    }
}
