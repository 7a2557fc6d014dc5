pub mod adapter;
pub mod ast;
pub mod expr;

pub use adapter::SqlParserAdapter;
