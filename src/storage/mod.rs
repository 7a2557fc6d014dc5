pub mod catalog;
pub mod engine;
pub mod memory;
pub mod table;

pub use catalog::Catalog;
pub use engine::{SqlStatement, Store, StoreTransaction};
pub use memory::{MemoryStore, MemoryTransaction};
pub use table::{RowId, Table, TableSchema};
