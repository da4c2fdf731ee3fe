//! Persistence layer — the `Repository` trait and its backends.

pub mod libsql;
pub mod memory;
pub mod traits;

pub use libsql::LibSqlRepository;
pub use memory::MemoryRepository;
pub use traits::Repository;
