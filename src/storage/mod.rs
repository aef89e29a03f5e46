//! Storage collaborators
//!
//! The engine reads the ownership graph through `GraphStore` and attribute
//! records through `AttributeStore`. `SqliteStore` is the persistent
//! backend; `MemoryStore` is an in-process snapshot.

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{AttributeStore, GraphStore, OpenStore, StorageError, StorageResult};
