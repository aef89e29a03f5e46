//! Core data model: nodes, positions, attribute records, categories, paths

mod attribute;
mod category;
mod edge;
mod node;
mod path;

pub use attribute::{AttributeRecord, AttributeValue, FieldValues};
pub use category::{CategoryDescriptor, CategoryRegistry, FieldPolicy, FieldSpec, ScopeFilter};
pub use edge::Position;
pub use node::{Node, NodeId, NodeKind};
pub use path::LeafPath;
