//! Backends implementing [`crate::GraphQueryService`].

pub mod memory;
pub mod neo4j;

pub use memory::{MemoryGraph, MemoryNode, MemoryRelationship};
pub use neo4j::Neo4jService;
