//! Node model for the requirements graph.
//!
//! # Modules
//!
//! - [`id`]: NodeId, the time-ordered node identifier
//! - [`kinds`]: NodeData and the concrete node kinds
//! - [`node`]: Node, its edges, change tracking and commit state
//! - [`graph`]: Graph arena, edge connect, traversal and the version chain
//! - [`edge`]: association records, the stored form of edges
//! - [`wire`]: JSON wire format
//! - [`error`]: CoreError

pub mod edge;
pub mod error;
pub mod graph;
pub mod id;
pub mod kinds;
pub mod node;
pub mod wire;

// Re-export commonly used types
pub use edge::{Association, Direction};
pub use error::CoreError;
pub use graph::Graph;
pub use id::NodeId;
pub use kinds::{NodeData, NodeKind, TYPE_NAMES};
pub use node::{Node, NodeRef, NodeState};
pub use wire::{GraphDocument, WireNode};
