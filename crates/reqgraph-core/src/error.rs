//! Core error types for reqgraph-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering
//! the failure modes of the node model and the graph arena.

use thiserror::Error;

use crate::id::NodeId;

/// Core errors produced by the reqgraph-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A committed node was edited. Changes go through a change node.
    #[error("node {id} is committed; add a change node to make a change")]
    Committed { id: String },

    /// The change child of a node was already committed.
    #[error("can not discard a committed change (node {id})")]
    NotDiscarded { id: NodeId },

    /// A commit operation was used on a kind without a version chain.
    #[error("node kind '{type_name}' is not commitable")]
    NotCommitable { type_name: &'static str },

    /// A locked Organization was renamed.
    #[error("organization is locked")]
    Locked,

    /// A typed edit was requested for the wrong kind.
    #[error("kind mismatch: expected {expected}, found {found}")]
    KindMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// A node id was not present in the graph.
    #[error("node not found: {id}")]
    NodeNotFound { id: NodeId },

    /// An operation needed an id on a node that was never initialized.
    #[error("node has not been initialized")]
    Uninitialized,

    /// A wire document named a type that no kind provides.
    #[error("unknown node type '{type_name}'")]
    UnknownKind { type_name: String },

    /// Text that should have been a node id.
    #[error("invalid node id '{value}'")]
    InvalidId { value: String },

    /// A wire document was structurally wrong.
    #[error("invalid document: {reason}")]
    InvalidDocument { reason: String },

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
