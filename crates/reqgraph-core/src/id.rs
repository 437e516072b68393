//! Stable node identifiers.
//!
//! [`NodeId`] wraps a UUID v7, so identifiers generated in one process sort by
//! creation time. The canonical text form is the lowercase hyphenated UUID,
//! which is also the form used in the database and on the wire.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Globally unique, time-orderable node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Generates a fresh identifier. Successive calls are strictly increasing.
    pub fn generate() -> Self {
        NodeId(Uuid::now_v7())
    }

    /// Parses the canonical string form.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        Uuid::parse_str(s)
            .map(NodeId)
            .map_err(|_| CoreError::InvalidId {
                value: s.to_string(),
            })
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for NodeId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeId::parse(s)
    }
}

impl From<Uuid> for NodeId {
    fn from(uuid: Uuid) -> Self {
        NodeId(uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_and_ordered() {
        let ids: Vec<NodeId> = (0..1000).map(|_| NodeId::generate()).collect();
        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1], "{} !< {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn string_order_matches_id_order() {
        let a = NodeId::generate();
        let b = NodeId::generate();
        assert!(a.to_string() < b.to_string());
    }

    #[test]
    fn display_is_canonical_and_parses_back() {
        let id = NodeId::generate();
        let text = id.to_string();
        assert_eq!(text.len(), 36);
        assert_eq!(text, text.to_lowercase());
        assert_eq!(NodeId::parse(&text).unwrap(), id);
        assert_eq!(text.parse::<NodeId>().unwrap(), id);
    }

    #[test]
    fn parse_rejects_garbage() {
        let err = NodeId::parse("not-a-uuid").unwrap_err();
        assert!(matches!(err, CoreError::InvalidId { .. }));
    }

    #[test]
    fn serde_roundtrip_is_a_plain_string() {
        let id = NodeId::generate();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
