//! Association records: the persisted form of `up`/`down` edges.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::id::NodeId;

/// Which of the owner's edge lists an association belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            other => Err(CoreError::InvalidDocument {
                reason: format!("unknown association direction '{}'", other),
            }),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stored edge: `related` appears in `owner`'s `direction` list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Association {
    pub owner: NodeId,
    pub related: NodeId,
    pub direction: Direction,
}
