//! Graph locator: lists the stored graphs.
//!
//! A stored graph is identified by its `GraphNode` root. The locator reads
//! every `graph_node` row so a server can advertise what it holds.

use indexmap::IndexMap;

use reqgraph_core::NodeId;

use crate::database::Database;
use crate::error::StorageError;

#[derive(Debug, Default, Clone)]
pub struct GraphLocator {
    graphs: IndexMap<NodeId, String>,
}

impl GraphLocator {
    /// Reads every stored graph root, ordered by id (creation time).
    pub fn query(db: &Database) -> Result<Self, StorageError> {
        let conn = db.connect()?;
        let mut stmt = conn.prepare("SELECT id, title FROM graph_node ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut graphs = IndexMap::new();
        for row in rows {
            let (id, title) = row?;
            let id = NodeId::parse(&id).map_err(|_| StorageError::InvalidId(id))?;
            graphs.insert(id, title);
        }
        Ok(GraphLocator { graphs })
    }

    /// Graph id to title.
    pub fn graphs(&self) -> &IndexMap<NodeId, String> {
        &self.graphs
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }
}
