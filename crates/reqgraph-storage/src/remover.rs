//! Graph removal.
//!
//! A [`RemoveTask`] deletes nodes and whole graphs: each target and
//! everything reachable from it loses its detail row, version chain row,
//! association rows (either side) and generic row, all in one transaction.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rusqlite::TransactionBehavior;

use reqgraph_core::{Graph, NodeId, NodeRef};

use crate::database::Database;
use crate::error::StorageError;
use crate::pool::{Task, TaskHeader};

pub struct RemoveTask {
    header: TaskHeader,
    db: Database,
    graph: Arc<Graph>,
    targets: Vec<NodeId>,
    finished: AtomicBool,
}

impl RemoveTask {
    pub fn new(db: Database, graph: Arc<Graph>, targets: Vec<NodeId>) -> Arc<Self> {
        Arc::new(RemoveTask {
            header: TaskHeader::new(format!("remove {} target(s)", targets.len())),
            db,
            graph,
            targets,
            finished: AtomicBool::new(false),
        })
    }

    pub fn targets(&self) -> &[NodeId] {
        &self.targets
    }

    pub fn remove_complete(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

impl Task for RemoveTask {
    fn header(&self) -> &TaskHeader {
        &self.header
    }

    fn run(&self) -> Result<(), StorageError> {
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut doomed: Vec<NodeRef> = Vec::new();
        for target in &self.targets {
            self.graph.traverse(*target, |node| {
                if let Some(id) = node.id() {
                    if seen.insert(id) {
                        doomed.push(node.clone());
                    }
                }
            });
        }

        let mut conn = self.db.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        for node in &doomed {
            self.db.codecs().for_node(node).remove(node, &tx)?;
        }
        tx.commit()?;

        tracing::info!(removed = doomed.len(), "nodes removed");
        self.finished.store(true, Ordering::SeqCst);
        Ok(())
    }
}
