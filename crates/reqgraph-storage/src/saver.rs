//! Graph saver.
//!
//! A [`SaveTask`] persists one node, or a node and everything reachable from
//! it. Per node it:
//!
//! 1. skips the write unless the node's `changed` flag is set, clearing the
//!    flag before writing;
//! 2. in one IMMEDIATE transaction on a private connection, inserts the
//!    generic `node` row if it is missing and then dispatches the codec's
//!    `insert` (new row) or `update` (existing row).
//!
//! In [`SaveScope::Tree`] the task then walks the graph and spawns a
//! single-node child task for every other reachable node. Children run on the
//! pool the parent was enqueued on, or inline when it has none. Each child's
//! completion is re-emitted on the parent's `complete` signal, so one
//! subscription on the root task sees exactly one event per node.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rusqlite::{params, TransactionBehavior};

use reqgraph_core::{Graph, NodeId, NodeRef};

use crate::codec::stored_type;
use crate::database::Database;
use crate::error::StorageError;
use crate::pool::{Task, TaskHeader};
use crate::signal::Signal;

/// How much of the graph one task saves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveScope {
    /// Only the start node.
    ThisNode,
    /// The start node and its whole traversal closure.
    Tree,
}

/// Emitted once per node after its save finished.
#[derive(Debug, Clone)]
pub struct SaveEvent {
    pub id: NodeId,
    pub node: NodeRef,
    /// Whether this save actually wrote rows for the node.
    pub written: bool,
}

pub struct SaveTask {
    header: TaskHeader,
    db: Database,
    graph: Arc<Graph>,
    start: NodeId,
    scope: SaveScope,
    finished: AtomicBool,
    children: Mutex<Vec<Arc<SaveTask>>>,
    complete: Arc<Signal<SaveEvent>>,
}

impl SaveTask {
    pub fn new(db: Database, graph: Arc<Graph>, start: NodeId, scope: SaveScope) -> Arc<Self> {
        Arc::new(SaveTask {
            header: TaskHeader::new(format!("save {}", start)),
            db,
            graph,
            start,
            scope,
            finished: AtomicBool::new(false),
            children: Mutex::new(Vec::new()),
            complete: Arc::new(Signal::new()),
        })
    }

    /// Saves `start` and everything reachable from it.
    pub fn tree(db: Database, graph: Arc<Graph>, start: NodeId) -> Arc<Self> {
        SaveTask::new(db, graph, start, SaveScope::Tree)
    }

    pub fn this_node(db: Database, graph: Arc<Graph>, start: NodeId) -> Arc<Self> {
        SaveTask::new(db, graph, start, SaveScope::ThisNode)
    }

    pub fn start(&self) -> NodeId {
        self.start
    }

    pub fn scope(&self) -> SaveScope {
        self.scope
    }

    /// Per-node completion events, children included.
    pub fn complete(&self) -> &Signal<SaveEvent> {
        &self.complete
    }

    /// Whether this task's own node is done.
    pub fn save_complete(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Whether this task and every child it spawned are done. Recomputed on
    /// every call.
    pub fn tree_save_complete(&self) -> bool {
        if !self.save_complete() {
            return false;
        }
        let children = self.children.lock().clone();
        children.iter().all(|c| c.tree_save_complete())
    }

    pub fn children(&self) -> Vec<Arc<SaveTask>> {
        self.children.lock().clone()
    }

    /// Blocks until the tree save completes or `timeout` elapses. Returns
    /// whether it completed.
    pub fn wait_tree(&self, timeout: Duration) -> bool {
        let events = self.complete.subscribe();
        let deadline = Instant::now() + timeout;
        loop {
            if self.tree_save_complete() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let slice = (deadline - now).min(Duration::from_millis(50));
            // Either an event or a poll tick; both lead to a re-check.
            let _ = events.recv_timeout(slice);
        }
    }

    /// Writes `node` if it changed. Returns whether rows were written.
    fn write_node(&self, node: &NodeRef) -> Result<bool, StorageError> {
        if !node.take_changed() {
            return Ok(false);
        }
        let id = node.require_id()?;
        let type_name = node.type_name();
        let codec = self.db.codecs().for_node(node);

        let mut conn = self.db.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        match stored_type(&tx, id)? {
            Some(stored) => {
                if stored != type_name {
                    self.db.codecs().by_type_name(&stored).drop_details(id, &tx)?;
                    tx.execute(
                        "UPDATE node SET node_type = ?2 WHERE id = ?1",
                        params![id.to_string(), type_name],
                    )?;
                    tracing::debug!(node = %id, from = %stored, to = type_name, "node changed kind");
                }
                codec.update(node, &tx)?;
            }
            None => {
                tx.execute(
                    "INSERT INTO node (id, node_type) VALUES (?1, ?2)",
                    params![id.to_string(), type_name],
                )?;
                codec.insert(node, &tx)?;
            }
        }
        tx.commit()?;
        tracing::debug!(node = %id, kind = type_name, "node saved");
        Ok(true)
    }

    fn spawn_children(&self) {
        let mut reached: Vec<NodeRef> = Vec::new();
        self.graph.traverse(self.start, |node| {
            if node.id() != Some(self.start) {
                reached.push(node.clone());
            }
        });

        let owner = self.header.owner();
        for node in reached {
            let Some(id) = node.id() else {
                continue;
            };
            let child = SaveTask::this_node(self.db.clone(), self.graph.clone(), id);
            let parent: Weak<Signal<SaveEvent>> = Arc::downgrade(&self.complete);
            child.complete.connect(move |event| {
                if let Some(parent) = parent.upgrade() {
                    parent.emit(event);
                }
            });
            self.children.lock().push(child.clone());

            let queued = owner
                .as_ref()
                .map(|pool| pool.enqueue(child.clone()).is_ok())
                .unwrap_or(false);
            if !queued {
                if let Err(e) = child.run() {
                    tracing::error!(node = %id, error = %e, "inline child save failed");
                }
            }
        }
    }
}

impl Task for SaveTask {
    fn header(&self) -> &TaskHeader {
        &self.header
    }

    fn run(&self) -> Result<(), StorageError> {
        let node = self.graph.node(self.start)?;
        let written = self.write_node(&node)?;
        if self.scope == SaveScope::Tree {
            self.spawn_children();
            tracing::info!(
                root = %self.start,
                children = self.children.lock().len(),
                "tree save dispatched"
            );
        }
        self.finished.store(true, Ordering::SeqCst);
        self.complete.emit(&SaveEvent {
            id: self.start,
            node,
            written,
        });
        Ok(())
    }
}

impl std::fmt::Debug for SaveTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveTask")
            .field("start", &self.start)
            .field("scope", &self.scope)
            .field("finished", &self.save_complete())
            .finish()
    }
}
