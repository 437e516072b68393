//! Graph loader.
//!
//! [`GraphFactory`] rebuilds a stored graph starting from one id:
//!
//! - the factory itself walks the association rows depth-first on one
//!   connection, allocating each newly seen node through the
//!   [`NodeAllocator`] and wiring `up`/`down` edges by stored direction;
//! - the detail rows are read by one [`NodeLoadTask`] per node, spread over
//!   the worker pool;
//! - `done` fires once, the first time the walk has finished and every
//!   loader has completed.
//!
//! Ids that appear in association rows but have no generic `node` row are
//! skipped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use reqgraph_core::{Direction, Graph, Node, NodeId, NodeRef};

use crate::codec::{read_associations, stored_type, CodecRegistry};
use crate::database::Database;
use crate::error::StorageError;
use crate::pool::{PoolHandle, Task, TaskHeader, WorkerPool};
use crate::signal::Signal;

/// Workers started when a factory runs without a pool of its own.
pub const INTERNAL_POOL_WORKERS: usize = 4;

/// Builds empty nodes of the right kind from a stored type name.
pub struct NodeAllocator<'a> {
    codecs: &'a CodecRegistry,
}

impl<'a> NodeAllocator<'a> {
    pub fn new(codecs: &'a CodecRegistry) -> Self {
        NodeAllocator { codecs }
    }

    /// A clean, initialized node with `id`. Type names without a codec give
    /// a bare `Node`.
    pub fn allocate(&self, type_name: &str, id: NodeId) -> NodeRef {
        let data = self
            .codecs
            .find(type_name)
            .map(|codec| codec.allocate())
            .unwrap_or_default();
        if data.type_name() != type_name {
            tracing::warn!(node = %id, stored = type_name, "no codec for stored type, using bare node");
        }
        Node::restored(id, data).into_ref()
    }
}

// ---------------------------------------------------------------------------
// Node loader
// ---------------------------------------------------------------------------

/// Emitted when one node's detail row has been read.
#[derive(Debug, Clone)]
pub struct LoadEvent {
    pub id: NodeId,
    pub node: NodeRef,
    pub found: bool,
}

/// Fills one allocated node from its detail row.
pub struct NodeLoadTask {
    header: TaskHeader,
    db: Database,
    node: NodeRef,
    found: AtomicBool,
    complete: AtomicBool,
    loaded: Signal<LoadEvent>,
}

impl NodeLoadTask {
    pub fn new(db: Database, node: NodeRef) -> Arc<Self> {
        Arc::new(NodeLoadTask {
            header: TaskHeader::new(format!("load {}", node.id_string())),
            db,
            node,
            found: AtomicBool::new(false),
            complete: AtomicBool::new(false),
            loaded: Signal::new(),
        })
    }

    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    /// Whether a detail row existed. Meaningful once complete.
    pub fn found(&self) -> bool {
        self.found.load(Ordering::SeqCst)
    }

    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::SeqCst)
    }

    pub fn loaded(&self) -> &Signal<LoadEvent> {
        &self.loaded
    }
}

impl Task for NodeLoadTask {
    fn header(&self) -> &TaskHeader {
        &self.header
    }

    fn run(&self) -> Result<(), StorageError> {
        let id = self.node.require_id()?;
        let codec = self.db.codecs().for_node(&self.node);
        let conn = self.db.connect()?;
        let found = codec.load(&self.node, &conn)?;
        if !found {
            tracing::debug!(node = %id, kind = codec.type_name(), "no detail row");
        }
        self.node.mark_clean();
        self.found.store(found, Ordering::SeqCst);
        self.complete.store(true, Ordering::SeqCst);
        self.loaded.emit(&LoadEvent {
            id,
            node: self.node.clone(),
            found,
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Completion bookkeeping shared with loader callbacks.
struct Progress {
    start: NodeId,
    loaders: Mutex<Vec<Arc<NodeLoadTask>>>,
    walked: AtomicBool,
    fired: AtomicBool,
    done: Signal<NodeId>,
    loaded: Signal<LoadEvent>,
}

impl Progress {
    fn graph_loaded(&self) -> bool {
        if !self.walked.load(Ordering::SeqCst) {
            return false;
        }
        let loaders = self.loaders.lock().clone();
        loaders.iter().all(|l| l.is_complete())
    }

    /// Fires `done` on the first transition to loaded.
    fn check(&self) {
        if self.graph_loaded() && !self.fired.swap(true, Ordering::SeqCst) {
            tracing::info!(root = %self.start, nodes = self.loaders.lock().len(), "graph loaded");
            self.done.emit(&self.start);
        }
    }
}

pub struct GraphFactory {
    header: TaskHeader,
    db: Database,
    graph: Arc<Graph>,
    progress: Arc<Progress>,
    internal_pool: Mutex<Option<WorkerPool>>,
}

impl GraphFactory {
    pub fn new(db: Database, start: NodeId) -> Arc<Self> {
        Arc::new(GraphFactory {
            header: TaskHeader::new(format!("load graph {}", start)),
            db,
            graph: Arc::new(Graph::new()),
            progress: Arc::new(Progress {
                start,
                loaders: Mutex::new(Vec::new()),
                walked: AtomicBool::new(false),
                fired: AtomicBool::new(false),
                done: Signal::new(),
                loaded: Signal::new(),
            }),
            internal_pool: Mutex::new(None),
        })
    }

    pub fn start(&self) -> NodeId {
        self.progress.start
    }

    /// The graph as assembled so far.
    pub fn graph(&self) -> Arc<Graph> {
        self.graph.clone()
    }

    /// The start node, or `None` when it is not stored.
    pub fn root(&self) -> Option<NodeRef> {
        self.graph.get(self.progress.start)
    }

    /// Fires once with the start id when the whole graph is loaded.
    pub fn done(&self) -> &Signal<NodeId> {
        &self.progress.done
    }

    /// Re-emits every loader's completion.
    pub fn loaded(&self) -> &Signal<LoadEvent> {
        &self.progress.loaded
    }

    /// Recomputed on every call: the walk has finished and every loader has
    /// completed.
    pub fn graph_loaded(&self) -> bool {
        self.progress.graph_loaded()
    }

    pub fn loader_count(&self) -> usize {
        self.progress.loaders.lock().len()
    }

    /// Blocks until the graph is loaded or `timeout` elapses.
    pub fn wait(&self, timeout: Duration) -> bool {
        let events = self.progress.done.subscribe();
        let deadline = Instant::now() + timeout;
        loop {
            if self.graph_loaded() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let _ = events.recv_timeout((deadline - now).min(Duration::from_millis(50)));
        }
    }

    fn pool(&self) -> PoolHandle {
        if let Some(owner) = self.header.owner() {
            return owner;
        }
        let mut internal = self.internal_pool.lock();
        internal
            .get_or_insert_with(|| {
                tracing::debug!(workers = INTERNAL_POOL_WORKERS, "starting internal load pool");
                WorkerPool::with_threads(INTERNAL_POOL_WORKERS)
            })
            .handle()
    }

    /// Allocates and registers `id`, then queues its loader. Returns `None`
    /// when `id` has no generic row.
    fn materialize(
        &self,
        conn: &rusqlite::Connection,
        pool: &PoolHandle,
        id: NodeId,
    ) -> Result<Option<NodeRef>, StorageError> {
        let Some(type_name) = stored_type(conn, id)? else {
            tracing::warn!(node = %id, "referenced node is not stored, skipping");
            return Ok(None);
        };
        let node = NodeAllocator::new(self.db.codecs()).allocate(&type_name, id);
        self.graph.insert(node.clone());

        let loader = NodeLoadTask::new(self.db.clone(), node.clone());
        let progress: Weak<Progress> = Arc::downgrade(&self.progress);
        loader.loaded().connect(move |event| {
            if let Some(progress) = progress.upgrade() {
                progress.loaded.emit(event);
                progress.check();
            }
        });
        self.progress.loaders.lock().push(loader.clone());
        if let Err(e) = pool.enqueue(loader.clone()) {
            tracing::warn!(node = %id, error = %e, "pool refused loader, loading inline");
            loader.run()?;
        }
        Ok(Some(node))
    }
}

impl Task for GraphFactory {
    fn header(&self) -> &TaskHeader {
        &self.header
    }

    fn run(&self) -> Result<(), StorageError> {
        let start = self.progress.start;
        let conn = self.db.connect()?;
        let pool = self.pool();

        if self.materialize(&conn, &pool, start)?.is_some() {
            let mut stack = vec![start];
            while let Some(id) = stack.pop() {
                let Some(node) = self.graph.get(id) else {
                    continue;
                };
                for assoc in read_associations(&conn, id)? {
                    let related = match self.graph.get(assoc.related) {
                        Some(_) => Some(assoc.related),
                        None => {
                            let fresh = self.materialize(&conn, &pool, assoc.related)?;
                            if fresh.is_some() {
                                stack.push(assoc.related);
                            }
                            fresh.map(|_| assoc.related)
                        }
                    };
                    let Some(related) = related else {
                        continue;
                    };
                    match assoc.direction {
                        Direction::Up => node.restore_up(related),
                        Direction::Down => node.restore_down(related),
                    };
                }

                let stored = stored_type(&conn, id)?.unwrap_or_default();
                let links = self.db.codecs().by_type_name(&stored).links(id, &conn)?;
                for link in links {
                    if !self.graph.contains(link) && self.materialize(&conn, &pool, link)?.is_some() {
                        stack.push(link);
                    }
                }
            }
        } else {
            tracing::info!(root = %start, "nothing stored under this id");
        }

        self.progress.walked.store(true, Ordering::SeqCst);
        self.progress.check();
        Ok(())
    }
}

impl std::fmt::Debug for GraphFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphFactory")
            .field("start", &self.progress.start)
            .field("nodes", &self.graph.len())
            .field("loaded", &self.graph_loaded())
            .finish()
    }
}
