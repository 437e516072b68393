//! Graph: the node arena.
//!
//! [`Graph`] owns every node of one in-memory graph, keyed by [`NodeId`].
//! Edges are stored on the nodes as identifier references, so cycles need no
//! special handling: the arena is the only owner and traversal is guarded by
//! a visited set.
//!
//! The arena lock and node locks are never held at the same time by graph
//! methods; node handles are cloned out of the arena before they are locked.

use std::collections::HashSet;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::error::CoreError;
use crate::id::NodeId;
use crate::kinds::{NodeData, NodeKind, RecurringTodo, Todo};
use crate::node::{Node, NodeRef};

#[derive(Debug, Default)]
pub struct Graph {
    nodes: RwLock<IndexMap<NodeId, NodeRef>>,
}

impl Graph {
    pub fn new() -> Self {
        Graph::default()
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Registers `node`, initializing it first if it has no id.
    pub fn insert(&self, node: NodeRef) -> NodeId {
        let id = node.ensure_init();
        self.nodes.write().insert(id, node);
        id
    }

    /// Creates, initializes and registers a node of kind `K`.
    pub fn add<K: NodeKind>(&self, kind: K) -> NodeRef {
        let node = Node::of(kind).into_ref();
        self.insert(node.clone());
        node
    }

    pub fn get(&self, id: NodeId) -> Option<NodeRef> {
        self.nodes.read().get(&id).cloned()
    }

    /// Like [`Graph::get`] but a missing id is an error.
    pub fn node(&self, id: NodeId) -> Result<NodeRef, CoreError> {
        self.get(id).ok_or(CoreError::NodeNotFound { id })
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.read().contains_key(&id)
    }

    pub fn remove(&self, id: NodeId) -> Option<NodeRef> {
        self.nodes.write().shift_remove(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Ids in insertion order.
    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.read().keys().copied().collect()
    }

    pub fn nodes(&self) -> Vec<NodeRef> {
        self.nodes.read().values().cloned().collect()
    }

    // -----------------------------------------------------------------------
    // Edges
    // -----------------------------------------------------------------------

    /// Connects `child` below `parent`.
    ///
    /// Either node is initialized if it has no id, both are registered, then
    /// `child` is added to `parent.down` and `parent` to `child.up`.
    pub fn connect(&self, parent: &NodeRef, child: &NodeRef) -> (NodeId, NodeId) {
        let parent_id = parent.ensure_init();
        let child_id = child.ensure_init();
        {
            let mut nodes = self.nodes.write();
            nodes.entry(parent_id).or_insert_with(|| parent.clone());
            nodes.entry(child_id).or_insert_with(|| child.clone());
        }
        parent.add_down(child_id);
        child.add_up(parent_id);
        (parent_id, child_id)
    }

    /// Connects two registered nodes by id.
    pub fn link(&self, parent: NodeId, child: NodeId) -> Result<(), CoreError> {
        let parent = self.node(parent)?;
        let child = self.node(child)?;
        self.connect(&parent, &child);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Traversal
    // -----------------------------------------------------------------------

    /// Visits every node reachable from `start` exactly once.
    ///
    /// Follows `up`, `down`, the version chain and owned sub-node links. Ids
    /// that are not in the arena are skipped. Returns the number of nodes
    /// visited.
    pub fn traverse(&self, start: NodeId, mut visit: impl FnMut(&NodeRef)) -> usize {
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut count = 0;
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(node) = self.get(id) else {
                continue;
            };
            visit(&node);
            count += 1;
            let mut neighbours = node.neighbours();
            neighbours.reverse();
            stack.extend(neighbours.into_iter().filter(|n| !visited.contains(n)));
        }
        count
    }

    /// Ids reachable from `start`, in visit order.
    pub fn reachable(&self, start: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.traverse(start, |node| out.extend(node.id()));
        out
    }

    // -----------------------------------------------------------------------
    // Version chain
    // -----------------------------------------------------------------------

    /// Returns the change child of `id`, creating a blank node of the same
    /// kind and linking it on first request.
    pub fn change_node(&self, id: NodeId) -> Result<NodeRef, CoreError> {
        let node = self.node(id)?;
        let data = node.data();
        if !data.is_commitable() {
            return Err(CoreError::NotCommitable {
                type_name: data.type_name(),
            });
        }
        if let Some(existing) = node.change_child().and_then(|c| self.get(c)) {
            return Ok(existing);
        }
        let blank = NodeData::for_type_name(data.type_name()).unwrap_or_default();
        let child = Node::new(blank).into_ref();
        let child_id = self.insert(child.clone());
        child.set_change_parent(Some(id));
        node.set_change_child(Some(child_id));
        node.mark_changed();
        Ok(child)
    }

    /// Appends `child` to the end of `id`'s version chain.
    pub fn add_change_child(&self, id: NodeId, child: NodeRef) -> Result<NodeId, CoreError> {
        let mut tail = self.node(id)?;
        let mut seen = HashSet::from([id]);
        while let Some(next) = tail.change_child().and_then(|c| self.get(c)) {
            let next_id = next.require_id()?;
            if !seen.insert(next_id) {
                break;
            }
            tail = next;
        }
        if !tail.is_commitable() {
            return Err(CoreError::NotCommitable {
                type_name: tail.type_name(),
            });
        }
        let tail_id = tail.require_id()?;
        let child_id = self.insert(child.clone());
        child.set_change_parent(Some(tail_id));
        child.mark_changed();
        tail.set_change_child(Some(child_id));
        tail.mark_changed();
        Ok(child_id)
    }

    /// Drops the uncommitted change child of `id`.
    ///
    /// A committed change child can not be discarded. Without a change child
    /// this does nothing.
    pub fn discard_change(&self, id: NodeId) -> Result<(), CoreError> {
        let node = self.node(id)?;
        let Some(child_id) = node.change_child() else {
            return Ok(());
        };
        if let Some(child) = self.get(child_id) {
            if child.is_committed() {
                return Err(CoreError::NotDiscarded { id: child_id });
            }
            for neighbour in child.up().into_iter().chain(child.down()) {
                if let Some(other) = self.get(neighbour) {
                    other.remove_up(child_id);
                    other.remove_down(child_id);
                }
            }
            self.remove(child_id);
        }
        node.set_change_child(None);
        node.mark_changed();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Todos
    // -----------------------------------------------------------------------

    /// Spawns a Todo from the RecurringTodo `recurring`.
    ///
    /// RecurringTodos below `recurring` spawn their own Todos, connected below
    /// the new one. Returns the new Todo.
    pub fn spawn_todo(&self, recurring: NodeId) -> Result<NodeRef, CoreError> {
        let mut seen = HashSet::new();
        self.spawn_todo_from(recurring, &mut seen)
    }

    fn spawn_todo_from(
        &self,
        recurring: NodeId,
        seen: &mut HashSet<NodeId>,
    ) -> Result<NodeRef, CoreError> {
        seen.insert(recurring);
        let source = self.node(recurring)?;
        let description = source.read::<RecurringTodo, _>(|r| r.description.clone())?;
        let todo = self.add(Todo {
            description,
            spawned_from: Some(recurring),
            ..Default::default()
        });
        for below in source.down() {
            if seen.contains(&below) {
                continue;
            }
            let is_recurring = self
                .get(below)
                .map(|n| n.type_name() == RecurringTodo::TYPE_NAME)
                .unwrap_or(false);
            if is_recurring {
                let child = self.spawn_todo_from(below, seen)?;
                self.connect(&todo, &child);
            }
        }
        Ok(todo)
    }
}
