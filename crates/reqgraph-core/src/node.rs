//! The graph node.
//!
//! A [`Node`] owns its identity, its `up`/`down` edge lists (identifier
//! references, deduplicated), the `changed`/`initted` flags consumed by the
//! saver, the commit state of commitable kinds, and the kind payload
//! ([`NodeData`]). All of it sits behind one per-node mutex; every accessor
//! holds the lock only for the duration of the call.
//!
//! Nodes are shared as [`NodeRef`] (`Arc<Node>`) between the graph arena,
//! worker-pool tasks and callers.

use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::error::CoreError;
use crate::id::NodeId;
use crate::kinds::{NodeData, NodeKind};

/// Shared handle to a node.
pub type NodeRef = Arc<Node>;

/// Edge list storage. Most nodes have a handful of neighbours.
pub type EdgeList = SmallVec<[NodeId; 4]>;

/// A consistent copy of a node's state, taken under its lock.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeState {
    pub id: Option<NodeId>,
    pub changed: bool,
    pub up: EdgeList,
    pub down: EdgeList,
    pub committed: bool,
    pub change_parent: Option<NodeId>,
    pub change_child: Option<NodeId>,
    pub data: NodeData,
}

impl NodeState {
    /// Every id this node refers to: edges, version chain links and owned
    /// sub-nodes. This is the neighbourhood traversal walks.
    pub fn neighbours(&self) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = Vec::with_capacity(self.up.len() + self.down.len() + 3);
        out.extend(self.up.iter().copied());
        out.extend(self.down.iter().copied());
        out.extend(self.change_parent);
        out.extend(self.change_child);
        out.extend(self.data.owned_links());
        out
    }
}

#[derive(Debug, Default)]
pub struct Node {
    state: Mutex<NodeState>,
}

impl Node {
    /// Creates an uninitialized node carrying `data`.
    pub fn new(data: NodeData) -> Self {
        Node {
            state: Mutex::new(NodeState {
                data,
                ..Default::default()
            }),
        }
    }

    /// Creates an uninitialized node of kind `K`.
    pub fn of<K: NodeKind>(kind: K) -> Self {
        Node::new(kind.into_data())
    }

    /// Creates a node with a known id that is clean relative to storage.
    pub fn restored(id: NodeId, data: NodeData) -> Self {
        Node {
            state: Mutex::new(NodeState {
                id: Some(id),
                data,
                ..Default::default()
            }),
        }
    }

    /// Creates a node from a full state snapshot.
    pub fn from_state(state: NodeState) -> Self {
        Node {
            state: Mutex::new(state),
        }
    }

    pub fn into_ref(self) -> NodeRef {
        Arc::new(self)
    }

    // -----------------------------------------------------------------------
    // Identity
    // -----------------------------------------------------------------------

    /// Assigns a fresh identifier and marks the node changed.
    ///
    /// Calling it again on an initialized node assigns another new id.
    pub fn init(&self) -> NodeId {
        let id = NodeId::generate();
        let mut state = self.state.lock();
        state.id = Some(id);
        state.changed = true;
        id
    }

    /// Returns the id, initializing the node first if it has none.
    pub fn ensure_init(&self) -> NodeId {
        let mut state = self.state.lock();
        match state.id {
            Some(id) => id,
            None => {
                let id = NodeId::generate();
                state.id = Some(id);
                state.changed = true;
                id
            }
        }
    }

    pub fn set_id(&self, id: NodeId) {
        let mut state = self.state.lock();
        state.id = Some(id);
        state.changed = true;
    }

    pub fn id(&self) -> Option<NodeId> {
        self.state.lock().id
    }

    pub fn require_id(&self) -> Result<NodeId, CoreError> {
        self.id().ok_or(CoreError::Uninitialized)
    }

    /// Canonical id string, or the empty string before `init()`.
    pub fn id_string(&self) -> String {
        self.id().map(|id| id.to_string()).unwrap_or_default()
    }

    pub fn is_initted(&self) -> bool {
        self.state.lock().id.is_some()
    }

    pub fn type_name(&self) -> &'static str {
        self.state.lock().data.type_name()
    }

    pub fn is_commitable(&self) -> bool {
        self.state.lock().data.is_commitable()
    }

    // -----------------------------------------------------------------------
    // Change tracking
    // -----------------------------------------------------------------------

    pub fn is_changed(&self) -> bool {
        self.state.lock().changed
    }

    pub fn mark_changed(&self) {
        self.state.lock().changed = true;
    }

    pub fn mark_clean(&self) {
        self.state.lock().changed = false;
    }

    /// Clears `changed`, returning its previous value.
    pub fn take_changed(&self) -> bool {
        std::mem::replace(&mut self.state.lock().changed, false)
    }

    // -----------------------------------------------------------------------
    // Edges
    // -----------------------------------------------------------------------

    /// Adds `id` to the up list unless an entry with that id exists.
    /// Returns whether the entry was new; a new entry marks the node changed.
    pub fn add_up(&self, id: NodeId) -> bool {
        self.edit_edges(|state| push_unique(&mut state.up, id))
    }

    /// Adds `id` to the down list unless an entry with that id exists.
    /// Returns whether the entry was new; a new entry marks the node changed.
    pub fn add_down(&self, id: NodeId) -> bool {
        self.edit_edges(|state| push_unique(&mut state.down, id))
    }

    pub fn find_up(&self, id: NodeId) -> bool {
        self.state.lock().up.contains(&id)
    }

    pub fn find_down(&self, id: NodeId) -> bool {
        self.state.lock().down.contains(&id)
    }

    pub fn remove_up(&self, id: NodeId) -> bool {
        self.edit_edges(|state| remove_id(&mut state.up, id))
    }

    pub fn remove_down(&self, id: NodeId) -> bool {
        self.edit_edges(|state| remove_id(&mut state.down, id))
    }

    /// Adds a stored up edge without touching `changed`.
    pub fn restore_up(&self, id: NodeId) -> bool {
        push_unique(&mut self.state.lock().up, id)
    }

    /// Adds a stored down edge without touching `changed`.
    pub fn restore_down(&self, id: NodeId) -> bool {
        push_unique(&mut self.state.lock().down, id)
    }

    fn edit_edges(&self, f: impl FnOnce(&mut NodeState) -> bool) -> bool {
        let mut state = self.state.lock();
        let modified = f(&mut state);
        if modified {
            state.changed = true;
        }
        modified
    }

    pub fn up(&self) -> Vec<NodeId> {
        self.state.lock().up.to_vec()
    }

    pub fn down(&self) -> Vec<NodeId> {
        self.state.lock().down.to_vec()
    }

    // -----------------------------------------------------------------------
    // Kind data
    // -----------------------------------------------------------------------

    /// Reads the payload as kind `K`.
    pub fn read<K: NodeKind, R>(&self, f: impl FnOnce(&K) -> R) -> Result<R, CoreError> {
        let state = self.state.lock();
        let found = state.data.type_name();
        K::from_data(&state.data)
            .map(f)
            .ok_or(CoreError::KindMismatch {
                expected: K::TYPE_NAME,
                found,
            })
    }

    pub fn with_data<R>(&self, f: impl FnOnce(&NodeData) -> R) -> R {
        f(&self.state.lock().data)
    }

    pub fn data(&self) -> NodeData {
        self.state.lock().data.clone()
    }

    /// Mutates the payload as kind `K` and marks the node changed.
    ///
    /// Fails on a committed node and on a kind mismatch.
    pub fn edit<K: NodeKind, R>(&self, f: impl FnOnce(&mut K) -> R) -> Result<R, CoreError> {
        self.try_edit::<K, R>(|kind| Ok(f(kind)))
    }

    /// Like [`Node::edit`] for fallible mutations. `changed` is only set when
    /// the closure succeeds.
    pub fn try_edit<K: NodeKind, R>(
        &self,
        f: impl FnOnce(&mut K) -> Result<R, CoreError>,
    ) -> Result<R, CoreError> {
        let mut state = self.state.lock();
        if state.committed {
            return Err(CoreError::Committed {
                id: state.id.map(|id| id.to_string()).unwrap_or_default(),
            });
        }
        let found = state.data.type_name();
        let kind = K::from_data_mut(&mut state.data).ok_or(CoreError::KindMismatch {
            expected: K::TYPE_NAME,
            found,
        })?;
        let out = f(kind)?;
        state.changed = true;
        Ok(out)
    }

    /// Replaces the payload without commit checks or change tracking.
    /// Used when rebuilding a node from storage.
    pub fn restore_data(&self, data: NodeData) {
        self.state.lock().data = data;
    }

    // -----------------------------------------------------------------------
    // Commit state
    // -----------------------------------------------------------------------

    /// Freezes a commitable node; later edits fail with `Committed`.
    pub fn commit(&self) -> Result<(), CoreError> {
        let mut state = self.state.lock();
        if !state.data.is_commitable() {
            return Err(CoreError::NotCommitable {
                type_name: state.data.type_name(),
            });
        }
        if !state.committed {
            state.committed = true;
            state.changed = true;
        }
        Ok(())
    }

    pub fn is_committed(&self) -> bool {
        self.state.lock().committed
    }

    pub fn change_parent(&self) -> Option<NodeId> {
        self.state.lock().change_parent
    }

    pub fn change_child(&self) -> Option<NodeId> {
        self.state.lock().change_child
    }

    /// Raw link setter; no commit check and no change tracking.
    pub fn set_change_parent(&self, id: Option<NodeId>) {
        self.state.lock().change_parent = id;
    }

    /// Raw link setter; no commit check and no change tracking.
    pub fn set_change_child(&self, id: Option<NodeId>) {
        self.state.lock().change_child = id;
    }

    /// Restores commit state read from storage.
    pub fn restore_commit(&self, committed: bool, parent: Option<NodeId>, child: Option<NodeId>) {
        let mut state = self.state.lock();
        state.committed = committed;
        state.change_parent = parent;
        state.change_child = child;
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    pub fn snapshot(&self) -> NodeState {
        self.state.lock().clone()
    }

    pub fn neighbours(&self) -> Vec<NodeId> {
        self.state.lock().neighbours()
    }
}

fn push_unique(list: &mut EdgeList, id: NodeId) -> bool {
    if list.contains(&id) {
        false
    } else {
        list.push(id);
        true
    }
}

fn remove_id(list: &mut EdgeList, id: NodeId) -> bool {
    let before = list.len();
    list.retain(|existing| *existing != id);
    list.len() != before
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::{Organization, Requirement, Text};

    #[test]
    fn init_assigns_id_and_marks_changed() {
        let node = Node::of(Text::default());
        assert!(!node.is_initted());
        assert!(!node.is_changed());
        assert_eq!(node.id_string(), "");

        let first = node.init();
        assert!(node.is_initted());
        assert!(node.is_changed());
        assert_eq!(node.id(), Some(first));
        assert_eq!(node.id_string(), first.to_string());

        let second = node.init();
        assert_ne!(first, second);
        assert!(first < second);
    }

    #[test]
    fn ensure_init_keeps_existing_id() {
        let node = Node::of(Text::default());
        let id = node.ensure_init();
        assert_eq!(node.ensure_init(), id);
    }

    #[test]
    fn edges_are_deduplicated_by_id() {
        let node = Node::of(Text::default());
        let target = NodeId::generate();
        assert!(node.add_down(target));
        assert!(!node.add_down(target));
        assert!(node.add_up(target));
        assert!(!node.add_up(target));
        assert_eq!(node.down(), vec![target]);
        assert_eq!(node.up(), vec![target]);
        assert!(node.find_down(target));
        assert!(!node.find_down(NodeId::generate()));
        assert!(node.remove_down(target));
        assert!(!node.find_down(target));
    }

    #[test]
    fn edge_changes_mark_changed() {
        let node = Node::restored(NodeId::generate(), Text::default().into_data());
        let target = NodeId::generate();
        assert!(node.add_down(target));
        assert!(node.is_changed());

        node.mark_clean();
        assert!(!node.add_down(target));
        assert!(!node.is_changed());

        assert!(node.remove_down(target));
        assert!(node.is_changed());

        node.mark_clean();
        assert!(!node.remove_up(target));
        assert!(!node.is_changed());
    }

    #[test]
    fn restored_edges_stay_clean() {
        let node = Node::restored(NodeId::generate(), Text::default().into_data());
        let target = NodeId::generate();
        assert!(node.restore_up(target));
        assert!(!node.restore_up(target));
        assert!(node.restore_down(target));
        assert_eq!(node.up(), vec![target]);
        assert_eq!(node.down(), vec![target]);
        assert!(!node.is_changed());
    }

    #[test]
    fn edit_marks_changed_and_checks_kind() {
        let node = Node::restored(NodeId::generate(), Text::default().into_data());
        node.edit::<Text, _>(|t| t.text = "hello".into()).unwrap();
        assert!(node.is_changed());
        assert_eq!(node.read::<Text, _>(|t| t.text.clone()).unwrap(), "hello");

        let err = node.edit::<Requirement, _>(|r| r.functional = true).unwrap_err();
        assert!(matches!(
            err,
            CoreError::KindMismatch {
                expected: "Requirement",
                found: "Text"
            }
        ));
    }

    #[test]
    fn failed_try_edit_leaves_node_clean() {
        let mut org = Organization::new("Acme");
        org.lock();
        let node = Node::restored(NodeId::generate(), org.into_data());
        let err = node
            .try_edit::<Organization, _>(|o| o.set_name("Other"))
            .unwrap_err();
        assert!(matches!(err, CoreError::Locked));
        assert!(!node.is_changed());
    }

    #[test]
    fn committed_node_rejects_every_edit() {
        let node = Node::of(Requirement::default());
        node.init();
        node.edit::<Requirement, _>(|r| r.title = "R1".into()).unwrap();
        node.edit::<Requirement, _>(|r| r.text = "shall".into()).unwrap();
        node.edit::<Requirement, _>(|r| r.functional = true).unwrap();

        node.commit().unwrap();
        assert!(node.is_committed());
        for result in [
            node.edit::<Requirement, _>(|r| r.title = "R2".into()),
            node.edit::<Requirement, _>(|r| r.text = "may".into()),
            node.edit::<Requirement, _>(|r| r.functional = false),
        ] {
            assert!(matches!(result, Err(CoreError::Committed { .. })));
        }
        assert_eq!(node.read::<Requirement, _>(|r| r.title.clone()).unwrap(), "R1");
    }

    #[test]
    fn commit_requires_commitable_kind() {
        let node = Node::of(Text::default());
        assert!(matches!(
            node.commit(),
            Err(CoreError::NotCommitable { type_name: "Text" })
        ));
    }

    #[test]
    fn take_changed_clears_flag() {
        let node = Node::of(Text::default());
        node.init();
        assert!(node.take_changed());
        assert!(!node.take_changed());
    }

    #[test]
    fn neighbours_include_chain_and_owned_links() {
        let state = NodeState {
            up: [NodeId::generate()].into_iter().collect(),
            change_child: Some(NodeId::generate()),
            ..Default::default()
        };
        assert_eq!(state.neighbours().len(), 2);
    }
}
