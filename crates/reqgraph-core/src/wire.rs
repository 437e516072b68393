//! JSON wire format.
//!
//! A graph travels as a [`GraphDocument`]: the root id plus every node of its
//! traversal closure. Each node is an object with a single key, the node's
//! type name, whose value holds the common node fields next to the kind's own
//! fields:
//!
//! ```json
//! {"Requirement": {"id": "…", "upList": ["…"], "downList": [],
//!                  "committed": false, "changeParent": null, "changeChild": null,
//!                  "title": "R1", "text": "", "functional": false}}
//! ```
//!
//! `committed`, `changeParent` and `changeChild` are only written for
//! commitable kinds. Cycles are plain identifier references.

use serde::de::Error as _;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::graph::Graph;
use crate::id::NodeId;
use crate::kinds::NodeData;
use crate::node::{Node, NodeState};

const ID: &str = "id";
const UP_LIST: &str = "upList";
const DOWN_LIST: &str = "downList";
const COMMITTED: &str = "committed";
const CHANGE_PARENT: &str = "changeParent";
const CHANGE_CHILD: &str = "changeChild";

/// One node on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireNode {
    pub id: NodeId,
    pub up: Vec<NodeId>,
    pub down: Vec<NodeId>,
    pub committed: bool,
    pub change_parent: Option<NodeId>,
    pub change_child: Option<NodeId>,
    pub data: NodeData,
}

impl WireNode {
    /// Snapshots `node`. The node must be initialized.
    pub fn from_node(node: &Node) -> Result<Self, CoreError> {
        let state = node.snapshot();
        let id = state.id.ok_or(CoreError::Uninitialized)?;
        Ok(WireNode {
            id,
            up: state.up.to_vec(),
            down: state.down.to_vec(),
            committed: state.committed,
            change_parent: state.change_parent,
            change_child: state.change_child,
            data: state.data,
        })
    }

    /// Builds a node from the wire form. The node is marked changed, since
    /// nothing says storage has seen this version.
    pub fn into_node(self) -> Node {
        Node::from_state(NodeState {
            id: Some(self.id),
            changed: true,
            up: self.up.into_iter().collect(),
            down: self.down.into_iter().collect(),
            committed: self.committed,
            change_parent: self.change_parent,
            change_child: self.change_child,
            data: self.data,
        })
    }

    pub fn type_name(&self) -> &'static str {
        self.data.type_name()
    }

    pub fn to_value(&self) -> Result<Value, CoreError> {
        let type_name = self.data.type_name();
        let mut tagged = serde_json::to_value(&self.data)?;
        let fields = tagged
            .get_mut(type_name)
            .and_then(Value::as_object_mut)
            .ok_or_else(|| CoreError::InvalidDocument {
                reason: format!("{} payload is not an object", type_name),
            })?;

        fields.insert(ID.into(), serde_json::to_value(self.id)?);
        fields.insert(UP_LIST.into(), serde_json::to_value(&self.up)?);
        fields.insert(DOWN_LIST.into(), serde_json::to_value(&self.down)?);
        if self.data.is_commitable() {
            fields.insert(COMMITTED.into(), Value::Bool(self.committed));
            fields.insert(CHANGE_PARENT.into(), serde_json::to_value(self.change_parent)?);
            fields.insert(CHANGE_CHILD.into(), serde_json::to_value(self.change_child)?);
        }
        Ok(tagged)
    }

    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        let Value::Object(outer) = value else {
            return Err(invalid("node must be a JSON object"));
        };
        if outer.len() != 1 {
            return Err(invalid("node object must have exactly one type key"));
        }
        let Some((type_name, inner)) = outer.into_iter().next() else {
            return Err(invalid("node object is empty"));
        };
        if NodeData::for_type_name(&type_name).is_none() {
            return Err(CoreError::UnknownKind { type_name });
        }
        let Value::Object(mut fields) = inner else {
            return Err(invalid(&format!("{} body must be an object", type_name)));
        };

        let id: NodeId = match fields.remove(ID) {
            Some(v) => serde_json::from_value(v)?,
            None => return Err(invalid(&format!("{} node has no id", type_name))),
        };
        let up: Vec<NodeId> = take_or_default(&mut fields, UP_LIST)?;
        let down: Vec<NodeId> = take_or_default(&mut fields, DOWN_LIST)?;
        let committed: bool = take_or_default(&mut fields, COMMITTED)?;
        let change_parent: Option<NodeId> = take_or_default(&mut fields, CHANGE_PARENT)?;
        let change_child: Option<NodeId> = take_or_default(&mut fields, CHANGE_CHILD)?;

        let mut tagged = Map::new();
        tagged.insert(type_name, Value::Object(fields));
        let data: NodeData = serde_json::from_value(Value::Object(tagged))?;

        // Commit state only exists on commitable kinds.
        let (committed, change_parent, change_child) = if data.is_commitable() {
            (committed, change_parent, change_child)
        } else {
            (false, None, None)
        };

        Ok(WireNode {
            id,
            up,
            down,
            committed,
            change_parent,
            change_child,
            data,
        })
    }
}

impl Serialize for WireNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value()
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for WireNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        WireNode::from_value(value).map_err(D::Error::custom)
    }
}

/// A serialized graph: a root and its traversal closure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDocument {
    pub root: NodeId,
    pub nodes: Vec<WireNode>,
}

impl GraphDocument {
    /// Snapshots every node reachable from `root`.
    pub fn from_graph(graph: &Graph, root: NodeId) -> Result<Self, CoreError> {
        if !graph.contains(root) {
            return Err(CoreError::NodeNotFound { id: root });
        }
        let mut nodes = Vec::new();
        let mut failure = None;
        graph.traverse(root, |node| match WireNode::from_node(node) {
            Ok(wire) => nodes.push(wire),
            Err(e) => failure = Some(e),
        });
        match failure {
            Some(e) => Err(e),
            None => Ok(GraphDocument { root, nodes }),
        }
    }

    /// Rebuilds the graph arena. Every node is marked changed.
    pub fn into_graph(self) -> Result<Graph, CoreError> {
        let graph = Graph::new();
        let root = self.root;
        for wire in self.nodes {
            graph.insert(wire.into_node().into_ref());
        }
        if !graph.contains(root) {
            return Err(invalid(&format!("root {} is not among the nodes", root)));
        }
        Ok(graph)
    }
}

impl Graph {
    /// Serializes the traversal closure of `root` as a JSON document.
    pub fn to_json(&self, root: NodeId) -> Result<String, CoreError> {
        let doc = GraphDocument::from_graph(self, root)?;
        Ok(serde_json::to_string(&doc)?)
    }

    /// Parses a JSON document, returning the graph and its root id.
    pub fn from_json(json: &str) -> Result<(Graph, NodeId), CoreError> {
        let doc: GraphDocument = serde_json::from_str(json)?;
        let root = doc.root;
        Ok((doc.into_graph()?, root))
    }
}

fn take_or_default<T>(fields: &mut Map<String, Value>, key: &str) -> Result<T, CoreError>
where
    T: Default + for<'de> Deserialize<'de>,
{
    match fields.remove(key) {
        Some(Value::Null) | None => Ok(T::default()),
        Some(v) => Ok(serde_json::from_value(v)?),
    }
}

fn invalid(reason: &str) -> CoreError {
    CoreError::InvalidDocument {
        reason: reason.to_string(),
    }
}
