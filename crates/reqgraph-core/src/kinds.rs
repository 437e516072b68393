//! Concrete node kinds.
//!
//! Every node carries one [`NodeData`] value. The variant name is the node's
//! stable type name: it is what gets written to `node.node_type`, what the
//! storage codec registry dispatches on, and the tag of the JSON wire object.
//!
//! Four kinds take part in the version chain (see [`NodeKind::COMMITABLE`]):
//! Product, Requirement, Story and UseCase.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::id::NodeId;

/// Typed access to one variant of [`NodeData`].
pub trait NodeKind: Default + Clone + Send + Sync + 'static {
    /// Stable type name, equal to the `NodeData` variant name.
    const TYPE_NAME: &'static str;
    /// Whether nodes of this kind carry a commit flag and version chain.
    const COMMITABLE: bool;

    fn from_data(data: &NodeData) -> Option<&Self>;
    fn from_data_mut(data: &mut NodeData) -> Option<&mut Self>;
    fn into_data(self) -> NodeData;
}

/// Current time as Unix epoch seconds.
pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

macro_rules! node_kinds {
    ($( $variant:ident($ty:ident) => $commitable:literal ),* $(,)?) => {
        /// Kind-specific payload of a node, tagged by type name.
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        pub enum NodeData {
            $( $variant($ty), )*
        }

        /// Every type name a node can carry, in registry order.
        pub const TYPE_NAMES: &[&str] = &[$( stringify!($variant), )*];

        impl NodeData {
            pub fn type_name(&self) -> &'static str {
                match self {
                    $( NodeData::$variant(_) => stringify!($variant), )*
                }
            }

            pub fn is_commitable(&self) -> bool {
                match self {
                    $( NodeData::$variant(_) => $commitable, )*
                }
            }

            /// A default payload for `type_name`, or `None` if no kind has it.
            pub fn for_type_name(type_name: &str) -> Option<NodeData> {
                match type_name {
                    $( stringify!($variant) => Some(NodeData::$variant($ty::default())), )*
                    _ => None,
                }
            }
        }

        $(
            impl NodeKind for $ty {
                const TYPE_NAME: &'static str = stringify!($variant);
                const COMMITABLE: bool = $commitable;

                fn from_data(data: &NodeData) -> Option<&Self> {
                    match data {
                        NodeData::$variant(inner) => Some(inner),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }

                fn from_data_mut(data: &mut NodeData) -> Option<&mut Self> {
                    match data {
                        NodeData::$variant(inner) => Some(inner),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }

                fn into_data(self) -> NodeData {
                    NodeData::$variant(self)
                }
            }
        )*
    };
}

node_kinds! {
    Node(Bare) => false,
    GraphNode(GraphNode) => false,
    Organization(Organization) => false,
    Product(Product) => true,
    Project(Project) => false,
    Requirement(Requirement) => true,
    Story(Story) => true,
    UseCase(UseCase) => true,
    Text(Text) => false,
    Completed(Completed) => false,
    KeyValue(KeyValue) => false,
    TimeEstimate(TimeEstimate) => false,
    Effort(Effort) => false,
    Role(Role) => false,
    Actor(Actor) => false,
    Goal(Goal) => false,
    Purpose(Purpose) => false,
    Person(Person) => false,
    EmailAddress(EmailAddress) => false,
    PhoneNumber(PhoneNumber) => false,
    InternationalAddress(InternationalAddress) => false,
    USAddress(USAddress) => false,
    Event(Event) => false,
    RecurringTodo(RecurringTodo) => false,
    Todo(Todo) => false,
    ServerLocatorNode(ServerLocatorNode) => false,
}

impl NodeData {
    /// Sub-nodes this node owns by id. Traversal follows them like edges.
    pub fn owned_links(&self) -> Option<NodeId> {
        match self {
            NodeData::InternationalAddress(a) => a.address_lines,
            NodeData::USAddress(a) => a.address_lines,
            _ => None,
        }
    }
}

impl Default for NodeData {
    fn default() -> Self {
        NodeData::Node(Bare {})
    }
}

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

/// The bare node: identity and edges only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bare {}

/// Root of a stored graph; listed by the graph locator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphNode {
    pub title: String,
}

/// An organization. While locked, its name can not change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Organization {
    locked: bool,
    name: String,
}

impl Organization {
    pub fn new(name: impl Into<String>) -> Self {
        Organization {
            locked: false,
            name: name.into(),
        }
    }

    /// Rebuilds an organization exactly as it was stored.
    pub fn restored(name: String, locked: bool) -> Self {
        Organization { locked, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> Result<(), CoreError> {
        if self.locked {
            return Err(CoreError::Locked);
        }
        self.name = name.into();
        Ok(())
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Product {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Project {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Requirement {
    pub title: String,
    pub text: String,
    pub functional: bool,
}

/// A user story: "as a (role), I want (goal) so that (benefit)".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Story {
    pub title: String,
    pub goal: String,
    pub benefit: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UseCase {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Text {
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Completed {
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

/// A time estimate. `estimate` is in seconds, `start_timestamp` is epoch seconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeEstimate {
    pub text: String,
    pub estimate: i64,
    pub started: bool,
    pub start_timestamp: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Effort {
    pub text: String,
    pub effort: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Role {
    pub who: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Actor {
    pub actor: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Goal {
    pub action: String,
    pub outcome: String,
    pub context: String,
    pub target_date: i64,
    pub target_date_confidence: String,
    pub alignment: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Purpose {
    pub description: String,
    pub deadline: i64,
    pub deadline_confidence: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Person {
    pub last_name: String,
    pub first_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmailAddress {
    pub address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhoneNumber {
    pub country_code: String,
    pub number: String,
    pub phone_type: String,
}

/// Postal address outside the US. `address_lines` points at an owned Text node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InternationalAddress {
    pub country_code: String,
    pub address_lines: Option<NodeId>,
    pub locality: String,
    pub postal_code: String,
}

/// US postal address. `address_lines` points at an owned Text node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct USAddress {
    pub address_lines: Option<NodeId>,
    pub city: String,
    pub state: String,
    pub zip_code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Event {
    pub name: String,
    pub description: String,
}

/// A template that periodically spawns [`Todo`]s.
///
/// `recurring_interval` is seconds when `seconds_flag` is set, otherwise a
/// day-of-month or day-of-year number depending on the other flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecurringTodo {
    pub description: String,
    pub created: i64,
    pub recurring_interval: i64,
    pub seconds_flag: bool,
    pub day_of_month_flag: bool,
    pub day_of_year_flag: bool,
}

impl Default for RecurringTodo {
    fn default() -> Self {
        RecurringTodo {
            description: String::new(),
            created: now_secs(),
            recurring_interval: 0,
            seconds_flag: false,
            day_of_month_flag: false,
            day_of_year_flag: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Todo {
    pub description: String,
    pub created: i64,
    pub due: i64,
    pub completed: bool,
    pub date_completed: i64,
    pub spawned_from: Option<NodeId>,
}

impl Default for Todo {
    fn default() -> Self {
        Todo {
            description: String::new(),
            created: now_secs(),
            due: 0,
            completed: false,
            date_completed: 0,
            spawned_from: None,
        }
    }
}

impl Todo {
    /// Marks the todo done at the current time.
    pub fn complete(&mut self) {
        self.completed = true;
        self.date_completed = now_secs();
    }
}

/// Transport-only record describing where a stored graph can be fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerLocatorNode {
    pub graph_uuid: Option<NodeId>,
    pub graph_title: String,
    pub graph_address: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn type_names_are_unique_and_resolvable() {
        let unique: HashSet<_> = TYPE_NAMES.iter().collect();
        assert_eq!(unique.len(), TYPE_NAMES.len());
        assert_eq!(TYPE_NAMES.len(), 26);
        for name in TYPE_NAMES {
            let data = NodeData::for_type_name(name).unwrap();
            assert_eq!(data.type_name(), *name);
        }
        assert!(NodeData::for_type_name("Spaceship").is_none());
    }

    #[test]
    fn commitable_kinds() {
        let commitable: Vec<_> = TYPE_NAMES
            .iter()
            .filter(|n| NodeData::for_type_name(n).unwrap().is_commitable())
            .copied()
            .collect();
        assert_eq!(commitable, vec!["Product", "Requirement", "Story", "UseCase"]);
        assert!(Requirement::COMMITABLE);
        assert!(!Organization::COMMITABLE);
    }

    #[test]
    fn kind_trait_matches_variant() {
        let mut data = Requirement {
            title: "R1".into(),
            ..Default::default()
        }
        .into_data();
        assert_eq!(data.type_name(), Requirement::TYPE_NAME);
        assert!(Story::from_data(&data).is_none());
        Requirement::from_data_mut(&mut data).unwrap().functional = true;
        assert!(Requirement::from_data(&data).unwrap().functional);
        assert_eq!(Bare::TYPE_NAME, "Node");
        assert_eq!(NodeData::default().type_name(), "Node");
    }

    #[test]
    fn locked_organization_rejects_rename() {
        let mut org = Organization::new("Acme");
        org.set_name("Acme Corp").unwrap();
        org.lock();
        assert!(matches!(org.set_name("Evil Acme"), Err(CoreError::Locked)));
        assert_eq!(org.name(), "Acme Corp");
        org.unlock();
        org.set_name("Acme Inc").unwrap();
        assert_eq!(org.name(), "Acme Inc");
    }

    #[test]
    fn todos_stamp_creation_time() {
        let before = now_secs();
        let todo = Todo::default();
        let recurring = RecurringTodo::default();
        assert!(todo.created >= before);
        assert!(recurring.created >= before);
        assert!(!todo.completed);
    }

    #[test]
    fn address_lines_are_owned_links() {
        let lines = NodeId::generate();
        let data = USAddress {
            address_lines: Some(lines),
            ..Default::default()
        }
        .into_data();
        assert_eq!(data.owned_links(), Some(lines));
        assert_eq!(Text::default().into_data().owned_links(), None);
    }

    #[test]
    fn payload_serializes_tagged_by_type_name() {
        let data = Story {
            title: "Login".into(),
            goal: "sign in".into(),
            benefit: "see my stuff".into(),
        }
        .into_data();
        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["Story"]["title"], "Login");
        assert_eq!(serde_json::to_value(NodeData::default()).unwrap(), serde_json::json!({"Node": {}}));
    }
}
