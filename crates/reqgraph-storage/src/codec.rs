//! Type codec registry.
//!
//! A [`NodeCodec`] maps one node kind onto its detail table. The saver and
//! the loader never look at concrete kinds: they ask the [`CodecRegistry`]
//! for the codec whose kind matches a node and dispatch through it.
//!
//! Most codecs are a [`KindCodec`] over a [`Columns`] description (table name
//! plus column list). [`BaseCodec`] handles the bare `Node` kind, which has
//! no detail table, and [`UnknownCodec`] is what lookups fall through to when
//! nothing is registered for a type.
//!
//! Every codec write also rewrites the node's association rows, and
//! commitable kinds keep their version chain in `commitable_node`.

use std::marker::PhantomData;

use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use reqgraph_core::kinds::{
    Actor, Completed, Effort, EmailAddress, Event, Goal, GraphNode, InternationalAddress,
    KeyValue, Organization, Person, PhoneNumber, Product, Project, Purpose, RecurringTodo,
    Requirement, Role, Story, Text, TimeEstimate, Todo, USAddress, UseCase,
};
use reqgraph_core::{Association, Direction, Node, NodeData, NodeId, NodeKind};

use crate::error::StorageError;

/// Per-kind persistence operations.
pub trait NodeCodec: Send + Sync {
    /// Type name this codec handles.
    fn type_name(&self) -> &'static str;

    /// Detail table name.
    fn table(&self) -> &'static str;

    fn matches(&self, data: &NodeData) -> bool {
        data.type_name() == self.type_name()
    }

    /// A fresh, default payload of this codec's kind.
    fn allocate(&self) -> NodeData;

    fn insert(&self, node: &Node, conn: &Connection) -> Result<(), StorageError>;

    fn update(&self, node: &Node, conn: &Connection) -> Result<(), StorageError>;

    /// Fills `node` from storage. Returns whether a detail row was found.
    fn load(&self, node: &Node, conn: &Connection) -> Result<bool, StorageError>;

    fn remove(&self, node: &Node, conn: &Connection) -> Result<(), StorageError>;

    /// Deletes this kind's own rows for `id`, leaving the generic row and
    /// associations. Used when a stored node changes kind.
    fn drop_details(&self, _id: NodeId, _conn: &Connection) -> Result<(), StorageError> {
        Ok(())
    }

    /// Ids of stored nodes that `id` refers to outside of its edges: version
    /// chain links and owned sub-nodes.
    fn links(&self, _id: NodeId, _conn: &Connection) -> Result<Vec<NodeId>, StorageError> {
        Ok(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// Column mapping
// ---------------------------------------------------------------------------

/// A value that fits in one column.
pub trait SqlField: Sized {
    fn to_sql_value(&self) -> Value;
    fn from_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Self>;
}

impl SqlField for String {
    fn to_sql_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Self> {
        row.get(idx)
    }
}

impl SqlField for bool {
    fn to_sql_value(&self) -> Value {
        Value::Integer(i64::from(*self))
    }

    fn from_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Self> {
        row.get(idx)
    }
}

impl SqlField for i64 {
    fn to_sql_value(&self) -> Value {
        Value::Integer(*self)
    }

    fn from_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Self> {
        row.get(idx)
    }
}

impl SqlField for Option<NodeId> {
    fn to_sql_value(&self) -> Value {
        match self {
            Some(id) => Value::Text(id.to_string()),
            None => Value::Null,
        }
    }

    fn from_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Self> {
        let text: Option<String> = row.get(idx)?;
        text.map(|t| parse_column_id(&t, idx)).transpose()
    }
}

fn parse_column_id(text: &str, idx: usize) -> rusqlite::Result<NodeId> {
    NodeId::parse(text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Table layout of one kind.
pub trait Columns: NodeKind {
    const TABLE: &'static str;
    /// Column names, excluding `id`, in the order of [`Columns::values`].
    const COLUMNS: &'static [&'static str];

    fn values(&self) -> Vec<Value>;

    /// Reads a row whose columns are [`Columns::COLUMNS`] starting at index 0.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

macro_rules! columns {
    ($kind:ty => $table:literal { $( $field:ident ),+ $(,)? }) => {
        impl Columns for $kind {
            const TABLE: &'static str = $table;
            const COLUMNS: &'static [&'static str] = &[$( stringify!($field) ),+];

            fn values(&self) -> Vec<Value> {
                vec![$( SqlField::to_sql_value(&self.$field) ),+]
            }

            fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
                let mut idx = 0usize;
                let mut next = || {
                    idx += 1;
                    idx - 1
                };
                Ok(Self {
                    $( $field: SqlField::from_column(row, next())?, )+
                })
            }
        }
    };
}

columns!(GraphNode => "graph_node" { title });
columns!(Product => "product" { title, description });
columns!(Project => "project" { name, description });
columns!(Requirement => "requirement" { title, text, functional });
columns!(Story => "story" { title, goal, benefit });
columns!(UseCase => "use_case" { name });
columns!(Text => "text" { text });
columns!(Completed => "completed" { description });
columns!(KeyValue => "keyvalue" { key, value });
columns!(TimeEstimate => "time_estimate" { text, estimate, started, start_timestamp });
columns!(Effort => "effort" { text, effort });
columns!(Role => "role" { who });
columns!(Actor => "actor" { actor });
columns!(Goal => "goal" {
    action, outcome, context, target_date, target_date_confidence, alignment
});
columns!(Purpose => "purpose" { description, deadline, deadline_confidence });
columns!(Person => "person" { last_name, first_name });
columns!(EmailAddress => "email_address" { address });
columns!(PhoneNumber => "phone_number" { country_code, number, phone_type });
columns!(InternationalAddress => "international_address" {
    country_code, address_lines, locality, postal_code
});
columns!(USAddress => "us_address" { address_lines, city, state, zip_code });
columns!(Event => "event" { name, description });
columns!(RecurringTodo => "recurring_todo" {
    description, created, recurring_interval, seconds_flag, day_of_month_flag, day_of_year_flag
});
columns!(Todo => "todo" {
    description, created, due, completed, date_completed, spawned_from
});

// Organization keeps its fields private behind the lock check.
impl Columns for Organization {
    const TABLE: &'static str = "organization";
    const COLUMNS: &'static [&'static str] = &["locked", "name"];

    fn values(&self) -> Vec<Value> {
        vec![
            self.is_locked().to_sql_value(),
            Value::Text(self.name().to_string()),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let locked: bool = row.get(0)?;
        let name: String = row.get(1)?;
        Ok(Organization::restored(name, locked))
    }
}

// ---------------------------------------------------------------------------
// Shared row helpers
// ---------------------------------------------------------------------------

/// Replaces the association rows owned by `id` with its current edge lists.
pub fn write_associations(
    conn: &Connection,
    id: NodeId,
    up: &[NodeId],
    down: &[NodeId],
) -> Result<(), StorageError> {
    let owner = id.to_string();
    conn.execute(
        "DELETE FROM node_associations WHERE owner_id = ?1",
        params![owner],
    )?;
    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO node_associations (owner_id, related_id, direction) \
         VALUES (?1, ?2, ?3)",
    )?;
    for (list, direction) in [(up, Direction::Up), (down, Direction::Down)] {
        for related in list {
            stmt.execute(params![owner, related.to_string(), direction.as_str()])?;
        }
    }
    Ok(())
}

/// Association rows owned by `id`, in the order they were written.
pub fn read_associations(conn: &Connection, id: NodeId) -> Result<Vec<Association>, StorageError> {
    let mut stmt = conn.prepare_cached(
        "SELECT related_id, direction FROM node_associations WHERE owner_id = ?1 ORDER BY rowid",
    )?;
    let rows = stmt.query_map(params![id.to_string()], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (related, direction) = row?;
        out.push(Association {
            owner: id,
            related: NodeId::parse(&related).map_err(|_| StorageError::InvalidId(related))?,
            direction: Direction::parse(&direction)?,
        });
    }
    Ok(out)
}

/// Stored type name of `id`, if it has a generic row.
pub fn stored_type(conn: &Connection, id: NodeId) -> Result<Option<String>, StorageError> {
    Ok(conn
        .query_row(
            "SELECT node_type FROM node WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )
        .optional()?)
}

fn write_commit_row(conn: &Connection, id: NodeId, node: &Node) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO commitable_node (id, committed, change_parent, change_child) \
         VALUES (?1, ?2, ?3, ?4) \
         ON CONFLICT(id) DO UPDATE SET committed = excluded.committed, \
         change_parent = excluded.change_parent, change_child = excluded.change_child",
        params![
            id.to_string(),
            node.is_committed(),
            node.change_parent().map(|p| p.to_string()),
            node.change_child().map(|c| c.to_string()),
        ],
    )?;
    Ok(())
}

type CommitRow = (bool, Option<NodeId>, Option<NodeId>);

fn read_commit_row(conn: &Connection, id: NodeId) -> Result<Option<CommitRow>, StorageError> {
    Ok(conn
        .query_row(
            "SELECT committed, change_parent, change_child FROM commitable_node WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok((
                    row.get::<_, bool>(0)?,
                    <Option<NodeId>>::from_column(row, 1)?,
                    <Option<NodeId>>::from_column(row, 2)?,
                ))
            },
        )
        .optional()?)
}

fn delete_rows(conn: &Connection, id: NodeId, table: Option<&str>) -> Result<(), StorageError> {
    let key = id.to_string();
    if let Some(table) = table {
        conn.execute(&format!("DELETE FROM {} WHERE id = ?1", table), params![key])?;
    }
    conn.execute("DELETE FROM commitable_node WHERE id = ?1", params![key])?;
    conn.execute(
        "DELETE FROM node_associations WHERE owner_id = ?1 OR related_id = ?1",
        params![key],
    )?;
    conn.execute("DELETE FROM node WHERE id = ?1", params![key])?;
    Ok(())
}

fn rewrite_edges(conn: &Connection, id: NodeId, node: &Node) -> Result<(), StorageError> {
    write_associations(conn, id, &node.up(), &node.down())
}

// ---------------------------------------------------------------------------
// Codecs
// ---------------------------------------------------------------------------

/// Table-driven codec for one kind.
pub struct KindCodec<K> {
    _kind: PhantomData<fn() -> K>,
}

impl<K> KindCodec<K> {
    pub fn new() -> Self {
        KindCodec { _kind: PhantomData }
    }
}

impl<K> Default for KindCodec<K> {
    fn default() -> Self {
        KindCodec::new()
    }
}

impl<K: Columns> KindCodec<K> {
    fn payload(node: &Node) -> Result<(NodeId, Vec<Value>), StorageError> {
        let id = node.require_id()?;
        let values = node.read::<K, _>(|kind| kind.values())?;
        Ok((id, values))
    }

    fn column_list() -> String {
        K::COLUMNS
            .iter()
            .map(|c| format!("\"{}\"", c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn select_row(conn: &Connection, id: NodeId) -> Result<Option<K>, StorageError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?1",
            Self::column_list(),
            K::TABLE
        );
        Ok(conn
            .query_row(&sql, params![id.to_string()], |row| K::from_row(row))
            .optional()?)
    }

    fn insert_row(conn: &Connection, id: NodeId, values: Vec<Value>) -> Result<(), StorageError> {
        let placeholders = (2..=K::COLUMNS.len() + 1)
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} (id, {}) VALUES (?1, {})",
            K::TABLE,
            Self::column_list(),
            placeholders
        );
        let params = std::iter::once(Value::Text(id.to_string())).chain(values);
        conn.execute(&sql, params_from_iter(params))?;
        Ok(())
    }
}

impl<K: Columns> NodeCodec for KindCodec<K> {
    fn type_name(&self) -> &'static str {
        K::TYPE_NAME
    }

    fn table(&self) -> &'static str {
        K::TABLE
    }

    fn allocate(&self) -> NodeData {
        K::default().into_data()
    }

    fn insert(&self, node: &Node, conn: &Connection) -> Result<(), StorageError> {
        let (id, values) = Self::payload(node)?;
        Self::insert_row(conn, id, values)?;
        if K::COMMITABLE {
            write_commit_row(conn, id, node)?;
        }
        rewrite_edges(conn, id, node)
    }

    fn update(&self, node: &Node, conn: &Connection) -> Result<(), StorageError> {
        let (id, values) = Self::payload(node)?;
        let assignments = K::COLUMNS
            .iter()
            .enumerate()
            .map(|(i, c)| format!("\"{}\" = ?{}", c, i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("UPDATE {} SET {} WHERE id = ?1", K::TABLE, assignments);
        let params = std::iter::once(Value::Text(id.to_string())).chain(values.iter().cloned());
        let updated = conn.execute(&sql, params_from_iter(params))?;
        if updated == 0 {
            // Generic row without a detail row, e.g. after a type change.
            Self::insert_row(conn, id, values)?;
        }
        if K::COMMITABLE {
            write_commit_row(conn, id, node)?;
        }
        rewrite_edges(conn, id, node)
    }

    fn load(&self, node: &Node, conn: &Connection) -> Result<bool, StorageError> {
        let id = node.require_id()?;
        let Some(kind) = Self::select_row(conn, id)? else {
            return Ok(false);
        };
        node.restore_data(kind.into_data());
        if K::COMMITABLE {
            if let Some((committed, parent, child)) = read_commit_row(conn, id)? {
                node.restore_commit(committed, parent, child);
            }
        }
        Ok(true)
    }

    fn remove(&self, node: &Node, conn: &Connection) -> Result<(), StorageError> {
        delete_rows(conn, node.require_id()?, Some(K::TABLE))
    }

    fn drop_details(&self, id: NodeId, conn: &Connection) -> Result<(), StorageError> {
        let key = id.to_string();
        conn.execute(&format!("DELETE FROM {} WHERE id = ?1", K::TABLE), params![key])?;
        if K::COMMITABLE {
            conn.execute("DELETE FROM commitable_node WHERE id = ?1", params![key])?;
        }
        Ok(())
    }

    fn links(&self, id: NodeId, conn: &Connection) -> Result<Vec<NodeId>, StorageError> {
        let mut out = Vec::new();
        if K::COMMITABLE {
            if let Some((_, parent, child)) = read_commit_row(conn, id)? {
                out.extend(parent);
                out.extend(child);
            }
        }
        if let Some(kind) = Self::select_row(conn, id)? {
            out.extend(kind.into_data().owned_links());
        }
        Ok(out)
    }
}

/// Codec for the bare `Node` kind: identity and edges, no detail table.
#[derive(Debug, Default)]
pub struct BaseCodec;

impl NodeCodec for BaseCodec {
    fn type_name(&self) -> &'static str {
        "Node"
    }

    fn table(&self) -> &'static str {
        "node"
    }

    fn allocate(&self) -> NodeData {
        NodeData::default()
    }

    fn insert(&self, node: &Node, conn: &Connection) -> Result<(), StorageError> {
        rewrite_edges(conn, node.require_id()?, node)
    }

    fn update(&self, node: &Node, conn: &Connection) -> Result<(), StorageError> {
        rewrite_edges(conn, node.require_id()?, node)
    }

    fn load(&self, _node: &Node, _conn: &Connection) -> Result<bool, StorageError> {
        Ok(true)
    }

    fn remove(&self, node: &Node, conn: &Connection) -> Result<(), StorageError> {
        delete_rows(conn, node.require_id()?, None)
    }
}

/// Fallback for kinds nothing is registered for.
///
/// Writes fail with [`StorageError::TypeNotRegistered`]; loads find nothing.
#[derive(Debug, Default)]
pub struct UnknownCodec;

impl UnknownCodec {
    fn refuse(node: &Node, operation: &'static str) -> StorageError {
        StorageError::TypeNotRegistered {
            type_name: node.type_name().to_string(),
            operation,
        }
    }
}

impl NodeCodec for UnknownCodec {
    fn type_name(&self) -> &'static str {
        "Unknown"
    }

    fn table(&self) -> &'static str {
        ""
    }

    fn matches(&self, _data: &NodeData) -> bool {
        false
    }

    fn allocate(&self) -> NodeData {
        NodeData::default()
    }

    fn insert(&self, node: &Node, _conn: &Connection) -> Result<(), StorageError> {
        Err(Self::refuse(node, "insert"))
    }

    fn update(&self, node: &Node, _conn: &Connection) -> Result<(), StorageError> {
        Err(Self::refuse(node, "update"))
    }

    fn load(&self, _node: &Node, _conn: &Connection) -> Result<bool, StorageError> {
        Ok(false)
    }

    fn remove(&self, node: &Node, _conn: &Connection) -> Result<(), StorageError> {
        Err(Self::refuse(node, "remove"))
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Ordered codec list. Lookups take the first match and fall through to
/// [`UnknownCodec`].
pub struct CodecRegistry {
    codecs: Vec<Box<dyn NodeCodec>>,
    fallback: UnknownCodec,
}

impl CodecRegistry {
    /// An empty registry: every lookup falls through.
    pub fn empty() -> Self {
        CodecRegistry {
            codecs: Vec::new(),
            fallback: UnknownCodec,
        }
    }

    /// Every persisted kind. `ServerLocatorNode` is transport-only and has no
    /// codec.
    pub fn standard() -> Self {
        let mut registry = CodecRegistry::empty();
        registry.register(KindCodec::<GraphNode>::new());
        registry.register(KindCodec::<Organization>::new());
        registry.register(KindCodec::<Product>::new());
        registry.register(KindCodec::<Project>::new());
        registry.register(KindCodec::<Requirement>::new());
        registry.register(KindCodec::<Story>::new());
        registry.register(KindCodec::<UseCase>::new());
        registry.register(KindCodec::<Text>::new());
        registry.register(KindCodec::<Completed>::new());
        registry.register(KindCodec::<KeyValue>::new());
        registry.register(KindCodec::<TimeEstimate>::new());
        registry.register(KindCodec::<Effort>::new());
        registry.register(KindCodec::<Role>::new());
        registry.register(KindCodec::<Actor>::new());
        registry.register(KindCodec::<Goal>::new());
        registry.register(KindCodec::<Purpose>::new());
        registry.register(KindCodec::<Person>::new());
        registry.register(KindCodec::<EmailAddress>::new());
        registry.register(KindCodec::<PhoneNumber>::new());
        registry.register(KindCodec::<InternationalAddress>::new());
        registry.register(KindCodec::<USAddress>::new());
        registry.register(KindCodec::<Event>::new());
        registry.register(KindCodec::<RecurringTodo>::new());
        registry.register(KindCodec::<Todo>::new());
        registry.register(BaseCodec);
        registry
    }

    pub fn register(&mut self, codec: impl NodeCodec + 'static) {
        self.codecs.push(Box::new(codec));
    }

    /// The registered codec for `type_name`, if any.
    pub fn find(&self, type_name: &str) -> Option<&dyn NodeCodec> {
        self.codecs
            .iter()
            .find(|c| c.type_name() == type_name)
            .map(|c| c.as_ref())
    }

    pub fn by_type_name(&self, type_name: &str) -> &dyn NodeCodec {
        self.find(type_name).unwrap_or(&self.fallback)
    }

    pub fn for_data(&self, data: &NodeData) -> &dyn NodeCodec {
        self.codecs
            .iter()
            .find(|c| c.matches(data))
            .map(|c| c.as_ref())
            .unwrap_or(&self.fallback)
    }

    pub fn for_node(&self, node: &Node) -> &dyn NodeCodec {
        node.with_data(|data| self.for_data(data))
    }

    pub fn type_names(&self) -> Vec<&'static str> {
        self.codecs.iter().map(|c| c.type_name()).collect()
    }

    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        CodecRegistry::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqgraph_core::kinds::ServerLocatorNode;
    use reqgraph_core::TYPE_NAMES;

    fn conn() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        crate::schema::configure_and_migrate(&mut conn).unwrap();
        conn
    }

    fn stored(conn: &Connection, node: &Node) {
        conn.execute(
            "INSERT INTO node (id, node_type) VALUES (?1, ?2)",
            params![node.id_string(), node.type_name()],
        )
        .unwrap();
    }

    #[test]
    fn standard_registry_covers_every_persisted_kind() {
        let registry = CodecRegistry::standard();
        for name in TYPE_NAMES {
            let found = registry.find(name).is_some();
            assert_eq!(found, *name != ServerLocatorNode::TYPE_NAME, "{}", name);
        }
        assert_eq!(registry.len(), TYPE_NAMES.len() - 1);
    }

    #[test]
    fn lookups_fall_through_to_unknown() {
        let registry = CodecRegistry::empty();
        let node = Node::of(Text::default());
        node.init();
        let codec = registry.for_node(&node);
        assert_eq!(codec.type_name(), "Unknown");
        let conn = conn();
        let err = codec.insert(&node, &conn).unwrap_err();
        assert!(matches!(
            err,
            StorageError::TypeNotRegistered { ref type_name, operation: "insert" } if type_name == "Text"
        ));
        assert!(matches!(codec.update(&node, &conn), Err(StorageError::TypeNotRegistered { .. })));
        assert!(matches!(codec.remove(&node, &conn), Err(StorageError::TypeNotRegistered { .. })));
        assert!(!codec.load(&node, &conn).unwrap());
    }

    #[test]
    fn insert_update_load_requirement() {
        let conn = conn();
        let registry = CodecRegistry::standard();
        let node = Node::of(Requirement {
            title: "R1".into(),
            text: "must spin".into(),
            functional: true,
        });
        node.init();
        let parent = NodeId::generate();
        node.add_up(parent);
        stored(&conn, &node);

        let codec = registry.for_node(&node);
        assert_eq!(codec.table(), "requirement");
        codec.insert(&node, &conn).unwrap();

        node.edit::<Requirement, _>(|r| r.title = "R1 revised".into()).unwrap();
        node.commit().unwrap();
        codec.update(&node, &conn).unwrap();

        let fresh = Node::restored(node.id().unwrap(), codec.allocate());
        assert!(codec.load(&fresh, &conn).unwrap());
        assert_eq!(fresh.data(), node.data());
        assert!(fresh.is_committed());
        assert!(!fresh.is_changed());

        let assocs = read_associations(&conn, node.id().unwrap()).unwrap();
        assert_eq!(assocs.len(), 1);
        assert_eq!(assocs[0].related, parent);
        assert_eq!(assocs[0].direction, Direction::Up);
    }

    #[test]
    fn associations_are_rewritten_not_appended() {
        let conn = conn();
        let node = Node::of(Text::default());
        let id = node.init();
        stored(&conn, &node);
        let (a, b) = (NodeId::generate(), NodeId::generate());

        write_associations(&conn, id, &[a], &[a, b]).unwrap();
        assert_eq!(read_associations(&conn, id).unwrap().len(), 3);
        write_associations(&conn, id, &[], &[b]).unwrap();
        let rows = read_associations(&conn, id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].related, b);
    }

    #[test]
    fn organization_round_trips_locked_flag() {
        let conn = conn();
        let codec = KindCodec::<Organization>::new();
        let mut org = Organization::new("Acme");
        org.lock();
        let node = Node::of(org);
        node.init();
        stored(&conn, &node);
        codec.insert(&node, &conn).unwrap();

        let fresh = Node::restored(node.id().unwrap(), codec.allocate());
        assert!(codec.load(&fresh, &conn).unwrap());
        fresh
            .read::<Organization, _>(|o| {
                assert!(o.is_locked());
                assert_eq!(o.name(), "Acme");
            })
            .unwrap();
    }

    #[test]
    fn address_lines_and_chain_are_links() {
        let conn = conn();
        let lines = NodeId::generate();
        let address = Node::of(USAddress {
            address_lines: Some(lines),
            city: "Springfield".into(),
            ..Default::default()
        });
        let id = address.init();
        stored(&conn, &address);
        KindCodec::<USAddress>::new().insert(&address, &conn).unwrap();
        assert_eq!(KindCodec::<USAddress>::new().links(id, &conn).unwrap(), vec![lines]);

        let story = Node::of(Story::default());
        let story_id = story.init();
        let child = NodeId::generate();
        story.set_change_child(Some(child));
        stored(&conn, &story);
        KindCodec::<Story>::new().insert(&story, &conn).unwrap();
        assert_eq!(KindCodec::<Story>::new().links(story_id, &conn).unwrap(), vec![child]);
    }

    #[test]
    fn load_missing_row_reports_not_found() {
        let conn = conn();
        let node = Node::restored(NodeId::generate(), Text::default().into_data());
        assert!(!KindCodec::<Text>::new().load(&node, &conn).unwrap());
    }

    #[test]
    fn remove_clears_every_row() {
        let conn = conn();
        let node = Node::of(Product::default());
        let id = node.init();
        node.add_down(NodeId::generate());
        stored(&conn, &node);
        let codec = KindCodec::<Product>::new();
        codec.insert(&node, &conn).unwrap();
        codec.remove(&node, &conn).unwrap();

        for table in ["node", "product", "commitable_node"] {
            let count: i64 = conn
                .query_row(
                    &format!("SELECT COUNT(*) FROM {} WHERE id = ?1", table),
                    params![id.to_string()],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 0, "{}", table);
        }
        assert!(read_associations(&conn, id).unwrap().is_empty());
    }
}
