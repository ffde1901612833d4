//! Graph store adapter.
//!
//! The engine only needs four operations from a backing store: create a
//! node, create a typed edge, find a node by its unique key and wipe
//! everything. A `find_node` must observe every node created earlier in the
//! same session, since later kinds resolve their links against earlier ones.

use crate::error::StoreResult;
use crate::schema::{Label, Relation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub mod memory;
pub mod rdf;
pub mod shape;

pub use memory::MemoryGraph;
pub use rdf::RdfGraph;
pub use shape::GraphShape;

/// Scalar attributes stored inline on a node.
pub type Attributes = BTreeMap<String, String>;

/// Opaque node identifier issued by a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeHandle(pub u64);

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Read-only copy of a stored node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeView {
    pub handle: NodeHandle,
    pub labels: Vec<Label>,
    pub attributes: Attributes,
}

impl NodeView {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn has_label(&self, label: Label) -> bool {
        self.labels.contains(&label)
    }
}

/// Read-only copy of a stored edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeView {
    pub from: NodeHandle,
    pub relation: Relation,
    pub to: NodeHandle,
}

/// Operations the population engine requires from a backing store.
pub trait GraphStore {
    /// Creates a node carrying every label in `labels`. Fails with
    /// `ConstraintViolation` when a label's unique key is already taken.
    fn create_node(&mut self, labels: &[Label], attributes: Attributes) -> StoreResult<NodeHandle>;

    fn create_edge(&mut self, relation: Relation, from: NodeHandle, to: NodeHandle) -> StoreResult<()>;

    /// Looks a node up by the attribute values of a unique key.
    fn find_node(&self, label: Label, key: &[(&str, &str)]) -> StoreResult<Option<NodeHandle>>;

    fn clear_all(&mut self) -> StoreResult<()>;

    fn labels_of(&self, node: NodeHandle) -> StoreResult<Vec<Label>>;

    fn nodes(&self) -> StoreResult<Vec<NodeView>>;

    fn edges(&self) -> StoreResult<Vec<EdgeView>>;
}

/// Builds the index key used to enforce and look up unique keys.
pub(crate) fn index_key(label: Label, key: &[(&str, &str)]) -> String {
    let mut out = String::from(label.as_str());
    for (attr, value) in key {
        out.push('|');
        out.push_str(attr);
        out.push('=');
        out.push_str(value);
    }
    out
}

/// Unique-key tuples a node would occupy, one per label that defines a key.
/// Labels whose key attributes are missing from the node are not indexed.
pub(crate) fn unique_entries(labels: &[Label], attributes: &Attributes) -> Vec<(Label, String)> {
    labels
        .iter()
        .filter_map(|label| {
            let key = label.unique_key();
            if key.is_empty() {
                return None;
            }
            let values: Option<Vec<(&str, &str)>> = key
                .iter()
                .map(|attr| attributes.get(*attr).map(|v| (*attr, v.as_str())))
                .collect();
            values.map(|values| (*label, index_key(*label, &values)))
        })
        .collect()
}
