//! Handle-independent view of a graph.
//!
//! Two stores hold the same graph when their shapes are equal: nodes are
//! identified by their natural key (uid, owner uid, resource group key, name) and
//! attribute nodes by their owner plus key/value, never by handle.

use super::{Attributes, GraphStore, NodeHandle, NodeView};
use crate::error::StoreResult;
use crate::schema::{Label, Relation};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShapeNode {
    pub labels: Vec<String>,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphShape {
    pub nodes: BTreeMap<String, ShapeNode>,
    pub edges: BTreeSet<(String, String, String)>,
}

fn natural_key(node: &NodeView) -> Option<String> {
    if node.has_label(Label::ResourceGroup) {
        return Some(format!(
            "rg:{}@{}",
            node.attribute("name")?,
            node.attribute("subscription_id")?
        ));
    }
    if node.has_label(Label::Region) || node.has_label(Label::AvailabilityZone) {
        let label = node.labels.first()?;
        return Some(format!("{}:{}", label, node.attribute("name")?));
    }
    if node.has_label(Label::Owner) {
        return node.attribute("uid").map(|uid| format!("owner:{}", uid));
    }
    node.attribute("uid").map(|uid| format!("uid:{}", uid))
}

impl GraphShape {
    pub fn capture<S: GraphStore + ?Sized>(store: &S) -> StoreResult<Self> {
        let nodes = store.nodes()?;
        let edges = store.edges()?;

        let mut identity: HashMap<NodeHandle, String> = HashMap::new();
        for node in &nodes {
            if let Some(key) = natural_key(node) {
                identity.insert(node.handle, key);
            }
        }

        // Attribute nodes take their identity from the owning node.
        for edge in &edges {
            if !matches!(edge.relation, Relation::ObjectProperty | Relation::ObjectTag) {
                continue;
            }
            let Some(owner) = identity.get(&edge.from).cloned() else {
                continue;
            };
            if let Some(node) = nodes.iter().find(|n| n.handle == edge.to) {
                let key = format!(
                    "{}#{}:{}={}",
                    owner,
                    edge.relation,
                    node.attribute("key").unwrap_or_default(),
                    node.attribute("value").unwrap_or_default()
                );
                identity.insert(edge.to, key);
            }
        }

        let name = |handle: NodeHandle| {
            identity
                .get(&handle)
                .cloned()
                .unwrap_or_else(|| format!("node:{}", handle))
        };

        let mut shape = GraphShape::default();
        for node in &nodes {
            let mut labels: Vec<String> = node.labels.iter().map(|l| l.to_string()).collect();
            labels.sort();
            shape.nodes.insert(
                name(node.handle),
                ShapeNode {
                    labels,
                    attributes: node.attributes.clone(),
                },
            );
        }
        for edge in &edges {
            shape
                .edges
                .insert((name(edge.from), edge.relation.to_string(), name(edge.to)));
        }
        Ok(shape)
    }

    /// Node counts per label.
    pub fn label_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for node in self.nodes.values() {
            for label in &node.labels {
                *counts.entry(label.clone()).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Edge counts per relation.
    pub fn relation_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for (_, relation, _) in &self.edges {
            *counts.entry(relation.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn has_edge(&self, from: &str, relation: Relation, to: &str) -> bool {
        self.edges
            .contains(&(from.to_string(), relation.to_string(), to.to_string()))
    }
}
