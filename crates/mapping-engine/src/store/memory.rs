use super::{index_key, unique_entries, Attributes, EdgeView, GraphStore, NodeHandle, NodeView};
use crate::error::{StoreError, StoreResult};
use crate::persistence::GraphSnapshot;
use crate::schema::{Label, Relation};
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct StoredNode {
    labels: Vec<Label>,
    attributes: Attributes,
}

/// In-process graph kept as an adjacency list.
///
/// Handles are dense indices, so a node's handle is stable for the life of
/// the store and a cleared store restarts at zero.
#[derive(Debug, Clone, Default)]
pub struct MemoryGraph {
    nodes: Vec<StoredNode>,
    /// Adjacency list: NodeID -> Vec<(NeighborID, Relation)>
    adj: Vec<Vec<(u64, Relation)>>,
    /// Unique key -> node, one entry per keyed label of each node.
    index: HashMap<String, NodeHandle>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_edges(&self) -> usize {
        self.adj.iter().map(|neighbors| neighbors.len()).sum()
    }

    pub fn node(&self, handle: NodeHandle) -> Option<NodeView> {
        self.nodes.get(handle.0 as usize).map(|node| NodeView {
            handle,
            labels: node.labels.clone(),
            attributes: node.attributes.clone(),
        })
    }

    /// First element node carrying `uid`, whatever its label.
    pub fn find_by_uid(&self, uid: &str) -> Option<NodeView> {
        self.nodes
            .iter()
            .position(|node| node.attributes.get("uid").map(String::as_str) == Some(uid))
            .and_then(|idx| self.node(NodeHandle(idx as u64)))
    }

    pub fn nodes_with_label(&self, label: Label) -> Vec<NodeView> {
        (0..self.nodes.len() as u64)
            .filter_map(|idx| self.node(NodeHandle(idx)))
            .filter(|node| node.has_label(label))
            .collect()
    }

    pub fn neighbors(&self, handle: NodeHandle) -> impl Iterator<Item = (NodeHandle, Relation)> + '_ {
        self.adj
            .get(handle.0 as usize)
            .into_iter()
            .flatten()
            .map(|(to, relation)| (NodeHandle(*to), *relation))
    }

    /// Targets reachable from `handle` over one `relation` edge.
    pub fn outgoing(&self, handle: NodeHandle, relation: Relation) -> Vec<NodeView> {
        self.neighbors(handle)
            .filter(|(_, r)| *r == relation)
            .filter_map(|(to, _)| self.node(to))
            .collect()
    }

    /// Sources pointing at `handle` over one `relation` edge.
    pub fn incoming(&self, handle: NodeHandle, relation: Relation) -> Vec<NodeView> {
        self.adj
            .iter()
            .enumerate()
            .filter(|(_, edges)| edges.iter().any(|(to, r)| *to == handle.0 && *r == relation))
            .filter_map(|(from, _)| self.node(NodeHandle(from as u64)))
            .collect()
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            taken_at: chrono::Utc::now().to_rfc3339(),
            nodes: self
                .nodes
                .iter()
                .map(|node| (node.labels.clone(), node.attributes.clone()))
                .collect(),
            edges: self
                .adj
                .iter()
                .enumerate()
                .flat_map(|(from, edges)| edges.iter().map(move |(to, r)| (from as u64, *r, *to)))
                .collect(),
        }
    }

    /// Rebuilds a graph, and its unique index, from a snapshot.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> StoreResult<Self> {
        let mut graph = Self::new();
        for (labels, attributes) in snapshot.nodes {
            graph.create_node(&labels, attributes)?;
        }
        for (from, relation, to) in snapshot.edges {
            graph.create_edge(relation, NodeHandle(from), NodeHandle(to))?;
        }
        Ok(graph)
    }

    fn check(&self, handle: NodeHandle) -> StoreResult<usize> {
        let idx = handle.0 as usize;
        if idx < self.nodes.len() {
            Ok(idx)
        } else {
            Err(StoreError::UnknownNode(handle))
        }
    }
}

impl GraphStore for MemoryGraph {
    fn create_node(&mut self, labels: &[Label], attributes: Attributes) -> StoreResult<NodeHandle> {
        let entries = unique_entries(labels, &attributes);
        if let Some((label, key)) = entries.iter().find(|(_, key)| self.index.contains_key(key)) {
            return Err(StoreError::ConstraintViolation {
                label: *label,
                key: key.clone(),
            });
        }

        let handle = NodeHandle(self.nodes.len() as u64);
        self.nodes.push(StoredNode {
            labels: labels.to_vec(),
            attributes,
        });
        self.adj.push(Vec::new());
        for (_, key) in entries {
            self.index.insert(key, handle);
        }
        Ok(handle)
    }

    fn create_edge(&mut self, relation: Relation, from: NodeHandle, to: NodeHandle) -> StoreResult<()> {
        let src = self.check(from)?;
        self.check(to)?;
        self.adj[src].push((to.0, relation));
        Ok(())
    }

    fn find_node(&self, label: Label, key: &[(&str, &str)]) -> StoreResult<Option<NodeHandle>> {
        Ok(self.index.get(&index_key(label, key)).copied())
    }

    fn clear_all(&mut self) -> StoreResult<()> {
        self.nodes.clear();
        self.adj.clear();
        self.index.clear();
        Ok(())
    }

    fn labels_of(&self, node: NodeHandle) -> StoreResult<Vec<Label>> {
        let idx = self.check(node)?;
        Ok(self.nodes[idx].labels.clone())
    }

    fn nodes(&self) -> StoreResult<Vec<NodeView>> {
        Ok((0..self.nodes.len() as u64)
            .filter_map(|idx| self.node(NodeHandle(idx)))
            .collect())
    }

    fn edges(&self) -> StoreResult<Vec<EdgeView>> {
        Ok(self
            .adj
            .iter()
            .enumerate()
            .flat_map(|(from, edges)| {
                edges.iter().map(move |(to, relation)| EdgeView {
                    from: NodeHandle(from as u64),
                    relation: *relation,
                    to: NodeHandle(*to),
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ElementKind;

    fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_find_observes_prior_creates() {
        let mut graph = MemoryGraph::new();
        let vm = Label::Element(ElementKind::VirtualMachine);
        let handle = graph.create_node(&[vm], attrs(&[("uid", "vm1"), ("name", "vm1")])).unwrap();

        assert_eq!(graph.find_node(vm, &[("uid", "vm1")]).unwrap(), Some(handle));
        assert_eq!(graph.find_node(vm, &[("uid", "vm2")]).unwrap(), None);
        assert_eq!(
            graph
                .find_node(Label::Element(ElementKind::Disk), &[("uid", "vm1")])
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_unique_uid_is_enforced_per_label() {
        let mut graph = MemoryGraph::new();
        let disk = Label::Element(ElementKind::Disk);
        graph.create_node(&[disk], attrs(&[("uid", "d1")])).unwrap();
        let err = graph.create_node(&[disk], attrs(&[("uid", "d1")])).unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation { .. }));
        assert_eq!(graph.num_nodes(), 1);
    }

    #[test]
    fn test_stacked_labels_are_findable_under_each() {
        let mut graph = MemoryGraph::new();
        let vm = Label::Element(ElementKind::VirtualMachine);
        let db = Label::Element(ElementKind::Database);
        let handle = graph.create_node(&[vm, db], attrs(&[("uid", "sql1")])).unwrap();
        assert_eq!(graph.find_node(vm, &[("uid", "sql1")]).unwrap(), Some(handle));
        assert_eq!(graph.find_node(db, &[("uid", "sql1")]).unwrap(), Some(handle));
    }

    #[test]
    fn test_property_nodes_are_never_deduplicated() {
        let mut graph = MemoryGraph::new();
        let kv = attrs(&[("key", "env"), ("value", "prod")]);
        graph.create_node(&[Label::Property, Label::Tag], kv.clone()).unwrap();
        graph.create_node(&[Label::Property, Label::Tag], kv).unwrap();
        assert_eq!(graph.nodes_with_label(Label::Tag).len(), 2);
    }

    #[test]
    fn test_edges_require_known_handles() {
        let mut graph = MemoryGraph::new();
        let a = graph.create_node(&[Label::Property], Attributes::new()).unwrap();
        let err = graph
            .create_edge(Relation::ObjectProperty, a, NodeHandle(42))
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownNode(NodeHandle(42))));
    }

    #[test]
    fn test_clear_all_resets_index_and_handles() {
        let mut graph = MemoryGraph::new();
        let rg = Label::ResourceGroup;
        let key = attrs(&[("name", "rg1"), ("subscription_id", "s1")]);
        graph.create_node(&[rg], key.clone()).unwrap();
        graph.clear_all().unwrap();
        assert_eq!(graph.num_nodes(), 0);
        assert_eq!(graph.create_node(&[rg], key).unwrap(), NodeHandle(0));
    }

    #[test]
    fn test_snapshot_round_trip_keeps_index() {
        let mut graph = MemoryGraph::new();
        let vm = Label::Element(ElementKind::VirtualMachine);
        let a = graph.create_node(&[vm], attrs(&[("uid", "vm1")])).unwrap();
        let b = graph.create_node(&[Label::Property], attrs(&[("key", "size")])).unwrap();
        graph.create_edge(Relation::ObjectProperty, a, b).unwrap();

        let restored = MemoryGraph::from_snapshot(graph.snapshot()).unwrap();
        assert_eq!(restored.num_nodes(), 2);
        assert_eq!(restored.num_edges(), 1);
        assert_eq!(restored.find_node(vm, &[("uid", "vm1")]).unwrap(), Some(a));
        assert_eq!(restored.outgoing(a, Relation::ObjectProperty).len(), 1);
    }
}
