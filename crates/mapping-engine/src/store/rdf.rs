//! Graph store over an `oxigraph` RDF store.
//!
//! Nodes are IRIs under `http://sysmap.io/node/`, labels are `rdf:type`
//! triples, attributes are plain literals and edges are triples whose
//! predicate names the relation. The layout keeps the graph queryable with
//! SPARQL while still honoring the adapter contract.

use super::{index_key, Attributes, EdgeView, GraphStore, NodeHandle, NodeView};
use crate::error::{StoreError, StoreResult};
use crate::schema::{Label, Relation};
use anyhow::Result;
use oxigraph::model::vocab::rdf;
use oxigraph::model::*;
use oxigraph::store::{StorageError, Store};
use std::collections::BTreeMap;

const NODE_NS: &str = "http://sysmap.io/node/";
const LABEL_NS: &str = "http://sysmap.io/label/";
const ATTR_NS: &str = "http://sysmap.io/attr/";
const REL_NS: &str = "http://sysmap.io/rel/";
const NODE_CLASS: &str = "http://sysmap.io/Node";

fn backend(err: StorageError) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn node_iri(handle: NodeHandle) -> NamedNode {
    NamedNode::new_unchecked(format!("{}{}", NODE_NS, handle.0))
}

fn label_iri(label: Label) -> NamedNode {
    NamedNode::new_unchecked(format!("{}{}", LABEL_NS, label.as_str()))
}

fn attr_iri(attr: &str) -> NamedNode {
    NamedNode::new_unchecked(format!("{}{}", ATTR_NS, attr))
}

fn rel_iri(relation: Relation) -> NamedNode {
    NamedNode::new_unchecked(format!("{}{}", REL_NS, relation.as_str()))
}

fn handle_of_iri(iri: &str) -> Option<NodeHandle> {
    iri.strip_prefix(NODE_NS)?.parse().ok().map(NodeHandle)
}

fn handle_of_subject(subject: &Subject) -> Option<NodeHandle> {
    match subject {
        Subject::NamedNode(node) => handle_of_iri(node.as_str()),
        _ => None,
    }
}

fn handle_of_term(term: &Term) -> Option<NodeHandle> {
    match term {
        Term::NamedNode(node) => handle_of_iri(node.as_str()),
        _ => None,
    }
}

pub struct RdfGraph {
    pub store: Store,
    next_node: u64,
}

impl RdfGraph {
    /// Volatile store, gone with the process.
    pub fn in_memory() -> StoreResult<Self> {
        let store = Store::new().map_err(backend)?;
        Ok(Self { store, next_node: 0 })
    }

    /// Opens (or creates) an on-disk store. Handles continue after the
    /// highest node already present.
    #[cfg(feature = "rocksdb")]
    pub fn open(path: &std::path::Path) -> StoreResult<Self> {
        std::fs::create_dir_all(path).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let store = Store::open(path).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let mut graph = Self { store, next_node: 0 };
        graph.next_node = graph
            .node_handles()?
            .into_iter()
            .max()
            .map_or(0, |handle| handle.0 + 1);
        Ok(graph)
    }

    fn insert(&self, subject: NamedNode, predicate: NamedNode, object: impl Into<Term>) -> StoreResult<()> {
        let quad = Quad::new(subject, predicate, object, GraphName::DefaultGraph);
        self.store.insert(&quad).map_err(backend)?;
        Ok(())
    }

    fn contains(&self, subject: NamedNode, predicate: NamedNode, object: impl Into<Term>) -> StoreResult<bool> {
        let quad = Quad::new(subject, predicate, object, GraphName::DefaultGraph);
        self.store.contains(&quad).map_err(backend)
    }

    fn exists(&self, handle: NodeHandle) -> StoreResult<bool> {
        self.contains(
            node_iri(handle),
            rdf::TYPE.into_owned(),
            NamedNode::new_unchecked(NODE_CLASS),
        )
    }

    fn node_handles(&self) -> StoreResult<Vec<NodeHandle>> {
        let class = NamedNode::new_unchecked(NODE_CLASS);
        let mut handles = Vec::new();
        for quad in self
            .store
            .quads_for_pattern(None, Some(rdf::TYPE), Some(class.as_ref().into()), None)
        {
            let quad = quad.map_err(backend)?;
            if let Some(handle) = handle_of_subject(&quad.subject) {
                handles.push(handle);
            }
        }
        handles.sort();
        Ok(handles)
    }

    fn view(&self, handle: NodeHandle) -> StoreResult<NodeView> {
        let iri = node_iri(handle);
        let mut labels = Vec::new();
        let mut attributes = BTreeMap::new();
        for quad in self
            .store
            .quads_for_pattern(Some(iri.as_ref().into()), None, None, None)
        {
            let quad = quad.map_err(backend)?;
            let predicate = quad.predicate.as_str();
            if predicate == rdf::TYPE.as_str() {
                if let Term::NamedNode(class) = &quad.object {
                    if let Some(label) = class.as_str().strip_prefix(LABEL_NS).and_then(Label::from_name) {
                        labels.push(label);
                    }
                }
            } else if let Some(attr) = predicate.strip_prefix(ATTR_NS) {
                if let Term::Literal(literal) = &quad.object {
                    attributes.insert(attr.to_string(), literal.value().to_string());
                }
            }
        }
        labels.sort();
        Ok(NodeView {
            handle,
            labels,
            attributes,
        })
    }

    /// Runs a SELECT query and returns its solutions as a JSON array of
    /// objects keyed by variable name.
    pub fn query_sparql(&self, query: &str) -> Result<String> {
        use oxigraph::sparql::QueryResults;

        let results = self.store.query(query)?;

        match results {
            QueryResults::Solutions(solutions) => {
                let mut results_array = Vec::new();
                for solution in solutions {
                    let sol = solution?;
                    let mut mapping = serde_json::Map::new();
                    for (variable, value) in sol.iter() {
                        let text = match value {
                            Term::Literal(literal) => literal.value().to_string(),
                            Term::NamedNode(node) => node.as_str().to_string(),
                            other => other.to_string(),
                        };
                        mapping.insert(variable.as_str().to_string(), serde_json::Value::String(text));
                    }
                    results_array.push(serde_json::Value::Object(mapping));
                }
                Ok(serde_json::to_string(&results_array)?)
            }
            QueryResults::Boolean(value) => Ok(value.to_string()),
            QueryResults::Graph(_) => Ok("[]".to_string()),
        }
    }
}

impl GraphStore for RdfGraph {
    fn create_node(&mut self, labels: &[Label], attributes: Attributes) -> StoreResult<NodeHandle> {
        for label in labels {
            let key = label.unique_key();
            if key.is_empty() {
                continue;
            }
            let values: Option<Vec<(&str, &str)>> = key
                .iter()
                .map(|attr| attributes.get(*attr).map(|v| (*attr, v.as_str())))
                .collect();
            if let Some(values) = values {
                if self.find_node(*label, &values)?.is_some() {
                    return Err(StoreError::ConstraintViolation {
                        label: *label,
                        key: index_key(*label, &values),
                    });
                }
            }
        }

        let handle = NodeHandle(self.next_node);
        self.next_node += 1;
        let iri = node_iri(handle);
        self.insert(
            iri.clone(),
            rdf::TYPE.into_owned(),
            NamedNode::new_unchecked(NODE_CLASS),
        )?;
        for label in labels {
            self.insert(iri.clone(), rdf::TYPE.into_owned(), label_iri(*label))?;
        }
        for (attr, value) in &attributes {
            self.insert(iri.clone(), attr_iri(attr), Literal::new_simple_literal(value))?;
        }
        Ok(handle)
    }

    fn create_edge(&mut self, relation: Relation, from: NodeHandle, to: NodeHandle) -> StoreResult<()> {
        for handle in [from, to] {
            if !self.exists(handle)? {
                return Err(StoreError::UnknownNode(handle));
            }
        }
        self.insert(node_iri(from), rel_iri(relation), node_iri(to))
    }

    fn find_node(&self, label: Label, key: &[(&str, &str)]) -> StoreResult<Option<NodeHandle>> {
        let Some(((first_attr, first_value), rest)) = key.split_first() else {
            return Ok(None);
        };
        let predicate = attr_iri(first_attr);
        let literal = Literal::new_simple_literal(*first_value);

        'candidates: for quad in self.store.quads_for_pattern(
            None,
            Some(predicate.as_ref()),
            Some(literal.as_ref().into()),
            None,
        ) {
            let quad = quad.map_err(backend)?;
            let Some(handle) = handle_of_subject(&quad.subject) else {
                continue;
            };
            if !self.contains(node_iri(handle), rdf::TYPE.into_owned(), label_iri(label))? {
                continue;
            }
            for (attr, value) in rest {
                if !self.contains(node_iri(handle), attr_iri(attr), Literal::new_simple_literal(*value))? {
                    continue 'candidates;
                }
            }
            return Ok(Some(handle));
        }
        Ok(None)
    }

    fn clear_all(&mut self) -> StoreResult<()> {
        self.store.clear().map_err(backend)?;
        self.next_node = 0;
        Ok(())
    }

    fn labels_of(&self, node: NodeHandle) -> StoreResult<Vec<Label>> {
        if !self.exists(node)? {
            return Err(StoreError::UnknownNode(node));
        }
        Ok(self.view(node)?.labels)
    }

    fn nodes(&self) -> StoreResult<Vec<NodeView>> {
        self.node_handles()?
            .into_iter()
            .map(|handle| self.view(handle))
            .collect()
    }

    fn edges(&self) -> StoreResult<Vec<EdgeView>> {
        let mut edges = Vec::new();
        for quad in self.store.iter() {
            let quad = quad.map_err(backend)?;
            let Some(relation) = quad
                .predicate
                .as_str()
                .strip_prefix(REL_NS)
                .and_then(Relation::from_name)
            else {
                continue;
            };
            if let (Some(from), Some(to)) = (handle_of_subject(&quad.subject), handle_of_term(&quad.object)) {
                edges.push(EdgeView { from, relation, to });
            }
        }
        Ok(edges)
    }
}
