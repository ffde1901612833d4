//! Graph population engine.
//!
//! Drives an import run: kinds in dependency order, records one at a time.
//! Each record is normalized, classified, written as an entity node with its
//! expanded property and tag nodes, placed in its resource group, and then
//! every relationship the extractor proposes is resolved against what the
//! store already holds. A target that is not there yet is skipped and logged,
//! never queued.
//!
//! Failure policy:
//! - missing relationship target: the edge is skipped, the record goes on;
//! - malformed record or store rejection: the record is abandoned, the kind
//!   goes on, and the failure is counted in the run summary;
//! - clear failure or an unavailable store: the run stops.

use crate::config::MapperConfig;
use crate::error::MapperError;
use crate::extract::{extract, image_publisher, Child, Direction, Extracted, Link, Rejected, Target};
use crate::inventory::Inventory;
use crate::normalize::{normalize, NormalizedRecord};
use crate::schema::{ElementKind, Label, Relation, ResourceKind};
use crate::store::{Attributes, GraphStore, NodeHandle};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

/// Per-kind counters of an import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub records: usize,
    pub nodes_created: usize,
    pub edges_created: usize,
    pub skipped_relations: usize,
    pub malformed_records: usize,
    pub store_failures: usize,
}

impl Counters {
    fn add(&mut self, other: &Counters) {
        self.records += other.records;
        self.nodes_created += other.nodes_created;
        self.edges_created += other.edges_created;
        self.skipped_relations += other.skipped_relations;
        self.malformed_records += other.malformed_records;
        self.store_failures += other.store_failures;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KindReport {
    pub kind: ResourceKind,
    #[serde(flatten)]
    pub counts: Counters,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub kinds: Vec<KindReport>,
}

impl ImportSummary {
    pub fn totals(&self) -> Counters {
        let mut totals = Counters::default();
        for report in &self.kinds {
            totals.add(&report.counts);
        }
        totals
    }

    pub fn kind(&self, kind: ResourceKind) -> Option<&Counters> {
        self.kinds.iter().find(|r| r.kind == kind).map(|r| &r.counts)
    }

    /// True when nothing was skipped or rejected.
    pub fn is_complete(&self) -> bool {
        let totals = self.totals();
        totals.skipped_relations == 0 && totals.malformed_records == 0 && totals.store_failures == 0
    }
}

/// Where an edge lookup points: a label plus the values of its unique key.
struct Lookup<'k> {
    label: Label,
    key: Vec<(&'static str, &'k str)>,
}

impl<'k> Lookup<'k> {
    fn uid(label: Label, uid: &'k str) -> Self {
        Self {
            label,
            key: vec![("uid", uid)],
        }
    }

    fn describe(&self) -> String {
        self.key
            .iter()
            .map(|(_, v)| *v)
            .collect::<Vec<_>>()
            .join("@")
    }
}

impl<'k> From<&'k Target> for Lookup<'k> {
    fn from(target: &'k Target) -> Self {
        Lookup::uid(target.label, &target.uid)
    }
}

pub struct GraphPopulator<'c, S: GraphStore> {
    store: S,
    config: &'c MapperConfig,
    /// Edges created on get-or-create paths, so shared nodes are linked once.
    linked: HashSet<(NodeHandle, Relation, NodeHandle)>,
}

impl<'c, S: GraphStore> GraphPopulator<'c, S> {
    pub fn new(store: S, config: &'c MapperConfig) -> Self {
        Self {
            store,
            config,
            linked: HashSet::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Deletes every node and edge. A failure leaves the store in an
    /// undefined state and must end the run.
    pub fn clear(&mut self) -> Result<(), MapperError> {
        if let Err(e) = self.store.clear_all() {
            error!(error = %e, "Clearing the graph store failed, its contents are now undefined");
            return Err(MapperError::ClearFailure(e));
        }
        self.linked.clear();
        info!("Graph store cleared");
        Ok(())
    }

    /// Imports every kind of `inventory` in dependency order.
    pub fn import(&mut self, inventory: &Inventory) -> Result<ImportSummary, MapperError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("import_run", %run_id);
        let _guard = span.enter();
        let started_at = Utc::now();
        info!(records = inventory.total_records(), "Import run started");

        let mut kinds = Vec::with_capacity(ResourceKind::IMPORT_ORDER.len());
        for kind in ResourceKind::IMPORT_ORDER {
            let counts = self.import_kind(kind, inventory.records(kind))?;
            kinds.push(KindReport { kind, counts });
        }

        let summary = ImportSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            kinds,
        };
        let totals = summary.totals();
        if summary.is_complete() {
            info!(
                nodes = totals.nodes_created,
                edges = totals.edges_created,
                "Import run finished"
            );
        } else {
            warn!(
                nodes = totals.nodes_created,
                edges = totals.edges_created,
                skipped_relations = totals.skipped_relations,
                malformed_records = totals.malformed_records,
                store_failures = totals.store_failures,
                "Import run finished with gaps"
            );
        }
        Ok(summary)
    }

    /// Imports all records of one kind. Only run-level failures are returned;
    /// everything else is counted and logged per record.
    pub fn import_kind(&mut self, kind: ResourceKind, records: &[Value]) -> Result<Counters, MapperError> {
        let span = info_span!("import_kind", %kind);
        let _guard = span.enter();
        let mut counts = Counters::default();

        for raw in records {
            counts.records += 1;
            match self.import_record(kind, raw, &mut counts) {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "Import run aborted");
                    return Err(e);
                }
                Err(MapperError::MalformedRecord { record_id, reason }) => {
                    counts.malformed_records += 1;
                    error!(
                        record_id = record_id.as_deref().unwrap_or("<no id>"),
                        %reason,
                        "Skipping malformed record"
                    );
                }
                Err(MapperError::StoreFailure { record_id, source }) => {
                    counts.store_failures += 1;
                    error!(%record_id, error = %source, "Store rejected record, skipping");
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            records = counts.records,
            nodes = counts.nodes_created,
            edges = counts.edges_created,
            skipped_relations = counts.skipped_relations,
            "Kind imported"
        );
        Ok(counts)
    }

    fn import_record(&mut self, kind: ResourceKind, raw: &Value, counts: &mut Counters) -> Result<(), MapperError> {
        let record = normalize(kind, raw)?;
        if kind == ResourceKind::ResourceGroups {
            return self.import_resource_group(&record, counts);
        }

        let labels = self.classify(kind, &record);
        let node = self.create_entity(&labels, &record, key_attributes(kind, &record), counts)?;
        self.attach_attributes(node, &record, counts)?;
        self.place(node, &record, counts)?;

        let mut seen = HashSet::new();
        for item in extract(kind, &record, raw) {
            match item {
                Extracted::Link(link) => {
                    if seen.insert((link.relation, link.direction, link.target.clone())) {
                        self.follow(node, &record, &link, counts)?;
                    }
                }
                Extracted::Child(child) => self.import_child(node, child, counts)?,
                Extracted::Rejected(Rejected { record_id, reason }) => {
                    counts.malformed_records += 1;
                    error!(
                        record_id = record_id.as_deref().unwrap_or("<no id>"),
                        parent = %record.uid,
                        %reason,
                        "Skipping malformed nested entity"
                    );
                }
            }
        }
        Ok(())
    }

    /// Labels of the node created for a record. Database images turn a
    /// virtual machine into a database; the decision is final.
    fn classify(&self, kind: ResourceKind, record: &NormalizedRecord) -> Vec<Label> {
        let vm = Label::Element(ElementKind::VirtualMachine);
        let db = Label::Element(ElementKind::Database);
        match kind {
            ResourceKind::VirtualMachines => match image_publisher(record) {
                Some(publisher) if self.config.is_database_publisher(publisher) => {
                    debug!(uid = %record.uid, publisher, "Virtual machine classified as database");
                    vec![vm, db]
                }
                _ => vec![vm],
            },
            ResourceKind::Databases => vec![vm, db],
            _ => kind
                .element_kind()
                .map(|element| vec![Label::Element(element)])
                .unwrap_or_else(|| vec![Label::ResourceGroup]),
        }
    }

    fn import_resource_group(&mut self, record: &NormalizedRecord, counts: &mut Counters) -> Result<(), MapperError> {
        let mut attributes = Attributes::new();
        attributes.insert("uid".into(), record.uid.clone());
        attributes.insert("name".into(), record.name.clone());
        attributes.insert("subscription_id".into(), record.subscription_id.clone());
        attributes.insert("properties".into(), record.properties_blob());
        attributes.insert("tags".into(), record.tags_blob());
        if let Some(location) = &record.location {
            attributes.insert("location".into(), location.clone());
        }

        let node = self
            .store
            .create_node(&[Label::ResourceGroup], attributes)
            .map_err(|e| MapperError::store(&record.uid, e))?;
        counts.nodes_created += 1;
        self.attach_attributes(node, record, counts)?;

        let owner = self.get_or_create(Label::Owner, &[("uid", record.subscription_id.as_str())], &record.uid, counts)?;
        self.connect(Relation::OwnedResourceGroup, owner, node, &record.uid, counts)?;
        if let Some(location) = &record.location {
            let region = self.get_or_create(Label::Region, &[("name", location.as_str())], &record.uid, counts)?;
            self.connect_once(Relation::OwnedRegion, owner, region, &record.uid, counts)?;
        }
        Ok(())
    }

    fn create_entity(
        &mut self,
        labels: &[Label],
        record: &NormalizedRecord,
        extra: Attributes,
        counts: &mut Counters,
    ) -> Result<NodeHandle, MapperError> {
        let mut attributes = extra;
        attributes.insert("uid".into(), record.uid.clone());
        attributes.insert("name".into(), record.name.clone());
        attributes.insert("properties".into(), record.properties_blob());
        attributes.insert("tags".into(), record.tags_blob());

        let node = self
            .store
            .create_node(labels, attributes)
            .map_err(|e| MapperError::store(&record.uid, e))?;
        counts.nodes_created += 1;
        Ok(node)
    }

    /// Expanded attribute nodes: one `Property` per scalar attribute and one
    /// `Tag` per tag, each owned by exactly this node.
    fn attach_attributes(&mut self, node: NodeHandle, record: &NormalizedRecord, counts: &mut Counters) -> Result<(), MapperError> {
        for (key, value) in &record.attributes {
            self.attach(node, &[Label::Property], Relation::ObjectProperty, key, value, &record.uid, counts)?;
        }
        for (key, value) in &record.tags {
            self.attach(node, &[Label::Property, Label::Tag], Relation::ObjectTag, key, value, &record.uid, counts)?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn attach(
        &mut self,
        owner: NodeHandle,
        labels: &[Label],
        relation: Relation,
        key: &str,
        value: &str,
        record_uid: &str,
        counts: &mut Counters,
    ) -> Result<(), MapperError> {
        let mut attributes = Attributes::new();
        attributes.insert("key".into(), key.to_string());
        attributes.insert("value".into(), value.to_string());
        let node = self
            .store
            .create_node(labels, attributes)
            .map_err(|e| MapperError::store(record_uid, e))?;
        counts.nodes_created += 1;
        self.connect(relation, owner, node, record_uid, counts)
    }

    /// Resource group membership, subscription ownership and zone placement.
    fn place(&mut self, node: NodeHandle, record: &NormalizedRecord, counts: &mut Counters) -> Result<(), MapperError> {
        let group = Lookup {
            label: Label::ResourceGroup,
            key: vec![
                ("name", record.resource_group.as_str()),
                ("subscription_id", record.subscription_id.as_str()),
            ],
        };
        self.try_resolve(node, record, Relation::ResourceGroupElement, Direction::Incoming, group, "resource group", counts)?;

        let owner = Lookup {
            label: Label::Owner,
            key: vec![("uid", record.subscription_id.as_str())],
        };
        self.try_resolve(node, record, Relation::OwnedElement, Direction::Incoming, owner, "owning subscription", counts)?;

        let Some(location) = &record.location else {
            if !record.zones.is_empty() {
                debug!(uid = %record.uid, "Zoned record without location, zones not mapped");
            }
            return Ok(());
        };
        for zone in &record.zones {
            let zone_name = format!("{}-{}", location, zone);
            let region = self.get_or_create(Label::Region, &[("name", location.as_str())], &record.uid, counts)?;
            let az = self.get_or_create(Label::AvailabilityZone, &[("name", zone_name.as_str())], &record.uid, counts)?;
            self.connect_once(Relation::AvailabilityZone, region, az, &record.uid, counts)?;
            self.connect(Relation::ZoneElement, az, node, &record.uid, counts)?;
        }
        Ok(())
    }

    fn import_child(&mut self, parent: NodeHandle, child: Child, counts: &mut Counters) -> Result<(), MapperError> {
        let node = self.create_entity(&child.labels, &child.record, Attributes::new(), counts)?;
        self.attach_attributes(node, &child.record, counts)?;
        self.connect(child.relation, parent, node, &child.record.uid, counts)?;
        self.place(node, &child.record, counts)
    }

    fn follow(&mut self, node: NodeHandle, record: &NormalizedRecord, link: &Link, counts: &mut Counters) -> Result<(), MapperError> {
        self.try_resolve(
            node,
            record,
            link.relation,
            link.direction,
            Lookup::from(&link.target),
            link.why,
            counts,
        )
    }

    /// Resolves one relationship; a missing target is logged and skipped.
    #[allow(clippy::too_many_arguments)]
    fn try_resolve(
        &mut self,
        node: NodeHandle,
        record: &NormalizedRecord,
        relation: Relation,
        direction: Direction,
        target: Lookup<'_>,
        why: &str,
        counts: &mut Counters,
    ) -> Result<(), MapperError> {
        match self.resolve(node, record, relation, direction, &target, counts) {
            Err(MapperError::MissingReference {
                source_uid,
                relation,
                target_uid,
            }) => {
                counts.skipped_relations += 1;
                warn!(
                    %source_uid,
                    %relation,
                    %target_uid,
                    target_label = %target.label,
                    why,
                    "Relationship target not found, edge skipped"
                );
                Ok(())
            }
            other => other,
        }
    }

    fn resolve(
        &mut self,
        node: NodeHandle,
        record: &NormalizedRecord,
        relation: Relation,
        direction: Direction,
        target: &Lookup<'_>,
        counts: &mut Counters,
    ) -> Result<(), MapperError> {
        let peer = self
            .store
            .find_node(target.label, &target.key)
            .map_err(|e| MapperError::store(&record.uid, e))?
            .ok_or_else(|| MapperError::MissingReference {
                source_uid: record.uid.clone(),
                relation,
                target_uid: target.describe(),
            })?;
        let (from, to) = match direction {
            Direction::Outgoing => (node, peer),
            Direction::Incoming => (peer, node),
        };
        self.connect(relation, from, to, &record.uid, counts)
    }

    fn get_or_create(
        &mut self,
        label: Label,
        key: &[(&str, &str)],
        record_uid: &str,
        counts: &mut Counters,
    ) -> Result<NodeHandle, MapperError> {
        if let Some(node) = self
            .store
            .find_node(label, key)
            .map_err(|e| MapperError::store(record_uid, e))?
        {
            return Ok(node);
        }
        let attributes: Attributes = key
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let node = self
            .store
            .create_node(&[label], attributes)
            .map_err(|e| MapperError::store(record_uid, e))?;
        counts.nodes_created += 1;
        debug!(%label, key = ?key, "Created shared node");
        Ok(node)
    }

    fn connect(
        &mut self,
        relation: Relation,
        from: NodeHandle,
        to: NodeHandle,
        record_uid: &str,
        counts: &mut Counters,
    ) -> Result<(), MapperError> {
        if cfg!(debug_assertions) {
            if let (Ok(source), Ok(target)) = (self.store.labels_of(from), self.store.labels_of(to)) {
                debug_assert!(
                    relation.accepts(&source, &target),
                    "{relation} does not connect {source:?} to {target:?}"
                );
            }
        }
        self.store
            .create_edge(relation, from, to)
            .map_err(|e| MapperError::store(record_uid, e))?;
        counts.edges_created += 1;
        Ok(())
    }

    fn connect_once(
        &mut self,
        relation: Relation,
        from: NodeHandle,
        to: NodeHandle,
        record_uid: &str,
        counts: &mut Counters,
    ) -> Result<(), MapperError> {
        if self.linked.insert((from, relation, to)) {
            self.connect(relation, from, to, record_uid, counts)?;
        }
        Ok(())
    }
}

/// Scalar attributes specific to a kind, stored inline next to uid and name.
fn key_attributes(kind: ResourceKind, record: &NormalizedRecord) -> Attributes {
    let mut attributes = Attributes::new();
    if let Some(service) = kind.service_name() {
        attributes.insert("service_name".into(), service.to_string());
    }
    if kind == ResourceKind::LoadBalancers {
        if let Some(pool) = record
            .property("/backendAddressPools/0/id")
            .and_then(Value::as_str)
        {
            attributes.insert("backend_pool_id".into(), pool.to_string());
        }
    }
    attributes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryGraph;
    use serde_json::json;

    fn group(name: &str, subscription: &str) -> Value {
        json!({
            "id": format!("/subscriptions/{subscription}/resourceGroups/{name}"),
            "resourceGroup": name,
            "subscriptionId": subscription,
            "location": "westeurope",
            "properties": {},
            "tags": null
        })
    }

    #[test]
    fn test_resource_groups_share_owner_and_region() {
        let config = MapperConfig::default();
        let mut populator = GraphPopulator::new(MemoryGraph::new(), &config);
        let counts = populator
            .import_kind(ResourceKind::ResourceGroups, &[group("a", "s1"), group("b", "s1")])
            .unwrap();
        assert_eq!(counts.records, 2);

        let graph = populator.store();
        assert_eq!(graph.nodes_with_label(Label::Owner).len(), 1);
        assert_eq!(graph.nodes_with_label(Label::Region).len(), 1);
        let owner = graph.nodes_with_label(Label::Owner)[0].handle;
        assert_eq!(graph.outgoing(owner, Relation::OwnedResourceGroup).len(), 2);
        assert_eq!(graph.outgoing(owner, Relation::OwnedRegion).len(), 1);
    }

    #[test]
    fn test_zones_hang_off_the_region() {
        let config = MapperConfig::default();
        let mut populator = GraphPopulator::new(MemoryGraph::new(), &config);
        populator
            .import_kind(ResourceKind::ResourceGroups, &[group("rg1", "s1")])
            .unwrap();
        let ip = json!({
            "id": "pip1", "name": "pip1", "resourceGroup": "rg1", "subscriptionId": "s1",
            "location": "westeurope", "zones": ["1", "2"], "tags": {}
        });
        populator.import_kind(ResourceKind::PublicIps, &[ip]).unwrap();

        let graph = populator.store();
        let zones = graph.nodes_with_label(Label::AvailabilityZone);
        assert_eq!(zones.len(), 2);
        let region = graph.nodes_with_label(Label::Region)[0].handle;
        assert_eq!(graph.outgoing(region, Relation::AvailabilityZone).len(), 2);
        let pip = graph.find_by_uid("pip1").unwrap();
        assert_eq!(graph.incoming(pip.handle, Relation::ZoneElement).len(), 2);
    }

    #[test]
    fn test_load_balancer_keeps_backend_pool_id() {
        let config = MapperConfig::default();
        let mut populator = GraphPopulator::new(MemoryGraph::new(), &config);
        let lb = json!({
            "id": "lb1", "name": "lb1", "resourceGroup": "rg1", "subscriptionId": "s1", "tags": {},
            "properties": {
                "backendAddressPools": [{"id": "lb1/backendAddressPools/pool"}],
                "loadBalancingRules": [{"id": "lb1/loadBalancingRules/http", "name": "http"}],
                "outboundRules": [{"id": "lb1/outboundRules/egress", "name": "egress"}]
            }
        });
        let counts = populator.import_kind(ResourceKind::LoadBalancers, &[lb]).unwrap();
        // Resource group and owner are absent: two skips per created element.
        assert_eq!(counts.skipped_relations, 6);

        let graph = populator.store();
        let node = graph.find_by_uid("lb1").unwrap();
        assert_eq!(node.attribute("backend_pool_id"), Some("lb1/backendAddressPools/pool"));
        assert_eq!(graph.outgoing(node.handle, Relation::InboundRule).len(), 1);
        assert_eq!(graph.outgoing(node.handle, Relation::OutboundRule).len(), 1);
    }

    #[test]
    fn test_summary_totals() {
        let mut summary = ImportSummary {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            kinds: Vec::new(),
        };
        assert!(summary.is_complete());
        summary.kinds.push(KindReport {
            kind: ResourceKind::Disks,
            counts: Counters {
                records: 2,
                skipped_relations: 1,
                ..Counters::default()
            },
        });
        assert_eq!(summary.totals().records, 2);
        assert!(!summary.is_complete());
        assert_eq!(summary.kind(ResourceKind::Disks).map(|c| c.skipped_relations), Some(1));
    }
}
