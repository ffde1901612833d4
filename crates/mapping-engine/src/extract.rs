//! Relationship extractor.
//!
//! Per-kind rules that find the ids of related entities inside a provider
//! record. A rule yields either a link to an entity that should already be
//! in the store, or a child entity embedded in the record (subnets, rules,
//! private addresses) that the engine creates on the spot.

use crate::error::MapperError;
use crate::normalize::{normalize_child, normalize_uid, NormalizedRecord};
use crate::schema::{ElementKind, Label, Relation, ResourceKind};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::iter;
use std::sync::OnceLock;

/// Which end of the edge the record being imported sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// record -[relation]-> target
    Outgoing,
    /// target -[relation]-> record
    Incoming,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub label: Label,
    pub uid: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub relation: Relation,
    pub direction: Direction,
    pub target: Target,
    /// Model relationship this link populates, for diagnostics.
    pub why: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Child {
    pub labels: Vec<Label>,
    /// Edge from the parent to the child.
    pub relation: Relation,
    pub record: NormalizedRecord,
}

/// A nested entity that could not be turned into a child. The parent is
/// still imported; the engine counts this as a malformed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejected {
    pub record_id: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    Link(Link),
    Child(Child),
    Rejected(Rejected),
}

fn rejected(record_id: Option<&str>, reason: impl Into<String>) -> Extracted {
    Extracted::Rejected(Rejected {
        record_id: record_id.map(str::to_string),
        reason: reason.into(),
    })
}

fn link(relation: Relation, direction: Direction, kind: ElementKind, uid: impl Into<String>, why: &'static str) -> Extracted {
    Extracted::Link(Link {
        relation,
        direction,
        target: Target {
            label: Label::Element(kind),
            uid: uid.into(),
        },
        why,
    })
}

fn parent_pattern(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).unwrap_or_else(|e| panic!("invalid id pattern {pattern}: {e}")))
}

fn vnet_of_subnet(subnet_id: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = parent_pattern(&RE, r"(?i)^(?P<parent>.+/virtualnetworks/[^/]+)/subnets/[^/]+$");
    re.captures(subnet_id).map(|c| c["parent"].to_string())
}

fn lb_of_backend_pool(pool_id: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = parent_pattern(&RE, r"(?i)^(?P<parent>.+/loadbalancers/[^/]+)/backendaddresspools/[^/]+$");
    re.captures(pool_id).map(|c| c["parent"].to_string())
}

fn vm_of_extension(extension_id: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = parent_pattern(&RE, r"(?i)^(?P<parent>.+/virtualmachines/[^/]+)/extensions/[^/]+$");
    re.captures(extension_id).map(|c| c["parent"].to_string())
}

/// `{"id": "..."}` reference objects, empty ids treated as absent.
fn ref_id(value: Option<&Value>) -> Option<&str> {
    value?.get("id")?.as_str().filter(|id| !id.is_empty())
}

fn items(value: Option<&Value>) -> impl Iterator<Item = &Value> {
    value.and_then(Value::as_array).into_iter().flatten()
}

/// Id of the interface that takes part in the VM to NIC edge: the one
/// flagged primary, or the only entry of a single-entry list.
pub fn primary_interface(record: &NormalizedRecord) -> Option<&str> {
    let nics = record.property("/networkProfile/networkInterfaces")?.as_array()?;
    let flagged = nics
        .iter()
        .find(|nic| nic.pointer("/properties/primary").and_then(Value::as_bool) == Some(true));
    let chosen = match flagged {
        Some(nic) => nic,
        None if nics.len() == 1 => &nics[0],
        None => {
            if !nics.is_empty() {
                tracing::debug!(
                    uid = %record.uid,
                    interfaces = nics.len(),
                    "No primary network interface flagged, leaving VM unlinked"
                );
            }
            return None;
        }
    };
    ref_id(Some(chosen))
}

/// Publisher of the image the VM was created from.
pub fn image_publisher(record: &NormalizedRecord) -> Option<&str> {
    record
        .property("/storageProfile/imageReference/publisher")
        .and_then(Value::as_str)
}

fn private_ip(parent: &NormalizedRecord, config: &Value) -> Option<NormalizedRecord> {
    let props = config.get("properties")?;
    let address = props
        .get("privateIPAddress")?
        .as_str()
        .filter(|a| !a.is_empty())?;

    let mut attributes = BTreeMap::new();
    attributes.insert("address".to_string(), address.to_string());
    for (field, attr) in [
        ("privateIPAllocationMethod", "allocationMethod"),
        ("privateIPAddressVersion", "version"),
    ] {
        if let Some(value) = props.get(field).and_then(Value::as_str).filter(|v| !v.is_empty()) {
            attributes.insert(attr.to_string(), value.to_string());
        }
    }
    if let Some(config_name) = config.get("name").and_then(Value::as_str) {
        attributes.insert("ipConfiguration".to_string(), config_name.to_string());
    }

    Some(NormalizedRecord {
        uid: format!("{}/privateIPAddresses/{}", parent.uid, address),
        name: address.to_string(),
        resource_group: parent.resource_group.clone(),
        subscription_id: parent.subscription_id.clone(),
        location: parent.location.clone(),
        zones: Vec::new(),
        properties: None,
        tags: BTreeMap::new(),
        attributes,
    })
}

fn child<'a>(
    parent: &'a NormalizedRecord,
    raw: &'a Value,
    labels: Vec<Label>,
    relation: Relation,
) -> Option<Extracted> {
    match normalize_child(parent, raw) {
        Ok(Some(record)) => Some(Extracted::Child(Child {
            labels,
            relation,
            record,
        })),
        Ok(None) => {
            tracing::debug!(parent = %parent.uid, %relation, "Nested entity without id skipped");
            None
        }
        Err(MapperError::MalformedRecord { record_id, reason }) => Some(rejected(record_id.as_deref(), reason)),
        Err(other) => Some(rejected(None, other.to_string())),
    }
}

fn ip_configuration<'a>(record: &'a NormalizedRecord, config: &'a Value) -> Vec<Extracted> {
    let props = config.get("properties");
    let mut out = Vec::new();

    if let Some(subnet) = ref_id(props.and_then(|p| p.get("subnet"))) {
        out.push(link(
            Relation::InterfaceSubnet,
            Direction::Outgoing,
            ElementKind::Subnet,
            subnet,
            "subnet of the interface's IP configuration",
        ));
        if let Some(vnet) = vnet_of_subnet(subnet) {
            out.push(link(
                Relation::NetworkInterfaceVn,
                Direction::Incoming,
                ElementKind::VirtualNetwork,
                vnet,
                "virtual network owning the interface's subnet",
            ));
        }
    }
    if let Some(record) = private_ip(record, config) {
        out.push(Extracted::Child(Child {
            labels: vec![Label::Element(ElementKind::PrivateIp)],
            relation: Relation::PrivateIp,
            record,
        }));
    }
    if let Some(public_ip) = ref_id(props.and_then(|p| p.get("publicIPAddress"))) {
        out.push(link(
            Relation::PublicIp,
            Direction::Outgoing,
            ElementKind::PublicIp,
            public_ip,
            "public address attached to the IP configuration",
        ));
    }
    for pool in items(props.and_then(|p| p.get("loadBalancerBackendAddressPools"))) {
        if let Some(lb) = ref_id(Some(pool)).and_then(lb_of_backend_pool) {
            out.push(link(
                Relation::BackendPool,
                Direction::Incoming,
                ElementKind::LoadBalancer,
                lb,
                "load balancer backend pool containing the interface",
            ));
        }
    }
    out
}

/// Relationship and child proposals for one record. Nothing here touches
/// the store; the engine resolves each proposal in order.
pub fn extract<'a>(
    kind: ResourceKind,
    record: &'a NormalizedRecord,
    raw: &'a Value,
) -> Box<dyn Iterator<Item = Extracted> + 'a> {
    match kind {
        ResourceKind::ResourceGroups
        | ResourceKind::PublicIps
        | ResourceKind::AppServicePlans
        | ResourceKind::StorageAccounts => Box::new(iter::empty()),

        ResourceKind::AppServices => Box::new(
            record
                .property("/serverFarmId")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .map(|plan| {
                    link(
                        Relation::ServiceElement,
                        Direction::Incoming,
                        ElementKind::Service,
                        normalize_uid(ResourceKind::AppServicePlans, plan),
                        "service plan hosting the app service",
                    )
                })
                .into_iter(),
        ),

        ResourceKind::LoadBalancers => {
            let public_ips = items(record.property("/frontendIPConfigurations")).filter_map(|frontend| {
                ref_id(frontend.pointer("/properties/publicIPAddress")).map(|ip| {
                    link(
                        Relation::LoadBalancerPublicIp,
                        Direction::Outgoing,
                        ElementKind::PublicIp,
                        ip,
                        "public address of a frontend configuration",
                    )
                })
            });
            let inbound = items(record.property("/inboundNatRules"))
                .chain(items(record.property("/loadBalancingRules")))
                .filter_map(move |rule| {
                    child(
                        record,
                        rule,
                        vec![Label::Element(ElementKind::InboundRule)],
                        Relation::InboundRule,
                    )
                });
            let outbound = items(record.property("/outboundRules")).filter_map(move |rule| {
                child(
                    record,
                    rule,
                    vec![Label::Element(ElementKind::OutboundRule)],
                    Relation::OutboundRule,
                )
            });
            Box::new(public_ips.chain(inbound).chain(outbound))
        }

        ResourceKind::VirtualNetworks => Box::new(items(record.property("/subnets")).filter_map(
            move |subnet| {
                let mut labels = vec![Label::Element(ElementKind::Subnet)];
                if subnet.get("name").and_then(Value::as_str) == Some("GatewaySubnet") {
                    labels.push(Label::Element(ElementKind::GatewaySubnet));
                }
                child(record, subnet, labels, Relation::Subnet)
            },
        )),

        ResourceKind::NetworkInterfaces => Box::new(
            items(record.property("/ipConfigurations"))
                .flat_map(move |config| ip_configuration(record, config)),
        ),

        ResourceKind::NetworkSecurityGroups => {
            let rules = items(record.property("/securityRules")).filter_map(move |rule| {
                let direction = rule.pointer("/properties/direction").and_then(Value::as_str);
                let (kind, relation) = match direction {
                    Some(d) if d.eq_ignore_ascii_case("inbound") => (ElementKind::InboundRule, Relation::InboundRule),
                    Some(d) if d.eq_ignore_ascii_case("outbound") => {
                        (ElementKind::OutboundRule, Relation::OutboundRule)
                    }
                    other => {
                        return Some(rejected(
                            rule.get("id").and_then(Value::as_str),
                            format!("security rule direction {:?} is neither Inbound nor Outbound", other),
                        ))
                    }
                };
                child(record, rule, vec![Label::Element(kind)], relation)
            });
            let interfaces = items(record.property("/networkInterfaces")).filter_map(|nic| {
                ref_id(Some(nic)).map(|id| {
                    link(
                        Relation::SecurityGroup,
                        Direction::Outgoing,
                        ElementKind::NetworkInterface,
                        id,
                        "interface governed by the security group",
                    )
                })
            });
            Box::new(rules.chain(interfaces))
        }

        ResourceKind::VirtualMachines => Box::new(
            primary_interface(record)
                .map(|nic| {
                    link(
                        Relation::NetworkInterface,
                        Direction::Outgoing,
                        ElementKind::NetworkInterface,
                        nic,
                        "primary network interface of the virtual machine",
                    )
                })
                .into_iter(),
        ),

        ResourceKind::Databases => Box::new(
            record
                .property("/sourceDatabaseId")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .map(|source| {
                    link(
                        Relation::DataSource,
                        Direction::Outgoing,
                        ElementKind::Database,
                        source,
                        "database this one was created from",
                    )
                })
                .into_iter(),
        ),

        ResourceKind::DeployedApplications => {
            let host = ref_id(record.property("/virtualMachine"))
                .map(str::to_string)
                .or_else(|| vm_of_extension(&record.uid));
            Box::new(
                host.map(|vm| {
                    link(
                        Relation::DeployedApplication,
                        Direction::Incoming,
                        ElementKind::VirtualMachine,
                        vm,
                        "virtual machine the application is deployed on",
                    )
                })
                .into_iter(),
            )
        }

        ResourceKind::Disks => Box::new(
            raw.get("managedBy")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .map(|vm| {
                    link(
                        Relation::Disk,
                        Direction::Incoming,
                        ElementKind::VirtualMachine,
                        vm,
                        "virtual machine the disk is attached to",
                    )
                })
                .into_iter(),
        ),
    }
}
