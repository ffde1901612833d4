//! Entity schema of the resource graph.
//!
//! Node labels, typed relations between them and the resource kinds the
//! collector produces. Everything here is plain data: the engine, the
//! normalizer and the store backends read these tables, nothing in this
//! module touches a store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Concrete cloud resource categories. A node may carry several of them when
/// one is a specialization of another (`Database` on top of `VirtualMachine`,
/// `GatewaySubnet` on top of `Subnet`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ElementKind {
    VirtualMachine,
    Database,
    Disk,
    NetworkInterface,
    Subnet,
    GatewaySubnet,
    Connection,
    VirtualNetwork,
    NetworkSecurityGroup,
    LoadBalancer,
    PublicIp,
    PrivateIp,
    InboundRule,
    OutboundRule,
    Service,
    Storage,
    DeployedApplication,
}

impl ElementKind {
    pub const ALL: [ElementKind; 17] = [
        ElementKind::VirtualMachine,
        ElementKind::Database,
        ElementKind::Disk,
        ElementKind::NetworkInterface,
        ElementKind::Subnet,
        ElementKind::GatewaySubnet,
        ElementKind::Connection,
        ElementKind::VirtualNetwork,
        ElementKind::NetworkSecurityGroup,
        ElementKind::LoadBalancer,
        ElementKind::PublicIp,
        ElementKind::PrivateIp,
        ElementKind::InboundRule,
        ElementKind::OutboundRule,
        ElementKind::Service,
        ElementKind::Storage,
        ElementKind::DeployedApplication,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::VirtualMachine => "VirtualMachine",
            ElementKind::Database => "Database",
            ElementKind::Disk => "Disk",
            ElementKind::NetworkInterface => "NetworkInterface",
            ElementKind::Subnet => "Subnet",
            ElementKind::GatewaySubnet => "GatewaySubnet",
            ElementKind::Connection => "Connection",
            ElementKind::VirtualNetwork => "VirtualNetwork",
            ElementKind::NetworkSecurityGroup => "NetworkSecurityGroup",
            ElementKind::LoadBalancer => "LoadBalancer",
            ElementKind::PublicIp => "PublicIp",
            ElementKind::PrivateIp => "PrivateIp",
            ElementKind::InboundRule => "InboundRule",
            ElementKind::OutboundRule => "OutboundRule",
            ElementKind::Service => "Service",
            ElementKind::Storage => "Storage",
            ElementKind::DeployedApplication => "DeployedApplication",
        }
    }
}

/// A node label. Non-element labels form the ownership hierarchy and the
/// expanded attribute nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Label {
    Owner,
    Region,
    AvailabilityZone,
    ResourceGroup,
    Property,
    Tag,
    Element(ElementKind),
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Owner => "Owner",
            Label::Region => "Region",
            Label::AvailabilityZone => "AvailabilityZone",
            Label::ResourceGroup => "ResourceGroup",
            Label::Property => "Property",
            Label::Tag => "Tag",
            Label::Element(kind) => kind.as_str(),
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Owner" => Some(Label::Owner),
            "Region" => Some(Label::Region),
            "AvailabilityZone" => Some(Label::AvailabilityZone),
            "ResourceGroup" => Some(Label::ResourceGroup),
            "Property" => Some(Label::Property),
            "Tag" => Some(Label::Tag),
            other => ElementKind::ALL
                .iter()
                .find(|kind| kind.as_str() == other)
                .map(|kind| Label::Element(*kind)),
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self, Label::Element(_))
    }

    /// Attributes that identify a node of this label within one store.
    /// Property and tag nodes are never looked up and carry no key.
    pub fn unique_key(&self) -> &'static [&'static str] {
        match self {
            Label::Element(_) | Label::Owner => &["uid"],
            Label::ResourceGroup => &["name", "subscription_id"],
            Label::Region | Label::AvailabilityZone => &["name"],
            Label::Property | Label::Tag => &[],
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ElementKind> for Label {
    fn from(kind: ElementKind) -> Self {
        Label::Element(kind)
    }
}

/// What may sit at one end of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Is(Label),
    AnyElement,
    Any,
}

impl Endpoint {
    pub fn accepts(&self, labels: &[Label]) -> bool {
        match self {
            Endpoint::Is(label) => labels.contains(label),
            Endpoint::AnyElement => labels.iter().any(Label::is_element),
            Endpoint::Any => true,
        }
    }
}

/// Typed, directed edges. The string form is the edge type persisted in the
/// store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Relation {
    OwnedResourceGroup,
    OwnedRegion,
    OwnedElement,
    AvailabilityZone,
    ZoneElement,
    ZoneResourceGroup,
    ResourceGroupElement,
    ObjectProperty,
    ObjectTag,
    Disk,
    NetworkInterface,
    DeployedApplication,
    DataSource,
    BackendPool,
    LoadBalancerPublicIp,
    InboundRule,
    OutboundRule,
    SecurityGroup,
    PublicIp,
    PrivateIp,
    InterfaceSubnet,
    Subnet,
    NetworkInterfaceVn,
    ConnectedSubnet,
    ServiceElement,
}

impl Relation {
    pub const ALL: [Relation; 25] = [
        Relation::OwnedResourceGroup,
        Relation::OwnedRegion,
        Relation::OwnedElement,
        Relation::AvailabilityZone,
        Relation::ZoneElement,
        Relation::ZoneResourceGroup,
        Relation::ResourceGroupElement,
        Relation::ObjectProperty,
        Relation::ObjectTag,
        Relation::Disk,
        Relation::NetworkInterface,
        Relation::DeployedApplication,
        Relation::DataSource,
        Relation::BackendPool,
        Relation::LoadBalancerPublicIp,
        Relation::InboundRule,
        Relation::OutboundRule,
        Relation::SecurityGroup,
        Relation::PublicIp,
        Relation::PrivateIp,
        Relation::InterfaceSubnet,
        Relation::Subnet,
        Relation::NetworkInterfaceVn,
        Relation::ConnectedSubnet,
        Relation::ServiceElement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::OwnedResourceGroup => "OWNED_RESOURCE_GROUP",
            Relation::OwnedRegion => "REGION",
            Relation::OwnedElement => "OWNED_ELEMENT",
            Relation::AvailabilityZone => "AVAILABILITY_ZONE",
            Relation::ZoneElement => "ELEMENT",
            Relation::ZoneResourceGroup => "RESOURCE_GROUP",
            Relation::ResourceGroupElement => "ELEMENT_RESOURCE_GROUP",
            Relation::ObjectProperty => "OBJ_PROPERTY",
            Relation::ObjectTag => "OBJ_TAG",
            Relation::Disk => "DISK",
            Relation::NetworkInterface => "NETWORK_INTERFACE",
            Relation::DeployedApplication => "DEPLOYED_APPLICATION",
            Relation::DataSource => "DATA_SOURCE",
            Relation::BackendPool => "VM_BACKEND_POOL",
            Relation::LoadBalancerPublicIp => "LB_PUBLIC_IP",
            Relation::InboundRule => "INBOUND_RULE",
            Relation::OutboundRule => "OUTBOUND_RULE",
            Relation::SecurityGroup => "NETWORK_SECURITY_GROUP",
            Relation::PublicIp => "PUBLIC_IP",
            Relation::PrivateIp => "PRIVATE_IP",
            Relation::InterfaceSubnet => "SUBNET_NI",
            Relation::Subnet => "SUBNET",
            Relation::NetworkInterfaceVn => "NETWORK_INTERFACE_VN",
            Relation::ConnectedSubnet => "CONNECTED_SUBNET",
            Relation::ServiceElement => "SERVICE_ELEMENTS",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Relation::ALL.iter().copied().find(|r| r.as_str() == name)
    }

    /// Source and target constraints of the edge type.
    pub fn endpoints(&self) -> (Endpoint, Endpoint) {
        use ElementKind as K;
        let el = |kind: ElementKind| Endpoint::Is(Label::Element(kind));
        match self {
            Relation::OwnedResourceGroup => (Endpoint::Is(Label::Owner), Endpoint::Is(Label::ResourceGroup)),
            Relation::OwnedRegion => (Endpoint::Is(Label::Owner), Endpoint::Is(Label::Region)),
            Relation::OwnedElement => (Endpoint::Is(Label::Owner), Endpoint::AnyElement),
            Relation::AvailabilityZone => (
                Endpoint::Is(Label::Region),
                Endpoint::Is(Label::AvailabilityZone),
            ),
            Relation::ZoneElement => (Endpoint::Is(Label::AvailabilityZone), Endpoint::AnyElement),
            Relation::ZoneResourceGroup => (
                Endpoint::Is(Label::AvailabilityZone),
                Endpoint::Is(Label::ResourceGroup),
            ),
            Relation::ResourceGroupElement => (Endpoint::Is(Label::ResourceGroup), Endpoint::AnyElement),
            Relation::ObjectProperty => (Endpoint::Any, Endpoint::Is(Label::Property)),
            Relation::ObjectTag => (Endpoint::Any, Endpoint::Is(Label::Tag)),
            Relation::Disk => (el(K::VirtualMachine), el(K::Disk)),
            Relation::NetworkInterface => (el(K::VirtualMachine), el(K::NetworkInterface)),
            Relation::DeployedApplication => (el(K::VirtualMachine), el(K::DeployedApplication)),
            Relation::DataSource => (el(K::Database), el(K::Database)),
            Relation::BackendPool => (el(K::LoadBalancer), el(K::NetworkInterface)),
            Relation::LoadBalancerPublicIp => (el(K::LoadBalancer), el(K::PublicIp)),
            Relation::InboundRule => (Endpoint::AnyElement, el(K::InboundRule)),
            Relation::OutboundRule => (Endpoint::AnyElement, el(K::OutboundRule)),
            Relation::SecurityGroup => (el(K::NetworkSecurityGroup), el(K::NetworkInterface)),
            Relation::PublicIp => (el(K::NetworkInterface), el(K::PublicIp)),
            Relation::PrivateIp => (el(K::NetworkInterface), el(K::PrivateIp)),
            Relation::InterfaceSubnet => (el(K::NetworkInterface), el(K::Subnet)),
            Relation::Subnet => (el(K::VirtualNetwork), el(K::Subnet)),
            Relation::NetworkInterfaceVn => (el(K::VirtualNetwork), el(K::NetworkInterface)),
            Relation::ConnectedSubnet => (el(K::GatewaySubnet), el(K::Connection)),
            Relation::ServiceElement => (el(K::Service), Endpoint::AnyElement),
        }
    }

    pub fn accepts(&self, from: &[Label], to: &[Label]) -> bool {
        let (source, target) = self.endpoints();
        source.accepts(from) && target.accepts(to)
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Categories of raw records delivered by the resource collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    ResourceGroups,
    PublicIps,
    AppServicePlans,
    AppServices,
    StorageAccounts,
    LoadBalancers,
    VirtualNetworks,
    NetworkInterfaces,
    NetworkSecurityGroups,
    VirtualMachines,
    Databases,
    DeployedApplications,
    Disks,
}

/// Keys every record carries that never become scalar properties.
const COMMON_UNWANTED: &[&str] = &["id", "resourceGroup", "tags", "properties", "zones"];

impl ResourceKind {
    /// Kinds in the order an import run processes them. A kind only looks up
    /// kinds before it, except for the optimistic back-edges.
    pub const IMPORT_ORDER: [ResourceKind; 13] = [
        ResourceKind::ResourceGroups,
        ResourceKind::PublicIps,
        ResourceKind::AppServicePlans,
        ResourceKind::AppServices,
        ResourceKind::StorageAccounts,
        ResourceKind::LoadBalancers,
        ResourceKind::VirtualNetworks,
        ResourceKind::NetworkInterfaces,
        ResourceKind::NetworkSecurityGroups,
        ResourceKind::VirtualMachines,
        ResourceKind::Databases,
        ResourceKind::DeployedApplications,
        ResourceKind::Disks,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ResourceKind::ResourceGroups => "resource_groups",
            ResourceKind::PublicIps => "public_ips",
            ResourceKind::AppServicePlans => "app_service_plans",
            ResourceKind::AppServices => "app_services",
            ResourceKind::StorageAccounts => "storage_accounts",
            ResourceKind::LoadBalancers => "load_balancers",
            ResourceKind::VirtualNetworks => "virtual_networks",
            ResourceKind::NetworkInterfaces => "network_interfaces",
            ResourceKind::NetworkSecurityGroups => "network_security_groups",
            ResourceKind::VirtualMachines => "virtual_machines",
            ResourceKind::Databases => "databases",
            ResourceKind::DeployedApplications => "deployed_applications",
            ResourceKind::Disks => "disks",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::IMPORT_ORDER.iter().copied().find(|k| k.name() == name)
    }

    /// Element kind of the nodes created for this record kind. Resource
    /// groups are containers, not elements.
    pub fn element_kind(&self) -> Option<ElementKind> {
        match self {
            ResourceKind::ResourceGroups => None,
            ResourceKind::PublicIps => Some(ElementKind::PublicIp),
            ResourceKind::AppServicePlans | ResourceKind::AppServices => Some(ElementKind::Service),
            ResourceKind::StorageAccounts => Some(ElementKind::Storage),
            ResourceKind::LoadBalancers => Some(ElementKind::LoadBalancer),
            ResourceKind::VirtualNetworks => Some(ElementKind::VirtualNetwork),
            ResourceKind::NetworkInterfaces => Some(ElementKind::NetworkInterface),
            ResourceKind::NetworkSecurityGroups => Some(ElementKind::NetworkSecurityGroup),
            ResourceKind::VirtualMachines => Some(ElementKind::VirtualMachine),
            ResourceKind::Databases => Some(ElementKind::Database),
            ResourceKind::DeployedApplications => Some(ElementKind::DeployedApplication),
            ResourceKind::Disks => Some(ElementKind::Disk),
        }
    }

    /// `service_name` attribute stored on `Service` nodes.
    pub fn service_name(&self) -> Option<&'static str> {
        match self {
            ResourceKind::AppServicePlans => Some("app_service_plan"),
            ResourceKind::AppServices => Some("app_service"),
            _ => None,
        }
    }

    /// Azure Resource Graph query returning the records of this kind.
    pub fn query(&self) -> &'static str {
        match self {
            ResourceKind::ResourceGroups => {
                r#"resourcecontainers | where type == "microsoft.resources/subscriptions/resourcegroups""#
            }
            ResourceKind::PublicIps => r#"resources | where type == "microsoft.network/publicipaddresses""#,
            ResourceKind::AppServicePlans => r#"resources | where type == "microsoft.web/serverfarms""#,
            ResourceKind::AppServices => r#"resources | where type == "microsoft.web/sites""#,
            ResourceKind::StorageAccounts => r#"resources | where type == "microsoft.storage/storageaccounts""#,
            ResourceKind::LoadBalancers => r#"resources | where type == "microsoft.network/loadbalancers""#,
            ResourceKind::VirtualNetworks => r#"resources | where type == "microsoft.network/virtualnetworks""#,
            ResourceKind::NetworkInterfaces => {
                r#"resources | where type == "microsoft.network/networkinterfaces""#
            }
            ResourceKind::NetworkSecurityGroups => {
                r#"resources | where type == "microsoft.network/networksecuritygroups""#
            }
            ResourceKind::VirtualMachines => r#"resources | where type == "microsoft.compute/virtualmachines""#,
            ResourceKind::Databases => r#"resources | where type == "microsoft.sql/servers/databases""#,
            ResourceKind::DeployedApplications => {
                r#"resources | where type == "microsoft.compute/virtualmachines/extensions""#
            }
            ResourceKind::Disks => r#"resources | where type == "microsoft.compute/disks""#,
        }
    }

    /// Top-level keys excluded from the expanded property nodes: identity,
    /// containment and the link fields the relationship rules consume.
    pub fn unwanted_keys(&self) -> Vec<&'static str> {
        let specific: &[&str] = match self {
            ResourceKind::Disks => &["managedBy"],
            ResourceKind::Databases => &["managedBy"],
            _ => &[],
        };
        COMMON_UNWANTED.iter().chain(specific).copied().collect()
    }

    /// Kinds whose ids are referenced with inconsistent casing elsewhere
    /// (app services point at their plan through `serverFarmId`).
    pub fn lowercase_ids(&self) -> bool {
        matches!(self, ResourceKind::AppServicePlans)
    }

    /// Kinds whose relationship rules cannot run without a `properties`
    /// object.
    pub fn requires_properties(&self) -> bool {
        matches!(
            self,
            ResourceKind::LoadBalancers
                | ResourceKind::VirtualNetworks
                | ResourceKind::NetworkInterfaces
                | ResourceKind::NetworkSecurityGroups
                | ResourceKind::VirtualMachines
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Keys excluded from the expanded properties of nested child entities
/// (subnets, rules, private addresses).
pub const CHILD_UNWANTED: &[&str] = &["id", "properties", "tags", "etag"];
