#![allow(dead_code)]

use serde_json::{json, Value};
use sysmap_core::{Inventory, ResourceKind};

pub const SUB: &str = "sub1";

pub fn resource_group(name: &str, subscription: &str) -> Value {
    json!({
        "id": format!("/subscriptions/{subscription}/resourceGroups/{name}"),
        "resourceGroup": name,
        "subscriptionId": subscription,
        "properties": {},
        "tags": {"env": "prod"}
    })
}

pub fn vm(id: &str, nic: &str) -> Value {
    json!({
        "id": id,
        "name": id,
        "resourceGroup": "rg1",
        "subscriptionId": SUB,
        "properties": {
            "networkProfile": {"networkInterfaces": [{"id": nic, "properties": {"primary": true}}]}
        },
        "tags": {}
    })
}

pub fn vm_from_image(id: &str, publisher: &str) -> Value {
    json!({
        "id": id,
        "name": id,
        "resourceGroup": "rg1",
        "subscriptionId": SUB,
        "properties": {
            "storageProfile": {"imageReference": {"publisher": publisher, "offer": "any"}}
        },
        "tags": {"owner": "data-team"}
    })
}

pub fn nic(id: &str, subnet: &str, address: &str) -> Value {
    json!({
        "id": id,
        "name": id,
        "resourceGroup": "rg1",
        "subscriptionId": SUB,
        "properties": {
            "ipConfigurations": [{
                "properties": {"subnet": {"id": subnet}, "privateIPAddress": address}
            }]
        },
        "tags": {}
    })
}

pub fn disk(id: &str, managed_by: &str) -> Value {
    json!({
        "id": id,
        "name": id,
        "resourceGroup": "rg1",
        "subscriptionId": SUB,
        "managedBy": managed_by,
        "sku": {"name": "Premium_LRS"},
        "properties": {"diskSizeGB": 128},
        "tags": {}
    })
}

/// Resource group, VM and NIC of the reference scenario.
pub fn scenario() -> Inventory {
    Inventory::new()
        .with(ResourceKind::ResourceGroups, vec![resource_group("rg1", SUB)])
        .with(ResourceKind::VirtualMachines, vec![vm("vm1", "ni1")])
        .with(ResourceKind::NetworkInterfaces, vec![nic("ni1", "sn1", "10.0.0.4")])
}

/// A small but complete network: virtual network with subnets, NIC behind a
/// load balancer and a security group, VM with disk and extension, SQL VM.
pub fn network() -> Inventory {
    let rg = "/subscriptions/sub1/resourceGroups/rg1/providers";
    let vnet = format!("{rg}/Microsoft.Network/virtualNetworks/vnet1");
    let subnet = format!("{vnet}/subnets/default");
    let lb = format!("{rg}/Microsoft.Network/loadBalancers/lb1");
    let nic_id = format!("{rg}/Microsoft.Network/networkInterfaces/nic1");
    let vm_id = format!("{rg}/Microsoft.Compute/virtualMachines/vm1");

    let common = |id: &str, name: &str, properties: Value| {
        json!({
            "id": id,
            "name": name,
            "resourceGroup": "rg1",
            "subscriptionId": SUB,
            "location": "westeurope",
            "properties": properties,
            "tags": {}
        })
    };

    let mut vm_record = common(
        &vm_id,
        "vm1",
        json!({
            "networkProfile": {"networkInterfaces": [{"id": nic_id}]},
            "storageProfile": {"imageReference": {"publisher": "Canonical"}}
        }),
    );
    vm_record["zones"] = json!(["1"]);

    let mut disk_record = common(&format!("{rg}/Microsoft.Compute/disks/osdisk"), "osdisk", json!({}));
    disk_record["managedBy"] = json!(vm_id);

    let mut location_group = resource_group("rg1", SUB);
    location_group["location"] = json!("westeurope");

    Inventory::new()
        .with(ResourceKind::ResourceGroups, vec![location_group])
        .with(
            ResourceKind::PublicIps,
            vec![common(&format!("{rg}/Microsoft.Network/publicIPAddresses/pip1"), "pip1", json!({}))],
        )
        .with(
            ResourceKind::VirtualNetworks,
            vec![common(
                &vnet,
                "vnet1",
                json!({"subnets": [
                    {"id": subnet, "name": "default", "properties": {"addressPrefix": "10.0.0.0/24"}},
                    {"id": format!("{vnet}/subnets/GatewaySubnet"), "name": "GatewaySubnet"}
                ]}),
            )],
        )
        .with(
            ResourceKind::LoadBalancers,
            vec![common(
                &lb,
                "lb1",
                json!({
                    "frontendIPConfigurations": [{"properties": {"publicIPAddress": {"id": format!("{rg}/Microsoft.Network/publicIPAddresses/pip1")}}}],
                    "backendAddressPools": [{"id": format!("{lb}/backendAddressPools/pool1")}]
                }),
            )],
        )
        .with(
            ResourceKind::NetworkInterfaces,
            vec![common(
                &nic_id,
                "nic1",
                json!({"ipConfigurations": [{
                    "name": "ipconfig1",
                    "properties": {
                        "subnet": {"id": subnet},
                        "privateIPAddress": "10.0.0.5",
                        "privateIPAllocationMethod": "Dynamic",
                        "loadBalancerBackendAddressPools": [{"id": format!("{lb}/backendAddressPools/pool1")}]
                    }
                }]}),
            )],
        )
        .with(
            ResourceKind::NetworkSecurityGroups,
            vec![common(
                &format!("{rg}/Microsoft.Network/networkSecurityGroups/nsg1"),
                "nsg1",
                json!({
                    "networkInterfaces": [{"id": nic_id}],
                    "securityRules": [
                        {"id": format!("{rg}/Microsoft.Network/networkSecurityGroups/nsg1/securityRules/ssh"), "name": "ssh",
                         "properties": {"direction": "Inbound", "destinationPortRange": "22"}}
                    ]
                }),
            )],
        )
        .with(ResourceKind::VirtualMachines, vec![vm_record])
        .with(ResourceKind::Disks, vec![disk_record])
}
