//! Record normalizer.
//!
//! Turns one provider record into the flat attribute bag every entity node
//! carries: uid, display name, the nested `properties` blob, tags, and the
//! remaining top-level scalars that become expanded property nodes.

use crate::error::MapperError;
use crate::schema::{ResourceKind, CHILD_UNWANTED};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Fields every record must expose, checked before anything is written.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordHeader {
    id: String,
    #[serde(default)]
    name: Option<String>,
    resource_group: String,
    subscription_id: String,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    zones: Option<Value>,
    #[serde(default)]
    tags: Option<Value>,
    #[serde(default)]
    properties: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub uid: String,
    pub name: String,
    pub resource_group: String,
    pub subscription_id: String,
    pub location: Option<String>,
    pub zones: Vec<String>,
    /// The record's nested `properties` object, if it had one.
    pub properties: Option<Value>,
    pub tags: BTreeMap<String, String>,
    /// Top-level scalars left after removing the kind's unwanted keys.
    pub attributes: BTreeMap<String, String>,
}

impl NormalizedRecord {
    /// Looks up a JSON pointer (`/networkProfile/networkInterfaces`) inside
    /// the `properties` object.
    pub fn property(&self, pointer: &str) -> Option<&Value> {
        self.properties.as_ref().and_then(|props| props.pointer(pointer))
    }

    pub fn properties_blob(&self) -> String {
        self.properties
            .as_ref()
            .map(Value::to_string)
            .unwrap_or_else(|| "{}".to_string())
    }

    pub fn tags_blob(&self) -> String {
        let map: Map<String, Value> = self
            .tags
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        Value::Object(map).to_string()
    }
}

/// Text stored for a scalar attribute: strings verbatim, everything else as
/// compact JSON.
pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn flatten(record: &Map<String, Value>, unwanted: &[&str]) -> BTreeMap<String, String> {
    record
        .iter()
        .filter(|(key, value)| !unwanted.contains(&key.as_str()) && !is_blank(value))
        .map(|(key, value)| (key.clone(), scalar_text(value)))
        .collect()
}

/// Reads a provider `tags` field. Null and empty strings stand for "no tags".
fn read_tags(record_id: &str, tags: Option<&Value>) -> Result<BTreeMap<String, String>, MapperError> {
    match tags {
        None | Some(Value::Null) => Ok(BTreeMap::new()),
        Some(Value::String(s)) if s.is_empty() => Ok(BTreeMap::new()),
        Some(Value::Object(map)) => Ok(map
            .iter()
            .map(|(k, v)| (k.clone(), scalar_text(v)))
            .collect()),
        Some(other) => Err(MapperError::malformed(
            Some(record_id),
            format!("`tags` must be a mapping, got {}", other),
        )),
    }
}

fn read_properties(record_id: &str, properties: Option<Value>) -> Result<Option<Value>, MapperError> {
    match properties {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(props @ Value::Object(_)) => Ok(Some(props)),
        Some(other) => Err(MapperError::malformed(
            Some(record_id),
            format!("`properties` must be an object, got {}", other),
        )),
    }
}

fn read_zones(record_id: &str, zones: Option<Value>) -> Result<Vec<String>, MapperError> {
    match zones {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) if s.is_empty() => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|zone| match zone {
                Value::String(s) => Ok(s.clone()),
                Value::Number(n) => Ok(n.to_string()),
                other => Err(MapperError::malformed(
                    Some(record_id),
                    format!("zone entries must be strings, got {}", other),
                )),
            })
            .collect(),
        Some(other) => Err(MapperError::malformed(
            Some(record_id),
            format!("`zones` must be a list, got {}", other),
        )),
    }
}

/// Uid under which an entity of `kind` is stored and looked up.
pub fn normalize_uid(kind: ResourceKind, id: &str) -> String {
    if kind.lowercase_ids() {
        id.to_lowercase()
    } else {
        id.to_string()
    }
}

/// Last path segment of a provider resource id.
pub fn id_segment(id: &str) -> &str {
    id.rsplit('/').find(|s| !s.is_empty()).unwrap_or(id)
}

/// Normalizes one raw record of `kind`.
pub fn normalize(kind: ResourceKind, raw: &Value) -> Result<NormalizedRecord, MapperError> {
    let record_id = raw.get("id").and_then(Value::as_str);
    let Value::Object(object) = raw else {
        return Err(MapperError::malformed(record_id, "record is not an object"));
    };

    let header = RecordHeader::deserialize(raw)
        .map_err(|e| MapperError::malformed(record_id, e.to_string()))?;
    if header.id.is_empty() {
        return Err(MapperError::malformed(None, "empty `id`"));
    }
    if header.resource_group.is_empty() {
        return Err(MapperError::malformed(Some(&header.id), "empty `resourceGroup`"));
    }

    let name = match kind {
        ResourceKind::ResourceGroups => header.resource_group.clone(),
        _ => match header.name {
            Some(name) if !name.is_empty() => name,
            _ => return Err(MapperError::malformed(Some(&header.id), "missing `name`")),
        },
    };

    let properties = read_properties(&header.id, header.properties)?;
    if properties.is_none() && kind.requires_properties() {
        return Err(MapperError::malformed(
            Some(&header.id),
            format!("{} records need a `properties` object", kind),
        ));
    }

    let unwanted = kind.unwanted_keys();
    Ok(NormalizedRecord {
        uid: normalize_uid(kind, &header.id),
        tags: read_tags(&header.id, header.tags.as_ref())?,
        zones: read_zones(&header.id, header.zones)?,
        name,
        resource_group: header.resource_group,
        subscription_id: header.subscription_id,
        location: header.location.filter(|l| !l.is_empty()),
        properties,
        attributes: flatten(object, &unwanted),
    })
}

/// Normalizes an entity nested inside a parent record (a subnet, a rule).
/// The child inherits the parent's resource group, subscription and
/// location. Returns `Ok(None)` when the nested object has no id; a child
/// whose `properties` or `tags` have the wrong shape is malformed.
pub fn normalize_child(parent: &NormalizedRecord, raw: &Value) -> Result<Option<NormalizedRecord>, MapperError> {
    let Some(object) = raw.as_object() else {
        return Err(MapperError::malformed(
            None,
            format!("nested entity of {} is not an object", parent.uid),
        ));
    };
    let Some(uid) = object.get("id").and_then(Value::as_str).filter(|id| !id.is_empty()) else {
        return Ok(None);
    };
    let name = object
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| id_segment(uid));

    Ok(Some(NormalizedRecord {
        uid: uid.to_string(),
        name: name.to_string(),
        resource_group: parent.resource_group.clone(),
        subscription_id: parent.subscription_id.clone(),
        location: parent.location.clone(),
        zones: Vec::new(),
        properties: read_properties(uid, object.get("properties").cloned())?,
        tags: read_tags(uid, object.get("tags"))?,
        attributes: flatten(object, CHILD_UNWANTED),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vm_record() -> Value {
        json!({
            "id": "/subscriptions/s1/resourceGroups/rg1/providers/Microsoft.Compute/virtualMachines/vm1",
            "name": "vm1",
            "type": "microsoft.compute/virtualmachines",
            "resourceGroup": "rg1",
            "subscriptionId": "s1",
            "location": "eastus",
            "zones": ["1"],
            "tags": {"env": "prod", "cost": 12},
            "properties": {"hardwareProfile": {"vmSize": "Standard_B2s"}},
            "sku": null,
            "plan": ""
        })
    }

    #[test]
    fn test_vm_attributes_exclude_identity_and_links() {
        let record = normalize(ResourceKind::VirtualMachines, &vm_record()).unwrap();
        assert_eq!(record.name, "vm1");
        assert_eq!(record.zones, vec!["1".to_string()]);
        for excluded in ["id", "resourceGroup", "tags", "properties", "zones"] {
            assert!(!record.attributes.contains_key(excluded), "{excluded} leaked");
        }
        assert_eq!(record.attributes.get("location").map(String::as_str), Some("eastus"));
        assert_eq!(record.attributes.get("subscriptionId").map(String::as_str), Some("s1"));
        assert!(!record.attributes.contains_key("sku"));
        assert!(!record.attributes.contains_key("plan"));
        assert_eq!(record.tags.get("cost").map(String::as_str), Some("12"));
    }

    #[test]
    fn test_null_tags_become_empty() {
        let mut raw = vm_record();
        raw["tags"] = Value::Null;
        let record = normalize(ResourceKind::VirtualMachines, &raw).unwrap();
        assert!(record.tags.is_empty());
        assert_eq!(record.tags_blob(), "{}");
    }

    #[test]
    fn test_missing_properties_is_malformed_where_required() {
        let mut raw = vm_record();
        raw.as_object_mut().unwrap().remove("properties");
        let err = normalize(ResourceKind::VirtualMachines, &raw).unwrap_err();
        assert!(matches!(err, MapperError::MalformedRecord { record_id: Some(_), .. }));

        // Disks carry nothing the relationship rules need from `properties`.
        assert!(normalize(ResourceKind::Disks, &raw).is_ok());
    }

    #[test]
    fn test_missing_required_field_names_the_record() {
        let raw = json!({"id": "d1", "name": "d1", "subscriptionId": "s1"});
        match normalize(ResourceKind::Disks, &raw).unwrap_err() {
            MapperError::MalformedRecord { record_id, reason } => {
                assert_eq!(record_id.as_deref(), Some("d1"));
                assert!(reason.contains("resourceGroup"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_resource_group_name_comes_from_resource_group_field() {
        let raw = json!({
            "id": "/subscriptions/s1/resourceGroups/rg1",
            "resourceGroup": "rg1",
            "subscriptionId": "s1",
            "properties": {},
            "tags": {"env": "prod"}
        });
        let record = normalize(ResourceKind::ResourceGroups, &raw).unwrap();
        assert_eq!(record.name, "rg1");
        assert_eq!(record.properties, Some(json!({})));
        assert_eq!(record.properties_blob(), "{}");
    }

    #[test]
    fn test_plan_ids_are_lowercased() {
        let raw = json!({
            "id": "/subscriptions/S1/resourceGroups/RG1/providers/Microsoft.Web/serverFarms/Plan",
            "name": "Plan",
            "resourceGroup": "RG1",
            "subscriptionId": "S1"
        });
        let record = normalize(ResourceKind::AppServicePlans, &raw).unwrap();
        assert_eq!(record.uid, "/subscriptions/s1/resourcegroups/rg1/providers/microsoft.web/serverfarms/plan");
        assert_eq!(normalize_uid(ResourceKind::AppServicePlans, "/A/B"), "/a/b");
        assert_eq!(normalize_uid(ResourceKind::AppServices, "/A/B"), "/A/B");
    }

    #[test]
    fn test_child_inherits_parent_container() {
        let parent = normalize(ResourceKind::VirtualMachines, &vm_record()).unwrap();
        let child = normalize_child(
            &parent,
            &json!({"id": "/x/subnets/default", "etag": "W/1", "properties": {"addressPrefix": "10.0.0.0/24"}}),
        )
        .unwrap()
        .unwrap();
        assert_eq!(child.name, "default");
        assert_eq!(child.resource_group, "rg1");
        assert!(child.attributes.is_empty());
        assert!(normalize_child(&parent, &json!({"name": "no-id"})).unwrap().is_none());
    }

    #[test]
    fn test_child_with_bad_shapes_is_malformed() {
        let parent = normalize(ResourceKind::VirtualMachines, &vm_record()).unwrap();

        let err = normalize_child(&parent, &json!({"id": "r1", "tags": "x"})).unwrap_err();
        assert!(matches!(err, MapperError::MalformedRecord { record_id: Some(ref id), .. } if id == "r1"));

        let err = normalize_child(&parent, &json!({"id": "r2", "properties": [1, 2]})).unwrap_err();
        assert!(matches!(err, MapperError::MalformedRecord { record_id: Some(ref id), .. } if id == "r2"));

        assert!(normalize_child(&parent, &json!("r3")).is_err());

        let empty = normalize_child(&parent, &json!({"id": "r4", "tags": null, "properties": ""}))
            .unwrap()
            .unwrap();
        assert!(empty.tags.is_empty());
        assert_eq!(empty.properties, None);
    }
}
