//! The input of an import run: one ordered record list per resource kind.

use crate::error::MapperError;
use crate::schema::ResourceKind;
use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inventory {
    kinds: BTreeMap<ResourceKind, Vec<Value>>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: ResourceKind, records: Vec<Value>) {
        self.kinds.insert(kind, records);
    }

    pub fn with(mut self, kind: ResourceKind, records: Vec<Value>) -> Self {
        self.insert(kind, records);
        self
    }

    /// Records of `kind`, empty when the kind was never collected.
    pub fn records(&self, kind: ResourceKind) -> &[Value] {
        self.kinds.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn total_records(&self) -> usize {
        self.kinds.values().map(Vec::len).sum()
    }

    /// Parses `{"<kind name>": [record, ...], ...}`. Unknown kind names are
    /// logged and ignored; a known kind whose value is not a list is an error.
    pub fn from_json(document: Value) -> Result<Self, MapperError> {
        let Value::Object(map) = document else {
            return Err(MapperError::Inventory(
                "expected a mapping from kind name to records".to_string(),
            ));
        };

        let mut inventory = Self::new();
        for (name, records) in map {
            let Some(kind) = ResourceKind::from_name(&name) else {
                tracing::warn!(kind = %name, "Ignoring unknown resource kind in inventory");
                continue;
            };
            match records {
                Value::Array(records) => inventory.insert(kind, records),
                Value::Null => inventory.insert(kind, Vec::new()),
                other => {
                    return Err(MapperError::Inventory(format!(
                        "records of {} must be a list, got {}",
                        kind, other
                    )))
                }
            }
        }
        Ok(inventory)
    }

    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .kinds
            .iter()
            .map(|(kind, records)| (kind.name().to_string(), Value::Array(records.clone())))
            .collect();
        Value::Object(map)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read inventory: {}", path.display()))?;
        let document: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse inventory: {}", path.display()))?;
        Ok(Self::from_json(document)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.to_json())?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write inventory: {}", path.display()))?;
        tracing::info!(path = %path.display(), records = self.total_records(), "Inventory exported");
        Ok(())
    }
}
