//! Resource collection boundary.
//!
//! A collector answers one resource query with a status code and the
//! records it found. Authentication and pagination belong to whatever sits
//! behind it; this module only assembles the per-kind inventory.

use crate::config::CollectorConfig;
use crate::inventory::Inventory;
use crate::schema::ResourceKind;
use anyhow::{Context, Result};
use serde_json::Value;
use std::process::Command;

/// Status code of a successful query.
pub const SUCCESS_CODE: i32 = 0;

pub trait ResourceCollector {
    fn query(&mut self, query: &str) -> Result<(i32, Vec<Value>)>;
}

/// Runs every kind's query. Kinds whose query fails or returns a non-zero
/// status are left empty and logged; the import then sees them as absent.
pub fn collect_inventory<C: ResourceCollector + ?Sized>(collector: &mut C) -> Inventory {
    let mut inventory = Inventory::new();
    for kind in ResourceKind::IMPORT_ORDER {
        match collector.query(kind.query()) {
            Ok((SUCCESS_CODE, records)) => {
                tracing::info!(%kind, records = records.len(), "Collected resources");
                inventory.insert(kind, records);
            }
            Ok((code, _)) => {
                tracing::warn!(%kind, code, "Resource query returned an error status");
            }
            Err(e) => {
                tracing::warn!(%kind, error = %e, "Resource query failed");
            }
        }
    }
    inventory
}

/// Collector that shells out to a query program (the Azure CLI by default)
/// and reads its JSON output.
pub struct CommandCollector {
    config: CollectorConfig,
}

impl CommandCollector {
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }
}

/// One page of query output.
#[derive(Debug, Default, PartialEq)]
pub struct Page {
    pub records: Vec<Value>,
    /// Set when the provider has more records than it returned.
    pub skip_token: Option<String>,
}

/// Accepts either a bare record list or a `{"data": [...]}` page.
pub fn page_from_output(output: &str) -> Result<Page> {
    let document: Value = serde_json::from_str(output.trim()).context("Query output is not JSON")?;
    match document {
        Value::Array(records) => Ok(Page {
            records,
            skip_token: None,
        }),
        Value::Object(mut page) => {
            let skip_token = ["skip_token", "$skipToken"]
                .iter()
                .find_map(|key| page.get(*key).and_then(Value::as_str).filter(|t| !t.is_empty()))
                .map(str::to_string);
            match page.remove("data") {
                Some(Value::Array(records)) => Ok(Page { records, skip_token }),
                _ => anyhow::bail!("Query output has no `data` list"),
            }
        }
        other => anyhow::bail!("Unexpected query output: {}", other),
    }
}

impl ResourceCollector for CommandCollector {
    fn query(&mut self, query: &str) -> Result<(i32, Vec<Value>)> {
        tracing::info!(program = %self.config.program, query, "Running resource query");
        let output = Command::new(&self.config.program)
            .args(&self.config.args)
            .arg(query)
            .output()
            .with_context(|| format!("Failed to run {}", self.config.program))?;

        let code = output.status.code().unwrap_or(-1);
        if code != SUCCESS_CODE {
            tracing::debug!(stderr = %String::from_utf8_lossy(&output.stderr), "Query stderr");
            return Ok((code, Vec::new()));
        }
        let page = page_from_output(&String::from_utf8_lossy(&output.stdout))?;
        if page.skip_token.is_some() {
            // Only the first page is read; later records are missing from the import.
            tracing::warn!(
                query,
                records = page.records.len(),
                "Query result truncated, the provider has more records than were returned"
            );
        }
        Ok((code, page.records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_shapes() {
        assert_eq!(page_from_output(r#"[{"id": "a"}]"#).unwrap().records.len(), 1);
        let page = page_from_output(r#"{"count": 2, "data": [{"id": "a"}, {"id": "b"}], "skip_token": null}"#).unwrap();
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.skip_token, None);
        assert!(page_from_output(r#"{"count": 0}"#).is_err());
        assert!(page_from_output("not json").is_err());
    }

    #[test]
    fn test_truncated_page_carries_skip_token() {
        let page = page_from_output(r#"{"count": 1000, "data": [{"id": "a"}], "skip_token": "ew0KICAi"}"#).unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.skip_token.as_deref(), Some("ew0KICAi"));

        let page = page_from_output(r#"{"data": [], "$skipToken": "abc"}"#).unwrap();
        assert_eq!(page.skip_token.as_deref(), Some("abc"));
    }
}
