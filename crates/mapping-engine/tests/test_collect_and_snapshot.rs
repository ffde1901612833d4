mod common;

use common::*;
use serde_json::Value;
use std::collections::HashMap;
use sysmap_core::collector::{collect_inventory, ResourceCollector, SUCCESS_CODE};
use sysmap_core::persistence::GraphSnapshot;
use sysmap_core::{GraphPopulator, GraphShape, Inventory, MapperConfig, MemoryGraph, ResourceKind};

/// Answers queries from canned results; unknown queries fail.
struct CannedCollector {
    answers: HashMap<&'static str, (i32, Vec<Value>)>,
    asked: Vec<String>,
}

impl ResourceCollector for CannedCollector {
    fn query(&mut self, query: &str) -> anyhow::Result<(i32, Vec<Value>)> {
        self.asked.push(query.to_string());
        self.answers
            .get(query)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no canned answer"))
    }
}

#[test]
fn test_collection_skips_failed_kinds() {
    let source = scenario();
    let mut answers = HashMap::new();
    answers.insert(
        ResourceKind::ResourceGroups.query(),
        (SUCCESS_CODE, source.records(ResourceKind::ResourceGroups).to_vec()),
    );
    answers.insert(
        ResourceKind::NetworkInterfaces.query(),
        (SUCCESS_CODE, source.records(ResourceKind::NetworkInterfaces).to_vec()),
    );
    answers.insert(
        ResourceKind::VirtualMachines.query(),
        (1, source.records(ResourceKind::VirtualMachines).to_vec()),
    );
    let mut collector = CannedCollector {
        answers,
        asked: Vec::new(),
    };

    let inventory = collect_inventory(&mut collector);
    assert_eq!(collector.asked.len(), ResourceKind::IMPORT_ORDER.len());
    assert_eq!(inventory.records(ResourceKind::ResourceGroups).len(), 1);
    assert_eq!(inventory.records(ResourceKind::NetworkInterfaces).len(), 1);
    // A non-zero status drops the kind even when records came back.
    assert!(inventory.records(ResourceKind::VirtualMachines).is_empty());
    assert_eq!(inventory.total_records(), 2);
}

#[test]
fn test_exported_inventory_imports_identically() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("inventory.json");
    network().save(&path)?;
    let reloaded = Inventory::load(&path)?;
    assert_eq!(reloaded, network());

    let config = MapperConfig::default();
    let mut direct = GraphPopulator::new(MemoryGraph::new(), &config);
    direct.import(&network())?;
    let mut from_file = GraphPopulator::new(MemoryGraph::new(), &config);
    from_file.import(&reloaded)?;
    assert_eq!(
        GraphShape::capture(direct.store())?,
        GraphShape::capture(from_file.store())?
    );
    Ok(())
}

#[test]
fn test_snapshot_restores_the_graph() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("graph.bin");
    let config = MapperConfig::default();

    let mut populator = GraphPopulator::new(MemoryGraph::new(), &config);
    populator.import(&network())?;
    let graph = populator.into_store();
    graph.snapshot().save_to_file(&path)?;

    let restored = MemoryGraph::from_snapshot(GraphSnapshot::load_from_file(&path)?)?;
    assert_eq!(restored.num_nodes(), graph.num_nodes());
    assert_eq!(restored.num_edges(), graph.num_edges());
    assert_eq!(GraphShape::capture(&restored)?, GraphShape::capture(&graph)?);
    assert!(restored.find_by_uid("/subscriptions/sub1/resourceGroups/rg1/providers/Microsoft.Compute/virtualMachines/vm1").is_some());
    Ok(())
}

#[test]
fn test_missing_snapshot_is_an_empty_graph() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let snapshot = GraphSnapshot::load_from_file(&dir.path().join("absent.bin"))?;
    let graph = MemoryGraph::from_snapshot(snapshot)?;
    assert_eq!(graph.num_nodes(), 0);
    Ok(())
}
