mod common;

use common::*;
use sysmap_core::{GraphPopulator, GraphShape, MapperConfig, MemoryGraph, RdfGraph};

#[test]
fn test_rdf_and_memory_build_the_same_graph() -> anyhow::Result<()> {
    let config = MapperConfig::default();
    let inventory = network();

    let mut memory = GraphPopulator::new(MemoryGraph::new(), &config);
    let memory_summary = memory.import(&inventory)?;

    let mut rdf = GraphPopulator::new(RdfGraph::in_memory()?, &config);
    let rdf_summary = rdf.import(&inventory)?;

    assert_eq!(memory_summary.totals(), rdf_summary.totals());
    let expected = GraphShape::capture(memory.store())?;
    let actual = GraphShape::capture(rdf.store())?;
    assert_eq!(expected.nodes.len(), actual.nodes.len());
    assert_eq!(expected, actual);
    Ok(())
}

#[test]
fn test_imported_graph_is_queryable() -> anyhow::Result<()> {
    let config = MapperConfig::default();
    let mut populator = GraphPopulator::new(RdfGraph::in_memory()?, &config);
    populator.import(&scenario())?;

    let json = populator.store().query_sparql(
        "SELECT ?vm ?nic WHERE { \
            ?v <http://sysmap.io/rel/NETWORK_INTERFACE> ?n . \
            ?v <http://sysmap.io/attr/uid> ?vm . \
            ?n <http://sysmap.io/attr/uid> ?nic }",
    )?;
    let rows: Vec<serde_json::Value> = serde_json::from_str(&json)?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["vm"], "vm1");
    assert_eq!(rows[0]["nic"], "ni1");
    Ok(())
}

#[test]
fn test_clear_empties_the_rdf_store() -> anyhow::Result<()> {
    let config = MapperConfig::default();
    let mut populator = GraphPopulator::new(RdfGraph::in_memory()?, &config);
    populator.import(&scenario())?;
    assert!(!GraphShape::capture(populator.store())?.nodes.is_empty());

    populator.clear()?;
    let shape = GraphShape::capture(populator.store())?;
    assert!(shape.nodes.is_empty());
    assert!(shape.edges.is_empty());
    Ok(())
}

#[cfg(feature = "rocksdb")]
#[test]
fn test_on_disk_store_survives_reopen() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = MapperConfig::default();

    let before = {
        let mut populator = GraphPopulator::new(RdfGraph::open(dir.path())?, &config);
        populator.import(&scenario())?;
        GraphShape::capture(populator.store())?
    };

    let mut populator = GraphPopulator::new(RdfGraph::open(dir.path())?, &config);
    assert_eq!(GraphShape::capture(populator.store())?, before);

    // A reopened store can be reset and refilled.
    populator.clear()?;
    populator.import(&scenario())?;
    assert_eq!(GraphShape::capture(populator.store())?, before);
    Ok(())
}
