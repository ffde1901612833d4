use crate::schema::{Label, Relation};
use crate::store::Attributes;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Serialized form of an in-memory graph, kept for later querying.
#[derive(Debug, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub taken_at: String,                         // RFC 3339
    pub nodes: Vec<(Vec<Label>, Attributes)>,     // indexed by handle
    pub edges: Vec<(u64, Relation, u64)>,         // (from, relation, to)
}

impl GraphSnapshot {
    pub fn save_to_file(&self, path: &Path) -> std::io::Result<()> {
        let data = bincode::serialize(self).map_err(std::io::Error::other)?;
        fs::write(path, data)?;
        tracing::info!(path = %path.display(), nodes = self.nodes.len(), "Graph snapshot saved");
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> std::io::Result<Self> {
        if !path.exists() {
            return Ok(GraphSnapshot {
                taken_at: String::new(),
                nodes: Vec::new(),
                edges: Vec::new(),
            });
        }

        let data = fs::read(path)?;
        let snapshot: GraphSnapshot = bincode::deserialize(&data).map_err(std::io::Error::other)?;
        tracing::info!(path = %path.display(), taken_at = %snapshot.taken_at, "Graph snapshot loaded");
        Ok(snapshot)
    }
}
