//! Mapper configuration.
//!
//! Loaded once at startup from a JSON file and passed by reference to the
//! engine and the CLI commands.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Environment variable pointing at the configuration file.
pub const CONFIG_PATH_ENV: &str = "CONFIG_FILE_PATH";
/// Environment variable overriding the on-disk store location.
pub const STORAGE_PATH_ENV: &str = "GRAPH_STORAGE_PATH";

/// Marketplace publishers whose images are database servers.
const DEFAULT_DATABASE_PUBLISHERS: &[&str] = &[
    "MicrosoftSQLServer",
    "Oracle",
    "mongodb",
    "MariaDB",
    "cloudera",
    "couchbase",
    "datastax",
    "redislabs",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Image publishers that turn a virtual machine into a database.
    pub database_publishers: BTreeSet<String>,
    pub store: StoreConfig,
    pub run: RunConfig,
    pub collector: CollectorConfig,
    pub logging: LoggingConfig,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            database_publishers: DEFAULT_DATABASE_PUBLISHERS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            store: StoreConfig::default(),
            run: RunConfig::default(),
            collector: CollectorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Memory,
    Rdf,
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Backend::Memory),
            "rdf" => Ok(Backend::Rdf),
            _ => Err(format!("Invalid store backend: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: Backend,
    /// Directory of the on-disk RDF store.
    pub storage_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Memory,
            storage_path: PathBuf::from("data/graph"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Clear the store before importing.
    pub reset: bool,
    /// Where to write the collected inventory, if anywhere.
    pub export_path: Option<PathBuf>,
    /// Where to save the in-memory graph after the run, if anywhere.
    pub snapshot_path: Option<PathBuf>,
}

/// External program used to run resource queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub program: String,
    /// Arguments placed before the query string.
    pub args: Vec<String>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            program: "az".to_string(),
            args: vec![
                "graph".to_string(),
                "query".to_string(),
                "--first".to_string(),
                "1000".to_string(),
                "--output".to_string(),
                "json".to_string(),
                "-q".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl MapperConfig {
    /// Loads configuration from `path`, else from `CONFIG_FILE_PATH`, else
    /// falls back to defaults. `GRAPH_STORAGE_PATH` overrides the storage
    /// path in every case.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        if let Ok(storage) = std::env::var(STORAGE_PATH_ENV) {
            config.store.storage_path = PathBuf::from(storage);
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Publisher match is case-insensitive; marketplace casing varies.
    pub fn is_database_publisher(&self, publisher: &str) -> bool {
        self.database_publishers
            .iter()
            .any(|p| p.eq_ignore_ascii_case(publisher))
    }
}
