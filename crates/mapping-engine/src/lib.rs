pub mod collector;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod inventory;
pub mod logging;
pub mod normalize;
pub mod persistence;
pub mod schema;
pub mod store;

pub use config::MapperConfig;
pub use engine::{Counters, GraphPopulator, ImportSummary, KindReport};
pub use error::{MapperError, StoreError};
pub use inventory::Inventory;
pub use schema::{ElementKind, Label, Relation, ResourceKind};
pub use store::{GraphShape, GraphStore, MemoryGraph, NodeHandle, RdfGraph};
