//! Error types for the mapping engine and the graph store adapter.

use crate::schema::{Label, Relation};
use crate::store::NodeHandle;
use thiserror::Error;

/// Errors raised by a graph store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A node with the same unique key already exists under this label.
    #[error("Unique constraint violated on {label} ({key})")]
    ConstraintViolation { label: Label, key: String },

    /// An edge referenced a handle the store never issued.
    #[error("Unknown node handle: {0}")]
    UnknownNode(NodeHandle),

    /// The backend rejected or failed an operation.
    #[error("Store backend error: {0}")]
    Backend(String),

    /// The store session is gone; nothing further can succeed.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by the population engine.
#[derive(Error, Debug)]
pub enum MapperError {
    /// A relationship target was not in the store when it was resolved.
    #[error("Missing reference: {relation} from {source_uid} to {target_uid}")]
    MissingReference {
        source_uid: String,
        relation: Relation,
        target_uid: String,
    },

    /// A raw record lacks a field its kind requires.
    #[error("Malformed record {}: {reason}", record_id.as_deref().unwrap_or("<no id>"))]
    MalformedRecord {
        record_id: Option<String>,
        reason: String,
    },

    /// The store rejected an operation while importing one record.
    #[error("Store failure on record {record_id}: {source}")]
    StoreFailure {
        record_id: String,
        #[source]
        source: StoreError,
    },

    /// Clearing the store failed; its contents are undefined.
    #[error("Failed to clear the graph store: {0}")]
    ClearFailure(#[source] StoreError),

    /// The store became unreachable during a run.
    #[error("Graph store unavailable during import: {0}")]
    StoreUnavailable(#[source] StoreError),

    /// The inventory document does not match the input contract.
    #[error("Invalid inventory: {0}")]
    Inventory(String),
}

impl MapperError {
    pub fn malformed(record_id: Option<&str>, reason: impl Into<String>) -> Self {
        MapperError::MalformedRecord {
            record_id: record_id.map(str::to_string),
            reason: reason.into(),
        }
    }

    /// Wraps a store error for the record being imported. An unavailable
    /// store is promoted to a run-level failure.
    pub fn store(record_id: &str, source: StoreError) -> Self {
        if source.is_unavailable() {
            MapperError::StoreUnavailable(source)
        } else {
            MapperError::StoreFailure {
                record_id: record_id.to_string(),
                source,
            }
        }
    }

    /// Whether the whole run must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MapperError::ClearFailure(_) | MapperError::StoreUnavailable(_)
        )
    }
}
