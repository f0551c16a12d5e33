use serde::{Deserialize, Serialize};

use crate::manager::DestinationKey;

/// A document read from the source, tagged with its destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub database: String,
    pub collection: String,
    pub document: serde_json::Value,
}

impl SourceDocument {
    pub fn new(database: &str, collection: &str, document: serde_json::Value) -> Self {
        Self {
            database: database.to_string(),
            collection: collection.to_string(),
            document,
        }
    }
}

/// Why a batch was handed to the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushReason {
    /// The buffer could not admit the next document.
    Capacity,
    /// A single document too large to buffer, written alone.
    Oversized,
    /// Remaining contents drained when the session finished.
    EndOfStream,
}

/// Documents bound for one destination, ready to be written.
#[derive(Debug, Clone)]
pub struct WriteBatch {
    pub key: DestinationKey,
    pub documents: Vec<serde_json::Value>,
    pub reason: FlushReason,
}

/// One line of the batch plan printed by the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub database: String,
    pub collection: String,
    pub documents: usize,
    pub size_bytes: usize,
    pub reason: FlushReason,
}
