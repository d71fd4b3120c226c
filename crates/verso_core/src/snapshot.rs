//! Backup snapshots.
//!
//! A snapshot is a full point-in-time dump of one database: its name,
//! version, an ISO-8601 timestamp, and every collection's documents.
//! There is no partial-collection granularity.

use crate::error::DbResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// One collection's documents inside a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionDump {
    /// Collection name.
    pub name: String,
    /// Every document in the collection, in primary key order.
    pub docs: Vec<Value>,
}

/// A full dump of one database for backup and restore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Database name.
    pub name: String,
    /// Database version at the time of the dump.
    pub version: u64,
    /// ISO-8601 timestamp of when the dump was taken.
    pub date: String,
    /// Per-collection document dumps.
    pub collections: Vec<CollectionDump>,
}

impl Snapshot {
    /// Total number of documents across all collections.
    #[must_use]
    pub fn doc_count(&self) -> usize {
        self.collections.iter().map(|c| c.docs.len()).sum()
    }

    /// Serializes the snapshot as pretty-printed JSON.
    pub fn to_json(&self) -> DbResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses a snapshot from JSON.
    ///
    /// Missing `name`, `version`, or `collections` fields fail the parse;
    /// no attempt is made to check the dump against any live schema.
    pub fn from_json(json: &str) -> DbResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Writes the snapshot to a file as JSON.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> DbResult<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Reads a snapshot from a JSON file.
    pub fn read_from_file(path: impl AsRef<Path>) -> DbResult<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }
}
