use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use super::types::{CatalogSnapshot, TableSchema};

/// SHA-256 over the ordered `name:type` pairs, columns then partition keys.
///
/// Column order matters; a table with reordered columns gets a new
/// fingerprint.
pub fn fingerprint_table(table: &TableSchema) -> String {
    let mut hasher = Sha256::new();
    for column in &table.columns {
        hasher.update(column.name.as_bytes());
        hasher.update(b":");
        hasher.update(column.data_type.to_ascii_lowercase().as_bytes());
        hasher.update(b"\n");
    }
    hasher.update(b"--partitions--\n");
    for key in &table.partition_keys {
        hasher.update(key.name.as_bytes());
        hasher.update(b":");
        hasher.update(key.data_type.to_ascii_lowercase().as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

pub fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Live snapshot compared against the trained fingerprints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    pub added: Vec<String>,
    pub changed: Vec<String>,
    pub unchanged: Vec<String>,
    pub removed: Vec<String>,
}

impl SnapshotDiff {
    /// Tables that need training.
    pub fn delta(&self) -> Vec<String> {
        let mut delta: Vec<String> = self.added.iter().chain(&self.changed).cloned().collect();
        delta.sort();
        delta
    }
}

pub fn diff_snapshot(trained: &BTreeMap<String, String>, live: &CatalogSnapshot) -> SnapshotDiff {
    let mut diff = SnapshotDiff::default();
    for (name, fingerprint) in &live.tables {
        match trained.get(name) {
            None => diff.added.push(name.clone()),
            Some(prev) if prev != fingerprint => diff.changed.push(name.clone()),
            Some(_) => diff.unchanged.push(name.clone()),
        }
    }
    diff.removed = trained
        .keys()
        .filter(|name| !live.tables.contains_key(*name))
        .cloned()
        .collect();
    diff
}
