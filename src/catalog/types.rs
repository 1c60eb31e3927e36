use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::fingerprint::fingerprint_table;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageFormat {
    #[default]
    Parquet,
    Json,
}

impl StorageFormat {
    /// Infer the format from a serde library class name. Unknown libraries
    /// fall back to Parquet.
    pub fn from_serde_library(library: &str) -> Self {
        let lower = library.to_ascii_lowercase();
        if lower.contains("json") {
            StorageFormat::Json
        } else {
            StorageFormat::Parquet
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            StorageFormat::Parquet => "PARQUET",
            StorageFormat::Json => "JSON",
        }
    }
}

/// One table as listed by the catalog service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
    #[serde(default)]
    pub partition_keys: Vec<ColumnSchema>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub storage_format: StorageFormat,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: &[(&str, &str)]) -> Self {
        Self {
            name: name.into(),
            columns: columns
                .iter()
                .map(|(n, t)| ColumnSchema::new(*n, *t))
                .collect(),
            partition_keys: Vec::new(),
            location: None,
            storage_format: StorageFormat::default(),
        }
    }

    pub fn partitioned_by(mut self, keys: &[(&str, &str)]) -> Self {
        self.partition_keys = keys.iter().map(|(n, t)| ColumnSchema::new(*n, *t)).collect();
        self
    }

    pub fn located_at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn fingerprint(&self) -> String {
        fingerprint_table(self)
    }

    /// `CREATE EXTERNAL TABLE` statement qualified with the quoted database.
    pub fn to_ddl(&self, database: &str) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("    {} {}", c.name, c.data_type))
            .collect();
        let mut ddl = format!(
            "CREATE EXTERNAL TABLE \"{}\".{} (\n{}\n)",
            database.trim_matches('"'),
            self.name,
            columns.join(",\n")
        );
        if !self.partition_keys.is_empty() {
            let keys: Vec<String> = self
                .partition_keys
                .iter()
                .map(|c| format!("{} {}", c.name, c.data_type))
                .collect();
            ddl.push_str(&format!("\nPARTITIONED BY ({})", keys.join(", ")));
        }
        ddl.push_str(&format!("\nSTORED AS {}", self.storage_format.as_sql()));
        if let Some(location) = &self.location {
            ddl.push_str(&format!("\nLOCATION '{}'", location));
        }
        ddl
    }
}

/// Table name to fingerprint, as seen in one catalog listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub tables: BTreeMap<String, String>,
}

impl CatalogSnapshot {
    pub fn from_tables(tables: &[TableSchema]) -> Self {
        Self {
            tables: tables
                .iter()
                .map(|t| (t.name.clone(), t.fingerprint()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Something handed to the vector store for training.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrainingItem {
    Ddl { table: String, ddl: String },
    Documentation { text: String },
    QuestionSql { question: String, sql: String },
}

impl TrainingItem {
    /// Short label used in logs and failure reports.
    pub fn label(&self) -> String {
        match self {
            TrainingItem::Ddl { table, .. } => table.clone(),
            TrainingItem::Documentation { .. } => "documentation".to_string(),
            TrainingItem::QuestionSql { question, .. } => format!("question: {}", question),
        }
    }
}

/// Durable record of what the vector store has been trained on.
///
/// Replaced as a whole on every write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingCacheState {
    pub database: String,
    /// Catalog listing seen by the last reconcile.
    pub last_snapshot: CatalogSnapshot,
    /// Fingerprints of tables that were trained successfully.
    pub trained: BTreeMap<String, String>,
    pub updated_at: DateTime<Utc>,
}

impl TrainingCacheState {
    pub fn trained_tables(&self) -> BTreeSet<String> {
        self.trained.keys().cloned().collect()
    }
}
