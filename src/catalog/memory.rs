use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::error::CatalogError;
use super::reconciler::{CatalogService, TrainingSink};
use super::types::{TableSchema, TrainingItem};

/// Catalog backed by a settable table list.
#[derive(Default)]
pub struct MemoryCatalogService {
    tables: Mutex<Vec<TableSchema>>,
    unavailable: AtomicBool,
    listings: AtomicUsize,
}

impl MemoryCatalogService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tables(&self, tables: Vec<TableSchema>) {
        *self.tables.lock() = tables;
    }

    /// Add a table, replacing any existing table with the same name.
    pub fn add_table(&self, table: TableSchema) {
        let mut tables = self.tables.lock();
        tables.retain(|t| t.name != table.name);
        tables.push(table);
    }

    pub fn remove_table(&self, name: &str) {
        self.tables.lock().retain(|t| t.name != name);
    }

    /// Make `list_tables` fail until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn listings(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogService for MemoryCatalogService {
    async fn list_tables(&self, database: &str) -> Result<Vec<TableSchema>, CatalogError> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CatalogError::SchemaFetch(format!(
                "catalog unavailable for database '{}'",
                database
            )));
        }
        Ok(self.tables.lock().clone())
    }
}

/// Training sink that records every item it receives.
#[derive(Default)]
pub struct RecordingTrainingSink {
    items: Mutex<Vec<TrainingItem>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingTrainingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject DDL training for `table`.
    pub fn fail_table(&self, table: &str) {
        self.failing.lock().insert(table.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().clear();
    }

    /// Items trained successfully, in call order.
    pub fn items(&self) -> Vec<TrainingItem> {
        self.items.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Tables whose DDL was trained, in call order.
    pub fn trained_tables(&self) -> Vec<String> {
        self.items
            .lock()
            .iter()
            .filter_map(|item| match item {
                TrainingItem::Ddl { table, .. } => Some(table.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn reset(&self) {
        self.items.lock().clear();
    }
}

#[async_trait]
impl TrainingSink for RecordingTrainingSink {
    async fn train(&self, item: &TrainingItem) -> Result<(), CatalogError> {
        if let TrainingItem::Ddl { table, .. } = item {
            if self.failing.lock().contains(table) {
                return Err(CatalogError::Training {
                    item: table.clone(),
                    message: "embedding request rejected".into(),
                });
            }
        }
        self.items.lock().push(item.clone());
        Ok(())
    }
}
