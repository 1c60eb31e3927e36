use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;

use super::error::CatalogError;
use super::fingerprint::diff_snapshot;
use super::store::TrainingCacheStore;
use super::types::{CatalogSnapshot, TableSchema, TrainingCacheState, TrainingItem};

/// Live schema catalog.
#[async_trait]
pub trait CatalogService: Send + Sync {
    async fn list_tables(&self, database: &str) -> Result<Vec<TableSchema>, CatalogError>;
}

/// External vector store that learns DDL, documentation and example queries.
#[async_trait]
pub trait TrainingSink: Send + Sync {
    async fn train(&self, item: &TrainingItem) -> Result<(), CatalogError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrainingFailure {
    pub item: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    /// Tables trained in this call.
    pub trained_delta: Vec<String>,
    /// Tables whose fingerprint was unchanged.
    pub skipped: Vec<String>,
    /// Tables no longer in the catalog, dropped from the trained set.
    pub removed: Vec<String>,
    pub failed: Vec<TrainingFailure>,
    pub cache_hit: bool,
    pub full_rebuild: bool,
}

/// Keeps the vector store in step with the catalog, training only drift.
pub struct SchemaReconciler {
    catalog: Arc<dyn CatalogService>,
    sink: Arc<dyn TrainingSink>,
    store: Arc<TrainingCacheStore>,
    database: String,
    supplemental: Vec<TrainingItem>,
}

impl SchemaReconciler {
    pub fn new(
        catalog: Arc<dyn CatalogService>,
        sink: Arc<dyn TrainingSink>,
        store: Arc<TrainingCacheStore>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            sink,
            store,
            database: database.into(),
            supplemental: Vec::new(),
        }
    }

    /// Documentation and example queries, trained on full rebuilds only.
    pub fn with_supplemental(mut self, items: Vec<TrainingItem>) -> Self {
        self.supplemental = items;
        self
    }

    pub fn store(&self) -> &TrainingCacheStore {
        &self.store
    }

    pub async fn reconcile(&self, force_refresh: bool) -> Result<ReconcileOutcome, CatalogError> {
        let writer = self.store.lock().await;

        let tables = self
            .catalog
            .list_tables(&self.database)
            .await
            .map_err(|e| match e {
                CatalogError::SchemaFetch(msg) => CatalogError::SchemaFetch(msg),
                other => CatalogError::SchemaFetch(other.to_string()),
            })?;
        let snapshot = CatalogSnapshot::from_tables(&tables);

        let prior = match writer.load().await {
            Ok(state) => state,
            Err(CatalogError::CacheCorruption(msg)) => {
                tracing::warn!(
                    database = %self.database,
                    error = %msg,
                    "Training cache corrupted, rebuilding from scratch"
                );
                None
            }
            Err(e) => return Err(e),
        };

        let full_rebuild = force_refresh || prior.is_none();
        let mut trained = prior.map(|s| s.trained).unwrap_or_default();
        let diff = diff_snapshot(&trained, &snapshot);

        let delta: Vec<&TableSchema> = if full_rebuild {
            tables.iter().collect()
        } else {
            let names = diff.delta();
            tables.iter().filter(|t| names.contains(&t.name)).collect()
        };
        let mut outcome = ReconcileOutcome {
            skipped: if full_rebuild { Vec::new() } else { diff.unchanged.clone() },
            removed: diff.removed.clone(),
            full_rebuild,
            ..Default::default()
        };

        if !full_rebuild && delta.is_empty() && diff.removed.is_empty() {
            tracing::info!(
                database = %self.database,
                tables = snapshot.len(),
                "Training cache hit"
            );
            outcome.cache_hit = true;
            return Ok(outcome);
        }

        for table in &diff.removed {
            trained.remove(table);
        }
        if full_rebuild {
            trained.clear();
        }

        for table in delta {
            let item = TrainingItem::Ddl {
                table: table.name.clone(),
                ddl: table.to_ddl(&self.database),
            };
            match self.sink.train(&item).await {
                Ok(()) => {
                    trained.insert(table.name.clone(), table.fingerprint());
                    outcome.trained_delta.push(table.name.clone());
                }
                Err(e) => {
                    tracing::warn!(table = %table.name, error = %e, "Table training failed");
                    trained.remove(&table.name);
                    outcome.failed.push(TrainingFailure {
                        item: table.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if full_rebuild {
            for item in &self.supplemental {
                if let Err(e) = self.sink.train(item).await {
                    tracing::warn!(item = %item.label(), error = %e, "Supplemental training failed");
                    outcome.failed.push(TrainingFailure {
                        item: item.label(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let state = TrainingCacheState {
            database: self.database.clone(),
            last_snapshot: snapshot,
            trained,
            updated_at: Utc::now(),
        };
        writer.save(&state).await?;

        tracing::info!(
            database = %self.database,
            trained = outcome.trained_delta.len(),
            skipped = outcome.skipped.len(),
            removed = outcome.removed.len(),
            failed = outcome.failed.len(),
            full_rebuild,
            "Training cache reconciled"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::memory::{MemoryCatalogService, RecordingTrainingSink};

    fn reconciler(
        dir: &std::path::Path,
    ) -> (SchemaReconciler, Arc<MemoryCatalogService>, Arc<RecordingTrainingSink>) {
        let catalog = Arc::new(MemoryCatalogService::new());
        let sink = Arc::new(RecordingTrainingSink::new());
        let store = Arc::new(TrainingCacheStore::new(dir));
        let reconciler = SchemaReconciler::new(catalog.clone(), sink.clone(), store, "nyc_taxi");
        (reconciler, catalog, sink)
    }

    #[tokio::test]
    async fn test_first_run_is_full_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let (reconciler, catalog, sink) = reconciler(dir.path());
        catalog.set_tables(vec![
            TableSchema::new("a", &[("id", "int")]),
            TableSchema::new("b", &[("id", "int")]),
        ]);

        let outcome = reconciler.reconcile(false).await.unwrap();
        assert!(outcome.full_rebuild);
        assert!(!outcome.cache_hit);
        assert_eq!(outcome.trained_delta, vec!["a", "b"]);
        assert_eq!(sink.trained_tables(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_supplemental_only_on_full_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let (reconciler, catalog, sink) = reconciler(dir.path());
        let reconciler = reconciler.with_supplemental(vec![TrainingItem::Documentation {
            text: "Fares are in USD".into(),
        }]);
        catalog.set_tables(vec![TableSchema::new("a", &[("id", "int")])]);

        reconciler.reconcile(false).await.unwrap();
        assert_eq!(sink.len(), 2);

        catalog.add_table(TableSchema::new("b", &[("id", "int")]));
        reconciler.reconcile(false).await.unwrap();
        assert_eq!(sink.len(), 3);

        reconciler.reconcile(true).await.unwrap();
        assert_eq!(sink.len(), 6);
    }

    #[tokio::test]
    async fn test_training_failure_left_out_of_trained_set() {
        let dir = tempfile::tempdir().unwrap();
        let (reconciler, catalog, sink) = reconciler(dir.path());
        catalog.set_tables(vec![
            TableSchema::new("a", &[("id", "int")]),
            TableSchema::new("b", &[("id", "int")]),
        ]);
        sink.fail_table("b");

        let outcome = reconciler.reconcile(false).await.unwrap();
        assert_eq!(outcome.trained_delta, vec!["a"]);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].item, "b");

        let state = reconciler.store().load().await.unwrap().unwrap();
        assert_eq!(state.trained_tables().into_iter().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(state.last_snapshot.len(), 2);

        sink.clear_failures();
        let outcome = reconciler.reconcile(false).await.unwrap();
        assert_eq!(outcome.trained_delta, vec!["b"]);
        assert_eq!(outcome.skipped, vec!["a"]);
    }
}
