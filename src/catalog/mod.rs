//! Schema reconciliation cache.
//!
//! Compares a fresh catalog listing against the persisted fingerprints and
//! trains the vector store on the tables that drifted.

mod error;
mod fingerprint;
mod memory;
mod reconciler;
mod store;
mod types;

pub use error::CatalogError;
pub use fingerprint::{checksum, diff_snapshot, fingerprint_table, SnapshotDiff};
pub use memory::{MemoryCatalogService, RecordingTrainingSink};
pub use reconciler::{
    CatalogService, ReconcileOutcome, SchemaReconciler, TrainingFailure, TrainingSink,
};
pub use store::{CacheWriter, TrainingCacheStore, EMBEDDINGS_DIR, STATE_FILE};
pub use types::{
    CatalogSnapshot, ColumnSchema, StorageFormat, TableSchema, TrainingCacheState, TrainingItem,
};
