use thiserror::Error;

use crate::error::ErrorCode;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Schema fetch error: {0}")]
    SchemaFetch(String),
    #[error("Training cache corrupted: {0}")]
    CacheCorruption(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Training failed for {item}: {message}")]
    Training { item: String, message: String },
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Training cache is being written by another reconciler")]
    CacheBusy,
}

impl CatalogError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            CatalogError::SchemaFetch(_) => ErrorCode::SchemaFetch,
            CatalogError::CacheCorruption(_) => ErrorCode::CacheCorruption,
            _ => ErrorCode::InternalError,
        }
    }
}

impl From<std::io::Error> for CatalogError {
    fn from(e: std::io::Error) -> Self {
        CatalogError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(e: serde_json::Error) -> Self {
        CatalogError::Serialization(e.to_string())
    }
}
