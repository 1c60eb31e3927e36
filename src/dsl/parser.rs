//! DSL parser: converts raw YAML/JSON/TOML text into [`PipelineSchema`].

use std::path::Path;

use super::schema::PipelineSchema;
use crate::error::PipelineError;

/// Supported DSL input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DslFormat {
    /// YAML format (`.yaml` / `.yml`).
    Yaml,
    /// JSON format (`.json`).
    Json,
    /// TOML format (`.toml`).
    Toml,
}

impl DslFormat {
    /// Infer the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }
}

/// Parse DSL content into PipelineSchema
pub fn parse_dsl(content: &str, format: DslFormat) -> Result<PipelineSchema, PipelineError> {
    match format {
        DslFormat::Yaml => serde_saphyr::from_str(content)
            .map_err(|e| PipelineError::DslParseError(e.to_string())),
        DslFormat::Json => serde_json::from_str(content)
            .map_err(|e| PipelineError::DslParseError(e.to_string())),
        DslFormat::Toml => {
            // Go through serde_json::Value so tagged entries deserialize
            // the same way for every format.
            let toml_val: toml::Value = toml::from_str(content)
                .map_err(|e| PipelineError::DslParseError(e.to_string()))?;
            let json_val = toml_value_to_json(toml_val);
            serde_json::from_value(json_val)
                .map_err(|e| PipelineError::DslParseError(e.to_string()))
        }
    }
}

/// Convert a [`toml::Value`] into a [`serde_json::Value`].
///
/// `Datetime` values are stringified.
fn toml_value_to_json(val: toml::Value) -> serde_json::Value {
    match val {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_value_to_json).collect())
        }
        toml::Value::Table(tbl) => {
            let map: serde_json::Map<String, serde_json::Value> = tbl
                .into_iter()
                .map(|(k, v)| (k, toml_value_to_json(v)))
                .collect();
            serde_json::Value::Object(map)
        }
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
    }
}
