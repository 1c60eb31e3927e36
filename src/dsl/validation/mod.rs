mod layer1_structure;
mod layer2_topology;
mod types;

use crate::dsl::parser::{parse_dsl, DslFormat};
use crate::dsl::schema::PipelineSchema;

pub use types::{Diagnostic, DiagnosticLevel, ValidationReport};

pub fn validate_dsl(content: &str, format: DslFormat) -> ValidationReport {
    match parse_dsl(content, format) {
        Ok(schema) => validate_schema(&schema),
        Err(err) => ValidationReport::from_diagnostics(vec![Diagnostic::error(
            "E001",
            format!("DSL parse error: {}", err),
        )]),
    }
}

pub fn validate_schema(schema: &PipelineSchema) -> ValidationReport {
    let mut diagnostics = layer1_structure::validate(schema);

    let has_fatal_structure = diagnostics
        .iter()
        .any(|d| d.level == DiagnosticLevel::Error && matches!(d.code.as_str(), "E003" | "E006"));

    if !has_fatal_structure {
        diagnostics.extend(layer2_topology::validate(schema));
    }

    ValidationReport::from_diagnostics(diagnostics)
}
