//! Pipeline definition DSL: schema types, multi-format parsing and layered
//! validation.

pub mod parser;
pub mod schema;
pub mod validation;

pub use parser::{parse_dsl, DslFormat};
pub use schema::*;
pub use validation::{validate_dsl, validate_schema, Diagnostic, DiagnosticLevel, ValidationReport};
