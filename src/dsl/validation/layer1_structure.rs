use std::collections::HashSet;
use std::path::Path;

use crate::dsl::schema::{PipelineSchema, SUPPORTED_DSL_VERSIONS};

use super::types::Diagnostic;

pub fn validate(schema: &PipelineSchema) -> Vec<Diagnostic> {
    let mut diags = Vec::new();

    if !SUPPORTED_DSL_VERSIONS.contains(&schema.version.as_str()) {
        diags.push(
            Diagnostic::error(
                "E002",
                format!(
                    "Unsupported DSL version: {}, supported versions: {}",
                    schema.version,
                    SUPPORTED_DSL_VERSIONS.join(", ")
                ),
            )
            .at("version"),
        );
    }

    if schema.phases.is_empty() {
        diags.push(Diagnostic::error("E003", "No phases defined".to_string()));
        return diags;
    }

    let mut phase_names = HashSet::new();
    let mut job_names = HashSet::new();
    let mut last_ordinal: Option<u32> = None;

    for (pi, phase) in schema.phases.iter().enumerate() {
        if phase.name.trim().is_empty() {
            diags.push(
                Diagnostic::error("E004", "Phase name is empty".to_string())
                    .at(format!("phases[{}].name", pi)),
            );
        } else if !phase_names.insert(phase.name.as_str()) {
            diags.push(
                Diagnostic::error("E004", format!("Duplicate phase name: {}", phase.name))
                    .in_phase(&phase.name)
                    .at(format!("phases[{}].name", pi)),
            );
        }

        let ordinal = phase.ordinal.unwrap_or(pi as u32);
        if let Some(prev) = last_ordinal {
            if ordinal <= prev {
                diags.push(
                    Diagnostic::error(
                        "E009",
                        format!(
                            "Phase ordinal {} is not greater than previous ordinal {}",
                            ordinal, prev
                        ),
                    )
                    .in_phase(&phase.name)
                    .at(format!("phases[{}].ordinal", pi)),
                );
            }
        }
        last_ordinal = Some(ordinal);

        if phase.jobs.is_empty() {
            diags.push(
                Diagnostic::error("E005", format!("Phase '{}' has no jobs", phase.name))
                    .in_phase(&phase.name)
                    .at(format!("phases[{}].jobs", pi)),
            );
        }

        for (ji, job) in phase.jobs.iter().enumerate() {
            let path = format!("phases[{}].jobs[{}]", pi, ji);
            if job.name.trim().is_empty() {
                diags.push(
                    Diagnostic::error("E006", "Job name is empty".to_string())
                        .in_phase(&phase.name)
                        .at(format!("{}.name", path)),
                );
            } else if !job_names.insert(job.name.as_str()) {
                diags.push(
                    Diagnostic::error("E006", format!("Duplicate job name: {}", job.name))
                        .in_phase(&phase.name)
                        .for_job(&job.name)
                        .at(format!("{}.name", path)),
                );
            }

            if !schema.entries.contains_key(job.entry_key()) {
                diags.push(
                    Diagnostic::error("E007", format!("Unknown entry: {}", job.entry_key()))
                        .in_phase(&phase.name)
                        .for_job(&job.name)
                        .at(format!("{}.entry", path)),
                );
            }

            if job.timeout_secs == Some(0) {
                diags.push(
                    Diagnostic::error("E008", "timeout_secs must be greater than 0".to_string())
                        .in_phase(&phase.name)
                        .for_job(&job.name)
                        .at(format!("{}.timeout_secs", path)),
                );
            }
        }
    }

    if schema.executor.max_concurrency == 0 {
        diags.push(
            Diagnostic::error("E010", "max_concurrency must be greater than 0".to_string())
                .at("executor.max_concurrency"),
        );
    }

    for (ai, artifact) in schema.artifacts.iter().enumerate() {
        if !Path::new(&artifact.path).exists() {
            diags.push(
                Diagnostic::warning("W101", format!("Artifact not found: {}", artifact.path))
                    .at(format!("artifacts[{}].path", ai)),
            );
        }
    }

    diags
}
