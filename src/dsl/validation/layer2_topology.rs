use std::collections::HashMap;

use petgraph::graph::DiGraph;

use crate::dsl::schema::PipelineSchema;

use super::types::Diagnostic;

/// Check declared dependencies against phase order.
pub fn validate(schema: &PipelineSchema) -> Vec<Diagnostic> {
    let mut diags = Vec::new();

    // job name -> phase position
    let mut position: HashMap<&str, usize> = HashMap::new();
    let mut graph = DiGraph::<&str, ()>::new();
    let mut nodes = HashMap::new();

    for (pi, phase) in schema.phases.iter().enumerate() {
        for job in &phase.jobs {
            position.entry(job.name.as_str()).or_insert(pi);
            nodes
                .entry(job.name.as_str())
                .or_insert_with(|| graph.add_node(job.name.as_str()));
        }
    }

    for (pi, phase) in schema.phases.iter().enumerate() {
        for (ji, job) in phase.jobs.iter().enumerate() {
            for (di, dep) in job.depends_on.iter().enumerate() {
                let path = format!("phases[{}].jobs[{}].depends_on[{}]", pi, ji, di);
                let Some(dep_pos) = position.get(dep.as_str()) else {
                    diags.push(
                        Diagnostic::error(
                            "E101",
                            format!("Job '{}' depends on unknown job '{}'", job.name, dep),
                        )
                        .in_phase(&phase.name)
                        .for_job(&job.name)
                        .at(path),
                    );
                    continue;
                };

                if *dep_pos >= pi {
                    diags.push(
                        Diagnostic::error(
                            "E102",
                            format!(
                                "Job '{}' depends on '{}' which is not in an earlier phase",
                                job.name, dep
                            ),
                        )
                        .in_phase(&phase.name)
                        .for_job(&job.name)
                        .at(path),
                    );
                }

                graph.add_edge(nodes[dep.as_str()], nodes[job.name.as_str()], ());
            }
        }
    }

    if petgraph::algo::is_cyclic_directed(&graph) {
        diags.push(Diagnostic::error(
            "E103",
            "Dependency cycle detected".to_string(),
        ));
    }

    diags
}
