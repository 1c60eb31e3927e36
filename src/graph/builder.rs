use std::collections::{HashMap, HashSet};
use std::time::Duration;

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;

use crate::dsl::validation::validate_schema;
use crate::dsl::PipelineSchema;
use crate::error::{PipelineError, PipelineResult};

use super::types::*;

/// Ordered, validated job graph for one run.
#[derive(Debug, Clone)]
pub struct JobGraph {
    phases: Vec<Phase>,
    /// Edge `dep -> job` for every declared dependency.
    deps: StableDiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
}

impl JobGraph {
    /// Build a graph from phases, checking ordinals, names and dependencies.
    pub fn new(phases: Vec<Phase>) -> PipelineResult<Self> {
        Self::build(phases, &HashSet::new())
    }

    fn build(phases: Vec<Phase>, external: &HashSet<String>) -> PipelineResult<Self> {
        if phases.is_empty() {
            return Err(PipelineError::GraphBuildError(
                "graph has no phases".to_string(),
            ));
        }

        let mut deps = StableDiGraph::new();
        let mut index = HashMap::new();
        let mut ordinal_of: HashMap<&str, u32> = HashMap::new();
        let mut last_ordinal: Option<u32> = None;

        for phase in &phases {
            if let Some(prev) = last_ordinal {
                if phase.ordinal <= prev {
                    return Err(PipelineError::GraphBuildError(format!(
                        "phase '{}' ordinal {} is not greater than {}",
                        phase.name, phase.ordinal, prev
                    )));
                }
            }
            last_ordinal = Some(phase.ordinal);

            for job in &phase.jobs {
                if index.contains_key(&job.name) {
                    return Err(PipelineError::GraphBuildError(format!(
                        "duplicate job name: {}",
                        job.name
                    )));
                }
                let idx = deps.add_node(job.name.clone());
                index.insert(job.name.clone(), idx);
                ordinal_of.insert(job.name.as_str(), phase.ordinal);
            }
        }

        for phase in &phases {
            for job in &phase.jobs {
                for dep in &job.depends_on {
                    if external.contains(dep) {
                        continue;
                    }
                    let dep_ordinal = ordinal_of.get(dep.as_str()).copied().ok_or_else(|| {
                        PipelineError::GraphBuildError(format!(
                            "job '{}' depends on unknown job '{}'",
                            job.name, dep
                        ))
                    })?;
                    if dep_ordinal >= phase.ordinal {
                        return Err(PipelineError::GraphBuildError(format!(
                            "job '{}' depends on '{}' which is not in an earlier phase",
                            job.name, dep
                        )));
                    }
                    deps.add_edge(index[dep], index[&job.name], ());
                }
            }
        }

        if petgraph::algo::is_cyclic_directed(&deps) {
            return Err(PipelineError::GraphBuildError(
                "dependency cycle detected".to_string(),
            ));
        }

        Ok(Self {
            phases,
            deps,
            index,
        })
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn jobs(&self) -> impl Iterator<Item = &JobSpec> {
        self.phases.iter().flat_map(|p| p.jobs.iter())
    }

    pub fn job(&self, name: &str) -> Option<&JobSpec> {
        self.jobs().find(|j| j.name == name)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Jobs that declare a dependency on `name`.
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        let Some(idx) = self.index.get(name) else {
            return Vec::new();
        };
        self.deps
            .neighbors_directed(*idx, Direction::Outgoing)
            .filter_map(|n| self.deps.node_weight(n).cloned())
            .collect()
    }

    pub fn has_dependents(&self, name: &str) -> bool {
        self.index
            .get(name)
            .map(|idx| {
                self.deps
                    .neighbors_directed(*idx, Direction::Outgoing)
                    .next()
                    .is_some()
            })
            .unwrap_or(false)
    }

    /// Narrow the graph to a single phase.
    ///
    /// Dependencies on jobs outside the selected phase are dropped: they are
    /// assumed to have been satisfied by an earlier run.
    pub fn select_phase(&self, name: &str) -> PipelineResult<JobGraph> {
        let phase = self
            .phases
            .iter()
            .find(|p| p.name == name)
            .cloned()
            .ok_or_else(|| PipelineError::PhaseNotFound(name.to_string()))?;

        let outside: HashSet<String> = self
            .jobs()
            .filter(|j| j.phase != name)
            .map(|j| j.name.clone())
            .collect();

        let mut phase = phase;
        for job in &mut phase.jobs {
            job.depends_on.retain(|dep| !outside.contains(dep));
        }
        Self::build(vec![phase], &outside)
    }
}

/// Validate a schema and build its job graph.
pub fn build_graph(schema: &PipelineSchema) -> PipelineResult<JobGraph> {
    let report = validate_schema(schema);
    if !report.is_valid {
        return Err(PipelineError::ValidationFailed(Box::new(report)));
    }

    let mut phases = Vec::with_capacity(schema.phases.len());
    for (i, phase_schema) in schema.phases.iter().enumerate() {
        let ordinal = phase_schema.ordinal.unwrap_or(i as u32);
        let mut phase = Phase::new(phase_schema.name.clone(), ordinal, phase_schema.gating);
        for job in &phase_schema.jobs {
            let mut spec = JobSpec::new(job.name.clone(), phase_schema.name.clone(), ordinal);
            if let Some(entry) = &job.entry {
                spec.entry = entry.clone();
            }
            spec.depends_on = job.depends_on.clone();
            spec.timeout = job.timeout_secs.map(Duration::from_secs);
            phase.jobs.push(spec);
        }
        phases.push(phase);
    }

    JobGraph::new(phases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::{parse_dsl, DslFormat};

    fn taxi_phases() -> Vec<Phase> {
        vec![
            Phase::new("lookup", 0, GatingMode::Parallel).job("lookup"),
            Phase::new("clean", 1, GatingMode::Blocking).job("clean"),
            Phase::new("insights", 2, GatingMode::Parallel)
                .job_with("agg1", |s| s.depends_on("clean"))
                .job_with("agg2", |s| s.depends_on("clean")),
        ]
    }

    #[test]
    fn test_new_graph_and_dependents() {
        let graph = JobGraph::new(taxi_phases()).unwrap();
        assert_eq!(graph.len(), 4);
        let mut dependents = graph.dependents_of("clean");
        dependents.sort();
        assert_eq!(dependents, vec!["agg1", "agg2"]);
        assert!(graph.has_dependents("clean"));
        assert!(!graph.has_dependents("lookup"));
    }

    #[test]
    fn test_rejects_non_increasing_ordinals() {
        let phases = vec![
            Phase::new("a", 1, GatingMode::Blocking).job("a"),
            Phase::new("b", 1, GatingMode::Blocking).job("b"),
        ];
        assert!(matches!(
            JobGraph::new(phases),
            Err(PipelineError::GraphBuildError(_))
        ));
    }

    #[test]
    fn test_rejects_same_phase_dependency() {
        let phases = vec![Phase::new("a", 0, GatingMode::Parallel)
            .job("x")
            .job_with("y", |s| s.depends_on("x"))];
        assert!(JobGraph::new(phases).is_err());
    }

    #[test]
    fn test_select_phase_drops_outside_dependencies() {
        let graph = JobGraph::new(taxi_phases()).unwrap();
        let selected = graph.select_phase("insights").unwrap();
        assert_eq!(selected.phases().len(), 1);
        assert!(selected.jobs().all(|j| j.depends_on.is_empty()));
        assert!(matches!(
            graph.select_phase("missing"),
            Err(PipelineError::PhaseNotFound(_))
        ));
    }

    #[test]
    fn test_build_graph_from_yaml() {
        let yaml = r#"
version: "0.1.0"
name: taxi
entries:
  lookup:
    type: spark-submit
    script: create_lookup_tables.py
  clean:
    type: spark-submit
    script: data_validation_cleaning.py
phases:
  - name: lookup
    gating: parallel
    jobs:
      - name: lookup
  - name: clean
    gating: blocking
    jobs:
      - name: clean
        depends_on: [lookup]
        timeout_secs: 600
"#;
        let schema = parse_dsl(yaml, DslFormat::Yaml).unwrap();
        let graph = build_graph(&schema).unwrap();
        let clean = graph.job("clean").unwrap();
        assert_eq!(clean.phase_ordinal, 1);
        assert_eq!(clean.timeout, Some(Duration::from_secs(600)));
        assert_eq!(clean.depends_on, vec!["lookup"]);
    }

    #[test]
    fn test_build_graph_rejects_invalid_schema() {
        let yaml = r#"
version: "9.9.9"
phases: []
"#;
        let schema = parse_dsl(yaml, DslFormat::Yaml).unwrap();
        assert!(matches!(
            build_graph(&schema),
            Err(PipelineError::ValidationFailed(_))
        ));
    }
}
