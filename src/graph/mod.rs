//! Job graph construction and representation.
//!
//! A [`JobGraph`] is an ordered list of [`Phase`]s built from a validated
//! [`PipelineSchema`](crate::dsl::PipelineSchema) by [`build_graph`], or
//! directly with [`JobGraph::new`]. Declared dependencies between jobs are
//! kept in a petgraph graph for dependent lookups.

pub mod builder;
pub mod types;

pub use builder::*;
pub use types::*;
