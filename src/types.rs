use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Vertex index in `0..V`.
pub type VertexId = u32;

/// Synthesis parameters: vertex count, edge-pair count, maximum timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GraphParams {
    pub vertices: u32,
    pub edges: u64,
    pub max_time: u64,
}

impl GraphParams {
    pub fn new(vertices: u32, edges: u64, max_time: u64) -> Self {
        Self {
            vertices,
            edges,
            max_time,
        }
    }
}

impl std::fmt::Display for GraphParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "V = {}, E = {}, T = {}", self.vertices, self.edges, self.max_time)
    }
}

/// An adjacency entry valid over `[begin, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalEdge {
    pub neighbour: VertexId,
    pub begin: u64,
    pub end: u64,
}

impl TemporalEdge {
    pub fn new(neighbour: VertexId, begin: u64, end: u64) -> Self {
        Self {
            neighbour,
            begin,
            end,
        }
    }
}

/// Per-vertex adjacency lists plus the parameters the graph was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporalGraph {
    params: GraphParams,
    adjacency: Vec<Vec<TemporalEdge>>,
}

impl TemporalGraph {
    pub(crate) fn from_parts(params: GraphParams, adjacency: Vec<Vec<TemporalEdge>>) -> Self {
        debug_assert_eq!(adjacency.len(), params.vertices as usize);
        Self { params, adjacency }
    }

    pub fn params(&self) -> GraphParams {
        self.params
    }

    pub fn vertex_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Total number of adjacency entries across all vertices.
    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum()
    }

    pub fn degrees(&self) -> impl Iterator<Item = usize> + '_ {
        self.adjacency.iter().map(Vec::len)
    }

    pub fn adjacency(&self) -> &[Vec<TemporalEdge>] {
        &self.adjacency
    }
}

/// How event timestamps are drawn during synthesis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TimestampStrategy {
    /// Independent uniform draws from `[0, T]`.
    #[default]
    Uniform,
    /// Every event at timestamp 0, i.e. a static graph.
    Static,
}

/// Record written by a candidate binary on completion, one row in the result store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub graph_type: String,
    #[serde(rename = "V")]
    pub vertices: i64,
    #[serde(rename = "E")]
    pub edges: i64,
    #[serde(rename = "T")]
    pub max_time: i64,
    pub build_time_ms: f64,
    pub has_edge_time_ms: f64,
    pub neighbours_time_ms: f64,
    pub aggregate_time_ms: f64,
    #[serde(alias = "graph_size_kb")]
    pub graph_rss_kb: i64,
    pub max_rss_kb: i64,
    pub has_edge_epochs: i64,
    pub neighbours_epochs: i64,
    pub aggregate_epochs: i64,
}

/// Final figures for one monitored process tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorResult {
    /// Aggregate RSS in bytes at the first successful tick (0 if none).
    pub baseline_rss: u64,
    /// Largest aggregate sample minus the baseline. The baseline is the
    /// first sample, so this is 0 for a tree that never grows.
    pub peak_rss: i64,
    /// `None` when the root was terminated by a signal.
    pub exit_code: Option<i32>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
    pub samples: Vec<u64>,
}

impl MonitorResult {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_nanos() as f64 / 1_000_000.0)
    }
}

/// Wraps a string in single quotes, escaping internal single quotes as `'\''`.
pub fn shell_escape_single_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    out
}
