//! Random temporal graph synthesis.
//!
//! Endpoint pairs are drawn first, each pair gets two timestamped events, the
//! events are stably sorted by time, and a single pass pairs the events of
//! each directed `(u, v)` key into `[begin, end]` intervals.

use std::collections::HashMap;

use rand::Rng;

use crate::errors::{HarnessError, Result};
use crate::types::{GraphParams, TemporalEdge, TemporalGraph, TimestampStrategy, VertexId};

/// A raw endpoint event `(timestamp, u, v)` before pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalEvent {
    pub timestamp: u64,
    pub src: VertexId,
    pub dst: VertexId,
}

impl TimestampStrategy {
    pub fn draw<R: Rng + ?Sized>(self, rng: &mut R, max_time: u64) -> u64 {
        match self {
            TimestampStrategy::Uniform => rng.random_range(0..=max_time),
            TimestampStrategy::Static => 0,
        }
    }
}

/// Synthesize a graph with uniformly drawn timestamps.
pub fn synthesize<R: Rng + ?Sized>(params: GraphParams, rng: &mut R) -> Result<TemporalGraph> {
    synthesize_with(params, TimestampStrategy::Uniform, rng)
}

pub fn synthesize_with<R: Rng + ?Sized>(
    params: GraphParams,
    strategy: TimestampStrategy,
    rng: &mut R,
) -> Result<TemporalGraph> {
    check_params(params)?;
    let pairs = draw_pairs(params, rng);
    let events = timestamp_events(&pairs, params.max_time, strategy, rng);
    let adjacency = pair_intervals(params.vertices as usize, &events);
    Ok(TemporalGraph::from_parts(params, adjacency))
}

fn check_params(params: GraphParams) -> Result<()> {
    if params.vertices == 0 {
        return Err(HarnessError::Precondition {
            detail: "vertex count must be positive (got 0)".to_string(),
        });
    }
    if params.edges.checked_mul(2).and_then(|n| usize::try_from(n).ok()).is_none() {
        return Err(HarnessError::Precondition {
            detail: format!("edge count {} does not fit in memory", params.edges),
        });
    }
    Ok(())
}

/// `E` endpoint pairs; self-loops and duplicates are kept.
fn draw_pairs<R: Rng + ?Sized>(params: GraphParams, rng: &mut R) -> Vec<(VertexId, VertexId)> {
    (0..params.edges)
        .map(|_| {
            let u = rng.random_range(0..params.vertices);
            let v = rng.random_range(0..params.vertices);
            (u, v)
        })
        .collect()
}

/// Two events per pair, stably sorted by timestamp.
pub fn timestamp_events<R: Rng + ?Sized>(
    pairs: &[(VertexId, VertexId)],
    max_time: u64,
    strategy: TimestampStrategy,
    rng: &mut R,
) -> Vec<TemporalEvent> {
    let mut events = Vec::with_capacity(pairs.len() * 2);
    for &(src, dst) in pairs {
        for _ in 0..2 {
            events.push(TemporalEvent {
                timestamp: strategy.draw(rng, max_time),
                src,
                dst,
            });
        }
    }
    // Must stay stable: ties resolve by emission order.
    events.sort_by_key(|e| e.timestamp);
    events
}

/// Pair events per directed `(u, v)` key in arrival order: first is begin, second is end.
pub fn pair_intervals(vertex_count: usize, events: &[TemporalEvent]) -> Vec<Vec<TemporalEdge>> {
    let mut adjacency = vec![Vec::new(); vertex_count];
    let mut pending: HashMap<(VertexId, VertexId), u64> = HashMap::new();

    for event in events {
        match pending.remove(&(event.src, event.dst)) {
            Some(begin) => adjacency[event.src as usize].push(TemporalEdge::new(
                event.dst,
                begin,
                event.timestamp,
            )),
            None => {
                pending.insert((event.src, event.dst), event.timestamp);
            }
        }
    }

    adjacency
}
