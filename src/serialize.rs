use std::fmt::Write as _;
use std::io::{BufRead, BufWriter, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::errors::{HarnessError, Result};
use crate::types::{GraphParams, TemporalEdge, TemporalGraph};

/// Render a graph in the candidate input format.
///
/// Line 1 is `V E T`; then one line per vertex: the adjacency count followed
/// by `neighbour begin end` for each entry.
pub fn render(graph: &TemporalGraph) -> String {
    let mut out = String::new();
    let p = graph.params();
    let _ = writeln!(out, "{} {} {}", p.vertices, p.edges, p.max_time);
    for edges in graph.adjacency() {
        let _ = write!(out, "{}", edges.len());
        for e in edges {
            let _ = write!(out, " {} {} {}", e.neighbour, e.begin, e.end);
        }
        out.push('\n');
    }
    out
}

/// Stream a graph to `w` in the candidate input format.
pub fn write_graph<W: Write>(graph: &TemporalGraph, w: W) -> std::io::Result<()> {
    let mut w = BufWriter::new(w);
    let p = graph.params();
    writeln!(w, "{} {} {}", p.vertices, p.edges, p.max_time)?;
    for edges in graph.adjacency() {
        write!(w, "{}", edges.len())?;
        for e in edges {
            write!(w, " {} {} {}", e.neighbour, e.begin, e.end)?;
        }
        w.write_all(b"\n")?;
    }
    w.flush()
}

/// Write a graph to `path` so that readers see either the old file or the
/// complete new one, never a partial write.
pub fn write_graph_atomic(graph: &TemporalGraph, path: &Path) -> Result<()> {
    let write_err = |source| HarnessError::GraphWrite {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    write_graph(graph, tmp.as_file_mut()).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    // The temp file is unlinked on drop if persist fails.
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// Parse the candidate input format back into a graph.
///
/// Only blank lines may follow the vertex lines, and the entry total must
/// match the header's `E`.
pub fn parse_graph<R: BufRead>(reader: R) -> Result<TemporalGraph> {
    let mut lines = reader.lines();

    let header = lines.next().ok_or_else(|| parse_err(1, "missing header line"))?;
    let header = header.map_err(|e| parse_err(1, &e.to_string()))?;
    let fields = parse_numbers(&header, 1)?;
    let &[v, e, t] = fields.as_slice() else {
        return Err(parse_err(1, &format!("expected 'V E T', got {} fields", fields.len())));
    };
    let vertices = u32::try_from(v).map_err(|_| parse_err(1, "vertex count out of range"))?;
    let params = GraphParams::new(vertices, e, t);

    let mut adjacency = Vec::with_capacity(vertices as usize);
    for u in 0..vertices as usize {
        let line_no = u + 2;
        let line = match lines.next() {
            Some(line) => line.map_err(|e| parse_err(line_no, &e.to_string()))?,
            None => {
                return Err(parse_err(
                    line_no,
                    &format!("expected {} vertex lines, found {}", vertices, u),
                ));
            }
        };
        adjacency.push(parse_vertex_line(&line, line_no, vertices)?);
    }

    for (i, line) in lines.enumerate() {
        let line_no = vertices as usize + 2 + i;
        let line = line.map_err(|e| parse_err(line_no, &e.to_string()))?;
        if !line.trim().is_empty() {
            return Err(parse_err(
                line_no,
                &format!("unexpected content after {} vertex lines", vertices),
            ));
        }
    }

    let entries: u64 = adjacency.iter().map(|edges| edges.len() as u64).sum();
    if entries != e {
        return Err(parse_err(
            1,
            &format!("header declares E = {} but the file holds {} entries", e, entries),
        ));
    }

    Ok(TemporalGraph::from_parts(params, adjacency))
}

/// Read and parse a graph file.
pub fn read_graph(path: &Path) -> Result<TemporalGraph> {
    let file = std::fs::File::open(path).map_err(|source| HarnessError::GraphRead {
        path: path.to_path_buf(),
        source,
    })?;
    parse_graph(std::io::BufReader::new(file))
}

fn parse_vertex_line(line: &str, line_no: usize, vertices: u32) -> Result<Vec<TemporalEdge>> {
    let nums = parse_numbers(line, line_no)?;
    let (&count, rest) = nums
        .split_first()
        .ok_or_else(|| parse_err(line_no, "empty adjacency line"))?;
    if rest.len() as u64 != count.saturating_mul(3) {
        return Err(parse_err(
            line_no,
            &format!("count {} needs {} values, found {}", count, count.saturating_mul(3), rest.len()),
        ));
    }

    rest.chunks_exact(3)
        .map(|triple| {
            let neighbour = u32::try_from(triple[0])
                .ok()
                .filter(|&n| n < vertices)
                .ok_or_else(|| parse_err(line_no, &format!("neighbour {} out of range", triple[0])))?;
            Ok(TemporalEdge::new(neighbour, triple[1], triple[2]))
        })
        .collect()
}

fn parse_numbers(line: &str, line_no: usize) -> Result<Vec<u64>> {
    line.split_whitespace()
        .map(|tok| {
            tok.parse::<u64>()
                .map_err(|_| parse_err(line_no, &format!("invalid integer '{}'", tok)))
        })
        .collect()
}

fn parse_err(line: usize, detail: &str) -> HarnessError {
    HarnessError::GraphParse {
        line,
        detail: detail.to_string(),
    }
}
