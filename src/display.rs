use owo_colors::{OwoColorize, Stream, Style};
use serde::Serialize;

use crate::orchestrate::{RunOutcome, SweepSummary};
use crate::types::{MonitorResult, RunRecord, TemporalGraph};

const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Header abbreviations applied in order, after stripping non-word characters.
const HEADER_ABBREVIATIONS: [(&str, &str); 6] = [
    ("graph", "g"),
    ("has_edge", "hedg"),
    ("neighbour", "neigh"),
    ("aggregate", "agg"),
    ("time", "t"),
    ("epochs", "ep"),
];

fn style_label() -> Style {
    Style::new().cyan().bold()
}

/// Bytes to whole kibibytes, keeping the sign.
pub fn to_kb(bytes: i64) -> i64 {
    bytes / 1024
}

/// Format a run duration as `850ms`, `12.4s` or `3m05s`.
pub fn format_elapsed(elapsed: std::time::Duration) -> String {
    let ms = elapsed.as_millis();
    if ms < 1_000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", elapsed.as_secs_f64())
    } else {
        let secs = elapsed.as_secs();
        format!("{}m{:02}s", secs / 60, secs % 60)
    }
}

/// Compress `samples` into at most `width` bars, each bar the max of its bucket.
pub fn format_sparkline(samples: &[u64], width: usize) -> String {
    if samples.is_empty() || width == 0 {
        return String::new();
    }

    let buckets = samples.len().min(width);
    let maxima: Vec<u64> = (0..buckets)
        .map(|b| {
            let from = b * samples.len() / buckets;
            let to = ((b + 1) * samples.len() / buckets).max(from + 1);
            samples[from..to].iter().copied().max().unwrap_or(0)
        })
        .collect();

    let lo = maxima.iter().copied().min().unwrap_or(0);
    let hi = maxima.iter().copied().max().unwrap_or(0);
    let span = hi - lo;

    maxima
        .iter()
        .map(|&m| {
            if span == 0 {
                SPARK_LEVELS[0]
            } else {
                let level = ((m - lo) as u128 * (SPARK_LEVELS.len() as u128 - 1) / span as u128) as usize;
                SPARK_LEVELS[level]
            }
        })
        .collect()
}

/// Report printed after each monitored run.
pub fn format_monitor_report(version: Option<u32>, result: &MonitorResult, plot: bool) -> String {
    let mut out = String::new();

    let title = match version {
        Some(v) => format!("========== Run Version {} ==========", v),
        None => "========== Run ==========".to_string(),
    };
    out.push_str(&title.if_supports_color(Stream::Stdout, |s| s.dimmed()).to_string());
    out.push('\n');

    let label = style_label();
    let code = match result.exit_code {
        Some(c) => c.to_string(),
        None => "signal".to_string(),
    };
    let code_colored = if result.succeeded() {
        code.if_supports_color(Stream::Stdout, |s| s.green()).to_string()
    } else {
        code.if_supports_color(Stream::Stdout, |s| s.red()).to_string()
    };

    let rows = [
        ("return code", code_colored),
        ("baseline_rss_memory", format!("{} KB", to_kb(result.baseline_rss as i64))),
        ("max_rss_memory", format!("{} KB", to_kb(result.peak_rss))),
        ("samples", result.samples.len().to_string()),
        ("elapsed", format_elapsed(result.elapsed)),
    ];
    for (name, value) in rows {
        let padded = format!("{:<20}", name);
        out.push_str(&format!(
            "  {} {}\n",
            padded.if_supports_color(Stream::Stdout, |s| s.style(label)),
            value
        ));
    }

    if plot && !result.samples.is_empty() {
        out.push_str(&format!(
            "  {} {}\n",
            format!("{:<20}", "rss curve").if_supports_color(Stream::Stdout, |s| s.style(label)),
            format_sparkline(&result.samples, 60)
                .if_supports_color(Stream::Stdout, |s| s.yellow())
        ));
    }

    out
}

pub fn format_run_outcome(outcome: &RunOutcome, plot: bool) -> String {
    let mut out = format_monitor_report(Some(outcome.version), &outcome.monitor, plot);
    let note = if outcome.inserted {
        format!("  stored {} ({})\n", outcome.record.graph_type, outcome.params)
    } else {
        format!(
            "  {} ({}) already stored, kept existing row\n",
            outcome.record.graph_type, outcome.params
        )
    };
    out.push_str(&note.if_supports_color(Stream::Stdout, |s| s.dimmed()).to_string());
    out
}

/// Shorten a column name for table display, e.g. `neighbours_time_ms` → `neighs_t_ms`.
pub fn abbreviate_header(name: &str) -> String {
    let mut h: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    for (from, to) in HEADER_ABBREVIATIONS {
        h = h.replace(from, to);
    }
    h
}

fn record_cells(r: &RunRecord) -> Vec<String> {
    vec![
        r.graph_type.clone(),
        r.vertices.to_string(),
        r.edges.to_string(),
        r.max_time.to_string(),
        format!("{:.4}", r.build_time_ms),
        format!("{:.4}", r.has_edge_time_ms),
        format!("{:.4}", r.neighbours_time_ms),
        format!("{:.4}", r.aggregate_time_ms),
        r.graph_rss_kb.to_string(),
        r.max_rss_kb.to_string(),
        r.has_edge_epochs.to_string(),
        r.neighbours_epochs.to_string(),
        r.aggregate_epochs.to_string(),
    ]
}

/// Aligned table of stored results with abbreviated headers.
pub fn format_results_table(columns: &[String], records: &[RunRecord]) -> String {
    let headers: Vec<String> = columns.iter().map(|c| abbreviate_header(c)).collect();
    let rows: Vec<Vec<String>> = records.iter().map(record_cells).collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let mut out = String::new();
    let header_line = headers
        .iter()
        .zip(&widths)
        .map(|(h, w)| format!("{:<w$}", h, w = *w))
        .collect::<Vec<_>>()
        .join("  ");
    out.push_str(
        &header_line
            .trim_end()
            .if_supports_color(Stream::Stdout, |s| s.style(style_label()))
            .to_string(),
    );
    out.push('\n');

    for row in rows {
        let line = row
            .iter()
            .zip(&widths)
            .enumerate()
            .map(|(i, (cell, w))| {
                if i == 0 {
                    format!("{:<w$}", cell, w = *w)
                } else {
                    format!("{:>w$}", cell, w = *w)
                }
            })
            .collect::<Vec<_>>()
            .join("  ");
        out.push_str(line.trim_end());
        out.push('\n');
    }

    if records.is_empty() {
        out.push_str(&"(no results stored)".if_supports_color(Stream::Stdout, |s| s.dimmed()).to_string());
        out.push('\n');
    }

    out
}

pub fn format_results_json(records: &[RunRecord]) -> String {
    serde_json::to_string_pretty(records).unwrap_or_else(|_| "[]".to_string())
}

#[derive(Serialize)]
struct JsonRun<'a> {
    #[serde(flatten)]
    result: &'a MonitorResult,
    baseline_rss_kb: i64,
    max_rss_kb: i64,
}

pub fn format_monitor_json(result: &MonitorResult) -> String {
    let run = JsonRun {
        result,
        baseline_rss_kb: to_kb(result.baseline_rss as i64),
        max_rss_kb: to_kb(result.peak_rss),
    };
    serde_json::to_string_pretty(&run).unwrap_or_else(|_| "{}".to_string())
}

pub fn format_sweep_summary(summary: &SweepSummary) -> String {
    let mut out = format!(
        "\n{} run(s) completed, {} failed\n",
        summary.completed,
        summary.failures.len()
    );
    for failure in &summary.failures {
        let version = match failure.version {
            Some(v) => format!("v{}", v),
            None => "-".to_string(),
        };
        let line = format!("  {} [{}] {}\n", failure.params, version, failure.error);
        out.push_str(&line.if_supports_color(Stream::Stdout, |s| s.red()).to_string());
    }
    out
}

/// Summary of a parsed graph file for `inspect`.
pub fn format_graph_stats(graph: &TemporalGraph) -> String {
    let p = graph.params();
    let degrees: Vec<usize> = graph.degrees().collect();
    let max_degree = degrees.iter().copied().max().unwrap_or(0);
    let isolated = degrees.iter().filter(|&&d| d == 0).count();
    let (min_begin, max_end) = graph
        .adjacency()
        .iter()
        .flatten()
        .fold((u64::MAX, 0u64), |(lo, hi), e| (lo.min(e.begin), hi.max(e.end)));

    let mut out = format!(
        "V = {}, E = {}, T = {}\nentries: {}\nmax out-degree: {}\nvertices without entries: {}\n",
        p.vertices,
        p.edges,
        p.max_time,
        graph.edge_count(),
        max_degree,
        isolated
    );
    if graph.edge_count() > 0 {
        out.push_str(&format!("interval span: [{}, {}]\n", min_begin, max_end));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use std::time::Duration;

    fn fixed_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-02-18T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn result(samples: Vec<u64>, exit_code: Option<i32>) -> MonitorResult {
        let baseline = samples.first().copied().unwrap_or(0);
        let peak = samples.iter().copied().max().unwrap_or(0);
        MonitorResult {
            baseline_rss: baseline,
            peak_rss: peak as i64 - baseline as i64,
            exit_code,
            start_time: fixed_time(),
            end_time: fixed_time(),
            elapsed: Duration::from_millis(1_234),
            samples,
        }
    }

    #[test]
    fn abbreviations_match_legacy_names() {
        assert_eq!(abbreviate_header("graph_type"), "g_type");
        assert_eq!(abbreviate_header("has_edge_time_ms"), "hedg_t_ms");
        assert_eq!(abbreviate_header("neighbours_time_ms"), "neighs_t_ms");
        assert_eq!(abbreviate_header("aggregate_epochs"), "agg_ep");
        assert_eq!(abbreviate_header("graph_rss_kb"), "g_rss_kb");
        assert_eq!(abbreviate_header("('V',)"), "V");
    }

    #[test]
    fn sparkline_flat_series() {
        assert_eq!(format_sparkline(&[5, 5, 5], 10), "▁▁▁");
    }

    #[test]
    fn sparkline_rises_to_full_bar() {
        assert_eq!(format_sparkline(&[0, 7], 10), "▁█");
    }

    #[test]
    fn sparkline_downsamples_keeping_peaks() {
        let mut samples = vec![1u64; 100];
        samples[57] = 1_000;
        let line = format_sparkline(&samples, 10);
        assert_eq!(line.chars().count(), 10);
        assert_eq!(line.chars().filter(|&c| c == '█').count(), 1);
    }

    #[test]
    fn sparkline_empty() {
        assert_eq!(format_sparkline(&[], 10), "");
        assert_eq!(format_sparkline(&[1, 2], 0), "");
    }

    #[test]
    fn elapsed_formats() {
        assert_eq!(format_elapsed(Duration::from_millis(850)), "850ms");
        assert_eq!(format_elapsed(Duration::from_millis(12_400)), "12.4s");
        assert_eq!(format_elapsed(Duration::from_secs(185)), "3m05s");
    }

    #[test]
    fn report_contains_kb_figures() {
        let report = format_monitor_report(Some(2), &result(vec![10_240, 51_200, 30_720], Some(0)), false);
        assert!(report.contains("Run Version 2"));
        assert!(report.contains("10 KB"));
        assert!(report.contains("40 KB"));
        assert!(!report.contains("rss curve"));
    }

    #[test]
    fn report_with_plot_and_signal_exit() {
        let report = format_monitor_report(None, &result(vec![1, 2, 3], None), true);
        assert!(report.contains("signal"));
        assert!(report.contains("rss curve"));
    }

    #[test]
    fn monitor_json_has_kb_fields() {
        let json = format_monitor_json(&result(vec![2_048, 4_096], Some(0)));
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["baseline_rss_kb"], 2);
        assert_eq!(value["max_rss_kb"], 2);
        assert_eq!(value["exit_code"], 0);
        assert_eq!(value["elapsed"], 1234.0);
    }

    #[test]
    fn empty_table_says_so() {
        let table = format_results_table(&["graph_type".to_string()], &[]);
        assert!(table.contains("g_type"));
        assert!(table.contains("no results stored"));
    }
}
