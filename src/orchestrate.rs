//! Sweep driver: for every `(V, E, T)` combination, synthesize and write the
//! input graph once, then build, run, and record each candidate version.
//!
//! A failing combination is recorded and skipped; the sweep always finishes.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{info, warn};

use crate::config::{HarnessConfig, VersionSelection};
use crate::errors::{HarnessError, Result};
use crate::monitor::{CommandSpec, ProcessMonitor};
use crate::probe::ProcessProbe;
use crate::serialize::write_graph_atomic;
use crate::store::ResultStore;
use crate::synth::synthesize_with;
use crate::ticker::Ticker;
use crate::types::{
    GraphParams, MonitorResult, RunRecord, TemporalGraph, TimestampStrategy,
    shell_escape_single_quote,
};

/// Epoch counts passed through to the candidate binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochFlags {
    pub has_edge: u32,
    pub neighbours: u32,
    pub aggregate: u32,
}

/// One successful candidate run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub params: GraphParams,
    pub version: u32,
    pub monitor: MonitorResult,
    pub record: RunRecord,
    /// `false` when the store already held this key.
    pub inserted: bool,
}

#[derive(Debug, Clone)]
pub struct SweepFailure {
    pub params: GraphParams,
    /// `None` when the failure happened before any version ran.
    pub version: Option<u32>,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct SweepSummary {
    pub completed: usize,
    pub failures: Vec<SweepFailure>,
}

impl SweepSummary {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Drive `monitor` to completion, sleeping `ticker` between ticks.
///
/// With a `timeout`, the tree is force-released once it elapses and a
/// [`HarnessError::Timeout`] is returned.
pub fn watch<P: ProcessProbe>(
    monitor: &mut ProcessMonitor<P>,
    mut ticker: Ticker,
    timeout: Option<Duration>,
) -> Result<MonitorResult> {
    let deadline = timeout.map(|t| Instant::now() + t);
    while monitor.sample() {
        if let Some(deadline) = deadline
            && Instant::now() >= deadline
        {
            monitor.release(true);
            return Err(HarnessError::Timeout {
                secs: timeout.map_or(0, |t| t.as_secs()),
            });
        }
        ticker.wait();
    }
    monitor.release(false);
    monitor.result()
}

/// Synthesize a graph and write it atomically to `path`.
pub fn generate_data(
    params: GraphParams,
    strategy: TimestampStrategy,
    rng: &mut StdRng,
    path: &Path,
) -> Result<TemporalGraph> {
    info!(%params, path = %path.display(), "generating graph");
    let graph = synthesize_with(params, strategy, rng)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|source| HarnessError::GraphWrite {
            path: path.to_path_buf(),
            source,
        })?;
    }
    write_graph_atomic(&graph, path)?;
    Ok(graph)
}

/// RNG from an optional seed; OS entropy when absent.
pub fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// Candidate command line: `<binary> < <datapath> --flag=value ...`.
pub fn compose_command_line(
    binary: &str,
    datapath: &Path,
    epochs: EpochFlags,
    output_file: &Path,
) -> String {
    format!(
        "{} < {} --has_edge_epochs={} --neighbours_epochs={} --aggregate_epochs={} --output_file={}",
        binary,
        shell_escape_single_quote(&datapath.to_string_lossy()),
        epochs.has_edge,
        epochs.neighbours,
        epochs.aggregate,
        shell_escape_single_quote(&output_file.to_string_lossy()),
    )
}

/// Read the record a candidate wrote on completion.
pub fn read_payload(path: &Path) -> Result<RunRecord> {
    let contents = std::fs::read_to_string(path).map_err(|source| HarnessError::PayloadRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| HarnessError::PayloadParse {
        path: path.to_path_buf(),
        source,
    })
}

fn substitute(template: &str, version: u32, workspace: &Path) -> String {
    template
        .replace("{version}", &version.to_string())
        .replace("{workspace}", &workspace.to_string_lossy())
}

pub struct Orchestrator<'a> {
    config: &'a HarnessConfig,
    store: &'a ResultStore,
    rng: StdRng,
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: &'a HarnessConfig, store: &'a ResultStore) -> Self {
        Self {
            config,
            store,
            rng: make_rng(config.seed),
        }
    }

    /// Run every configured combination, reporting each success to `on_run`.
    pub fn sweep<F>(&mut self, mut on_run: F) -> SweepSummary
    where
        F: FnMut(&RunOutcome),
    {
        let mut summary = SweepSummary::default();
        let config = self.config;
        info!(
            vertices = ?config.vertices,
            edges = ?config.edges,
            timestamps = ?config.timestamps,
            "starting sweep"
        );

        for &v in &config.vertices {
            for &e in &config.edges {
                for &t in &config.timestamps {
                    let params = GraphParams::new(v, e, t);
                    self.run_combination(params, &mut summary, &mut on_run);
                }
            }
        }

        info!(
            completed = summary.completed,
            failed = summary.failures.len(),
            "sweep finished"
        );
        summary
    }

    fn run_combination<F>(&mut self, params: GraphParams, summary: &mut SweepSummary, on_run: &mut F)
    where
        F: FnMut(&RunOutcome),
    {
        let config = self.config;
        if let Err(err) = generate_data(
            params,
            config.timestamps_strategy,
            &mut self.rng,
            &config.datapath,
        ) {
            warn!(%params, error = %err, "skipping combination");
            summary.failures.push(SweepFailure {
                params,
                version: None,
                error: err.to_string(),
            });
            return;
        }

        let versions = self.versions();
        if versions.is_empty() {
            warn!(workspace = %config.workspace.display(), "no candidate versions found");
        }
        for version in versions {
            match self.run_version(params, version) {
                Ok(outcome) => {
                    summary.completed += 1;
                    on_run(&outcome);
                }
                Err(err) => {
                    warn!(%params, version, error = %err, "run failed");
                    summary.failures.push(SweepFailure {
                        params,
                        version: Some(version),
                        error: err.to_string(),
                    });
                }
            }
        }
    }

    /// Configured versions; `All` scans `v0, v1, ...` until a gap.
    pub fn versions(&self) -> Vec<u32> {
        match &self.config.versions {
            VersionSelection::List(vs) => vs.clone(),
            VersionSelection::All => (0..)
                .take_while(|i| self.version_dir(*i).is_dir())
                .collect(),
        }
    }

    fn version_dir(&self, version: u32) -> PathBuf {
        self.config.workspace.join(format!("v{}", version))
    }

    pub fn output_file(&self, version: u32) -> PathBuf {
        self.version_dir(version).join(&self.config.output_filename)
    }

    fn epochs(&self) -> EpochFlags {
        EpochFlags {
            has_edge: self.config.has_edge_epochs,
            neighbours: self.config.neighbours_epochs,
            aggregate: self.config.aggregate_epochs,
        }
    }

    /// Build, launch, monitor, and record one version against the current graph.
    pub fn run_version(&mut self, params: GraphParams, version: u32) -> Result<RunOutcome> {
        let config = self.config;
        self.build(version)?;

        let output_file = self.output_file(version);
        // A payload from an earlier run must not be mistaken for this one.
        match std::fs::remove_file(&output_file) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(HarnessError::PayloadRead {
                    path: output_file,
                    source,
                });
            }
        }

        let binary = substitute(&config.binary, version, &config.workspace);
        let line = compose_command_line(&binary, &config.datapath, self.epochs(), &output_file);
        info!(version, "running candidate");

        let mut monitor = ProcessMonitor::launch(CommandSpec::Shell(line))?
            .with_grace_period(config.grace_period());
        let result = watch(
            &mut monitor,
            Ticker::new(config.poll_interval()),
            config.timeout(),
        )?;

        if !result.succeeded() {
            return Err(HarnessError::CandidateFailed {
                version,
                exit_code: result.exit_code,
            });
        }

        let record = read_payload(&output_file)?;
        let inserted = self.store.insert(&record)?;
        if !inserted {
            info!(graph_type = %record.graph_type, "result already stored, keeping existing row");
        }

        Ok(RunOutcome {
            params,
            version,
            monitor: result,
            record,
            inserted,
        })
    }

    fn build(&self, version: u32) -> Result<()> {
        let config = self.config;
        let argv: Vec<String> = config
            .build_command
            .iter()
            .map(|arg| substitute(arg, version, &config.workspace))
            .collect();
        let Some((program, args)) = argv.split_first() else {
            return Ok(());
        };

        info!(version, command = %argv.join(" "), "building");
        let status = Command::new(program)
            .args(args)
            .current_dir(&config.workspace)
            .status()
            .map_err(|e| HarnessError::Build {
                version,
                detail: format!("could not run '{}': {}", program, e),
            })?;
        if !status.success() {
            return Err(HarnessError::Build {
                version,
                detail: format!("'{}' exited with {}", argv.join(" "), status),
            });
        }
        Ok(())
    }
}
