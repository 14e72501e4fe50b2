//! Sweep configuration.
//!
//! Read from TOML (`--config <path>`, or `tgbench/config.toml` under the
//! user config directory when present), then overridden by `TGBENCH_*`
//! environment variables:
//! - `TGBENCH_DATABASE` → `database`
//! - `TGBENCH_DATAPATH` → `datapath`
//! - `TGBENCH_WORKSPACE` → `workspace`
//! - `TGBENCH_POLL_INTERVAL_MS` → `poll_interval_ms`
//! - `TGBENCH_TIMEOUT_SECS` → `timeout_secs`
//! - `TGBENCH_LOG_LEVEL` → `log_level`
//! - `TGBENCH_SEED` → `seed`

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::errors::{HarnessError, Result};
use crate::types::TimestampStrategy;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Vertex counts to sweep. A scalar is accepted as a one-element list.
    #[serde(deserialize_with = "one_or_many")]
    pub vertices: Vec<u32>,
    #[serde(deserialize_with = "one_or_many")]
    pub edges: Vec<u64>,
    #[serde(deserialize_with = "one_or_many")]
    pub timestamps: Vec<u64>,
    pub versions: VersionSelection,
    /// Directory holding the `v{n}` candidate directories.
    pub workspace: PathBuf,
    /// Where the synthesized graph is written before each run.
    pub datapath: PathBuf,
    /// Candidate binary path; `{version}` is substituted.
    pub binary: String,
    /// Build argv run before each version; `{version}` is substituted. Empty skips the build.
    pub build_command: Vec<String>,
    /// Payload file name inside each `v{n}` directory.
    pub output_filename: String,
    pub database: PathBuf,
    pub seed: Option<u64>,
    pub timestamps_strategy: TimestampStrategy,
    pub has_edge_epochs: u32,
    pub neighbours_epochs: u32,
    pub aggregate_epochs: u32,
    pub poll_interval_ms: u64,
    pub timeout_secs: Option<u64>,
    pub grace_period_ms: u64,
    pub log_level: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            vertices: vec![1_000],
            edges: vec![10_000],
            timestamps: vec![1_000],
            versions: VersionSelection::All,
            workspace: PathBuf::from("."),
            datapath: PathBuf::from("data/graph.txt"),
            binary: "../bazel-bin/temporalgraph/v{version}/main".to_string(),
            build_command: vec![
                "bazel".to_string(),
                "build".to_string(),
                "v{version}:main".to_string(),
            ],
            output_filename: "results.json".to_string(),
            database: PathBuf::from("results.sqlite"),
            seed: None,
            timestamps_strategy: TimestampStrategy::Uniform,
            has_edge_epochs: 10,
            neighbours_epochs: 10,
            aggregate_epochs: 10,
            poll_interval_ms: 1,
            timeout_secs: None,
            grace_period_ms: 2_000,
            log_level: "info".to_string(),
        }
    }
}

/// Which candidate versions to run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawVersions")]
pub enum VersionSelection {
    /// `v0, v1, ...` until the first missing directory.
    All,
    List(Vec<u32>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawVersions {
    Name(String),
    One(u32),
    Many(Vec<u32>),
}

impl TryFrom<RawVersions> for VersionSelection {
    type Error = String;

    fn try_from(raw: RawVersions) -> std::result::Result<Self, Self::Error> {
        match raw {
            RawVersions::Name(s) if s == "all" => Ok(VersionSelection::All),
            RawVersions::Name(s) => Err(format!(
                "versions must be \"all\", an integer, or a list of integers (got \"{}\")",
                s
            )),
            RawVersions::One(v) => Ok(VersionSelection::List(vec![v])),
            RawVersions::Many(vs) => Ok(VersionSelection::List(vs)),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

fn one_or_many<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(x) => vec![x],
        OneOrMany::Many(xs) => xs,
    })
}

impl HarnessConfig {
    /// Default config file location: `<config dir>/tgbench/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("tgbench").join("config.toml"))
    }

    /// Load from `path`, or from [`default_path`](Self::default_path) if it
    /// exists, or fall back to defaults. Env overrides and validation apply in
    /// every case.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::read_file(p)?,
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(p) => Self::read_file(&p)?,
                None => Self::default(),
            },
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::Config(format!("failed to read '{}': {}", path.display(), e))
        })?;
        Self::parse_toml(&contents)
    }

    /// Parse TOML without applying overrides or validation.
    pub fn parse_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| HarnessError::Config(format!("failed to parse TOML: {}", e)))
    }

    /// Apply `TGBENCH_*` overrides looked up through `get`.
    pub fn apply_overrides<F>(&mut self, get: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = get("TGBENCH_DATABASE") {
            self.database = PathBuf::from(v);
        }
        if let Some(v) = get("TGBENCH_DATAPATH") {
            self.datapath = PathBuf::from(v);
        }
        if let Some(v) = get("TGBENCH_WORKSPACE") {
            self.workspace = PathBuf::from(v);
        }
        if let Some(v) = get("TGBENCH_POLL_INTERVAL_MS") {
            self.poll_interval_ms = parse_override("TGBENCH_POLL_INTERVAL_MS", &v)?;
        }
        if let Some(v) = get("TGBENCH_TIMEOUT_SECS") {
            self.timeout_secs = Some(parse_override("TGBENCH_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("TGBENCH_LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = get("TGBENCH_SEED") {
            self.seed = Some(parse_override("TGBENCH_SEED", &v)?);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for (name, empty) in [
            ("vertices", self.vertices.is_empty()),
            ("edges", self.edges.is_empty()),
            ("timestamps", self.timestamps.is_empty()),
        ] {
            if empty {
                return Err(HarnessError::Config(format!("{} must list at least one value", name)));
            }
        }
        if self.vertices.contains(&0) {
            return Err(HarnessError::Config("vertices must all be > 0".to_string()));
        }
        if let VersionSelection::List(vs) = &self.versions
            && vs.is_empty()
        {
            return Err(HarnessError::Config(
                "versions must be \"all\" or a non-empty list".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(HarnessError::Config("poll_interval_ms must be > 0".to_string()));
        }
        if self.binary.trim().is_empty() {
            return Err(HarnessError::Config("binary must not be empty".to_string()));
        }
        if self.output_filename.trim().is_empty() {
            return Err(HarnessError::Config("output_filename must not be empty".to_string()));
        }
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(HarnessError::Config(format!(
                "log_level must be one of: {} (got '{}')",
                VALID_LOG_LEVELS.join(", "),
                self.log_level
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

fn parse_override<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| HarnessError::Config(format!("{} has invalid value '{}'", key, value)))
}
