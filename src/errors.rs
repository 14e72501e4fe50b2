use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum HarnessError {
    #[error("Invalid synthesis parameters: {detail}")]
    Precondition { detail: String },

    #[error("Failed to launch '{command}': {source}")]
    Launch {
        command: String,
        source: std::io::Error,
    },

    #[error("Failed to write graph to {path}: {source}")]
    GraphWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read graph from {path}: {source}")]
    GraphRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed graph input at line {line}: {detail}")]
    GraphParse { line: usize, detail: String },

    #[error("Failed to read result payload {path}: {source}")]
    PayloadRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse result payload {path}: {source}")]
    PayloadParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Build of version {version} failed: {detail}")]
    Build { version: u32, detail: String },

    #[error("Candidate version {version} exited with {}", describe_exit(.exit_code))]
    CandidateFailed {
        version: u32,
        exit_code: Option<i32>,
    },

    #[error("Monitored process exceeded the {secs}s timeout and was killed")]
    Timeout { secs: u64 },

    #[error("Result store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Process tree is still running; no result yet")]
    StillRunning,
}

pub type Result<T> = std::result::Result<T, HarnessError>;

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {}", c),
        None => "a signal".to_string(),
    }
}
