pub mod config;
pub mod display;
pub mod errors;
pub mod logging;
pub mod monitor;
pub mod orchestrate;
pub mod probe;
pub mod serialize;
pub mod store;
pub mod synth;
pub mod ticker;
pub mod types;

pub use errors::{HarnessError, Result};
pub use monitor::{CommandSpec, ProcessMonitor};
pub use synth::{synthesize, synthesize_with};
pub use types::{GraphParams, MonitorResult, TemporalEdge, TemporalGraph};
