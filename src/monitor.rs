//! Resident-memory monitor for one external process tree.
//!
//! The caller drives the monitor: one [`ProcessMonitor::sample`] per loop
//! iteration, with a [`Ticker`](crate::ticker::Ticker) between iterations.
//! Every tick snapshots the tree rooted at the launched child, reads each
//! member's RSS, and records the sum. The first recorded sum is the
//! baseline; the reported peak is the largest sum minus that baseline.
//!
//! Tree members may exit between the snapshot and the read. Such a member
//! contributes nothing to that tick.
//!
//! Every descendant ever seen is remembered with its start time, so release
//! and drop still reach processes orphaned by an exited parent.

use std::fmt;
use std::process::{Child, Command, ExitStatus};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, trace, warn};

use crate::errors::{HarnessError, Result};
use crate::probe::{ProbeError, ProcessProbe, StopSignal, SysinfoProbe};
use crate::types::MonitorResult;

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(2);

const EXIT_POLL: Duration = Duration::from_millis(10);

/// What to launch: an argv vector, or a line handed to `sh -c`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSpec {
    Direct(Vec<String>),
    Shell(String),
}

impl CommandSpec {
    fn to_command(&self) -> std::io::Result<Command> {
        match self {
            CommandSpec::Direct(argv) => {
                let (program, args) = argv.split_first().ok_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command")
                })?;
                let mut cmd = Command::new(program);
                cmd.args(args);
                Ok(cmd)
            }
            CommandSpec::Shell(line) => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(line);
                Ok(cmd)
            }
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandSpec::Direct(argv) => write!(f, "{}", argv.join(" ")),
            CommandSpec::Shell(line) => write!(f, "sh -c {}", line),
        }
    }
}

/// Monitors exactly one launched process tree. A new run needs a new monitor.
pub struct ProcessMonitor<P: ProcessProbe = SysinfoProbe> {
    command: CommandSpec,
    probe: P,
    child: Child,
    pid: u32,
    samples: Vec<u64>,
    baseline: Option<u64>,
    peak: u64,
    /// Every descendant seen in a snapshot, with its start time, in discovery order.
    descendants: Vec<(u32, u64)>,
    exit_status: Option<ExitStatus>,
    start_time: DateTime<Utc>,
    started: Instant,
    finished: Option<(DateTime<Utc>, Duration)>,
    grace_period: Duration,
}

impl ProcessMonitor<SysinfoProbe> {
    pub fn launch(command: CommandSpec) -> Result<Self> {
        Self::launch_with(command, SysinfoProbe::new())
    }
}

impl<P: ProcessProbe> ProcessMonitor<P> {
    /// Spawn `command` and start observing it through `probe`.
    pub fn launch_with(command: CommandSpec, probe: P) -> Result<Self> {
        let launch_err = |source| HarnessError::Launch {
            command: command.to_string(),
            source,
        };
        let mut cmd = command.to_command().map_err(launch_err)?;

        let start_time = Utc::now();
        let started = Instant::now();
        let child = cmd.spawn().map_err(launch_err)?;
        let pid = child.id();
        info!(pid, command = %command, "launched");

        Ok(Self {
            command,
            probe,
            child,
            pid,
            samples: Vec::new(),
            baseline: None,
            peak: 0,
            descendants: Vec::new(),
            exit_status: None,
            start_time,
            started,
            finished: None,
            grace_period: DEFAULT_GRACE_PERIOD,
        })
    }

    /// How long a graceful [`release`](Self::release) waits before escalating to a kill.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn samples(&self) -> &[u64] {
        &self.samples
    }

    /// One poll tick. Returns `true` while the tree is alive.
    pub fn sample(&mut self) -> bool {
        if self.finished.is_some() {
            return false;
        }
        if !self.is_running() {
            self.finalize();
            return false;
        }

        self.measure_tree();

        if self.is_running() {
            true
        } else {
            self.finalize();
            false
        }
    }

    /// Final figures; only available once the tree has terminated.
    ///
    /// The baseline is the first sample, so the peak over it is never
    /// negative; a tree that only shrinks reports 0.
    pub fn result(&self) -> Result<MonitorResult> {
        let (end_time, elapsed) = self.finished.ok_or(HarnessError::StillRunning)?;
        let baseline = self.baseline.unwrap_or(0);
        let peak_rss = if self.samples.is_empty() {
            0
        } else {
            self.peak as i64 - baseline as i64
        };
        Ok(MonitorResult {
            baseline_rss: baseline,
            peak_rss,
            exit_code: self.exit_status.and_then(|s| s.code()),
            start_time: self.start_time,
            end_time,
            elapsed,
            samples: self.samples.clone(),
        })
    }

    /// Stop everything left of the tree and settle the result.
    ///
    /// Covers the root while it runs and every descendant ever seen that is
    /// still alive, including ones orphaned by an exited parent. With
    /// `force == false` they receive SIGTERM first, and whatever is left
    /// after the grace period is killed. Safe to call repeatedly.
    pub fn release(&mut self, force: bool) {
        let root_running = self.exit_status.is_none() && self.is_running();
        if root_running {
            let members = self.probe.snapshot_tree(self.pid);
            self.remember(&members);
        }

        let stragglers = self.live_descendants();
        if root_running || !stragglers.is_empty() {
            if force {
                self.stop_tree(StopSignal::Kill, &stragglers, root_running);
            } else {
                self.stop_tree(StopSignal::Terminate, &stragglers, root_running);
                if !self.wait_for_tree_exit(self.grace_period) {
                    let survivors = self.live_descendants();
                    let root_running = self.is_running();
                    warn!(
                        pid = self.pid,
                        root_running,
                        descendants = survivors.len(),
                        grace_ms = self.grace_period.as_millis() as u64,
                        "tree ignored SIGTERM, killing"
                    );
                    self.stop_tree(StopSignal::Kill, &survivors, root_running);
                }
            }
        }
        self.finalize();
    }

    fn is_running(&mut self) -> bool {
        if self.exit_status.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit_status = Some(status);
                false
            }
            Ok(None) => self.probe.exists(self.pid),
            Err(err) => {
                warn!(pid = self.pid, error = %err, "failed to query child status");
                false
            }
        }
    }

    fn measure_tree(&mut self) {
        let members = self.probe.snapshot_tree(self.pid);
        self.remember(&members);
        let mut total = 0u64;
        let mut root_read = false;

        for pid in members {
            match self.probe.resident_bytes(pid) {
                Ok(bytes) => {
                    total += bytes;
                    root_read |= pid == self.pid;
                }
                Err(ProbeError::NotFound(_)) => {
                    trace!(pid, "tree member exited before its memory was read");
                }
                Err(err) => debug!(pid, error = %err, "skipping tree member"),
            }
        }

        // A zombie root still reads as 0 bytes; that tick is the tree
        // shutting down, not a sample.
        if root_read && self.probe.exists(self.pid) {
            self.record(total);
        }
    }

    fn record(&mut self, total: u64) {
        if self.baseline.is_none() {
            debug!(pid = self.pid, baseline = total, "captured baseline");
            self.baseline = Some(total);
        }
        self.peak = self.peak.max(total);
        self.samples.push(total);
    }

    fn remember(&mut self, members: &[u32]) {
        for &pid in members {
            if pid == self.pid || self.descendants.iter().any(|&(known, _)| known == pid) {
                continue;
            }
            if let Some(started) = self.probe.start_time(pid) {
                self.descendants.push((pid, started));
            }
        }
    }

    /// Remembered descendants that still run and are still the same process.
    fn live_descendants(&mut self) -> Vec<u32> {
        let known = self.descendants.clone();
        known
            .into_iter()
            .filter(|&(pid, started)| {
                self.probe.exists(pid) && self.probe.start_time(pid) == Some(started)
            })
            .map(|(pid, _)| pid)
            .collect()
    }

    /// Descendants first, deepest-discovered first, then the root, so the
    /// root cannot respawn them.
    fn stop_tree(&mut self, signal: StopSignal, descendants: &[u32], include_root: bool) {
        for &pid in descendants.iter().rev() {
            match self.probe.signal(pid, signal) {
                Ok(()) | Err(ProbeError::NotFound(_)) => {}
                Err(err) => warn!(pid, error = %err, "failed to signal tree member"),
            }
        }
        if !include_root {
            return;
        }

        let root = match signal {
            StopSignal::Kill => self.child.kill().map_err(|e| e.to_string()),
            StopSignal::Terminate => match self.probe.signal(self.pid, signal) {
                Ok(()) | Err(ProbeError::NotFound(_)) => Ok(()),
                Err(err) => Err(err.to_string()),
            },
        };
        if let Err(err) = root {
            debug!(pid = self.pid, error = %err, "signal to root not delivered");
        }
    }

    fn wait_for_tree_exit(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.is_running() && self.live_descendants().is_empty() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(EXIT_POLL);
        }
    }

    /// Reap the root and stamp the end time. Runs once.
    fn finalize(&mut self) {
        if self.finished.is_some() {
            return;
        }
        if self.exit_status.is_none() {
            // Only reachable when the probe lost sight of a child the kernel
            // has not reported as exited; kill so that `wait` cannot block.
            let _ = self.child.kill();
            match self.child.wait() {
                Ok(status) => self.exit_status = Some(status),
                Err(err) => warn!(pid = self.pid, error = %err, "failed to reap child"),
            }
        }
        let elapsed = self.started.elapsed();
        self.finished = Some((Utc::now(), elapsed));
        info!(
            pid = self.pid,
            command = %self.command,
            exit_code = ?self.exit_status.and_then(|s| s.code()),
            samples = self.samples.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "process tree finished"
        );
    }
}

impl<P: ProcessProbe> Drop for ProcessMonitor<P> {
    fn drop(&mut self) {
        // Also sweeps up descendants that outlived a root which exited on its own.
        self.release(true);
    }
}
