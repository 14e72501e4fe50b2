//! OS process inspection used by the monitor.
//!
//! A probe answers three questions about live processes: which processes
//! belong to a tree, how much resident memory each one holds, and whether a
//! process still exists. It can also deliver stop signals.

use std::collections::{HashMap, HashSet, VecDeque};

use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, Signal, System};

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeError {
    /// The process exited between being enumerated and being queried.
    #[error("process {0} no longer exists")]
    NotFound(u32),

    #[error("signals are not supported on this platform")]
    Unsupported,

    #[error("failed to signal process {0}")]
    SignalFailed(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    Terminate,
    Kill,
}

pub trait ProcessProbe {
    /// Snapshot of `root` followed by all of its transitive descendants.
    /// Empty when `root` itself is gone.
    fn snapshot_tree(&mut self, root: u32) -> Vec<u32>;

    /// Current resident memory of one process, in bytes.
    fn resident_bytes(&mut self, pid: u32) -> Result<u64, ProbeError>;

    /// Whether `pid` exists and is not a zombie.
    fn exists(&mut self, pid: u32) -> bool;

    /// Start time of `pid` in seconds since the epoch. Together with the
    /// pid it identifies one process across pid reuse.
    fn start_time(&mut self, pid: u32) -> Option<u64>;

    fn signal(&mut self, pid: u32, signal: StopSignal) -> Result<(), ProbeError>;
}

/// Probe backed by `sysinfo`.
pub struct SysinfoProbe {
    system: System,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    fn refresh_one(&mut self, pid: Pid, kind: ProcessRefreshKind) {
        self.system
            .refresh_processes_specifics(ProcessesToUpdate::Some(&[pid]), true, kind);
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessProbe for SysinfoProbe {
    fn snapshot_tree(&mut self, root: u32) -> Vec<u32> {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing(),
        );

        let root = Pid::from_u32(root);
        if self.system.process(root).is_none() {
            return Vec::new();
        }

        let mut children: HashMap<Pid, Vec<Pid>> = HashMap::new();
        for (pid, process) in self.system.processes() {
            // Linux reports threads as tasks; their memory is the owner's.
            if process.thread_kind().is_some() {
                continue;
            }
            if let Some(parent) = process.parent() {
                children.entry(parent).or_default().push(*pid);
            }
        }

        let mut tree = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([root]);
        while let Some(pid) = queue.pop_front() {
            if !seen.insert(pid) {
                continue;
            }
            tree.push(pid.as_u32());
            if let Some(kids) = children.get(&pid) {
                queue.extend(kids.iter().copied());
            }
        }
        tree
    }

    fn resident_bytes(&mut self, pid: u32) -> Result<u64, ProbeError> {
        let sys_pid = Pid::from_u32(pid);
        self.refresh_one(sys_pid, ProcessRefreshKind::nothing().with_memory());
        self.system
            .process(sys_pid)
            .map(|p| p.memory())
            .ok_or(ProbeError::NotFound(pid))
    }

    fn exists(&mut self, pid: u32) -> bool {
        let sys_pid = Pid::from_u32(pid);
        self.refresh_one(sys_pid, ProcessRefreshKind::nothing());
        self.system
            .process(sys_pid)
            .is_some_and(|p| p.status() != ProcessStatus::Zombie)
    }

    fn start_time(&mut self, pid: u32) -> Option<u64> {
        let sys_pid = Pid::from_u32(pid);
        self.refresh_one(sys_pid, ProcessRefreshKind::nothing());
        self.system.process(sys_pid).map(|p| p.start_time())
    }

    fn signal(&mut self, pid: u32, signal: StopSignal) -> Result<(), ProbeError> {
        let sys_pid = Pid::from_u32(pid);
        self.refresh_one(sys_pid, ProcessRefreshKind::nothing());
        let process = self.system.process(sys_pid).ok_or(ProbeError::NotFound(pid))?;
        let signal = match signal {
            StopSignal::Terminate => Signal::Term,
            StopSignal::Kill => Signal::Kill,
        };
        match process.kill_with(signal) {
            Some(true) => Ok(()),
            None => Err(ProbeError::Unsupported),
            Some(false) if !self.exists(pid) => Err(ProbeError::NotFound(pid)),
            Some(false) => Err(ProbeError::SignalFailed(pid)),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Command;
    use std::time::Duration;

    #[test]
    fn current_process_is_visible() {
        let mut probe = SysinfoProbe::new();
        let me = std::process::id();
        assert!(probe.exists(me));
        assert!(probe.resident_bytes(me).unwrap() > 0);
        assert_eq!(probe.snapshot_tree(me).first(), Some(&me));
    }

    #[test]
    fn start_time_is_stable() {
        let mut probe = SysinfoProbe::new();
        let me = std::process::id();
        let first = probe.start_time(me);
        assert!(first.is_some_and(|t| t > 0));
        assert_eq!(probe.start_time(me), first);
    }

    #[test]
    fn missing_process_reports_not_found() {
        let mut probe = SysinfoProbe::new();
        // Spawn and reap a child so its pid is known to be gone.
        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();

        assert!(!probe.exists(pid));
        assert_eq!(probe.resident_bytes(pid), Err(ProbeError::NotFound(pid)));
        assert!(probe.snapshot_tree(pid).is_empty());
        assert_eq!(probe.start_time(pid), None);
        assert_eq!(
            probe.signal(pid, StopSignal::Terminate),
            Err(ProbeError::NotFound(pid))
        );
    }

    #[test]
    fn snapshot_includes_grandchildren() {
        let mut child = Command::new("sh")
            .args(["-c", "sleep 5 & sleep 5; wait"])
            .spawn()
            .unwrap();
        std::thread::sleep(Duration::from_millis(300));

        let mut probe = SysinfoProbe::new();
        let tree = probe.snapshot_tree(child.id());
        assert_eq!(tree[0], child.id());
        assert!(tree.len() >= 3, "expected sh plus two sleeps, got {tree:?}");

        for pid in tree.iter().rev() {
            let _ = probe.signal(*pid, StopSignal::Kill);
        }
        child.wait().unwrap();
    }
}
