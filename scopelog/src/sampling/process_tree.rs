//! Process-tree enumeration
//!
//! [`ProcessSource`] is the narrow platform seam: look up one process and list
//! its direct children. [`collect_tree`] walks the tree depth-first on top of
//! it and is platform-neutral. [`ProcFs`] implements the seam by reading
//! `/proc/<pid>/stat` on Linux, scanning the process table once per tree
//! into a [`ProcessTable`].

#![allow(unsafe_code)] // sysconf() requires unsafe

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::debug;

use crate::domain::Pid;

/// Resource usage of a single process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub parent: Pid,
    pub name: String,
    pub working_set_bytes: u64,
    pub thread_count: u64,
    /// User + system CPU time consumed so far
    pub cpu_time: Duration,
}

pub trait ProcessSource: Send + Sync {
    /// Look up a single process.
    ///
    /// # Errors
    /// Returns an error if the process has exited or cannot be read.
    fn process(&self, pid: Pid) -> Result<ProcessInfo>;

    /// List the direct children of `pid`.
    ///
    /// # Errors
    /// Returns an error if the process table cannot be read.
    fn list_child_processes(&self, pid: Pid) -> Result<Vec<ProcessInfo>>;

    /// `root` and all of its descendants, depth-first.
    ///
    /// Sources that can snapshot the whole process table should override
    /// this to read it once.
    fn process_tree(&self, root: Pid) -> Option<Vec<ProcessInfo>> {
        collect_tree(self, root)
    }
}

/// `root` followed by all of its descendants, depth-first.
///
/// Returns `None` if `root` itself cannot be read. A child listing that fails
/// is treated as "no children".
pub fn collect_tree<S: ProcessSource + ?Sized>(source: &S, root: Pid) -> Option<Vec<ProcessInfo>> {
    let root_info = match source.process(root) {
        Ok(info) => info,
        Err(e) => {
            debug!("Cannot sample {root}: {e:#}");
            return None;
        }
    };

    let mut tree = Vec::new();
    let mut seen = HashSet::new();
    let mut pending = vec![root_info];

    while let Some(info) = pending.pop() {
        // pid reuse can make a stale listing loop back on itself
        if !seen.insert(info.pid) {
            continue;
        }
        let mut children = source.list_child_processes(info.pid).unwrap_or_else(|e| {
            debug!("Cannot list children of {}: {e:#}", info.pid);
            Vec::new()
        });
        // reversed so the first child is visited first
        children.reverse();
        pending.extend(children);
        tree.push(info);
    }

    Some(tree)
}

/// `/proc`-backed process source
#[derive(Debug, Clone)]
pub struct ProcFs {
    page_size: u64,
    ticks_per_second: u64,
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcFs {
    #[must_use]
    pub fn new() -> Self {
        let (page_size, ticks_per_second) = system_units();
        Self { page_size, ticks_per_second }
    }

    fn read_stat(&self, pid: Pid) -> Result<ProcessInfo> {
        let stat_path = format!("/proc/{}/stat", pid.0);
        let content = std::fs::read_to_string(&stat_path)
            .with_context(|| format!("Failed to read {stat_path}"))?;
        parse_stat(&content, self.page_size, self.ticks_per_second)
    }
}

/// Page size in bytes and clock ticks per second
#[cfg(unix)]
fn system_units() -> (u64, u64) {
    fn sysconf_or(name: libc::c_int, fallback: u64) -> u64 {
        // SAFETY: sysconf only reads a system configuration value.
        let value = unsafe { libc::sysconf(name) };
        u64::try_from(value).ok().filter(|&v| v > 0).unwrap_or(fallback)
    }
    (sysconf_or(libc::_SC_PAGESIZE, 4096), sysconf_or(libc::_SC_CLK_TCK, 100))
}

#[cfg(not(unix))]
fn system_units() -> (u64, u64) {
    (4096, 100)
}

impl ProcFs {
    /// Read every `/proc/<pid>/stat` once.
    ///
    /// # Errors
    /// Returns an error if `/proc` cannot be listed.
    pub fn table(&self) -> Result<ProcessTable> {
        if !cfg!(target_os = "linux") {
            bail!("Process sampling requires /proc");
        }
        let proc_dir = std::fs::read_dir("/proc").context("Failed to read /proc")?;

        let processes = proc_dir
            .flatten()
            .filter_map(|entry| entry.file_name().to_string_lossy().parse::<u32>().ok())
            // processes can exit between listing and reading
            .filter_map(|candidate| self.read_stat(Pid(candidate)).ok());

        Ok(ProcessTable::from_processes(processes))
    }
}

impl ProcessSource for ProcFs {
    fn process(&self, pid: Pid) -> Result<ProcessInfo> {
        if !cfg!(target_os = "linux") {
            bail!("Process sampling requires /proc");
        }
        self.read_stat(pid)
    }

    fn list_child_processes(&self, pid: Pid) -> Result<Vec<ProcessInfo>> {
        self.table()?.list_child_processes(pid)
    }

    fn process_tree(&self, root: Pid) -> Option<Vec<ProcessInfo>> {
        match self.table() {
            Ok(table) => collect_tree(&table, root),
            Err(e) => {
                debug!("Cannot sample {root}: {e:#}");
                None
            }
        }
    }
}

/// Snapshot of the process table with a parent-to-children index
#[derive(Debug, Clone, Default)]
pub struct ProcessTable {
    processes: HashMap<Pid, ProcessInfo>,
    children: HashMap<Pid, Vec<Pid>>,
}

impl ProcessTable {
    #[must_use]
    pub fn from_processes(processes: impl IntoIterator<Item = ProcessInfo>) -> Self {
        let mut table = Self::default();
        for info in processes {
            table.children.entry(info.parent).or_default().push(info.pid);
            table.processes.insert(info.pid, info);
        }
        for pids in table.children.values_mut() {
            pids.sort_by_key(|pid| pid.0);
        }
        table
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.processes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}

impl ProcessSource for ProcessTable {
    fn process(&self, pid: Pid) -> Result<ProcessInfo> {
        self.processes.get(&pid).cloned().with_context(|| format!("{pid} is not running"))
    }

    fn list_child_processes(&self, pid: Pid) -> Result<Vec<ProcessInfo>> {
        Ok(self
            .children
            .get(&pid)
            .into_iter()
            .flatten()
            .filter_map(|child| self.processes.get(child).cloned())
            .collect())
    }
}

/// Extract command name from `/proc/<pid>/stat`.
/// Format: "pid (comm) state ..."
fn extract_comm(stat_line: &str) -> Result<(&str, &str)> {
    let open = stat_line.find('(').context("Invalid stat format")?;
    let close = stat_line.rfind(')').context("Invalid stat format")?;
    if open >= close {
        bail!("Invalid stat format");
    }
    Ok((&stat_line[open + 1..close], &stat_line[close + 1..]))
}

/// Parse one `/proc/<pid>/stat` line.
///
/// Field numbers below follow proc(5): ppid is field 4, utime 14, stime 15,
/// `num_threads` 20 and rss (in pages) 24. The fields after the command name
/// start at field 3.
fn parse_stat(stat_line: &str, page_size: u64, ticks_per_second: u64) -> Result<ProcessInfo> {
    let pid: u32 = stat_line
        .split_whitespace()
        .next()
        .context("Empty stat line")?
        .parse()
        .context("Invalid pid in stat line")?;
    let (name, rest) = extract_comm(stat_line)?;
    let fields: Vec<&str> = rest.split_whitespace().collect();

    let field = |number: usize| -> Result<u64> {
        let raw = fields.get(number - 3).with_context(|| format!("Missing stat field {number}"))?;
        raw.parse().with_context(|| format!("Invalid stat field {number}: {raw}"))
    };

    let parent = u32::try_from(field(4)?).context("Invalid parent pid")?;
    let cpu_ticks = field(14)? + field(15)?;
    let ticks_per_second = ticks_per_second.max(1);

    Ok(ProcessInfo {
        pid: Pid(pid),
        parent: Pid(parent),
        name: name.to_string(),
        working_set_bytes: field(24)? * page_size,
        thread_count: field(20)?,
        cpu_time: Duration::from_secs(cpu_ticks / ticks_per_second)
            + Duration::from_nanos((cpu_ticks % ticks_per_second) * 1_000_000_000 / ticks_per_second),
    })
}
