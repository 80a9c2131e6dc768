//! # Resource Sampler
//!
//! Polls the current process tree on a timer and reports resource usage as a
//! stream of [`ResourceChange`] values.
//!
//! ## Change Detection
//!
//! - **CPU**: reported every tick from the second tick on. The first tick only
//!   establishes the CPU-time baseline.
//! - **Memory**, **threads**, **process list**: reported only when the value
//!   differs from the previous tick (the first tick always reports).
//!
//! Comparisons live in [`SamplerState`], which is owned by the sampler thread
//! and needs no locking.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;

use super::cpu_utils::online_cpu_count;
use super::process_tree::{ProcessInfo, ProcessSource};
use crate::domain::Pid;
use crate::timer::PeriodicTask;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Aggregate usage of a process tree at one instant
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSnapshot {
    pub taken_at: Instant,
    pub cpu_time: Duration,
    pub memory_mb: u64,
    pub thread_count: u64,
    /// Comma-joined names of descendant processes (the root is excluded)
    pub process_names: String,
}

impl ResourceSnapshot {
    /// Aggregate a depth-first tree whose first element is the root process.
    #[must_use]
    pub fn from_tree(tree: &[ProcessInfo], taken_at: Instant) -> Self {
        let working_set: u64 = tree.iter().map(|p| p.working_set_bytes).sum();
        let names: Vec<&str> = tree.iter().skip(1).map(|p| p.name.as_str()).collect();
        Self {
            taken_at,
            cpu_time: tree.iter().map(|p| p.cpu_time).sum(),
            memory_mb: working_set / BYTES_PER_MB,
            thread_count: tree.iter().map(|p| p.thread_count).sum(),
            process_names: names.join(","),
        }
    }
}

/// One changed value
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceChange {
    /// CPU usage over the last interval, 0-100 across all online CPUs
    CpuPercent(f32),
    MemoryMb(u64),
    Threads(u64),
    Processes(String),
}

/// Last-seen values and change detection
#[derive(Debug)]
pub struct SamplerState {
    cpus: usize,
    previous: Option<ResourceSnapshot>,
}

impl SamplerState {
    #[must_use]
    pub fn new(cpus: usize) -> Self {
        Self { cpus: cpus.max(1), previous: None }
    }

    /// Compare `snapshot` against the previous tick and return what changed.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn observe(&mut self, snapshot: ResourceSnapshot) -> Vec<ResourceChange> {
        let mut changes = Vec::new();

        match &self.previous {
            None => {
                changes.push(ResourceChange::MemoryMb(snapshot.memory_mb));
                changes.push(ResourceChange::Threads(snapshot.thread_count));
                changes.push(ResourceChange::Processes(snapshot.process_names.clone()));
            }
            Some(prev) => {
                let wall = snapshot.taken_at.saturating_duration_since(prev.taken_at);
                let busy = snapshot.cpu_time.saturating_sub(prev.cpu_time);
                let capacity = wall.as_secs_f64() * self.cpus as f64;
                let percent =
                    if capacity > 0.0 { busy.as_secs_f64() / capacity * 100.0 } else { 0.0 };
                changes.push(ResourceChange::CpuPercent(percent as f32));

                if snapshot.memory_mb != prev.memory_mb {
                    changes.push(ResourceChange::MemoryMb(snapshot.memory_mb));
                }
                if snapshot.thread_count != prev.thread_count {
                    changes.push(ResourceChange::Threads(snapshot.thread_count));
                }
                if snapshot.process_names != prev.process_names {
                    changes.push(ResourceChange::Processes(snapshot.process_names.clone()));
                }
            }
        }

        self.previous = Some(snapshot);
        changes
    }
}

/// Timer-driven sampler of a process tree
pub struct ResourceSampler {
    task: PeriodicTask,
}

impl ResourceSampler {
    /// Start sampling `pid` and its descendants every `interval`.
    ///
    /// `on_change` runs on the sampler thread, once per changed value.
    ///
    /// # Errors
    /// Returns an error if the sampler thread cannot be spawned.
    pub fn start<F>(
        interval: Duration,
        source: Arc<dyn ProcessSource>,
        pid: Pid,
        mut on_change: F,
    ) -> std::io::Result<Self>
    where
        F: FnMut(ResourceChange) -> std::ops::ControlFlow<()> + Send + 'static,
    {
        let mut state = SamplerState::new(online_cpu_count());

        let task = PeriodicTask::spawn("scopelog-sampler", interval, move || {
            let Some(tree) = source.process_tree(pid) else {
                debug!("Skipping sample: {pid} could not be read");
                return std::ops::ControlFlow::Continue(());
            };
            let snapshot = ResourceSnapshot::from_tree(&tree, Instant::now());
            for change in state.observe(snapshot) {
                if on_change(change).is_break() {
                    return std::ops::ControlFlow::Break(());
                }
            }
            std::ops::ControlFlow::Continue(())
        })?;

        Ok(Self { task })
    }

    /// Stop the timer. No callback runs after this returns.
    pub fn stop(&mut self) {
        self.task.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(at: Instant, cpu_ms: u64, memory_mb: u64, threads: u64, names: &str) -> ResourceSnapshot {
        ResourceSnapshot {
            taken_at: at,
            cpu_time: Duration::from_millis(cpu_ms),
            memory_mb,
            thread_count: threads,
            process_names: names.to_string(),
        }
    }

    fn memory_changes(changes: &[ResourceChange]) -> Vec<u64> {
        changes
            .iter()
            .filter_map(|c| match c {
                ResourceChange::MemoryMb(mb) => Some(*mb),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_first_tick_has_no_cpu() {
        let mut state = SamplerState::new(1);
        let changes = state.observe(snapshot(Instant::now(), 500, 10, 4, ""));
        assert!(!changes.iter().any(|c| matches!(c, ResourceChange::CpuPercent(_))));
        assert_eq!(
            changes,
            vec![
                ResourceChange::MemoryMb(10),
                ResourceChange::Threads(4),
                ResourceChange::Processes(String::new()),
            ]
        );
    }

    #[test]
    fn test_cpu_reported_every_later_tick() {
        let start = Instant::now();
        let mut state = SamplerState::new(2);
        state.observe(snapshot(start, 0, 10, 4, ""));
        let changes = state.observe(snapshot(start + Duration::from_secs(1), 500, 10, 4, ""));
        // 0.5s of CPU over 1s on 2 CPUs
        assert_eq!(changes, vec![ResourceChange::CpuPercent(25.0)]);

        let changes = state.observe(snapshot(start + Duration::from_secs(2), 500, 10, 4, ""));
        assert_eq!(changes, vec![ResourceChange::CpuPercent(0.0)]);
    }

    #[test]
    fn test_memory_only_reported_on_change() {
        let start = Instant::now();
        let mut state = SamplerState::new(1);
        let mut reported = Vec::new();
        for (i, mb) in [100, 100, 150].into_iter().enumerate() {
            let at = start + Duration::from_secs(i as u64);
            reported.extend(memory_changes(&state.observe(snapshot(at, 0, mb, 1, ""))));
        }
        assert_eq!(reported, vec![100, 150]);
    }

    #[test]
    fn test_process_list_change() {
        let start = Instant::now();
        let mut state = SamplerState::new(1);
        state.observe(snapshot(start, 0, 1, 1, ""));
        let changes = state.observe(snapshot(start + Duration::from_secs(1), 0, 1, 3, "git,ssh"));
        assert!(changes.contains(&ResourceChange::Threads(3)));
        assert!(changes.contains(&ResourceChange::Processes("git,ssh".to_string())));
    }

    #[test]
    fn test_snapshot_aggregates_tree() {
        let tree = vec![
            ProcessInfo {
                pid: Pid(1),
                parent: Pid(0),
                name: "script".to_string(),
                working_set_bytes: 60 * BYTES_PER_MB,
                thread_count: 8,
                cpu_time: Duration::from_millis(300),
            },
            ProcessInfo {
                pid: Pid(2),
                parent: Pid(1),
                name: "cargo".to_string(),
                working_set_bytes: 40 * BYTES_PER_MB + 512,
                thread_count: 2,
                cpu_time: Duration::from_millis(200),
            },
            ProcessInfo {
                pid: Pid(3),
                parent: Pid(2),
                name: "rustc".to_string(),
                working_set_bytes: 0,
                thread_count: 1,
                cpu_time: Duration::ZERO,
            },
        ];
        let snap = ResourceSnapshot::from_tree(&tree, Instant::now());
        assert_eq!(snap.memory_mb, 100);
        assert_eq!(snap.thread_count, 11);
        assert_eq!(snap.cpu_time, Duration::from_millis(500));
        assert_eq!(snap.process_names, "cargo,rustc");
    }
}
