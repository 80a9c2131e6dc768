use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use scopelog::config::TelemetryConfig;
use scopelog::context::{TelemetryContext, MEMORY_KEY, PROCESSES_KEY, THREADS_KEY};
use scopelog::domain::{LogLevel, Pid};
use scopelog::eventlog::decode_compressed;
use scopelog::sampling::{ProcessInfo, ProcessSource};
use scopelog_common::{Record, RecordKind};

const MB: u64 = 1024 * 1024;

/// Reports a scripted memory sequence, repeating the last value
struct ScriptedMemory {
    sequence_mb: Vec<u64>,
    calls: AtomicUsize,
}

impl ScriptedMemory {
    fn new(sequence_mb: &[u64]) -> Self {
        Self { sequence_mb: sequence_mb.to_vec(), calls: AtomicUsize::new(0) }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ProcessSource for ScriptedMemory {
    fn process(&self, pid: Pid) -> Result<ProcessInfo> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let mb = self
            .sequence_mb
            .get(call)
            .or(self.sequence_mb.last())
            .copied()
            .context("empty sequence")?;
        Ok(ProcessInfo {
            pid,
            parent: Pid(1),
            name: "script".to_string(),
            working_set_bytes: mb * MB,
            thread_count: 4,
            cpu_time: Duration::ZERO,
        })
    }

    fn list_child_processes(&self, _pid: Pid) -> Result<Vec<ProcessInfo>> {
        Ok(Vec::new())
    }
}

fn sampled_config() -> TelemetryConfig {
    TelemetryConfig { sample_interval_ms: 5, ..TelemetryConfig::manual() }
}

fn wait_for(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for sampler");
        std::thread::sleep(Duration::from_millis(2));
    }
}

fn values(records: &[Record], wanted: &str) -> Vec<f32> {
    records
        .iter()
        .filter_map(|r| match r {
            Record::EntityValue { key, value, .. } if key == wanted => Some(*value),
            _ => None,
        })
        .collect()
}

#[test]
fn test_unchanged_memory_is_not_rewritten() {
    let source = Arc::new(ScriptedMemory::new(&[100, 100, 150]));
    let telemetry =
        TelemetryContext::with_sink(Vec::new(), &sampled_config(), source.clone()).unwrap();

    wait_for(|| source.calls() >= 4);
    let records = decode_compressed(&telemetry.dispose().unwrap()).unwrap();

    assert_eq!(values(&records, MEMORY_KEY), vec![100.0, 150.0]);
    assert_eq!(values(&records, THREADS_KEY), vec![4.0]);

    let process_params = records
        .iter()
        .filter(|r| matches!(r, Record::EntityParameter { key, .. } if key == PROCESSES_KEY))
        .count();
    assert_eq!(process_params, 1);

    // everything sampled lands on the auto-registered root entity
    let Some(Record::EntityDef { def, .. }) = records.first() else {
        panic!("root entity should be defined first");
    };
    assert_eq!(def.name, "root");
    let root = def.id;
    assert!(records
        .iter()
        .filter(|r| r.kind() == RecordKind::EntityValue)
        .all(|r| r.entity() == Some(root)));
}

#[test]
fn test_dispose_writes_closing_frame_last() {
    let source = Arc::new(ScriptedMemory::new(&[10]));
    let config = TelemetryConfig { frame_interval_ms: 5, ..sampled_config() };
    let telemetry = TelemetryContext::with_sink(Vec::new(), &config, source.clone()).unwrap();

    wait_for(|| source.calls() >= 2 && telemetry.writer().frame().0 >= 2);
    {
        let _scope = telemetry.begin_scope("work");
        telemetry.log(LogLevel::Debug, "working").unwrap();
    }
    let records = decode_compressed(&telemetry.dispose().unwrap()).unwrap();

    assert!(matches!(records.last(), Some(Record::FrameStep { .. })));
    let frames: Vec<u64> = records.iter().filter_map(Record::frame).collect();
    assert!(frames.windows(2).all(|w| w[0] <= w[1]), "frames went backwards: {frames:?}");
}

#[test]
fn test_log_without_scope_goes_to_root() {
    let source = Arc::new(ScriptedMemory::new(&[1]));
    let telemetry =
        TelemetryContext::with_sink(Vec::new(), &TelemetryConfig::manual(), source).unwrap();
    telemetry.log(LogLevel::Error, "no scope").unwrap();
    let records = decode_compressed(&telemetry.dispose().unwrap()).unwrap();

    assert!(matches!(&records[0], Record::EntityDef { def, .. } if def.name == "root"));
    assert!(matches!(
        &records[1],
        Record::EntityLog { category, message, .. } if category == "Error" && message == "no scope"
    ));
    assert!(!records.iter().any(|r| r.kind() == RecordKind::EntityValue));
}

#[test]
fn test_invalid_config_rejected() {
    let config = TelemetryConfig { compression_level: 11, ..TelemetryConfig::manual() };
    let result =
        TelemetryContext::with_sink(Vec::new(), &config, Arc::new(ScriptedMemory::new(&[1])));
    assert!(result.is_err());
}
