use std::sync::Arc;

use scopelog::config::TelemetryConfig;
use scopelog::context::TelemetryContext;
use scopelog::domain::{EntityKey, LogLevel};
use scopelog::eventlog::{decode_compressed, read_log, EntityInfo, EventLogWriter, WriterOptions};
use scopelog::sampling::ProcFs;
use scopelog_common::{LogColor, Record};

#[test]
fn test_single_scope_stream() {
    let telemetry =
        TelemetryContext::with_sink(Vec::new(), &TelemetryConfig::manual(), Arc::new(ProcFs::new()))
            .expect("Failed to create context");

    telemetry.writer().step_frame(0.0).unwrap();
    {
        let _a = telemetry.begin_scope("A");
        telemetry.log(LogLevel::Information, "hello").unwrap();
    }
    let bytes = telemetry.dispose().expect("Stream should be closed by dispose");
    let records = decode_compressed(&bytes).expect("Failed to decode stream");

    assert_eq!(records.len(), 5, "unexpected records: {records:#?}");
    assert_eq!(records[0], Record::FrameStep { elapsed: 0.0 });

    match &records[1] {
        Record::EntityDef { frame, entity, def } => {
            assert_eq!(*frame, 0);
            assert_eq!(*entity, 1);
            assert_eq!(def.id, 1);
            assert_eq!(def.name, "A");
            assert_eq!(def.path, "A");
            assert_eq!(def.type_name, "Scope");
            assert_eq!(def.static_params, vec![("depth".to_string(), "1".to_string())]);
        }
        other => panic!("expected EntityDef, got {other:?}"),
    }

    assert_eq!(
        records[2],
        Record::EntityLog {
            frame: 0,
            entity: 1,
            category: "Information".to_string(),
            message: "hello".to_string(),
            color: LogColor::White,
        }
    );
    assert_eq!(records[3], Record::EntityUndef { frame: 0, entity: 1 });
    assert!(matches!(records[4], Record::FrameStep { elapsed } if elapsed >= 0.0));
}

#[test]
fn test_entity_def_round_trip() {
    let writer = EventLogWriter::new(Vec::new(), WriterOptions::default()).unwrap();
    let info = EntityInfo::named("deploy")
        .path("release/deploy")
        .type_name("Stage")
        .category("pipeline")
        .static_param("region", "eu-west-1")
        .static_param("attempt", "2");
    writer.register_entity(EntityKey(42), info).unwrap();

    let records = decode_compressed(&writer.close().unwrap().unwrap()).unwrap();
    let Record::EntityDef { def, .. } = &records[0] else {
        panic!("expected EntityDef, got {:?}", records[0]);
    };
    assert_eq!(def.name, "deploy");
    assert_eq!(def.path, "release/deploy");
    assert_eq!(def.type_name, "Stage");
    assert_eq!(def.category, "pipeline");
    assert_eq!(
        def.static_params,
        vec![
            ("region".to_string(), "eu-west-1".to_string()),
            ("attempt".to_string(), "2".to_string()),
        ]
    );
}

#[test]
fn test_log_file_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.scopelog");
    let config = TelemetryConfig { write_header: true, ..TelemetryConfig::manual() };

    let telemetry = TelemetryContext::create(&path, &config).unwrap();
    {
        let _outer = telemetry.begin_scope("build");
        let _inner = telemetry.begin_scope("compile");
        telemetry.log(LogLevel::Warning, "slow crate").unwrap();
    }
    telemetry.dispose();

    let records = read_log(&path).expect("Failed to read log file");
    assert!(matches!(&records[0], Record::Header { magic, version: 1 } if magic == "SCOPELOG"));

    let inner = records
        .iter()
        .find_map(|r| match r {
            Record::EntityDef { def, .. } if def.name == "compile" => Some(def.clone()),
            _ => None,
        })
        .expect("inner scope should be defined");
    assert_eq!(inner.path, "build/compile");
    assert_eq!(inner.static_params, vec![("depth".to_string(), "2".to_string())]);

    let log = records.iter().find(|r| matches!(r, Record::EntityLog { .. })).unwrap();
    assert_eq!(log.entity(), Some(inner.id));
    assert!(matches!(records.last(), Some(Record::FrameStep { .. })));
}
