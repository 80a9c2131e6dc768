//! Human-readable views of a decoded event log
//!
//! Used by the `scopelog dump` and `scopelog summary` commands.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;

use anyhow::Result;
use scopelog_common::{Record, RecordKind};

/// Render one record as a single text line.
#[must_use]
pub fn format_record(record: &Record) -> String {
    match record {
        Record::Header { magic, version } => format!("HEADER       {magic} v{version}"),
        Record::FrameStep { elapsed } => format!("FRAME_STEP   elapsed={elapsed:.3}s"),
        Record::EntityDef { frame, entity, def } => {
            let mut line = format!(
                "ENTITY_DEF   frame={frame} entity={entity} name={:?} path={:?} type={:?} category={:?}",
                def.name, def.path, def.type_name, def.category
            );
            for (key, value) in &def.static_params {
                line.push_str(&format!(" {key}={value:?}"));
            }
            line
        }
        Record::EntityUndef { frame, entity } => format!("ENTITY_UNDEF frame={frame} entity={entity}"),
        Record::EntitySetPos { frame, entity, position } => {
            format!("SET_POS      frame={frame} entity={entity} position={position:?}")
        }
        Record::EntitySetTransform { frame, entity, transform } => format!(
            "SET_XFORM    frame={frame} entity={entity} translation={:?} rotation={:?}",
            transform.translation, transform.rotation
        ),
        Record::EntityLog { frame, entity, category, message, color } => {
            format!("LOG          frame={frame} entity={entity} [{category}] {message:?} ({color:?})")
        }
        Record::EntityParameter { frame, entity, key, value } => {
            format!("PARAM        frame={frame} entity={entity} {key:?}={value:?}")
        }
        Record::EntityValue { frame, entity, key, value } => {
            format!("VALUE        frame={frame} entity={entity} {key:?}={value}")
        }
    }
}

/// Keep records that belong to `entity`. With `None`, everything is kept.
pub fn filter_entity(records: Vec<Record>, entity: Option<u64>) -> Vec<Record> {
    match entity {
        Some(id) => records.into_iter().filter(|r| r.entity() == Some(id)).collect(),
        None => records,
    }
}

/// Print records as text lines, or as one JSON object per line.
///
/// # Errors
/// Returns an error if the output cannot be written.
pub fn write_records(out: &mut impl Write, records: &[Record], json: bool) -> Result<()> {
    for record in records {
        if json {
            serde_json::to_writer(&mut *out, record)?;
            writeln!(out)?;
        } else {
            writeln!(out, "{}", format_record(record))?;
        }
    }
    Ok(())
}

/// Aggregate view of a whole log
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LogSummary {
    pub records: usize,
    pub frames: usize,
    /// Elapsed seconds of the last frame step
    pub duration: f32,
    pub entities_defined: usize,
    /// Entities defined but never undefined
    pub entities_open: usize,
    /// Deepest scope depth seen in entity static params
    pub max_depth: usize,
    pub counts: BTreeMap<&'static str, usize>,
}

impl LogSummary {
    #[must_use]
    pub fn from_records(records: &[Record]) -> Self {
        let mut summary = Self::default();
        let mut open = std::collections::HashSet::new();

        for record in records {
            summary.records += 1;
            *summary.counts.entry(record.kind().name()).or_default() += 1;

            match record {
                Record::FrameStep { elapsed } => {
                    summary.frames += 1;
                    summary.duration = *elapsed;
                }
                Record::EntityDef { entity, def, .. } => {
                    summary.entities_defined += 1;
                    open.insert(*entity);
                    let depth = def
                        .static_params
                        .iter()
                        .find(|(key, _)| key == "depth")
                        .and_then(|(_, value)| value.parse().ok())
                        .unwrap_or(0);
                    summary.max_depth = summary.max_depth.max(depth);
                }
                Record::EntityUndef { entity, .. } => {
                    open.remove(entity);
                }
                _ => {}
            }
        }

        summary.entities_open = open.len();
        summary
    }

    #[must_use]
    pub fn count(&self, kind: RecordKind) -> usize {
        self.counts.get(kind.name()).copied().unwrap_or(0)
    }
}

impl fmt::Display for LogSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Records:          {}", self.records)?;
        writeln!(f, "Frames:           {}", self.frames)?;
        writeln!(f, "Duration:         {:.3}s", self.duration)?;
        writeln!(f, "Entities defined: {}", self.entities_defined)?;
        writeln!(f, "Entities open:    {}", self.entities_open)?;
        writeln!(f, "Max scope depth:  {}", self.max_depth)?;
        writeln!(f)?;
        for (name, count) in &self.counts {
            writeln!(f, "  {name:<22} {count}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scopelog_common::{EntityDef, LogColor, Transform};

    fn def(entity: u64, depth: &str) -> Record {
        Record::EntityDef {
            frame: 0,
            entity,
            def: EntityDef {
                id: entity,
                name: format!("s{entity}"),
                path: String::new(),
                type_name: "Scope".to_string(),
                category: "scope".to_string(),
                transform: Transform::IDENTITY,
                static_params: vec![("depth".to_string(), depth.to_string())],
                creation_frame: 0,
            },
        }
    }

    fn sample_log() -> Vec<Record> {
        vec![
            Record::FrameStep { elapsed: 0.0 },
            def(1, "1"),
            def(2, "2"),
            Record::EntityLog {
                frame: 0,
                entity: 2,
                category: "Warning".to_string(),
                message: "slow".to_string(),
                color: LogColor::Yellow,
            },
            Record::EntityUndef { frame: 0, entity: 2 },
            Record::FrameStep { elapsed: 1.5 },
        ]
    }

    #[test]
    fn test_summary_counts() {
        let summary = LogSummary::from_records(&sample_log());
        assert_eq!(summary.records, 6);
        assert_eq!(summary.frames, 2);
        assert!((summary.duration - 1.5).abs() < f32::EPSILON);
        assert_eq!(summary.entities_defined, 2);
        assert_eq!(summary.entities_open, 1);
        assert_eq!(summary.max_depth, 2);
        assert_eq!(summary.count(RecordKind::EntityLog), 1);
        assert_eq!(summary.count(RecordKind::EntityValue), 0);
    }

    #[test]
    fn test_filter_entity() {
        let filtered = filter_entity(sample_log(), Some(2));
        assert_eq!(filtered.len(), 3);
        assert!(filtered.iter().all(|r| r.entity() == Some(2)));
        assert_eq!(filter_entity(sample_log(), None).len(), 6);
    }

    #[test]
    fn test_format_log_line() {
        let line = format_record(&sample_log()[3]);
        assert!(line.starts_with("LOG"));
        assert!(line.contains("entity=2"));
        assert!(line.contains("[Warning]"));
        assert!(line.contains("\"slow\""));
    }

    #[test]
    fn test_json_lines() {
        let mut out = Vec::new();
        write_records(&mut out, &sample_log()[..2], true).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<serde_json::Value> =
            text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["kind"], "FrameStep");
        assert_eq!(lines[1]["def"]["name"], "s1");
    }
}
