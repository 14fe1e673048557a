//! Normalizes one raw snapshot from the data source into the immutable
//! value types the engine runs on.
//!
//! The store is tolerant of loose day labels, "HH:MM"/"HH:MM:SS" times and
//! a mixed-type `approved` column; all of that is flattened here, once per
//! run. Subjects missing required fields are skipped with a diagnostic and
//! the run continues.

use crate::data::{
    Classification, CommittedSession, Day, Diagnostic, DiagnosticKind, EmploymentStatus,
    Instructor, InstructorId, Room, RoomId, RoomKind, ScheduleId, Snapshot, SolveConfig, Subject,
    SubjectId,
};
use crate::error::SolveError;
use crate::time::{self, Minutes};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Read port for the engine: anything able to produce one raw snapshot for
/// the target period.
pub trait SnapshotSource {
    fn load_snapshot(&mut self) -> Result<RawSnapshot, SolveError>;
}

/// JSON-file implementation of [SnapshotSource], used by the CLI.
pub struct JsonFileSource {
    path: std::path::PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<std::path::PathBuf>) -> JsonFileSource {
        JsonFileSource { path: path.into() }
    }
}

impl SnapshotSource for JsonFileSource {
    fn load_snapshot(&mut self) -> Result<RawSnapshot, SolveError> {
        let file = std::fs::File::open(&self.path)
            .map_err(|e| SolveError::Boundary(format!("cannot open {}: {e}", self.path.display())))?;
        serde_json::from_reader(std::io::BufReader::new(file)).map_err(|e| {
            SolveError::InputInvalid(format!("cannot parse {}: {e}", self.path.display()))
        })
    }
}

/// Snapshot as supplied by the input port, before normalization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSnapshot {
    #[serde(default)]
    pub subjects: Vec<RawSubject>,
    #[serde(default)]
    pub instructors: Vec<RawInstructor>,
    #[serde(default)]
    pub rooms: Vec<RawRoom>,
    /// room id -> program tags; an absent or empty entry admits any program.
    #[serde(default)]
    pub room_programs: HashMap<RoomId, Vec<String>>,
    #[serde(default)]
    pub approved_sessions: Vec<SessionRow>,
    #[serde(default)]
    pub semester: Option<String>,
    #[serde(default)]
    pub school_year: Option<String>,
    #[serde(default)]
    pub window_start: Option<Minutes>,
    #[serde(default)]
    pub window_end: Option<Minutes>,
    #[serde(flatten)]
    pub config: SolveConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSubject {
    pub subject_id: SubjectId,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub units: Option<u32>,
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub classification: Option<String>,
    #[serde(default)]
    pub instructor_id: Option<InstructorId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawInstructor {
    pub instructor_id: InstructorId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub max_load: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRoom {
    pub room_id: RoomId,
    #[serde(default)]
    pub room_number: Option<String>,
    #[serde(default)]
    pub room_type: Option<String>,
}

/// One schedule row in the store's wire layout, read back by the loader and
/// written out by the commit boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRow {
    #[serde(default)]
    pub schedule_id: Option<ScheduleId>,
    pub subject_id: SubjectId,
    pub instructor_id: InstructorId,
    pub room_id: RoomId,
    pub day_of_week: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub semester: Option<String>,
    #[serde(default)]
    pub school_year: Option<String>,
    /// The store holds 0, 1, "0", "1" or NULL here.
    #[serde(default)]
    pub approved: serde_json::Value,
}

fn approved_flag(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_i64() == Some(1),
        serde_json::Value::String(s) => s.trim() == "1",
        _ => false,
    }
}

/// Normalizes one wire row; the row index doubles as a fallback id.
pub fn parse_session_row(row: &SessionRow, index: usize) -> Result<CommittedSession, SolveError> {
    let day = Day::from_label(&row.day_of_week).ok_or_else(|| {
        SolveError::InputInvalid(format!(
            "session row {index}: unrecognized day '{}'",
            row.day_of_week
        ))
    })?;
    let start = time::parse_hhmm(&row.start_time).ok_or_else(|| {
        SolveError::InputInvalid(format!(
            "session row {index}: malformed start time '{}'",
            row.start_time
        ))
    })?;
    let end = time::parse_hhmm(&row.end_time).ok_or_else(|| {
        SolveError::InputInvalid(format!(
            "session row {index}: malformed end time '{}'",
            row.end_time
        ))
    })?;
    if end <= start {
        return Err(SolveError::InputInvalid(format!(
            "session row {index}: end {} not after start {}",
            row.end_time, row.start_time
        )));
    }
    Ok(CommittedSession {
        schedule_id: row.schedule_id.unwrap_or(index as ScheduleId),
        subject_id: row.subject_id,
        instructor_id: row.instructor_id,
        room_id: row.room_id,
        day,
        start,
        end,
        approved: approved_flag(&row.approved),
    })
}

/// Parses every persisted row, approved or not. The conflict detector runs
/// over this set.
pub fn committed_rows(raw: &RawSnapshot) -> Result<Vec<CommittedSession>, SolveError> {
    raw.approved_sessions
        .iter()
        .enumerate()
        .map(|(i, row)| parse_session_row(row, i))
        .collect()
}

/// Normalizes the raw snapshot into engine value types.
///
/// Terminal errors: missing semester/school year, missing or inverted
/// scheduling window, malformed session rows. Subjects lacking an
/// instructor or a unit count are skipped with a diagnostic instead.
pub fn load(raw: &RawSnapshot) -> Result<(Snapshot, Vec<Diagnostic>), SolveError> {
    let semester = raw
        .semester
        .clone()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| SolveError::InputInvalid("semester is required".into()))?;
    let school_year = raw
        .school_year
        .clone()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| SolveError::InputInvalid("school year is required".into()))?;

    let window_start = raw
        .window_start
        .ok_or_else(|| SolveError::InputInvalid("window start is required".into()))?;
    let window_end = raw
        .window_end
        .ok_or_else(|| SolveError::InputInvalid("window end is required".into()))?;
    if window_end <= window_start {
        return Err(SolveError::InputInvalid(format!(
            "window end {} not after window start {}",
            time::fmt_hhmm(window_end),
            time::fmt_hhmm(window_start)
        )));
    }

    let mut diagnostics = Vec::new();

    let instructors: Vec<Instructor> = raw
        .instructors
        .iter()
        .map(|i| {
            if i.max_load.is_none() {
                warn!(
                    "instructor {} has no max load; treating as 0",
                    i.instructor_id
                );
            }
            Instructor {
                instructor_id: i.instructor_id,
                name: i.name.clone().unwrap_or_default(),
                status: i
                    .status
                    .as_deref()
                    .map(EmploymentStatus::from_label)
                    .unwrap_or(EmploymentStatus::Other),
                max_load: i.max_load.unwrap_or(0),
            }
        })
        .collect();
    let known_instructors: HashSet<InstructorId> =
        instructors.iter().map(|i| i.instructor_id).collect();

    let rooms: Vec<Room> = raw
        .rooms
        .iter()
        .map(|r| Room {
            room_id: r.room_id,
            room_number: r.room_number.clone().unwrap_or_default(),
            room_type: r
                .room_type
                .as_deref()
                .map(RoomKind::from_label)
                .unwrap_or(RoomKind::Lecture),
        })
        .collect();

    let mut subjects = Vec::new();
    for s in &raw.subjects {
        let Some(units) = s.units.filter(|&u| u >= 1) else {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::SkippedSubject,
                Some(s.subject_id),
                "missing or zero units".into(),
            ));
            continue;
        };
        let Some(instructor_id) = s.instructor_id else {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::SkippedSubject,
                Some(s.subject_id),
                "no assigned instructor".into(),
            ));
            continue;
        };
        if !known_instructors.contains(&instructor_id) {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::SkippedSubject,
                Some(s.subject_id),
                format!("unknown instructor {instructor_id}"),
            ));
            continue;
        }
        subjects.push(Subject {
            subject_id: s.subject_id,
            code: s.code.clone().unwrap_or_default(),
            name: s.name.clone().unwrap_or_default(),
            units,
            program: s.program.clone().unwrap_or_default(),
            classification: s
                .classification
                .as_deref()
                .map(Classification::from_label)
                .unwrap_or(Classification::General),
            instructor_id,
        });
    }

    let room_programs: HashMap<RoomId, BTreeSet<String>> = raw
        .room_programs
        .iter()
        .map(|(room, programs)| (*room, programs.iter().cloned().collect()))
        .collect();

    // only approved rows form the baseline the generator must avoid
    let baseline: Vec<CommittedSession> = committed_rows(raw)?
        .into_iter()
        .filter(|row| row.approved)
        .collect();

    info!(
        "loaded snapshot for {} {}: {} schedulable subjects ({} skipped), {} instructors, {} rooms, {} baseline sessions",
        semester,
        school_year,
        subjects.len(),
        diagnostics.len(),
        instructors.len(),
        rooms.len(),
        baseline.len()
    );

    Ok((
        Snapshot {
            subjects,
            instructors,
            rooms,
            room_programs,
            baseline,
            semester,
            school_year,
            window_start,
            window_end,
            config: raw.config.clone(),
        },
        diagnostics,
    ))
}
