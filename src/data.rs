use crate::time::Minutes;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

// Type aliases for clarity
pub type SubjectId = u32;
pub type InstructorId = u32;
pub type RoomId = u32;
pub type ScheduleId = u32;
/// Index of a [Group] in the per-run candidate arena.
pub type GroupId = u32;

/// Day of the week as stored in the schedules table. Patterns only ever use
/// Monday through Friday; Saturday and Sunday exist for wire compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Day {
    pub const WEEKDAYS: [Day; 5] = [
        Day::Monday,
        Day::Tuesday,
        Day::Wednesday,
        Day::Thursday,
        Day::Friday,
    ];

    /// Parses the loose labels found in the store ("m", "Mon", "monday", ...).
    pub fn from_label(label: &str) -> Option<Day> {
        match label.trim().to_ascii_lowercase().as_str() {
            "m" | "mon" | "monday" => Some(Day::Monday),
            "t" | "tue" | "tues" | "tuesday" => Some(Day::Tuesday),
            "w" | "wed" | "wednesday" => Some(Day::Wednesday),
            "th" | "thu" | "thurs" | "thursday" => Some(Day::Thursday),
            "f" | "fri" | "friday" => Some(Day::Friday),
            "sat" | "saturday" => Some(Day::Saturday),
            "sun" | "sunday" => Some(Day::Sunday),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Day::Monday => "Monday",
            Day::Tuesday => "Tuesday",
            Day::Wednesday => "Wednesday",
            Day::Thursday => "Thursday",
            Day::Friday => "Friday",
            Day::Saturday => "Saturday",
            Day::Sunday => "Sunday",
        }
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Coarse subject classification; it decides the weekly pattern together
/// with the unit count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    Major,
    General,
}

impl Classification {
    /// Unknown labels normalize to General.
    pub fn from_label(label: &str) -> Classification {
        match label.trim().to_ascii_lowercase().as_str() {
            "major" => Classification::Major,
            _ => Classification::General,
        }
    }
}

/// Employment status drives the lunch-break and two-day rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmploymentStatus {
    Permanent,
    PartTime,
    Other,
}

impl EmploymentStatus {
    /// Unknown labels normalize to Other.
    pub fn from_label(label: &str) -> EmploymentStatus {
        match label.trim().to_ascii_lowercase().as_str() {
            "permanent" | "full-time" | "fulltime" | "full time" => EmploymentStatus::Permanent,
            "part-time" | "parttime" | "part time" => EmploymentStatus::PartTime,
            _ => EmploymentStatus::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomKind {
    Lecture,
    Lab,
}

impl RoomKind {
    pub fn other(self) -> RoomKind {
        match self {
            RoomKind::Lecture => RoomKind::Lab,
            RoomKind::Lab => RoomKind::Lecture,
        }
    }

    /// Room types in the store are free text ("Lab", "laboratory", ...).
    pub fn from_label(label: &str) -> RoomKind {
        let l = label.trim().to_ascii_lowercase();
        if l.starts_with("lab") {
            RoomKind::Lab
        } else {
            RoomKind::Lecture
        }
    }
}

/// A subject still waiting for a schedule this period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub subject_id: SubjectId,
    pub code: String,
    pub name: String,
    pub units: u32,
    /// Owning program tag; empty means unrestricted.
    pub program: String,
    pub classification: Classification,
    pub instructor_id: InstructorId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instructor {
    pub instructor_id: InstructorId,
    pub name: String,
    pub status: EmploymentStatus,
    /// Maximum weekly load in sessions.
    pub max_load: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub room_id: RoomId,
    pub room_number: String,
    pub room_type: RoomKind,
}

/// One weekly meeting of a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Session {
    pub subject_id: SubjectId,
    pub instructor_id: InstructorId,
    pub room_id: RoomId,
    pub day: Day,
    pub start: Minutes,
    pub end: Minutes,
}

/// A session row already persisted in the store, with its row id and
/// approval flag. Baseline sessions are the approved ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommittedSession {
    pub schedule_id: ScheduleId,
    pub subject_id: SubjectId,
    pub instructor_id: InstructorId,
    pub room_id: RoomId,
    pub day: Day,
    pub start: Minutes,
    pub end: Minutes,
    pub approved: bool,
}

/// A candidate weekly meeting-set for one subject: the CSP value.
///
/// Sessions share (subject, instructor) and realize one pattern; a major
/// combined group concatenates a lecture subgroup and a lab subgroup. The
/// canonical key orders groups deterministically and keys the compatibility
/// memo.
#[derive(Debug, Clone, Serialize)]
pub struct Group {
    pub subject_id: SubjectId,
    pub instructor_id: InstructorId,
    pub sessions: Vec<Session>,
    pub key: String,
}

impl Group {
    pub fn new(subject_id: SubjectId, instructor_id: InstructorId, sessions: Vec<Session>) -> Group {
        let key = canonical_key(&sessions);
        Group {
            subject_id,
            instructor_id,
            sessions,
            key,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Distinct days covered by this group.
    pub fn days(&self) -> BTreeSet<Day> {
        self.sessions.iter().map(|s| s.day).collect()
    }
}

/// Stable key over the session set: sorted (day, room, start, end) rows.
fn canonical_key(sessions: &[Session]) -> String {
    let mut rows: Vec<(u8, RoomId, Minutes, Minutes)> = sessions
        .iter()
        .map(|s| (s.day as u8, s.room_id, s.start, s.end))
        .collect();
    rows.sort_unstable();
    let mut key = String::with_capacity(rows.len() * 16);
    for (day, room, start, end) in rows {
        key.push_str(&format!("{day}:{room}:{start}:{end};"));
    }
    key
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConflictKind {
    InstructorDoubleBook,
    RoomDoubleBook,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictStatus {
    Unresolved,
    Resolved,
}

/// A detected double-booking between two committed sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub schedule1_id: ScheduleId,
    pub schedule2_id: ScheduleId,
    pub conflict_type: ConflictKind,
    pub description: String,
    pub recommendation: String,
    pub status: ConflictStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    SkippedSubject,
    EmptyDomain,
    Ac3Failure,
    SearchFailure,
    BudgetExhausted,
    CandidateException,
    RoomFallback,
}

/// Non-fatal structured record emitted while loading or solving.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<SubjectId>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, subject_id: Option<SubjectId>, message: String) -> Diagnostic {
        Diagnostic {
            kind,
            subject_id,
            message,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.subject_id {
            Some(sid) => write!(f, "[{:?}] subject {}: {}", self.kind, sid, self.message),
            None => write!(f, "[{:?}] {}", self.kind, self.message),
        }
    }
}

/// Engine knobs carried alongside the snapshot. All optional; defaults are
/// applied where the knob is consumed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SolveConfig {
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub node_budget: Option<u64>,
    #[serde(default)]
    pub domain_cap: Option<usize>,
    #[serde(default)]
    pub ac3_trim_threshold: Option<usize>,
    #[serde(default)]
    pub workers: Option<usize>,
}

/// Immutable, normalized input for one solver run.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub subjects: Vec<Subject>,
    pub instructors: Vec<Instructor>,
    pub rooms: Vec<Room>,
    pub room_programs: HashMap<RoomId, BTreeSet<String>>,
    /// Approved sessions for the same (semester, school year).
    pub baseline: Vec<CommittedSession>,
    pub semester: String,
    pub school_year: String,
    pub window_start: Minutes,
    pub window_end: Minutes,
    pub config: SolveConfig,
}

impl Snapshot {
    pub fn instructor(&self, id: InstructorId) -> Option<&Instructor> {
        self.instructors.iter().find(|i| i.instructor_id == id)
    }

    pub fn room(&self, id: RoomId) -> Option<&Room> {
        self.rooms.iter().find(|r| r.room_id == id)
    }

    pub fn subject(&self, id: SubjectId) -> Option<&Subject> {
        self.subjects.iter().find(|s| s.subject_id == id)
    }

    /// Programs a room is reserved for; empty set admits any program.
    pub fn programs_of(&self, room: RoomId) -> Option<&BTreeSet<String>> {
        self.room_programs.get(&room)
    }
}
