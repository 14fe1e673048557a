//! The commit boundary: turns a complete assignment into a store diff and
//! defines the write port it goes through.
//!
//! The diff deletes every provisional row of the assigned subjects for the
//! period and inserts one row per session. Both halves apply atomically or
//! not at all; everything before this point is side-effect free.

use crate::candidates::CandidateSet;
use crate::data::{CommittedSession, GroupId, ScheduleId, Snapshot, SubjectId};
use crate::error::SolveError;
use crate::loader::{self, SessionRow};
use itertools::Itertools;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleDiff {
    pub semester: String,
    pub school_year: String,
    /// Subjects whose provisional rows for the period are dropped.
    pub to_delete: Vec<SubjectId>,
    pub to_insert: Vec<SessionRow>,
}

/// Renders the assignment as a diff against the persisted schedule.
pub fn build_diff(
    assignment: &HashMap<SubjectId, GroupId>,
    set: &CandidateSet,
    snapshot: &Snapshot,
) -> ScheduleDiff {
    let to_delete: Vec<SubjectId> = assignment.keys().copied().sorted().collect();
    let to_insert: Vec<SessionRow> = to_delete
        .iter()
        .flat_map(|subject_id| &set.group(assignment[subject_id]).sessions)
        .sorted_by_key(|s| (s.subject_id, s.day, s.start))
        .map(|s| SessionRow {
            schedule_id: None,
            subject_id: s.subject_id,
            instructor_id: s.instructor_id,
            room_id: s.room_id,
            day_of_week: s.day.name().to_string(),
            start_time: crate::time::fmt_hhmm(s.start),
            end_time: crate::time::fmt_hhmm(s.end),
            semester: Some(snapshot.semester.clone()),
            school_year: Some(snapshot.school_year.clone()),
            approved: serde_json::Value::Null,
        })
        .collect();
    info!(
        "diff for {} {}: replace provisional rows of {} subjects with {} sessions",
        snapshot.semester,
        snapshot.school_year,
        to_delete.len(),
        to_insert.len()
    );
    ScheduleDiff {
        semester: snapshot.semester.clone(),
        school_year: snapshot.school_year.clone(),
        to_delete,
        to_insert,
    }
}

/// Write port for the persisted schedule. Implementations apply the whole
/// diff or none of it.
pub trait ScheduleStore {
    fn apply(&mut self, diff: &ScheduleDiff) -> Result<(), SolveError>;
}

#[derive(Debug, Clone)]
pub struct StoredRow {
    pub session: CommittedSession,
    pub semester: String,
    pub school_year: String,
}

/// In-memory store used by the tests and as the reference implementation of
/// the port's delete-then-insert contract.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Vec<StoredRow>,
    next_id: ScheduleId,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    pub fn rows(&self) -> &[StoredRow] {
        &self.rows
    }

    pub fn approve_all(&mut self) {
        for row in &mut self.rows {
            row.session.approved = true;
        }
    }

    /// Renders the store back into wire rows, as the input port would see it.
    pub fn session_rows(&self) -> Vec<SessionRow> {
        self.rows
            .iter()
            .map(|r| SessionRow {
                schedule_id: Some(r.session.schedule_id),
                subject_id: r.session.subject_id,
                instructor_id: r.session.instructor_id,
                room_id: r.session.room_id,
                day_of_week: r.session.day.name().to_string(),
                start_time: crate::time::fmt_hhmm(r.session.start),
                end_time: crate::time::fmt_hhmm(r.session.end),
                semester: Some(r.semester.clone()),
                school_year: Some(r.school_year.clone()),
                approved: if r.session.approved {
                    serde_json::Value::from(1)
                } else {
                    serde_json::Value::Null
                },
            })
            .collect()
    }
}

impl ScheduleStore for MemoryStore {
    fn apply(&mut self, diff: &ScheduleDiff) -> Result<(), SolveError> {
        // stage every insert before touching the rows; a bad row rejects the
        // whole diff
        let mut staged = Vec::with_capacity(diff.to_insert.len());
        for (i, row) in diff.to_insert.iter().enumerate() {
            let mut session = loader::parse_session_row(row, i)
                .map_err(|e| SolveError::Boundary(format!("rejected insert: {e}")))?;
            session.schedule_id = self.next_id + i as ScheduleId;
            session.approved = false;
            staged.push(StoredRow {
                session,
                semester: diff.semester.clone(),
                school_year: diff.school_year.clone(),
            });
        }
        self.next_id += staged.len() as ScheduleId;

        self.rows.retain(|r| {
            !(diff.to_delete.contains(&r.session.subject_id)
                && r.semester == diff.semester
                && r.school_year == diff.school_year
                && !r.session.approved)
        });
        self.rows.extend(staged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Day;

    fn insert_row(subject_id: u32, day: &str, start: &str, end: &str) -> SessionRow {
        SessionRow {
            schedule_id: None,
            subject_id,
            instructor_id: 10,
            room_id: 100,
            day_of_week: day.into(),
            start_time: start.into(),
            end_time: end.into(),
            semester: Some("1st".into()),
            school_year: Some("2025-2026".into()),
            approved: serde_json::Value::Null,
        }
    }

    fn diff(to_delete: Vec<u32>, to_insert: Vec<SessionRow>) -> ScheduleDiff {
        ScheduleDiff {
            semester: "1st".into(),
            school_year: "2025-2026".into(),
            to_delete,
            to_insert,
        }
    }

    #[test]
    fn apply_replaces_provisional_rows() {
        let mut store = MemoryStore::new();
        store
            .apply(&diff(vec![], vec![insert_row(1, "Monday", "08:00", "09:00")]))
            .unwrap();
        assert_eq!(store.rows().len(), 1);

        // regenerating subject 1 drops the provisional row first
        store
            .apply(&diff(vec![1], vec![insert_row(1, "Wednesday", "09:00", "10:00")]))
            .unwrap();
        assert_eq!(store.rows().len(), 1);
        assert_eq!(store.rows()[0].session.day, Day::Wednesday);
    }

    #[test]
    fn approved_rows_survive_regeneration() {
        let mut store = MemoryStore::new();
        store
            .apply(&diff(vec![], vec![insert_row(1, "Monday", "08:00", "09:00")]))
            .unwrap();
        store.approve_all();
        store
            .apply(&diff(vec![1], vec![insert_row(1, "Friday", "10:00", "11:00")]))
            .unwrap();
        assert_eq!(store.rows().len(), 2);
    }

    #[test]
    fn malformed_insert_rejects_whole_diff() {
        let mut store = MemoryStore::new();
        let bad = diff(
            vec![],
            vec![
                insert_row(1, "Monday", "08:00", "09:00"),
                insert_row(2, "Noday", "08:00", "09:00"),
            ],
        );
        let err = store.apply(&bad).unwrap_err();
        assert!(matches!(err, SolveError::Boundary(_)));
        assert!(store.rows().is_empty());
    }
}
