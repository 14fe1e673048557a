//! Deterministic double-booking detection over committed session rows.
//!
//! Runs independently of the solver: bucket by day, sort by start, scan each
//! session forward over the rows that begin before it ends. Reruns are
//! idempotent; merging into an existing conflict list never duplicates a
//! (row, row, kind) pair.

use crate::data::{
    CommittedSession, Conflict, ConflictKind, ConflictStatus, ScheduleId,
};
use crate::loader::RawSnapshot;
use crate::time;
use itertools::Itertools;
use log::info;
use std::collections::{HashMap, HashSet};

/// Id-to-name lookups for rendering conflict descriptions. Rows referencing
/// entities outside the snapshot fall back to their numeric id.
#[derive(Debug, Default)]
pub struct NameDirectory {
    instructors: HashMap<u32, String>,
    rooms: HashMap<u32, String>,
    subjects: HashMap<u32, String>,
}

impl NameDirectory {
    pub fn from_raw(raw: &RawSnapshot) -> NameDirectory {
        NameDirectory {
            instructors: raw
                .instructors
                .iter()
                .filter_map(|i| Some((i.instructor_id, i.name.clone()?)))
                .collect(),
            rooms: raw
                .rooms
                .iter()
                .filter_map(|r| Some((r.room_id, r.room_number.clone()?)))
                .collect(),
            subjects: raw
                .subjects
                .iter()
                .filter_map(|s| Some((s.subject_id, s.name.clone()?)))
                .collect(),
        }
    }

    fn instructor(&self, id: u32) -> String {
        self.instructors
            .get(&id)
            .cloned()
            .unwrap_or_else(|| format!("instructor {id}"))
    }

    fn room(&self, id: u32) -> String {
        self.rooms
            .get(&id)
            .cloned()
            .unwrap_or_else(|| format!("room {id}"))
    }

    fn subject(&self, id: u32) -> String {
        self.subjects
            .get(&id)
            .cloned()
            .unwrap_or_else(|| format!("subject {id}"))
    }
}

/// Scans the committed rows and returns every double-booking, at most one
/// record per (row, row, kind) pair. Two calls over the same rows return the
/// same conflicts in the same order.
pub fn detect(rows: &[CommittedSession], names: &NameDirectory) -> Vec<Conflict> {
    let mut conflicts = Vec::new();
    let mut seen: HashSet<(ScheduleId, ScheduleId, ConflictKind)> = HashSet::new();

    let by_day = rows.iter().map(|r| (r.day, r)).into_group_map();
    for day in by_day.keys().copied().sorted() {
        let mut sessions = by_day[&day].clone();
        sessions.sort_by_key(|s| (s.start, s.schedule_id));

        for i in 0..sessions.len() {
            let current = sessions[i];
            for &other in &sessions[i + 1..] {
                // sorted by start, so the first gap ends the scan
                if other.start >= current.end {
                    break;
                }
                if current.instructor_id == other.instructor_id {
                    push_conflict(
                        &mut conflicts,
                        &mut seen,
                        current,
                        other,
                        ConflictKind::InstructorDoubleBook,
                        names,
                    );
                }
                if current.room_id == other.room_id {
                    push_conflict(
                        &mut conflicts,
                        &mut seen,
                        current,
                        other,
                        ConflictKind::RoomDoubleBook,
                        names,
                    );
                }
            }
        }
    }

    info!("conflict scan over {} rows found {} conflicts", rows.len(), conflicts.len());
    conflicts
}

fn push_conflict(
    conflicts: &mut Vec<Conflict>,
    seen: &mut HashSet<(ScheduleId, ScheduleId, ConflictKind)>,
    s1: &CommittedSession,
    s2: &CommittedSession,
    kind: ConflictKind,
    names: &NameDirectory,
) {
    if !seen.insert((s1.schedule_id, s2.schedule_id, kind)) {
        return;
    }
    let span = |s: &CommittedSession| format!("{} - {}", time::fmt_12h(s.start), time::fmt_12h(s.end));
    let (description, recommendation) = match kind {
        ConflictKind::InstructorDoubleBook => {
            let who = names.instructor(s1.instructor_id);
            (
                format!(
                    "Instructor {} has overlapping classes: '{}' and '{}' on {} {} and {}",
                    who,
                    names.subject(s1.subject_id),
                    names.subject(s2.subject_id),
                    s1.day,
                    span(s1),
                    span(s2)
                ),
                format!(
                    "Reassign one of the overlapping classes for {who} to another instructor or move it to a different time."
                ),
            )
        }
        ConflictKind::RoomDoubleBook => (
            format!(
                "Room {} has overlapping classes: '{}' and '{}' on {} {} and {}",
                names.room(s1.room_id),
                names.subject(s1.subject_id),
                names.subject(s2.subject_id),
                s1.day,
                span(s1),
                span(s2)
            ),
            "Move one of the classes to another available room or adjust the schedule.".to_string(),
        ),
    };
    conflicts.push(Conflict {
        schedule1_id: s1.schedule_id,
        schedule2_id: s2.schedule_id,
        conflict_type: kind,
        description,
        recommendation,
        status: ConflictStatus::Unresolved,
    });
}

/// Adds newly detected conflicts to an existing list, skipping pairs already
/// recorded. Returns how many were added.
pub fn merge(existing: &mut Vec<Conflict>, found: Vec<Conflict>) -> usize {
    let known: HashSet<(ScheduleId, ScheduleId, ConflictKind)> = existing
        .iter()
        .map(|c| (c.schedule1_id, c.schedule2_id, c.conflict_type))
        .collect();
    let mut added = 0;
    for conflict in found {
        let key = (conflict.schedule1_id, conflict.schedule2_id, conflict.conflict_type);
        if !known.contains(&key) {
            existing.push(conflict);
            added += 1;
        }
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Day;

    fn row(
        schedule_id: u32,
        instructor_id: u32,
        room_id: u32,
        day: Day,
        start: u16,
        end: u16,
    ) -> CommittedSession {
        CommittedSession {
            schedule_id,
            subject_id: schedule_id,
            instructor_id,
            room_id,
            day,
            start,
            end,
            approved: true,
        }
    }

    #[test]
    fn overlapping_instructor_sessions_are_flagged_once() {
        // 09:00-10:00 and 09:30-10:30 under the same instructor
        let rows = vec![
            row(1, 10, 100, Day::Monday, 540, 600),
            row(2, 10, 101, Day::Monday, 570, 630),
        ];
        let names = NameDirectory::default();
        let conflicts = detect(&rows, &names);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict_type, ConflictKind::InstructorDoubleBook);
        assert_eq!(conflicts[0].schedule1_id, 1);
        assert_eq!(conflicts[0].schedule2_id, 2);
        assert_eq!(conflicts[0].status, ConflictStatus::Unresolved);
        assert!(conflicts[0].description.contains("09:00 AM"));
    }

    #[test]
    fn shared_instructor_and_room_yield_two_kinds() {
        let rows = vec![
            row(1, 10, 100, Day::Tuesday, 540, 630),
            row(2, 10, 100, Day::Tuesday, 570, 660),
        ];
        let conflicts = detect(&rows, &NameDirectory::default());
        let kinds: Vec<ConflictKind> = conflicts.iter().map(|c| c.conflict_type).collect();
        assert_eq!(
            kinds,
            vec![ConflictKind::InstructorDoubleBook, ConflictKind::RoomDoubleBook]
        );
    }

    #[test]
    fn different_days_or_touching_intervals_do_not_conflict() {
        let rows = vec![
            row(1, 10, 100, Day::Monday, 540, 600),
            row(2, 10, 100, Day::Tuesday, 540, 600),
            // back-to-back on the same day
            row(3, 10, 100, Day::Monday, 600, 660),
        ];
        assert!(detect(&rows, &NameDirectory::default()).is_empty());
    }

    #[test]
    fn rerun_and_merge_are_idempotent() {
        let rows = vec![
            row(1, 10, 100, Day::Monday, 540, 600),
            row(2, 10, 101, Day::Monday, 570, 630),
        ];
        let names = NameDirectory::default();
        let first = detect(&rows, &names);
        let second = detect(&rows, &names);
        assert_eq!(first.len(), second.len());

        let mut log = Vec::new();
        assert_eq!(merge(&mut log, first), 1);
        assert_eq!(merge(&mut log, second), 0);
        assert_eq!(log.len(), 1);
    }
}
