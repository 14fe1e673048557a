//! Candidate-group construction.
//!
//! For every schedulable subject this enumerates the legal weekly meeting
//! groups (rooms x slots x pattern days), filtered by program eligibility,
//! duration fit, instructor-status rules and the approved baseline. The
//! result is the domain of one CSP variable per subject.

use crate::data::{
    Classification, Day, Diagnostic, DiagnosticKind, Group, GroupId, Instructor, InstructorId,
    Room, RoomId, RoomKind, Session, Snapshot, Subject, SubjectId,
};
use crate::time::{self, Minutes, TimeSlot};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

/// Weekly shape of a subject, derived from classification and units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// 3 lecture sessions MWF (60 min) plus 2 lab sessions TTh (90 min).
    MajorCombined,
    Mwf,
    TTh,
    Single,
}

impl Pattern {
    pub fn for_subject(classification: Classification, units: u32) -> Pattern {
        match (classification, units) {
            (Classification::Major, 3) => Pattern::MajorCombined,
            (_, u) if u >= 3 => Pattern::Mwf,
            (_, 2) => Pattern::TTh,
            _ => Pattern::Single,
        }
    }

    pub fn days(self) -> &'static [Day] {
        match self {
            Pattern::Mwf => &[Day::Monday, Day::Wednesday, Day::Friday],
            Pattern::TTh => &[Day::Tuesday, Day::Thursday],
            Pattern::Single => &[Day::Monday],
            // combined groups enumerate their two subgroups separately
            Pattern::MajorCombined => &[],
        }
    }

    pub fn session_minutes(self) -> Minutes {
        match self {
            Pattern::TTh => time::LAB_MINUTES,
            _ => time::LECTURE_MINUTES,
        }
    }

    pub fn session_count(self) -> usize {
        match self {
            Pattern::MajorCombined => 5,
            Pattern::Mwf => 3,
            Pattern::TTh => 2,
            Pattern::Single => 1,
        }
    }
}

/// Per-run candidate arena plus the domain of each subject variable.
#[derive(Debug, Default)]
pub struct CandidateSet {
    pub arena: Vec<Group>,
    pub domains: HashMap<SubjectId, Vec<GroupId>>,
}

impl CandidateSet {
    pub fn group(&self, id: GroupId) -> &Group {
        &self.arena[id as usize]
    }
}

/// Approved sessions indexed for the per-candidate exclusion test.
struct BaselineIndex {
    by_instructor: HashMap<(InstructorId, Day), Vec<TimeSlot>>,
    by_room: HashMap<(RoomId, Day), Vec<TimeSlot>>,
}

impl BaselineIndex {
    fn build(snapshot: &Snapshot) -> BaselineIndex {
        let mut by_instructor: HashMap<(InstructorId, Day), Vec<TimeSlot>> = HashMap::new();
        let mut by_room: HashMap<(RoomId, Day), Vec<TimeSlot>> = HashMap::new();
        for row in &snapshot.baseline {
            let slot = TimeSlot::new(row.start, row.end);
            by_instructor
                .entry((row.instructor_id, row.day))
                .or_default()
                .push(slot);
            by_room.entry((row.room_id, row.day)).or_default().push(slot);
        }
        BaselineIndex {
            by_instructor,
            by_room,
        }
    }

    /// True if the candidate session collides with any approved session on
    /// (instructor, day, time) or (room, day, time).
    fn rejects(&self, session: &Session) -> bool {
        let slot = TimeSlot::new(session.start, session.end);
        let busy = |slots: Option<&Vec<TimeSlot>>| {
            slots.is_some_and(|slots| slots.iter().any(|s| s.overlaps(slot)))
        };
        busy(self.by_instructor.get(&(session.instructor_id, session.day)))
            || busy(self.by_room.get(&(session.room_id, session.day)))
    }
}

fn room_admits_program(snapshot: &Snapshot, room: RoomId, program: &str) -> bool {
    if program.is_empty() {
        return true;
    }
    match snapshot.programs_of(room) {
        // empty set admits any program
        None => true,
        Some(programs) => programs.is_empty() || programs.contains(program),
    }
}

/// Rooms a subject may use for a subgroup of the given kind, falling back to
/// the other kind when none of the required kind passes the program filter.
fn usable_rooms<'a>(
    snapshot: &'a Snapshot,
    subject: &Subject,
    kind: RoomKind,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<&'a Room> {
    let of_kind = |k: RoomKind| -> Vec<&Room> {
        snapshot
            .rooms
            .iter()
            .filter(|r| r.room_type == k)
            .filter(|r| room_admits_program(snapshot, r.room_id, &subject.program))
            .collect()
    };
    let preferred = of_kind(kind);
    if !preferred.is_empty() {
        return preferred;
    }
    let fallback = of_kind(kind.other());
    if !fallback.is_empty() {
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::RoomFallback,
            Some(subject.subject_id),
            format!("no eligible {kind:?} room; using {:?} rooms", kind.other()),
        ));
    }
    fallback
}

/// Slots for one subgroup, with the lunch window removed for permanent
/// instructors.
fn usable_slots(snapshot: &Snapshot, instructor: &Instructor, duration: Minutes) -> Vec<TimeSlot> {
    time::enumerate_slots(snapshot.window_start, snapshot.window_end, duration)
        .into_iter()
        .filter(|slot| {
            instructor.status != crate::data::EmploymentStatus::Permanent
                || !time::overlaps(slot.start, slot.end, time::LUNCH_START, time::LUNCH_END)
        })
        .collect()
}

/// Sessions of one subgroup: the same (room, slot) across the pattern days.
/// Returns None when any constituent session collides with the baseline;
/// partial groups are never emitted.
fn subgroup(
    subject: &Subject,
    room: &Room,
    slot: TimeSlot,
    days: &[Day],
    baseline: &BaselineIndex,
) -> Option<Vec<Session>> {
    let mut sessions = Vec::with_capacity(days.len());
    for &day in days {
        let session = Session {
            subject_id: subject.subject_id,
            instructor_id: subject.instructor_id,
            room_id: room.room_id,
            day,
            start: slot.start,
            end: slot.end,
        };
        if baseline.rejects(&session) {
            return None;
        }
        sessions.push(session);
    }
    Some(sessions)
}

fn simple_groups(
    snapshot: &Snapshot,
    subject: &Subject,
    instructor: &Instructor,
    pattern: Pattern,
    baseline: &BaselineIndex,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<Group> {
    let rooms = usable_rooms(snapshot, subject, RoomKind::Lecture, diagnostics);
    let slots = usable_slots(snapshot, instructor, pattern.session_minutes());
    let mut groups = Vec::new();
    for room in &rooms {
        for &slot in &slots {
            if let Some(sessions) = subgroup(subject, room, slot, pattern.days(), baseline) {
                groups.push(Group::new(subject.subject_id, subject.instructor_id, sessions));
            }
        }
    }
    groups
}

/// Major combined groups: every lecture subgroup (MWF, 60 min, lecture
/// rooms) paired with every lab subgroup (TTh, 90 min, lab rooms), sharing
/// the instructor. MWF and TTh are disjoint day sets, so the two subgroups
/// cannot overlap each other.
fn combined_groups(
    snapshot: &Snapshot,
    subject: &Subject,
    instructor: &Instructor,
    baseline: &BaselineIndex,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<Group> {
    let lecture_rooms = usable_rooms(snapshot, subject, RoomKind::Lecture, diagnostics);
    let lab_rooms = usable_rooms(snapshot, subject, RoomKind::Lab, diagnostics);
    let lecture_slots = usable_slots(snapshot, instructor, time::LECTURE_MINUTES);
    let lab_slots = usable_slots(snapshot, instructor, time::LAB_MINUTES);

    let lecture_days = [Day::Monday, Day::Wednesday, Day::Friday];
    let lab_days = [Day::Tuesday, Day::Thursday];

    let mut lecture_subgroups = Vec::new();
    for room in &lecture_rooms {
        for &slot in &lecture_slots {
            if let Some(sessions) = subgroup(subject, room, slot, &lecture_days, baseline) {
                lecture_subgroups.push(sessions);
            }
        }
    }
    let mut lab_subgroups = Vec::new();
    for room in &lab_rooms {
        for &slot in &lab_slots {
            if let Some(sessions) = subgroup(subject, room, slot, &lab_days, baseline) {
                lab_subgroups.push(sessions);
            }
        }
    }

    let mut groups = Vec::with_capacity(lecture_subgroups.len() * lab_subgroups.len());
    for lecture in &lecture_subgroups {
        for lab in &lab_subgroups {
            let mut sessions = lecture.clone();
            sessions.extend(lab.iter().copied());
            groups.push(Group::new(subject.subject_id, subject.instructor_id, sessions));
        }
    }
    groups
}

/// Builds the domain of one subject: enumerate, filter, diversify, order.
fn domain_for_subject(
    snapshot: &Snapshot,
    subject: &Subject,
    baseline: &BaselineIndex,
) -> (Vec<Group>, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let Some(instructor) = snapshot.instructor(subject.instructor_id) else {
        // the loader already dropped subjects with unknown instructors
        return (Vec::new(), diagnostics);
    };

    let pattern = Pattern::for_subject(subject.classification, subject.units);
    let mut groups = match pattern {
        Pattern::MajorCombined => {
            combined_groups(snapshot, subject, instructor, baseline, &mut diagnostics)
        }
        _ => simple_groups(snapshot, subject, instructor, pattern, baseline, &mut diagnostics),
    };

    // cheap load feasibility: a group alone may not exceed the instructor cap
    groups.retain(|g| g.len() as u32 <= instructor.max_load);

    // optional diversification: seeded shuffle decides which groups survive
    // the cap; the final order is canonical either way
    if let Some(seed) = snapshot.config.seed {
        let mut rng = StdRng::seed_from_u64(seed ^ u64::from(subject.subject_id));
        groups.shuffle(&mut rng);
    }
    if let Some(cap) = snapshot.config.domain_cap {
        groups.truncate(cap);
    }
    groups.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.key.cmp(&b.key)));

    debug!(
        "subject {}: pattern {:?}, {} candidate groups",
        subject.subject_id,
        pattern,
        groups.len()
    );
    (groups, diagnostics)
}

/// Builds every subject domain, in parallel across subjects.
///
/// A panicking worker is retried synchronously and recorded as a
/// `CandidateException`; an empty domain drops its subject from the CSP with
/// an `EmptyDomain` diagnostic. Neither is fatal to the other subjects.
pub fn build_domains(snapshot: &Snapshot) -> (CandidateSet, Vec<Diagnostic>) {
    let started = Instant::now();
    let baseline = BaselineIndex::build(snapshot);

    let run = |subject: &Subject| -> Option<(Vec<Group>, Vec<Diagnostic>)> {
        panic::catch_unwind(AssertUnwindSafe(|| {
            domain_for_subject(snapshot, subject, &baseline)
        }))
        .ok()
    };

    let generate = || -> Vec<(SubjectId, Option<(Vec<Group>, Vec<Diagnostic>)>)> {
        snapshot
            .subjects
            .par_iter()
            .map(|subject| (subject.subject_id, run(subject)))
            .collect()
    };
    let results = match snapshot.config.workers {
        Some(workers) => match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
            Ok(pool) => pool.install(generate),
            Err(e) => {
                warn!("could not build worker pool ({e}); generating on the current thread");
                generate()
            }
        },
        None => generate(),
    };

    let mut set = CandidateSet::default();
    let mut diagnostics = Vec::new();
    for (subject_id, outcome) in results {
        let (groups, mut diags) = match outcome {
            Some(result) => result,
            None => {
                // worker panicked; retry synchronously on this thread
                diagnostics.push(Diagnostic::new(
                    DiagnosticKind::CandidateException,
                    Some(subject_id),
                    "candidate worker failed; retried synchronously".into(),
                ));
                let subject = snapshot
                    .subject(subject_id)
                    .expect("subject ids come from the snapshot");
                domain_for_subject(snapshot, subject, &baseline)
            }
        };
        diagnostics.append(&mut diags);
        if groups.is_empty() {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::EmptyDomain,
                Some(subject_id),
                "no legal meeting group in the scheduling window".into(),
            ));
            continue;
        }
        let ids = groups
            .into_iter()
            .map(|group| {
                let id = set.arena.len() as GroupId;
                set.arena.push(group);
                id
            })
            .collect();
        set.domains.insert(subject_id, ids);
    }

    info!(
        "built {} candidate groups over {} domains in {:.2?}",
        set.arena.len(),
        set.domains.len(),
        started.elapsed()
    );
    (set, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CommittedSession, EmploymentStatus, SolveConfig};
    use std::collections::BTreeSet;

    fn snapshot() -> Snapshot {
        Snapshot {
            subjects: vec![Subject {
                subject_id: 1,
                code: "CS101".into(),
                name: "Intro".into(),
                units: 3,
                program: "BSCS".into(),
                classification: Classification::General,
                instructor_id: 10,
            }],
            instructors: vec![Instructor {
                instructor_id: 10,
                name: "Reyes".into(),
                status: EmploymentStatus::Other,
                max_load: 10,
            }],
            rooms: vec![Room {
                room_id: 100,
                room_number: "R-201".into(),
                room_type: RoomKind::Lecture,
            }],
            room_programs: HashMap::new(),
            baseline: Vec::new(),
            semester: "1st".into(),
            school_year: "2025-2026".into(),
            window_start: 420,
            window_end: 600,
            config: SolveConfig::default(),
        }
    }

    #[test]
    fn pattern_table() {
        use Classification::*;
        assert_eq!(Pattern::for_subject(Major, 3), Pattern::MajorCombined);
        assert_eq!(Pattern::for_subject(General, 3), Pattern::Mwf);
        assert_eq!(Pattern::for_subject(General, 5), Pattern::Mwf);
        assert_eq!(Pattern::for_subject(Major, 4), Pattern::Mwf);
        assert_eq!(Pattern::for_subject(Major, 2), Pattern::TTh);
        assert_eq!(Pattern::for_subject(General, 1), Pattern::Single);

        assert_eq!(Pattern::MajorCombined.session_count(), 5);
        assert_eq!(Pattern::Mwf.session_count(), 3);
        assert_eq!(Pattern::TTh.session_count(), 2);
        assert_eq!(Pattern::Single.session_count(), 1);
        assert_eq!(Pattern::TTh.session_minutes(), 90);
        assert_eq!(Pattern::Mwf.session_minutes(), 60);
    }

    #[test]
    fn mwf_groups_share_room_and_slot_across_days() {
        let snap = snapshot();
        let (set, diags) = build_domains(&snap);
        assert!(diags.is_empty());
        let domain = &set.domains[&1];
        // 1 room x 5 hourly slots in a 07:00-10:00 window
        assert_eq!(domain.len(), 5);
        for &gid in domain {
            let group = set.group(gid);
            assert_eq!(group.len(), 3);
            let days: Vec<Day> = group.sessions.iter().map(|s| s.day).collect();
            assert_eq!(days, vec![Day::Monday, Day::Wednesday, Day::Friday]);
            assert!(group.sessions.iter().all(|s| s.room_id == 100));
            assert!(group
                .sessions
                .iter()
                .all(|s| s.start == group.sessions[0].start));
        }
    }

    #[test]
    fn permanent_instructor_skips_lunch_slots() {
        let mut snap = snapshot();
        snap.instructors[0].status = EmploymentStatus::Permanent;
        snap.window_end = 840; // 07:00-14:00
        let (set, _) = build_domains(&snap);
        for group in &set.arena {
            for s in &group.sessions {
                assert!(
                    !time::overlaps(s.start, s.end, time::LUNCH_START, time::LUNCH_END),
                    "slot {}-{} crosses lunch",
                    s.start,
                    s.end
                );
            }
        }
    }

    #[test]
    fn baseline_collision_rejects_whole_group() {
        let mut snap = snapshot();
        // the instructor already teaches Wednesday 07:30-08:30
        snap.baseline.push(CommittedSession {
            schedule_id: 1,
            subject_id: 99,
            instructor_id: 10,
            room_id: 555,
            day: Day::Wednesday,
            start: 450,
            end: 510,
            approved: true,
        });
        let (set, _) = build_domains(&snap);
        for group in &set.arena {
            for s in &group.sessions {
                assert!(!time::overlaps(s.start, s.end, 450, 510));
            }
        }
        // 07:00 and 07:30 and 08:00 starts all clip the busy window on Wednesday
        assert_eq!(set.domains[&1].len(), 2);
    }

    #[test]
    fn program_restricted_room_empties_domain() {
        let mut snap = snapshot();
        snap.room_programs
            .insert(100, BTreeSet::from(["BSIT".to_string()]));
        let (set, diags) = build_domains(&snap);
        assert!(set.domains.is_empty());
        assert!(diags
            .iter()
            .any(|d| d.kind == DiagnosticKind::EmptyDomain && d.subject_id == Some(1)));
    }

    #[test]
    fn major_combined_uses_both_room_kinds() {
        let mut snap = snapshot();
        snap.subjects[0].classification = Classification::Major;
        snap.rooms.push(Room {
            room_id: 200,
            room_number: "LAB-1".into(),
            room_type: RoomKind::Lab,
        });
        snap.window_end = 720;
        let (set, diags) = build_domains(&snap);
        assert!(diags.iter().all(|d| d.kind != DiagnosticKind::RoomFallback));
        let domain = &set.domains[&1];
        assert!(!domain.is_empty());
        for &gid in domain {
            let group = set.group(gid);
            assert_eq!(group.len(), 5);
            let lectures: Vec<_> = group.sessions.iter().filter(|s| s.room_id == 100).collect();
            let labs: Vec<_> = group.sessions.iter().filter(|s| s.room_id == 200).collect();
            assert_eq!(lectures.len(), 3);
            assert_eq!(labs.len(), 2);
            assert!(lectures.iter().all(|s| s.end - s.start == 60));
            assert!(labs.iter().all(|s| s.end - s.start == 90));
            assert!(labs
                .iter()
                .all(|s| s.day == Day::Tuesday || s.day == Day::Thursday));
        }
    }

    #[test]
    fn missing_lab_rooms_fall_back_with_diagnostic() {
        let mut snap = snapshot();
        snap.subjects[0].classification = Classification::Major;
        snap.window_end = 720;
        let (set, diags) = build_domains(&snap);
        assert!(diags.iter().any(|d| d.kind == DiagnosticKind::RoomFallback));
        // lab subgroup landed in the lecture room
        assert!(!set.domains[&1].is_empty());
        for group in &set.arena {
            assert!(group.sessions.iter().all(|s| s.room_id == 100));
        }
    }

    #[test]
    fn seeded_cap_is_reproducible() {
        let mut snap = snapshot();
        snap.window_end = 1140;
        snap.config.seed = Some(7);
        snap.config.domain_cap = Some(4);
        let (a, _) = build_domains(&snap);
        let (b, _) = build_domains(&snap);
        assert_eq!(a.domains[&1].len(), 4);
        let keys = |set: &CandidateSet| -> Vec<String> {
            set.domains[&1]
                .iter()
                .map(|&g| set.group(g).key.clone())
                .collect()
        };
        assert_eq!(keys(&a), keys(&b));

        // a different seed picks a different surviving subset
        snap.config.seed = Some(8);
        let (c, _) = build_domains(&snap);
        assert_eq!(c.domains[&1].len(), 4);
        // not asserting inequality: two seeds may coincide on tiny domains
        for &gid in &c.domains[&1] {
            assert_eq!(c.group(gid).len(), 3);
        }
    }

    #[test]
    fn group_too_big_for_instructor_load_is_dropped() {
        let mut snap = snapshot();
        snap.instructors[0].max_load = 2;
        let (set, diags) = build_domains(&snap);
        assert!(set.domains.is_empty());
        assert!(diags.iter().any(|d| d.kind == DiagnosticKind::EmptyDomain));
    }
}
