//! Pairwise group compatibility, the one predicate every stage of the CSP
//! leans on. Results are memoized per run keyed by the unordered pair of
//! arena ids.

use crate::data::{Group, GroupId, Session};
use crate::time::{OverlapMemo, TimeSlot};
use log::debug;
use std::collections::HashMap;

pub struct CompatKernel<'a> {
    arena: &'a [Group],
    memo: HashMap<(GroupId, GroupId), bool>,
    overlap: OverlapMemo,
    hits: u64,
    misses: u64,
}

impl<'a> CompatKernel<'a> {
    pub fn new(arena: &'a [Group]) -> CompatKernel<'a> {
        CompatKernel {
            arena,
            memo: HashMap::new(),
            overlap: OverlapMemo::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Two groups can coexist in one timetable.
    pub fn compatible(&mut self, a: GroupId, b: GroupId) -> bool {
        let key = if a <= b { (a, b) } else { (b, a) };
        if let Some(&v) = self.memo.get(&key) {
            self.hits += 1;
            return v;
        }
        self.misses += 1;
        let arena = self.arena;
        let v = self.compute(&arena[a as usize].sessions, &arena[b as usize].sessions);
        self.memo.insert(key, v);
        v
    }

    fn compute(&mut self, left: &[Session], right: &[Session]) -> bool {
        for a in left {
            for b in right {
                if !sessions_compatible(&mut self.overlap, a, b) {
                    return false;
                }
            }
        }
        true
    }

    pub fn log_stats(&self) {
        let total = self.hits + self.misses;
        if total > 0 {
            debug!(
                "compatibility cache: {} lookups, {:.1}% hits; overlap cache {:.1}% hits",
                total,
                100.0 * self.hits as f64 / total as f64,
                100.0 * self.overlap.hit_rate()
            );
        }
    }
}

fn sessions_compatible(overlap: &mut OverlapMemo, a: &Session, b: &Session) -> bool {
    // the same subject may only recur with the same resources on distinct days
    if a.subject_id == b.subject_id {
        return a.instructor_id == b.instructor_id && a.room_id == b.room_id && a.day != b.day;
    }
    if a.day == b.day
        && overlap.overlaps(TimeSlot::new(a.start, a.end), TimeSlot::new(b.start, b.end))
    {
        return a.instructor_id != b.instructor_id && a.room_id != b.room_id;
    }
    true
}
