use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Minutes since midnight.
pub type Minutes = u16;

/// Scheduling grid: 07:00 to 19:30.
pub const GRID_START: Minutes = 420;
pub const GRID_END: Minutes = 1170;
/// Slots start on the half hour.
pub const SLOT_STEP: Minutes = 30;
/// Lunch window protected for permanent instructors (12:00-13:00).
pub const LUNCH_START: Minutes = 720;
pub const LUNCH_END: Minutes = 780;

pub const LECTURE_MINUTES: Minutes = 60;
pub const LAB_MINUTES: Minutes = 90;

/// Half-open interval [start, end) within one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: Minutes,
    pub end: Minutes,
}

impl TimeSlot {
    pub fn new(start: Minutes, end: Minutes) -> TimeSlot {
        TimeSlot { start, end }
    }

    pub fn duration(self) -> Minutes {
        self.end - self.start
    }

    pub fn overlaps(self, other: TimeSlot) -> bool {
        overlaps(self.start, self.end, other.start, other.end)
    }
}

/// Same-day overlap of two half-open intervals.
pub fn overlaps(s1: Minutes, e1: Minutes, s2: Minutes, e2: Minutes) -> bool {
    !(e1 <= s2 || e2 <= s1)
}

/// Overlap cache keyed by the unordered interval pair.
///
/// The engine performs on the order of millions of overlap checks per run;
/// the session intervals come from a small interned slot set, so the cache
/// stays tiny while the hit rate is high.
#[derive(Debug, Default)]
pub struct OverlapMemo {
    cache: HashMap<(TimeSlot, TimeSlot), bool>,
    hits: u64,
    misses: u64,
}

impl OverlapMemo {
    pub fn new() -> OverlapMemo {
        OverlapMemo::default()
    }

    pub fn overlaps(&mut self, a: TimeSlot, b: TimeSlot) -> bool {
        let key = if a <= b { (a, b) } else { (b, a) };
        if let Some(&v) = self.cache.get(&key) {
            self.hits += 1;
            return v;
        }
        self.misses += 1;
        let v = a.overlaps(b);
        self.cache.insert(key, v);
        v
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// All slots of the given duration starting on the half-hour grid and
/// fitting inside [window_start, window_end).
pub fn enumerate_slots(window_start: Minutes, window_end: Minutes, duration: Minutes) -> Vec<TimeSlot> {
    let mut slots = Vec::new();
    let mut start = window_start;
    while start + duration <= window_end {
        slots.push(TimeSlot::new(start, start + duration));
        start += SLOT_STEP;
    }
    slots
}

/// Union of the 60- and 90-minute slot sets, deduplicated on (start, end).
pub fn enumerate_all_slots(window_start: Minutes, window_end: Minutes) -> Vec<TimeSlot> {
    let mut slots = enumerate_slots(window_start, window_end, LECTURE_MINUTES);
    slots.extend(enumerate_slots(window_start, window_end, LAB_MINUTES));
    slots.sort_unstable();
    slots.dedup();
    slots
}

/// Parses "HH:MM" or "HH:MM:SS" into minutes since midnight.
pub fn parse_hhmm(text: &str) -> Option<Minutes> {
    let mut parts = text.trim().split(':');
    let hours: u16 = parts.next()?.parse().ok()?;
    let minutes: u16 = parts.next()?.parse().ok()?;
    if let Some(seconds) = parts.next() {
        let _: u16 = seconds.parse().ok()?;
    }
    if hours > 23 || minutes > 59 {
        return None;
    }
    Some(hours * 60 + minutes)
}

pub fn fmt_hhmm(minutes: Minutes) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// 12-hour rendering used by conflict descriptions ("09:30 AM").
pub fn fmt_12h(minutes: Minutes) -> String {
    let hours = minutes / 60;
    let mins = minutes % 60;
    let (h12, suffix) = match hours {
        0 => (12, "AM"),
        1..=11 => (hours, "AM"),
        12 => (12, "PM"),
        _ => (hours - 12, "PM"),
    };
    format!("{h12:02}:{mins:02} {suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_is_half_open() {
        // touching intervals do not overlap
        assert!(!overlaps(420, 480, 480, 540));
        assert!(overlaps(420, 480, 450, 510));
        assert!(overlaps(450, 510, 420, 480));
        assert!(!overlaps(600, 660, 420, 480));
    }

    #[test]
    fn memo_agrees_with_predicate() {
        let mut memo = OverlapMemo::new();
        let a = TimeSlot::new(540, 600);
        let b = TimeSlot::new(570, 630);
        assert!(memo.overlaps(a, b));
        assert!(memo.overlaps(b, a));
        assert!(!memo.overlaps(a, TimeSlot::new(600, 690)));
        // second lookup of (a, b) is a hit regardless of argument order
        assert!(memo.hit_rate() > 0.0);
    }

    #[test]
    fn slot_enumeration_respects_window() {
        let slots = enumerate_slots(420, 600, 60);
        assert_eq!(
            slots,
            vec![
                TimeSlot::new(420, 480),
                TimeSlot::new(450, 510),
                TimeSlot::new(480, 540),
                TimeSlot::new(510, 570),
                TimeSlot::new(540, 600),
            ]
        );
        // window shorter than the duration yields nothing
        assert!(enumerate_slots(420, 470, 60).is_empty());
    }

    #[test]
    fn all_slots_deduplicates() {
        let slots = enumerate_all_slots(420, 570);
        let mut unique = slots.clone();
        unique.dedup();
        assert_eq!(slots, unique);
        assert!(slots.contains(&TimeSlot::new(420, 480)));
        assert!(slots.contains(&TimeSlot::new(420, 510)));
    }

    #[test]
    fn time_parsing_and_formatting() {
        assert_eq!(parse_hhmm("07:00"), Some(420));
        assert_eq!(parse_hhmm("19:30:00"), Some(1170));
        assert_eq!(parse_hhmm("7:5"), Some(425));
        assert_eq!(parse_hhmm("24:00"), None);
        assert_eq!(parse_hhmm("garbage"), None);
        assert_eq!(fmt_hhmm(720), "12:00");
        assert_eq!(fmt_12h(780), "01:00 PM");
        assert_eq!(fmt_12h(570), "09:30 AM");
    }
}
