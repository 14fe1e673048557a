//! Arc consistency (AC-3) over the group-domain CSP.
//!
//! Variables are subject ids, values are candidate groups. A revision of
//! arc (x, y) removes from the domain of x every group with no compatible
//! partner left in the domain of y. The fixed point is unique; only the
//! work order varies.

use crate::compat::CompatKernel;
use crate::data::{GroupId, SubjectId};
use crate::error::SolveError;
use itertools::Itertools;
use log::info;
use std::collections::{HashMap, VecDeque};
use std::time::Instant;

/// Prunes every domain to arc consistency.
///
/// `trim_threshold` is a heuristic knob: arcs whose either side holds a
/// domain larger than the threshold are left out of the initial queue.
/// Omitting it changes nothing but speed.
pub fn ac3(
    domains: &mut HashMap<SubjectId, Vec<GroupId>>,
    kernel: &mut CompatKernel,
    trim_threshold: Option<usize>,
) -> Result<(), SolveError> {
    let started = Instant::now();
    let before: usize = domains.values().map(Vec::len).sum();
    let threshold = trim_threshold.unwrap_or(usize::MAX);

    let variables: Vec<SubjectId> = domains.keys().copied().sorted().collect();
    let mut queue: VecDeque<(SubjectId, SubjectId)> = VecDeque::new();
    for &x in &variables {
        for &y in &variables {
            if x != y && domains[&x].len() <= threshold && domains[&y].len() <= threshold {
                queue.push_back((x, y));
            }
        }
    }

    while let Some((x, y)) = queue.pop_front() {
        if revise(domains, kernel, x, y) {
            if domains[&x].is_empty() {
                return Err(SolveError::Ac3Infeasible { subject_id: x });
            }
            for &k in &variables {
                if k != x && k != y {
                    queue.push_back((k, x));
                }
            }
        }
    }

    let after: usize = domains.values().map(Vec::len).sum();
    info!(
        "AC-3 pruned {} of {} candidate groups in {:.2?}",
        before - after,
        before,
        started.elapsed()
    );
    Ok(())
}

/// Removes values of x unsupported in y. Returns whether anything changed.
fn revise(
    domains: &mut HashMap<SubjectId, Vec<GroupId>>,
    kernel: &mut CompatKernel,
    x: SubjectId,
    y: SubjectId,
) -> bool {
    let y_domain = domains[&y].clone();
    let x_domain = domains.get_mut(&x).expect("variables come from the map");
    let before = x_domain.len();
    x_domain.retain(|&v| y_domain.iter().any(|&w| kernel.compatible(v, w)));
    x_domain.len() != before
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Day, Group, Session};

    fn group(subject_id: u32, room_id: u32, day: Day, start: u16) -> Group {
        Group::new(
            subject_id,
            subject_id, // one instructor per subject keeps these cases small
            vec![Session {
                subject_id,
                instructor_id: subject_id,
                room_id,
                day,
                start,
                end: start + 60,
            }],
        )
    }

    #[test]
    fn unsupported_values_are_pruned() {
        // both subjects want room 100 Monday 08:00; subject 2 has an
        // alternative at 09:00, subject 1 does not
        let arena = vec![
            group(1, 100, Day::Monday, 480),
            group(2, 100, Day::Monday, 480),
            group(2, 100, Day::Monday, 540),
        ];
        let mut domains = HashMap::from([(1, vec![0]), (2, vec![1, 2])]);
        let mut kernel = CompatKernel::new(&arena);
        ac3(&mut domains, &mut kernel, None).unwrap();
        assert_eq!(domains[&1], vec![0]);
        assert_eq!(domains[&2], vec![2]);
    }

    #[test]
    fn emptied_domain_is_infeasible() {
        let arena = vec![
            group(1, 100, Day::Monday, 480),
            group(2, 100, Day::Monday, 480),
        ];
        let mut domains = HashMap::from([(1, vec![0]), (2, vec![1])]);
        let mut kernel = CompatKernel::new(&arena);
        let err = ac3(&mut domains, &mut kernel, None).unwrap_err();
        assert!(matches!(err, SolveError::Ac3Infeasible { .. }));
    }

    #[test]
    fn trim_threshold_skips_large_arcs() {
        let arena = vec![
            group(1, 100, Day::Monday, 480),
            group(2, 100, Day::Monday, 480),
            group(2, 100, Day::Monday, 540),
        ];
        let mut domains = HashMap::from([(1, vec![0]), (2, vec![1, 2])]);
        let mut kernel = CompatKernel::new(&arena);
        // threshold 1 excludes every arc touching subject 2
        ac3(&mut domains, &mut kernel, Some(1)).unwrap();
        assert_eq!(domains[&2], vec![1, 2]);
    }
}
