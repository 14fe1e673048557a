//! Backtracking search with forward checking.
//!
//! Variable order is MRV with subject-id tie break; values are tried in
//! ascending (group size, canonical key) order, which the generator already
//! established. Forward checking journals only the domains it shrank, so
//! unwinding a decision restores exactly those.

use crate::candidates::CandidateSet;
use crate::compat::CompatKernel;
use crate::data::{Day, EmploymentStatus, GroupId, InstructorId, Snapshot, SubjectId};
use crate::error::SolveError;
use log::{debug, info};
use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

struct State<'k, 'a> {
    set: &'a CandidateSet,
    kernel: &'k mut CompatKernel<'a>,
    instructors: HashMap<InstructorId, (u32, EmploymentStatus)>,
    domains: HashMap<SubjectId, Vec<GroupId>>,
    assignment: HashMap<SubjectId, GroupId>,
    loads: HashMap<InstructorId, u32>,
    instructor_groups: HashMap<InstructorId, Vec<GroupId>>,
    nodes: u64,
    budget: Option<u64>,
}

/// Finds the first complete assignment in MRV + value order.
pub fn backtrack<'a>(
    snapshot: &Snapshot,
    set: &'a CandidateSet,
    kernel: &mut CompatKernel<'a>,
    domains: HashMap<SubjectId, Vec<GroupId>>,
) -> Result<HashMap<SubjectId, GroupId>, SolveError> {
    let started = Instant::now();
    let mut state = State {
        set,
        kernel,
        instructors: snapshot
            .instructors
            .iter()
            .map(|i| (i.instructor_id, (i.max_load, i.status)))
            .collect(),
        domains,
        assignment: HashMap::new(),
        loads: HashMap::new(),
        instructor_groups: HashMap::new(),
        nodes: 0,
        budget: snapshot.config.node_budget,
    };
    let found = state.run()?;
    if !found {
        return Err(SolveError::SearchInfeasible);
    }
    info!(
        "search assigned {} subjects after {} nodes in {:.2?}",
        state.assignment.len(),
        state.nodes,
        started.elapsed()
    );
    Ok(state.assignment)
}

impl State<'_, '_> {
    fn run(&mut self) -> Result<bool, SolveError> {
        if self.assignment.len() == self.domains.len() {
            return Ok(true);
        }
        let var = self.select_variable();
        for gid in self.domains[&var].clone() {
            self.nodes += 1;
            if let Some(budget) = self.budget {
                if self.nodes > budget {
                    return Err(SolveError::BudgetExhausted { budget });
                }
            }
            if !self.value_admissible(var, gid) {
                continue;
            }

            let group_len = self.set.group(gid).len() as u32;
            let instructor = self.set.group(gid).instructor_id;
            self.assignment.insert(var, gid);
            *self.loads.entry(instructor).or_insert(0) += group_len;
            self.instructor_groups.entry(instructor).or_default().push(gid);

            if let Some(journal) = self.forward_check(var, gid) {
                if self.run()? {
                    return Ok(true);
                }
                self.restore(journal);
            }

            self.assignment.remove(&var);
            *self.loads.get_mut(&instructor).expect("load was added") -= group_len;
            self.instructor_groups
                .get_mut(&instructor)
                .expect("group was added")
                .pop();
        }
        Ok(false)
    }

    /// MRV: smallest current domain, ties to the smaller subject id.
    fn select_variable(&self) -> SubjectId {
        self.domains
            .iter()
            .filter(|(var, _)| !self.assignment.contains_key(var))
            .map(|(&var, domain)| (domain.len(), var))
            .min()
            .expect("run() only recurses while variables remain")
            .1
    }

    fn value_admissible(&mut self, _var: SubjectId, gid: GroupId) -> bool {
        let group = self.set.group(gid);
        let (max_load, status) = self.instructors[&group.instructor_id];

        // load budget
        let current = self.loads.get(&group.instructor_id).copied().unwrap_or(0);
        if current + group.len() as u32 > max_load {
            return false;
        }

        // consistency with every assigned group
        let assigned: Vec<GroupId> = self.assignment.values().copied().collect();
        if !assigned.iter().all(|&other| self.kernel.compatible(gid, other)) {
            return false;
        }

        // a part-time instructor holding more than one group must spread
        // over at least two days
        if status == EmploymentStatus::PartTime {
            let held = self
                .instructor_groups
                .get(&group.instructor_id)
                .map_or(0, Vec::len);
            if held + 1 > 1 {
                let mut days: BTreeSet<Day> = group.days();
                for &other in self.instructor_groups.get(&group.instructor_id).into_iter().flatten() {
                    days.extend(self.set.group(other).days());
                }
                if days.len() < 2 {
                    return false;
                }
            }
        }
        true
    }

    /// Filters every unassigned domain against the new assignment. Returns
    /// the journal of shrunk domains, or None when one was emptied (in which
    /// case everything is already restored).
    fn forward_check(
        &mut self,
        var: SubjectId,
        gid: GroupId,
    ) -> Option<HashMap<SubjectId, Vec<GroupId>>> {
        let others: Vec<SubjectId> = self
            .domains
            .keys()
            .filter(|&&v| v != var && !self.assignment.contains_key(&v))
            .copied()
            .collect();
        let mut journal: HashMap<SubjectId, Vec<GroupId>> = HashMap::new();
        for other in others {
            let old = self.domains[&other].clone();
            let filtered: Vec<GroupId> = old
                .iter()
                .copied()
                .filter(|&w| self.kernel.compatible(gid, w))
                .collect();
            if filtered.is_empty() {
                debug!("forward check wiped subject {other}; unwinding");
                self.restore(journal);
                return None;
            }
            if filtered.len() < old.len() {
                journal.insert(other, old);
                self.domains.insert(other, filtered);
            }
        }
        Some(journal)
    }

    fn restore(&mut self, journal: HashMap<SubjectId, Vec<GroupId>>) {
        for (var, domain) in journal {
            self.domains.insert(var, domain);
        }
    }
}
