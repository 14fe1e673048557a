//! End-to-end solve: load, generate candidates, propagate, search, diff.
//!
//! No stage before the returned diff touches external state; terminal
//! failures also land in the diagnostics the caller passed in.

use crate::candidates;
use crate::commit::{self, ScheduleDiff};
use crate::compat::CompatKernel;
use crate::data::{Diagnostic, DiagnosticKind};
use crate::error::SolveError;
use crate::loader::{self, RawSnapshot};
use crate::propagate;
use crate::search;
use log::info;
use std::collections::HashMap;
use std::time::Instant;

/// Result of a successful run: the diff to hand to the write port.
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub diff: ScheduleDiff,
    pub assigned_subjects: usize,
    pub sessions: usize,
}

/// Solves the scheduling problem over one snapshot.
pub fn solve(
    raw: &RawSnapshot,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<SolveOutcome, SolveError> {
    let started = Instant::now();
    let (snapshot, mut load_diags) = loader::load(raw)?;
    diagnostics.append(&mut load_diags);

    let (set, mut gen_diags) = candidates::build_domains(&snapshot);
    diagnostics.append(&mut gen_diags);

    if set.domains.is_empty() {
        if raw.subjects.is_empty() {
            // nothing asked for, nothing to do
            let diff = commit::build_diff(&HashMap::new(), &set, &snapshot);
            return Ok(SolveOutcome {
                diff,
                assigned_subjects: 0,
                sessions: 0,
            });
        }
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::SearchFailure,
            None,
            "every subject was dropped before search".into(),
        ));
        return Err(SolveError::SearchInfeasible);
    }

    let mut kernel = CompatKernel::new(&set.arena);
    let mut domains = set.domains.clone();
    if let Err(err) = propagate::ac3(&mut domains, &mut kernel, snapshot.config.ac3_trim_threshold)
    {
        if let SolveError::Ac3Infeasible { subject_id } = &err {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::Ac3Failure,
                Some(*subject_id),
                "arc consistency left no candidate group".into(),
            ));
        }
        return Err(err);
    }

    let assignment = match search::backtrack(&snapshot, &set, &mut kernel, domains) {
        Ok(assignment) => assignment,
        Err(err) => {
            let diag = match &err {
                SolveError::BudgetExhausted { budget } => Diagnostic::new(
                    DiagnosticKind::BudgetExhausted,
                    None,
                    format!("search stopped after the node budget of {budget}"),
                ),
                _ => Diagnostic::new(
                    DiagnosticKind::SearchFailure,
                    None,
                    "no complete assignment exists for the pruned domains".into(),
                ),
            };
            diagnostics.push(diag);
            return Err(err);
        }
    };
    kernel.log_stats();

    let diff = commit::build_diff(&assignment, &set, &snapshot);
    let sessions = diff.to_insert.len();
    info!(
        "schedule for {} subjects ({} sessions) found in {:.2?}",
        assignment.len(),
        sessions,
        started.elapsed()
    );
    Ok(SolveOutcome {
        assigned_subjects: assignment.len(),
        sessions,
        diff,
    })
}
