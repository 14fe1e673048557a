use crate::data::SubjectId;

/// Terminal failures of a solver run. Everything here leaves external state
/// untouched; only the commit boundary performs side effects.
#[derive(Debug, thiserror::Error)]
pub enum SolveError {
    #[error("invalid input: {0}")]
    InputInvalid(String),
    #[error("arc consistency emptied the domain of subject {subject_id}")]
    Ac3Infeasible { subject_id: SubjectId },
    #[error("no feasible schedule exists for the given inputs")]
    SearchInfeasible,
    #[error("search exhausted its node budget of {budget}")]
    BudgetExhausted { budget: u64 },
    #[error("boundary failure: {0}")]
    Boundary(String),
}

impl SolveError {
    /// True for the "no schedule possible" family of outcomes.
    pub fn is_infeasible(&self) -> bool {
        matches!(
            self,
            SolveError::Ac3Infeasible { .. }
                | SolveError::SearchInfeasible
                | SolveError::BudgetExhausted { .. }
        )
    }
}
