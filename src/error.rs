use crate::types::{Side, TeamId};

/// Errors raised by a `MatchStore` implementation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("slot {side} of {label} changed underneath the writer (expected {expected:?}, found {found:?})")]
    Conflict {
        label: String,
        side: Side,
        expected: Option<TeamId>,
        found: Option<TeamId>,
    },

    #[error("display code {0} is already used in this competition")]
    DuplicateCode(String),

    #[error("match {0} not found")]
    NotFound(String),

    #[error("match store lock poisoned: {0}")]
    Poisoned(String),

    #[error("match store serialization failed: {0}")]
    Serialization(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("invalid input: {0}")]
    InputValidation(String),

    #[error(
        "not enough playing weeks for {fixtures} fixtures at {per_week} per week: weeksNeeded={weeks_needed}, weeksAvailable={weeks_available}. {}",
        .suggestions.join(" ")
    )]
    Capacity {
        fixtures: usize,
        per_week: usize,
        weeks_needed: usize,
        weeks_available: usize,
        suggestions: Vec<String>,
    },

    #[error(
        "could not place matchday {matchday} fixture {home} vs {away}; slot utilization per week: {}",
        format_utilization(.utilization)
    )]
    Deadlock {
        matchday: usize,
        home: TeamId,
        away: TeamId,
        utilization: Vec<(usize, usize)>,
    },

    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),

    #[error("concurrent writers disagree on the {side} slot of {label}")]
    Conflict { label: String, side: Side },

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ScheduleError {
    pub fn input(message: impl Into<String>) -> Self {
        ScheduleError::InputValidation(message.into())
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        ScheduleError::InvariantViolation(message.into())
    }

    /// Expected conditions the caller can fix by changing the request.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ScheduleError::InputValidation(_)
                | ScheduleError::Capacity { .. }
                | ScheduleError::Deadlock { .. }
                | ScheduleError::NotFound(_)
        )
    }
}

fn format_utilization(utilization: &[(usize, usize)]) -> String {
    utilization
        .iter()
        .enumerate()
        .map(|(idx, (used, capacity))| format!("w{}={used}/{capacity}", idx + 1))
        .collect::<Vec<_>>()
        .join(", ")
}
