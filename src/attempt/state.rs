use serde::{Deserialize, Serialize};
use std::fmt;

/// Progress of one attempt. Timeout and Completed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProblemState {
    #[default]
    InProgress,
    Timeout,
    Completed,
}

impl ProblemState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }

    /// Move to `next` unless already terminal. Returns whether the state
    /// changed.
    pub fn advance(&mut self, next: ProblemState) -> bool {
        if self.is_terminal() || *self == next {
            return false;
        }
        *self = next;
        true
    }
}

impl fmt::Display for ProblemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InProgress => "in_progress",
            Self::Timeout => "timeout",
            Self::Completed => "completed",
        })
    }
}
