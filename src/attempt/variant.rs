//! Per-kind interpretation of attempt actions

use super::{AttemptCore, ProblemState};
use crate::error::LabResult;
use crate::model::{Action, ActionType, ComponentKind, SubmitAnswerOptions, SubmitAnswerResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How one kind of attempt folds ledger actions into its state
pub trait AttemptVariant: Default + Send + Sync {
    fn kind() -> ComponentKind;

    /// Apply one completed action. Folding the same log into a fresh
    /// variant always yields the same result.
    fn fold(&mut self, core: &mut AttemptCore, action: &Action) -> LabResult<()>;
}

/// Variants that keep a graded submission history
pub trait SubmissionVariant: AttemptVariant {
    type Answer: Serialize + DeserializeOwned + Clone + Send + Sync;

    fn submissions(&self) -> &[Submission<Self::Answer>];
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub score: Option<f64>,
    pub complete: bool,
}

impl SubmissionResult {
    pub fn new(score: Option<f64>, complete: bool) -> Self {
        Self { score, complete }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission<A> {
    pub answer: A,
    pub result: SubmissionResult,
    /// Milliseconds since the epoch, as recorded by the ledger
    pub time: i64,
}

fn fold_submission<A: DeserializeOwned>(
    submissions: &mut Vec<Submission<A>>,
    core: &mut AttemptCore,
    action: &Action,
) -> LabResult<()> {
    match action.action_type {
        ActionType::SubmitAnswer => {
            let options: SubmitAnswerOptions = action.decode_options()?;
            let result: SubmitAnswerResult = action.decode_result()?;
            let answer = serde_json::from_value(options.answer)?;
            if result.complete {
                core.state.advance(ProblemState::Completed);
            }
            submissions.push(Submission {
                answer,
                result: SubmissionResult::new(result.score, result.complete),
                time: action.time,
            });
            Ok(())
        }
        ActionType::AttemptTimeout => {
            core.state.advance(ProblemState::Timeout);
            Ok(())
        }
        ActionType::GetValue => core.use_value(action),
        _ => Ok(()),
    }
}

// ============================================================================
// Choice
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChoiceVariant {
    submissions: Vec<Submission<Value>>,
}

impl AttemptVariant for ChoiceVariant {
    fn kind() -> ComponentKind {
        ComponentKind::Choice
    }

    fn fold(&mut self, core: &mut AttemptCore, action: &Action) -> LabResult<()> {
        fold_submission(&mut self.submissions, core, action)
    }
}

impl SubmissionVariant for ChoiceVariant {
    /// The selected choice ids
    type Answer = Value;

    fn submissions(&self) -> &[Submission<Value>] {
        &self.submissions
    }
}

// ============================================================================
// Input
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputVariant {
    submissions: Vec<Submission<String>>,
}

impl AttemptVariant for InputVariant {
    fn kind() -> ComponentKind {
        ComponentKind::Input
    }

    fn fold(&mut self, core: &mut AttemptCore, action: &Action) -> LabResult<()> {
        fold_submission(&mut self.submissions, core, action)
    }
}

impl SubmissionVariant for InputVariant {
    type Answer = String;

    fn submissions(&self) -> &[Submission<String>] {
        &self.submissions
    }
}

// ============================================================================
// Activity
// ============================================================================

/// Activities only track completion. A timeout does not apply to them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityVariant;

impl AttemptVariant for ActivityVariant {
    fn kind() -> ComponentKind {
        ComponentKind::Activity
    }

    fn fold(&mut self, core: &mut AttemptCore, action: &Action) -> LabResult<()> {
        match action.action_type {
            ActionType::SubmitAnswer => {
                core.state.advance(ProblemState::Completed);
                Ok(())
            }
            ActionType::GetValue => core.use_value(action),
            _ => Ok(()),
        }
    }
}
