//! Property-based tests for attempt replay
//!
//! Whatever a live attempt does, a copy resumed from the same ledger must
//! end up in the same place.

use super::*;
use crate::host::testing::choice_configuration;
use crate::host::InMemoryLabHost;
use crate::model::{CreateAttemptOptions, CreateAttemptResult, Version};
use proptest::prelude::*;
use serde_json::json;

// ============================================================================
// Arbitrary Generators
// ============================================================================

#[derive(Debug, Clone)]
enum Step {
    Submit { correct: bool, complete: bool },
    Hint(usize),
    Timeout,
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => (any::<bool>(), any::<bool>())
            .prop_map(|(correct, complete)| Step::Submit { correct, complete }),
        2 => (0usize..2).prop_map(Step::Hint),
        1 => Just(Step::Timeout),
    ]
}

// ============================================================================
// Test Helpers
// ============================================================================

/// Observable projection of an attempt
fn snapshot(attempt: &ChoiceAttempt) -> (ProblemState, Vec<Submission<Value>>, Vec<bool>) {
    let resolved = attempt
        .values("hints")
        .unwrap()
        .iter()
        .map(ValueHolder::is_resolved)
        .collect();
    (attempt.state(), attempt.submissions().unwrap().to_vec(), resolved)
}

async fn run(steps: Vec<Step>) {
    let host = Arc::new(InMemoryLabHost::new(Version::new(0, 1)));
    host.create(Value::Null).await.unwrap();
    host.set_configuration(choice_configuration()).await.unwrap();
    let component = host.get_configuration_instance().await.unwrap().unwrap().components[0].clone();

    let created = host
        .take_action(ActionRequest::CreateAttempt(CreateAttemptOptions {
            component_id: component.component_id.clone(),
        }))
        .await
        .unwrap();
    let attempt_id = created.decode_result::<CreateAttemptResult>().unwrap().attempt_id;

    let mut live: ChoiceAttempt =
        Attempt::new(host.clone(), &component.component_id, &attempt_id, &component.values);
    live.resume().await.unwrap();

    for step in steps {
        match step {
            Step::Submit { correct, complete } => {
                let answer = if correct { json!("0") } else { json!("1") };
                let score = if correct { 1.0 } else { 0.0 };
                live.submit(answer, SubmissionResult::new(Some(score), complete))
                    .await
                    .unwrap();
            }
            Step::Hint(index) => {
                live.get_value("hints", index).await.unwrap();
            }
            Step::Timeout => live.timeout().await.unwrap(),
        }
    }

    let mut resumed: ChoiceAttempt =
        Attempt::new(host.clone(), &component.component_id, &attempt_id, &component.values);
    resumed.resume().await.unwrap();
    assert_eq!(snapshot(&resumed), snapshot(&live));

    // Replaying twice lands in the same place
    let mut again: ChoiceAttempt =
        Attempt::new(host, &component.component_id, &attempt_id, &component.values);
    again.resume().await.unwrap();
    assert_eq!(snapshot(&again), snapshot(&resumed));
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_resumed_attempt_matches_live(steps in prop::collection::vec(arb_step(), 0..12)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(run(steps));
    }

    #[test]
    fn prop_state_never_leaves_terminal(
        first in prop_oneof![Just(ProblemState::Timeout), Just(ProblemState::Completed)],
        rest in prop::collection::vec(
            prop_oneof![
                Just(ProblemState::InProgress),
                Just(ProblemState::Timeout),
                Just(ProblemState::Completed),
            ],
            0..8,
        ),
    ) {
        let mut state = ProblemState::InProgress;
        state.advance(first);
        for next in rest {
            prop_assert!(!state.advance(next));
        }
        prop_assert_eq!(state, first);
    }
}
