//! Property-based tests for the ledger
//!
//! Identifiers must stay unique across any mix of configurations, attempts,
//! submissions and dynamically created components.

use super::*;
use crate::model::{
    ComponentKind, CreateAttemptOptions, CreateComponentOptions, SubmitAnswerOptions,
    ValueDefinition, Version,
};
use proptest::prelude::*;
use std::collections::HashSet;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_kind() -> impl Strategy<Value = ComponentKind> {
    prop_oneof![
        Just(ComponentKind::Choice),
        Just(ComponentKind::Input),
        Just(ComponentKind::Activity),
        Just(ComponentKind::Dynamic),
    ]
}

fn arb_component() -> impl Strategy<Value = Component> {
    (
        arb_kind(),
        proptest::collection::vec(("[a-z]{1,6}", 0usize..4), 0..3),
        any::<bool>(),
    )
        .prop_map(|(kind, groups, secure)| {
            let mut component = Component::new(kind);
            for (key, count) in groups {
                let values = (0..count).map(|i| ValueDefinition::hint(format!("v{i}"))).collect();
                component = component.with_values(key, values);
            }
            component.secure = secure;
            component
        })
}

fn arb_configuration() -> impl Strategy<Value = Configuration> {
    proptest::collection::vec(arb_component(), 1..5).prop_map(|components| {
        components
            .into_iter()
            .fold(Configuration::new("Generated", Version::new(0, 1)), Configuration::with_component)
    })
}

#[derive(Debug, Clone)]
enum Step {
    CreateAttempt,
    Submit { graded: bool },
    CreateComponent(Component),
    Reconfigure(Configuration),
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => Just(Step::CreateAttempt),
        3 => any::<bool>().prop_map(|graded| Step::Submit { graded }),
        2 => arb_component().prop_map(Step::CreateComponent),
        1 => arb_configuration().prop_map(Step::Reconfigure),
    ]
}

// ============================================================================
// Helpers
// ============================================================================

fn instance_ids(instance: &ComponentInstance, out: &mut Vec<String>) {
    out.push(instance.component_id.clone());
    for (_, values) in instance.values.iter() {
        out.extend(values.iter().map(|v| v.value_id.clone()));
    }
}

fn first_component_id(ledger: &mut Ledger) -> String {
    ledger
        .configuration_instance()
        .unwrap()
        .and_then(|i| i.components.first().map(|c| c.component_id.clone()))
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_identifiers_never_repeat(
        configuration in arb_configuration(),
        steps in proptest::collection::vec(arb_step(), 0..30),
    ) {
        let mut ledger = Ledger::new();
        ledger.create().unwrap();
        ledger.set_configuration(configuration).unwrap();

        let mut issued = Vec::new();
        let mut attempts: Vec<String> = Vec::new();
        for component in ledger.configuration_instance().unwrap().unwrap().components {
            instance_ids(&component, &mut issued);
        }

        for step in steps {
            let component_id = first_component_id(&mut ledger);
            match step {
                Step::CreateAttempt => {
                    let action = ledger
                        .take_action(&ActionRequest::CreateAttempt(CreateAttemptOptions { component_id }))
                        .unwrap();
                    let id = action.decode_result::<CreateAttemptResult>().unwrap().attempt_id;
                    issued.push(id.clone());
                    attempts.push(id);
                }
                Step::Submit { graded } => {
                    let Some(attempt_id) = attempts.last().cloned() else { continue };
                    let request = ActionRequest::SubmitAnswer(SubmitAnswerOptions {
                        component_id,
                        attempt_id,
                        answer: Value::from("0"),
                    });
                    let action = if graded {
                        ledger
                            .take_completed_action(&request, serde_json::json!({ "score": 1, "complete": true }))
                            .unwrap()
                    } else {
                        ledger.take_action(&request).unwrap()
                    };
                    let result: SubmitAnswerResult = action.decode_result().unwrap();
                    issued.push(result.submission_id.unwrap());
                }
                Step::CreateComponent(component) => {
                    let action = ledger
                        .take_action(&ActionRequest::CreateComponent(CreateComponentOptions {
                            component_id,
                            component,
                            correlation_id: None,
                        }))
                        .unwrap();
                    let created: CreateComponentResult = action.decode_result().unwrap();
                    instance_ids(&created.component_instance, &mut issued);
                }
                Step::Reconfigure(configuration) => {
                    ledger.set_configuration(configuration).unwrap();
                    prop_assert!(ledger.all_actions().is_empty());
                    attempts.clear();
                    for component in ledger.configuration_instance().unwrap().unwrap().components {
                        instance_ids(&component, &mut issued);
                    }
                }
            }
        }

        let unique: HashSet<_> = issued.iter().collect();
        prop_assert_eq!(unique.len(), issued.len(), "duplicate identifier in {:?}", issued);
    }

    #[test]
    fn prop_queries_preserve_append_order(attempt_count in 1usize..6, submits in proptest::collection::vec(0usize..6, 0..20)) {
        let mut ledger = Ledger::new();
        ledger.create().unwrap();
        ledger
            .set_configuration(
                Configuration::new("Ordered", Version::new(0, 1))
                    .with_component(Component::new(ComponentKind::Input)),
            )
            .unwrap();
        let component_id = first_component_id(&mut ledger);

        let mut attempts = Vec::new();
        for _ in 0..attempt_count {
            let action = ledger
                .take_action(&ActionRequest::CreateAttempt(CreateAttemptOptions { component_id: component_id.clone() }))
                .unwrap();
            attempts.push(action.decode_result::<CreateAttemptResult>().unwrap().attempt_id);
        }
        for (n, index) in submits.iter().enumerate() {
            let attempt_id = attempts[index % attempts.len()].clone();
            ledger
                .take_completed_action(
                    &ActionRequest::SubmitAnswer(SubmitAnswerOptions {
                        component_id: component_id.clone(),
                        attempt_id,
                        answer: Value::from(n),
                    }),
                    serde_json::json!({ "score": 0, "complete": false }),
                )
                .unwrap();
        }

        for attempt_id in &attempts {
            let answers: Vec<u64> = ledger
                .get_actions(&ActionQuery::attempt(attempt_id.clone()))
                .iter()
                .map(|a| a.options["answer"].as_u64().unwrap())
                .collect();
            let mut sorted = answers.clone();
            sorted.sort_unstable();
            prop_assert_eq!(answers, sorted);
        }
    }
}
