//! Attempt state machine
//!
//! An [`Attempt`] is one user's run at a gradable component. Its state is
//! never stored: [`Attempt::resume`] replays the attempt's actions from the
//! ledger, and every later operation folds the action it records the same
//! way, so a live attempt and a freshly resumed copy always agree.
//!
//! Resume folds into a scratch projection and commits it only after the
//! host accepts the `ResumeAttempt` action. A failed resume leaves the
//! attempt untouched and can simply be retried.

mod state;
mod value;
mod variant;

#[cfg(test)]
mod proptests;

pub use state::ProblemState;
pub use value::ValueHolder;
pub use variant::{
    ActivityVariant, AttemptVariant, ChoiceVariant, InputVariant, Submission, SubmissionResult,
    SubmissionVariant,
};

use crate::error::{LabError, LabResult};
use crate::host::LabHost;
use crate::model::{
    Action, ActionQuery, ActionRequest, AttemptTimeoutOptions, GetValueOptions, GetValueResult,
    ResumeAttemptOptions, SubmitAnswerOptions, SubmitAnswerResult, ValueInstance, ValueMap,
};
use serde_json::Value;
use std::sync::Arc;

pub type ChoiceAttempt = Attempt<ChoiceVariant>;
pub type InputAttempt = Attempt<InputVariant>;
pub type ActivityAttempt = Attempt<ActivityVariant>;

/// State shared by every attempt kind
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptCore {
    pub state: ProblemState,
    pub values: ValueMap<ValueHolder>,
}

impl AttemptCore {
    /// Resolve the holder named by a `GetValue` action
    pub(crate) fn use_value(&mut self, action: &Action) -> LabResult<()> {
        let options: GetValueOptions = action.decode_options()?;
        let result: GetValueResult = action.decode_result()?;

        let holder = self
            .values
            .iter_mut()
            .flat_map(|(_, holders)| holders.iter_mut())
            .find(|holder| holder.id == options.value_id)
            .ok_or_else(|| LabError::ValueNotFound(options.value_id.clone()))?;
        holder.provide(result.value);
        Ok(())
    }
}

pub struct Attempt<V: AttemptVariant> {
    host: Arc<dyn LabHost>,
    id: String,
    component_id: String,
    resumed: bool,
    initial: AttemptCore,
    core: AttemptCore,
    variant: V,
}

impl<V: AttemptVariant> Attempt<V> {
    pub(crate) fn new(
        host: Arc<dyn LabHost>,
        component_id: &str,
        attempt_id: &str,
        values: &ValueMap<ValueInstance>,
    ) -> Self {
        let initial = AttemptCore {
            state: ProblemState::InProgress,
            values: values.map(|instance| ValueHolder::new(component_id, attempt_id, instance)),
        };
        Self {
            host,
            id: attempt_id.to_string(),
            component_id: component_id.to_string(),
            resumed: false,
            core: initial.clone(),
            initial,
            variant: V::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn component_id(&self) -> &str {
        &self.component_id
    }

    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    pub fn state(&self) -> ProblemState {
        self.core.state
    }

    /// Replay this attempt's recorded actions and tell the host it resumed.
    /// Must succeed once before the attempt can be used.
    pub async fn resume(&mut self) -> LabResult<()> {
        if self.resumed {
            return Err(LabError::AlreadyResumed);
        }

        let actions = self.host.get_actions(&ActionQuery::attempt(&self.id)).await?;
        let mut core = self.initial.clone();
        let mut variant = V::default();
        for action in &actions {
            variant.fold(&mut core, action)?;
        }

        self.host
            .take_action(ActionRequest::ResumeAttempt(ResumeAttemptOptions {
                component_id: self.component_id.clone(),
                attempt_id: self.id.clone(),
            }))
            .await?;

        self.core = core;
        self.variant = variant;
        self.resumed = true;
        tracing::info!(
            attempt_id = %self.id,
            kind = ?V::kind(),
            replayed = actions.len(),
            state = %self.core.state,
            "Attempt resumed"
        );
        Ok(())
    }

    fn verify_resumed(&self) -> LabResult<()> {
        if self.resumed {
            Ok(())
        } else {
            Err(LabError::NotResumed)
        }
    }

    /// Value holders under `key`; empty when the component declares none
    pub fn values(&self, key: &str) -> LabResult<&[ValueHolder]> {
        self.verify_resumed()?;
        Ok(self.core.values.get(key).unwrap_or_default())
    }

    pub fn value_keys(&self) -> Vec<&str> {
        self.core.values.keys().collect()
    }

    /// Fetch the value at `index` under `key`, at most once per holder
    pub async fn get_value(&mut self, key: &str, index: usize) -> LabResult<Value> {
        self.verify_resumed()?;
        let host = Arc::clone(&self.host);
        let holder = self
            .core
            .values
            .get_mut(key)
            .and_then(|holders| holders.get_mut(index))
            .ok_or_else(|| LabError::ValueNotFound(format!("{key}[{index}]")))?;
        holder.get_value(host.as_ref()).await
    }

    async fn record(&mut self, request: ActionRequest, result: Option<Value>) -> LabResult<Action> {
        self.verify_resumed()?;
        let action = match result {
            Some(result) => self.host.take_completed_action(request, result).await?,
            None => self.host.take_action(request).await?,
        };
        self.variant.fold(&mut self.core, &action)?;
        Ok(action)
    }
}

impl<V: SubmissionVariant> Attempt<V> {
    pub fn submissions(&self) -> LabResult<&[Submission<V::Answer>]> {
        self.verify_resumed()?;
        Ok(self.variant.submissions())
    }

    /// Record an answer the lab graded itself
    pub async fn submit(
        &mut self,
        answer: V::Answer,
        result: SubmissionResult,
    ) -> LabResult<Submission<V::Answer>> {
        let request = ActionRequest::SubmitAnswer(SubmitAnswerOptions {
            component_id: self.component_id.clone(),
            attempt_id: self.id.clone(),
            answer: serde_json::to_value(&answer)?,
        });
        let graded = serde_json::to_value(SubmitAnswerResult::graded(result.score, result.complete))?;
        let action = self.record(request, Some(graded)).await?;

        tracing::info!(
            attempt_id = %self.id,
            complete = result.complete,
            time = action.time,
            "Answer submitted"
        );
        self.variant
            .submissions()
            .last()
            .cloned()
            .ok_or_else(|| LabError::invalid_payload("submission was not recorded"))
    }

    /// Mark the attempt as timed out
    pub async fn timeout(&mut self) -> LabResult<()> {
        let request = ActionRequest::AttemptTimeout(AttemptTimeoutOptions {
            component_id: self.component_id.clone(),
            attempt_id: self.id.clone(),
        });
        self.record(request, None).await?;
        tracing::info!(attempt_id = %self.id, "Attempt timed out");
        Ok(())
    }
}

impl Attempt<ActivityVariant> {
    /// Mark the activity as done. The ledger supplies the result.
    pub async fn complete(&mut self) -> LabResult<()> {
        let request = ActionRequest::SubmitAnswer(SubmitAnswerOptions {
            component_id: self.component_id.clone(),
            attempt_id: self.id.clone(),
            answer: Value::Null,
        });
        self.record(request, None).await?;
        tracing::info!(attempt_id = %self.id, "Activity completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::{choice_configuration, RecordingHost};
    use crate::model::{
        ActionType, Component, ComponentKind, Configuration, CreateAttemptOptions,
        CreateAttemptResult, ValueDefinition, Version,
    };
    use serde_json::json;

    /// A created lab with `configuration`, and the first component's
    /// instance values
    async fn setup(
        configuration: Configuration,
    ) -> (Arc<RecordingHost>, String, ValueMap<ValueInstance>) {
        let host = Arc::new(RecordingHost::new());
        host.create(Value::Null).await.unwrap();
        host.set_configuration(configuration).await.unwrap();
        let instance = host.get_configuration_instance().await.unwrap().unwrap();
        let component = instance.components[0].clone();
        (host, component.component_id, component.values)
    }

    async fn new_attempt<V: AttemptVariant>(
        host: &Arc<RecordingHost>,
        component_id: &str,
        values: &ValueMap<ValueInstance>,
    ) -> Attempt<V> {
        let action = host
            .take_action(ActionRequest::CreateAttempt(CreateAttemptOptions {
                component_id: component_id.to_string(),
            }))
            .await
            .unwrap();
        let result: CreateAttemptResult = action.decode_result().unwrap();
        Attempt::new(host.clone(), component_id, &result.attempt_id, values)
    }

    fn reopen<V: AttemptVariant>(
        host: &Arc<RecordingHost>,
        live: &Attempt<V>,
        values: &ValueMap<ValueInstance>,
    ) -> Attempt<V> {
        Attempt::new(host.clone(), live.component_id(), live.id(), values)
    }

    #[tokio::test]
    async fn test_choice_scenario_replays_identically() {
        let (host, component_id, values) = setup(choice_configuration()).await;
        let mut attempt: ChoiceAttempt = new_attempt(&host, &component_id, &values).await;

        attempt.resume().await.unwrap();
        assert_eq!(attempt.state(), ProblemState::InProgress);
        assert!(attempt.submissions().unwrap().is_empty());
        let hints = attempt.values("hints").unwrap();
        assert_eq!(hints.len(), 2);
        assert!(hints.iter().all(|hint| !hint.is_resolved()));

        let wrong = attempt
            .submit(json!("1"), SubmissionResult::new(Some(0.0), false))
            .await
            .unwrap();
        assert_eq!(wrong.result.score, Some(0.0));
        assert_eq!(attempt.submissions().unwrap().len(), 1);
        assert_eq!(attempt.state(), ProblemState::InProgress);

        attempt
            .submit(json!("0"), SubmissionResult::new(Some(1.0), true))
            .await
            .unwrap();
        assert_eq!(attempt.submissions().unwrap().len(), 2);
        assert_eq!(attempt.state(), ProblemState::Completed);

        let mut fresh = reopen(&host, &attempt, &values);
        fresh.resume().await.unwrap();
        assert_eq!(fresh.state(), ProblemState::Completed);
        assert_eq!(fresh.submissions().unwrap(), attempt.submissions().unwrap());
    }

    #[tokio::test]
    async fn test_mutators_require_resume() {
        let (host, component_id, values) = setup(choice_configuration()).await;
        let mut attempt: ChoiceAttempt = new_attempt(&host, &component_id, &values).await;

        assert!(!attempt.is_resumed());
        assert!(matches!(attempt.submissions(), Err(LabError::NotResumed)));
        assert!(matches!(attempt.values("hints"), Err(LabError::NotResumed)));
        assert!(matches!(attempt.get_value("hints", 0).await, Err(LabError::NotResumed)));
        assert!(matches!(attempt.timeout().await, Err(LabError::NotResumed)));
        assert!(matches!(
            attempt.submit(json!("0"), SubmissionResult::new(Some(1.0), true)).await,
            Err(LabError::NotResumed)
        ));
        assert_eq!(host.count(ActionType::SubmitAnswer), 0);

        attempt.resume().await.unwrap();
        assert!(matches!(attempt.resume().await, Err(LabError::AlreadyResumed)));
        attempt.timeout().await.unwrap();
        assert_eq!(attempt.state(), ProblemState::Timeout);
    }

    #[tokio::test]
    async fn test_get_value_fetches_once() {
        let (host, component_id, values) = setup(choice_configuration()).await;
        let mut attempt: ChoiceAttempt = new_attempt(&host, &component_id, &values).await;
        attempt.resume().await.unwrap();

        assert_eq!(attempt.get_value("hints", 0).await.unwrap(), json!("First hint"));
        assert_eq!(attempt.get_value("hints", 0).await.unwrap(), json!("First hint"));
        assert_eq!(host.count(ActionType::GetValue), 1);
        assert!(attempt.values("hints").unwrap()[0].is_resolved());
        assert!(!attempt.values("hints").unwrap()[1].is_resolved());

        assert!(matches!(
            attempt.get_value("hints", 5).await,
            Err(LabError::ValueNotFound(_))
        ));

        // A resumed copy already knows the value
        let mut fresh = reopen(&host, &attempt, &values);
        fresh.resume().await.unwrap();
        assert!(fresh.values("hints").unwrap()[0].is_resolved());
        assert_eq!(fresh.get_value("hints", 0).await.unwrap(), json!("First hint"));
        assert_eq!(host.count(ActionType::GetValue), 1);
    }

    #[tokio::test]
    async fn test_failed_resume_can_be_retried() {
        let (host, component_id, values) = setup(choice_configuration()).await;
        let mut attempt: ChoiceAttempt = new_attempt(&host, &component_id, &values).await;
        attempt.resume().await.unwrap();
        attempt
            .submit(json!("1"), SubmissionResult::new(Some(0.0), false))
            .await
            .unwrap();

        let mut fresh = reopen(&host, &attempt, &values);
        host.fail_next(ActionType::ResumeAttempt, LabError::Disconnected);
        assert!(matches!(fresh.resume().await, Err(LabError::Disconnected)));
        assert!(!fresh.is_resumed());
        assert!(matches!(fresh.submissions(), Err(LabError::NotResumed)));

        fresh.resume().await.unwrap();
        assert_eq!(fresh.submissions().unwrap().len(), 1);
        assert_eq!(host.count(ActionType::ResumeAttempt), 3);
    }

    #[tokio::test]
    async fn test_input_answers_are_text() {
        let configuration = Configuration::new("Input Lab", Version::new(0, 1)).with_component(
            Component::new(ComponentKind::Input)
                .with_field("question", "2 + 2?")
                .with_values("answers", vec![ValueDefinition::plain("4")])
                .secured(),
        );
        let (host, component_id, values) = setup(configuration).await;
        let mut attempt: InputAttempt = new_attempt(&host, &component_id, &values).await;
        attempt.resume().await.unwrap();

        // Secured values only arrive through GetValue
        let answers = attempt.values("answers").unwrap();
        assert!(!answers[0].has_value);
        assert_eq!(answers[0].value, None);
        assert_eq!(attempt.get_value("answers", 0).await.unwrap(), json!("4"));

        let submission = attempt
            .submit("4".to_string(), SubmissionResult::new(Some(1.0), true))
            .await
            .unwrap();
        assert_eq!(submission.answer, "4");
        assert_eq!(attempt.state(), ProblemState::Completed);
    }

    #[tokio::test]
    async fn test_activity_completes_and_ignores_timeout() {
        let configuration = Configuration::new("Activity Lab", Version::new(0, 1))
            .with_component(Component::new(ComponentKind::Activity).named("Read"));
        let (host, component_id, values) = setup(configuration).await;
        let mut attempt: ActivityAttempt = new_attempt(&host, &component_id, &values).await;
        attempt.resume().await.unwrap();

        // Recorded directly: activities expose no timeout of their own
        host.take_action(ActionRequest::AttemptTimeout(AttemptTimeoutOptions {
            component_id: component_id.clone(),
            attempt_id: attempt.id().to_string(),
        }))
        .await
        .unwrap();

        attempt.complete().await.unwrap();
        assert_eq!(attempt.state(), ProblemState::Completed);

        let mut fresh = reopen(&host, &attempt, &values);
        fresh.resume().await.unwrap();
        assert_eq!(fresh.state(), ProblemState::Completed);
        let submitted = host
            .get_actions(&ActionQuery::attempt(attempt.id()))
            .await
            .unwrap()
            .into_iter()
            .find(|action| action.action_type == ActionType::SubmitAnswer)
            .unwrap();
        assert_eq!(submitted.result["complete"], json!(true));
    }

    #[tokio::test]
    async fn test_client_graded_activity_submission_still_completes() {
        let configuration = Configuration::new("Activity Lab", Version::new(0, 1))
            .with_component(Component::new(ComponentKind::Activity));
        let (host, component_id, values) = setup(configuration).await;
        let attempt: ActivityAttempt = new_attempt(&host, &component_id, &values).await;

        host.take_completed_action(
            ActionRequest::SubmitAnswer(SubmitAnswerOptions {
                component_id: component_id.clone(),
                attempt_id: attempt.id().to_string(),
                answer: Value::Null,
            }),
            json!({ "complete": false, "score": 0.5 }),
        )
        .await
        .unwrap();

        let mut fresh = reopen(&host, &attempt, &values);
        fresh.resume().await.unwrap();
        assert_eq!(fresh.state(), ProblemState::Completed);
    }
}
