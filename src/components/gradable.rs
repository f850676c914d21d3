use crate::attempt::{ActivityVariant, Attempt, AttemptVariant, ChoiceVariant, InputVariant};
use crate::error::LabResult;
use crate::host::LabHost;
use crate::model::{
    Action, ActionQuery, ActionRequest, ActionType, ComponentInstance, CreateAttemptOptions,
    CreateAttemptResult,
};
use std::marker::PhantomData;
use std::sync::Arc;

pub type ChoiceComponent = GradableComponent<ChoiceVariant>;
pub type InputComponent = GradableComponent<InputVariant>;
pub type ActivityComponent = GradableComponent<ActivityVariant>;

/// A component users make attempts at
pub struct GradableComponent<V: AttemptVariant> {
    instance: ComponentInstance,
    host: Arc<dyn LabHost>,
    variant: PhantomData<fn() -> V>,
}

impl<V: AttemptVariant> GradableComponent<V> {
    pub fn new(instance: ComponentInstance, host: Arc<dyn LabHost>) -> Self {
        Self {
            instance,
            host,
            variant: PhantomData,
        }
    }

    pub fn id(&self) -> &str {
        &self.instance.component_id
    }

    pub fn instance(&self) -> &ComponentInstance {
        &self.instance
    }

    /// Start a new attempt. It still has to be resumed before use.
    pub async fn create_attempt(&self) -> LabResult<Attempt<V>> {
        let action = self
            .host
            .take_action(ActionRequest::CreateAttempt(CreateAttemptOptions {
                component_id: self.id().to_string(),
            }))
            .await?;
        let attempt = self.build_attempt(&action)?;
        tracing::info!(component_id = %self.id(), attempt_id = %attempt.id(), "Attempt created");
        Ok(attempt)
    }

    /// Every attempt recorded for this component, oldest first, none resumed
    pub async fn get_attempts(&self) -> LabResult<Vec<Attempt<V>>> {
        let actions = self
            .host
            .get_actions(&ActionQuery::component_actions(
                self.id(),
                ActionType::CreateAttempt,
            ))
            .await?;
        actions.iter().map(|action| self.build_attempt(action)).collect()
    }

    fn build_attempt(&self, action: &Action) -> LabResult<Attempt<V>> {
        let result: CreateAttemptResult = action.decode_result()?;
        Ok(Attempt::new(
            Arc::clone(&self.host),
            self.id(),
            &result.attempt_id,
            &self.instance.values,
        ))
    }
}
