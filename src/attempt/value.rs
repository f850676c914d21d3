//! Lazily fetched attempt values

use crate::error::LabResult;
use crate::host::LabHost;
use crate::model::{ActionRequest, GetValueOptions, GetValueResult, ValueInstance};
use serde_json::Value;

/// One hint or answer slot of an attempt. Fetching it records a `GetValue`
/// action; once fetched, the cached value is returned without another
/// round-trip.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueHolder {
    pub id: String,
    pub is_hint: bool,
    pub has_been_requested: bool,
    pub has_value: bool,
    pub value: Option<Value>,
    component_id: String,
    attempt_id: String,
}

impl ValueHolder {
    pub(crate) fn new(component_id: &str, attempt_id: &str, instance: &ValueInstance) -> Self {
        Self {
            id: instance.value_id.clone(),
            is_hint: instance.is_hint,
            has_been_requested: false,
            has_value: instance.has_value,
            value: instance.value.clone(),
            component_id: component_id.to_string(),
            attempt_id: attempt_id.to_string(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.has_value && self.has_been_requested
    }

    /// Return the value, asking the host for it the first time only
    pub async fn get_value(&mut self, host: &dyn LabHost) -> LabResult<Value> {
        if self.is_resolved() {
            return Ok(self.value.clone().unwrap_or(Value::Null));
        }

        let action = host
            .take_action(ActionRequest::GetValue(GetValueOptions {
                component_id: self.component_id.clone(),
                attempt_id: self.attempt_id.clone(),
                value_id: self.id.clone(),
                is_hint: self.is_hint,
            }))
            .await?;
        let result: GetValueResult = action.decode_result()?;

        tracing::debug!(value_id = %self.id, attempt_id = %self.attempt_id, "Value fetched");
        self.provide(result.value.clone());
        Ok(result.value)
    }

    /// Mark the value as fetched, as when replaying a recorded `GetValue`
    pub fn provide(&mut self, value: Value) {
        self.value = Some(value);
        self.has_value = true;
        self.has_been_requested = true;
    }
}
