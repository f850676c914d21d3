//! Session ledger
//!
//! The single source of truth for per-user lab state: the authored
//! configuration, its materialized instance, and the append-only log of
//! completed actions. Identifiers come from one counter that only moves
//! forward, so an identifier is never handed out twice.

#[cfg(test)]
mod proptests;

use crate::db::{Database, LedgerSnapshot};
use crate::error::{LabError, LabResult};
use crate::model::{
    Action, ActionQuery, ActionRequest, ActionType, Component, ComponentInstance, Configuration,
    ConfigurationInstance, CreateAttemptResult, CreateComponentOptions, CreateComponentResult,
    GetValueOptions, GetValueResult, SubmitAnswerResult, ValueInstance,
};
use serde_json::Value;
use std::collections::HashMap;

/// Authored component and the instance derived from it
#[derive(Debug, Clone)]
struct Binding {
    component: Component,
    instance: ComponentInstance,
}

impl Binding {
    /// Resolve an instance value id back to the authored value
    fn authored_value(&self, value_id: &str) -> Option<&Value> {
        self.instance.values.iter().find_map(|(key, instances)| {
            let index = instances.iter().position(|v| v.value_id == value_id)?;
            self.component.values.get(key)?.get(index).map(|d| &d.value)
        })
    }
}

pub struct Ledger {
    created: bool,
    configuration: Option<Configuration>,
    instance: Option<ConfigurationInstance>,
    state: Option<Value>,
    actions: Vec<Action>,
    next_id: u64,
    bindings: HashMap<String, Binding>,
    journal: Option<Database>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    /// A fresh, purely in-memory ledger
    pub fn new() -> Self {
        Self {
            created: false,
            configuration: None,
            instance: None,
            state: None,
            actions: Vec::new(),
            next_id: 0,
            bindings: HashMap::new(),
            journal: None,
        }
    }

    /// Restore a ledger from `db` and journal every later mutation to it
    pub fn with_journal(db: Database) -> LabResult<Self> {
        let mut ledger = Self::restore(&db)?;
        ledger.journal = Some(db);
        Ok(ledger)
    }

    /// Restore a ledger from `db` into memory only. Later mutations never
    /// reach the database.
    pub fn restore(db: &Database) -> LabResult<Self> {
        let snapshot = db.load_snapshot()?.unwrap_or_default();
        let actions = db.load_actions()?;

        let mut ledger = Self {
            created: snapshot.created,
            configuration: snapshot.configuration,
            instance: snapshot.instance,
            state: snapshot.state,
            actions,
            next_id: snapshot.next_id,
            bindings: HashMap::new(),
            journal: None,
        };
        ledger.rebuild_bindings()?;

        // Never hand out an id that already appears in the restored records
        if let Some(highest) = ledger.highest_recorded_id()? {
            if highest >= ledger.next_id {
                tracing::warn!(
                    stored = ledger.next_id,
                    highest,
                    "Snapshot counter behind recorded ids"
                );
                ledger.next_id = highest + 1;
            }
        }

        tracing::info!(
            created = ledger.created,
            actions = ledger.actions.len(),
            next_id = ledger.next_id,
            "Ledger restored"
        );
        Ok(ledger)
    }

    /// Bindings are never stored; they are re-derived from the instance and
    /// from every recorded `CreateComponent` action.
    fn rebuild_bindings(&mut self) -> LabResult<()> {
        self.bindings.clear();

        if let (Some(configuration), Some(instance)) = (&self.configuration, &self.instance) {
            for (component, instance) in configuration.components.iter().zip(&instance.components) {
                self.bindings.insert(
                    instance.component_id.clone(),
                    Binding {
                        component: component.clone(),
                        instance: instance.clone(),
                    },
                );
            }
        }

        for action in &self.actions {
            if action.action_type != ActionType::CreateComponent {
                continue;
            }
            let options: CreateComponentOptions = action.decode_options()?;
            let result: CreateComponentResult = action.decode_result()?;
            self.bindings.insert(
                result.component_instance.component_id.clone(),
                Binding {
                    component: options.component,
                    instance: result.component_instance,
                },
            );
        }
        Ok(())
    }

    fn highest_recorded_id(&self) -> LabResult<Option<u64>> {
        let mut ids: Vec<String> = Vec::new();
        if let Some(instance) = &self.instance {
            for component in &instance.components {
                collect_instance_ids(component, &mut ids);
            }
        }
        for action in &self.actions {
            match action.action_type {
                ActionType::CreateAttempt => {
                    ids.extend(string_field(&action.result, "attemptId"));
                }
                ActionType::SubmitAnswer => {
                    ids.extend(string_field(&action.result, "submissionId"));
                }
                ActionType::CreateComponent => {
                    let result: CreateComponentResult = action.decode_result()?;
                    collect_instance_ids(&result.component_instance, &mut ids);
                }
                _ => {}
            }
        }
        Ok(ids.iter().filter_map(|id| id.parse::<u64>().ok()).max())
    }

    fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            created: self.created,
            configuration: self.configuration.clone(),
            instance: self.instance.clone(),
            state: self.state.clone(),
            next_id: self.next_id,
        }
    }

    fn persist(&self) -> LabResult<()> {
        if let Some(db) = &self.journal {
            db.save_snapshot(&self.snapshot())?;
        }
        Ok(())
    }

    fn allocate_id(&mut self) -> String {
        let id = self.next_id;
        self.next_id += 1;
        id.to_string()
    }

    // ==================== Lifecycle ====================

    /// Mark the lab as created on this host
    pub fn create(&mut self) -> LabResult<()> {
        if !self.created {
            self.created = true;
            self.persist()?;
            tracing::info!("Lab created");
        }
        Ok(())
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    // ==================== Configuration ====================

    pub fn configuration(&self) -> Option<&Configuration> {
        self.configuration.as_ref()
    }

    /// Replace the authored configuration. Clears the derived instance, the
    /// action log, the lab state and every identifier binding. The identifier
    /// counter keeps running.
    pub fn set_configuration(&mut self, configuration: Configuration) -> LabResult<()> {
        if !self.created {
            return Err(LabError::NotCreated);
        }

        tracing::info!(
            name = %configuration.name,
            components = configuration.components.len(),
            "Configuration replaced"
        );

        self.configuration = Some(configuration);
        self.instance = None;
        self.state = None;
        self.actions.clear();
        self.bindings.clear();

        if let Some(db) = &self.journal {
            db.reset_with_snapshot(&self.snapshot())?;
        }
        Ok(())
    }

    /// The per-user projection of the configuration, materialized on first
    /// call and cached until the configuration is replaced. `None` when no
    /// configuration is set.
    pub fn configuration_instance(&mut self) -> LabResult<Option<ConfigurationInstance>> {
        if let Some(instance) = &self.instance {
            return Ok(Some(instance.clone()));
        }
        let Some(configuration) = self.configuration.clone() else {
            return Ok(None);
        };

        // Refuse before allocating anything so a bad document burns no ids
        if let Some(unknown) = configuration.components.iter().find(|c| c.kind().is_none()) {
            return Err(LabError::UnknownComponentType(unknown.component_type.clone()));
        }

        let mut components = Vec::with_capacity(configuration.components.len());
        for component in &configuration.components {
            components.push(self.derive_instance(component)?);
        }
        for (component, instance) in configuration.components.iter().zip(&components) {
            self.bind(component.clone(), instance.clone());
        }

        let instance = ConfigurationInstance {
            app_version: configuration.app_version,
            components,
            name: configuration.name.clone(),
            timeline: configuration.timeline.clone(),
            data: configuration.data.clone(),
        };
        self.instance = Some(instance.clone());
        self.persist()?;

        tracing::debug!(
            components = instance.components.len(),
            next_id = self.next_id,
            "Configuration instance materialized"
        );
        Ok(Some(instance))
    }

    /// Derive an instance for `component`, allocating the component id and
    /// then each value id in declaration order
    fn derive_instance(&mut self, component: &Component) -> LabResult<ComponentInstance> {
        let kind = component
            .kind()
            .ok_or_else(|| LabError::UnknownComponentType(component.component_type.clone()))?;

        let component_id = self.allocate_id();
        let secure = component.secure;
        let values = component.values.map(|definition| ValueInstance {
            value_id: self.allocate_id(),
            is_hint: definition.is_hint,
            has_value: !secure,
            value: (!secure).then(|| definition.value.clone()),
        });

        let mut fields = component.fields.clone();
        if secure {
            fields.remove("answer");
        }

        Ok(ComponentInstance {
            component_id,
            instance_type: kind.instance_type().to_string(),
            name: component.name.clone(),
            values,
            fields,
        })
    }

    fn bind(&mut self, component: Component, instance: ComponentInstance) {
        self.bindings.insert(
            instance.component_id.clone(),
            Binding {
                component,
                instance,
            },
        );
    }

    // ==================== State ====================

    pub fn state(&self) -> Option<&Value> {
        self.state.as_ref()
    }

    pub fn set_state(&mut self, state: Value) -> LabResult<()> {
        self.state = (!state.is_null()).then_some(state);
        self.persist()
    }

    // ==================== Actions ====================

    /// Take an action and let the ledger compute its result
    pub fn take_action(&mut self, request: &ActionRequest) -> LabResult<Action> {
        let mut created = None;
        let result = match request {
            ActionRequest::CreateAttempt(_) => serde_json::to_value(CreateAttemptResult {
                attempt_id: self.allocate_id(),
            })?,
            ActionRequest::GetValue(options) => serde_json::to_value(GetValueResult {
                value: self.resolve_value(options)?.clone(),
            })?,
            ActionRequest::CreateComponent(options) => {
                let component_instance = self.derive_instance(&options.component)?;
                let result = serde_json::to_value(CreateComponentResult {
                    component_instance: component_instance.clone(),
                })?;
                created = Some((options.component.clone(), component_instance));
                result
            }
            ActionRequest::SubmitAnswer(_) => serde_json::to_value(SubmitAnswerResult {
                submission_id: Some(self.allocate_id()),
                complete: true,
                score: None,
            })?,
            ActionRequest::ResumeAttempt(_)
            | ActionRequest::AttemptTimeout(_)
            | ActionRequest::CloseComponent(_) => Value::Null,
        };

        let action = self.append(request, result)?;
        // Bound only once the action creating the component is on record
        if let Some((component, instance)) = created {
            self.bind(component, instance);
        }
        Ok(action)
    }

    /// Record an action whose result the caller already computed. Only a
    /// submission id is added; the caller's grading is kept as-is.
    pub fn take_completed_action(
        &mut self,
        request: &ActionRequest,
        mut result: Value,
    ) -> LabResult<Action> {
        if result.is_null() {
            return Err(LabError::invalid_payload("a completed action needs a result"));
        }
        if request.action_type() == ActionType::SubmitAnswer {
            let Some(fields) = result.as_object_mut() else {
                return Err(LabError::invalid_payload(
                    "SubmitAnswer result must be an object",
                ));
            };
            fields.insert("submissionId".to_string(), Value::String(self.allocate_id()));
        }
        self.append(request, result)
    }

    fn resolve_value(&self, options: &GetValueOptions) -> LabResult<&Value> {
        let binding = self
            .bindings
            .get(&options.component_id)
            .ok_or_else(|| LabError::ComponentNotFound(options.component_id.clone()))?;
        binding
            .authored_value(&options.value_id)
            .ok_or_else(|| LabError::ValueNotFound(options.value_id.clone()))
    }

    fn append(&mut self, request: &ActionRequest, result: Value) -> LabResult<Action> {
        let action = Action {
            action_type: request.action_type(),
            options: request.options_value()?,
            result,
            time: chrono::Utc::now().timestamp_millis(),
        };

        if let Some(db) = &self.journal {
            db.append_with_snapshot(&action, &self.snapshot())?;
        }
        self.actions.push(action.clone());

        tracing::debug!(
            action = %action.action_type,
            component_id = request.component_id(),
            "Action appended"
        );
        Ok(action)
    }

    /// Matching actions in append order
    pub fn get_actions(&self, query: &ActionQuery) -> Vec<Action> {
        self.actions
            .iter()
            .filter(|action| query.matches(action))
            .cloned()
            .collect()
    }

    pub fn all_actions(&self) -> &[Action] {
        &self.actions
    }
}

fn collect_instance_ids(instance: &ComponentInstance, out: &mut Vec<String>) {
    out.push(instance.component_id.clone());
    for (_, values) in instance.values.iter() {
        out.extend(values.iter().map(|v| v.value_id.clone()));
    }
}

fn string_field(value: &Value, field: &str) -> Option<String> {
    value.get(field).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::choice_configuration;
    use crate::model::{
        CloseComponentOptions, ComponentKind, CreateAttemptOptions, CreateComponentOptions,
        SubmitAnswerOptions, Version,
    };
    use serde_json::json;
    use std::collections::HashSet;

    fn created_ledger() -> Ledger {
        let mut ledger = Ledger::new();
        ledger.create().unwrap();
        ledger.set_configuration(choice_configuration()).unwrap();
        ledger
    }

    fn create_attempt(ledger: &mut Ledger, component_id: &str) -> String {
        let action = ledger
            .take_action(&ActionRequest::CreateAttempt(CreateAttemptOptions {
                component_id: component_id.into(),
            }))
            .unwrap();
        action.decode_result::<CreateAttemptResult>().unwrap().attempt_id
    }

    #[test]
    fn test_set_configuration_requires_create() {
        let mut ledger = Ledger::new();
        let err = ledger.set_configuration(choice_configuration()).unwrap_err();
        assert!(matches!(err, LabError::NotCreated));
    }

    #[test]
    fn test_no_configuration_means_no_instance() {
        let mut ledger = Ledger::new();
        ledger.create().unwrap();
        assert!(ledger.configuration_instance().unwrap().is_none());
    }

    #[test]
    fn test_instance_assigns_distinct_ids_in_declaration_order() {
        let mut ledger = created_ledger();
        let instance = ledger.configuration_instance().unwrap().unwrap();

        assert_eq!(instance.components.len(), 1);
        let component = &instance.components[0];
        assert_eq!(component.component_id, "0");
        assert_eq!(component.kind(), Some(ComponentKind::Choice));

        let hints = component.values.get("hints").unwrap();
        assert_eq!(hints.len(), 2);
        assert_eq!(hints[0].value_id, "1");
        assert_eq!(hints[1].value_id, "2");
        assert!(hints.iter().all(|h| h.is_hint && h.has_value));
    }

    #[test]
    fn test_instance_is_cached() {
        let mut ledger = created_ledger();
        let first = ledger.configuration_instance().unwrap();
        let second = ledger.configuration_instance().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_secure_component_hides_values_and_answer() {
        let mut ledger = Ledger::new();
        ledger.create().unwrap();
        let mut configuration = choice_configuration();
        configuration.components[0].secure = true;
        ledger.set_configuration(configuration).unwrap();

        let instance = ledger.configuration_instance().unwrap().unwrap();
        let component = &instance.components[0];
        assert!(component.fields.get("answer").is_none());
        assert!(component.fields.get("choices").is_some());
        for hint in component.values.get("hints").unwrap() {
            assert!(!hint.has_value);
            assert!(hint.value.is_none());
        }

        // The ledger still resolves the hidden value
        let attempt_id = create_attempt(&mut ledger, "0");
        let action = ledger
            .take_action(&ActionRequest::GetValue(GetValueOptions {
                component_id: "0".into(),
                attempt_id,
                value_id: "2".into(),
                is_hint: true,
            }))
            .unwrap();
        assert_eq!(action.result, json!({ "value": "Second hint" }));
    }

    #[test]
    fn test_unknown_component_type_burns_no_ids() {
        let mut ledger = Ledger::new();
        ledger.create().unwrap();
        let mut configuration = choice_configuration();
        configuration.components.push(Component {
            component_type: "Labs.Components.Slider".into(),
            ..Component::new(ComponentKind::Input)
        });
        ledger.set_configuration(configuration).unwrap();

        let err = ledger.configuration_instance().unwrap_err();
        assert!(matches!(err, LabError::UnknownComponentType(tag) if tag == "Labs.Components.Slider"));
        assert_eq!(ledger.next_id, 0);
    }

    #[test]
    fn test_get_value_resolves_authored_value() {
        let mut ledger = created_ledger();
        ledger.configuration_instance().unwrap();
        let attempt_id = create_attempt(&mut ledger, "0");
        assert_eq!(attempt_id, "3");

        let action = ledger
            .take_action(&ActionRequest::GetValue(GetValueOptions {
                component_id: "0".into(),
                attempt_id: attempt_id.clone(),
                value_id: "1".into(),
                is_hint: true,
            }))
            .unwrap();
        assert_eq!(action.result["value"], "First hint");
        assert_eq!(action.attempt_id(), Some(attempt_id.as_str()));
    }

    #[test]
    fn test_get_value_unknown_ids_are_not_found() {
        let mut ledger = created_ledger();
        ledger.configuration_instance().unwrap();

        let err = ledger
            .take_action(&ActionRequest::GetValue(GetValueOptions {
                component_id: "0".into(),
                attempt_id: "9".into(),
                value_id: "42".into(),
                is_hint: false,
            }))
            .unwrap_err();
        assert!(matches!(err, LabError::ValueNotFound(id) if id == "42"));

        let err = ledger
            .take_action(&ActionRequest::GetValue(GetValueOptions {
                component_id: "17".into(),
                attempt_id: "9".into(),
                value_id: "1".into(),
                is_hint: false,
            }))
            .unwrap_err();
        assert!(matches!(err, LabError::ComponentNotFound(id) if id == "17"));
        assert!(ledger.all_actions().is_empty());
    }

    #[test]
    fn test_submit_without_result_is_complete() {
        let mut ledger = created_ledger();
        ledger.configuration_instance().unwrap();
        let attempt_id = create_attempt(&mut ledger, "0");

        let action = ledger
            .take_action(&ActionRequest::SubmitAnswer(SubmitAnswerOptions {
                component_id: "0".into(),
                attempt_id,
                answer: Value::Null,
            }))
            .unwrap();
        let result: SubmitAnswerResult = action.decode_result().unwrap();
        assert!(result.complete);
        assert_eq!(result.score, None);
        assert_eq!(result.submission_id.as_deref(), Some("4"));
    }

    #[test]
    fn test_submit_with_result_keeps_grading() {
        let mut ledger = created_ledger();
        ledger.configuration_instance().unwrap();
        let attempt_id = create_attempt(&mut ledger, "0");

        let action = ledger
            .take_completed_action(
                &ActionRequest::SubmitAnswer(SubmitAnswerOptions {
                    component_id: "0".into(),
                    attempt_id,
                    answer: json!("1"),
                }),
                json!({ "score": 0, "complete": false }),
            )
            .unwrap();
        assert_eq!(
            action.result,
            json!({ "score": 0, "complete": false, "submissionId": "4" })
        );

        let err = ledger
            .take_completed_action(
                &ActionRequest::SubmitAnswer(SubmitAnswerOptions {
                    component_id: "0".into(),
                    attempt_id: "3".into(),
                    answer: json!("1"),
                }),
                json!("graded"),
            )
            .unwrap_err();
        assert!(matches!(err, LabError::InvalidPayload(_)));
    }

    #[test]
    fn test_create_component_binds_new_instance() {
        let mut ledger = Ledger::new();
        ledger.create().unwrap();
        ledger
            .set_configuration(
                Configuration::new("Dynamic", Version::new(0, 1))
                    .with_component(Component::new(ComponentKind::Dynamic)),
            )
            .unwrap();
        ledger.configuration_instance().unwrap();

        let child = Component::new(ComponentKind::Input)
            .with_values("answers", vec![crate::model::ValueDefinition::plain("42")])
            .secured();
        let action = ledger
            .take_action(&ActionRequest::CreateComponent(CreateComponentOptions {
                component_id: "0".into(),
                component: child,
                correlation_id: None,
            }))
            .unwrap();
        let created: CreateComponentResult = action.decode_result().unwrap();
        let instance = created.component_instance;
        assert_eq!(instance.component_id, "1");
        assert_eq!(instance.kind(), Some(ComponentKind::Input));

        // The child is resolvable through the same binding table
        let value_id = instance.values.get("answers").unwrap()[0].value_id.clone();
        let attempt_id = create_attempt(&mut ledger, "1");
        let action = ledger
            .take_action(&ActionRequest::GetValue(GetValueOptions {
                component_id: "1".into(),
                attempt_id,
                value_id,
                is_hint: false,
            }))
            .unwrap();
        assert_eq!(action.result["value"], "42");
    }

    #[test]
    fn test_get_actions_filters_in_append_order() {
        let mut ledger = created_ledger();
        ledger.configuration_instance().unwrap();
        let first = create_attempt(&mut ledger, "0");
        let second = create_attempt(&mut ledger, "0");
        ledger
            .take_action(&ActionRequest::CloseComponent(CloseComponentOptions {
                component_id: "0".into(),
            }))
            .unwrap();

        let created = ledger.get_actions(&ActionQuery::component_actions("0", ActionType::CreateAttempt));
        let ids: Vec<_> = created
            .iter()
            .map(|a| a.decode_result::<CreateAttemptResult>().unwrap().attempt_id)
            .collect();
        assert_eq!(ids, vec![first, second.clone()]);

        // CreateAttempt carries no attemptId in its options
        assert!(ledger.get_actions(&ActionQuery::attempt(second)).is_empty());
        assert_eq!(ledger.all_actions().len(), 3);
    }

    #[test]
    fn test_replacing_configuration_clears_but_never_reuses_ids() {
        let mut ledger = created_ledger();
        let before = ledger.configuration_instance().unwrap().unwrap();
        create_attempt(&mut ledger, "0");
        ledger.set_state(json!({ "page": 1 })).unwrap();

        ledger.set_configuration(choice_configuration()).unwrap();
        assert!(ledger.all_actions().is_empty());
        assert!(ledger.state().is_none());

        let after = ledger.configuration_instance().unwrap().unwrap();
        let mut seen = HashSet::new();
        for instance in [&before, &after] {
            for component in &instance.components {
                assert!(seen.insert(component.component_id.clone()));
                for (_, values) in component.values.iter() {
                    for value in values {
                        assert!(seen.insert(value.value_id.clone()));
                    }
                }
            }
        }

        // Old identifiers no longer resolve
        let err = ledger
            .take_action(&ActionRequest::GetValue(GetValueOptions {
                component_id: "0".into(),
                attempt_id: "3".into(),
                value_id: "1".into(),
                is_hint: true,
            }))
            .unwrap_err();
        assert!(matches!(err, LabError::ComponentNotFound(_)));
    }

    #[test]
    fn test_journal_restores_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");

        let attempt_id = {
            let mut ledger = Ledger::with_journal(Database::open(&path).unwrap()).unwrap();
            ledger.create().unwrap();
            ledger
                .set_configuration(
                    choice_configuration().with_component(Component::new(ComponentKind::Dynamic)),
                )
                .unwrap();
            ledger.configuration_instance().unwrap();
            ledger
                .take_action(&ActionRequest::CreateComponent(CreateComponentOptions {
                    component_id: "3".into(),
                    component: Component::new(ComponentKind::Input)
                        .with_values("hints", vec![crate::model::ValueDefinition::hint("typed")]),
                    correlation_id: None,
                }))
                .unwrap();
            create_attempt(&mut ledger, "4")
        };

        let mut ledger = Ledger::with_journal(Database::open(&path).unwrap()).unwrap();
        assert!(ledger.is_created());
        assert_eq!(ledger.all_actions().len(), 2);

        // Bindings for both the configured and the dynamically created component survive
        let action = ledger
            .take_action(&ActionRequest::GetValue(GetValueOptions {
                component_id: "4".into(),
                attempt_id: attempt_id.clone(),
                value_id: "5".into(),
                is_hint: true,
            }))
            .unwrap();
        assert_eq!(action.result["value"], "typed");

        let next = create_attempt(&mut ledger, "0");
        assert!(next.parse::<u64>().unwrap() > attempt_id.parse::<u64>().unwrap());
    }

    #[test]
    fn test_stale_snapshot_counter_is_caught_up_on_restore() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");

        let first = {
            let mut ledger = Ledger::with_journal(Database::open(&path).unwrap()).unwrap();
            ledger.create().unwrap();
            ledger.set_configuration(choice_configuration()).unwrap();
            ledger.configuration_instance().unwrap();
            let stale = Database::open(&path).unwrap().load_snapshot().unwrap().unwrap();

            let first = create_attempt(&mut ledger, "0");
            // As if the process died with only the action on disk
            Database::open(&path).unwrap().save_snapshot(&stale).unwrap();
            first
        };

        let mut ledger = Ledger::with_journal(Database::open(&path).unwrap()).unwrap();
        let second = create_attempt(&mut ledger, "0");
        assert_ne!(first, second);
        assert!(second.parse::<u64>().unwrap() > first.parse::<u64>().unwrap());
    }

    #[test]
    fn test_failed_journal_write_leaves_no_binding() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");

        let mut ledger = Ledger::with_journal(Database::open(&path).unwrap()).unwrap();
        ledger.create().unwrap();
        ledger
            .set_configuration(
                Configuration::new("Dynamic", Version::new(0, 1))
                    .with_component(Component::new(ComponentKind::Dynamic)),
            )
            .unwrap();
        ledger.configuration_instance().unwrap();

        rusqlite::Connection::open(&path)
            .unwrap()
            .execute_batch("DROP TABLE actions")
            .unwrap();

        let child = Component::new(ComponentKind::Input)
            .with_values("hints", vec![crate::model::ValueDefinition::hint("lost")]);
        assert!(ledger
            .take_action(&ActionRequest::CreateComponent(CreateComponentOptions {
                component_id: "0".into(),
                component: child,
                correlation_id: None,
            }))
            .is_err());
        assert!(ledger.all_actions().is_empty());

        let err = ledger
            .take_action(&ActionRequest::GetValue(GetValueOptions {
                component_id: "1".into(),
                attempt_id: "9".into(),
                value_id: "2".into(),
                is_hint: true,
            }))
            .unwrap_err();
        assert!(matches!(err, LabError::ComponentNotFound(id) if id == "1"));
    }

    #[test]
    fn test_detached_restore_leaves_database_untouched() {
        let db = Database::open_in_memory().unwrap();
        {
            let mut ledger = Ledger::with_journal(db.clone()).unwrap();
            ledger.create().unwrap();
            ledger.set_configuration(choice_configuration()).unwrap();
            ledger.configuration_instance().unwrap();
            create_attempt(&mut ledger, "0");
        }

        let mut detached = Ledger::restore(&db).unwrap();
        assert_eq!(detached.all_actions().len(), 1);
        create_attempt(&mut detached, "0");
        assert_eq!(detached.all_actions().len(), 2);

        assert_eq!(db.load_actions().unwrap().len(), 1);
        assert_eq!(db.load_snapshot().unwrap().unwrap().next_id, 4);
    }
}
