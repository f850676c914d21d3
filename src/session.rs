//! Lab session context
//!
//! A [`LabSession`] owns one connection to a [`LabHost`]. At most one
//! [`LabEditor`] or one [`LabInstance`] is open at a time; each releases the
//! session when it is finished with [`LabEditor::done`] /
//! [`LabInstance::done`] or dropped.

use crate::components::{ComponentHandle, ComponentRegistry};
use crate::error::{LabError, LabResult};
use crate::events::{EventHandler, EventManager, HandlerId};
use crate::host::{ConnectHook, LabHost};
use crate::lock;
use crate::model::{Action, ActionQuery, ActionRequest, Configuration, ConfigurationInstance};
use crate::protocol::{is_supported_host_version, ConnectionResponse, HostVersionInfo};
use serde_json::Value;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activity {
    Idle,
    Editing,
    Taking,
}

#[derive(Debug, Clone, Default)]
enum Connection {
    #[default]
    Idle,
    Connecting,
    Connected(ConnectionResponse),
    Disposed,
}

pub struct LabSession {
    host: Arc<dyn LabHost>,
    registry: Arc<ComponentRegistry>,
    versions: Vec<HostVersionInfo>,
    events: EventManager,
    connection: Mutex<Connection>,
    created: Mutex<bool>,
    activity: Arc<Mutex<Activity>>,
}

impl LabSession {
    /// Wrap `host`. Fails when the host speaks no supported protocol version
    /// or `registry` cannot build every component kind.
    pub fn new(host: Arc<dyn LabHost>, registry: ComponentRegistry) -> LabResult<Self> {
        let versions: Vec<HostVersionInfo> = host
            .supported_versions()
            .into_iter()
            .filter(|info| is_supported_host_version(info.version))
            .collect();
        if versions.is_empty() {
            return Err(LabError::UnsupportedHostVersion);
        }
        registry.validate()?;

        let events = EventManager::new();
        let sink = events.clone();
        host.on(Arc::new(move |name: &str, data: &Value| sink.fire(name, data)));

        Ok(Self {
            host,
            registry: Arc::new(registry),
            versions,
            events,
            connection: Mutex::new(Connection::Idle),
            created: Mutex::new(false),
            activity: Arc::new(Mutex::new(Activity::Idle)),
        })
    }

    /// Connect to the host. `on_connected` runs before any host event that
    /// arrived while connecting is delivered, so handlers added there miss
    /// nothing. Only one connect may succeed per session.
    pub async fn connect(&self, on_connected: ConnectHook<'_>) -> LabResult<ConnectionResponse> {
        {
            let mut connection = lock(&self.connection);
            if !matches!(*connection, Connection::Idle) {
                return Err(LabError::AlreadyConnected);
            }
            *connection = Connection::Connecting;
        }

        let hook: ConnectHook<'_> = Box::new(move |result: Result<&ConnectionResponse, &LabError>| {
            if let Ok(response) = result {
                self.record_connection(response);
            }
            on_connected(result);
        });

        match self.host.connect(&self.versions, hook).await {
            Ok(response) => {
                // Hosts that never call the hook still count as connected
                if !self.is_connected() {
                    self.record_connection(&response);
                }
                tracing::info!(
                    user_id = %response.user_info.id,
                    mode = ?response.mode,
                    created = self.is_created(),
                    "Session connected"
                );
                Ok(response)
            }
            Err(e) => {
                *lock(&self.connection) = Connection::Idle;
                tracing::error!(error = %e, "Session connect failed");
                Err(e)
            }
        }
    }

    fn record_connection(&self, response: &ConnectionResponse) {
        *lock(&self.created) = response.initialization_info.is_some();
        *lock(&self.connection) = Connection::Connected(response.clone());
    }

    pub fn is_connected(&self) -> bool {
        matches!(*lock(&self.connection), Connection::Connected(_))
    }

    pub fn connection_info(&self) -> Option<ConnectionResponse> {
        match &*lock(&self.connection) {
            Connection::Connected(response) => Some(response.clone()),
            _ => None,
        }
    }

    pub fn events(&self) -> &EventManager {
        &self.events
    }

    pub fn on(&self, event: &str, handler: EventHandler) -> HandlerId {
        self.events.add(event, handler)
    }

    pub fn off(&self, event: &str, id: HandlerId) -> bool {
        self.events.remove(event, id)
    }

    fn host(&self) -> LabResult<&dyn LabHost> {
        if self.is_connected() {
            Ok(self.host.as_ref())
        } else {
            Err(LabError::NotConnected)
        }
    }

    /// Reserve storage for the lab on the host
    pub async fn create(&self) -> LabResult<()> {
        self.host()?.create(Value::Null).await?;
        *lock(&self.created) = true;
        tracing::info!("Lab created");
        Ok(())
    }

    pub fn is_created(&self) -> bool {
        *lock(&self.created)
    }

    /// Disconnect from the host. The session cannot be reconnected.
    pub async fn dispose(&self) -> LabResult<()> {
        let was_connected = self.is_connected();
        *lock(&self.connection) = Connection::Disposed;
        if was_connected {
            self.host.disconnect().await?;
        }
        tracing::info!("Session disposed");
        Ok(())
    }

    // ==================== Passthroughs ====================

    pub async fn get_state(&self) -> LabResult<Option<Value>> {
        self.host()?.get_state().await
    }

    pub async fn set_state(&self, state: Value) -> LabResult<()> {
        self.host()?.set_state(state).await
    }

    pub async fn get_configuration(&self) -> LabResult<Option<Configuration>> {
        self.host()?.get_configuration().await
    }

    pub async fn set_configuration(&self, configuration: Configuration) -> LabResult<()> {
        self.host()?.set_configuration(configuration).await
    }

    pub async fn get_configuration_instance(&self) -> LabResult<Option<ConfigurationInstance>> {
        self.host()?.get_configuration_instance().await
    }

    pub async fn take_action(&self, request: ActionRequest) -> LabResult<Action> {
        self.host()?.take_action(request).await
    }

    pub async fn take_completed_action(
        &self,
        request: ActionRequest,
        result: Value,
    ) -> LabResult<Action> {
        self.host()?.take_completed_action(request, result).await
    }

    pub async fn get_actions(&self, query: &ActionQuery) -> LabResult<Vec<Action>> {
        self.host()?.get_actions(query).await
    }

    pub async fn send_message(&self, message_type: &str, options: Value) -> LabResult<Value> {
        self.host()?.send_message(message_type, options).await
    }

    // ==================== Editing and taking ====================

    fn reserve(&self, wanted: Activity) -> LabResult<Reservation> {
        let mut activity = lock(&self.activity);
        match (*activity, wanted) {
            (Activity::Idle, _) => {
                *activity = wanted;
                Ok(Reservation {
                    activity: Arc::clone(&self.activity),
                })
            }
            (Activity::Taking, Activity::Editing) => Err(LabError::SessionBusy("Lab is being taken")),
            (Activity::Editing, Activity::Editing) => {
                Err(LabError::SessionBusy("Lab edit already in progress"))
            }
            (Activity::Editing, _) => Err(LabError::SessionBusy("Lab is being edited")),
            (Activity::Taking, _) => Err(LabError::SessionBusy("Lab already in progress")),
        }
    }

    /// Open the lab for authoring, creating it on the host first if needed
    pub async fn edit_lab(&self) -> LabResult<LabEditor> {
        self.host()?;
        let reservation = self.reserve(Activity::Editing)?;
        if !self.is_created() {
            self.create().await?;
        }
        tracing::info!("Lab opened for editing");
        Ok(LabEditor {
            host: Arc::clone(&self.host),
            _reservation: reservation,
        })
    }

    /// Open the lab for taking, with one component handle per configured
    /// component
    pub async fn take_lab(&self) -> LabResult<LabInstance> {
        self.host()?;
        let reservation = self.reserve(Activity::Taking)?;
        let instance = self
            .host
            .get_configuration_instance()
            .await?
            .ok_or(LabError::NoConfiguration)?;

        let components = instance
            .components
            .into_iter()
            .map(|component| self.registry.build(component, Arc::clone(&self.host)))
            .collect::<LabResult<Vec<_>>>()?;

        tracing::info!(components = components.len(), "Lab opened for taking");
        Ok(LabInstance {
            host: Arc::clone(&self.host),
            components,
            data: instance.data,
            _reservation: reservation,
        })
    }
}

/// Frees the session's edit/take slot when dropped
struct Reservation {
    activity: Arc<Mutex<Activity>>,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        *lock(&self.activity) = Activity::Idle;
    }
}

pub struct LabEditor {
    host: Arc<dyn LabHost>,
    _reservation: Reservation,
}

impl LabEditor {
    pub async fn get_configuration(&self) -> LabResult<Option<Configuration>> {
        self.host.get_configuration().await
    }

    pub async fn set_configuration(&self, configuration: Configuration) -> LabResult<()> {
        self.host.set_configuration(configuration).await?;
        tracing::info!("Configuration replaced");
        Ok(())
    }

    /// Finish editing and free the session
    pub fn done(self) {}
}

pub struct LabInstance {
    host: Arc<dyn LabHost>,
    components: Vec<ComponentHandle>,
    data: Option<Value>,
    _reservation: Reservation,
}

impl LabInstance {
    pub fn components(&self) -> &[ComponentHandle] {
        &self.components
    }

    /// Free-form data attached to the configuration
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub async fn get_state(&self) -> LabResult<Option<Value>> {
        self.host.get_state().await
    }

    pub async fn set_state(&self, state: Value) -> LabResult<()> {
        self.host.set_state(state).await
    }

    /// Finish taking and free the session
    pub fn done(self) {}
}
