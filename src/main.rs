//! labs-inspect - replay a lab ledger and report attempt state
//!
//! Restores the SQLite-backed ledger into memory, connects a session to it
//! in-process and resumes every recorded attempt, logging what the replay
//! reconstructs. Resuming records actions, so the replay runs detached from
//! the database; only seeding an empty ledger writes to disk.

use futures::future::try_join_all;
use labs_session::attempt::{Attempt, AttemptVariant};
use labs_session::components::{ComponentHandle, ComponentRegistry};
use labs_session::db::Database;
use labs_session::host::InMemoryLabHost;
use labs_session::model::Configuration;
use labs_session::protocol::{permissions, ConnectionResponse, UserInfo, PROTOCOL_VERSION};
use labs_session::settings::Settings;
use labs_session::{LabError, LabResult, LabSession, Ledger};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "labs_session=info,labs_inspect=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let settings = Settings::from_env();

    // Ensure database directory exists
    if let Some(parent) = settings.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %settings.db_path.display(), "Opening ledger");
    let db = Database::open(&settings.db_path)?;
    seed(&db, &settings)?;
    let ledger = Ledger::restore(&db)?;

    let host = InMemoryLabHost::new(PROTOCOL_VERSION)
        .with_ledger(Arc::new(Mutex::new(ledger)))
        .with_application_id(settings.application_id.clone())
        .with_user(UserInfo {
            id: settings.user_id.clone(),
            permissions: vec![permissions::TAKE.to_string()],
        })
        .with_mode(settings.mode);
    let session = LabSession::new(Arc::new(host), ComponentRegistry::builtin())?;

    session
        .connect(Box::new(|result: Result<&ConnectionResponse, &LabError>| {
            if let Ok(response) = result {
                tracing::info!(application_id = %response.application_id, "Connected to ledger");
            }
        }))
        .await?;

    if !session.is_created() {
        tracing::warn!("Ledger holds no lab. Set LABS_CONFIG_PATH to seed one.");
        session.dispose().await?;
        return Ok(());
    }

    let lab = match session.take_lab().await {
        Ok(lab) => lab,
        Err(LabError::NoConfiguration) => {
            tracing::warn!("Lab has no configuration");
            session.dispose().await?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let mut pending: Vec<ComponentHandle> = Vec::new();
    for component in lab.components() {
        inspect(component, &mut pending).await?;
    }
    // Children of dynamic containers, however deeply nested
    while let Some(component) = pending.pop() {
        inspect(&component, &mut pending).await?;
    }

    lab.done();
    session.dispose().await?;
    Ok(())
}

/// Write the authored configuration into an empty ledger
fn seed(db: &Database, settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let Some(path) = &settings.config_path else {
        return Ok(());
    };
    let mut ledger = Ledger::with_journal(db.clone())?;
    if ledger.configuration().is_some() {
        return Ok(());
    }

    let configuration: Configuration = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    tracing::info!(path = %path.display(), name = %configuration.name, "Seeding ledger");
    ledger.create()?;
    ledger.set_configuration(configuration)?;
    Ok(())
}

/// Report one component, queueing the children of a dynamic container
async fn inspect(component: &ComponentHandle, pending: &mut Vec<ComponentHandle>) -> LabResult<()> {
    match component {
        ComponentHandle::Choice(choice) => {
            for attempt in resume_all(choice.get_attempts().await?).await? {
                report(&attempt, Some(attempt.submissions()?.len()));
            }
        }
        ComponentHandle::Input(input) => {
            for attempt in resume_all(input.get_attempts().await?).await? {
                report(&attempt, Some(attempt.submissions()?.len()));
            }
        }
        ComponentHandle::Activity(activity) => {
            for attempt in resume_all(activity.get_attempts().await?).await? {
                report(&attempt, None);
            }
        }
        ComponentHandle::Dynamic(dynamic) => {
            let children = dynamic.get_components().await?;
            tracing::info!(
                component_id = %dynamic.id(),
                closed = dynamic.is_closed().await?,
                children = children.len(),
                "Dynamic component"
            );
            pending.extend(children);
        }
    }
    Ok(())
}

async fn resume_all<V: AttemptVariant>(mut attempts: Vec<Attempt<V>>) -> LabResult<Vec<Attempt<V>>> {
    try_join_all(attempts.iter_mut().map(Attempt::resume)).await?;
    Ok(attempts)
}

fn report<V: AttemptVariant>(attempt: &Attempt<V>, submissions: Option<usize>) {
    let resolved = attempt
        .value_keys()
        .into_iter()
        .filter_map(|key| attempt.values(key).ok())
        .flatten()
        .filter(|holder| holder.is_resolved())
        .count();

    tracing::info!(
        component_id = %attempt.component_id(),
        attempt_id = %attempt.id(),
        kind = ?V::kind(),
        state = %attempt.state(),
        submissions = ?submissions,
        resolved_values = resolved,
        "Attempt replayed"
    );
}
