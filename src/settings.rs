//! Environment configuration for the inspector binary

use crate::protocol::LabMode;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub db_path: PathBuf,
    pub application_id: String,
    pub user_id: String,
    pub mode: LabMode,
    /// Authored configuration used to seed an empty ledger
    pub config_path: Option<PathBuf>,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let db_path = var("LABS_DB_PATH").map_or_else(
            || {
                let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".labs").join("ledger.db")
            },
            PathBuf::from,
        );

        let mode = match var("LABS_MODE").as_deref() {
            Some("edit") => LabMode::Edit,
            Some("view") | None => LabMode::View,
            Some(other) => {
                tracing::warn!(mode = %other, "Unknown LABS_MODE, using view");
                LabMode::View
            }
        };

        Self {
            db_path,
            application_id: var("LABS_APP_ID").unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            user_id: var("LABS_USER_ID").unwrap_or_else(|| "local-user".to_string()),
            mode,
            config_path: var("LABS_CONFIG_PATH").map(PathBuf::from),
        }
    }
}
