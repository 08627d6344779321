use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeError;
use url::Url;

use crate::domain::NullPolicy;
use crate::infra::{NetWeightTable, ReferenceError, WeightRules};

const APP_QUALIFIER: &str = "gov";
const APP_ORG: &str = "MarketNews";
const APP_NAME: &str = "MmnPrices";

/// Environment variable holding the MARS API key (sent as the basic-auth username).
pub const API_KEY_ENV: &str = "USDA_MARS_API_KEY";
pub const DEFAULT_BASE_URL: &str = "https://marsapi.ams.usda.gov/services/v1.2/";

/// User settings persisted as JSON in the platform config directory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub base_url: String,
    /// Root of the flat-file caches. Falls back to the platform data directory.
    pub data_dir: Option<PathBuf>,
    pub null_policy: NullPolicy,
    /// Commodity weight rules CSV overriding the embedded table.
    pub rules_path: Option<PathBuf>,
    /// Net weight table CSV overriding the embedded table.
    pub net_weights_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            data_dir: None,
            null_policy: NullPolicy::default(),
            rules_path: None,
            net_weights_path: None,
        }
    }
}

impl Settings {
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .map(|base| base.join("mmn-prices"))
                .unwrap_or_else(|| PathBuf::from("."))
        })
    }

    /// Checks that the base URL parses and that reference table overrides load.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let url = Url::parse(&self.base_url).map_err(|err| SettingsError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason: err.to_string(),
        })?;
        if url.cannot_be_a_base() {
            return Err(SettingsError::InvalidBaseUrl {
                url: self.base_url.clone(),
                reason: "not a hierarchical URL".to_string(),
            });
        }

        if let Some(path) = &self.rules_path {
            WeightRules::from_path(path).map_err(|source| SettingsError::ReferenceTable {
                path: path.clone(),
                source,
            })?;
        }
        if let Some(path) = &self.net_weights_path {
            NetWeightTable::from_path(path).map_err(|source| SettingsError::ReferenceTable {
                path: path.clone(),
                source,
            })?;
        }
        Ok(())
    }

    pub fn api_key_from_env() -> Option<String> {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

pub fn settings_file() -> Option<PathBuf> {
    ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .map(|dirs| dirs.config_dir().join("settings.json"))
}

pub fn load_settings() -> Option<Settings> {
    let path = settings_file()?;
    let data = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&data) {
        Ok(settings) => Some(settings),
        Err(err) => {
            tracing::warn!("[settings] Ignoring unreadable settings file: {err}");
            None
        }
    }
}

/// Validates `settings` and writes them to the platform settings file.
pub fn save_settings(settings: &Settings) -> Result<PathBuf, SettingsError> {
    let path = settings_file().ok_or(SettingsError::StorageUnavailable)?;
    save_settings_to(&path, settings)?;
    Ok(path)
}

/// Nothing is written when validation fails.
pub fn save_settings_to(path: &Path, settings: &Settings) -> Result<(), SettingsError> {
    settings.validate()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    fs::write(path, json)?;
    tracing::info!("[settings] Saved settings to {}", path.display());
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("storage directory unavailable")]
    StorageUnavailable,
    #[error("invalid base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("cannot load reference table {}: {source}", .path.display())]
    ReferenceTable {
        path: PathBuf,
        source: ReferenceError,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serde(#[from] SerdeError),
}
