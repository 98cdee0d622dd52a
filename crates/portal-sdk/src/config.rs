use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{PortalError, PortalResult};
use crate::protocol::{AppConfig, PROTOCOL_VERSION};
use crate::routes::RouteMatchOptions;

pub const PORTAL_CONFIG_FILENAME: &str = "portal.json";
pub const PORTAL_CONFIG_VERSION: &str = "1.0.0";
pub const DEFAULT_INIT_TIMEOUT_MS: u64 = 5_000;

pub const PORTAL_CONFIG_ENV: &str = "PORTAL_CONFIG";
pub const PORTAL_INIT_TIMEOUT_ENV: &str = "PORTAL_INIT_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalConfig {
    pub version: String,
    #[serde(default)]
    pub apps: Vec<AppConfig>,
    #[serde(default)]
    pub routing: RouteMatchOptions,
    #[serde(default = "default_init_timeout_ms")]
    pub init_timeout_ms: u64,
    /// Message schema the portal's apps were built against.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: u32,
}

fn default_init_timeout_ms() -> u64 {
    DEFAULT_INIT_TIMEOUT_MS
}

fn default_protocol_version() -> u32 {
    PROTOCOL_VERSION
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            version: PORTAL_CONFIG_VERSION.to_string(),
            apps: Vec::new(),
            routing: RouteMatchOptions::default(),
            init_timeout_ms: DEFAULT_INIT_TIMEOUT_MS,
            protocol_version: PROTOCOL_VERSION,
        }
    }
}

impl PortalConfig {
    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    pub fn app(&self, app_id: &str) -> Option<&AppConfig> {
        self.apps.iter().find(|app| app.id == app_id)
    }

    /// Reject configs the broker cannot serve: unknown config or protocol
    /// version, empty or duplicate ids, entry points that do not resolve.
    pub fn validate(&self) -> PortalResult<()> {
        if self.version != PORTAL_CONFIG_VERSION {
            return Err(PortalError::InvalidConfig(format!(
                "unsupported config version '{}' (expected {PORTAL_CONFIG_VERSION})",
                self.version
            )));
        }
        if self.protocol_version != PROTOCOL_VERSION {
            return Err(PortalError::InvalidConfig(format!(
                "apps speak protocol version {} but this portal speaks {PROTOCOL_VERSION}",
                self.protocol_version
            )));
        }
        if self.init_timeout_ms == 0 {
            return Err(PortalError::InvalidConfig(
                "initTimeoutMs must be greater than zero".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for app in &self.apps {
            if app.id.trim().is_empty() {
                return Err(PortalError::InvalidConfig("app id must not be empty".to_string()));
            }
            if app.id == crate::protocol::PORTAL_ID {
                return Err(PortalError::InvalidConfig(format!(
                    "app id '{}' is reserved for the host",
                    app.id
                )));
            }
            if !seen.insert(app.id.as_str()) {
                return Err(PortalError::InvalidConfig(format!(
                    "duplicate app id '{}'",
                    app.id
                )));
            }
            app.entry_url()?;
        }
        Ok(())
    }

    /// Apply `PORTAL_INIT_TIMEOUT_MS` from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(PORTAL_INIT_TIMEOUT_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(value) if value > 0 => self.init_timeout_ms = value,
                _ => tracing::warn!("ignoring invalid {PORTAL_INIT_TIMEOUT_ENV}='{raw}'"),
            }
        }
    }
}

pub fn load_portal_config(path: &Path) -> PortalResult<PortalConfig> {
    if !path.exists() {
        return Err(PortalError::ConfigNotFound(path.to_path_buf()));
    }
    let data = std::fs::read_to_string(path)?;
    let config: PortalConfig = serde_json::from_str(&data).map_err(|error| {
        PortalError::InvalidConfig(format!(
            "failed to parse portal config {}: {error}",
            path.display()
        ))
    })?;
    config.validate()?;
    Ok(config)
}

pub fn load_or_create_portal_config(dir: &Path) -> PortalResult<PortalConfig> {
    std::fs::create_dir_all(dir)?;

    let path = portal_config_path(dir);
    if !path.exists() {
        let config = PortalConfig::default();
        write_portal_config(&path, &config)?;
        tracing::info!("created portal config at {}", path.display());
        return Ok(config);
    }
    load_portal_config(&path)
}

pub fn write_portal_config(path: &Path, config: &PortalConfig) -> PortalResult<()> {
    let data = serde_json::to_string_pretty(config)?;
    std::fs::write(path, data)?;
    Ok(())
}

pub fn portal_config_path(dir: &Path) -> PathBuf {
    dir.join(PORTAL_CONFIG_FILENAME)
}

/// `PORTAL_CONFIG` if set, otherwise `portal.json` under `default_dir`.
pub fn resolve_config_path(default_dir: &Path) -> PathBuf {
    resolve_config_path_from(default_dir, |key| std::env::var(key).ok())
}

fn resolve_config_path_from<F>(default_dir: &Path, lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(PORTAL_CONFIG_ENV).filter(|value| !value.trim().is_empty()) {
        Some(path) => PathBuf::from(path),
        None => portal_config_path(default_dir),
    }
}
