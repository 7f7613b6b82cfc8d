//! Configuration system for Herald.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from `~/.config/herald/config.toml` and/or `.herald/config.toml`
//! in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::permissions::PermissionLevel;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeraldConfig {
    #[serde(default)]
    pub permissions: PermissionConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

/// Permission store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionConfig {
    /// Level of users without a stored record (default: 2, standard user).
    #[serde(default = "default_level")]
    pub default_level: u8,
    /// User granted the maximum level in every context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<u64>,
    /// Root directory for per-context permission files. Falls back to the
    /// platform data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

fn default_level() -> u8 {
    PermissionLevel::STANDARD_USER.value()
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            default_level: default_level(),
            owner_id: None,
            data_dir: None,
        }
    }
}

impl PermissionConfig {
    /// Directory holding permission partitions.
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("dev", "herald", "herald")
                .map(|d| d.data_dir().join("permissions"))
                .unwrap_or_else(|| PathBuf::from(".herald").join("permissions"))
        })
    }
}

/// Dispatcher settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Text that marks a message as a command (default: `>>`). Empty accepts
    /// every message.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Reply when a command name does not resolve (default: true).
    #[serde(default = "default_true")]
    pub reply_on_unknown: bool,
}

fn default_prefix() -> String {
    ">>".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            reply_on_unknown: true,
        }
    }
}

impl HeraldConfig {
    /// Reject settings that cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.permissions.owner_id == Some(0) {
            return Err(ConfigError::Invalid {
                message: "permissions.owner_id must not be 0".into(),
            });
        }
        let prefix = &self.dispatch.prefix;
        if !prefix.is_empty() && prefix.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "dispatch.prefix must not be only whitespace".into(),
            });
        }
        Ok(())
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `HERALD_`)
/// 3. Workspace-local config (`.herald/config.toml`)
/// 4. User config (`~/.config/herald/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&HeraldConfig>,
) -> Result<HeraldConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(HeraldConfig::default()));

    if let Some(config_dir) = directories::ProjectDirs::from("dev", "herald", "herald") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".herald").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // HERALD_PERMISSIONS__DEFAULT_LEVEL, HERALD_DISPATCH__PREFIX, ...
    figment = figment.merge(Env::prefixed("HERALD_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: HeraldConfig = figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}

/// Write `config` to `<workspace>/.herald/config.toml`. Returns the path.
pub fn write_workspace_config(
    workspace: &Path,
    config: &HeraldConfig,
) -> Result<PathBuf, ConfigError> {
    let text = toml::to_string_pretty(config).map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })?;
    let path = workspace.join(".herald").join("config.toml");
    crate::persistence::atomic_write(&path, text.as_bytes()).map_err(|e| {
        ConfigError::Invalid {
            message: format!("cannot write {}: {e}", path.display()),
        }
    })?;
    Ok(path)
}
