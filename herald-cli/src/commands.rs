//! Handlers for `herald` subcommands that run without the console loop.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use herald_core::{
    ContextId, HeraldConfig, JsonFileBackend, PermissionLevel, PermissionStore, UserId,
    config::{load_config, write_workspace_config},
};

use crate::{Commands, ConfigAction, PermsAction};

pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    data_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    match command {
        Commands::Config { action } => handle_config(action, workspace),
        Commands::Perms { action } => handle_perms(action, workspace, data_dir).await,
    }
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace.join(".herald").join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            let path = write_workspace_config(workspace, &HeraldConfig::default())?;
            println!("Created default configuration at: {}", path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = load_config(Some(workspace), None)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

/// Open the permission store the console would use, without activating it.
pub fn open_store(config: &HeraldConfig, data_dir: Option<PathBuf>) -> anyhow::Result<PermissionStore> {
    let root = data_dir.unwrap_or_else(|| config.permissions.resolved_data_dir());
    let backend = Arc::new(JsonFileBackend::new(root));
    Ok(PermissionStore::from_config(&config.permissions, backend)?)
}

async fn handle_perms(
    action: PermsAction,
    workspace: &Path,
    data_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config = load_config(Some(workspace), None)
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    let store = open_store(&config, data_dir)?;

    match action {
        PermsAction::Get { context, user } => {
            let level = store.get_level(&ContextId::new(context.as_str()), user).await?;
            println!("{}", describe(user, &context, level));
        }
        PermsAction::Set {
            context,
            user,
            level,
        } => {
            let context_id = ContextId::new(context.as_str());
            store.set_level(&context_id, user, level, true).await?;
            println!("{}", describe(user, &context, level));
        }
    }
    Ok(())
}

fn describe(user: UserId, context: &str, level: PermissionLevel) -> String {
    match level.label() {
        Some(label) => format!("{user} @ {context}: {level} ({label})"),
        None => format!("{user} @ {context}: {level}"),
    }
}
