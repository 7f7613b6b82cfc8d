//! Herald CLI - drive the command dispatcher from a terminal.
//!
//! Each line typed on stdin is dispatched as a message in one context, and
//! replies are printed to stdout.

mod builtins;
mod commands;
mod console;

use clap::Parser;
use herald_core::{
    BotContext, CommandRegistry, ContextId, DispatchConfig, Dispatcher, HeraldConfig,
    PermissionLevel, UserId, load_config,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::console::{ConsoleSink, Session};

/// User the console acts as when neither `--user` nor `permissions.owner_id`
/// names one.
const CONSOLE_USER: UserId = 1;

/// Herald: command dispatch with per-context permission levels
#[derive(Parser, Debug)]
#[command(name = "herald", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Directory holding permission data (overrides permissions.data_dir)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Context the console messages belong to
    #[arg(long, default_value = "console")]
    context: String,

    /// User id to act as (defaults to the owner)
    #[arg(long)]
    user: Option<UserId>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Inspect or edit stored permission levels
    Perms {
        #[command(subcommand)]
        action: PermsAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create default configuration file
    Init,
    /// Show current configuration
    Show,
}

#[derive(clap::Subcommand, Debug)]
enum PermsAction {
    /// Print a user's level in a context
    Get {
        /// Context id
        context: String,
        /// User id
        user: UserId,
    },
    /// Store a user's level in a context
    Set {
        /// Context id
        context: String,
        /// User id
        user: UserId,
        /// Level, 0-255
        level: PermissionLevel,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "herald", "herald")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "herald.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    if let Some(command) = cli.command {
        return commands::handle_command(command, &workspace, cli.data_dir).await;
    }

    let config = load_config(Some(&workspace), None)
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    run_console(&config, cli.data_dir, cli.context, cli.user).await
}

async fn run_console(
    config: &HeraldConfig,
    data_dir: Option<PathBuf>,
    context: String,
    user: Option<UserId>,
) -> anyhow::Result<()> {
    let store = commands::open_store(config, data_dir)?;
    let user_id = match (user, store.owner()) {
        (Some(user), _) => user,
        (None, Some(owner)) => owner,
        (None, None) => {
            store.grant_owner_max_trust(CONSOLE_USER)?;
            CONSOLE_USER
        }
    };
    let store = Arc::new(store);

    let mut registry = CommandRegistry::new();
    registry.add_context(BotContext::new(context.as_str(), format!("console ({context})")));
    builtins::register_builtins(&mut registry)?;

    // Console lines are commands as typed; no prefix needed.
    let dispatch_config = DispatchConfig {
        prefix: String::new(),
        ..config.dispatch.clone()
    };
    let sink = Arc::new(ConsoleSink::new(tokio::io::stdout()));
    let dispatcher = Dispatcher::new(Arc::new(registry), store.clone(), sink)
        .with_config(dispatch_config);

    let session = Session {
        context: ContextId::new(context),
        user_id,
    };
    info!(context = %session.context, user_id, "Console ready; type `help` for commands");

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    tokio::select! {
        _ = console::run_lines(&dispatcher, &session, stdin) => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Failed to listen for Ctrl-C");
            }
            info!("Interrupted");
        }
    }

    if let Err(e) = store.flush_all().await {
        error!(error = %e, "Failed to persist permission levels on shutdown");
        return Err(e.into());
    }
    info!("Permission levels flushed");
    Ok(())
}
