//! Error types for the Herald core.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering registration, permissions, persistence, delivery, configuration,
//! and command dispatch.

use std::path::PathBuf;

use crate::permissions::PermissionLevel;

/// Top-level error type for the Herald core library.
#[derive(Debug, thiserror::Error)]
pub enum HeraldError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Permission error: {0}")]
    Permission(#[from] PermissionError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Command '{command}' failed unexpectedly: {source}")]
    Unexpected {
        command: String,
        source: CommandError,
    },
}

/// Errors raised while building the command registry.
///
/// These are startup-time configuration mistakes, never runtime conditions.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Command already registered in {scope}: {name}")]
    DuplicateCommand { name: String, scope: String },

    #[error("Invalid command name '{name}': {reason}")]
    InvalidName { name: String, reason: String },
}

/// Errors from the permission store.
#[derive(Debug, thiserror::Error)]
pub enum PermissionError {
    #[error(
        "Malformed permission data for user {user_id} in context {context}: \
         could not parse '{value}' as a level (0-255 integer expected)"
    )]
    MalformedData {
        context: String,
        user_id: u64,
        value: String,
    },

    #[error("Cannot grant owner max trust after the permission store has been activated")]
    AlreadyActivated,

    #[error("User {user_id} is the owner; their level is fixed at 255")]
    OwnerLevelFixed { user_id: u64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from a backing permission store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O failure at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Backend failure for context {context}: {message}")]
    Backend { context: String, message: String },
}

/// Errors from a response sink.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Failed to deliver reply to message {message_id}: {message}")]
    Failed { message_id: String, message: String },

    #[error("Response sink is closed")]
    Closed,
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Failures reported by a command handler.
///
/// `Failed` and `InvalidArguments` are domain errors that the dispatcher turns
/// into a reply. `Unexpected` escapes the dispatcher to the host.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{reason}")]
    Failed { reason: String },

    #[error("Invalid arguments: {reason}")]
    InvalidArguments { reason: String },

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl CommandError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    pub fn invalid_arguments(reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            reason: reason.into(),
        }
    }
}

/// Recoverable dispatch failures. Each one is answered with exactly one reply.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Unknown command: `{name}`")]
    UnknownCommand { name: String },

    #[error(
        "Permission denied for `{command}`: requires level {required} (or higher), you have {actual}"
    )]
    PermissionDenied {
        command: String,
        required: PermissionLevel,
        actual: PermissionLevel,
    },

    #[error("Permission denied for `{command}`: your permission level could not be determined")]
    PermissionUnavailable { command: String, reason: String },

    #[error("Command `{command}` failed: {reason}")]
    CommandFailed { command: String, reason: String },
}

impl DispatchError {
    /// The command name this failure concerns.
    pub fn command(&self) -> &str {
        match self {
            Self::UnknownCommand { name } => name,
            Self::PermissionDenied { command, .. }
            | Self::PermissionUnavailable { command, .. }
            | Self::CommandFailed { command, .. } => command,
        }
    }
}

/// A type alias for results using the top-level `HeraldError`.
pub type Result<T> = std::result::Result<T, HeraldError>;
