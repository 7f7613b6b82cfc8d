//! # Herald Core
//!
//! Command dispatch and permission gating for chat bots.
//! Provides the argument tokenizer, the command registry, the per-context
//! permission store with its backing stores, the dispatcher, and configuration.

pub mod command;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod permissions;
pub mod persistence;
pub mod registry;
pub mod tokenizer;

// Re-export commonly used types at the crate root.
pub use command::{CommandDefinition, CommandHandler, CommandResult, FnHandler, Invocation};
pub use config::{DispatchConfig, HeraldConfig, PermissionConfig, load_config};
pub use context::{BotContext, Caller, ContextId, UserId};
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use error::{
    CommandError, ConfigError, DeliveryError, DispatchError, HeraldError, PermissionError,
    RegistryError, Result, StoreError,
};
pub use message::{InboundMessage, MessageId, RecordingSink, ResponseSink};
pub use permissions::{
    InMemoryBackend, JsonFileBackend, PermissionBackend, PermissionLevel, PermissionStore,
};
pub use registry::{CommandListing, CommandRegistry};
pub use tokenizer::{CommandLine, split_command, tokenize};
