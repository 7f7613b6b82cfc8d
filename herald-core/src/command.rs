//! Command definitions and the handler capability.
//!
//! A command is a metadata record plus one invocable handler. Handlers
//! receive an [`Invocation`] and either return an optional reply text or a
//! [`CommandError`].

use async_trait::async_trait;
use std::cmp::Ordering;
use std::sync::Arc;

use crate::context::{BotContext, Caller};
use crate::error::CommandError;
use crate::message::InboundMessage;
use crate::permissions::{PermissionLevel, PermissionStore};
use crate::registry::CommandRegistry;

/// What a handler returns: an optional reply for the invoking message.
pub type CommandResult = Result<Option<String>, CommandError>;

/// Everything a handler gets to see about one invocation.
#[derive(Clone, Copy)]
pub struct Invocation<'a> {
    pub context: &'a BotContext,
    pub caller: &'a Caller,
    pub message: &'a InboundMessage,
    /// Tokenized arguments, command name excluded.
    pub args: &'a [String],
    /// Argument text exactly as typed, command name excluded.
    pub raw_args: &'a str,
    pub commands: &'a CommandRegistry,
    pub permissions: &'a PermissionStore,
}

/// The invocable part of a command.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn execute(&self, invocation: Invocation<'_>) -> CommandResult;
}

/// Adapts a synchronous closure into a [`CommandHandler`].
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F> CommandHandler for FnHandler<F>
where
    F: for<'a> Fn(&Invocation<'a>) -> CommandResult + Send + Sync,
{
    async fn execute(&self, invocation: Invocation<'_>) -> CommandResult {
        (self.0)(&invocation)
    }
}

/// An immutable command record.
#[derive(Clone)]
pub struct CommandDefinition {
    name: String,
    description: String,
    syntax: String,
    required_level: PermissionLevel,
    handler: Arc<dyn CommandHandler>,
}

impl CommandDefinition {
    /// Create a command. The syntax line defaults to the bare name.
    pub fn new(
        name: impl Into<String>,
        required_level: PermissionLevel,
        handler: impl CommandHandler + 'static,
    ) -> Self {
        let name = name.into();
        Self {
            syntax: name.clone(),
            name,
            description: String::new(),
            required_level,
            handler: Arc::new(handler),
        }
    }

    /// Create a command backed by a synchronous closure.
    pub fn from_fn<F>(name: impl Into<String>, required_level: PermissionLevel, f: F) -> Self
    where
        F: for<'a> Fn(&Invocation<'a>) -> CommandResult + Send + Sync + 'static,
    {
        Self::new(name, required_level, FnHandler(f))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_syntax(mut self, syntax: impl Into<String>) -> Self {
        self.syntax = syntax.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lookup key: the name, lowercased.
    pub fn folded_name(&self) -> String {
        fold_name(&self.name)
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn syntax(&self) -> &str {
        &self.syntax
    }

    pub fn required_level(&self) -> PermissionLevel {
        self.required_level
    }

    pub fn handler(&self) -> &Arc<dyn CommandHandler> {
        &self.handler
    }

    /// Whether `caller` is ranked high enough to run this command.
    pub fn can_use(&self, caller: &Caller) -> bool {
        caller.level >= self.required_level
    }

    /// Listing order: required level ascending, then name.
    pub fn listing_cmp(&self, other: &Self) -> Ordering {
        self.required_level
            .cmp(&other.required_level)
            .then_with(|| self.folded_name().cmp(&other.folded_name()))
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl std::fmt::Debug for CommandDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDefinition")
            .field("name", &self.name)
            .field("syntax", &self.syntax)
            .field("required_level", &self.required_level)
            .finish_non_exhaustive()
    }
}

/// Case-fold a command name for lookup.
pub fn fold_name(name: &str) -> String {
    name.to_lowercase()
}
