//! Command dispatcher.
//!
//! One pass per inbound message: strip the prefix, tokenize, resolve the
//! command, authorize the caller, invoke the handler, and answer. Recoverable
//! failures become a [`DispatchOutcome::Rejected`] plus exactly one reply;
//! anything else is returned as an error for the host to judge.
//!
//! The dispatcher holds no per-message state, so one instance can serve many
//! messages concurrently.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::command::{CommandDefinition, Invocation};
use crate::config::DispatchConfig;
use crate::context::BotContext;
use crate::error::{CommandError, DispatchError, HeraldError, Result};
use crate::message::{InboundMessage, ResponseSink};
use crate::permissions::PermissionStore;
use crate::registry::CommandRegistry;
use crate::tokenizer::split_command;

/// Result of dispatching one message.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Not a command (no prefix, or nothing after it).
    Ignored,
    /// The handler ran to completion.
    Completed { command: String },
    /// The command could not run; the reason has been replied.
    Rejected(DispatchError),
}

impl DispatchOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn rejection(&self) -> Option<&DispatchError> {
        match self {
            Self::Rejected(e) => Some(e),
            _ => None,
        }
    }
}

/// Routes inbound messages to command handlers.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<CommandRegistry>,
    permissions: Arc<PermissionStore>,
    sink: Arc<dyn ResponseSink>,
    config: DispatchConfig,
}

impl Dispatcher {
    /// Dispatcher that treats every message as a command. Use
    /// [`with_config`](Self::with_config) to require a prefix.
    pub fn new(
        registry: Arc<CommandRegistry>,
        permissions: Arc<PermissionStore>,
        sink: Arc<dyn ResponseSink>,
    ) -> Self {
        Self {
            registry,
            permissions,
            sink,
            config: DispatchConfig {
                prefix: String::new(),
                ..DispatchConfig::default()
            },
        }
    }

    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn permissions(&self) -> &PermissionStore {
        &self.permissions
    }

    /// The part of `text` after the command prefix, or `None` if `text` is
    /// not addressed to the bot.
    pub fn command_text<'a>(&self, text: &'a str) -> Option<&'a str> {
        if self.config.prefix.is_empty() {
            return Some(text);
        }
        text.trim_start().strip_prefix(self.config.prefix.as_str())
    }

    /// Dispatch one inbound message.
    pub async fn dispatch(&self, message: &InboundMessage) -> Result<DispatchOutcome> {
        let Some(line) = self.command_text(&message.text).and_then(split_command) else {
            return Ok(DispatchOutcome::Ignored);
        };

        let Some(command) = self.registry.resolve(&line.name, &message.context) else {
            debug!(
                command = %line.name,
                context = %message.context,
                user_id = message.sender_id,
                "Unknown command"
            );
            let reply = self.config.reply_on_unknown;
            return self
                .reject(message, DispatchError::UnknownCommand { name: line.name }, reply)
                .await;
        };

        // Fail closed: a level that cannot be read is never treated as sufficient.
        let caller = match self
            .permissions
            .caller(&message.context, message.sender_id)
            .await
        {
            Ok(caller) => caller,
            Err(e) => {
                error!(
                    command = %command.name(),
                    context = %message.context,
                    user_id = message.sender_id,
                    error = %e,
                    "Permission lookup failed; denying"
                );
                let denial = DispatchError::PermissionUnavailable {
                    command: command.name().to_string(),
                    reason: e.to_string(),
                };
                return self.reject(message, denial, true).await;
            }
        };

        if !command.can_use(&caller) {
            warn!(
                command = %command.name(),
                context = %message.context,
                user_id = caller.user_id,
                level = %caller.level,
                required = %command.required_level(),
                "Permission denied"
            );
            let denial = DispatchError::PermissionDenied {
                command: command.name().to_string(),
                required: command.required_level(),
                actual: caller.level,
            };
            return self.reject(message, denial, true).await;
        }

        let context = self
            .registry
            .context(&message.context)
            .cloned()
            .unwrap_or_else(|| BotContext::anonymous(message.context.clone()));
        let invocation = Invocation {
            context: &context,
            caller: &caller,
            message,
            args: &line.args,
            raw_args: &line.raw_args,
            commands: &self.registry,
            permissions: &self.permissions,
        };

        info!(
            command = %command.name(),
            context = %message.context,
            user_id = caller.user_id,
            args = line.args.len(),
            "Executing command"
        );
        match command.handler().execute(invocation).await {
            Ok(reply) => {
                if let Some(text) = reply {
                    self.sink.respond(message, &text).await?;
                }
                Ok(DispatchOutcome::Completed {
                    command: command.name().to_string(),
                })
            }
            Err(CommandError::Failed { reason }) => {
                let failure = command_failed(command, reason);
                self.reject(message, failure, true).await
            }
            Err(CommandError::InvalidArguments { reason }) => {
                let reason = format!("{reason} (usage: `{}`)", command.syntax());
                let failure = command_failed(command, reason);
                self.reject(message, failure, true).await
            }
            Err(source @ CommandError::Unexpected(_)) => {
                error!(command = %command.name(), error = %source, "Command failed unexpectedly");
                Err(HeraldError::Unexpected {
                    command: command.name().to_string(),
                    source,
                })
            }
        }
    }

    async fn reject(
        &self,
        message: &InboundMessage,
        failure: DispatchError,
        reply: bool,
    ) -> Result<DispatchOutcome> {
        if reply {
            self.sink.respond(message, &failure.to_string()).await?;
        }
        Ok(DispatchOutcome::Rejected(failure))
    }
}

fn command_failed(command: &CommandDefinition, reason: String) -> DispatchError {
    warn!(command = %command.name(), reason = %reason, "Command reported failure");
    DispatchError::CommandFailed {
        command: command.name().to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandResult;
    use crate::context::ContextId;
    use crate::permissions::{InMemoryBackend, PermissionLevel};
    use crate::message::RecordingSink;

    fn echo() -> CommandDefinition {
        CommandDefinition::from_fn("echo", PermissionLevel::STANDARD_USER, |inv: &Invocation<'_>| {
            Ok(Some(inv.raw_args.to_string()))
        })
    }

    fn setup(registry: CommandRegistry) -> (Dispatcher, Arc<RecordingSink>, Arc<PermissionStore>) {
        let sink = Arc::new(RecordingSink::new());
        let store = Arc::new(PermissionStore::new(Arc::new(InMemoryBackend::new())));
        let dispatcher = Dispatcher::new(Arc::new(registry), store.clone(), sink.clone());
        (dispatcher, sink, store)
    }

    fn msg(text: &str) -> InboundMessage {
        InboundMessage::new("g1", 10, text)
    }

    #[test]
    fn test_command_text_prefix() {
        let (dispatcher, _, _) = setup(CommandRegistry::new());
        assert_eq!(dispatcher.command_text("help"), Some("help"));

        let prefixed = dispatcher.with_config(DispatchConfig::default());
        assert_eq!(prefixed.command_text(">> help"), Some(" help"));
        assert_eq!(prefixed.command_text("  >>help"), Some("help"));
        assert_eq!(prefixed.command_text("help"), None);
    }

    #[tokio::test]
    async fn test_blank_message_is_ignored() {
        let (dispatcher, sink, _) = setup(CommandRegistry::new());
        let outcome = dispatcher.dispatch(&msg("   ")).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Ignored));
        let outcome = dispatcher.dispatch(&msg("")).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Ignored));
        assert!(sink.texts().await.is_empty());
    }

    #[tokio::test]
    async fn test_unprefixed_text_is_ignored_when_prefix_configured() {
        let (dispatcher, sink, _) = setup(CommandRegistry::new());
        let dispatcher = dispatcher.with_config(DispatchConfig::default());
        let outcome = dispatcher.dispatch(&msg("hello there")).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Ignored));
        let outcome = dispatcher.dispatch(&msg("  ")).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Ignored));
        assert!(sink.texts().await.is_empty());
    }

    #[tokio::test]
    async fn test_prefixed_command_runs_when_prefix_configured() {
        let mut registry = CommandRegistry::new();
        registry.register(echo()).unwrap();
        let (dispatcher, sink, _) = setup(registry);
        let dispatcher = dispatcher.with_config(DispatchConfig::default());

        let outcome = dispatcher.dispatch(&msg("echo hi")).await.unwrap();
        assert!(outcome.is_completed());
        assert_eq!(sink.texts().await, vec!["hi"]);
    }

    #[tokio::test]
    async fn test_completed_reply_is_sent() {
        let mut registry = CommandRegistry::new();
        registry.register(echo()).unwrap();
        let (dispatcher, sink, _) = setup(registry);

        let outcome = dispatcher
            .dispatch(&msg("ECHO  keep   \"spacing\""))
            .await
            .unwrap();
        assert!(outcome.is_completed());
        assert_eq!(sink.texts().await, vec!["keep   \"spacing\""]);
    }

    #[tokio::test]
    async fn test_unknown_command_replies_once() {
        let (dispatcher, sink, _) = setup(CommandRegistry::new());
        let outcome = dispatcher.dispatch(&msg("doesnotexist arg1")).await.unwrap();
        match outcome.rejection() {
            Some(DispatchError::UnknownCommand { name }) => assert_eq!(name, "doesnotexist"),
            other => panic!("Expected UnknownCommand, got: {other:?}"),
        }
        assert_eq!(sink.texts().await, vec!["Unknown command: `doesnotexist`"]);
    }

    #[tokio::test]
    async fn test_unknown_command_reply_can_be_disabled() {
        let (dispatcher, sink, _) = setup(CommandRegistry::new());
        let dispatcher = dispatcher.with_config(DispatchConfig {
            prefix: String::new(),
            reply_on_unknown: false,
        });
        let outcome = dispatcher.dispatch(&msg("nope")).await.unwrap();
        assert!(outcome.rejection().is_some());
        assert!(sink.texts().await.is_empty());
    }

    #[tokio::test]
    async fn test_denied_below_required_level() {
        let mut registry = CommandRegistry::new();
        registry
            .register(CommandDefinition::from_fn(
                "kick",
                PermissionLevel::TRUSTED_USER,
                |_inv: &Invocation<'_>| panic!("handler must not run"),
            ))
            .unwrap();
        let (dispatcher, sink, _) = setup(registry);

        let outcome = dispatcher.dispatch(&msg("kick someone")).await.unwrap();
        match outcome.rejection() {
            Some(DispatchError::PermissionDenied {
                command,
                required,
                actual,
            }) => {
                assert_eq!(command, "kick");
                assert_eq!(*required, PermissionLevel::TRUSTED_USER);
                assert_eq!(*actual, PermissionLevel::STANDARD_USER);
            }
            other => panic!("Expected PermissionDenied, got: {other:?}"),
        }
        assert_eq!(sink.texts().await.len(), 1);
    }

    #[tokio::test]
    async fn test_exact_level_is_allowed() {
        let mut registry = CommandRegistry::new();
        registry
            .register(CommandDefinition::from_fn(
                "kick",
                PermissionLevel::TRUSTED_USER,
                |_inv: &Invocation<'_>| Ok(None),
            ))
            .unwrap();
        let (dispatcher, sink, store) = setup(registry);
        store
            .set_level(&ContextId::new("g1"), 10, PermissionLevel::TRUSTED_USER, false)
            .await
            .unwrap();

        let outcome = dispatcher.dispatch(&msg("kick")).await.unwrap();
        assert!(outcome.is_completed());
        assert!(sink.texts().await.is_empty());
    }

    #[tokio::test]
    async fn test_domain_failure_is_converted() {
        let mut registry = CommandRegistry::new();
        registry
            .register(CommandDefinition::from_fn(
                "roll",
                PermissionLevel::STANDARD_USER,
                |_inv: &Invocation<'_>| -> CommandResult { Err(CommandError::failed("no dice")) },
            ))
            .unwrap();
        let (dispatcher, sink, _) = setup(registry);

        let outcome = dispatcher.dispatch(&msg("roll")).await.unwrap();
        assert!(matches!(
            outcome.rejection(),
            Some(DispatchError::CommandFailed { .. })
        ));
        assert_eq!(sink.texts().await, vec!["Command `roll` failed: no dice"]);
    }

    #[tokio::test]
    async fn test_invalid_arguments_include_syntax() {
        let mut registry = CommandRegistry::new();
        registry
            .register(
                CommandDefinition::from_fn(
                    "roll",
                    PermissionLevel::STANDARD_USER,
                    |_inv: &Invocation<'_>| -> CommandResult {
                        Err(CommandError::invalid_arguments("expected NdM"))
                    },
                )
                .with_syntax("roll <NdM>"),
            )
            .unwrap();
        let (dispatcher, sink, _) = setup(registry);

        dispatcher.dispatch(&msg("roll x")).await.unwrap();
        assert_eq!(
            sink.texts().await,
            vec!["Command `roll` failed: expected NdM (usage: `roll <NdM>`)"]
        );
    }

    #[tokio::test]
    async fn test_unexpected_failure_propagates() {
        let mut registry = CommandRegistry::new();
        registry
            .register(CommandDefinition::from_fn(
                "crash",
                PermissionLevel::STANDARD_USER,
                |_inv: &Invocation<'_>| -> CommandResult {
                    Err(CommandError::Unexpected(anyhow::anyhow!("database gone")))
                },
            ))
            .unwrap();
        let (dispatcher, sink, _) = setup(registry);

        let err = dispatcher.dispatch(&msg("crash")).await.unwrap_err();
        match err {
            HeraldError::Unexpected { command, .. } => assert_eq!(command, "crash"),
            other => panic!("Expected Unexpected, got: {other:?}"),
        }
        assert!(sink.texts().await.is_empty());
    }

    #[tokio::test]
    async fn test_handler_sees_context_and_caller() {
        let mut registry = CommandRegistry::new();
        registry.add_context(BotContext::new("g1", "Guild One"));
        registry
            .register(CommandDefinition::from_fn(
                "whoami",
                PermissionLevel::NONMEMBER,
                |inv: &Invocation<'_>| {
                    Ok(Some(format!(
                        "{} in {} at {} with {:?}",
                        inv.caller.user_id, inv.context.name, inv.caller.level, inv.args
                    )))
                },
            ))
            .unwrap();
        let (dispatcher, sink, _) = setup(registry);

        dispatcher.dispatch(&msg("whoami a \"b c\"")).await.unwrap();
        assert_eq!(
            sink.texts().await,
            vec!["10 in Guild One at 2 with [\"a\", \"b c\"]"]
        );
    }
}
