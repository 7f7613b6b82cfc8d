//! Commands the console host registers out of the box.

use async_trait::async_trait;
use herald_core::{
    CommandDefinition, CommandError, CommandHandler, CommandRegistry, CommandResult, Invocation,
    PermissionLevel, RegistryError,
};

/// Width of the name column in the command listing.
const NAME_COLUMN: usize = 34;

/// Register `help`, `whoami`, `setlevel`, and `echo` globally.
pub fn register_builtins(registry: &mut CommandRegistry) -> Result<(), RegistryError> {
    registry.register(
        CommandDefinition::new("help", PermissionLevel::STANDARD_USER, Help)
            .with_description("Lists every command, or shows details of one command.")
            .with_syntax("help [commandName]"),
    )?;
    registry.register(
        CommandDefinition::from_fn("whoami", PermissionLevel::NONMEMBER, whoami)
            .with_description("Shows your user id and permission level here."),
    )?;
    registry.register(
        CommandDefinition::new("setlevel", PermissionLevel::ADMINISTRATOR, SetLevel)
            .with_description("Sets the permission level of a user in this context.")
            .with_syntax("setlevel <userId> <level>"),
    )?;
    registry.register(
        CommandDefinition::from_fn("echo", PermissionLevel::STANDARD_USER, |inv: &Invocation<'_>| {
            Ok(Some(inv.raw_args.to_string()))
        })
        .with_description("Repeats the text after the command exactly as typed.")
        .with_syntax("echo <text>"),
    )?;
    Ok(())
}

struct Help;

#[async_trait]
impl CommandHandler for Help {
    async fn execute(&self, inv: Invocation<'_>) -> CommandResult {
        match inv.args {
            [] => Ok(Some(render_listing(&inv))),
            [name] => {
                let command = inv
                    .commands
                    .resolve(name, &inv.context.id)
                    .ok_or_else(|| CommandError::failed(format!("no command named `{name}`")))?;
                let mut text = format!("**{}**: {}\n", command.name(), command.description());
                text.push_str(&format!("Usage: `{}`\n", command.syntax()));
                text.push_str(&format!(
                    "Requires permission level {} (or higher).",
                    command.required_level()
                ));
                Ok(Some(text))
            }
            _ => Err(CommandError::invalid_arguments("expected at most one command name")),
        }
    }
}

fn render_listing(inv: &Invocation<'_>) -> String {
    let listing = inv.commands.list_all(&inv.context.id);
    let mut text = String::from("Commands marked `+` are usable by you, `-` are not.\n");
    for command in &listing.global {
        text.push_str(&listing_line(command, inv));
    }
    if !listing.context.is_empty() {
        text.push_str(&format!("\nCommands specific to {}:\n", inv.context.name));
        for command in &listing.context {
            text.push_str(&listing_line(command, inv));
        }
    }
    text
}

fn listing_line(command: &CommandDefinition, inv: &Invocation<'_>) -> String {
    let mark = if command.can_use(inv.caller) { '+' } else { '-' };
    let head = format!("{mark} {}", command.name());
    format!(
        "{head:<NAME_COLUMN$}Requires Permission Level {} (or higher).\n",
        command.required_level()
    )
}

fn whoami(inv: &Invocation<'_>) -> CommandResult {
    let level = inv.caller.level;
    let label = level.label().unwrap_or("custom");
    Ok(Some(format!(
        "User {} in {}: permission level {level} ({label})",
        inv.caller.user_id, inv.context.name
    )))
}

struct SetLevel;

#[async_trait]
impl CommandHandler for SetLevel {
    async fn execute(&self, inv: Invocation<'_>) -> CommandResult {
        let [user, level] = inv.args else {
            return Err(CommandError::invalid_arguments("expected a user id and a level"));
        };
        let user_id: u64 = user
            .parse()
            .map_err(|_| CommandError::invalid_arguments(format!("'{user}' is not a user id")))?;
        let level: PermissionLevel = level
            .parse()
            .map_err(|e: herald_core::permissions::ParseLevelError| {
                CommandError::invalid_arguments(e.to_string())
            })?;

        if inv.permissions.owner() == Some(user_id) {
            return Err(CommandError::failed(format!(
                "user {user_id} is the owner; owner trust overrides any stored level"
            )));
        }
        if level > inv.caller.level {
            return Err(CommandError::failed(
                "you cannot grant a level higher than your own",
            ));
        }
        if user_id != inv.caller.user_id {
            let current = inv
                .permissions
                .get_level(&inv.context.id, user_id)
                .await
                .map_err(|e| CommandError::failed(e.to_string()))?;
            if current >= inv.caller.level {
                return Err(CommandError::failed(
                    "you cannot change the level of someone ranked at or above you",
                ));
            }
        }

        inv.permissions
            .set_level(&inv.context.id, user_id, level, true)
            .await
            .map_err(|e| CommandError::Unexpected(e.into()))?;
        Ok(Some(format!(
            "User {user_id} now has permission level {level} in {}.",
            inv.context.name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::{
        BotContext, ContextId, DispatchError, Dispatcher, InMemoryBackend, InboundMessage,
        PermissionStore, RecordingSink,
    };
    use std::sync::Arc;

    async fn console() -> (Dispatcher, Arc<RecordingSink>, Arc<PermissionStore>) {
        let mut registry = CommandRegistry::new();
        registry.add_context(BotContext::new("console", "the console"));
        register_builtins(&mut registry).unwrap();
        let store = Arc::new(PermissionStore::new(Arc::new(InMemoryBackend::new())));
        store.grant_owner_max_trust(1).unwrap();
        let sink = Arc::new(RecordingSink::new());
        let dispatcher = Dispatcher::new(Arc::new(registry), store.clone(), sink.clone());
        (dispatcher, sink, store)
    }

    fn from(user: u64, text: &str) -> InboundMessage {
        InboundMessage::new("console", user, text)
    }

    #[test]
    fn test_register_twice_fails() {
        let mut registry = CommandRegistry::new();
        register_builtins(&mut registry).unwrap();
        assert!(register_builtins(&mut registry).is_err());
    }

    #[tokio::test]
    async fn test_help_listing() {
        let (dispatcher, sink, _) = console().await;
        dispatcher.dispatch(&from(5, "help")).await.unwrap();
        let text = &sink.texts().await[0];
        let lines: Vec<_> = text.lines().skip(1).collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("+ whoami"));
        assert!(lines[1].starts_with("+ echo"));
        assert!(lines[2].starts_with("+ help"));
        assert!(lines[3].starts_with("- setlevel"));
        assert!(lines[3].contains("Requires Permission Level 127"));
    }

    #[tokio::test]
    async fn test_help_single_command() {
        let (dispatcher, sink, _) = console().await;
        dispatcher.dispatch(&from(5, "help SETLEVEL")).await.unwrap();
        let text = &sink.texts().await[0];
        assert!(text.contains("Usage: `setlevel <userId> <level>`"));
        assert!(text.contains("level 127"));

        let outcome = dispatcher.dispatch(&from(5, "help nothing")).await.unwrap();
        assert!(matches!(
            outcome.rejection(),
            Some(DispatchError::CommandFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_whoami_owner() {
        let (dispatcher, sink, _) = console().await;
        dispatcher.dispatch(&from(1, "whoami")).await.unwrap();
        assert_eq!(
            sink.texts().await,
            vec!["User 1 in the console: permission level 255 (backend console)"]
        );
    }

    #[tokio::test]
    async fn test_setlevel_by_owner() {
        let (dispatcher, sink, store) = console().await;
        let outcome = dispatcher.dispatch(&from(1, "setlevel 7 63")).await.unwrap();
        assert!(outcome.is_completed());
        assert_eq!(
            store.get_level(&ContextId::new("console"), 7).await.unwrap(),
            PermissionLevel::OPERATOR
        );
        assert_eq!(
            sink.texts().await,
            vec!["User 7 now has permission level 63 in the console."]
        );
    }

    #[tokio::test]
    async fn test_setlevel_refuses_owner() {
        let (dispatcher, sink, store) = console().await;
        let outcome = dispatcher.dispatch(&from(1, "setlevel 1 3")).await.unwrap();
        assert!(matches!(
            outcome.rejection(),
            Some(DispatchError::CommandFailed { .. })
        ));
        assert_eq!(
            sink.texts().await,
            vec!["Command `setlevel` failed: user 1 is the owner; owner trust overrides any stored level"]
        );
        assert_eq!(
            store.get_level(&ContextId::new("console"), 1).await.unwrap(),
            PermissionLevel::BACKEND_CONSOLE
        );
    }

    #[tokio::test]
    async fn test_setlevel_cannot_exceed_own_level() {
        let (dispatcher, sink, store) = console().await;
        store
            .set_level(&ContextId::new("console"), 9, PermissionLevel::ADMINISTRATOR, false)
            .await
            .unwrap();
        dispatcher.dispatch(&from(9, "setlevel 7 200")).await.unwrap();
        assert_eq!(
            sink.texts().await,
            vec!["Command `setlevel` failed: you cannot grant a level higher than your own"]
        );
    }

    #[tokio::test]
    async fn test_setlevel_bad_arguments() {
        let (dispatcher, sink, _) = console().await;
        dispatcher.dispatch(&from(1, "setlevel 7")).await.unwrap();
        dispatcher.dispatch(&from(1, "setlevel x 3")).await.unwrap();
        let texts = sink.texts().await;
        assert!(texts[0].contains("expected a user id and a level"));
        assert!(texts[1].contains("'x' is not a user id"));
        assert!(texts[1].contains("usage: `setlevel <userId> <level>`"));
    }

    #[tokio::test]
    async fn test_echo_keeps_raw_text() {
        let (dispatcher, sink, _) = console().await;
        dispatcher
            .dispatch(&from(5, "echo  \"quoted\"   spaced"))
            .await
            .unwrap();
        assert_eq!(sink.texts().await, vec!["\"quoted\"   spaced"]);
    }
}
