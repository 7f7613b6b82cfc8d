//! Command registry: global and per-context command namespaces.
//!
//! Commands are registered during startup. Once the registry is handed to a
//! [`Dispatcher`](crate::dispatch::Dispatcher) it is shared behind an `Arc`
//! and can no longer be mutated.
//!
//! Names are case-insensitive. The global scope and every context scope are
//! independent namespaces; a context command shadows a global command of the
//! same name inside that context only.

use std::collections::BTreeMap;
use tracing::debug;

use crate::command::{CommandDefinition, fold_name};
use crate::context::{BotContext, ContextId};
use crate::error::RegistryError;

/// Commands visible from one context, each sorted in listing order.
#[derive(Debug, Default)]
pub struct CommandListing<'a> {
    pub global: Vec<&'a CommandDefinition>,
    pub context: Vec<&'a CommandDefinition>,
}

impl<'a> CommandListing<'a> {
    /// Global then context commands.
    pub fn iter(&self) -> impl Iterator<Item = &'a CommandDefinition> + '_ {
        self.global.iter().chain(self.context.iter()).copied()
    }
}

#[derive(Debug)]
struct ContextScope {
    context: BotContext,
    commands: BTreeMap<String, CommandDefinition>,
}

/// Holds every registered command.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    global: BTreeMap<String, CommandDefinition>,
    contexts: BTreeMap<ContextId, ContextScope>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a context, or rename one that already exists.
    pub fn add_context(&mut self, context: BotContext) {
        match self.contexts.get_mut(&context.id) {
            Some(scope) => scope.context = context,
            None => {
                debug!(context = %context.id, name = %context.name, "Registering context");
                self.contexts.insert(
                    context.id.clone(),
                    ContextScope {
                        context,
                        commands: BTreeMap::new(),
                    },
                );
            }
        }
    }

    /// A declared context.
    pub fn context(&self, id: &ContextId) -> Option<&BotContext> {
        self.contexts.get(id).map(|scope| &scope.context)
    }

    /// Every declared context, ordered by id.
    pub fn contexts(&self) -> impl Iterator<Item = &BotContext> {
        self.contexts.values().map(|scope| &scope.context)
    }

    /// Register a global command.
    pub fn register(&mut self, command: CommandDefinition) -> Result<(), RegistryError> {
        validate_name(command.name())?;
        insert_unique(&mut self.global, command, "global scope")
    }

    /// Register a command visible only in `context`. Undeclared contexts are
    /// declared on the fly with their id as name.
    pub fn register_in(
        &mut self,
        context: &ContextId,
        command: CommandDefinition,
    ) -> Result<(), RegistryError> {
        validate_name(command.name())?;
        let scope = self.contexts.entry(context.clone()).or_insert_with(|| {
            debug!(context = %context, "Registering context");
            ContextScope {
                context: BotContext::anonymous(context.clone()),
                commands: BTreeMap::new(),
            }
        });
        insert_unique(
            &mut scope.commands,
            command,
            &format!("context {context}"),
        )
    }

    /// Find the command `name` as seen from `context`.
    ///
    /// Context commands take precedence over global ones.
    pub fn resolve(&self, name: &str, context: &ContextId) -> Option<&CommandDefinition> {
        let key = fold_name(name);
        self.contexts
            .get(context)
            .and_then(|scope| scope.commands.get(&key))
            .or_else(|| self.global.get(&key))
    }

    /// Global and context commands visible from `context`, in listing order.
    pub fn list_all(&self, context: &ContextId) -> CommandListing<'_> {
        let mut global: Vec<_> = self.global.values().collect();
        global.sort_by(|a, b| a.listing_cmp(b));

        let mut local: Vec<_> = self
            .contexts
            .get(context)
            .map(|scope| scope.commands.values().collect())
            .unwrap_or_default();
        local.sort_by(|a, b| a.listing_cmp(b));

        CommandListing {
            global,
            context: local,
        }
    }

    /// Total number of commands across all scopes.
    pub fn len(&self) -> usize {
        self.global.len()
            + self
                .contexts
                .values()
                .map(|scope| scope.commands.len())
                .sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn validate_name(name: &str) -> Result<(), RegistryError> {
    let reason = if name.is_empty() {
        "name is empty"
    } else if name.chars().any(char::is_whitespace) {
        "name contains whitespace"
    } else if name.contains('"') {
        "name contains a quote"
    } else {
        return Ok(());
    };
    Err(RegistryError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    })
}

fn insert_unique(
    scope: &mut BTreeMap<String, CommandDefinition>,
    command: CommandDefinition,
    scope_label: &str,
) -> Result<(), RegistryError> {
    let key = command.folded_name();
    if scope.contains_key(&key) {
        return Err(RegistryError::DuplicateCommand {
            name: command.name().to_string(),
            scope: scope_label.to_string(),
        });
    }
    debug!(command = %command.name(), scope = scope_label, "Registering command");
    scope.insert(key, command);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Invocation;
    use crate::permissions::PermissionLevel;

    fn cmd(name: &str, level: u8) -> CommandDefinition {
        CommandDefinition::from_fn(name, PermissionLevel(level), |_inv: &Invocation<'_>| Ok(None))
    }

    fn ctx(id: &str) -> ContextId {
        ContextId::new(id)
    }

    #[test]
    fn test_registry_new() {
        let registry = CommandRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_register_duplicate_case_insensitive() {
        let mut registry = CommandRegistry::new();
        registry.register(cmd("Help", 2)).unwrap();

        match registry.register(cmd("help", 2)).unwrap_err() {
            RegistryError::DuplicateCommand { name, scope } => {
                assert_eq!(name, "help");
                assert_eq!(scope, "global scope");
            }
            e => panic!("Expected DuplicateCommand, got: {e:?}"),
        }
    }

    #[test]
    fn test_scopes_are_independent_namespaces() {
        let mut registry = CommandRegistry::new();
        registry.register(cmd("ping", 2)).unwrap();
        registry.register_in(&ctx("g1"), cmd("ping", 2)).unwrap();
        registry.register_in(&ctx("g2"), cmd("PING", 2)).unwrap();
        assert_eq!(registry.len(), 3);

        let err = registry.register_in(&ctx("g1"), cmd("Ping", 2)).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateCommand { .. }));
        assert!(err.to_string().contains("context g1"));
    }

    #[test]
    fn test_invalid_names_rejected() {
        let mut registry = CommandRegistry::new();
        for bad in ["", "two words", "tab\tname", "quo\"te"] {
            let err = registry.register(cmd(bad, 2)).unwrap_err();
            assert!(matches!(err, RegistryError::InvalidName { .. }), "{bad:?}");
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_resolve_case_insensitive() {
        let mut registry = CommandRegistry::new();
        registry.register(cmd("Ping", 2)).unwrap();
        let found = registry.resolve("PING", &ctx("any")).unwrap();
        assert_eq!(found.name(), "Ping");
        assert!(registry.resolve("pong", &ctx("any")).is_none());
    }

    #[test]
    fn test_context_command_takes_precedence() {
        let mut registry = CommandRegistry::new();
        registry.register(cmd("rules", 2)).unwrap();
        registry.register_in(&ctx("g1"), cmd("rules", 63)).unwrap();

        let in_g1 = registry.resolve("rules", &ctx("g1")).unwrap();
        assert_eq!(in_g1.required_level(), PermissionLevel(63));

        let in_g2 = registry.resolve("rules", &ctx("g2")).unwrap();
        assert_eq!(in_g2.required_level(), PermissionLevel(2));
    }

    #[test]
    fn test_context_command_invisible_elsewhere() {
        let mut registry = CommandRegistry::new();
        registry.register_in(&ctx("g1"), cmd("local", 2)).unwrap();
        assert!(registry.resolve("local", &ctx("g1")).is_some());
        assert!(registry.resolve("local", &ctx("g2")).is_none());
    }

    #[test]
    fn test_list_all_ordering() {
        let mut registry = CommandRegistry::new();
        registry.register(cmd("b", 2)).unwrap();
        registry.register(cmd("a", 63)).unwrap();
        registry.register(cmd("c", 2)).unwrap();
        // Listing is by (level, name): b(2), c(2), a(63).
        let listing = registry.list_all(&ctx("g1"));
        let names: Vec<_> = listing.global.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["b", "c", "a"]);
        assert!(listing.context.is_empty());
    }

    #[test]
    fn test_list_all_levels_then_names() {
        let mut registry = CommandRegistry::new();
        for (name, level) in [("b", 2), ("a", 2), ("c", 63)] {
            registry.register(cmd(name, level)).unwrap();
        }
        let listing = registry.list_all(&ctx("g1"));
        let entries: Vec<_> = listing
            .global
            .iter()
            .map(|c| (c.name(), c.required_level().value()))
            .collect();
        assert_eq!(entries, vec![("a", 2), ("b", 2), ("c", 63)]);
    }

    #[test]
    fn test_list_all_is_stable_and_split() {
        let mut registry = CommandRegistry::new();
        registry.register(cmd("zeta", 2)).unwrap();
        registry.register(cmd("alpha", 2)).unwrap();
        registry.register_in(&ctx("g1"), cmd("mod", 63)).unwrap();
        registry.register_in(&ctx("g1"), cmd("ban", 127)).unwrap();

        let first: Vec<_> = registry.list_all(&ctx("g1")).iter().map(|c| c.name()).collect();
        let second: Vec<_> = registry.list_all(&ctx("g1")).iter().map(|c| c.name()).collect();
        assert_eq!(first, second);
        assert_eq!(first, vec!["alpha", "zeta", "mod", "ban"]);
    }

    #[test]
    fn test_contexts_declared() {
        let mut registry = CommandRegistry::new();
        registry.add_context(BotContext::new("g1", "Guild One"));
        registry.register_in(&ctx("g2"), cmd("x", 2)).unwrap();
        registry.add_context(BotContext::new("g1", "Renamed"));

        let names: Vec<_> = registry.contexts().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Renamed", "g2"]);
        assert_eq!(registry.context(&ctx("g2")).unwrap().name, "g2");
    }
}
