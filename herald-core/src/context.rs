//! Bot contexts and callers.
//!
//! A context is one deployment scope, typically a single server/guild. It owns
//! its own command namespace and its own permission partition.

use serde::{Deserialize, Serialize};

use crate::permissions::PermissionLevel;

/// Platform user identifier.
pub type UserId = u64;

/// Opaque identity of a context.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(pub String);

impl ContextId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ContextId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<u64> for ContextId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// A deployment scope known to the bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotContext {
    pub id: ContextId,
    pub name: String,
}

impl BotContext {
    pub fn new(id: impl Into<ContextId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// A context known only by id. Its display name is the id itself.
    pub fn anonymous(id: ContextId) -> Self {
        let name = id.0.clone();
        Self { id, name }
    }
}

/// The user invoking a command, with their resolved effective level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    pub context: ContextId,
    pub level: PermissionLevel,
}

impl Caller {
    pub fn new(user_id: UserId, context: ContextId, level: PermissionLevel) -> Self {
        Self {
            user_id,
            context,
            level,
        }
    }
}
