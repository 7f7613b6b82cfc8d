//! Permission levels.
//!
//! A level is a single byte; higher is more privileged. The named constants
//! are conventions shared by bundled commands, not a closed set.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// An authorization rank in `0..=255`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PermissionLevel(pub u8);

impl PermissionLevel {
    /// Someone who is not a member of the context.
    pub const NONMEMBER: Self = Self(0);
    /// Blacklisted from every command.
    pub const BLACKLISTED: Self = Self(1);
    /// An ordinary user. The stock default.
    pub const STANDARD_USER: Self = Self(2);
    /// A user trusted with slightly more than average power.
    pub const TRUSTED_USER: Self = Self(3);
    /// Controls basic bot functions; usually moderators.
    pub const OPERATOR: Self = Self(63);
    /// Controls advanced bot functions such as shutdown.
    pub const ADMINISTRATOR: Self = Self(127);
    /// The owner of the server the context represents.
    pub const SERVER_OWNER: Self = Self(254);
    /// The backend console and the bot owner.
    pub const BACKEND_CONSOLE: Self = Self(255);

    pub const fn new(level: u8) -> Self {
        Self(level)
    }

    pub const fn value(self) -> u8 {
        self.0
    }

    /// Conventional name of this level, if it has one.
    pub fn label(self) -> Option<&'static str> {
        match self.0 {
            0 => Some("nonmember"),
            1 => Some("blacklisted"),
            2 => Some("standard user"),
            3 => Some("trusted user"),
            63 => Some("operator"),
            127 => Some("administrator"),
            254 => Some("server owner"),
            255 => Some("backend console"),
            _ => None,
        }
    }
}

impl From<u8> for PermissionLevel {
    fn from(level: u8) -> Self {
        Self(level)
    }
}

impl std::fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The text could not be read as a level.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a permission level (0-255 integer expected)")]
pub struct ParseLevelError(pub String);

impl FromStr for PermissionLevel {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        // u8::from_str accepts a leading '+', which persisted data never contains.
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseLevelError(s.to_string()));
        }
        trimmed
            .parse::<u8>()
            .map(Self)
            .map_err(|_| ParseLevelError(s.to_string()))
    }
}
