//! # Permissions
//!
//! Permission levels, the per-context permission store, and the backing
//! stores that persist it across restarts.

pub mod backend;
pub mod level;
pub mod store;

pub use backend::{InMemoryBackend, JsonFileBackend, PermissionBackend};
pub use level::{ParseLevelError, PermissionLevel};
pub use store::PermissionStore;
