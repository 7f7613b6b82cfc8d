//! Per-context permission store.
//!
//! The store is a read-through cache in front of a [`PermissionBackend`]:
//! a miss reads the backend once, and the result stays cached for the life
//! of the process unless [`PermissionStore::set_level`] replaces it.
//!
//! Each context owns an independent partition guarded by its own async mutex,
//! so lookups in different contexts never wait on each other. The partition
//! lock is held across backend I/O for that context, which keeps reads and
//! writes of one `(context, user)` pair linearizable.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::backend::PermissionBackend;
use super::level::PermissionLevel;
use crate::config::PermissionConfig;
use crate::context::{Caller, ContextId, UserId};
use crate::error::PermissionError;

type Partition = HashMap<UserId, PermissionLevel>;

#[derive(Debug, Default)]
struct Lifecycle {
    activated: bool,
    owner: Option<UserId>,
}

/// Maps `(context, user)` to a permission level.
pub struct PermissionStore {
    backend: Arc<dyn PermissionBackend>,
    default_level: PermissionLevel,
    partitions: RwLock<HashMap<ContextId, Arc<Mutex<Partition>>>>,
    lifecycle: std::sync::Mutex<Lifecycle>,
}

impl PermissionStore {
    pub fn new(backend: Arc<dyn PermissionBackend>) -> Self {
        Self {
            backend,
            default_level: PermissionLevel::STANDARD_USER,
            partitions: RwLock::new(HashMap::new()),
            lifecycle: std::sync::Mutex::new(Lifecycle::default()),
        }
    }

    /// Build a store from configuration, granting the configured owner max trust.
    pub fn from_config(
        config: &PermissionConfig,
        backend: Arc<dyn PermissionBackend>,
    ) -> Result<Self, PermissionError> {
        let store = Self::new(backend).with_default_level(PermissionLevel(config.default_level));
        if let Some(owner) = config.owner_id {
            store.grant_owner_max_trust(owner)?;
        }
        Ok(store)
    }

    /// Level assumed for users with no stored record. Records at this level
    /// are never persisted.
    pub fn with_default_level(mut self, level: PermissionLevel) -> Self {
        self.default_level = level;
        self
    }

    pub fn default_level(&self) -> PermissionLevel {
        self.default_level
    }

    /// Give `user_id` the maximum level in every context.
    ///
    /// Only allowed before the store is activated; afterwards callers may
    /// already have observed the owner's ordinary level.
    pub fn grant_owner_max_trust(&self, user_id: UserId) -> Result<(), PermissionError> {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        if lifecycle.activated {
            warn!(user_id, "Rejected owner max-trust grant after activation");
            return Err(PermissionError::AlreadyActivated);
        }
        info!(user_id, "Owner granted maximum permission level");
        lifecycle.owner = Some(user_id);
        Ok(())
    }

    /// The user holding owner max trust, if any.
    pub fn owner(&self) -> Option<UserId> {
        self.lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .owner
    }

    /// Mark the store as in use. Happens implicitly on the first lookup,
    /// write, or flush.
    pub fn activate(&self) {
        self.activate_and_get_owner();
    }

    pub fn is_activated(&self) -> bool {
        self.lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .activated
    }

    fn activate_and_get_owner(&self) -> Option<UserId> {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        if !lifecycle.activated {
            debug!("Permission store activated");
            lifecycle.activated = true;
        }
        lifecycle.owner
    }

    async fn partition(&self, context: &ContextId) -> Arc<Mutex<Partition>> {
        if let Some(p) = self.partitions.read().await.get(context) {
            return p.clone();
        }
        self.partitions
            .write()
            .await
            .entry(context.clone())
            .or_default()
            .clone()
    }

    /// Effective level of `user_id` in `context`.
    ///
    /// Stored data that does not parse as a level is reported as
    /// [`PermissionError::MalformedData`] and is not cached, so it keeps
    /// failing until an operator repairs it.
    pub async fn get_level(
        &self,
        context: &ContextId,
        user_id: UserId,
    ) -> Result<PermissionLevel, PermissionError> {
        if self.activate_and_get_owner() == Some(user_id) {
            return Ok(PermissionLevel::BACKEND_CONSOLE);
        }

        let partition = self.partition(context).await;
        let mut cache = partition.lock().await;
        if let Some(level) = cache.get(&user_id) {
            return Ok(*level);
        }

        let level = match self.backend.read(context, &user_id.to_string()).await? {
            None => self.default_level,
            Some(raw) => raw.parse::<PermissionLevel>().map_err(|_| {
                error!(
                    context = %context,
                    user_id,
                    value = %raw,
                    "Malformed permission data in backing store"
                );
                PermissionError::MalformedData {
                    context: context.to_string(),
                    user_id,
                    value: raw.clone(),
                }
            })?,
        };
        cache.insert(user_id, level);
        Ok(level)
    }

    /// Resolve the caller identity for `user_id` in `context`.
    pub async fn caller(
        &self,
        context: &ContextId,
        user_id: UserId,
    ) -> Result<Caller, PermissionError> {
        let level = self.get_level(context, user_id).await?;
        Ok(Caller::new(user_id, context.clone(), level))
    }

    /// Set the level of `user_id` in `context`.
    ///
    /// The cache is updated unconditionally. With `persist_now` the record is
    /// also written through and the context flushed; otherwise it waits for
    /// [`flush_all`](Self::flush_all).
    ///
    /// The owner's level cannot be set: it is always 255 and never stored.
    pub async fn set_level(
        &self,
        context: &ContextId,
        user_id: UserId,
        level: PermissionLevel,
        persist_now: bool,
    ) -> Result<(), PermissionError> {
        if self.activate_and_get_owner() == Some(user_id) {
            warn!(context = %context, user_id, "Rejected level change for the owner");
            return Err(PermissionError::OwnerLevelFixed { user_id });
        }
        let partition = self.partition(context).await;
        let mut cache = partition.lock().await;
        cache.insert(user_id, level);
        debug!(context = %context, user_id, level = %level, persist_now, "Permission level set");

        if persist_now {
            self.write_record(context, user_id, level).await?;
            self.backend.flush(context).await?;
        }
        Ok(())
    }

    async fn write_record(
        &self,
        context: &ContextId,
        user_id: UserId,
        level: PermissionLevel,
    ) -> Result<(), PermissionError> {
        let key = user_id.to_string();
        if level == self.default_level {
            self.backend.remove(context, &key).await?;
        } else {
            self.backend
                .write(context, &key, &level.to_string())
                .await?;
        }
        Ok(())
    }

    /// Persist every cached record of one context.
    pub async fn flush_context(&self, context: &ContextId) -> Result<(), PermissionError> {
        self.activate();
        let partition = match self.partitions.read().await.get(context) {
            Some(p) => p.clone(),
            None => return Ok(()),
        };
        let cache = partition.lock().await;
        // Sorted so the backend sees the same write order on every flush.
        let mut records: Vec<_> = cache.iter().map(|(u, l)| (*u, *l)).collect();
        records.sort_unstable();
        for (user_id, level) in records {
            self.write_record(context, user_id, level).await?;
        }
        self.backend.flush(context).await?;
        debug!(context = %context, records = cache.len(), "Flushed context permissions");
        Ok(())
    }

    /// Persist every cached record of every context. Intended for shutdown.
    ///
    /// Every context is attempted; the first failure is returned.
    pub async fn flush_all(&self) -> Result<(), PermissionError> {
        let mut first_error = None;
        for context in self.cached_contexts().await {
            if let Err(e) = self.flush_context(&context).await {
                error!(context = %context, error = %e, "Failed to flush permissions");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Contexts with at least one cached lookup or write, sorted.
    pub async fn cached_contexts(&self) -> Vec<ContextId> {
        let mut contexts: Vec<_> = self.partitions.read().await.keys().cloned().collect();
        contexts.sort();
        contexts
    }
}
