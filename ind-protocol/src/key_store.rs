//! Per-guid index of which [`GroupKey`] encrypts which field group.

use crate::{
    crypto::{GroupKey, KeyId},
    infrastructure::logging,
    types::Guid,
    IndError,
};

use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use tracing::{info, instrument};

/// One key of a trade and the group it encrypts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBinding {
    pub key_id: KeyId,
    pub group_name: String,
    pub key: GroupKey,
}

/// Store of group keys, partitioned by trade guid.
///
/// A `(guid, key_id)` pair is bound at most once. Binding a new key id to a
/// group that already has one rotates the group: the new key becomes the
/// group's current key and the old one stays resolvable by id.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Bind `key` under `key_id` to `group_name`. Repeating an identical
    /// binding is a no-op; binding the id to another group or another key is
    /// a [`IndError::KeyBindingConflict`].
    async fn bind(
        &self,
        guid: &Guid,
        key_id: KeyId,
        group_name: &str,
        key: GroupKey,
    ) -> Result<(), IndError>;

    /// The key bound under `key_id`, or [`IndError::KeyNotFound`].
    async fn lookup(&self, guid: &Guid, key_id: &KeyId) -> Result<GroupKey, IndError>;

    /// The current key of `group_name`, or [`IndError::GroupKeyNotFound`].
    async fn current_for_group(
        &self,
        guid: &Guid,
        group_name: &str,
    ) -> Result<(KeyId, GroupKey), IndError>;

    /// Names of the groups that have a key for `guid`, in first-bound order.
    async fn groups_for(&self, guid: &Guid) -> Vec<String>;

    /// Every binding of `guid`, in bind order.
    async fn bindings(&self, guid: &Guid) -> Vec<KeyBinding>;

    /// Drop every key of `guid`. Returns whether the guid had any key.
    async fn forget(&self, guid: &Guid) -> bool;
}

#[derive(Debug, Default)]
struct GuidKeys {
    bindings: Vec<KeyBinding>,
    /// Group name to the id of its current key.
    current: HashMap<String, KeyId>,
    /// Set by `forget` once the entry left the map. Binds into a closed entry
    /// would be lost, so they start over with a fresh one.
    closed: bool,
}

impl GuidKeys {
    fn find(&self, key_id: &KeyId) -> Option<&KeyBinding> {
        self.bindings.iter().find(|binding| &binding.key_id == key_id)
    }
}

/// [`KeyStore`] held in process memory. Keys are zeroized when they are
/// forgotten or when the store is dropped.
///
/// Each guid has its own lock: `bind` and `forget` take it exclusively, the
/// reads share it. Different guids never contend beyond the brief access to
/// the outer map.
#[derive(Debug, Default)]
pub struct InMemoryKeyStore {
    trades: RwLock<HashMap<Guid, Arc<RwLock<GuidKeys>>>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn existing(&self, guid: &Guid) -> Option<Arc<RwLock<GuidKeys>>> {
        self.trades.read().await.get(guid).cloned()
    }

    async fn existing_or_new(&self, guid: &Guid) -> Arc<RwLock<GuidKeys>> {
        if let Some(keys) = self.existing(guid).await {
            return keys;
        }
        self.trades
            .write()
            .await
            .entry(guid.clone())
            .or_default()
            .clone()
    }
}

#[async_trait]
impl KeyStore for InMemoryKeyStore {
    #[instrument(skip_all, err(Debug), fields(guid, key_id = %key_id, group_name))]
    async fn bind(
        &self,
        guid: &Guid,
        key_id: KeyId,
        group_name: &str,
        key: GroupKey,
    ) -> Result<(), IndError> {
        logging::record_field("guid", guid);
        logging::record_field("group_name", &group_name);

        let mut keys = loop {
            let keys = self.existing_or_new(guid).await;
            let keys = keys.write_owned().await;
            if !keys.closed {
                break keys;
            }
        };

        if let Some(bound) = keys.find(&key_id) {
            if bound.group_name == group_name && bound.key == key {
                return Ok(());
            }
            return Err(IndError::KeyBindingConflict {
                guid: guid.to_string(),
                key_id,
                bound_group: bound.group_name.clone(),
                requested_group: group_name.to_string(),
            });
        }

        if let Some(previous) = keys.current.insert(group_name.to_string(), key_id.clone()) {
            info!("Rotated group key, replacing {}", previous);
        }
        keys.bindings.push(KeyBinding {
            key_id,
            group_name: group_name.to_string(),
            key,
        });
        info!("Bound group key");
        Ok(())
    }

    async fn lookup(&self, guid: &Guid, key_id: &KeyId) -> Result<GroupKey, IndError> {
        let not_found = || IndError::KeyNotFound {
            guid: guid.to_string(),
            key_id: key_id.clone(),
        };
        let keys = self.existing(guid).await.ok_or_else(not_found)?;
        let keys = keys.read().await;
        keys.find(key_id)
            .map(|binding| binding.key.clone())
            .ok_or_else(not_found)
    }

    async fn current_for_group(
        &self,
        guid: &Guid,
        group_name: &str,
    ) -> Result<(KeyId, GroupKey), IndError> {
        let not_found = || IndError::GroupKeyNotFound {
            guid: guid.to_string(),
            group_name: group_name.to_string(),
        };
        let keys = self.existing(guid).await.ok_or_else(not_found)?;
        let keys = keys.read().await;
        keys.current
            .get(group_name)
            .and_then(|key_id| keys.find(key_id))
            .map(|binding| (binding.key_id.clone(), binding.key.clone()))
            .ok_or_else(not_found)
    }

    async fn groups_for(&self, guid: &Guid) -> Vec<String> {
        let Some(keys) = self.existing(guid).await else {
            return Vec::new();
        };
        let keys = keys.read().await;
        let mut groups: Vec<String> = Vec::new();
        for binding in &keys.bindings {
            if !groups.contains(&binding.group_name) {
                groups.push(binding.group_name.clone());
            }
        }
        groups
    }

    async fn bindings(&self, guid: &Guid) -> Vec<KeyBinding> {
        match self.existing(guid).await {
            Some(keys) => keys.read().await.bindings.clone(),
            None => Vec::new(),
        }
    }

    #[instrument(skip_all, fields(guid))]
    async fn forget(&self, guid: &Guid) -> bool {
        logging::record_field("guid", guid);

        let Some(keys) = self.trades.write().await.remove(guid) else {
            return false;
        };
        // Readers may still hold the per-guid lock; clearing under the write
        // lock drops the keys as soon as they are done.
        let mut keys = keys.write().await;
        keys.closed = true;
        keys.current.clear();
        let had_keys = !keys.bindings.is_empty();
        keys.bindings.clear();
        info!("Forgot every key of the trade");
        had_keys
    }
}
