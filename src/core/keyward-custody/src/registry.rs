//! Keychain, space and key lookups.

use std::collections::BTreeSet;

use keyward_storage::{PageRequest, PageResponse, SeqCollection, StorageBackend};
use tracing::info;

use crate::error::CustodyError;
use crate::sign_method::SignMethod;
use crate::types::{FeeSchedule, Key, KeyType, Keychain, Space};

/// Read access to custody entities, plus seeding for genesis and tests.
pub struct Registry {
    keychains: SeqCollection<Keychain>,
    spaces: SeqCollection<Space>,
    keys: SeqCollection<Key>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Creates the registry under the `custody/` prefix.
    pub fn new() -> Self {
        Self {
            keychains: SeqCollection::new("keychain", "custody/keychains", |k: &mut Keychain, id| k.id = id),
            spaces: SeqCollection::new("space", "custody/spaces", |s: &mut Space, id| s.id = id),
            keys: SeqCollection::new("key", "custody/keys", |k: &mut Key, id| k.id = id),
        }
    }

    /// Loads a keychain.
    pub async fn get_keychain(&self, store: &dyn StorageBackend, id: u64) -> Result<Keychain, CustodyError> {
        self.keychains
            .get(store, id)
            .await?
            .ok_or_else(|| CustodyError::not_found(self.keychains.name(), id))
    }

    /// Loads a space.
    pub async fn get_space(&self, store: &dyn StorageBackend, id: u64) -> Result<Space, CustodyError> {
        self.spaces
            .get(store, id)
            .await?
            .ok_or_else(|| CustodyError::not_found(self.spaces.name(), id))
    }

    /// Loads a key.
    pub async fn get_key(&self, store: &dyn StorageBackend, id: u64) -> Result<Key, CustodyError> {
        self.keys
            .get(store, id)
            .await?
            .ok_or_else(|| CustodyError::not_found(self.keys.name(), id))
    }

    /// Passes `keychain` through if it accepts new requests.
    pub fn require_active(keychain: Keychain) -> Result<Keychain, CustodyError> {
        if !keychain.is_active {
            return Err(CustodyError::InactiveKeychain(keychain.id));
        }
        Ok(keychain)
    }

    /// Registers a keychain.
    pub async fn create_keychain(
        &self,
        store: &dyn StorageBackend,
        name: &str,
        admins: Vec<String>,
        fees: Option<FeeSchedule>,
    ) -> Result<u64, CustodyError> {
        let keychain = Keychain {
            id: 0,
            name: name.to_string(),
            admins,
            is_active: true,
            fees,
        };
        let id = self.keychains.append(store, keychain).await?;
        info!(keychain_id = id, name, "Keychain created");
        Ok(id)
    }

    /// Toggles whether a keychain accepts new requests.
    pub async fn set_keychain_active(
        &self,
        store: &dyn StorageBackend,
        id: u64,
        is_active: bool,
    ) -> Result<Keychain, CustodyError> {
        let mut keychain = self.get_keychain(store, id).await?;
        keychain.is_active = is_active;
        self.keychains.set(store, id, &keychain).await?;
        info!(keychain_id = id, is_active, "Keychain updated");
        Ok(keychain)
    }

    /// Creates a space.
    ///
    /// Owners must be distinct: approval thresholds count list entries.
    pub async fn create_space(
        &self,
        store: &dyn StorageBackend,
        owners: Vec<String>,
        sign_intent_id: u64,
    ) -> Result<u64, CustodyError> {
        validate_owners(&owners)?;
        let space = Space {
            id: 0,
            owners,
            sign_intent_id,
        };
        let id = self.spaces.append(store, space).await?;
        info!(space_id = id, "Space created");
        Ok(id)
    }

    /// Creates a key in an existing space and keychain.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_key(
        &self,
        store: &dyn StorageBackend,
        space_id: u64,
        keychain_id: u64,
        intent_id: u64,
        sign_method: SignMethod,
        key_type: KeyType,
        public_key: Vec<u8>,
    ) -> Result<u64, CustodyError> {
        self.get_space(store, space_id).await?;
        self.get_keychain(store, keychain_id).await?;
        let key = Key {
            id: 0,
            space_id,
            keychain_id,
            intent_id,
            sign_method,
            key_type,
            public_key,
        };
        let id = self.keys.append(store, key).await?;
        info!(key_id = id, space_id, keychain_id, %sign_method, "Key created");
        Ok(id)
    }

    /// Updates the intent overriding a key's space intent (0 clears it).
    pub async fn set_key_intent(&self, store: &dyn StorageBackend, id: u64, intent_id: u64) -> Result<Key, CustodyError> {
        let mut key = self.get_key(store, id).await?;
        key.intent_id = intent_id;
        self.keys.set(store, id, &key).await?;
        Ok(key)
    }

    /// Updates a space's signing intent (0 restores the generated default).
    pub async fn set_space_intent(
        &self,
        store: &dyn StorageBackend,
        id: u64,
        intent_id: u64,
    ) -> Result<Space, CustodyError> {
        let mut space = self.get_space(store, id).await?;
        space.sign_intent_id = intent_id;
        self.spaces.set(store, id, &space).await?;
        Ok(space)
    }

    /// Lists keychains in id order.
    pub async fn keychains(
        &self,
        store: &dyn StorageBackend,
        page: &PageRequest,
    ) -> Result<(Vec<Keychain>, PageResponse), CustodyError> {
        let keychains = self.keychains.iter(store).await?.into_iter().map(|(_, k)| k).collect();
        Ok(page.apply(keychains))
    }

    /// Lists spaces, optionally only those `owner` belongs to.
    pub async fn spaces(
        &self,
        store: &dyn StorageBackend,
        owner: Option<&str>,
        page: &PageRequest,
    ) -> Result<(Vec<Space>, PageResponse), CustodyError> {
        let spaces = self
            .spaces
            .iter(store)
            .await?
            .into_iter()
            .map(|(_, s)| s)
            .filter(|s| owner.map_or(true, |o| s.owners.iter().any(|x| x == o)))
            .collect();
        Ok(page.apply(spaces))
    }

    /// Lists keys, optionally only those of one space.
    pub async fn keys(
        &self,
        store: &dyn StorageBackend,
        space_id: Option<u64>,
        page: &PageRequest,
    ) -> Result<(Vec<Key>, PageResponse), CustodyError> {
        let keys = self
            .keys
            .iter(store)
            .await?
            .into_iter()
            .map(|(_, k)| k)
            .filter(|k| space_id.map_or(true, |id| k.space_id == id))
            .collect();
        Ok(page.apply(keys))
    }
}

fn validate_owners(owners: &[String]) -> Result<(), CustodyError> {
    if owners.is_empty() {
        return Err(CustodyError::InvalidRequest("space needs at least one owner".into()));
    }
    let mut seen = BTreeSet::new();
    for owner in owners {
        if owner.is_empty() {
            return Err(CustodyError::InvalidRequest("space owner must not be empty".into()));
        }
        if !seen.insert(owner.as_str()) {
            return Err(CustodyError::InvalidRequest(format!("duplicate space owner {owner}")));
        }
    }
    Ok(())
}
