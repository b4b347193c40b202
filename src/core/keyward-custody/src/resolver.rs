//! Chooses the intent governing a signature request.

use keyward_intent::{Intent, IntentError, IntentStore};
use keyward_storage::StorageBackend;
use tracing::debug;

use crate::error::CustodyError;
use crate::types::{Key, Space};

/// Resolves signing intents. Precedence: the key's intent, then the space's,
/// then the space's generated default. Exactly one is returned.
pub struct IntentResolver<'a> {
    intents: &'a IntentStore,
}

impl<'a> IntentResolver<'a> {
    /// Creates a resolver backed by `intents`.
    pub fn new(intents: &'a IntentStore) -> Self {
        Self { intents }
    }

    /// Intent governing signature requests for `key` in `space`.
    pub async fn resolve(&self, store: &dyn StorageBackend, key: &Key, space: &Space) -> Result<Intent, CustodyError> {
        let intent = if key.intent_id > 0 {
            self.load(store, key.intent_id).await?
        } else if space.sign_intent_id > 0 {
            self.load(store, space.sign_intent_id).await?
        } else {
            space.default_sign_intent()
        };
        debug!(key_id = key.id, intent_id = intent.id, intent = %intent.name, "Intent resolved");
        Ok(intent)
    }

    async fn load(&self, store: &dyn StorageBackend, id: u64) -> Result<Intent, CustodyError> {
        self.intents.get(store, id).await.map_err(|e| match e {
            IntentError::IntentNotFound(id) => CustodyError::not_found("intent", id),
            other => other.into(),
        })
    }
}
