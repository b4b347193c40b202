//! Named intents and their registry.

use keyward_storage::{SeqCollection, StorageBackend};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::env::BindingEnv;
use crate::error::IntentError;
use crate::eval::evaluate_bool;
use crate::expr::Expr;
use crate::parser::parse;

/// High bit marking an intent id that was generated rather than stored.
///
/// Stored intents are numbered from 1 by a sequence and never reach this bit.
pub const GENERATED_INTENT_ID_FLAG: u64 = 1 << 63;

/// Id of the intent generated for a given scope (e.g. a space id).
pub fn generated_intent_id(scope_id: u64) -> u64 {
    GENERATED_INTENT_ID_FLAG | scope_id
}

/// A named approval policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    /// Stored id, or a generated id with [`GENERATED_INTENT_ID_FLAG`] set.
    pub id: u64,
    /// Human readable name.
    pub name: String,
    /// Parsed expression.
    pub expression: Expr,
}

impl Intent {
    /// Parses `definition` into a new, not yet stored intent.
    pub fn new(name: impl Into<String>, definition: &str) -> Result<Self, IntentError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(IntentError::InvalidInput("intent name must not be empty".into()));
        }
        Ok(Self {
            id: 0,
            name,
            expression: parse(definition)?,
        })
    }

    /// Builds a generated intent for `scope_id`.
    pub fn generated(scope_id: u64, name: impl Into<String>, expression: Expr) -> Self {
        Self {
            id: generated_intent_id(scope_id),
            name: name.into(),
            expression,
        }
    }

    /// Whether this intent was generated instead of stored.
    pub fn is_generated(&self) -> bool {
        self.id & GENERATED_INTENT_ID_FLAG != 0
    }

    /// Canonical source text of the expression.
    pub fn definition(&self) -> String {
        self.expression.to_string()
    }

    /// Evaluates the intent. A non-boolean result is an error.
    pub fn evaluate(&self, env: &BindingEnv) -> Result<bool, IntentError> {
        evaluate_bool(&self.expression, env)
    }

    /// Copy of this intent with every identifier bound in `env` replaced by its value.
    pub fn bind(&self, env: &BindingEnv) -> Intent {
        Intent {
            id: self.id,
            name: self.name.clone(),
            expression: self.expression.substitute(env),
        }
    }
}

/// Persistent intent registry.
pub struct IntentStore {
    intents: SeqCollection<Intent>,
}

impl Default for IntentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentStore {
    /// Creates the registry under the `intent/intents` prefix.
    pub fn new() -> Self {
        Self {
            intents: SeqCollection::new("intent", "intent/intents", |i: &mut Intent, id| i.id = id),
        }
    }

    /// Parses and stores a new intent, returning its id.
    pub async fn create(
        &self,
        store: &dyn StorageBackend,
        name: &str,
        definition: &str,
    ) -> Result<u64, IntentError> {
        let intent = Intent::new(name, definition)?;
        let id = self.intents.append(store, intent).await?;
        debug!(id, name, "Intent created");
        Ok(id)
    }

    /// Loads a stored intent.
    pub async fn get(&self, store: &dyn StorageBackend, id: u64) -> Result<Intent, IntentError> {
        self.intents
            .get(store, id)
            .await?
            .ok_or(IntentError::IntentNotFound(id))
    }

    /// All stored intents in id order.
    pub async fn list(&self, store: &dyn StorageBackend) -> Result<Vec<Intent>, IntentError> {
        Ok(self.intents.iter(store).await?.into_iter().map(|(_, i)| i).collect())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use keyward_storage::MemoryBackend;

    use super::*;
    use crate::expr::Value;

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryBackend::new();
        let intents = IntentStore::new();

        let id = intents
            .create(&store, "two-of-three", "any(2, space.owners)")
            .await
            .unwrap();
        assert_eq!(id, 1);

        let intent = intents.get(&store, id).await.unwrap();
        assert_eq!(intent.name, "two-of-three");
        assert_eq!(intent.definition(), "any(2, space.owners)");
        assert!(!intent.is_generated());
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = MemoryBackend::new();
        let err = IntentStore::new().get(&store, 42).await.unwrap_err();
        assert!(matches!(err, IntentError::IntentNotFound(42)));
    }

    #[tokio::test]
    async fn test_invalid_definition_not_stored() {
        let store = MemoryBackend::new();
        let intents = IntentStore::new();
        assert!(intents.create(&store, "bad", "any(").await.is_err());
        assert!(intents.create(&store, " ", "true").await.is_err());
        assert!(intents.list(&store).await.unwrap().is_empty());
    }

    #[test]
    fn test_generated_ids_never_collide_with_stored() {
        let intent = Intent::generated(5, "space-5-default-sign", parse("true").unwrap());
        assert!(intent.is_generated());
        assert_eq!(intent.id, GENERATED_INTENT_ID_FLAG | 5);
        assert_ne!(generated_intent_id(0), 0);
    }

    #[test]
    fn test_bind_then_evaluate() {
        let intent = Intent::new("owners", "any(1, space.owners)").unwrap();
        let env = BindingEnv::new().with_attribute("space.owners", Value::str_list(["alice"]));
        let bound = intent.bind(&env);
        assert_eq!(bound.definition(), r#"any(1, ["alice"])"#);

        let approved = BindingEnv::new().with_attribute("approvers", Value::str_list(["alice"]));
        assert!(bound.evaluate(&approved).unwrap());
        assert!(!bound.evaluate(&BindingEnv::new()).unwrap());
    }
}
