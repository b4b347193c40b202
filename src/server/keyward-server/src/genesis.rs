//! Initial ledger state.
//!
//! Entities reference each other by the ids the registry will assign, which
//! follow list order starting at 1.

use std::path::Path;

use anyhow::Context;
use keyward_custody::{Coin, CustodyService, FeeSchedule, KeyType, SignMethod};
use keyward_storage::{BufferedBackend, StorageBackend};
use serde::{Deserialize, Serialize};
use tracing::info;

const GENESIS_MARKER: &str = "node/genesis";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisKeychain {
    pub name: String,
    #[serde(default)]
    pub admins: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub fees: Option<FeeSchedule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisIntent {
    pub name: String,
    pub definition: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisSpace {
    pub owners: Vec<String>,
    /// 0 selects the generated default intent.
    #[serde(default)]
    pub sign_intent_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisKey {
    pub space_id: u64,
    pub keychain_id: u64,
    #[serde(default)]
    pub intent_id: u64,
    pub sign_method: SignMethod,
    pub key_type: KeyType,
    /// Hex-encoded public key.
    pub public_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisBalance {
    pub account: String,
    pub denom: String,
    pub amount: u64,
}

/// Genesis document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Genesis {
    pub keychains: Vec<GenesisKeychain>,
    pub intents: Vec<GenesisIntent>,
    pub spaces: Vec<GenesisSpace>,
    pub keys: Vec<GenesisKey>,
    pub balances: Vec<GenesisBalance>,
}

fn default_true() -> bool {
    true
}

impl Genesis {
    /// Reads a JSON genesis file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("failed to read genesis {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("invalid genesis {}", path.display()))
    }

    /// Demo state for `--dev`: one fee-charging keychain, a space owned by
    /// `alice` with a black-box key and an Ethereum key, and funds for `alice`.
    pub fn dev(fee_denom: &str) -> Self {
        Self {
            keychains: vec![GenesisKeychain {
                name: "dev-keychain".to_string(),
                admins: vec!["keychain-admin".to_string()],
                is_active: true,
                fees: Some(FeeSchedule {
                    signature_request_fee: 10,
                }),
            }],
            intents: Vec::new(),
            spaces: vec![GenesisSpace {
                owners: vec!["alice".to_string()],
                sign_intent_id: 0,
            }],
            keys: vec![
                GenesisKey {
                    space_id: 1,
                    keychain_id: 1,
                    intent_id: 0,
                    sign_method: SignMethod::BlackBox,
                    key_type: KeyType::EddsaEd25519,
                    public_key: "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a".to_string(),
                },
                GenesisKey {
                    space_id: 1,
                    keychain_id: 1,
                    intent_id: 0,
                    sign_method: SignMethod::Ethereum,
                    key_type: KeyType::EcdsaSecp256k1,
                    public_key: "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798".to_string(),
                },
            ],
            balances: vec![GenesisBalance {
                account: "alice".to_string(),
                denom: fee_denom.to_string(),
                amount: 1000,
            }],
        }
    }

    /// Applies the document once; later starts find the marker and skip it.
    ///
    /// Returns whether anything was written.
    pub async fn apply_once(&self, service: &CustodyService, backend: &dyn StorageBackend) -> anyhow::Result<bool> {
        if backend.exists(GENESIS_MARKER).await? {
            info!("Genesis already applied");
            return Ok(false);
        }

        let unit = BufferedBackend::new(backend);
        self.apply(service, &unit).await?;
        unit.put(GENESIS_MARKER, b"1").await?;
        let writes = unit.commit().await?;

        info!(
            keychains = self.keychains.len(),
            spaces = self.spaces.len(),
            keys = self.keys.len(),
            writes,
            "Genesis applied"
        );
        Ok(true)
    }

    async fn apply(&self, service: &CustodyService, store: &dyn StorageBackend) -> anyhow::Result<()> {
        let registry = service.registry();

        for keychain in &self.keychains {
            let id = registry
                .create_keychain(store, &keychain.name, keychain.admins.clone(), keychain.fees.clone())
                .await?;
            if !keychain.is_active {
                registry.set_keychain_active(store, id, false).await?;
            }
        }

        for intent in &self.intents {
            service
                .intents()
                .create(store, &intent.name, &intent.definition)
                .await
                .with_context(|| format!("intent {:?}", intent.name))?;
        }

        for space in &self.spaces {
            registry.create_space(store, space.owners.clone(), space.sign_intent_id).await?;
        }

        for key in &self.keys {
            let public_key = hex::decode(&key.public_key).context("public_key must be hex")?;
            registry
                .create_key(
                    store,
                    key.space_id,
                    key.keychain_id,
                    key.intent_id,
                    key.sign_method,
                    key.key_type,
                    public_key,
                )
                .await?;
        }

        for balance in &self.balances {
            service
                .bank()
                .mint(store, &balance.account, &Coin::new(balance.denom.as_str(), balance.amount))
                .await?;
        }

        Ok(())
    }
}
