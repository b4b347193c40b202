//! Execution of approved signature requests.

use std::sync::Arc;

use async_trait::async_trait;
use keyward_intent::{Action, ActionHandler};
use keyward_storage::{SeqCollection, StorageBackend};
use tracing::{debug, info};

use crate::bank::{Coin, FundsTransfer};
use crate::error::CustodyError;
use crate::message::{CustodyMessage, CustodyResponse, MsgNewSignatureRequest};
use crate::registry::Registry;
use crate::sign_method::{Metadata, SignMethod};
use crate::types::{SignRequest, SignRequestStatus};

pub(crate) fn sign_request_collection() -> SeqCollection<SignRequest> {
    SeqCollection::new("sign request", "custody/sign_requests", |r: &mut SignRequest, id| r.id = id)
}

/// Handler for [`CustodyMessage::NewSignatureRequest`] actions.
///
/// Runs inside the unit that made the action ready; any error discards the
/// fee transfer together with everything else.
pub struct SignRequestExecutor {
    registry: Registry,
    bank: Arc<dyn FundsTransfer>,
    sign_requests: SeqCollection<SignRequest>,
    fee_denom: String,
}

impl SignRequestExecutor {
    /// Creates an executor charging fees in `fee_denom` through `bank`.
    pub fn new(bank: Arc<dyn FundsTransfer>, fee_denom: impl Into<String>) -> Self {
        Self {
            registry: Registry::new(),
            bank,
            sign_requests: sign_request_collection(),
            fee_denom: fee_denom.into(),
        }
    }

    /// Charges the fee, derives the data for signing and appends the sign request.
    pub async fn execute(&self, store: &dyn StorageBackend, msg: &MsgNewSignatureRequest) -> Result<u64, CustodyError> {
        // State may have changed since the request was proposed.
        let key = self.registry.get_key(store, msg.key_id).await?;
        self.registry.get_space(store, key.space_id).await?;
        let keychain = Registry::require_active(self.registry.get_keychain(store, key.keychain_id).await?)?;

        if let Some(fees) = &keychain.fees {
            let coin = Coin::new(&self.fee_denom, fees.signature_request_fee);
            self.bank
                .send(store, &msg.creator, &keychain.address().to_string(), &coin)
                .await?;
            debug!(keychain_id = keychain.id, fee = coin.amount, "Signature fee charged");
        }

        if key.sign_method == SignMethod::Unspecified {
            return Err(CustodyError::UnknownSignMethod(key.sign_method.to_string()));
        }
        debug!(key_id = key.id, sign_method = %key.sign_method, "Parser selected");

        let metadata = Metadata::unpack(msg.metadata.as_ref())?;
        let data_for_signing = key.sign_method.parse(&msg.input, &metadata)?;

        let request = SignRequest {
            id: 0,
            creator: msg.creator.clone(),
            key_id: key.id,
            keychain_id: keychain.id,
            data_for_signing,
            status: SignRequestStatus::Pending,
        };
        let id = self.sign_requests.append(store, request).await?;
        info!(sign_request_id = id, key_id = key.id, creator = %msg.creator, "Sign request created");
        Ok(id)
    }
}

#[async_trait]
impl ActionHandler<CustodyMessage, CustodyError> for SignRequestExecutor {
    async fn handle(
        &self,
        store: &dyn StorageBackend,
        action: &Action<CustodyMessage>,
    ) -> Result<CustodyResponse, CustodyError> {
        match &action.payload {
            CustodyMessage::NewSignatureRequest(msg) => {
                let sign_request_id = self.execute(store, msg).await?;
                Ok(CustodyResponse::NewSignatureRequest { sign_request_id })
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use keyward_storage::MemoryBackend;

    use super::*;
    use crate::bank::LedgerBank;
    use crate::sign_method::{MetadataEthereum, PackedMetadata};
    use crate::types::{FeeSchedule, KeyType};

    struct Fixture {
        store: MemoryBackend,
        registry: Registry,
        bank: Arc<LedgerBank>,
        executor: SignRequestExecutor,
    }

    async fn fixture(fee: Option<u64>, method: SignMethod) -> (Fixture, u64) {
        let store = MemoryBackend::new();
        let registry = Registry::new();
        let bank = Arc::new(LedgerBank::new());
        let kc = registry
            .create_keychain(
                &store,
                "kc",
                vec![],
                fee.map(|f| FeeSchedule {
                    signature_request_fee: f,
                }),
            )
            .await
            .unwrap();
        let space = registry.create_space(&store, vec!["alice".into()], 0).await.unwrap();
        let key = registry
            .create_key(&store, space, kc, 0, method, KeyType::EcdsaSecp256k1, vec![])
            .await
            .unwrap();
        let executor = SignRequestExecutor::new(bank.clone(), "uward");
        (
            Fixture {
                store,
                registry,
                bank,
                executor,
            },
            key,
        )
    }

    fn request(key_id: u64, input: &[u8]) -> MsgNewSignatureRequest {
        MsgNewSignatureRequest {
            creator: "alice".into(),
            key_id,
            analyzers: vec![],
            input: input.to_vec(),
            metadata: None,
            btl: 0,
        }
    }

    #[tokio::test]
    async fn test_black_box_request() {
        let (f, key) = fixture(None, SignMethod::BlackBox).await;
        let id = f.executor.execute(&f.store, &request(key, b"payload")).await.unwrap();
        assert_eq!(id, 1);

        let req = sign_request_collection().get(&f.store, id).await.unwrap().unwrap();
        assert_eq!(req.data_for_signing, b"payload".to_vec());
        assert_eq!(req.status, SignRequestStatus::Pending);
        assert_eq!(req.key_id, key);
    }

    #[tokio::test]
    async fn test_fee_goes_to_keychain_address() {
        let (f, key) = fixture(Some(10), SignMethod::BlackBox).await;
        f.bank.mint(&f.store, "alice", &Coin::new("uward", 25)).await.unwrap();
        f.executor.execute(&f.store, &request(key, b"x")).await.unwrap();

        let keychain = f.registry.get_keychain(&f.store, 1).await.unwrap();
        assert_eq!(f.bank.balance(&f.store, "alice", "uward").await.unwrap(), 15);
        assert_eq!(
            f.bank
                .balance(&f.store, &keychain.address().to_string(), "uward")
                .await
                .unwrap(),
            10
        );
    }

    #[tokio::test]
    async fn test_inactive_keychain_rechecked() {
        let (f, key) = fixture(None, SignMethod::BlackBox).await;
        f.registry.set_keychain_active(&f.store, 1, false).await.unwrap();
        let err = f.executor.execute(&f.store, &request(key, b"x")).await.unwrap_err();
        assert!(matches!(err, CustodyError::InactiveKeychain(1)));
    }

    #[tokio::test]
    async fn test_ethereum_requires_metadata() {
        let (f, key) = fixture(None, SignMethod::Ethereum).await;
        let input =
            hex::decode("ec098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a764000080018080")
                .unwrap();

        let err = f.executor.execute(&f.store, &request(key, &input)).await.unwrap_err();
        assert!(matches!(err, CustodyError::TransferParse(_)));

        let mut msg = request(key, &input);
        msg.metadata = Metadata::Ethereum(MetadataEthereum { chain_id: 1 }).pack();
        f.executor.execute(&f.store, &msg).await.unwrap();

        msg.metadata = Some(PackedMetadata {
            type_url: "/unknown".into(),
            value: serde_json::Value::Null,
        });
        let err = f.executor.execute(&f.store, &msg).await.unwrap_err();
        assert!(matches!(err, CustodyError::MetadataUnpack(_)));
    }

    #[tokio::test]
    async fn test_unspecified_sign_method() {
        let (f, key) = fixture(None, SignMethod::Unspecified).await;
        let err = f.executor.execute(&f.store, &request(key, b"x")).await.unwrap_err();
        assert!(matches!(err, CustodyError::UnknownSignMethod(_)));
    }
}
