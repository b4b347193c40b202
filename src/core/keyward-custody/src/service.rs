//! Custody entry points and queries.

use std::sync::Arc;

use keyward_intent::{ActionFilter, ActionGate, BindingEnv, GateConfig, HandlerTable, IntentStore, Value};
use keyward_storage::{PageRequest, PageResponse, SeqCollection, StorageBackend};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::analyzer::{AnalyzerRunner, AnalyzerSandbox};
use crate::bank::LedgerBank;
use crate::error::CustodyError;
use crate::executor::{sign_request_collection, SignRequestExecutor};
use crate::message::{CustodyAction, CustodyMessage, MessageKind, MsgNewSignatureRequest};
use crate::params::Params;
use crate::registry::Registry;
use crate::resolver::IntentResolver;
use crate::types::{SignRequest, SignRequestStatus};

/// Action gate specialised to custody messages.
pub type CustodyGate = ActionGate<CustodyMessage, CustodyError>;

/// Criteria for listing sign requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignRequestFilter {
    /// Only requests signed by this keychain.
    #[serde(default)]
    pub keychain_id: Option<u64>,
    /// Only requests in this state.
    #[serde(default)]
    pub status: Option<SignRequestStatus>,
}

impl SignRequestFilter {
    fn matches(&self, req: &SignRequest) -> bool {
        self.keychain_id.map_or(true, |k| req.keychain_id == k) && self.status.map_or(true, |s| req.status == s)
    }
}

fn id_value(id: u64) -> Result<Value, CustodyError> {
    i64::try_from(id)
        .map(Value::Int)
        .map_err(|_| CustodyError::InvalidRequest(format!("id {id} exceeds the intent integer range")))
}

/// The custody module.
pub struct CustodyService {
    params: Params,
    registry: Registry,
    intents: IntentStore,
    bank: Arc<LedgerBank>,
    sandbox: Arc<dyn AnalyzerSandbox>,
    gate: CustodyGate,
    sign_requests: SeqCollection<SignRequest>,
}

impl CustodyService {
    /// Wires the module. The handler table is built here, once.
    pub fn new(params: Params, sandbox: Arc<dyn AnalyzerSandbox>, bank: Arc<LedgerBank>) -> Self {
        let executor = SignRequestExecutor::new(bank.clone(), params.fee_denom.clone());
        let handlers = HandlerTable::new().register(MessageKind::NewSignatureRequest, Arc::new(executor));
        let gate = ActionGate::new(
            "custody",
            Arc::new(handlers),
            GateConfig {
                default_btl: params.default_btl,
                authority: params.authority.clone(),
            },
        );

        Self {
            params,
            registry: Registry::new(),
            intents: IntentStore::new(),
            bank,
            sandbox,
            gate,
            sign_requests: sign_request_collection(),
        }
    }

    /// Module parameters.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Entity registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Intent registry.
    pub fn intents(&self) -> &IntentStore {
        &self.intents
    }

    /// Balance ledger.
    pub fn bank(&self) -> &LedgerBank {
        &self.bank
    }

    /// Proposes a signature request.
    ///
    /// Resolves the key, space and active keychain, picks the governing
    /// intent, runs the requested analyzers and submits the request to the
    /// gate. The action executes immediately when the intent already holds
    /// with the creator as sole approver.
    pub async fn new_signature_request(
        &self,
        store: &dyn StorageBackend,
        mut msg: MsgNewSignatureRequest,
        height: u64,
    ) -> Result<CustodyAction, CustodyError> {
        if msg.creator.is_empty() {
            return Err(CustodyError::InvalidRequest("creator must not be empty".into()));
        }

        let key = self.registry.get_key(store, msg.key_id).await?;
        let space = self.registry.get_space(store, key.space_id).await?;
        let keychain = self.registry.get_keychain(store, key.keychain_id).await?;
        let keychain = Registry::require_active(keychain).inspect_err(|_| {
            warn!(key_id = key.id, keychain_id = key.keychain_id, "Request for inactive keychain");
        })?;

        let intent = IntentResolver::new(&self.intents).resolve(store, &key, &space).await?;

        let analyzed = AnalyzerRunner::new(self.sandbox.as_ref())
            .execute(&msg.creator, &msg.analyzers, &msg.input)
            .await?;
        if let Some(data) = analyzed.data_for_signing {
            msg.input = data;
        }

        let mut env: BindingEnv = analyzed.env;
        env.set_attribute("creator", msg.creator.as_str());
        env.set_attribute("key.id", id_value(key.id)?);
        env.set_attribute("keychain.id", id_value(keychain.id)?);
        env.set_attribute("space.id", id_value(space.id)?);
        env.set_attribute("space.owners", Value::str_list(space.owners.iter().cloned()));

        let creator = msg.creator.clone();
        let btl = msg.btl;
        let action = self
            .gate
            .submit(
                store,
                &creator,
                CustodyMessage::NewSignatureRequest(msg),
                &intent,
                &env,
                btl,
                height,
            )
            .await?;
        let action = self.gate.try_execute(store, action.id, height).await?;

        info!(
            action_id = action.id,
            key_id = key.id,
            status = %action.status,
            "Signature request proposed"
        );
        Ok(action)
    }

    /// Adds an approval; executes the action if that satisfies its intent.
    pub async fn approve_action(
        &self,
        store: &dyn StorageBackend,
        id: u64,
        approver: &str,
        height: u64,
    ) -> Result<CustodyAction, CustodyError> {
        self.gate.approve(store, id, approver, height).await
    }

    /// Rejects a pending action.
    pub async fn reject_action(
        &self,
        store: &dyn StorageBackend,
        id: u64,
        caller: &str,
        reason: Option<String>,
    ) -> Result<CustodyAction, CustodyError> {
        Ok(self.gate.reject(store, id, caller, reason).await?)
    }

    /// Block-end hook: expires pending actions past their timeout.
    pub async fn end_block(&self, store: &dyn StorageBackend, height: u64) -> Result<Vec<u64>, CustodyError> {
        Ok(self.gate.end_block(store, height).await?)
    }

    /// Loads an action.
    pub async fn action_by_id(&self, store: &dyn StorageBackend, id: u64) -> Result<CustodyAction, CustodyError> {
        Ok(self.gate.get(store, id).await?)
    }

    /// Lists actions.
    pub async fn actions(
        &self,
        store: &dyn StorageBackend,
        filter: &ActionFilter,
        page: &PageRequest,
    ) -> Result<(Vec<CustodyAction>, PageResponse), CustodyError> {
        Ok(self.gate.list(store, filter, page).await?)
    }

    /// Loads a sign request.
    pub async fn sign_request_by_id(&self, store: &dyn StorageBackend, id: u64) -> Result<SignRequest, CustodyError> {
        self.sign_requests
            .get(store, id)
            .await?
            .ok_or_else(|| CustodyError::not_found(self.sign_requests.name(), id))
    }

    /// Lists sign requests in ascending id order.
    pub async fn sign_requests(
        &self,
        store: &dyn StorageBackend,
        filter: &SignRequestFilter,
        page: &PageRequest,
    ) -> Result<(Vec<SignRequest>, PageResponse), CustodyError> {
        let matching = self
            .sign_requests
            .iter(store)
            .await?
            .into_iter()
            .map(|(_, r)| r)
            .filter(|r| filter.matches(r))
            .collect();
        Ok(page.apply(matching))
    }

    /// Balance of `account`; `denom` defaults to the fee denomination.
    pub async fn balance(
        &self,
        store: &dyn StorageBackend,
        account: &str,
        denom: Option<&str>,
    ) -> Result<u64, CustodyError> {
        let denom = denom.unwrap_or(self.params.fee_denom.as_str());
        self.bank.balance(store, account, denom).await
    }
}
