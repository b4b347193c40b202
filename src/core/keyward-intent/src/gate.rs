//! The action gate.
//!
//! Every mutating operation takes the unit store it runs in. If a handler
//! fails, the error propagates and the caller discards the unit, so neither
//! the handler's writes nor the gate's own bookkeeping persist.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use keyward_storage::{IdSet, PageRequest, PageResponse, SeqCollection, StorageBackend};
use tracing::{debug, info};

use crate::action::{Action, ActionFilter, ActionPayload, ActionStatus};
use crate::env::{BindingEnv, APPROVERS};
use crate::error::IntentError;
use crate::expr::Value;
use crate::intent::Intent;

/// Executes actions of one payload kind once they are ready.
#[async_trait]
pub trait ActionHandler<P: ActionPayload, E>: Send + Sync {
    /// Runs the wrapped payload. Called at most once per action.
    async fn handle(&self, store: &dyn StorageBackend, action: &Action<P>) -> Result<P::Output, E>;
}

/// Handlers keyed by payload kind. Built once at startup.
pub struct HandlerTable<P: ActionPayload, E> {
    handlers: HashMap<P::Kind, Arc<dyn ActionHandler<P, E>>>,
}

impl<P: ActionPayload, E> Default for HandlerTable<P, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: ActionPayload, E> HandlerTable<P, E> {
    /// Empty table.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers `handler` for `kind`, replacing any previous one.
    pub fn register(mut self, kind: P::Kind, handler: Arc<dyn ActionHandler<P, E>>) -> Self {
        if self.handlers.insert(kind, handler).is_some() {
            debug!(?kind, "Replaced action handler");
        }
        self
    }

    /// Handler for `kind`.
    pub fn get(&self, kind: P::Kind) -> Option<&Arc<dyn ActionHandler<P, E>>> {
        self.handlers.get(&kind)
    }

    /// Number of registered kinds.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Gate settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateConfig {
    /// Blocks-to-live used when a submission passes 0.
    pub default_btl: u64,
    /// Address allowed to reject any action besides its creator.
    pub authority: Option<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            default_btl: 1000,
            authority: None,
        }
    }
}

/// Stores actions and runs them once their intent is satisfied.
pub struct ActionGate<P: ActionPayload, E> {
    prefix: String,
    actions: SeqCollection<Action<P>>,
    pending: IdSet,
    handlers: Arc<HandlerTable<P, E>>,
    config: GateConfig,
}

impl<P, E> ActionGate<P, E>
where
    P: ActionPayload,
    E: From<IntentError> + Send + 'static,
{
    /// Creates a gate whose records live under `prefix`.
    pub fn new(prefix: &str, handlers: Arc<HandlerTable<P, E>>, config: GateConfig) -> Self {
        Self {
            prefix: prefix.to_string(),
            actions: SeqCollection::new("action", &format!("{prefix}/actions"), |a: &mut Action<P>, id| {
                a.id = id
            }),
            pending: IdSet::new(&format!("{prefix}/pending")),
            handlers,
            config,
        }
    }

    /// Storage prefix of this gate.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Gate settings.
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Stores a new pending action.
    ///
    /// Bound identifiers in `env` are substituted into the stored intent, so
    /// later evaluations see the values from submission time. The creator is
    /// the first approver. `btl == 0` uses the configured default.
    pub async fn submit(
        &self,
        store: &dyn StorageBackend,
        creator: &str,
        payload: P,
        intent: &Intent,
        env: &BindingEnv,
        btl: u64,
        height: u64,
    ) -> Result<Action<P>, IntentError> {
        if creator.is_empty() {
            return Err(IntentError::InvalidInput("action creator must not be empty".into()));
        }
        let btl = if btl == 0 { self.config.default_btl } else { btl };

        let mut action = Action {
            id: 0,
            creator: creator.to_string(),
            payload,
            intent: intent.bind(env),
            approvers: vec![creator.to_string()],
            status: ActionStatus::Pending,
            created_height: height,
            timeout_height: height.saturating_add(btl),
            result: None,
            reject_reason: None,
        };
        let id = self.actions.append(store, action.clone()).await?;
        action.id = id;
        self.pending.insert(store, id).await?;

        info!(
            id,
            creator,
            kind = ?action.payload.kind(),
            intent = action.intent.id,
            timeout_height = action.timeout_height,
            "Action submitted"
        );
        Ok(action)
    }

    /// Whether the action's intent holds with its current approvers.
    ///
    /// `extra` supplies bindings for identifiers the stored intent still
    /// references; `approvers` always comes from the action.
    pub fn check_ready(&self, action: &Action<P>, extra: &BindingEnv) -> Result<bool, IntentError> {
        let mut env = extra.clone();
        env.set_attribute(APPROVERS, Value::str_list(action.approvers.iter().cloned()));
        action.intent.evaluate(&env)
    }

    /// Executes the action if it is pending and ready.
    ///
    /// A pending action past its timeout is marked expired instead. Actions
    /// in a terminal state are returned unchanged.
    pub async fn try_execute(&self, store: &dyn StorageBackend, id: u64, height: u64) -> Result<Action<P>, E> {
        let mut action = self.get(store, id).await?;
        if !action.is_pending() {
            return Ok(action);
        }
        if action.is_expired_at(height) {
            self.finish(store, &mut action, ActionStatus::Expired).await?;
            return Ok(action);
        }
        if !self.check_ready(&action, &BindingEnv::new())? {
            debug!(id, approvers = action.approvers.len(), "Action not ready");
            return Ok(action);
        }

        let kind = action.payload.kind();
        let handler = self
            .handlers
            .get(kind)
            .ok_or_else(|| IntentError::NoHandler(format!("{kind:?}")))?
            .clone();
        let output = handler.handle(store, &action).await?;

        action.result = Some(output);
        self.finish(store, &mut action, ActionStatus::Executed).await?;
        info!(id, kind = ?kind, "Action executed");
        Ok(action)
    }

    /// Records an approval and executes the action if that made it ready.
    pub async fn approve(
        &self,
        store: &dyn StorageBackend,
        id: u64,
        approver: &str,
        height: u64,
    ) -> Result<Action<P>, E> {
        let mut action = self.get(store, id).await?;
        if !action.is_pending() {
            return Err(IntentError::ActionNotPending {
                id,
                status: action.status,
            }
            .into());
        }
        if action.is_expired_at(height) {
            return Err(IntentError::ActionExpired {
                id,
                timeout_height: action.timeout_height,
            }
            .into());
        }
        if action.approvers.iter().any(|a| a == approver) {
            return Err(IntentError::AlreadyApproved {
                id,
                approver: approver.to_string(),
            }
            .into());
        }

        action.approvers.push(approver.to_string());
        self.actions.set(store, id, &action).await.map_err(IntentError::from)?;
        debug!(id, approver, "Action approved");

        self.try_execute(store, id, height).await
    }

    /// Rejects a pending action. Only its creator or the gate authority may.
    pub async fn reject(
        &self,
        store: &dyn StorageBackend,
        id: u64,
        caller: &str,
        reason: Option<String>,
    ) -> Result<Action<P>, IntentError> {
        let mut action = self.get(store, id).await?;
        if !action.is_pending() {
            return Err(IntentError::ActionNotPending {
                id,
                status: action.status,
            });
        }
        let is_authority = self.config.authority.as_deref() == Some(caller);
        if action.creator != caller && !is_authority {
            return Err(IntentError::Unauthorized {
                id,
                caller: caller.to_string(),
            });
        }

        action.reject_reason = reason;
        self.finish(store, &mut action, ActionStatus::Rejected).await?;
        info!(id, caller, "Action rejected");
        Ok(action)
    }

    /// Expires every pending action whose timeout is below `height`.
    ///
    /// Returns the ids that expired.
    pub async fn end_block(&self, store: &dyn StorageBackend, height: u64) -> Result<Vec<u64>, IntentError> {
        let mut expired = Vec::new();
        for id in self.pending.ids(store).await? {
            let mut action = self.get(store, id).await?;
            if action.is_pending() && action.is_expired_at(height) {
                self.finish(store, &mut action, ActionStatus::Expired).await?;
                expired.push(id);
            }
        }
        if !expired.is_empty() {
            info!(height, count = expired.len(), "Actions expired");
        }
        Ok(expired)
    }

    /// Loads an action.
    pub async fn get(&self, store: &dyn StorageBackend, id: u64) -> Result<Action<P>, IntentError> {
        self.actions
            .get(store, id)
            .await?
            .ok_or(IntentError::ActionNotFound(id))
    }

    /// Lists actions matching `filter` in id order.
    pub async fn list(
        &self,
        store: &dyn StorageBackend,
        filter: &ActionFilter,
        page: &PageRequest,
    ) -> Result<(Vec<Action<P>>, PageResponse), IntentError> {
        let matching = self
            .actions
            .iter(store)
            .await?
            .into_iter()
            .map(|(_, a)| a)
            .filter(|a| filter.matches(a))
            .collect();
        Ok(page.apply(matching))
    }

    async fn finish(
        &self,
        store: &dyn StorageBackend,
        action: &mut Action<P>,
        status: ActionStatus,
    ) -> Result<(), IntentError> {
        action.status = status;
        self.actions.set(store, action.id, action).await?;
        self.pending.remove(store, action.id).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use keyward_storage::{BufferedBackend, MemoryBackend};
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum Msg {
        Write { key: String },
        Fail,
        Orphan,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum MsgKind {
        Write,
        Fail,
        Orphan,
    }

    impl ActionPayload for Msg {
        type Kind = MsgKind;
        type Output = String;

        fn kind(&self) -> MsgKind {
            match self {
                Msg::Write { .. } => MsgKind::Write,
                Msg::Fail => MsgKind::Fail,
                Msg::Orphan => MsgKind::Orphan,
            }
        }
    }

    struct WriteHandler;

    #[async_trait]
    impl ActionHandler<Msg, IntentError> for WriteHandler {
        async fn handle(&self, store: &dyn StorageBackend, action: &Action<Msg>) -> Result<String, IntentError> {
            let Msg::Write { key } = &action.payload else {
                return Err(IntentError::InvalidInput("wrong payload".into()));
            };
            let count = match store.get(key).await? {
                Some(v) => v[0] + 1,
                None => 1,
            };
            store.put(key, &[count]).await?;
            Ok(format!("wrote {key}"))
        }
    }

    struct FailHandler;

    #[async_trait]
    impl ActionHandler<Msg, IntentError> for FailHandler {
        async fn handle(&self, store: &dyn StorageBackend, _action: &Action<Msg>) -> Result<String, IntentError> {
            store.put("side-effect", b"x").await?;
            Err(IntentError::InvalidInput("boom".into()))
        }
    }

    fn gate() -> ActionGate<Msg, IntentError> {
        let handlers = HandlerTable::new()
            .register(MsgKind::Write, Arc::new(WriteHandler))
            .register(MsgKind::Fail, Arc::new(FailHandler));
        ActionGate::new(
            "test",
            Arc::new(handlers),
            GateConfig {
                default_btl: 10,
                authority: Some("gov".into()),
            },
        )
    }

    fn two_of_three() -> (Intent, BindingEnv) {
        let intent = Intent::new("2of3", "any(2, space.owners)").unwrap();
        let env = BindingEnv::new().with_attribute("space.owners", Value::str_list(["alice", "bob", "carol"]));
        (intent, env)
    }

    fn write(key: &str) -> Msg {
        Msg::Write { key: key.into() }
    }

    #[tokio::test]
    async fn test_submit_binds_and_defaults_btl() {
        let store = MemoryBackend::new();
        let gate = gate();
        let (intent, env) = two_of_three();

        let action = gate.submit(&store, "alice", write("k"), &intent, &env, 0, 5).await.unwrap();
        assert_eq!(action.id, 1);
        assert_eq!(action.approvers, vec!["alice".to_string()]);
        assert_eq!(action.timeout_height, 15);
        assert_eq!(action.status, ActionStatus::Pending);
        assert_eq!(action.intent.expression.identifiers(), Vec::<String>::new());

        let stored = gate.get(&store, 1).await.unwrap();
        assert_eq!(stored.intent, action.intent);
    }

    #[tokio::test]
    async fn test_executes_once_threshold_reached() {
        let store = MemoryBackend::new();
        let gate = gate();
        let (intent, env) = two_of_three();
        gate.submit(&store, "alice", write("k"), &intent, &env, 0, 1).await.unwrap();

        let action = gate.try_execute(&store, 1, 1).await.unwrap();
        assert_eq!(action.status, ActionStatus::Pending);
        assert!(store.get("k").await.unwrap().is_none());

        let action = gate.approve(&store, 1, "bob", 2).await.unwrap();
        assert_eq!(action.status, ActionStatus::Executed);
        assert_eq!(action.result.as_deref(), Some("wrote k"));
        assert_eq!(store.get("k").await.unwrap(), Some(vec![1]));

        // terminal: no second execution
        let again = gate.try_execute(&store, 1, 3).await.unwrap();
        assert_eq!(again.status, ActionStatus::Executed);
        assert_eq!(store.get("k").await.unwrap(), Some(vec![1]));
        assert!(matches!(
            gate.approve(&store, 1, "carol", 3).await,
            Err(IntentError::ActionNotPending { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_approval_rejected() {
        let store = MemoryBackend::new();
        let gate = gate();
        let (intent, env) = two_of_three();
        gate.submit(&store, "alice", write("k"), &intent, &env, 0, 1).await.unwrap();

        let err = gate.approve(&store, 1, "alice", 1).await.unwrap_err();
        assert!(matches!(err, IntentError::AlreadyApproved { .. }));
    }

    #[tokio::test]
    async fn test_expiry() {
        let store = MemoryBackend::new();
        let gate = gate();
        let (intent, env) = two_of_three();
        gate.submit(&store, "alice", write("a"), &intent, &env, 3, 10).await.unwrap();
        gate.submit(&store, "alice", write("b"), &intent, &env, 20, 10).await.unwrap();

        assert!(gate.end_block(&store, 13).await.unwrap().is_empty());
        assert_eq!(gate.end_block(&store, 14).await.unwrap(), vec![1]);
        assert_eq!(gate.get(&store, 1).await.unwrap().status, ActionStatus::Expired);
        assert_eq!(gate.get(&store, 2).await.unwrap().status, ActionStatus::Pending);

        let err = gate.approve(&store, 2, "bob", 31).await.unwrap_err();
        assert!(matches!(err, IntentError::ActionExpired { .. }));

        let action = gate.try_execute(&store, 2, 31).await.unwrap();
        assert_eq!(action.status, ActionStatus::Expired);
        assert!(store.get("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reject_permissions() {
        let store = MemoryBackend::new();
        let gate = gate();
        let (intent, env) = two_of_three();
        gate.submit(&store, "alice", write("a"), &intent, &env, 0, 1).await.unwrap();
        gate.submit(&store, "alice", write("b"), &intent, &env, 0, 1).await.unwrap();

        let err = gate.reject(&store, 1, "bob", None).await.unwrap_err();
        assert!(matches!(err, IntentError::Unauthorized { .. }));

        let action = gate.reject(&store, 1, "alice", Some("typo".into())).await.unwrap();
        assert_eq!(action.status, ActionStatus::Rejected);
        assert_eq!(action.reject_reason.as_deref(), Some("typo"));

        let action = gate.reject(&store, 2, "gov", None).await.unwrap();
        assert_eq!(action.status, ActionStatus::Rejected);
        assert!(gate.end_block(&store, 10_000).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_handler_failure_discards_unit() {
        let store = MemoryBackend::new();
        let gate = gate();
        let intent = Intent::new("open", "true").unwrap();

        let unit = BufferedBackend::new(&store);
        gate.submit(&unit, "alice", Msg::Fail, &intent, &BindingEnv::new(), 0, 1)
            .await
            .unwrap();
        assert!(gate.try_execute(&unit, 1, 1).await.is_err());
        unit.discard();

        assert!(store.is_empty().await);
        assert!(matches!(gate.get(&store, 1).await, Err(IntentError::ActionNotFound(1))));
    }

    #[tokio::test]
    async fn test_missing_handler() {
        let store = MemoryBackend::new();
        let gate = gate();
        let intent = Intent::new("open", "true").unwrap();
        gate.submit(&store, "alice", Msg::Orphan, &intent, &BindingEnv::new(), 0, 1)
            .await
            .unwrap();
        let err = gate.try_execute(&store, 1, 1).await.unwrap_err();
        assert!(matches!(err, IntentError::NoHandler(_)));
    }

    #[tokio::test]
    async fn test_list_filters_and_pages() {
        let store = MemoryBackend::new();
        let gate = gate();
        let (intent, env) = two_of_three();
        for creator in ["alice", "bob", "alice", "alice"] {
            gate.submit(&store, creator, write("k"), &intent, &env, 0, 1).await.unwrap();
        }
        gate.reject(&store, 3, "alice", None).await.unwrap();

        let filter = ActionFilter {
            creator: Some("alice".into()),
            status: Some(ActionStatus::Pending),
        };
        let (items, page) = gate
            .list(&store, &filter, &PageRequest { offset: 0, limit: 1 })
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, 1);
    }

    #[tokio::test]
    async fn test_check_ready_uses_action_approvers() {
        let store = MemoryBackend::new();
        let gate = gate();
        let intent = Intent::new("creator-only", "all([creator])").unwrap();
        let env = BindingEnv::new().with_attribute("creator", "alice");
        let action = gate.submit(&store, "alice", write("k"), &intent, &env, 0, 1).await.unwrap();
        assert!(gate.check_ready(&action, &BindingEnv::new()).unwrap());
    }
}
