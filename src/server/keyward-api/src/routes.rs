//! REST routes.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use keyward_custody::{
    CustodyAction, Key, Keychain, MsgNewSignatureRequest, SignRequest, SignRequestFilter, SignRequestStatus, Space,
};
use keyward_intent::{ActionFilter, ActionStatus};
use keyward_storage::{PageRequest, PageResponse};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::node::Node;

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Builds the API router over a shared node.
pub fn router(node: Arc<Node>) -> Router {
    Router::new()
        .route("/v1/sys/health", get(health))
        .route("/v1/signature-requests", post(create_signature_request).get(list_signature_requests))
        .route("/v1/signature-requests/{id}", get(get_signature_request))
        .route("/v1/actions", get(list_actions))
        .route("/v1/actions/{id}", get(get_action))
        .route("/v1/actions/{id}/approve", post(approve_action))
        .route("/v1/actions/{id}/reject", post(reject_action))
        .route("/v1/balances/{account}/{denom}", get(get_balance))
        .route("/v1/keychains", get(list_keychains))
        .route("/v1/keychains/{id}", get(get_keychain))
        .route("/v1/spaces", get(list_spaces))
        .route("/v1/spaces/{id}", get(get_space))
        .route("/v1/keys", get(list_keys))
        .route("/v1/keys/{id}", get(get_key))
        .layer(TraceLayer::new_for_http())
        .with_state(node)
}

/// Health probe payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `ok` while the node serves requests.
    pub status: String,
    /// Server version.
    pub version: String,
    /// Current block height.
    pub height: u64,
}

/// Single-action payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct ActionResponse {
    /// The action after the call.
    pub action: CustodyAction,
}

/// Action listing payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct ActionsResponse {
    /// Matching actions in ascending id order.
    pub actions: Vec<CustodyAction>,
    /// Paging totals.
    pub pagination: PageResponse,
}

/// Single sign request payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct SignRequestResponse {
    /// The sign request.
    pub sign_request: SignRequest,
}

/// Sign request listing payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct SignRequestsResponse {
    /// Matching sign requests in ascending id order.
    pub sign_requests: Vec<SignRequest>,
    /// Paging totals.
    pub pagination: PageResponse,
}

/// Balance payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    /// Account address.
    pub account: String,
    /// Denomination.
    pub denom: String,
    /// Amount held.
    pub amount: u64,
}

/// Single keychain payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct KeychainResponse {
    /// The keychain, fee schedule included.
    pub keychain: Keychain,
}

/// Keychain listing payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct KeychainsResponse {
    /// Keychains in ascending id order.
    pub keychains: Vec<Keychain>,
    /// Paging totals.
    pub pagination: PageResponse,
}

/// Single space payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct SpaceResponse {
    /// The space.
    pub space: Space,
}

/// Space listing payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct SpacesResponse {
    /// Matching spaces in ascending id order.
    pub spaces: Vec<Space>,
    /// Paging totals.
    pub pagination: PageResponse,
}

/// Single key payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct KeyResponse {
    /// The key.
    pub key: Key,
}

/// Key listing payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct KeysResponse {
    /// Matching keys in ascending id order.
    pub keys: Vec<Key>,
    /// Paging totals.
    pub pagination: PageResponse,
}

/// Body of an approval.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApproveRequest {
    /// Address approving the action.
    pub approver: String,
}

/// Body of a rejection.
#[derive(Debug, Serialize, Deserialize)]
pub struct RejectRequest {
    /// Address rejecting the action.
    pub caller: String,
    /// Optional free-form reason.
    #[serde(default)]
    pub reason: Option<String>,
}

// Query strings are kept flat; urlencoded decoding does not mix with
// `#[serde(flatten)]` for numeric fields.
#[derive(Debug, Default, Deserialize)]
struct SignRequestQuery {
    keychain_id: Option<u64>,
    status: Option<SignRequestStatus>,
    offset: Option<u64>,
    limit: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ActionQuery {
    creator: Option<String>,
    status: Option<ActionStatus>,
    offset: Option<u64>,
    limit: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PageQuery {
    offset: Option<u64>,
    limit: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SpaceQuery {
    owner: Option<String>,
    offset: Option<u64>,
    limit: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct KeyQuery {
    space_id: Option<u64>,
    offset: Option<u64>,
    limit: Option<u64>,
}

fn page(offset: Option<u64>, limit: Option<u64>) -> PageRequest {
    PageRequest {
        offset: offset.unwrap_or_default(),
        limit: limit.unwrap_or_default(),
    }
}

async fn health(State(node): State<Arc<Node>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        height: node.height().await,
    })
}

async fn create_signature_request(
    State(node): State<Arc<Node>>,
    Json(msg): Json<MsgNewSignatureRequest>,
) -> Result<(StatusCode, Json<ActionResponse>), ApiError> {
    let action = node.new_signature_request(msg).await?;
    Ok((StatusCode::CREATED, Json(ActionResponse { action })))
}

async fn get_signature_request(State(node): State<Arc<Node>>, Path(id): Path<u64>) -> ApiResult<SignRequestResponse> {
    let sign_request = node.service().sign_request_by_id(node.store(), id).await?;
    Ok(Json(SignRequestResponse { sign_request }))
}

async fn list_signature_requests(
    State(node): State<Arc<Node>>,
    Query(query): Query<SignRequestQuery>,
) -> ApiResult<SignRequestsResponse> {
    let filter = SignRequestFilter {
        keychain_id: query.keychain_id,
        status: query.status,
    };
    let (sign_requests, pagination) = node
        .service()
        .sign_requests(node.store(), &filter, &page(query.offset, query.limit))
        .await?;
    Ok(Json(SignRequestsResponse {
        sign_requests,
        pagination,
    }))
}

async fn get_action(State(node): State<Arc<Node>>, Path(id): Path<u64>) -> ApiResult<ActionResponse> {
    let action = node.service().action_by_id(node.store(), id).await?;
    Ok(Json(ActionResponse { action }))
}

async fn list_actions(State(node): State<Arc<Node>>, Query(query): Query<ActionQuery>) -> ApiResult<ActionsResponse> {
    let filter = ActionFilter {
        creator: query.creator,
        status: query.status,
    };
    let (actions, pagination) = node
        .service()
        .actions(node.store(), &filter, &page(query.offset, query.limit))
        .await?;
    Ok(Json(ActionsResponse { actions, pagination }))
}

async fn approve_action(
    State(node): State<Arc<Node>>,
    Path(id): Path<u64>,
    Json(body): Json<ApproveRequest>,
) -> ApiResult<ActionResponse> {
    if body.approver.is_empty() {
        return Err(ApiError::BadRequest("approver must not be empty".into()));
    }
    let action = node.approve_action(id, &body.approver).await?;
    Ok(Json(ActionResponse { action }))
}

async fn reject_action(
    State(node): State<Arc<Node>>,
    Path(id): Path<u64>,
    Json(body): Json<RejectRequest>,
) -> ApiResult<ActionResponse> {
    let action = node.reject_action(id, &body.caller, body.reason).await?;
    Ok(Json(ActionResponse { action }))
}

async fn get_balance(
    State(node): State<Arc<Node>>,
    Path((account, denom)): Path<(String, String)>,
) -> ApiResult<BalanceResponse> {
    let amount = node.service().balance(node.store(), &account, Some(&denom)).await?;
    Ok(Json(BalanceResponse { account, denom, amount }))
}

async fn get_keychain(State(node): State<Arc<Node>>, Path(id): Path<u64>) -> ApiResult<KeychainResponse> {
    let keychain = node.service().registry().get_keychain(node.store(), id).await?;
    Ok(Json(KeychainResponse { keychain }))
}

async fn list_keychains(State(node): State<Arc<Node>>, Query(query): Query<PageQuery>) -> ApiResult<KeychainsResponse> {
    let (keychains, pagination) = node
        .service()
        .registry()
        .keychains(node.store(), &page(query.offset, query.limit))
        .await?;
    Ok(Json(KeychainsResponse { keychains, pagination }))
}

async fn get_space(State(node): State<Arc<Node>>, Path(id): Path<u64>) -> ApiResult<SpaceResponse> {
    let space = node.service().registry().get_space(node.store(), id).await?;
    Ok(Json(SpaceResponse { space }))
}

async fn list_spaces(State(node): State<Arc<Node>>, Query(query): Query<SpaceQuery>) -> ApiResult<SpacesResponse> {
    let (spaces, pagination) = node
        .service()
        .registry()
        .spaces(node.store(), query.owner.as_deref(), &page(query.offset, query.limit))
        .await?;
    Ok(Json(SpacesResponse { spaces, pagination }))
}

async fn get_key(State(node): State<Arc<Node>>, Path(id): Path<u64>) -> ApiResult<KeyResponse> {
    let key = node.service().registry().get_key(node.store(), id).await?;
    Ok(Json(KeyResponse { key }))
}

async fn list_keys(State(node): State<Arc<Node>>, Query(query): Query<KeyQuery>) -> ApiResult<KeysResponse> {
    let (keys, pagination) = node
        .service()
        .registry()
        .keys(node.store(), query.space_id, &page(query.offset, query.limit))
        .await?;
    Ok(Json(KeysResponse { keys, pagination }))
}
