//! Keyward CLI - Command line interface.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use keyward_custody::{Metadata, MetadataCosmos, MetadataEthereum, MsgNewSignatureRequest};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

// ============================================================================
// CLI Structure
// ============================================================================

#[derive(Parser)]
#[command(name = "keyward")]
#[command(about = "Keyward CLI - Request signatures and approve actions")]
#[command(version)]
struct Cli {
    /// Keyward server address
    #[arg(long, default_value = "http://localhost:8300", env = "KEYWARD_ADDR")]
    addr: String,

    /// Address acting as creator, approver or rejecter
    #[arg(long, env = "KEYWARD_CREATOR")]
    creator: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server status
    Status,
    /// Signature requests
    Sign {
        #[command(subcommand)]
        command: SignCommands,
    },
    /// Intent-gated actions
    Action {
        #[command(subcommand)]
        command: ActionCommands,
    },
    /// Keychains
    Keychain {
        #[command(subcommand)]
        command: KeychainCommands,
    },
    /// Spaces
    Space {
        #[command(subcommand)]
        command: SpaceCommands,
    },
    /// Managed keys
    Key {
        #[command(subcommand)]
        command: KeyCommands,
    },
    /// Show an account balance
    Balance {
        /// Account address
        account: String,
        /// Denomination
        #[arg(long, default_value = "uward")]
        denom: String,
    },
}

#[derive(Subcommand)]
enum SignCommands {
    /// Propose a new signature request
    Request {
        /// Key to sign with
        #[arg(long)]
        key_id: u64,
        /// Hex-encoded input
        #[arg(long)]
        input: String,
        /// Analyzer contract to run (repeatable, in order)
        #[arg(long = "analyzer")]
        analyzers: Vec<String>,
        /// Blocks to wait for approvals (0 = server default)
        #[arg(long, default_value = "0")]
        btl: u64,
        /// Ethereum chain id for Ethereum keys
        #[arg(long, conflicts_with = "cosmos_chain_id")]
        eth_chain_id: Option<u64>,
        /// Cosmos chain id for Cosmos keys
        #[arg(long)]
        cosmos_chain_id: Option<String>,
    },
    /// Show a sign request
    Get {
        /// Sign request id
        id: u64,
    },
    /// List sign requests
    List {
        /// Only requests for this keychain
        #[arg(long)]
        keychain_id: Option<u64>,
        /// Only requests in this status (pending, fulfilled, rejected)
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value = "0")]
        offset: u64,
        #[arg(long, default_value = "100")]
        limit: u64,
    },
}

#[derive(Subcommand)]
enum ActionCommands {
    /// Show an action
    Get {
        /// Action id
        id: u64,
    },
    /// List actions
    List {
        /// Only actions created by --creator
        #[arg(long)]
        mine: bool,
        /// Only actions in this status (pending, executed, expired, rejected)
        #[arg(long)]
        status: Option<String>,
    },
    /// Approve an action as --creator
    Approve {
        /// Action id
        id: u64,
    },
    /// Reject a pending action as --creator
    Reject {
        /// Action id
        id: u64,
        /// Reason recorded on the action
        #[arg(long)]
        reason: Option<String>,
    },
}

#[derive(Subcommand)]
enum KeychainCommands {
    /// Show a keychain and its fees
    Get {
        /// Keychain id
        id: u64,
    },
    /// List keychains
    List {
        #[arg(long, default_value = "0")]
        offset: u64,
        #[arg(long, default_value = "100")]
        limit: u64,
    },
}

#[derive(Subcommand)]
enum SpaceCommands {
    /// Show a space
    Get {
        /// Space id
        id: u64,
    },
    /// List spaces
    List {
        /// Only spaces owned by --creator
        #[arg(long)]
        mine: bool,
        #[arg(long, default_value = "0")]
        offset: u64,
        #[arg(long, default_value = "100")]
        limit: u64,
    },
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Show a key
    Get {
        /// Key id
        id: u64,
    },
    /// List keys
    List {
        /// Only keys of this space
        #[arg(long)]
        space_id: Option<u64>,
        #[arg(long, default_value = "0")]
        offset: u64,
        #[arg(long, default_value = "100")]
        limit: u64,
    },
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    version: String,
    height: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Deserialize)]
struct ActionView {
    id: u64,
    creator: String,
    status: String,
    approvers: Vec<String>,
    timeout_height: u64,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    reject_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ActionResponse {
    action: ActionView,
}

#[derive(Debug, Deserialize)]
struct ActionsResponse {
    actions: Vec<ActionView>,
    pagination: Pagination,
}

#[derive(Debug, Deserialize)]
struct SignRequestView {
    id: u64,
    creator: String,
    key_id: u64,
    keychain_id: u64,
    data_for_signing: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct SignRequestResponse {
    sign_request: SignRequestView,
}

#[derive(Debug, Deserialize)]
struct SignRequestsResponse {
    sign_requests: Vec<SignRequestView>,
    pagination: Pagination,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    total: u64,
}

#[derive(Debug, Deserialize)]
struct FeeView {
    signature_request_fee: u64,
}

#[derive(Debug, Deserialize)]
struct KeychainView {
    id: u64,
    name: String,
    #[serde(default)]
    admins: Vec<String>,
    is_active: bool,
    #[serde(default)]
    fees: Option<FeeView>,
}

#[derive(Debug, Deserialize)]
struct KeychainResponse {
    keychain: KeychainView,
}

#[derive(Debug, Deserialize)]
struct KeychainsResponse {
    keychains: Vec<KeychainView>,
    pagination: Pagination,
}

#[derive(Debug, Deserialize)]
struct SpaceView {
    id: u64,
    owners: Vec<String>,
    sign_intent_id: u64,
}

#[derive(Debug, Deserialize)]
struct SpaceResponse {
    space: SpaceView,
}

#[derive(Debug, Deserialize)]
struct SpacesResponse {
    spaces: Vec<SpaceView>,
    pagination: Pagination,
}

#[derive(Debug, Deserialize)]
struct KeyView {
    id: u64,
    space_id: u64,
    keychain_id: u64,
    intent_id: u64,
    sign_method: String,
    key_type: String,
    public_key: String,
}

#[derive(Debug, Deserialize)]
struct KeyResponse {
    key: KeyView,
}

#[derive(Debug, Deserialize)]
struct KeysResponse {
    keys: Vec<KeyView>,
    pagination: Pagination,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    account: String,
    denom: String,
    amount: u64,
}

#[derive(Serialize)]
struct ApproveRequest<'a> {
    approver: &'a str,
}

#[derive(Serialize)]
struct RejectRequest<'a> {
    caller: &'a str,
    reason: Option<String>,
}

// ============================================================================
// HTTP Client
// ============================================================================

struct KeywardClient {
    client: Client,
    base_url: String,
}

impl KeywardClient {
    fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder, what: &str) -> Result<T> {
        let resp = req.send().await.context("Failed to connect to server")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error: ErrorResponse = resp.json().await.unwrap_or(ErrorResponse {
                error: format!("Unknown error ({status})"),
            });
            bail!("{} failed: {}", what, error.error);
        }

        resp.json().await.context("Failed to parse response")
    }

    async fn health(&self) -> Result<HealthResponse> {
        self.send(self.client.get(self.url("/v1/sys/health")), "Status").await
    }

    async fn new_signature_request(&self, msg: &MsgNewSignatureRequest) -> Result<ActionResponse> {
        let req = self.client.post(self.url("/v1/signature-requests")).json(msg);
        self.send(req, "Signature request").await
    }

    async fn sign_request(&self, id: u64) -> Result<SignRequestResponse> {
        let req = self.client.get(self.url(&format!("/v1/signature-requests/{id}")));
        self.send(req, "Get sign request").await
    }

    async fn sign_requests(&self, query: &[(&str, String)]) -> Result<SignRequestsResponse> {
        let req = self.client.get(self.url("/v1/signature-requests")).query(query);
        self.send(req, "List sign requests").await
    }

    async fn action(&self, id: u64) -> Result<ActionResponse> {
        let req = self.client.get(self.url(&format!("/v1/actions/{id}")));
        self.send(req, "Get action").await
    }

    async fn actions(&self, query: &[(&str, String)]) -> Result<ActionsResponse> {
        let req = self.client.get(self.url("/v1/actions")).query(query);
        self.send(req, "List actions").await
    }

    async fn approve(&self, id: u64, approver: &str) -> Result<ActionResponse> {
        let req = self
            .client
            .post(self.url(&format!("/v1/actions/{id}/approve")))
            .json(&ApproveRequest { approver });
        self.send(req, "Approve").await
    }

    async fn reject(&self, id: u64, caller: &str, reason: Option<String>) -> Result<ActionResponse> {
        let req = self
            .client
            .post(self.url(&format!("/v1/actions/{id}/reject")))
            .json(&RejectRequest { caller, reason });
        self.send(req, "Reject").await
    }

    async fn keychain(&self, id: u64) -> Result<KeychainResponse> {
        let req = self.client.get(self.url(&format!("/v1/keychains/{id}")));
        self.send(req, "Get keychain").await
    }

    async fn keychains(&self, query: &[(&str, String)]) -> Result<KeychainsResponse> {
        let req = self.client.get(self.url("/v1/keychains")).query(query);
        self.send(req, "List keychains").await
    }

    async fn space(&self, id: u64) -> Result<SpaceResponse> {
        let req = self.client.get(self.url(&format!("/v1/spaces/{id}")));
        self.send(req, "Get space").await
    }

    async fn spaces(&self, query: &[(&str, String)]) -> Result<SpacesResponse> {
        let req = self.client.get(self.url("/v1/spaces")).query(query);
        self.send(req, "List spaces").await
    }

    async fn key(&self, id: u64) -> Result<KeyResponse> {
        let req = self.client.get(self.url(&format!("/v1/keys/{id}")));
        self.send(req, "Get key").await
    }

    async fn keys(&self, query: &[(&str, String)]) -> Result<KeysResponse> {
        let req = self.client.get(self.url("/v1/keys")).query(query);
        self.send(req, "List keys").await
    }

    async fn balance(&self, account: &str, denom: &str) -> Result<BalanceResponse> {
        let req = self.client.get(self.url(&format!("/v1/balances/{account}/{denom}")));
        self.send(req, "Balance").await
    }
}

// ============================================================================
// Command Handlers
// ============================================================================

fn require_creator(creator: Option<&str>) -> Result<&str> {
    creator.context("An address is required. Set KEYWARD_CREATOR or use --creator")
}

fn metadata(eth_chain_id: Option<u64>, cosmos_chain_id: Option<String>) -> Metadata {
    match (eth_chain_id, cosmos_chain_id) {
        (Some(chain_id), _) => Metadata::Ethereum(MetadataEthereum { chain_id }),
        (None, Some(chain_id)) => Metadata::Cosmos(MetadataCosmos { chain_id }),
        (None, None) => Metadata::None,
    }
}

fn decode_input(input: &str) -> Result<Vec<u8>> {
    let input = input.strip_prefix("0x").unwrap_or(input);
    hex::decode(input).context("Input must be hex")
}

fn print_action(action: &ActionView) {
    println!("Action {}:", action.id);
    println!("  Creator:   {}", action.creator);
    println!("  Status:    {}", action.status);
    println!("  Approvers: {}", action.approvers.join(", "));
    println!("  Timeout:   block {}", action.timeout_height);
    if let Some(result) = &action.result {
        println!("  Result:    {result}");
    }
    if let Some(reason) = &action.reject_reason {
        println!("  Reason:    {reason}");
    }
}

fn print_sign_request(req: &SignRequestView) {
    println!("Sign request {}:", req.id);
    println!("  Creator:  {}", req.creator);
    println!("  Key:      {}", req.key_id);
    println!("  Keychain: {}", req.keychain_id);
    println!("  Status:   {}", req.status);
    println!("  Data:     0x{}", req.data_for_signing);
}

fn page_query(offset: u64, limit: u64) -> Vec<(&'static str, String)> {
    vec![("offset", offset.to_string()), ("limit", limit.to_string())]
}

fn intent_label(intent_id: u64) -> String {
    match intent_id {
        0 => "default".to_string(),
        id => id.to_string(),
    }
}

fn print_keychain(keychain: &KeychainView) {
    println!("Keychain {}:", keychain.id);
    println!("  Name:   {}", keychain.name);
    println!("  Active: {}", keychain.is_active);
    println!("  Admins: {}", keychain.admins.join(", "));
    match &keychain.fees {
        Some(fees) => println!("  Fee:    {} per signature request", fees.signature_request_fee),
        None => println!("  Fee:    none"),
    }
}

fn print_space(space: &SpaceView) {
    println!("Space {}:", space.id);
    println!("  Owners: {}", space.owners.join(", "));
    println!("  Intent: {}", intent_label(space.sign_intent_id));
}

fn print_key(key: &KeyView) {
    println!("Key {}:", key.id);
    println!("  Space:       {}", key.space_id);
    println!("  Keychain:    {}", key.keychain_id);
    println!("  Intent:      {}", intent_label(key.intent_id));
    println!("  Sign method: {}", key.sign_method);
    println!("  Type:        {}", key.key_type);
    println!("  Public key:  0x{}", key.public_key);
}

async fn cmd_status(client: &KeywardClient) -> Result<()> {
    let health = client.health().await?;

    println!("Keyward server status:");
    println!("  Status:  {}", health.status);
    println!("  Version: {}", health.version);
    println!("  Height:  {}", health.height);

    Ok(())
}

async fn cmd_sign(client: &KeywardClient, creator: Option<&str>, command: SignCommands) -> Result<()> {
    match command {
        SignCommands::Request {
            key_id,
            input,
            analyzers,
            btl,
            eth_chain_id,
            cosmos_chain_id,
        } => {
            let msg = MsgNewSignatureRequest {
                creator: require_creator(creator)?.to_string(),
                key_id,
                analyzers,
                input: decode_input(&input)?,
                metadata: metadata(eth_chain_id, cosmos_chain_id).pack(),
                btl,
            };
            let result = client.new_signature_request(&msg).await?;
            print_action(&result.action);
            if result.action.status == "pending" {
                println!();
                println!("Waiting for approvals. Approve with: keyward action approve {}", result.action.id);
            }
        },
        SignCommands::Get { id } => {
            let result = client.sign_request(id).await?;
            print_sign_request(&result.sign_request);
        },
        SignCommands::List {
            keychain_id,
            status,
            offset,
            limit,
        } => {
            let mut query = vec![("offset", offset.to_string()), ("limit", limit.to_string())];
            if let Some(keychain_id) = keychain_id {
                query.push(("keychain_id", keychain_id.to_string()));
            }
            if let Some(status) = status {
                query.push(("status", status));
            }
            let result = client.sign_requests(&query).await?;
            if result.sign_requests.is_empty() {
                println!("No sign requests found");
            }
            for req in &result.sign_requests {
                println!(
                    "  #{} key={} keychain={} {} 0x{}",
                    req.id, req.key_id, req.keychain_id, req.status, req.data_for_signing
                );
            }
            println!("Total: {}", result.pagination.total);
        },
    }
    Ok(())
}

async fn cmd_action(client: &KeywardClient, creator: Option<&str>, command: ActionCommands) -> Result<()> {
    let result = match command {
        ActionCommands::Get { id } => client.action(id).await?,
        ActionCommands::List { mine, status } => {
            let mut query = Vec::new();
            if mine {
                query.push(("creator", require_creator(creator)?.to_string()));
            }
            if let Some(status) = status {
                query.push(("status", status));
            }
            let result = client.actions(&query).await?;
            if result.actions.is_empty() {
                println!("No actions found");
            }
            for action in &result.actions {
                println!(
                    "  #{} {} by {} ({} approvals)",
                    action.id,
                    action.status,
                    action.creator,
                    action.approvers.len()
                );
            }
            println!("Total: {}", result.pagination.total);
            return Ok(());
        },
        ActionCommands::Approve { id } => client.approve(id, require_creator(creator)?).await?,
        ActionCommands::Reject { id, reason } => client.reject(id, require_creator(creator)?, reason).await?,
    };
    print_action(&result.action);
    Ok(())
}

async fn cmd_keychain(client: &KeywardClient, command: KeychainCommands) -> Result<()> {
    match command {
        KeychainCommands::Get { id } => print_keychain(&client.keychain(id).await?.keychain),
        KeychainCommands::List { offset, limit } => {
            let result = client.keychains(&page_query(offset, limit)).await?;
            if result.keychains.is_empty() {
                println!("No keychains found");
            }
            for keychain in &result.keychains {
                let fee = keychain.fees.as_ref().map_or(0, |f| f.signature_request_fee);
                let state = if keychain.is_active { "active" } else { "inactive" };
                println!("  #{} {} {} fee={}", keychain.id, keychain.name, state, fee);
            }
            println!("Total: {}", result.pagination.total);
        },
    }
    Ok(())
}

async fn cmd_space(client: &KeywardClient, creator: Option<&str>, command: SpaceCommands) -> Result<()> {
    match command {
        SpaceCommands::Get { id } => print_space(&client.space(id).await?.space),
        SpaceCommands::List { mine, offset, limit } => {
            let mut query = page_query(offset, limit);
            if mine {
                query.push(("owner", require_creator(creator)?.to_string()));
            }
            let result = client.spaces(&query).await?;
            if result.spaces.is_empty() {
                println!("No spaces found");
            }
            for space in &result.spaces {
                println!(
                    "  #{} owners={} intent={}",
                    space.id,
                    space.owners.join(","),
                    intent_label(space.sign_intent_id)
                );
            }
            println!("Total: {}", result.pagination.total);
        },
    }
    Ok(())
}

async fn cmd_key(client: &KeywardClient, command: KeyCommands) -> Result<()> {
    match command {
        KeyCommands::Get { id } => print_key(&client.key(id).await?.key),
        KeyCommands::List {
            space_id,
            offset,
            limit,
        } => {
            let mut query = page_query(offset, limit);
            if let Some(space_id) = space_id {
                query.push(("space_id", space_id.to_string()));
            }
            let result = client.keys(&query).await?;
            if result.keys.is_empty() {
                println!("No keys found");
            }
            for key in &result.keys {
                println!(
                    "  #{} space={} keychain={} {} intent={}",
                    key.id,
                    key.space_id,
                    key.keychain_id,
                    key.sign_method,
                    intent_label(key.intent_id)
                );
            }
            println!("Total: {}", result.pagination.total);
        },
    }
    Ok(())
}

async fn cmd_balance(client: &KeywardClient, account: &str, denom: &str) -> Result<()> {
    let balance = client.balance(account, denom).await?;
    println!("{} {}{}", balance.account, balance.amount, balance.denom);
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = KeywardClient::new(&cli.addr)?;
    let creator = cli.creator.as_deref();

    match cli.command {
        Commands::Status => cmd_status(&client).await,
        Commands::Sign { command } => cmd_sign(&client, creator, command).await,
        Commands::Action { command } => cmd_action(&client, creator, command).await,
        Commands::Keychain { command } => cmd_keychain(&client, command).await,
        Commands::Space { command } => cmd_space(&client, creator, command).await,
        Commands::Key { command } => cmd_key(&client, command).await,
        Commands::Balance { account, denom } => cmd_balance(&client, &account, &denom).await,
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_chain_flags_conflict() {
        let parsed = Cli::try_parse_from([
            "keyward",
            "sign",
            "request",
            "--key-id",
            "1",
            "--input",
            "00",
            "--eth-chain-id",
            "1",
            "--cosmos-chain-id",
            "hub",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_metadata_selection() {
        let packed = metadata(Some(11155111), None).pack().unwrap();
        assert_eq!(packed.type_url, "/keyward.custody.v1.MetadataEthereum");
        assert_eq!(packed.value["chain_id"], 11155111);

        assert!(metadata(None, None).pack().is_none());
    }

    #[test]
    fn test_registry_commands() {
        let cli = Cli::try_parse_from(["keyward", "key", "list", "--space-id", "3", "--limit", "5"]).unwrap();
        match cli.command {
            Commands::Key {
                command: KeyCommands::List { space_id, offset, limit },
            } => {
                assert_eq!(space_id, Some(3));
                assert_eq!(page_query(offset, limit), vec![("offset", "0".to_string()), ("limit", "5".to_string())]);
            },
            _ => panic!("expected key list"),
        }

        assert!(Cli::try_parse_from(["keyward", "keychain", "get", "1"]).is_ok());
        assert!(Cli::try_parse_from(["keyward", "space", "list", "--mine"]).is_ok());
        assert_eq!(intent_label(0), "default");
    }

    #[test]
    fn test_decode_input() {
        assert_eq!(decode_input("0xdead").unwrap(), vec![0xde, 0xad]);
        assert!(decode_input("zz").is_err());
    }
}
