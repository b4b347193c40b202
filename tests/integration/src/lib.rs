//! Integration tests for Keyward server.
//!
//! These tests spawn the server binary and drive signature requests and
//! approvals over HTTP.

// Allow unwrap() in tests - panics are acceptable for test assertions
#![allow(clippy::disallowed_methods)]

use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::TempDir;

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub height: u64,
}

#[derive(Debug, Deserialize)]
pub struct ActionView {
    pub id: u64,
    pub creator: String,
    pub status: String,
    pub approvers: Vec<String>,
    #[serde(default)]
    pub result: Option<Value>,
}

impl ActionView {
    /// Id of the sign request an executed action produced.
    pub fn sign_request_id(&self) -> Option<u64> {
        self.result.as_ref()?.get("sign_request_id")?.as_u64()
    }
}

#[derive(Debug, Deserialize)]
pub struct ActionResponse {
    pub action: ActionView,
}

#[derive(Debug, Deserialize)]
pub struct SignRequestView {
    pub id: u64,
    pub key_id: u64,
    pub keychain_id: u64,
    pub data_for_signing: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct SignRequestResponse {
    pub sign_request: SignRequestView,
}

#[derive(Debug, Deserialize)]
pub struct BalanceResponse {
    pub amount: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct ApproveRequest<'a> {
    approver: &'a str,
}

// ============================================================================
// Test Server
// ============================================================================

/// A test server instance that manages its own data directory and process.
pub struct TestServer {
    process: Child,
    pub base_url: String,
    pub port: u16,
    _data_dir: TempDir,
}

impl TestServer {
    /// Start a dev-mode server on the specified port.
    pub async fn start(port: u16) -> Result<Self> {
        Self::spawn(port, None).await
    }

    /// Start a dev-mode server with a config file written from `config`.
    pub async fn start_with_config(port: u16, config: &str) -> Result<Self> {
        Self::spawn(port, Some(config)).await
    }

    async fn spawn(port: u16, config: Option<&str>) -> Result<Self> {
        let data_dir = TempDir::new().context("Failed to create temp dir")?;
        let config_path = data_dir.path().join("keyward.toml");
        std::fs::write(&config_path, config.unwrap_or_default()).context("Failed to write config")?;

        // Find the server binary
        let server_binary = find_server_binary()?;

        let process = Command::new(&server_binary)
            .arg("--dev")
            .arg("--config")
            .arg(&config_path)
            .arg("--data-dir")
            .arg(data_dir.path())
            .arg("--bind")
            .arg(format!("127.0.0.1:{}", port))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to start server: {:?}", server_binary))?;

        let base_url = format!("http://127.0.0.1:{}", port);

        let server = Self {
            process,
            base_url,
            port,
            _data_dir: data_dir,
        };

        // Wait for server to be ready
        server.wait_for_ready().await?;

        Ok(server)
    }

    /// Directory holding this server's config and database.
    pub fn data_dir(&self) -> &Path {
        self._data_dir.path()
    }

    /// Wait for the server to be ready to accept connections.
    async fn wait_for_ready(&self) -> Result<()> {
        let client = Client::new();
        let url = format!("{}/v1/sys/health", self.base_url);

        for _ in 0..50 {
            match client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                _ => tokio::time::sleep(Duration::from_millis(100)).await,
            }
        }

        bail!("Server failed to start within 5 seconds")
    }

    /// Get a configured HTTP client for this server.
    pub fn client(&self) -> KeywardClient {
        KeywardClient::new(&self.base_url)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.process.kill();
        let _ = self.process.wait();
    }
}

/// Find the server binary in the target directory.
fn find_server_binary() -> Result<std::path::PathBuf> {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string());

    // Try debug build first, then release
    let candidates = [
        Path::new(&manifest_dir).join("../../target/debug/keyward-server"),
        Path::new(&manifest_dir).join("../../target/debug/keyward-server.exe"),
        Path::new(&manifest_dir).join("../../target/release/keyward-server"),
        Path::new(&manifest_dir).join("../../target/release/keyward-server.exe"),
    ];

    for candidate in &candidates {
        if candidate.exists() {
            return Ok(candidate.canonicalize()?);
        }
    }

    bail!(
        "Could not find keyward-server binary. Run 'cargo build -p keyward-server' first. Searched in: {:?}",
        candidates
    )
}

// ============================================================================
// Test Client
// ============================================================================

/// HTTP client for testing the Keyward API.
///
/// Failed calls turn into errors reading `<status>: <message>`.
pub struct KeywardClient {
    client: Client,
    base_url: String,
}

impl KeywardClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T> {
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let error = resp
                .json::<ErrorResponse>()
                .await
                .map(|e| e.error)
                .unwrap_or_default();
            bail!("{}: {}", status.as_u16(), error);
        }
        Ok(resp.json().await?)
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.send(self.client.get(self.url("/v1/sys/health"))).await
    }

    pub async fn request_signature(&self, body: &Value) -> Result<ActionView> {
        let resp: ActionResponse = self
            .send(self.client.post(self.url("/v1/signature-requests")).json(body))
            .await?;
        Ok(resp.action)
    }

    pub async fn action(&self, id: u64) -> Result<ActionView> {
        let resp: ActionResponse = self.send(self.client.get(self.url(&format!("/v1/actions/{id}")))).await?;
        Ok(resp.action)
    }

    pub async fn approve(&self, id: u64, approver: &str) -> Result<ActionView> {
        let req = self
            .client
            .post(self.url(&format!("/v1/actions/{id}/approve")))
            .json(&ApproveRequest { approver });
        let resp: ActionResponse = self.send(req).await?;
        Ok(resp.action)
    }

    pub async fn sign_request(&self, id: u64) -> Result<SignRequestView> {
        let resp: SignRequestResponse = self
            .send(self.client.get(self.url(&format!("/v1/signature-requests/{id}"))))
            .await?;
        Ok(resp.sign_request)
    }

    pub async fn balance(&self, account: &str, denom: &str) -> Result<u64> {
        let resp: BalanceResponse = self
            .send(self.client.get(self.url(&format!("/v1/balances/{account}/{denom}"))))
            .await?;
        Ok(resp.amount)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU16, Ordering};

    // Port counter to avoid conflicts between parallel tests
    static PORT_COUNTER: AtomicU16 = AtomicU16::new(18300);

    fn next_port() -> u16 {
        PORT_COUNTER.fetch_add(1, Ordering::SeqCst)
    }

    // Unsigned EIP-155 transfer on chain 1 worth 10^18 wei.
    const EIP155_TX: &str =
        "ec098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a764000080018080";
    const EIP155_SIGNING_HASH: &str = "daf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53";

    fn eth_metadata(chain_id: u64) -> Value {
        json!({
            "type_url": "/keyward.custody.v1.MetadataEthereum",
            "value": { "chain_id": chain_id },
        })
    }

    #[tokio::test]
    async fn test_server_health_in_dev_mode() {
        let server = TestServer::start(next_port()).await.unwrap();
        let client = server.client();

        let health = client.health().await.unwrap();

        assert_eq!(health.status, "ok");
        assert!(health.height >= 1);
        assert!(!health.version.is_empty());
    }

    #[tokio::test]
    async fn test_owner_request_executes_and_pays_fee() {
        let server = TestServer::start(next_port()).await.unwrap();
        let client = server.client();

        let action = client
            .request_signature(&json!({
                "creator": "alice",
                "key_id": 1,
                "input": hex::encode(b"hello keyward"),
            }))
            .await
            .unwrap();
        assert_eq!(action.status, "executed");
        assert_eq!(action.approvers, vec!["alice".to_string()]);

        let request = client.sign_request(action.sign_request_id().unwrap()).await.unwrap();
        assert_eq!(request.key_id, 1);
        assert_eq!(request.keychain_id, 1);
        assert_eq!(request.status, "pending");
        assert_eq!(request.data_for_signing, hex::encode(b"hello keyward"));

        assert_eq!(client.balance("alice", "uward").await.unwrap(), 990);
    }

    #[tokio::test]
    async fn test_ethereum_key_signs_canonical_hash() {
        let server = TestServer::start(next_port()).await.unwrap();
        let client = server.client();

        let action = client
            .request_signature(&json!({
                "creator": "alice",
                "key_id": 2,
                "input": EIP155_TX,
                "metadata": eth_metadata(1),
            }))
            .await
            .unwrap();
        let request = client.sign_request(action.sign_request_id().unwrap()).await.unwrap();
        assert_eq!(request.data_for_signing, EIP155_SIGNING_HASH);

        // A parse failure at execution rolls back the fee with everything else.
        let err = client
            .request_signature(&json!({
                "creator": "alice",
                "key_id": 2,
                "input": EIP155_TX,
                "metadata": eth_metadata(5),
            }))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("400"), "{err}");
        assert_eq!(client.balance("alice", "uward").await.unwrap(), 990);
    }

    #[tokio::test]
    async fn test_fee_charged_to_creator_on_approval() {
        let server = TestServer::start(next_port()).await.unwrap();
        let client = server.client();

        // bob is not a space owner, so the request waits for alice.
        let action = client
            .request_signature(&json!({
                "creator": "bob",
                "key_id": 1,
                "input": "00",
            }))
            .await
            .unwrap();
        assert_eq!(action.status, "pending");

        // bob cannot pay the keychain fee; the approval is rolled back.
        let err = client.approve(action.id, "alice").await.unwrap_err();
        assert!(err.to_string().starts_with("409"), "{err}");

        let action = client.action(action.id).await.unwrap();
        assert_eq!(action.status, "pending");
        assert_eq!(action.approvers, vec!["bob".to_string()]);
        assert_eq!(client.balance("alice", "uward").await.unwrap(), 1000);
    }

    #[tokio::test]
    async fn test_unapproved_request_expires() {
        let config = r#"
[ledger]
block_interval_ms = 50
default_btl = 2
"#;
        let server = TestServer::start_with_config(next_port(), config).await.unwrap();
        let client = server.client();

        let action = client
            .request_signature(&json!({
                "creator": "bob",
                "key_id": 1,
                "input": "00",
            }))
            .await
            .unwrap();
        assert_eq!(action.status, "pending");

        let mut status = action.status;
        for _ in 0..50 {
            status = client.action(action.id).await.unwrap().status;
            if status == "expired" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(status, "expired");

        let err = client.approve(action.id, "alice").await.unwrap_err();
        assert!(err.to_string().starts_with("409"), "{err}");
    }

    #[tokio::test]
    async fn test_analyzer_bindings_gate_requests() {
        let port = next_port();
        let genesis_dir = TempDir::new().unwrap();
        let genesis_path = genesis_dir.path().join("genesis.json");
        std::fs::write(
            &genesis_path,
            json!({
                "keychains": [{ "name": "kc" }],
                "intents": [
                    { "name": "small", "definition": "eth_tx.value < 1000000000000000000" },
                    { "name": "one-eth", "definition": "eth_tx.value <= 1000000000000000000 && any(1, space.owners)" }
                ],
                "spaces": [{ "owners": ["carol"] }],
                "keys": [
                    { "space_id": 1, "keychain_id": 1, "intent_id": 1, "sign_method": "ethereum",
                      "key_type": "ecdsa_secp256k1", "public_key": "02" },
                    { "space_id": 1, "keychain_id": 1, "intent_id": 2, "sign_method": "ethereum",
                      "key_type": "ecdsa_secp256k1", "public_key": "03" }
                ]
            })
            .to_string(),
        )
        .unwrap();
        let config = format!("[genesis]\npath = {:?}\n", genesis_path.display().to_string());
        let server = TestServer::start_with_config(port, &config).await.unwrap();
        let client = server.client();

        let request = |key_id: u64, analyzers: Vec<&str>| {
            json!({
                "creator": "carol",
                "key_id": key_id,
                "analyzers": analyzers,
                "input": EIP155_TX,
                "metadata": eth_metadata(1),
            })
        };

        // Without the analyzer the intent references an unbound variable.
        let err = client.request_signature(&request(1, vec![])).await.unwrap_err();
        assert!(err.to_string().starts_with("400"), "{err}");

        let action = client.request_signature(&request(1, vec!["eth_tx"])).await.unwrap();
        assert_eq!(action.status, "pending");

        let action = client.request_signature(&request(2, vec!["eth_tx"])).await.unwrap();
        assert_eq!(action.status, "executed");
        assert!(action.sign_request_id().is_some());
    }
}
