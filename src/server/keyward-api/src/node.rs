//! Serial ledger host.
//!
//! The node owns committed state and the block height. Writes are serialized
//! through one lock; each runs inside its own [`BufferedBackend`] and is
//! committed only when the operation succeeds. Reads go straight to
//! committed state.

use std::sync::Arc;

use keyward_custody::{CustodyAction, CustodyError, CustodyService, MsgNewSignatureRequest};
use keyward_storage::{BufferedBackend, StorageBackend, StorageError};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const HEIGHT_KEY: &str = "node/height";

/// Ledger node hosting the custody module.
pub struct Node {
    backend: Arc<dyn StorageBackend>,
    service: CustodyService,
    // Held for the whole of every write; guards the current height.
    height: Mutex<u64>,
}

impl Node {
    /// Opens a node over `backend`, resuming at the persisted height.
    pub async fn open(backend: Arc<dyn StorageBackend>, service: CustodyService) -> Result<Self, StorageError> {
        let height = match backend.get(HEIGHT_KEY).await? {
            Some(bytes) => decode_height(&bytes)?,
            None => 1,
        };
        info!(height, "Ledger node opened");

        Ok(Self {
            backend,
            service,
            height: Mutex::new(height),
        })
    }

    /// The hosted custody module.
    pub fn service(&self) -> &CustodyService {
        &self.service
    }

    /// Committed state.
    pub fn store(&self) -> &dyn StorageBackend {
        self.backend.as_ref()
    }

    /// Current block height.
    pub async fn height(&self) -> u64 {
        *self.height.lock().await
    }

    /// Proposes a signature request at the current height.
    pub async fn new_signature_request(&self, msg: MsgNewSignatureRequest) -> Result<CustodyAction, CustodyError> {
        let height = self.height.lock().await;
        let unit = BufferedBackend::new(self.backend.as_ref());
        let result = self.service.new_signature_request(&unit, msg, *height).await;
        finish(unit, "new_signature_request", result).await
    }

    /// Approves an action at the current height.
    pub async fn approve_action(&self, id: u64, approver: &str) -> Result<CustodyAction, CustodyError> {
        let height = self.height.lock().await;
        let unit = BufferedBackend::new(self.backend.as_ref());
        let result = self.service.approve_action(&unit, id, approver, *height).await;
        finish(unit, "approve_action", result).await
    }

    /// Rejects a pending action.
    pub async fn reject_action(
        &self,
        id: u64,
        caller: &str,
        reason: Option<String>,
    ) -> Result<CustodyAction, CustodyError> {
        let _height = self.height.lock().await;
        let unit = BufferedBackend::new(self.backend.as_ref());
        let result = self.service.reject_action(&unit, id, caller, reason).await;
        finish(unit, "reject_action", result).await
    }

    /// Moves to the next block and runs the block-end hook.
    ///
    /// The height only advances when the hook's unit commits.
    pub async fn advance_block(&self) -> Result<u64, CustodyError> {
        let mut height = self.height.lock().await;
        let next = *height + 1;

        let unit = BufferedBackend::new(self.backend.as_ref());
        let result = async {
            let expired = self.service.end_block(&unit, next).await?;
            unit.put(HEIGHT_KEY, &next.to_be_bytes()).await?;
            Ok::<_, CustodyError>(expired)
        }
        .await;
        let expired = finish(unit, "end_block", result).await?;

        *height = next;
        if !expired.is_empty() {
            info!(height = next, expired = expired.len(), "Block ended");
        }
        Ok(next)
    }
}

async fn finish<T>(
    unit: BufferedBackend<'_>,
    op: &'static str,
    result: Result<T, CustodyError>,
) -> Result<T, CustodyError> {
    match result {
        Ok(value) => {
            let writes = unit.commit().await?;
            debug!(op, writes, "Unit committed");
            Ok(value)
        },
        Err(err) => {
            unit.discard();
            warn!(op, error = %err, "Unit discarded");
            Err(err)
        },
    }
}

fn decode_height(bytes: &[u8]) -> Result<u64, StorageError> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StorageError::Serialization("corrupt block height".into()))?;
    Ok(u64::from_be_bytes(raw))
}
