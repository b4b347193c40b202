//! Balances and fee transfers.

use async_trait::async_trait;
use keyward_storage::{StorageBackend, StorageError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CustodyError;

/// An amount of one denomination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    /// Denomination, e.g. `uward`.
    pub denom: String,
    /// Amount in the smallest unit.
    pub amount: u64,
}

impl Coin {
    /// Builds a coin.
    pub fn new(denom: impl Into<String>, amount: u64) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }
}

/// Moves funds between accounts within the caller's atomic unit.
#[async_trait]
pub trait FundsTransfer: Send + Sync {
    /// Transfers `coin` from `from` to `to`.
    ///
    /// Fails with [`CustodyError::InsufficientFunds`] without moving anything
    /// when `from` cannot cover the amount.
    async fn send(&self, store: &dyn StorageBackend, from: &str, to: &str, coin: &Coin) -> Result<(), CustodyError>;
}

/// Balance ledger kept in the node's own storage.
///
/// Layout: `bank/balances/<account>/<denom>` holds a big-endian `u64`.
#[derive(Debug, Default, Clone)]
pub struct LedgerBank;

impl LedgerBank {
    /// Creates the ledger.
    pub fn new() -> Self {
        Self
    }

    fn key(account: &str, denom: &str) -> Result<String, CustodyError> {
        if account.is_empty() || account.contains('/') || denom.is_empty() || denom.contains('/') {
            return Err(CustodyError::InvalidRequest(format!(
                "invalid account or denom: {account:?} {denom:?}"
            )));
        }
        Ok(format!("bank/balances/{account}/{denom}"))
    }

    /// Current balance of `account` in `denom`.
    pub async fn balance(&self, store: &dyn StorageBackend, account: &str, denom: &str) -> Result<u64, CustodyError> {
        let key = Self::key(account, denom)?;
        match store.get(&key).await? {
            None => Ok(0),
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| StorageError::Serialization(format!("corrupt balance at {key}")))?;
                Ok(u64::from_be_bytes(raw))
            },
        }
    }

    async fn set_balance(
        &self,
        store: &dyn StorageBackend,
        account: &str,
        denom: &str,
        amount: u64,
    ) -> Result<(), CustodyError> {
        let key = Self::key(account, denom)?;
        if amount == 0 {
            store.delete(&key).await?;
        } else {
            store.put(&key, &amount.to_be_bytes()).await?;
        }
        Ok(())
    }

    /// Credits `coin` to `account` (genesis and tests).
    pub async fn mint(&self, store: &dyn StorageBackend, account: &str, coin: &Coin) -> Result<u64, CustodyError> {
        let balance = self
            .balance(store, account, &coin.denom)
            .await?
            .checked_add(coin.amount)
            .ok_or_else(|| CustodyError::InvalidRequest(format!("balance overflow for {account}")))?;
        self.set_balance(store, account, &coin.denom, balance).await?;
        Ok(balance)
    }
}

#[async_trait]
impl FundsTransfer for LedgerBank {
    async fn send(&self, store: &dyn StorageBackend, from: &str, to: &str, coin: &Coin) -> Result<(), CustodyError> {
        let available = self.balance(store, from, &coin.denom).await?;
        if available < coin.amount {
            return Err(CustodyError::InsufficientFunds {
                account: from.to_string(),
                denom: coin.denom.clone(),
                available,
                required: coin.amount,
            });
        }
        if from == to || coin.amount == 0 {
            return Ok(());
        }

        self.set_balance(store, from, &coin.denom, available - coin.amount).await?;
        self.mint(store, to, coin).await?;
        debug!(from, to, denom = %coin.denom, amount = coin.amount, "Funds transferred");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use keyward_storage::MemoryBackend;

    use super::*;

    #[tokio::test]
    async fn test_send_moves_funds() {
        let store = MemoryBackend::new();
        let bank = LedgerBank::new();
        bank.mint(&store, "alice", &Coin::new("uward", 10)).await.unwrap();

        bank.send(&store, "alice", "kc", &Coin::new("uward", 4)).await.unwrap();
        assert_eq!(bank.balance(&store, "alice", "uward").await.unwrap(), 6);
        assert_eq!(bank.balance(&store, "kc", "uward").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_insufficient_funds_moves_nothing() {
        let store = MemoryBackend::new();
        let bank = LedgerBank::new();
        bank.mint(&store, "alice", &Coin::new("uward", 5)).await.unwrap();

        let err = bank.send(&store, "alice", "kc", &Coin::new("uward", 10)).await.unwrap_err();
        assert!(matches!(err, CustodyError::InsufficientFunds { available: 5, required: 10, .. }));
        assert_eq!(bank.balance(&store, "alice", "uward").await.unwrap(), 5);
        assert_eq!(bank.balance(&store, "kc", "uward").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_spending_everything_clears_the_entry() {
        let store = MemoryBackend::new();
        let bank = LedgerBank::new();
        bank.mint(&store, "alice", &Coin::new("uward", 10)).await.unwrap();
        bank.send(&store, "alice", "kc", &Coin::new("uward", 10)).await.unwrap();
        assert_eq!(bank.balance(&store, "alice", "uward").await.unwrap(), 0);
        assert!(store.get("bank/balances/alice/uward").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_path_characters() {
        let store = MemoryBackend::new();
        let bank = LedgerBank::new();
        assert!(bank.balance(&store, "a/b", "uward").await.is_err());
    }
}
