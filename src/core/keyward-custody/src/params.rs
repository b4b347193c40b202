//! Custody module parameters.

use serde::{Deserialize, Serialize};

/// Default fee denomination.
pub const DEFAULT_FEE_DENOM: &str = "uward";

/// Tunables passed to [`CustodyService`](crate::CustodyService) at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Denomination in which keychain fees are charged.
    pub fee_denom: String,
    /// Blocks-to-live for requests submitted with `btl = 0`.
    pub default_btl: u64,
    /// Gas budget of a single analyzer call.
    pub analyzer_gas_limit: u64,
    /// Address allowed to reject any pending action.
    pub authority: Option<String>,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            fee_denom: DEFAULT_FEE_DENOM.to_string(),
            default_btl: 1000,
            analyzer_gas_limit: 1_000_000,
            authority: None,
        }
    }
}
