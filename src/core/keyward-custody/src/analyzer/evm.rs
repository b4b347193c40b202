//! Built-in analyzer for Ethereum transactions.

use std::collections::BTreeMap;

use keyward_intent::Value;

use super::native::{Analyzer, AnalyzerFault, GasMeter};
use super::AnalyzerOutput;
use crate::sign_method::EthereumTransaction;

/// Gas charged for decoding a transaction.
const DECODE_GAS: u64 = 5_000;

/// Decodes the request input as an unsigned Ethereum transaction and binds
/// `to`, `value`, `nonce` and `chain_id`.
///
/// `to` is the `0x`-prefixed recipient or `""` for contract creation.
/// `value` is only bound when it fits an `i64`; `chain_id` only when the
/// encoding carries one.
#[derive(Debug, Default, Clone, Copy)]
pub struct EthereumTransactionAnalyzer;

impl Analyzer for EthereumTransactionAnalyzer {
    fn analyze(&self, _caller: &str, input: &[u8], gas: &mut GasMeter) -> Result<AnalyzerOutput, AnalyzerFault> {
        gas.charge(DECODE_GAS)?;
        let tx = EthereumTransaction::decode(input).map_err(|e| AnalyzerFault::Failed(e.to_string()))?;

        let mut variables = BTreeMap::new();
        let to = tx.to().map(|a| format!("0x{}", hex::encode(a))).unwrap_or_default();
        variables.insert("to".to_string(), Value::Str(to));
        if let Ok(value) = i64::try_from(tx.value()) {
            variables.insert("value".to_string(), Value::Int(value));
        }
        if let Ok(nonce) = i64::try_from(tx.nonce()) {
            variables.insert("nonce".to_string(), Value::Int(nonce));
        }
        if let Some(chain_id) = tx.chain_id().and_then(|c| i64::try_from(c).ok()) {
            variables.insert("chain_id".to_string(), Value::Int(chain_id));
        }

        Ok(AnalyzerOutput {
            data_for_signing: None,
            variables,
        })
    }
}
