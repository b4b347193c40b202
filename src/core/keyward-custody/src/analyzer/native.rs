//! In-process analyzer host with gas metering.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use super::{AnalyzerOutput, AnalyzerSandbox};
use crate::error::CustodyError;

/// Gas charged for entering any analyzer.
pub const BASE_CALL_GAS: u64 = 1_000;

/// Gas charged per byte of request input.
pub const GAS_PER_INPUT_BYTE: u64 = 10;

/// Why an analyzer did not produce output.
#[derive(Debug, Error)]
pub enum AnalyzerFault {
    /// Budget exhausted.
    #[error("out of gas: needed {needed}, {remaining} remaining of {limit}")]
    OutOfGas {
        /// Gas requested by the failing charge.
        needed: u64,
        /// Gas left before the charge.
        remaining: u64,
        /// Total budget.
        limit: u64,
    },

    /// The analyzer rejected its input.
    #[error("{0}")]
    Failed(String),
}

/// Tracks gas spent by one analyzer call.
#[derive(Debug)]
pub struct GasMeter {
    limit: u64,
    used: u64,
}

impl GasMeter {
    /// New meter with `limit` gas available.
    pub fn new(limit: u64) -> Self {
        Self { limit, used: 0 }
    }

    /// Consumes `amount`, failing once the budget would be exceeded.
    pub fn charge(&mut self, amount: u64) -> Result<(), AnalyzerFault> {
        let remaining = self.remaining();
        if amount > remaining {
            self.used = self.limit;
            return Err(AnalyzerFault::OutOfGas {
                needed: amount,
                remaining,
                limit: self.limit,
            });
        }
        self.used = self.used.saturating_add(amount);
        Ok(())
    }

    /// Gas spent so far.
    pub fn used(&self) -> u64 {
        self.used
    }

    /// Gas still available.
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.used)
    }
}

/// An analyzer compiled into the node.
pub trait Analyzer: Send + Sync {
    /// Inspects `input`, charging `gas` for its work.
    fn analyze(&self, caller: &str, input: &[u8], gas: &mut GasMeter) -> Result<AnalyzerOutput, AnalyzerFault>;
}

/// Sandbox hosting native analyzers by contract address.
#[derive(Clone)]
pub struct NativeSandbox {
    contracts: HashMap<String, Arc<dyn Analyzer>>,
    gas_limit: u64,
}

impl NativeSandbox {
    /// Empty sandbox granting each call `gas_limit` gas.
    pub fn new(gas_limit: u64) -> Self {
        Self {
            contracts: HashMap::new(),
            gas_limit,
        }
    }

    /// Deploys `analyzer` at `contract`.
    pub fn with_contract(mut self, contract: impl Into<String>, analyzer: Arc<dyn Analyzer>) -> Self {
        self.contracts.insert(contract.into(), analyzer);
        self
    }

    /// Deployed contract addresses, sorted.
    pub fn contracts(&self) -> Vec<String> {
        let mut out: Vec<String> = self.contracts.keys().cloned().collect();
        out.sort();
        out
    }
}

#[async_trait]
impl AnalyzerSandbox for NativeSandbox {
    async fn run(&self, contract: &str, caller: &str, input: &[u8]) -> Result<AnalyzerOutput, CustodyError> {
        let fault = |reason: String| CustodyError::AnalyzerExecution {
            contract: contract.to_string(),
            reason,
        };

        let analyzer = self
            .contracts
            .get(contract)
            .ok_or_else(|| fault("no analyzer deployed at this address".into()))?;

        let mut gas = GasMeter::new(self.gas_limit);
        let entry = (input.len() as u64)
            .saturating_mul(GAS_PER_INPUT_BYTE)
            .saturating_add(BASE_CALL_GAS);
        gas.charge(entry).map_err(|e| fault(e.to_string()))?;

        let output = analyzer
            .analyze(caller, input, &mut gas)
            .map_err(|e| fault(e.to_string()))?;
        debug!(contract, gas_used = gas.used(), "Native analyzer ran");
        Ok(output)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use std::collections::BTreeMap;

    use keyward_intent::Value;

    use super::*;

    struct Echo;

    impl Analyzer for Echo {
        fn analyze(&self, caller: &str, input: &[u8], _gas: &mut GasMeter) -> Result<AnalyzerOutput, AnalyzerFault> {
            Ok(AnalyzerOutput {
                data_for_signing: None,
                variables: BTreeMap::from([
                    ("caller".to_string(), Value::Str(caller.to_string())),
                    ("len".to_string(), Value::Int(input.len() as i64)),
                ]),
            })
        }
    }

    struct Spin;

    impl Analyzer for Spin {
        fn analyze(&self, _caller: &str, _input: &[u8], gas: &mut GasMeter) -> Result<AnalyzerOutput, AnalyzerFault> {
            loop {
                gas.charge(100)?;
            }
        }
    }

    #[test]
    fn test_gas_meter() {
        let mut gas = GasMeter::new(10);
        gas.charge(4).unwrap();
        assert_eq!(gas.remaining(), 6);
        assert!(matches!(gas.charge(7), Err(AnalyzerFault::OutOfGas { needed: 7, remaining: 6, .. })));
        assert_eq!(gas.remaining(), 0);
    }

    #[tokio::test]
    async fn test_runs_deployed_contract() {
        let sandbox = NativeSandbox::new(100_000).with_contract("echo", Arc::new(Echo));
        let out = sandbox.run("echo", "alice", b"abc").await.unwrap();
        assert_eq!(out.variables["caller"], Value::Str("alice".into()));
        assert_eq!(out.variables["len"], Value::Int(3));
        assert_eq!(sandbox.contracts(), vec!["echo".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_contract() {
        let sandbox = NativeSandbox::new(100_000);
        let err = sandbox.run("nobody", "alice", b"").await.unwrap_err();
        assert!(matches!(err, CustodyError::AnalyzerExecution { .. }));
    }

    #[tokio::test]
    async fn test_runaway_analyzer_is_bounded() {
        let sandbox = NativeSandbox::new(50_000).with_contract("spin", Arc::new(Spin));
        let err = sandbox.run("spin", "alice", b"x").await.unwrap_err();
        match err {
            CustodyError::AnalyzerExecution { contract, reason } => {
                assert_eq!(contract, "spin");
                assert!(reason.contains("out of gas"));
            },
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_large_input_exhausts_entry_charge() {
        let sandbox = NativeSandbox::new(BASE_CALL_GAS + 5 * GAS_PER_INPUT_BYTE).with_contract("echo", Arc::new(Echo));
        assert!(sandbox.run("echo", "alice", &[0u8; 5]).await.is_ok());
        assert!(sandbox.run("echo", "alice", &[0u8; 6]).await.is_err());
    }
}
