//! Analyzer contracts.
//!
//! An analyzer inspects a request before it is submitted. It may bind
//! variables that the intent can test (`<contract>.<variable>`) and may
//! replace the data to be signed. At most one analyzer per request may do the
//! latter.

mod evm;
mod native;

use std::collections::BTreeMap;

use async_trait::async_trait;
use keyward_intent::{BindingEnv, Value};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CustodyError;

pub use evm::EthereumTransactionAnalyzer;
pub use native::{Analyzer, AnalyzerFault, GasMeter, NativeSandbox, BASE_CALL_GAS, GAS_PER_INPUT_BYTE};

/// What one analyzer call produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerOutput {
    /// Replacement input, if the analyzer rewrites the request.
    #[serde(default)]
    pub data_for_signing: Option<Vec<u8>>,
    /// Variables bound under the contract's scope.
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
}

/// Executes analyzer contracts in isolation with bounded resources.
#[async_trait]
pub trait AnalyzerSandbox: Send + Sync {
    /// Runs `contract` on behalf of `caller` over `input`.
    ///
    /// Failures, including resource exhaustion, are
    /// [`CustodyError::AnalyzerExecution`].
    async fn run(&self, contract: &str, caller: &str, input: &[u8]) -> Result<AnalyzerOutput, CustodyError>;
}

/// Combined result of running every analyzer of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyzerRun {
    /// Per-contract variable scopes.
    pub env: BindingEnv,
    /// The single override, if any analyzer produced one.
    pub data_for_signing: Option<Vec<u8>>,
}

/// Runs a request's analyzers in order and merges their output.
pub struct AnalyzerRunner<'a> {
    sandbox: &'a dyn AnalyzerSandbox,
}

impl<'a> AnalyzerRunner<'a> {
    /// Creates a runner over `sandbox`.
    pub fn new(sandbox: &'a dyn AnalyzerSandbox) -> Self {
        Self { sandbox }
    }

    /// Runs every contract in `contracts` over `input`.
    ///
    /// Each contract's variables land in its own scope. A contract listed
    /// twice keeps the variables of its first run. A second override fails
    /// the whole run and nothing is returned.
    pub async fn execute(&self, creator: &str, contracts: &[String], input: &[u8]) -> Result<AnalyzerRun, CustodyError> {
        let mut run = AnalyzerRun::default();
        let mut override_from: Option<&str> = None;

        for contract in contracts {
            let output = self.sandbox.run(contract, creator, input).await?;
            debug!(
                contract = %contract,
                variables = output.variables.len(),
                overrides = output.data_for_signing.is_some(),
                "Analyzer finished"
            );

            if let Some(data) = output.data_for_signing {
                if let Some(previous) = override_from {
                    return Err(CustodyError::MultipleOverride {
                        previous: previous.to_string(),
                        contract: contract.clone(),
                    });
                }
                override_from = Some(contract);
                run.data_for_signing = Some(data);
            }
            run.env.bind_analyzer(contract.clone(), output.variables);
        }

        Ok(run)
    }
}
