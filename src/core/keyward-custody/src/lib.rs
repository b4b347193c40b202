//! # Keyward Custody
//!
//! Authorization and execution core for signature requests.
//!
//! A signature request goes through two phases:
//!
//! 1. **Proposal** ([`CustodyService::new_signature_request`]): the key, space
//!    and keychain are resolved, the governing intent is chosen, analyzer
//!    contracts run and may bind variables or override the data to sign, and
//!    an action is submitted to the gate.
//! 2. **Execution** ([`SignRequestExecutor`]): once the intent holds, the
//!    keychain fee is charged, the input is parsed by the key's sign method
//!    into canonical data for signing, and a [`SignRequest`] is appended.
//!
//! Every call runs against one atomic storage unit supplied by the caller;
//! any error leaves the unit to be discarded.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod analyzer;
pub mod bank;
pub mod error;
pub mod executor;
pub mod message;
pub mod params;
pub mod registry;
pub mod resolver;
pub mod service;
pub mod sign_method;
pub mod types;

pub use analyzer::{
    Analyzer, AnalyzerFault, AnalyzerOutput, AnalyzerRun, AnalyzerRunner, AnalyzerSandbox, EthereumTransactionAnalyzer, GasMeter,
    NativeSandbox,
};
pub use bank::{Coin, FundsTransfer, LedgerBank};
pub use error::CustodyError;
pub use executor::SignRequestExecutor;
pub use message::{CustodyAction, CustodyMessage, CustodyResponse, MessageKind, MsgNewSignatureRequest};
pub use params::{Params, DEFAULT_FEE_DENOM};
pub use registry::Registry;
pub use resolver::IntentResolver;
pub use service::{CustodyGate, CustodyService, SignRequestFilter};
pub use sign_method::{Metadata, MetadataCosmos, MetadataEthereum, PackedMetadata, SignMethod};
pub use types::{FeeSchedule, Key, KeyType, Keychain, SignRequest, SignRequestStatus, Space};
