//! # Keyward API
//!
//! Hosts the custody module behind a serial ledger [`Node`] and exposes it
//! over a REST API.
//!
//! Every write is applied as one atomic unit at the node's current block
//! height; a failed write leaves no trace in committed state.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod node;
pub mod routes;

pub use error::ApiError;
pub use node::Node;
pub use routes::router;
