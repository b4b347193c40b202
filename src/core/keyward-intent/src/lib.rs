//! # Keyward Intent
//!
//! Approval policies ("intents") and the action gate that enforces them.
//!
//! ## Intent language
//!
//! ```text
//! expr    := or
//! or      := and ("||" and)*
//! and     := unary ("&&" unary)*
//! unary   := "!" unary | compare
//! compare := primary (("<" | "<=" | ">" | ">=" | "==" | "!=") primary)?
//! primary := INT | STRING | "true" | "false" | list | call | ident | "(" expr ")"
//! call    := "all" "(" expr ")" | "any" "(" expr "," expr ")"
//! ident   := NAME ("." NAME)*
//! ```
//!
//! `all(list)` holds when every element of `list` has approved the action;
//! `any(n, list)` holds when at least `n` have. Identifiers resolve against a
//! [`BindingEnv`]: first the well-known attributes (`creator`, `space.owners`,
//! `approvers`, ...) and then `<contract>.<variable>` bindings produced by
//! analyzers.
//!
//! ## Actions
//!
//! An [`Action`] wraps a payload that only executes once its intent is
//! satisfied. The [`ActionGate`] stores actions, tracks approvals, expires
//! stale actions at block end and dispatches ready actions to the handler
//! registered for the payload kind.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod action;
pub mod env;
pub mod error;
pub mod eval;
pub mod expr;
pub mod gate;
pub mod intent;
pub mod parser;

pub use action::{Action, ActionFilter, ActionPayload, ActionStatus};
pub use env::{BindingEnv, APPROVERS};
pub use error::IntentError;
pub use expr::{CmpOp, Expr, Value};
pub use gate::{ActionGate, ActionHandler, GateConfig, HandlerTable};
pub use intent::{generated_intent_id, Intent, IntentStore, GENERATED_INTENT_ID_FLAG};
pub use parser::parse;
