//! Foreign value model for Causeway.
//!
//! This crate contains the dynamically-typed value representation that
//! foreign script code manipulates, with no IO, no async, and minimal
//! dependencies. Everything here can be used from any layer of the bridge.
//!
//! The host promise machinery lives in `causeway-core`; this crate only
//! knows that *some* values are future-shaped, a classification it computes
//! structurally via [`Value::then_capability`].

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod convert;
mod fault;
mod value;

pub use fault::Fault;
pub use value::{CHAIN_MEMBER, ForeignFn, Value};
