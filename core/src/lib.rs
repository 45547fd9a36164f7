//! Host promise machinery and the foreign-value bridge for Causeway.
//!
//! The host side is a single-threaded cooperative scheduler
//! ([`EventLoop`]) driving a promise state machine ([`Promise`]) whose
//! `resolve` step adopts any future-shaped value it is handed (thenable
//! assimilation). The bridge ([`Bridge`]) sits between that machinery and
//! dynamically-typed foreign code, and preserves two guarantees the host
//! does not give on its own:
//!
//! - a foreign value that merely *looks like* a future is never silently
//!   flattened away during resolution (the wrap/unwrap protocol), and
//! - an exception raised by foreign callback code inside a continuation is
//!   reported through an injected [`FaultReporter`] and contained as a
//!   permanently-pending promise instead of crashing the loop or leaking
//!   into the unhandled-rejection channel.
//!
//! # Example
//!
//! ```
//! use causeway_core::{Bridge, EventLoop, PromiseState};
//! use causeway_types::{Fault, ForeignFn, Value};
//!
//! let driver = EventLoop::new();
//! let bridge = Bridge::new(&driver);
//!
//! let five = bridge.construct(|succeed, _fail| {
//!     succeed.invoke(Value::from(5));
//!     Ok(())
//! });
//! let six = bridge.then(
//!     &five,
//!     &ForeignFn::unary(|v| {
//!         let n = v.as_number().ok_or_else(|| Fault::message("not a number"))?;
//!         Ok(Value::from(n + 1.0))
//!     }),
//! );
//!
//! driver.run_until_idle().unwrap();
//! assert_eq!(six.state(), PromiseState::Fulfilled(Value::from(6)));
//! ```

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

pub mod bridge;
pub mod event_loop;
pub mod promise;
pub mod reporter;

mod error;

pub use bridge::{Bridge, Rejecter, Resolver, is_future, unwrap, wrap};
pub use error::LoopError;
pub use event_loop::EventLoop;
pub use promise::{Promise, PromiseState, Settle};
pub use reporter::{CollectingReporter, ConsoleReporter, FaultReporter, UNHANDLED_FAULT_MESSAGE};
