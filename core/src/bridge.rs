//! The foreign-value bridge: classification, the wrap/unwrap protocol,
//! promise constructors, and the guarded combinators.
//!
//! Two value models meet here. The host's `resolve` adopts anything
//! future-shaped; foreign code has no future type at all and recognizes
//! futures only by shape. The bridge keeps both honest:
//!
//! - every constructor passes success payloads through [`wrap`] before
//!   they reach the host's success slot, so a future-shaped payload rides
//!   through resolution as inert data instead of being adopted away;
//! - every combinator passes the settled payload through [`unwrap`]
//!   immediately before handing it to foreign code, so foreign code never
//!   sees the wrapper;
//! - a fault raised by a foreign continuation is reported through the
//!   injected [`FaultReporter`] and the chain continues as a promise that
//!   never settles, so the fault neither crashes the loop nor leaks into
//!   the host's unhandled-rejection channel.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use causeway_types::{Fault, ForeignFn, Value};

use crate::event_loop::EventLoop;
use crate::promise::{Handler, Promise, Settle};
use crate::reporter::{ConsoleReporter, FaultReporter};

/// True iff the value structurally exposes a callable `then` member.
///
/// The single classification predicate; total over all values, false for
/// `Null`, `Undefined`, every primitive, and carried wrappers.
#[must_use]
pub fn is_future(value: &Value) -> bool {
    value.then_capability().is_some()
}

/// Tag a future-shaped value as data; anything else passes through.
///
/// A carried wrapper exposes no members, so `wrap` applied to its own
/// output is the identity - no double wrapping can occur.
#[must_use]
pub fn wrap(value: Value) -> Value {
    if is_future(&value) {
        Value::Carried(Box::new(value))
    } else {
        value
    }
}

/// Remove the carry tag; anything else passes through.
/// `unwrap(wrap(x))` is `x` for every `x`.
#[must_use]
pub fn unwrap(value: Value) -> Value {
    match value {
        Value::Carried(inner) => *inner,
        other => other,
    }
}

/// The success continuation handed to `construct` setup code. Wraps
/// before resolving, so the host never adopts the payload.
#[derive(Clone)]
pub struct Resolver {
    settle: Settle,
}

impl Resolver {
    /// Fulfill the promise with `value` (wrapped if future-shaped).
    pub fn invoke(&self, value: Value) {
        self.settle.resolve(wrap(value));
    }

    /// The continuation as a foreign callable.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::function(move |value| {
            self.invoke(value);
            Ok(Value::Undefined)
        })
    }
}

/// The failure continuation handed to `construct` setup code. Passes the
/// reason straight to the host's rejection path, unmodified.
#[derive(Clone)]
pub struct Rejecter {
    settle: Settle,
}

impl Rejecter {
    /// Reject the promise with `reason`, untouched.
    pub fn invoke(&self, reason: Value) {
        self.settle.reject(reason);
    }

    /// The continuation as a foreign callable.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::function(move |reason| {
            self.invoke(reason);
            Ok(Value::Undefined)
        })
    }
}

/// The bridge surface: an event loop handle plus the injected fault
/// reporter shared by every guarded combinator.
pub struct Bridge {
    driver: EventLoop,
    reporter: Rc<dyn FaultReporter>,
}

impl Bridge {
    /// A bridge reporting contained faults to stderr.
    #[must_use]
    pub fn new(driver: &EventLoop) -> Self {
        Self::with_reporter(driver, Rc::new(ConsoleReporter))
    }

    /// A bridge with an injected reporter (tests use
    /// [`crate::reporter::CollectingReporter`]).
    #[must_use]
    pub fn with_reporter(driver: &EventLoop, reporter: Rc<dyn FaultReporter>) -> Self {
        Self {
            driver: driver.clone(),
            reporter,
        }
    }

    /// Build a promise from setup code given a success and a failure
    /// continuation. Success payloads are wrapped; failure reasons pass
    /// through. A fault raised by the setup itself rejects the promise,
    /// unless it already settled.
    pub fn construct<F>(&self, setup: F) -> Promise
    where
        F: FnOnce(Resolver, Rejecter) -> Result<(), Fault>,
    {
        let (promise, settle) = Promise::new(&self.driver);
        let resolver = Resolver {
            settle: settle.clone(),
        };
        let rejecter = Rejecter { settle };
        if let Err(fault) = setup(resolver, rejecter.clone()) {
            rejecter.invoke(fault.into_payload());
        }
        promise
    }

    /// [`Bridge::construct`] for a setup callback that is itself foreign
    /// code: it receives the two continuations as callable values.
    pub fn construct_foreign(&self, setup: &ForeignFn) -> Promise {
        self.construct(|resolver, rejecter| {
            setup
                .call(&[resolver.into_value(), rejecter.into_value()])
                .map(|_| ())
        })
    }

    /// An already-fulfilled promise whose payload is `wrap(value)`.
    ///
    /// Unlike the host's native resolve, this never flattens: a
    /// future-shaped `value` survives as data and is handed back intact
    /// by the next combinator.
    pub fn resolve_now(&self, value: Value) -> Promise {
        let (promise, settle) = Promise::new(&self.driver);
        settle.resolve(wrap(value));
        promise
    }

    /// A promise fulfilling with no payload (`Undefined`) once `ms`
    /// milliseconds have elapsed. Zero and negative durations fire on the
    /// next scheduling opportunity. No wrapping is involved.
    pub fn delay(&self, ms: i64) -> Promise {
        let (promise, settle) = Promise::new(&self.driver);
        let delay = Duration::from_millis(ms.max(0) as u64);
        self.driver
            .schedule_timer(delay, move || settle.resolve(Value::Undefined));
        promise
    }

    /// Attach `on_success` to the success path only. The payload is
    /// unwrapped before delivery; a fault from the callback is contained
    /// (reported once, chain continues as pending-forever). Rejections of
    /// `promise` are not intercepted and surface through the host's
    /// unhandled-rejection channel if nothing downstream observes them.
    pub fn then(&self, promise: &Promise, on_success: &ForeignFn) -> Promise {
        promise.then_raw(Some(self.guarded(on_success, true)), None)
    }

    /// Attach both paths. The failure handler receives the raw rejection
    /// reason (rejections are never wrapped) and is guarded like
    /// [`Bridge::then`]'s success handler.
    ///
    /// The success handler unwraps but is deliberately *not* guarded: a
    /// fault there rejects the derived promise natively and surfaces
    /// through the host's unhandled-rejection diagnostics, not the
    /// reporter. The asymmetry with `then` and `catch` is a preserved
    /// contract, not an accident of this implementation.
    pub fn then_or_catch(
        &self,
        promise: &Promise,
        on_success: &ForeignFn,
        on_failure: &ForeignFn,
    ) -> Promise {
        let on_success = on_success.clone();
        let success: Handler = Box::new(move |payload| on_success.call(&[unwrap(payload)]));
        promise.then_raw(Some(success), Some(self.guarded(on_failure, false)))
    }

    /// Attach `on_failure` to the failure path only, guarded. The handler
    /// receives the raw rejection reason with no unwrap. Fulfillment
    /// passes through to the derived promise unchanged.
    pub fn catch(&self, promise: &Promise, on_failure: &ForeignFn) -> Promise {
        promise.then_raw(None, Some(self.guarded(on_failure, false)))
    }

    /// Fulfills with a list of every input's unwrapped payload, in input
    /// order, once all fulfill; rejects with the first rejection. An
    /// empty input fulfills immediately with an empty list.
    ///
    /// Payloads are unwrapped into the list so foreign code receives the
    /// carried futures themselves, never the wrapper.
    pub fn all(&self, promises: &[Promise]) -> Promise {
        let (result, settle) = Promise::new(&self.driver);
        let count = promises.len();
        if count == 0 {
            settle.resolve(Value::list([]));
            return result;
        }
        let slots = Rc::new(RefCell::new(vec![Value::Undefined; count]));
        let remaining = Rc::new(Cell::new(count));
        for (index, promise) in promises.iter().enumerate() {
            let on_ok: Handler = {
                let slots = Rc::clone(&slots);
                let remaining = Rc::clone(&remaining);
                let settle = settle.clone();
                Box::new(move |payload| {
                    slots.borrow_mut()[index] = unwrap(payload);
                    remaining.set(remaining.get() - 1);
                    if remaining.get() == 0 {
                        settle.resolve(Value::list(slots.borrow_mut().drain(..)));
                    }
                    Ok(Value::Undefined)
                })
            };
            let on_err: Handler = {
                let settle = settle.clone();
                Box::new(move |reason| {
                    settle.reject(reason);
                    Ok(Value::Undefined)
                })
            };
            promise.then_raw(Some(on_ok), Some(on_err));
        }
        result
    }

    /// Settles like the first input to settle. The winning payload passes
    /// through still wrapped; the next combinator's unwrap delivers it.
    /// An empty input stays pending forever.
    pub fn race(&self, promises: &[Promise]) -> Promise {
        let (result, settle) = Promise::new(&self.driver);
        for promise in promises {
            let on_ok: Handler = {
                let settle = settle.clone();
                Box::new(move |payload| {
                    settle.resolve(payload);
                    Ok(Value::Undefined)
                })
            };
            let on_err: Handler = {
                let settle = settle.clone();
                Box::new(move |reason| {
                    settle.reject(reason);
                    Ok(Value::Undefined)
                })
            };
            promise.then_raw(Some(on_ok), Some(on_err));
        }
        result
    }

    /// A guarded continuation: unwraps the argument if asked, invokes the
    /// foreign callback, and on fault reports once and returns a promise
    /// that never settles, which the derived promise adopts - the chain
    /// goes quiet instead of rejecting.
    fn guarded(&self, callback: &ForeignFn, unwrap_payload: bool) -> Handler {
        let callback = callback.clone();
        let reporter = Rc::clone(&self.reporter);
        let driver = self.driver.clone();
        Box::new(move |payload| {
            let argument = if unwrap_payload {
                unwrap(payload)
            } else {
                payload
            };
            match callback.call(&[argument]) {
                Ok(result) => Ok(result),
                Err(fault) => {
                    reporter.report(&fault);
                    Ok(Promise::forever(&driver).to_value())
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thenable() -> Value {
        Value::record([("then", Value::function(|v| Ok(v)))])
    }

    #[test]
    fn classification_is_structural() {
        assert!(is_future(&thenable()));

        let driver = EventLoop::new();
        assert!(is_future(&Promise::forever(&driver).to_value()));

        assert!(!is_future(&Value::Undefined));
        assert!(!is_future(&Value::Null));
        assert!(!is_future(&Value::from(42)));
        assert!(!is_future(&Value::text("then")));
        assert!(!is_future(&Value::record([])));
        assert!(!is_future(&Value::record([("then", Value::from(1))])));
        assert!(!is_future(&Value::function(|v| Ok(v))));
    }

    #[test]
    fn wrap_is_identity_for_plain_values() {
        for plain in [
            Value::Undefined,
            Value::Null,
            Value::from(1.5),
            Value::text("x"),
            Value::record([("a", Value::from(1))]),
        ] {
            let wrapped = wrap(plain.clone());
            assert!(wrapped.same_ref(&plain) || wrapped == plain);
            assert_eq!(unwrap(wrapped), plain);
        }
    }

    #[test]
    fn wrap_tags_future_shaped_values_and_unwrap_restores_them() {
        let shaped = thenable();
        let wrapped = wrap(shaped.clone());
        assert!(matches!(wrapped, Value::Carried(_)));
        assert!(!is_future(&wrapped));
        assert!(unwrap(wrapped).same_ref(&shaped));
    }

    #[test]
    fn wrap_never_double_wraps() {
        let once = wrap(thenable());
        let twice = wrap(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn unwrap_is_identity_for_unwrapped_values() {
        let shaped = thenable();
        assert!(unwrap(shaped.clone()).same_ref(&shaped));
        assert_eq!(unwrap(Value::from(7)), Value::from(7));
    }
}
