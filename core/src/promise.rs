//! The host promise state machine.
//!
//! `pending -> fulfilled(value)` or `pending -> rejected(reason)`,
//! terminal either way. Reactions are scheduled on the event loop's
//! microtask queue, never run inline, so a continuation always observes
//! its promise after settlement and continuations on one promise run in
//! attachment order.
//!
//! The important subtlety is in [`Settle::resolve`]: handing it a
//! future-shaped value does not fulfill the promise with that value, it
//! *adopts* the value's eventual state by calling its `then` capability.
//! This is the host's native auto-flattening; the bridge neutralizes it
//! for payloads that must survive as data by wrapping them first (see
//! [`crate::bridge::wrap`]).

use std::cell::{Cell, RefCell};
use std::mem;
use std::rc::Rc;

use causeway_types::{CHAIN_MEMBER, Fault, ForeignFn, Value};

use crate::event_loop::EventLoop;

/// A one-shot continuation run with the settled value.
pub(crate) type Handler = Box<dyn FnOnce(Value) -> Result<Value, Fault>>;

enum State {
    Pending,
    Fulfilled(Value),
    Rejected(Value),
}

/// Observable snapshot of a promise's state.
#[derive(Debug, Clone, PartialEq)]
pub enum PromiseState {
    /// Not settled yet (possibly never, for containment promises).
    Pending,
    /// Settled with a success payload.
    Fulfilled(Value),
    /// Settled with a rejection reason.
    Rejected(Value),
}

struct Reaction {
    on_fulfilled: Option<Handler>,
    on_rejected: Option<Handler>,
    settle: Settle,
}

struct Inner {
    state: State,
    reactions: Vec<Reaction>,
    /// Set as soon as any reaction is attached. Even a success-only
    /// reaction forwards a rejection to the derived promise, whose own
    /// channel takes over; so exactly one promise per chain (the
    /// terminal one) can still report. Gates the loop's
    /// unhandled-rejection channel.
    rejection_handled: bool,
}

/// Handle to a host promise. Clones alias one promise.
#[derive(Clone)]
pub struct Promise {
    inner: Rc<RefCell<Inner>>,
    driver: EventLoop,
}

/// The resolving half of a promise. Fused: the first `resolve` or
/// `reject` wins and every later call is a no-op.
#[derive(Clone)]
pub struct Settle {
    promise: Promise,
    used: Rc<Cell<bool>>,
}

impl Promise {
    /// Create a pending promise and its settle handle.
    #[must_use]
    pub fn new(driver: &EventLoop) -> (Self, Settle) {
        let promise = Self {
            inner: Rc::new(RefCell::new(Inner {
                state: State::Pending,
                reactions: Vec::new(),
                rejection_handled: false,
            })),
            driver: driver.clone(),
        };
        let settle = Settle {
            promise: promise.clone(),
            used: Rc::new(Cell::new(false)),
        };
        (promise, settle)
    }

    /// A promise with no retained settle handle: the absorbing state used
    /// by error containment. It never fulfills and never rejects;
    /// reactions attached to it simply never fire.
    #[must_use]
    pub fn forever(driver: &EventLoop) -> Self {
        Self::new(driver).0
    }

    /// Snapshot the current state.
    #[must_use]
    pub fn state(&self) -> PromiseState {
        match &self.inner.borrow().state {
            State::Pending => PromiseState::Pending,
            State::Fulfilled(value) => PromiseState::Fulfilled(value.clone()),
            State::Rejected(reason) => PromiseState::Rejected(reason.clone()),
        }
    }

    /// Attach raw continuations; the native chaining primitive.
    ///
    /// The derived promise resolves with a handler's returned value (with
    /// adoption) or rejects with a handler's fault payload. A missing
    /// handler passes the corresponding settlement through unchanged.
    pub(crate) fn then_raw(
        &self,
        on_fulfilled: Option<Handler>,
        on_rejected: Option<Handler>,
    ) -> Promise {
        let (derived, settle) = Promise::new(&self.driver);
        let reaction = Reaction {
            on_fulfilled,
            on_rejected,
            settle,
        };
        let settled = {
            let mut inner = self.inner.borrow_mut();
            inner.rejection_handled = true;
            match &inner.state {
                State::Pending => {
                    inner.reactions.push(reaction);
                    None
                }
                State::Fulfilled(value) => Some((reaction, Ok(value.clone()))),
                State::Rejected(reason) => Some((reaction, Err(reason.clone()))),
            }
        };
        if let Some((reaction, outcome)) = settled {
            self.schedule(reaction, outcome);
        }
        derived
    }

    /// Expose the promise to foreign code as a record with a callable
    /// `then` member. Classification stays purely structural: there is
    /// nothing else on the record.
    ///
    /// Non-callable arguments to `then` are treated as absent handlers.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let source = self.clone();
        let then = ForeignFn::new(move |args| {
            let on_fulfilled = handler_from(args.first());
            let on_rejected = handler_from(args.get(1));
            let derived = source.then_raw(on_fulfilled, on_rejected);
            Ok(derived.to_value())
        });
        Value::record([(CHAIN_MEMBER, Value::Function(then))])
    }

    fn fulfill(&self, value: Value) {
        let reactions = {
            let mut inner = self.inner.borrow_mut();
            if !matches!(inner.state, State::Pending) {
                return;
            }
            tracing::trace!(payload = %value, "promise fulfilled");
            inner.state = State::Fulfilled(value.clone());
            mem::take(&mut inner.reactions)
        };
        for reaction in reactions {
            self.schedule(reaction, Ok(value.clone()));
        }
    }

    fn reject_with(&self, reason: Value) {
        let reactions = {
            let mut inner = self.inner.borrow_mut();
            if !matches!(inner.state, State::Pending) {
                return;
            }
            tracing::trace!(%reason, "promise rejected");
            inner.state = State::Rejected(reason.clone());
            mem::take(&mut inner.reactions)
        };
        let weak = Rc::downgrade(&self.inner);
        self.driver.track_rejection(Box::new(move || {
            let inner = weak.upgrade()?;
            let inner = inner.try_borrow().ok()?;
            if inner.rejection_handled {
                return None;
            }
            match &inner.state {
                State::Rejected(reason) => Some(reason.to_string()),
                _ => None,
            }
        }));
        for reaction in reactions {
            self.schedule(reaction, Err(reason.clone()));
        }
    }

    fn schedule(&self, reaction: Reaction, outcome: Result<Value, Value>) {
        self.driver.enqueue(move || run_reaction(reaction, outcome));
    }
}

impl Settle {
    /// Resolve the promise. A future-shaped value is not stored as the
    /// payload; its eventual state is adopted instead (auto-flattening).
    pub fn resolve(&self, value: Value) {
        if self.used.replace(true) {
            return;
        }
        if let Some(chain) = value.then_capability() {
            self.adopt(chain);
        } else {
            self.promise.fulfill(value);
        }
    }

    /// Reject the promise with the given reason, untouched. Rejection
    /// reasons are never adopted and never wrapped.
    pub fn reject(&self, reason: Value) {
        if self.used.replace(true) {
            return;
        }
        self.promise.reject_with(reason);
    }

    /// Adopt a future-shaped value: call its `then` capability with a
    /// fresh fused pair of settle functions. A fault raised by the
    /// capability itself rejects the promise, unless the pair already ran.
    fn adopt(&self, chain: ForeignFn) {
        tracing::trace!("adopting future-shaped resolution");
        let settle = Settle {
            promise: self.promise.clone(),
            used: Rc::new(Cell::new(false)),
        };
        self.promise.driver.clone().enqueue(move || {
            let on_ok = {
                let settle = settle.clone();
                Value::function(move |value| {
                    settle.resolve(value);
                    Ok(Value::Undefined)
                })
            };
            let on_err = {
                let settle = settle.clone();
                Value::function(move |reason| {
                    settle.reject(reason);
                    Ok(Value::Undefined)
                })
            };
            if let Err(fault) = chain.call(&[on_ok, on_err]) {
                settle.reject(fault.into_payload());
            }
        });
    }
}

fn run_reaction(reaction: Reaction, outcome: Result<Value, Value>) {
    let Reaction {
        on_fulfilled,
        on_rejected,
        settle,
    } = reaction;
    match outcome {
        Ok(value) => match on_fulfilled {
            Some(handler) => apply(handler, value, &settle),
            None => settle.resolve(value),
        },
        Err(reason) => match on_rejected {
            Some(handler) => apply(handler, reason, &settle),
            None => settle.reject(reason),
        },
    }
}

fn apply(handler: Handler, argument: Value, settle: &Settle) {
    match handler(argument) {
        Ok(result) => settle.resolve(result),
        Err(fault) => settle.reject(fault.into_payload()),
    }
}

fn handler_from(arg: Option<&Value>) -> Option<Handler> {
    match arg {
        Some(Value::Function(f)) => {
            let f = f.clone();
            Some(Box::new(move |value| f.call(&[value])))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxed(f: impl FnOnce(Value) -> Result<Value, Fault> + 'static) -> Handler {
        Box::new(f)
    }

    #[test]
    fn first_settlement_wins() {
        let driver = EventLoop::new();
        let (promise, settle) = Promise::new(&driver);
        settle.resolve(Value::from(1));
        settle.resolve(Value::from(2));
        settle.reject(Value::text("late"));
        driver.run_until_idle().unwrap();
        assert_eq!(promise.state(), PromiseState::Fulfilled(Value::from(1)));
    }

    #[test]
    fn reactions_attached_after_settlement_still_fire() {
        let driver = EventLoop::new();
        let (promise, settle) = Promise::new(&driver);
        settle.resolve(Value::from(3));
        driver.run_until_idle().unwrap();

        let derived = promise.then_raw(Some(boxed(|v| Ok(v))), None);
        assert_eq!(derived.state(), PromiseState::Pending);
        driver.run_until_idle().unwrap();
        assert_eq!(derived.state(), PromiseState::Fulfilled(Value::from(3)));
    }

    #[test]
    fn missing_handlers_pass_settlement_through() {
        let driver = EventLoop::new();
        let (promise, settle) = Promise::new(&driver);
        let derived = promise.then_raw(None, None);
        settle.reject(Value::text("boom"));
        driver.run_until_idle().unwrap();
        assert_eq!(derived.state(), PromiseState::Rejected(Value::text("boom")));
    }

    #[test]
    fn handler_fault_rejects_the_derived_promise() {
        let driver = EventLoop::new();
        let (promise, settle) = Promise::new(&driver);
        let derived = promise.then_raw(Some(boxed(|_| Err(Fault::message("bad")))), None);
        settle.resolve(Value::Undefined);
        driver.run_until_idle().unwrap();
        assert_eq!(derived.state(), PromiseState::Rejected(Value::text("bad")));
    }

    #[test]
    fn resolve_adopts_a_fabricated_thenable() {
        let driver = EventLoop::new();
        let (promise, settle) = Promise::new(&driver);
        let thenable = Value::record([(
            "then",
            Value::Function(ForeignFn::new(|args| {
                match args.first() {
                    Some(Value::Function(on_ok)) => on_ok.call(&[Value::from(9)]),
                    _ => Err(Fault::message("missing on_ok")),
                }
            })),
        )]);
        settle.resolve(thenable);
        driver.run_until_idle().unwrap();
        assert_eq!(promise.state(), PromiseState::Fulfilled(Value::from(9)));
    }

    #[test]
    fn resolve_adopts_a_promise_record() {
        let driver = EventLoop::new();
        let (inner, inner_settle) = Promise::new(&driver);
        let (outer, outer_settle) = Promise::new(&driver);
        outer_settle.resolve(inner.to_value());
        inner_settle.resolve(Value::text("deep"));
        driver.run_until_idle().unwrap();
        assert_eq!(outer.state(), PromiseState::Fulfilled(Value::text("deep")));
    }

    #[test]
    fn faulting_thenable_rejects_the_adopting_promise() {
        let driver = EventLoop::new();
        let (promise, settle) = Promise::new(&driver);
        let thenable = Value::record([(
            "then",
            Value::Function(ForeignFn::new(|_| Err(Fault::message("broken thenable")))),
        )]);
        settle.resolve(thenable);
        driver.run_until_idle().unwrap();
        assert_eq!(
            promise.state(),
            PromiseState::Rejected(Value::text("broken thenable"))
        );
    }

    #[test]
    fn a_rejected_chain_reports_only_its_terminal_promise() {
        let driver = EventLoop::new();
        let (promise, settle) = Promise::new(&driver);
        // A success-only reaction still forwards the rejection onward.
        let _tail = promise.then_raw(Some(boxed(|v| Ok(v))), None);
        settle.reject(Value::text("x"));
        driver.run_until_idle().unwrap();
        assert_eq!(driver.take_reported_rejections(), vec!["x".to_string()]);
    }

    #[test]
    fn a_handled_rejection_reports_nothing() {
        let driver = EventLoop::new();
        let (promise, settle) = Promise::new(&driver);
        let recovered = promise.then_raw(None, Some(boxed(|_| Ok(Value::from(0)))));
        settle.reject(Value::text("x"));
        driver.run_until_idle().unwrap();
        assert_eq!(recovered.state(), PromiseState::Fulfilled(Value::from(0)));
        assert!(driver.take_reported_rejections().is_empty());
    }

    #[test]
    fn an_unobserved_rejection_reports_once() {
        let driver = EventLoop::new();
        let (_promise, settle) = Promise::new(&driver);
        settle.reject(Value::text("alone"));
        driver.run_until_idle().unwrap();
        assert_eq!(driver.take_reported_rejections(), vec!["alone".to_string()]);
    }

    #[test]
    fn forever_never_settles_and_reactions_never_fire() {
        let driver = EventLoop::new();
        let silent = Promise::forever(&driver);
        let derived = silent.then_raw(Some(boxed(|v| Ok(v))), Some(boxed(|e| Ok(e))));
        driver.run_until_idle().unwrap();
        assert_eq!(silent.state(), PromiseState::Pending);
        assert_eq!(derived.state(), PromiseState::Pending);
    }
}
