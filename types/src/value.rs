//! The dynamic value representation shared by foreign script code and the
//! bridge.
//!
//! `Value` has handle semantics: lists, records, and functions clone by
//! reference (the clones alias one underlying cell), while primitives clone
//! by value. Equality follows the same split - primitives compare by value,
//! handles by identity.
//!
//! There is deliberately no nominal "promise" variant. A host promise
//! enters the value world as a [`Value::Record`] carrying a callable `then`
//! member, so "is this a future?" is always answered by structural
//! inspection ([`Value::then_capability`]), never by a type tag. The one
//! exception-shaped variant is [`Value::Carried`], the opaque wrapper the
//! bridge uses to carry a future-shaped value through a promise's
//! settlement slot as plain data; a `Carried` exposes no members and
//! therefore never classifies as future-shaped.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::fault::Fault;

/// Member name probed for when classifying a value as future-shaped.
pub const CHAIN_MEMBER: &str = "then";

/// Shared containers can alias themselves; rendering stops recursing at
/// this depth instead of overflowing the stack.
pub(crate) const MAX_DEPTH: usize = 64;

/// A callable foreign capability.
///
/// Foreign functions take a slice of argument values and either return a
/// value or raise a [`Fault`] (the foreign analogue of a thrown exception).
/// Cloning shares the underlying callable.
#[derive(Clone)]
pub struct ForeignFn(Rc<dyn Fn(&[Value]) -> Result<Value, Fault>>);

impl ForeignFn {
    /// Wrap a native closure as a foreign callable.
    pub fn new(f: impl Fn(&[Value]) -> Result<Value, Fault> + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// Wrap a unary closure; extra arguments are ignored and a missing
    /// argument is delivered as [`Value::Undefined`].
    pub fn unary(f: impl Fn(Value) -> Result<Value, Fault> + 'static) -> Self {
        Self::new(move |args| f(args.first().cloned().unwrap_or(Value::Undefined)))
    }

    /// Invoke the callable.
    pub fn call(&self, args: &[Value]) -> Result<Value, Fault> {
        (self.0)(args)
    }

    /// Identity comparison (same underlying callable).
    #[must_use]
    pub fn same_fn(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ForeignFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ForeignFn(@{:p})", Rc::as_ptr(&self.0).cast::<()>())
    }
}

/// A dynamically-typed foreign value.
#[derive(Clone, Debug)]
pub enum Value {
    /// The absent value ("no payload").
    Undefined,
    /// The explicit null value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A double-precision number (the model's only numeric type).
    Number(f64),
    /// An immutable text value.
    Text(String),
    /// A shared mutable sequence.
    List(Rc<RefCell<Vec<Value>>>),
    /// A shared mutable record of named members.
    Record(Rc<RefCell<BTreeMap<String, Value>>>),
    /// A callable capability.
    Function(ForeignFn),
    /// A future-shaped value being carried as plain data.
    ///
    /// Created only by the bridge's wrap step immediately before a value
    /// enters a promise's success slot, and removed by the unwrap step
    /// immediately before the payload is handed back to foreign code. It
    /// crosses no other boundary.
    Carried(Box<Value>),
}

impl Value {
    /// Build a text value.
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Build a fresh list from the given elements.
    #[must_use]
    pub fn list(elements: impl IntoIterator<Item = Value>) -> Self {
        Self::List(Rc::new(RefCell::new(elements.into_iter().collect())))
    }

    /// Build a fresh record from `(name, value)` pairs.
    #[must_use]
    pub fn record(members: impl IntoIterator<Item = (&'static str, Value)>) -> Self {
        let map = members
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        Self::Record(Rc::new(RefCell::new(map)))
    }

    /// Build a callable value from a unary closure.
    pub fn function(f: impl Fn(Value) -> Result<Value, Fault> + 'static) -> Self {
        Self::Function(ForeignFn::unary(f))
    }

    /// The value's type name, for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::Text(_) => "text",
            Self::List(_) => "list",
            Self::Record(_) => "record",
            Self::Function(_) => "function",
            Self::Carried(_) => "carried",
        }
    }

    /// Look up a named member. Only records have members; every other
    /// variant (including [`Value::Carried`]) answers `None`.
    #[must_use]
    pub fn member(&self, name: &str) -> Option<Value> {
        match self {
            Self::Record(map) => map.try_borrow().ok()?.get(name).cloned(),
            _ => None,
        }
    }

    /// Insert or replace a named member. Returns `false` when the value is
    /// not a record (or the record is currently borrowed for iteration).
    pub fn set_member(&self, name: impl Into<String>, value: Value) -> bool {
        match self {
            Self::Record(map) => match map.try_borrow_mut() {
                Ok(mut map) => {
                    map.insert(name.into(), value);
                    true
                }
                Err(_) => false,
            },
            _ => false,
        }
    }

    /// The centralized future-shape probe: the callable `then` member, if
    /// the value structurally exposes one.
    ///
    /// This is the only classification code path in the workspace; the
    /// bridge predicate and the promise machinery's adoption step both
    /// delegate here. Total over all values - primitives, `Null`,
    /// `Undefined`, and `Carried` simply answer `None`.
    #[must_use]
    pub fn then_capability(&self) -> Option<ForeignFn> {
        match self.member(CHAIN_MEMBER)? {
            Self::Function(f) => Some(f),
            _ => None,
        }
    }

    /// The numeric payload, if this is a number.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The text payload, if this is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Identity comparison: primitives by value, handles by pointer.
    #[must_use]
    pub fn same_ref(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b),
            (Self::Record(a), Self::Record(b)) => Rc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => a.same_fn(b),
            _ => self == other,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b),
            (Self::Record(a), Self::Record(b)) => Rc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => a.same_fn(b),
            (Self::Carried(a), Self::Carried(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl Value {
    fn fmt_depth(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        if depth == 0 {
            return f.write_str("...");
        }
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
            Self::List(elements) => match elements.try_borrow() {
                Ok(elements) => {
                    f.write_str("[")?;
                    for (i, element) in elements.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        element.fmt_depth(f, depth - 1)?;
                    }
                    f.write_str("]")
                }
                Err(_) => f.write_str("[...]"),
            },
            Self::Record(map) => match map.try_borrow() {
                Ok(map) => {
                    f.write_str("{")?;
                    for (i, (name, value)) in map.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{name}: ")?;
                        value.fmt_depth(f, depth - 1)?;
                    }
                    f.write_str("}")
                }
                Err(_) => f.write_str("{...}"),
            },
            Self::Function(_) => f.write_str("[function]"),
            Self::Carried(inner) => {
                f.write_str("[carried ")?;
                inner.fmt_depth(f, depth - 1)?;
                f.write_str("]")
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_depth(f, MAX_DEPTH)
    }
}
