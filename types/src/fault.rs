//! The foreign analogue of a thrown exception.

use thiserror::Error;

use crate::value::Value;

/// An exception raised by foreign code, carrying an arbitrary [`Value`].
///
/// Faults travel through `Result<Value, Fault>` on every foreign call
/// boundary; they are never converted into host-side error enums.
#[derive(Debug, Clone, Error)]
#[error("uncaught foreign exception: {payload}")]
pub struct Fault {
    payload: Value,
}

impl Fault {
    /// Raise a fault carrying the given value.
    #[must_use]
    pub fn new(payload: Value) -> Self {
        Self { payload }
    }

    /// Raise a fault carrying a text message.
    #[must_use]
    pub fn message(text: &str) -> Self {
        Self::new(Value::text(text))
    }

    /// The carried value.
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Consume the fault, yielding the carried value.
    #[must_use]
    pub fn into_payload(self) -> Value {
        self.payload
    }
}
