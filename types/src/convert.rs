//! JSON interop for the foreign value model.
//!
//! Embedders (and tests) build foreign values tersely from JSON, and the
//! reverse direction feeds structured diagnostics. Both directions are
//! lossy where the models disagree: JSON has no functions, no `undefined`,
//! and no identity, while values may alias or cycle.

use std::cell::RefCell;
use std::rc::Rc;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::{Map, Number, Value as Json};

use crate::value::{MAX_DEPTH, Value};

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        match json {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::Bool(b),
            Json::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Self::Text(s),
            Json::Array(elements) => Self::list(elements.into_iter().map(Self::from)),
            Json::Object(members) => {
                let map = members
                    .into_iter()
                    .map(|(name, value)| (name, Self::from(value)))
                    .collect();
                Self::Record(Rc::new(RefCell::new(map)))
            }
        }
    }
}

impl Value {
    /// Convert to JSON, or `None` for values with no JSON form
    /// (`Undefined`, functions, carried wrappers, cyclic or currently
    /// borrowed containers, non-finite numbers).
    #[must_use]
    pub fn to_json(&self) -> Option<Json> {
        self.to_json_depth(MAX_DEPTH)
    }

    fn to_json_depth(&self, depth: usize) -> Option<Json> {
        if depth == 0 {
            return None;
        }
        match self {
            Self::Undefined | Self::Function(_) | Self::Carried(_) => None,
            Self::Null => Some(Json::Null),
            Self::Bool(b) => Some(Json::Bool(*b)),
            Self::Number(n) => {
                // The model only has f64; integral values go back to JSON
                // integers so plain data round-trips exactly.
                if n.fract() == 0.0 && *n >= i64::MIN as f64 && *n <= i64::MAX as f64 {
                    Some(Json::Number(Number::from(*n as i64)))
                } else {
                    Number::from_f64(*n).map(Json::Number)
                }
            }
            Self::Text(s) => Some(Json::String(s.clone())),
            Self::List(elements) => {
                let elements = elements.try_borrow().ok()?;
                elements
                    .iter()
                    .map(|element| element.to_json_depth(depth - 1))
                    .collect::<Option<Vec<_>>>()
                    .map(Json::Array)
            }
            Self::Record(map) => {
                let map = map.try_borrow().ok()?;
                map.iter()
                    .map(|(name, value)| {
                        value.to_json_depth(depth - 1).map(|v| (name.clone(), v))
                    })
                    .collect::<Option<Map<_, _>>>()
                    .map(Json::Object)
            }
        }
    }
}

/// Diagnostic serialization: values without a JSON form serialize as a
/// `"<type>"` placeholder string instead of failing, and nesting past the
/// depth cap serializes as `"..."`, so a whole record can always be logged
/// even when it aliases itself.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Bounded(self, MAX_DEPTH).serialize(serializer)
    }
}

#[derive(Clone, Copy)]
struct Bounded<'a>(&'a Value, usize);

impl Serialize for Bounded<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let Bounded(value, depth) = *self;
        if depth == 0 {
            return serializer.serialize_str("...");
        }
        match value {
            Value::Undefined => serializer.serialize_str("<undefined>"),
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) if n.is_finite() => serializer.serialize_f64(*n),
            Value::Number(_) => serializer.serialize_str("<number>"),
            Value::Text(s) => serializer.serialize_str(s),
            Value::List(elements) => match elements.try_borrow() {
                Ok(elements) => {
                    let mut seq = serializer.serialize_seq(Some(elements.len()))?;
                    for element in elements.iter() {
                        seq.serialize_element(&Bounded(element, depth - 1))?;
                    }
                    seq.end()
                }
                Err(_) => serializer.serialize_str("<list>"),
            },
            Value::Record(map) => match map.try_borrow() {
                Ok(map) => {
                    let mut out = serializer.serialize_map(Some(map.len()))?;
                    for (name, member) in map.iter() {
                        out.serialize_entry(name, &Bounded(member, depth - 1))?;
                    }
                    out.end()
                }
                Err(_) => serializer.serialize_str("<record>"),
            },
            Value::Function(_) => serializer.serialize_str("<function>"),
            Value::Carried(_) => serializer.serialize_str("<carried>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_round_trip_for_plain_data() {
        let json = json!({"a": 1, "b": [true, null, "x"]});
        let value = Value::from(json.clone());
        assert_eq!(value.to_json(), Some(json));
    }

    #[test]
    fn functions_have_no_json_form() {
        let value = Value::record([("f", Value::function(|v| Ok(v)))]);
        assert_eq!(value.to_json(), None);
    }

    #[test]
    fn cyclic_record_serializes_to_the_depth_cap() {
        let record = Value::record([("me", Value::Null)]);
        record.set_member("me", record.clone());
        let rendered = serde_json::to_string(&record).unwrap();
        assert!(rendered.starts_with(r#"{"me":{"me":"#));
        assert!(rendered.contains(r#""...""#));
    }

    #[test]
    fn diagnostic_serialization_never_fails() {
        let value = Value::record([
            ("f", Value::function(|v| Ok(v))),
            ("n", Value::Number(f64::NAN)),
            ("u", Value::Undefined),
        ]);
        let rendered = serde_json::to_string(&value).unwrap();
        assert_eq!(rendered, r#"{"f":"<function>","n":"<number>","u":"<undefined>"}"#);
    }
}
