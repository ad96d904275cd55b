//! The closed value-kind system (spec §3, §4.1).
//!
//! Grounded on `examples/original_source/jstypes.go`: a closed set of
//! type tags, each supporting `valid()`, `is(value)`, `zero()`, `any()`.
//! Runtime values themselves are `serde_json::Value` — the wire carries
//! "any JSON value" (spec §6), so there is nothing to gain from a bespoke
//! value type, and `serde_json::Value` already has total structural
//! equality, which is what the magic cache (§4.3 `invalidate`) needs.

use serde_derive::{Deserialize, Serialize};
use std::fmt;

/// The runtime value carried by variables, broadcasts, and wires.
pub type Value = serde_json::Value;

/// One of the closed set of type tags: a scalar kind, its array form, or `any`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Bool,
    #[serde(rename = "bool[]")]
    BoolArray,
    Int,
    #[serde(rename = "int[]")]
    IntArray,
    Float,
    #[serde(rename = "float[]")]
    FloatArray,
    String,
    #[serde(rename = "string[]")]
    StringArray,
    Object,
    #[serde(rename = "object[]")]
    ObjectArray,
    Any,
    #[serde(rename = "any[]")]
    AnyArray,
}

impl Default for ValueKind {
    /// `config.go`'s `rescue()`: an unset type defaults to `any`.
    fn default() -> Self {
        ValueKind::Any
    }
}

impl ValueKind {
    /// A closed Rust enum is valid by construction (parsing is where an
    /// unknown type tag is rejected, via `FromStr`/`Deserialize`); this
    /// method exists to match the source's API shape.
    pub fn valid(self) -> bool {
        true
    }

    /// Runtime type check, structural and not exact-kind: `Float` accepts
    /// any JSON number (spec §4.1: "numeric-float accepts both 32/64-bit
    /// floats"), and `Any`/`AnyArray` accept everything of their arity.
    pub fn is(self, v: &Value) -> bool {
        match self {
            ValueKind::Bool => v.is_boolean(),
            ValueKind::Int => v.is_i64() || v.is_u64(),
            ValueKind::Float => v.is_number(),
            ValueKind::String => v.is_string(),
            ValueKind::Object => v.is_object(),
            ValueKind::Any => true,
            ValueKind::BoolArray => array_of(v, ValueKind::Bool),
            ValueKind::IntArray => array_of(v, ValueKind::Int),
            ValueKind::FloatArray => array_of(v, ValueKind::Float),
            ValueKind::StringArray => array_of(v, ValueKind::String),
            ValueKind::ObjectArray => array_of(v, ValueKind::Object),
            ValueKind::AnyArray => v.is_array(),
        }
    }

    /// The canonical default value for this kind.
    pub fn zero(self) -> Value {
        match self {
            ValueKind::Bool => Value::Bool(false),
            ValueKind::Int => Value::from(0i64),
            ValueKind::Float => Value::from(0.0f64),
            ValueKind::String => Value::from(""),
            ValueKind::Object => Value::Object(Default::default()),
            // Explicit in spec §4.1: empty string, not null, for `any`.
            ValueKind::Any => Value::from(""),
            ValueKind::BoolArray
            | ValueKind::IntArray
            | ValueKind::FloatArray
            | ValueKind::StringArray
            | ValueKind::ObjectArray
            | ValueKind::AnyArray => Value::Array(Vec::new()),
        }
    }

    /// Widen a scalar to `any` and an array to `any[]`.
    pub fn any(self) -> ValueKind {
        match self {
            ValueKind::Bool
            | ValueKind::Int
            | ValueKind::Float
            | ValueKind::String
            | ValueKind::Object
            | ValueKind::Any => ValueKind::Any,
            ValueKind::BoolArray
            | ValueKind::IntArray
            | ValueKind::FloatArray
            | ValueKind::StringArray
            | ValueKind::ObjectArray
            | ValueKind::AnyArray => ValueKind::AnyArray,
        }
    }
}

fn array_of(v: &Value, elem: ValueKind) -> bool {
    match v.as_array() {
        Some(items) => items.iter().all(|item| elem.is(item)),
        None => false,
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueKind::Bool => "bool",
            ValueKind::BoolArray => "bool[]",
            ValueKind::Int => "int",
            ValueKind::IntArray => "int[]",
            ValueKind::Float => "float",
            ValueKind::FloatArray => "float[]",
            ValueKind::String => "string",
            ValueKind::StringArray => "string[]",
            ValueKind::Object => "object",
            ValueKind::ObjectArray => "object[]",
            ValueKind::Any => "any",
            ValueKind::AnyArray => "any[]",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn is_checks_are_structural() {
        assert!(ValueKind::Bool.is(&json!(true)));
        assert!(!ValueKind::Bool.is(&json!(1)));
        assert!(ValueKind::Int.is(&json!(42)));
        assert!(ValueKind::Float.is(&json!(42))); // float accepts ints too
        assert!(ValueKind::Float.is(&json!(4.2)));
        assert!(ValueKind::Any.is(&json!(null)));
        assert!(ValueKind::IntArray.is(&json!([1, 2, 3])));
        assert!(!ValueKind::IntArray.is(&json!([1, "x"])));
    }

    #[test]
    fn zero_values() {
        assert_eq!(ValueKind::Bool.zero(), json!(false));
        assert_eq!(ValueKind::Int.zero(), json!(0));
        assert_eq!(ValueKind::Any.zero(), json!(""));
        assert_eq!(ValueKind::IntArray.zero(), json!([]));
    }

    #[test]
    fn any_widens() {
        assert_eq!(ValueKind::Int.any(), ValueKind::Any);
        assert_eq!(ValueKind::IntArray.any(), ValueKind::AnyArray);
        assert_eq!(ValueKind::Any.any(), ValueKind::Any);
    }

    #[test]
    fn default_is_any() {
        assert_eq!(ValueKind::default(), ValueKind::Any);
    }
}
