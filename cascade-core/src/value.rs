//! Variable Values
//!
//! Every variable in the graph holds a [`Value`], a closed tagged union of the
//! payloads that can flow through equations. Keeping the set closed lets
//! equations declare the kinds they accept (see [`Signature`]) and have those
//! declarations checked when the equation is added, instead of failing deep
//! inside a cascade.
//!
//! Values convert to and from `serde_json::Value` so a document layer can map
//! JSON fields onto graph variables without an intermediate representation.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::compute::ComputeError;

/// A value held by a variable.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// No value. Also the initial value of variables declared without one.
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
    Record(IndexMap<String, Value>),
}

/// The discriminant of a [`Value`], used in signatures and error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    Text,
    List,
    Record,
    /// Either `Int` or `Float`.
    Number,
    /// Matches every kind.
    Any,
}

impl ValueKind {
    /// Whether a value of kind `other` is acceptable where `self` is declared.
    pub fn accepts(self, other: ValueKind) -> bool {
        match self {
            ValueKind::Any => true,
            ValueKind::Number => matches!(other, ValueKind::Int | ValueKind::Float),
            kind => kind == other,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Text => "text",
            ValueKind::List => "list",
            ValueKind::Record => "record",
            ValueKind::Number => "number",
            ValueKind::Any => "any",
        };
        f.write_str(name)
    }
}

impl Value {
    /// Get the kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Text(_) => ValueKind::Text,
            Value::List(_) => ValueKind::List,
            Value::Record(_) => ValueKind::Record,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Read the value as a float, promoting integers.
    pub fn as_f64(&self) -> Result<f64, ComputeError> {
        match self {
            Value::Int(i) => Ok(*i as f64),
            Value::Float(x) => Ok(*x),
            other => Err(ComputeError::mismatch(ValueKind::Number, other.kind())),
        }
    }

    /// Read the value as an integer. Floats are not truncated.
    pub fn as_i64(&self) -> Result<i64, ComputeError> {
        match self {
            Value::Int(i) => Ok(*i),
            other => Err(ComputeError::mismatch(ValueKind::Int, other.kind())),
        }
    }

    pub fn as_bool(&self) -> Result<bool, ComputeError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(ComputeError::mismatch(ValueKind::Bool, other.kind())),
        }
    }

    pub fn as_str(&self) -> Result<&str, ComputeError> {
        match self {
            Value::Text(s) => Ok(s),
            other => Err(ComputeError::mismatch(ValueKind::Text, other.kind())),
        }
    }

    pub fn as_list(&self) -> Result<&[Value], ComputeError> {
        match self {
            Value::List(items) => Ok(items),
            other => Err(ComputeError::mismatch(ValueKind::List, other.kind())),
        }
    }

    pub fn as_record(&self) -> Result<&IndexMap<String, Value>, ComputeError> {
        match self {
            Value::Record(fields) => Ok(fields),
            other => Err(ComputeError::mismatch(ValueKind::Record, other.kind())),
        }
    }

    /// Whether writing `other` over `self` would leave the value unchanged.
    ///
    /// Unlike `==`, floats compare by bit pattern, so a NaN is the same as
    /// an identical NaN and `0.0` differs from `-0.0`. Record fields compare
    /// by key, regardless of order.
    pub fn same_as(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_as(y))
            }
            (Value::Record(a), Value::Record(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(key, x)| b.get(key).is_some_and(|y| x.same_as(y)))
            }
            _ => self == other,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Record(fields) => {
                f.write_str("{")?;
                for (i, (key, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                // u64 beyond i64::MAX and all non-integers land here
                None => n.as_f64().map_or(Value::Null, Value::Float),
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(fields) => Value::Record(
                fields
                    .into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(i) => serde_json::Value::from(i),
            // NaN and infinities have no JSON form
            Value::Float(x) => serde_json::Number::from_f64(x)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::Text(s) => serde_json::Value::String(s),
            Value::List(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Record(fields) => serde_json::Value::Object(
                fields
                    .into_iter()
                    .map(|(key, value)| (key, value.into()))
                    .collect(),
            ),
        }
    }
}

/// Declared input and output kinds of an equation.
///
/// Checked once when the equation is declared, against the current values of
/// its variables, and again on every evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub inputs: Vec<ValueKind>,
    pub output: ValueKind,
}

impl Signature {
    pub fn new(inputs: impl Into<Vec<ValueKind>>, output: ValueKind) -> Self {
        Self {
            inputs: inputs.into(),
            output,
        }
    }

    /// A signature over `arity` numeric inputs producing a number.
    pub fn numeric(arity: usize) -> Self {
        Self::new(vec![ValueKind::Number; arity], ValueKind::Number)
    }

    /// Check a list of input values against the declared input kinds.
    pub fn check_inputs(&self, inputs: &[Value]) -> Result<(), ComputeError> {
        if inputs.len() != self.inputs.len() {
            return Err(ComputeError::Arity {
                expected: self.inputs.len(),
                found: inputs.len(),
            });
        }
        for (kind, value) in self.inputs.iter().zip(inputs) {
            if !kind.accepts(value.kind()) {
                return Err(ComputeError::mismatch(*kind, value.kind()));
            }
        }
        Ok(())
    }

    /// Check a computed value against the declared output kind.
    pub fn check_output(&self, output: &Value) -> Result<(), ComputeError> {
        if self.output.accepts(output.kind()) {
            Ok(())
        } else {
            Err(ComputeError::mismatch(self.output, output.kind()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_match_variants() {
        assert_eq!(Value::Null.kind(), ValueKind::Null);
        assert_eq!(Value::from(3).kind(), ValueKind::Int);
        assert_eq!(Value::from(2.5).kind(), ValueKind::Float);
        assert_eq!(Value::from("x").kind(), ValueKind::Text);
        assert_eq!(Value::from(vec![1, 2]).kind(), ValueKind::List);
    }

    #[test]
    fn number_kind_accepts_int_and_float() {
        assert!(ValueKind::Number.accepts(ValueKind::Int));
        assert!(ValueKind::Number.accepts(ValueKind::Float));
        assert!(!ValueKind::Number.accepts(ValueKind::Text));
        assert!(ValueKind::Any.accepts(ValueKind::Record));
        assert!(!ValueKind::Int.accepts(ValueKind::Float));
    }

    #[test]
    fn as_f64_promotes_ints() {
        assert_eq!(Value::Int(4).as_f64().unwrap(), 4.0);
        assert_eq!(Value::Float(0.5).as_f64().unwrap(), 0.5);

        let err = Value::from("four").as_f64().unwrap_err();
        assert_eq!(
            err,
            ComputeError::TypeMismatch {
                expected: ValueKind::Number,
                found: ValueKind::Text,
            }
        );
    }

    #[test]
    fn json_conversion_preserves_structure() {
        let json = serde_json::json!({
            "bread": "Sourdough",
            "toppings": ["Cheese", "Peperoni"],
            "quantity": 2,
            "price": 9.5,
            "vegan": false,
        });

        let value = Value::from(json.clone());
        let fields = value.as_record().unwrap();
        assert_eq!(fields["bread"], Value::from("Sourdough"));
        assert_eq!(fields["quantity"], Value::Int(2));
        assert_eq!(fields["price"], Value::Float(9.5));

        let back: serde_json::Value = value.into();
        assert_eq!(back, json);
    }

    #[test]
    fn non_finite_floats_become_json_null() {
        let json: serde_json::Value = Value::Float(f64::NAN).into();
        assert!(json.is_null());
    }

    #[test]
    fn same_as_treats_identical_nan_as_unchanged() {
        assert_ne!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert!(Value::Float(f64::NAN).same_as(&Value::Float(f64::NAN)));
        assert!(!Value::Float(0.0).same_as(&Value::Float(-0.0)));
        assert!(!Value::Int(1).same_as(&Value::Float(1.0)));

        let nested = |x: f64| {
            let mut fields = IndexMap::new();
            fields.insert("xs".to_string(), Value::from(vec![1.0, x]));
            fields.insert("n".to_string(), Value::Int(2));
            Value::Record(fields)
        };
        assert!(nested(f64::NAN).same_as(&nested(f64::NAN)));
        assert!(!nested(f64::NAN).same_as(&nested(3.0)));
    }

    #[test]
    fn display_renders_nested_values() {
        let mut fields = IndexMap::new();
        fields.insert("a".to_string(), Value::Int(1));
        fields.insert("b".to_string(), Value::from(vec!["x", "y"]));
        let value = Value::Record(fields);
        assert_eq!(value.to_string(), r#"{a: 1, b: ["x", "y"]}"#);
    }

    #[test]
    fn signature_checks_arity_and_kinds() {
        let sig = Signature::numeric(2);
        assert!(sig.check_inputs(&[Value::Int(1), Value::Float(2.0)]).is_ok());
        assert_eq!(
            sig.check_inputs(&[Value::Int(1)]),
            Err(ComputeError::Arity {
                expected: 2,
                found: 1
            })
        );
        assert!(sig.check_inputs(&[Value::Int(1), Value::Null]).is_err());
        assert!(sig.check_output(&Value::Int(3)).is_ok());
        assert!(sig.check_output(&Value::from("3")).is_err());
    }
}
