//! Value representation and declared value ranges.
//!
//! Every store and bound object exchanges [`Value`]s, which are plain JSON
//! values. Schema keys additionally carry a [`ValueType`] (modelled on the
//! single-letter schema type strings) and a [`ValueRange`] describing which
//! values the key accepts.

use std::fmt;

use crate::{Error, Result};

/// The value currency shared by stores, bindings, and bound objects.
pub type Value = serde_json::Value;

/// Runtime type of a schema key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// `b`
    Bool,
    /// `y`
    Byte,
    /// `n`
    Int16,
    /// `q`
    UInt16,
    /// `i`
    Int32,
    /// `u`
    UInt32,
    /// `x`
    Int64,
    /// `t`
    UInt64,
    /// `d`
    Double,
    /// `s`
    String,
    /// `as`
    StringArray,
}

impl ValueType {
    /// Parse a schema type string such as `"i"` or `"as"`.
    pub fn from_type_string(s: &str) -> Option<Self> {
        Some(match s {
            "b" => Self::Bool,
            "y" => Self::Byte,
            "n" => Self::Int16,
            "q" => Self::UInt16,
            "i" => Self::Int32,
            "u" => Self::UInt32,
            "x" => Self::Int64,
            "t" => Self::UInt64,
            "d" => Self::Double,
            "s" => Self::String,
            "as" => Self::StringArray,
            _ => return None,
        })
    }

    /// The schema type string for this type.
    pub fn type_string(self) -> &'static str {
        match self {
            Self::Bool => "b",
            Self::Byte => "y",
            Self::Int16 => "n",
            Self::UInt16 => "q",
            Self::Int32 => "i",
            Self::UInt32 => "u",
            Self::Int64 => "x",
            Self::UInt64 => "t",
            Self::Double => "d",
            Self::String => "s",
            Self::StringArray => "as",
        }
    }

    /// Whether values of this type are whole numbers.
    pub fn is_integral(self) -> bool {
        matches!(
            self,
            Self::Byte
                | Self::Int16
                | Self::UInt16
                | Self::Int32
                | Self::UInt32
                | Self::Int64
                | Self::UInt64
        )
    }

    /// Whether `value` already is of this runtime type and fits its width.
    ///
    /// No conversion is attempted: an integer does not satisfy `Double`, and a
    /// number never satisfies `String`.
    pub fn admits(self, value: &Value) -> bool {
        match self {
            Self::Bool => value.is_boolean(),
            Self::Byte => fits_unsigned(value, u64::from(u8::MAX)),
            Self::UInt16 => fits_unsigned(value, u64::from(u16::MAX)),
            Self::UInt32 => fits_unsigned(value, u64::from(u32::MAX)),
            Self::UInt64 => value.is_u64(),
            Self::Int16 => fits_signed(value, i64::from(i16::MIN), i64::from(i16::MAX)),
            Self::Int32 => fits_signed(value, i64::from(i32::MIN), i64::from(i32::MAX)),
            Self::Int64 => value.is_i64(),
            Self::Double => value.is_f64(),
            Self::String => value.is_string(),
            Self::StringArray => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
        }
    }

    /// Infer the narrowest-kind type of a concrete value, used to type the
    /// payload of enum and range declarations.
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(_) => Some(Self::Bool),
            Value::Number(n) if n.is_f64() => Some(Self::Double),
            Value::Number(n) if n.is_i64() => Some(Self::Int64),
            Value::Number(_) => Some(Self::UInt64),
            Value::String(_) => Some(Self::String),
            Value::Array(items) if items.iter().all(Value::is_string) => Some(Self::StringArray),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_string())
    }
}

/// Unsigned integer no larger than `max`.
fn fits_unsigned(value: &Value, max: u64) -> bool {
    value.as_u64().is_some_and(|n| n <= max) && !value.is_f64()
}

/// Signed integer within `[min, max]`.
fn fits_signed(value: &Value, min: i64, max: i64) -> bool {
    value.as_i64().is_some_and(|n| (min..=max).contains(&n)) && !value.is_f64()
}

/// Short kind name of a value, for error messages.
pub fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "double",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Boolean reading of an arbitrary value: `null`, `false`, zero, and empty
/// strings/arrays/objects are false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Declared set of values a key accepts. Immutable once a key is resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueRange {
    /// Any value of the given runtime type.
    Free(ValueType),
    /// Exactly one of the listed values.
    Enum(Vec<Value>),
    /// A string array whose members are all drawn from the listed flag nicks.
    Flags(Vec<String>),
    /// A number of the same type as the bounds, within `[min, max]`.
    Bounded {
        /// Inclusive lower bound.
        min: Value,
        /// Inclusive upper bound.
        max: Value,
    },
}

impl ValueRange {
    /// Decode the tagged `(tag, payload)` form reported by a schema service.
    ///
    /// The payload shape depends on the tag:
    /// - `type`: a type string, e.g. `"i"`
    /// - `enum`: an array of allowed values
    /// - `flags`: an array of allowed flag nicks
    /// - `range`: a two-element `[min, max]` array
    pub fn from_tagged(tag: &str, payload: &Value) -> Result<Self> {
        match tag {
            "type" => {
                let s = payload.as_str().ok_or_else(|| payload_error(tag, payload))?;
                ValueType::from_type_string(s)
                    .map(Self::Free)
                    .ok_or_else(|| Error::invalid_schema("", format!("unknown type string {s:?}")))
            }
            "enum" => {
                let items = payload.as_array().ok_or_else(|| payload_error(tag, payload))?;
                if items.is_empty() {
                    return Err(Error::invalid_schema("", "empty enumeration"));
                }
                let first = ValueType::of(&items[0]);
                if first.is_none() || items.iter().any(|v| ValueType::of(v) != first) {
                    return Err(Error::invalid_schema(
                        "",
                        "enumeration members must share one type",
                    ));
                }
                Ok(Self::Enum(items.clone()))
            }
            "flags" => {
                let items = payload.as_array().ok_or_else(|| payload_error(tag, payload))?;
                items
                    .iter()
                    .map(|v| v.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
                    .map(Self::Flags)
                    .ok_or_else(|| Error::invalid_schema("", "flag nicks must be strings"))
            }
            "range" => match payload.as_array().map(Vec::as_slice) {
                Some([min, max]) if min.is_number() && max.is_number() => {
                    if ValueType::of(min) != ValueType::of(max) {
                        return Err(Error::invalid_schema("", "range bounds differ in type"));
                    }
                    Ok(Self::Bounded {
                        min: min.clone(),
                        max: max.clone(),
                    })
                }
                _ => Err(payload_error(tag, payload)),
            },
            other => Err(Error::invalid_schema(
                "",
                format!("unknown range tag {other:?}"),
            )),
        }
    }

    /// The tag this range is reported under.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Free(_) => "type",
            Self::Enum(_) => "enum",
            Self::Flags(_) => "flags",
            Self::Bounded { .. } => "range",
        }
    }
}

/// Error for a payload whose shape does not match its tag.
fn payload_error(tag: &str, payload: &Value) -> Error {
    Error::TypeMismatch {
        expected: format!("{tag} payload"),
        found: kind_name(payload).to_string(),
    }
}
