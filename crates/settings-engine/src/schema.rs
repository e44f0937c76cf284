//! Schema definitions: the declared keys, types, defaults, and ranges of a
//! schema store.
//!
//! Definitions are JSON documents:
//!
//! ```json
//! {
//!   "id": "org.example.notifications",
//!   "keys": {
//!     "display-notifications": { "type": "b", "default": true },
//!     "fade-opacity": { "type": "i", "default": 40, "range": [0, 100] },
//!     "osd-size": { "type": "s", "default": "medium",
//!                   "choices": ["disabled", "small", "medium", "large"] },
//!     "styles": { "type": "as", "default": [], "flags": ["bold", "italic"] }
//!   }
//! }
//! ```

use std::{collections::BTreeMap, fs, path::Path};

use serde::Deserialize;

use crate::{
    Error, Result, Value,
    coerce::coerce,
    value::{ValueRange, ValueType},
};

/// Declaration of one schema key.
#[derive(Debug, Clone, PartialEq)]
pub struct KeySpec {
    /// Runtime type of the key.
    pub value_type: ValueType,
    /// Value reported when nothing has been stored.
    pub default: Value,
    /// Accepted values.
    pub range: ValueRange,
    /// Initial writability (lockdown when false).
    pub writable: bool,
    /// One-line description.
    pub summary: Option<String>,
}

impl KeySpec {
    /// A writable key of `value_type` accepting any value of that type.
    pub fn new(value_type: ValueType, default: Value) -> Self {
        Self {
            value_type,
            default,
            range: ValueRange::Free(value_type),
            writable: true,
            summary: None,
        }
    }

    /// Replace the accepted range.
    #[must_use]
    pub fn with_range(mut self, range: ValueRange) -> Self {
        self.range = range;
        self
    }

    /// Mark the key as not writable.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    /// Check that range payload and default agree with the declared type.
    fn validate(&self, schema: &str, key: &str) -> Result<()> {
        let ty = self.value_type;
        let fail =
            |message: String| Err(Error::invalid_schema(schema, format!("{key}: {message}")));
        match &self.range {
            ValueRange::Free(t) if *t != ty => return fail(format!("type {t} declared as {ty}")),
            ValueRange::Enum(items) if !items.iter().all(|v| ty.admits(v)) => {
                return fail(format!("choices are not all of type {ty}"));
            }
            ValueRange::Flags(_) if ty != ValueType::StringArray => {
                return fail("flags keys must have type as".to_string());
            }
            ValueRange::Bounded { min, max } if !(ty.admits(min) && ty.admits(max)) => {
                return fail(format!("range bounds must be of type {ty}"));
            }
            _ => {}
        }
        if !ty.admits(&self.default) {
            return fail(format!("default {} is not of type {ty}", self.default));
        }
        coerce(&self.range, self.default.clone())
            .map(|_| ())
            .or_else(|e| fail(format!("default does not satisfy its range: {e}")))
    }
}

/// Raw on-disk key declaration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawKey {
    /// Schema type string.
    #[serde(rename = "type")]
    ty: String,
    /// Default value.
    default: Value,
    /// Enumeration members.
    #[serde(default)]
    choices: Option<Value>,
    /// Flag nicks.
    #[serde(default)]
    flags: Option<Value>,
    /// `[min, max]` bounds.
    #[serde(default)]
    range: Option<Value>,
    /// Initial writability.
    #[serde(default = "default_writable")]
    writable: bool,
    /// One-line description.
    #[serde(default)]
    summary: Option<String>,
}

/// Keys are writable unless declared otherwise.
fn default_writable() -> bool {
    true
}

/// Raw on-disk schema document.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSchema {
    /// Schema identifier.
    id: String,
    /// Key declarations.
    keys: BTreeMap<String, RawKey>,
}

impl RawKey {
    /// Resolve into a [`KeySpec`], decoding the range through its tag.
    fn into_spec(self, schema: &str, key: &str) -> Result<KeySpec> {
        let value_type = ValueType::from_type_string(&self.ty).ok_or_else(|| {
            Error::invalid_schema(schema, format!("{key}: unknown type string {:?}", self.ty))
        })?;
        let tagged = [
            ("enum", self.choices),
            ("flags", self.flags),
            ("range", self.range),
        ]
        .into_iter()
        .filter_map(|(tag, payload)| payload.map(|p| (tag, p)))
        .collect::<Vec<_>>();
        let range = match tagged.as_slice() {
            [] => ValueRange::Free(value_type),
            [(tag, payload)] => ValueRange::from_tagged(tag, payload).map_err(|e| match e {
                Error::InvalidSchema { message, .. } => {
                    Error::invalid_schema(schema, format!("{key}: {message}"))
                }
                other => Error::invalid_schema(schema, format!("{key}: {other}")),
            })?,
            _ => {
                return Err(Error::invalid_schema(
                    schema,
                    format!("{key}: at most one of choices, flags, range may be given"),
                ));
            }
        };
        Ok(KeySpec {
            value_type,
            default: self.default,
            range,
            writable: self.writable,
            summary: self.summary,
        })
    }
}

/// A validated schema: identifier plus key declarations.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    /// Schema identifier, e.g. `org.example.notifications`.
    id: String,
    /// Declarations by key name.
    keys: BTreeMap<String, KeySpec>,
}

impl Schema {
    /// Build a schema from declarations, validating every key.
    pub fn new<I, K>(id: impl Into<String>, keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, KeySpec)>,
        K: Into<String>,
    {
        let id = id.into();
        let keys: BTreeMap<String, KeySpec> =
            keys.into_iter().map(|(k, v)| (k.into(), v)).collect();
        for (name, spec) in &keys {
            spec.validate(&id, name)?;
        }
        Ok(Self { id, keys })
    }

    /// Parse and validate a JSON schema definition.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let raw: RawSchema = serde_json::from_str(text)
            .map_err(|e| Error::invalid_schema("<unknown>", e.to_string()))?;
        let id = raw.id;
        let keys = raw
            .keys
            .into_iter()
            .map(|(name, key)| {
                let spec = key.into_spec(&id, &name)?;
                Ok((name, spec))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(id, keys)
    }

    /// Read and parse a JSON schema definition file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text).map_err(|e| match e {
            Error::InvalidSchema { schema, message } if schema == "<unknown>" => Error::Parse {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }

    /// Schema identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Declaration of `key`.
    pub fn key(&self, key: &str) -> Option<&KeySpec> {
        self.keys.get(key)
    }

    /// Declared key names, sorted.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }
}
