//! Typed view of one file-store record.
//!
//! A record is a JSON object holding the key's `value` plus auxiliary display
//! hints. Unknown fields are ignored; they stay in the document untouched.

use std::{path::Path, result::Result as StdResult};

use serde::{Deserialize, Deserializer};
use serde_json::Map;

use crate::{Error, Result, Value};

/// The auxiliary fields of a file-store record.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct KeyRecord {
    /// Current value, absent for section or header records.
    pub value: Option<Value>,
    /// Label shown next to the control.
    pub description: Option<String>,
    /// Lower bound for numeric controls.
    pub min: Option<Value>,
    /// Upper bound for numeric controls.
    pub max: Option<Value>,
    /// Increment for numeric controls.
    pub step: Option<Value>,
    /// Unit label for numeric controls.
    pub units: Option<String>,
    /// Digits shown by numeric controls.
    pub round: Option<u32>,
    /// File choosers select directories rather than files.
    #[serde(rename = "select-dir")]
    pub select_dir: Option<bool>,
    /// Preferred height of multi-line controls.
    pub height: Option<u32>,
    /// Hover text.
    pub tooltip: Option<String>,
    /// Suggested entries for combo-style inputs.
    pub possible: Option<Vec<Value>>,
    /// Key whose boolean value gates this control's sensitivity.
    pub dependency: Option<String>,
    /// Choices as `(label, value)` pairs, in document order.
    #[serde(deserialize_with = "options_in_order")]
    pub options: Option<Vec<(String, Value)>>,
}

impl KeyRecord {
    /// Decode the record stored under `key` in the document at `path`.
    pub fn from_value(path: &Path, key: &str, record: &Value) -> Result<Self> {
        Self::deserialize(record).map_err(|e| Error::Parse {
            path: path.to_path_buf(),
            message: format!("{key}: {e}"),
        })
    }
}

/// Decode `options` from a `{label: value}` object, preserving order.
fn options_in_order<'de, D>(deserializer: D) -> StdResult<Option<Vec<(String, Value)>>, D::Error>
where
    D: Deserializer<'de>,
{
    let map: Option<Map<String, Value>> = Option::deserialize(deserializer)?;
    Ok(map.map(|m| m.into_iter().collect()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_display_hints() {
        let record = json!({
            "type": "combobox",
            "description": "Position",
            "value": "bottom",
            "options": { "Top": "top", "Bottom": "bottom", "Left": "left" },
            "dependency": "show-panel",
            "select-dir": true,
            "round": 2
        });
        let rec = KeyRecord::from_value(Path::new("s.json"), "position", &record).unwrap();
        assert_eq!(rec.value, Some(json!("bottom")));
        assert_eq!(rec.dependency.as_deref(), Some("show-panel"));
        assert_eq!(rec.select_dir, Some(true));
        assert_eq!(rec.round, Some(2));
        let labels: Vec<_> = rec
            .options
            .unwrap()
            .into_iter()
            .map(|(label, _)| label)
            .collect();
        assert_eq!(labels, vec!["Top", "Bottom", "Left"]);
    }

    #[test]
    fn section_records_have_no_value() {
        let rec = KeyRecord::from_value(
            Path::new("s.json"),
            "head",
            &json!({"type": "header", "description": "General"}),
        )
        .unwrap();
        assert_eq!(rec.value, None);
        assert_eq!(rec.description.as_deref(), Some("General"));
    }

    #[test]
    fn wrongly_typed_hint_is_an_error() {
        assert!(matches!(
            KeyRecord::from_value(Path::new("s.json"), "k", &json!({"round": "two"})),
            Err(Error::Parse { .. })
        ));
    }
}
