//! Normalized view of a line item's `print_settings` payload.
//!
//! ShipStation hands us item options as an array of `{name, value}` pairs,
//! while older rows and some marketplaces store a flat object keyed by option
//! name. Both shapes are folded into one ordered list at the boundary and all
//! lookups are case-insensitive on the option name.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Option name that carries the Amazon customization archive URL.
const CUSTOMIZED_URL_KEY: &str = "customizedurl";

/// One named option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintSetting {
    pub name: String,
    pub value: String,
}

/// Line item print settings, normalized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrintSettings {
    entries: Vec<PrintSetting>,
}

impl PrintSettings {
    /// Build from explicit entries.
    #[must_use]
    pub const fn new(entries: Vec<PrintSetting>) -> Self {
        Self { entries }
    }

    /// Normalize a raw JSON payload.
    ///
    /// Accepts an array of `{name, value}` objects, a single `{name, value}`
    /// object, or a flat `{key: value}` object. Anything else (including
    /// `null`) yields empty settings. Null values are dropped; numbers and
    /// booleans are kept in their JSON text form.
    #[must_use]
    pub fn from_json(raw: &Value) -> Self {
        let entries = match raw {
            Value::Array(items) => items.iter().filter_map(pair_from_object).collect(),
            Value::Object(map) => {
                if let Some(pair) = pair_from_object(raw) {
                    vec![pair]
                } else {
                    map.iter()
                        .filter_map(|(name, value)| {
                            scalar_to_string(value).map(|value| PrintSetting {
                                name: name.clone(),
                                value,
                            })
                        })
                        .collect()
                }
            }
            _ => Vec::new(),
        };
        Self { entries }
    }

    /// Array-of-pairs JSON form, the shape persisted in the database.
    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Array(
            self.entries
                .iter()
                .map(|e| serde_json::json!({ "name": e.name, "value": e.value }))
                .collect(),
        )
    }

    /// Value of the first option whose name matches `name` ignoring case.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .map(|e| e.value.as_str())
    }

    /// The Amazon `CustomizedURL` option, if present and non-empty.
    #[must_use]
    pub fn customization_url(&self) -> Option<&str> {
        self.get(CUSTOMIZED_URL_KEY)
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// Value of the first option named like a color ("Color", "Colour 1", ...).
    #[must_use]
    pub fn color_option(&self) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| {
                let name = e.name.to_lowercase();
                name.contains("color") || name.contains("colour")
            })
            .map(|e| e.value.as_str())
    }

    /// Whether any option value equals `value` ignoring case.
    #[must_use]
    pub fn contains_value(&self, value: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.value.eq_ignore_ascii_case(value))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PrintSetting> {
        self.entries.iter()
    }
}

fn pair_from_object(value: &Value) -> Option<PrintSetting> {
    let map = value.as_object()?;
    let name = map.get("name")?.as_str()?;
    let value = scalar_to_string(map.get("value")?)?;
    Some(PrintSetting {
        name: name.to_owned(),
        value,
    })
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
