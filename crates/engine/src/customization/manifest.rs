//! Amazon customization manifest parsing.
//!
//! Two manifest shapes exist in the wild. Newer files carry
//! `customizationInfo["version3.0"].surfaces[0].areas`; older ones only have
//! a `customizationData.children` tree. The tree is walked when the areas
//! yield no text or no colors.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static COLOR_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(colour|color).*?(1|accent|text|base|background)?").expect("Invalid regex")
});

static TEXT_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)text").expect("Invalid regex"));

/// What a manifest yielded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomizationData {
    pub custom_text: Option<String>,
    pub color_1: Option<String>,
    pub color_2: Option<String>,
    /// Every top-level key, non-string values JSON-encoded.
    pub all_fields: BTreeMap<String, Option<String>>,
    pub raw_json: Value,
}

impl CustomizationData {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.custom_text.is_none() && self.color_1.is_none() && self.color_2.is_none()
    }
}

/// Extract text and up to two colors from a parsed manifest.
#[must_use]
pub fn parse_manifest(manifest: &Value) -> CustomizationData {
    let mut found = Found::default();

    for area in v3_areas(manifest) {
        found.visit_area(area);
    }

    if found.text.is_none() || (found.color_1.is_none() && found.color_2.is_none()) {
        if let Some(children) = manifest
            .pointer("/customizationData/children")
            .and_then(Value::as_array)
        {
            found.walk_tree(children);
        }
    }

    CustomizationData {
        custom_text: found.text,
        color_1: found.color_1,
        color_2: found.color_2,
        all_fields: flatten_top_level(manifest),
        raw_json: manifest.clone(),
    }
}

fn v3_areas(manifest: &Value) -> &[Value] {
    manifest
        .get("customizationInfo")
        .and_then(|info| info.get("version3.0"))
        .and_then(|v3| v3.get("surfaces"))
        .and_then(Value::as_array)
        .and_then(|surfaces| surfaces.first())
        .and_then(|surface| surface.get("areas"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

#[derive(Default)]
struct Found {
    text: Option<String>,
    color_1: Option<String>,
    color_2: Option<String>,
}

impl Found {
    fn visit_area(&mut self, area: &Value) {
        let tag = tag_of(area);
        let kind = str_field(area, "customizationType");

        if self.text.is_none() && (kind == Some("TextPrinting") || TEXT_TAG.is_match(&tag)) {
            self.text = non_blank(str_field(area, "text"));
        }

        if kind == Some("Options") && COLOR_TAG.is_match(&tag) {
            self.add_color(non_blank(str_field(area, "optionValue")));
        }
    }

    fn walk_tree(&mut self, nodes: &[Value]) {
        for node in nodes {
            if self.text.is_none() && str_field(node, "type") == Some("TextCustomization") {
                self.text = non_blank(str_field(node, "inputValue").or_else(|| str_field(node, "text")));
            }

            if COLOR_TAG.is_match(&tag_of(node)) {
                let value = str_field(node, "displayValue")
                    .or_else(|| str_field(node, "optionValue"))
                    .or_else(|| {
                        node.get("optionSelection")
                            .and_then(|s| str_field(s, "name"))
                    });
                self.add_color(non_blank(value));
            }

            if let Some(children) = node.get("children").and_then(Value::as_array) {
                self.walk_tree(children);
            }
        }
    }

    fn add_color(&mut self, value: Option<String>) {
        let Some(value) = value else {
            return;
        };
        if self.color_1.is_none() {
            self.color_1 = Some(value);
        } else if self.color_2.is_none() && self.color_1.as_deref() != Some(value.as_str()) {
            self.color_2 = Some(value);
        }
    }
}

fn tag_of(node: &Value) -> String {
    format!(
        "{} {}",
        str_field(node, "label").unwrap_or_default(),
        str_field(node, "name").unwrap_or_default()
    )
}

fn str_field<'a>(node: &'a Value, key: &str) -> Option<&'a str> {
    node.get(key).and_then(Value::as_str)
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

fn flatten_top_level(manifest: &Value) -> BTreeMap<String, Option<String>> {
    let Some(map) = manifest.as_object() else {
        return BTreeMap::new();
    };
    map.iter()
        .map(|(key, value)| {
            let flat = match value {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            };
            (key.clone(), flat)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_tag_patterns_compile() {
        assert!(COLOR_TAG.is_match("Colour 1"));
        assert!(TEXT_TAG.is_match("Name Text"));
        assert!(!TEXT_TAG.is_match("Font"));
    }

    #[test]
    fn test_v3_areas_text_and_two_colors() {
        let manifest = json!({
            "orderId": "114-1",
            "customizationInfo": { "version3.0": { "surfaces": [{ "areas": [
                { "customizationType": "TextPrinting", "label": "Name", "text": "HELLO" },
                { "customizationType": "Options", "label": "Colour 1", "optionValue": "RED" },
                { "customizationType": "Options", "label": "Colour 2", "optionValue": "BLUE" }
            ]}]}}
        });

        let data = parse_manifest(&manifest);
        assert_eq!(data.custom_text.as_deref(), Some("HELLO"));
        assert_eq!(data.color_1.as_deref(), Some("RED"));
        assert_eq!(data.color_2.as_deref(), Some("BLUE"));
        assert_eq!(data.all_fields.get("orderId"), Some(&Some("114-1".to_string())));
    }

    #[test]
    fn test_duplicate_color_not_used_twice() {
        let manifest = json!({
            "customizationInfo": { "version3.0": { "surfaces": [{ "areas": [
                { "customizationType": "TextPrinting", "text": "Ava" },
                { "customizationType": "Options", "name": "Base Color", "optionValue": "Pink" },
                { "customizationType": "Options", "name": "Text Color", "optionValue": "Pink" }
            ]}]}}
        });

        let data = parse_manifest(&manifest);
        assert_eq!(data.color_1.as_deref(), Some("Pink"));
        assert_eq!(data.color_2, None);
    }

    #[test]
    fn test_children_tree_fallback() {
        let manifest = json!({
            "customizationData": { "children": [
                { "type": "FlatContainerCustomization", "children": [
                    { "type": "TextCustomization", "label": "Your Name", "inputValue": "Jonah" },
                    { "type": "OptionCustomization", "label": "Colour",
                      "optionSelection": { "name": "Green" } },
                    { "type": "OptionCustomization", "name": "Accent colour",
                      "displayValue": "Gold" }
                ]}
            ]}
        });

        let data = parse_manifest(&manifest);
        assert_eq!(data.custom_text.as_deref(), Some("Jonah"));
        assert_eq!(data.color_1.as_deref(), Some("Green"));
        assert_eq!(data.color_2.as_deref(), Some("Gold"));
    }

    #[test]
    fn test_tree_fills_missing_colors_only() {
        let manifest = json!({
            "customizationInfo": { "version3.0": { "surfaces": [{ "areas": [
                { "customizationType": "TextPrinting", "text": "Mia" }
            ]}]}},
            "customizationData": { "children": [
                { "type": "TextCustomization", "inputValue": "Ignored" },
                { "label": "Color", "displayValue": "Purple" }
            ]}
        });

        let data = parse_manifest(&manifest);
        assert_eq!(data.custom_text.as_deref(), Some("Mia"));
        assert_eq!(data.color_1.as_deref(), Some("Purple"));
    }

    #[test]
    fn test_all_fields_stringifies_non_strings() {
        let data = parse_manifest(&json!({ "quantity": 2, "gift": null, "meta": { "a": 1 } }));
        assert!(data.is_empty());
        assert_eq!(data.all_fields.get("quantity"), Some(&Some("2".to_string())));
        assert_eq!(data.all_fields.get("gift"), Some(&None));
        assert_eq!(data.all_fields.get("meta"), Some(&Some(r#"{"a":1}"#.to_string())));
    }
}
