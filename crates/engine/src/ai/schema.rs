//! Expected shape of the model's reply.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::AiError;
use super::repair::{repair_truncated, strip_code_fence};

/// Reply for a whole order, keyed by [`super::item_key`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiOrderResponse {
    pub item_personalizations: BTreeMap<String, ItemPersonalizationResult>,
}

/// Everything the model found for one line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPersonalizationResult {
    pub personalizations: Vec<PersonalizationDetail>,
    pub overall_needs_review: bool,
    pub overall_review_reason: Option<String>,
}

/// One distinct personalized unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalizationDetail {
    pub custom_text: Option<String>,
    #[serde(rename = "color1")]
    pub color_1: Option<String>,
    #[serde(rename = "color2", default)]
    pub color_2: Option<String>,
    pub quantity: i32,
    #[serde(default)]
    pub needs_review: bool,
    pub review_reason: Option<String>,
    #[serde(default)]
    pub annotation: Option<String>,
}

impl AiOrderResponse {
    /// Personalizations across all items.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.item_personalizations
            .values()
            .map(|item| item.personalizations.len())
            .sum()
    }

    /// Items the model, or quantity reconciliation, flagged.
    #[must_use]
    pub fn needs_review_count(&self) -> usize {
        self.item_personalizations
            .values()
            .filter(|item| item.overall_needs_review)
            .count()
    }

    fn validate(&self) -> Result<(), AiError> {
        for (key, item) in &self.item_personalizations {
            for (index, detail) in item.personalizations.iter().enumerate() {
                if detail.quantity <= 0 {
                    return Err(AiError::Validation(format!(
                        "itemPersonalizations.{key}.personalizations[{index}].quantity must be positive, got {}",
                        detail.quantity
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Parse and validate raw model output.
///
/// A surrounding code fence is stripped first. Text that does not parse is
/// given one repair attempt (see [`repair_truncated`]).
///
/// # Errors
///
/// Returns `AiError::InvalidJson` if the text is not JSON after repair and
/// `AiError::Validation` if it does not match [`AiOrderResponse`] or a
/// quantity is not positive.
pub fn parse_response(raw: &str) -> Result<AiOrderResponse, AiError> {
    let cleaned = strip_code_fence(raw);

    let value: Value = match serde_json::from_str(cleaned) {
        Ok(value) => value,
        Err(first) => {
            let repaired =
                repair_truncated(cleaned).ok_or_else(|| AiError::InvalidJson(first.to_string()))?;
            tracing::warn!(
                original_len = cleaned.len(),
                repaired_len = repaired.len(),
                "AI reply was truncated, parsing up to the last complete item"
            );
            serde_json::from_str(&repaired).map_err(|e| AiError::InvalidJson(e.to_string()))?
        }
    };

    let response: AiOrderResponse =
        serde_json::from_value(value).map_err(|e| AiError::Validation(e.to_string()))?;
    response.validate()?;
    Ok(response)
}
