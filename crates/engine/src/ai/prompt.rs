//! Prompt templates and the per-order input document.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use printline_core::{OrderId, ProductId};

use super::AiError;
use crate::config::PromptConfig;
use crate::models::{LineItem, Order, PrintSetting};

const BUILTIN_SYSTEM_PROMPT: &str = include_str!("../../prompts/system.txt");
const BUILTIN_USER_TEMPLATE: &str = include_str!("../../prompts/user_template.txt");

/// Marker in the user template replaced by the order JSON.
pub const INPUT_PLACEHOLDER: &str = "{INPUT_DATA_JSON}";

const RECREATE_INSTRUCTION: &str = "\n\nThese tasks are being regenerated from scratch. \
Re-read every item carefully and return a complete personalization list even if earlier \
results may exist.";

const PRESERVE_TEXT_INSTRUCTION: &str = "\n\nThese tasks are being regenerated and the \
existing custom text will be kept. Focus on getting colors and quantities right; still \
return your best reading of the text for every personalization.";

/// How the tasks being extracted relate to existing ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Regeneration {
    /// First extraction for these items.
    #[default]
    Fresh,
    /// Existing tasks were deleted first.
    Recreate,
    /// Existing tasks were deleted but their text will be kept.
    RecreatePreservingText,
}

impl Regeneration {
    #[must_use]
    pub const fn from_flags(force_recreate: bool, preserve_text: bool) -> Self {
        match (force_recreate, preserve_text) {
            (false, _) => Self::Fresh,
            (true, false) => Self::Recreate,
            (true, true) => Self::RecreatePreservingText,
        }
    }

    const fn instruction(self) -> &'static str {
        match self {
            Self::Fresh => "",
            Self::Recreate => RECREATE_INSTRUCTION,
            Self::RecreatePreservingText => PRESERVE_TEXT_INSTRUCTION,
        }
    }
}

/// System prompt and user template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    pub system: String,
    pub user_template: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            system: BUILTIN_SYSTEM_PROMPT.to_string(),
            user_template: BUILTIN_USER_TEMPLATE.to_string(),
        }
    }
}

impl PromptSet {
    /// Built-in prompts, with any configured file overrides applied.
    ///
    /// # Errors
    ///
    /// Returns `std::io::Error` if an override file cannot be read.
    pub fn load(config: &PromptConfig) -> std::io::Result<Self> {
        let mut prompts = Self::default();
        if let Some(path) = &config.system_prompt_path {
            prompts.system = read_prompt(path)?;
        }
        if let Some(path) = &config.user_prompt_path {
            prompts.user_template = read_prompt(path)?;
        }
        Ok(prompts)
    }

    /// Fill the templates for one order.
    ///
    /// # Errors
    ///
    /// Returns `AiError::Prompt` if the input cannot be serialized.
    pub fn render(
        &self,
        input: &AiPromptInput,
        regeneration: Regeneration,
    ) -> Result<RenderedPrompt, AiError> {
        let input_json = serde_json::to_string_pretty(input)?;
        Ok(RenderedPrompt {
            system: format!("{}{}", self.system, regeneration.instruction()),
            user: self.user_template.replacen(INPUT_PLACEHOLDER, &input_json, 1),
        })
    }
}

fn read_prompt(path: &Path) -> std::io::Result<String> {
    tracing::debug!(path = %path.display(), "Reading prompt override");
    fs::read_to_string(path)
}

/// A filled-in prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
}

impl RenderedPrompt {
    /// Both parts as one string, the form stored in the audit log.
    #[must_use]
    pub fn transcript(&self) -> String {
        format!("System:\n{}\n\nUser:\n{}", self.system, self.user)
    }
}

/// The order document sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiPromptInput {
    pub order_id: OrderId,
    pub order_number: String,
    pub order_date: Option<DateTime<Utc>>,
    pub marketplace: Option<String>,
    pub customer_name: Option<String>,
    pub customer_notes: Option<String>,
    pub internal_notes: Option<String>,
    pub items: Vec<AiItemInput>,
}

/// One unresolved line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiItemInput {
    /// Key the model must answer under, see [`item_key`].
    pub id: String,
    pub sku: Option<String>,
    pub product_name: String,
    pub product_id: ProductId,
    pub quantity: i32,
    pub options: Vec<PrintSetting>,
}

impl AiPromptInput {
    /// Build the document for `items`, which need not be every item of the
    /// order.
    #[must_use]
    pub fn new(order: &Order, items: &[&LineItem]) -> Self {
        Self {
            order_id: order.id,
            order_number: order.shipstation_order_number.clone(),
            order_date: order.order_date,
            marketplace: order.marketplace.clone(),
            customer_name: order.customer_name.clone(),
            customer_notes: order.customer_notes.clone(),
            internal_notes: order.internal_notes.clone(),
            items: items.iter().map(|line| AiItemInput::new(line)).collect(),
        }
    }
}

impl AiItemInput {
    #[must_use]
    pub fn new(line: &LineItem) -> Self {
        Self {
            id: item_key(line),
            sku: line.product.sku.clone(),
            product_name: line.product.name.clone(),
            product_id: line.product.id,
            quantity: line.item.quantity,
            options: line.item.print_settings.iter().cloned().collect(),
        }
    }
}

/// Key an item is known by in the prompt and the reply: the ShipStation
/// line item key, or the local item ID when there is none.
#[must_use]
pub fn item_key(line: &LineItem) -> String {
    line.item
        .shipstation_line_item_key
        .clone()
        .unwrap_or_else(|| line.item.id.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use printline_core::{OrderItemId, OrderStatus};
    use rust_decimal::Decimal;

    use super::*;
    use crate::models::{OrderItem, PrintSettings, Product};

    fn order() -> Order {
        Order {
            id: OrderId::new(10),
            shipstation_order_id: 5001,
            shipstation_order_number: "114-000-1".to_string(),
            order_key: None,
            order_status: OrderStatus::AwaitingShipment,
            marketplace: Some("Etsy".to_string()),
            customer_id: None,
            customer_name: Some("Ann".to_string()),
            customer_notes: Some("Please write Tom".to_string()),
            internal_notes: None,
            order_date: None,
            ship_by_date: None,
            shipstation_modified_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn line(key: Option<&str>) -> LineItem {
        LineItem {
            item: OrderItem {
                id: OrderItemId::new(3),
                order_id: OrderId::new(10),
                product_id: ProductId::new(4),
                shipstation_line_item_key: key.map(str::to_owned),
                quantity: 2,
                unit_price: Decimal::ONE,
                print_settings: PrintSettings::new(vec![PrintSetting {
                    name: "Colour".to_string(),
                    value: "Red".to_string(),
                }]),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            product: Product {
                id: ProductId::new(4),
                sku: Some("TAG-01".to_string()),
                shipstation_product_id: None,
                name: "Name Tag".to_string(),
                image_url: None,
                weight_value: None,
                weight_units: None,
                warehouse_location: None,
                fulfillment_sku: None,
                upc: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
        }
    }

    #[test]
    fn test_item_key_prefers_line_item_key() {
        assert_eq!(item_key(&line(Some("li-abc"))), "li-abc");
        assert_eq!(item_key(&line(None)), "3");
    }

    #[test]
    fn test_render_substitutes_input_json() {
        let prompts = PromptSet {
            system: "SYS".to_string(),
            user_template: "Data:\n{INPUT_DATA_JSON}\nEnd".to_string(),
        };
        let item = line(Some("li-abc"));
        let input = AiPromptInput::new(&order(), &[&item]);
        let rendered = prompts.render(&input, Regeneration::Fresh).unwrap();

        assert_eq!(rendered.system, "SYS");
        assert!(rendered.user.starts_with("Data:\n{"));
        assert!(rendered.user.ends_with("}\nEnd"));
        assert!(rendered.user.contains(r#""id": "li-abc""#));
        assert!(rendered.user.contains(r#""customerNotes": "Please write Tom""#));
        assert!(rendered.transcript().starts_with("System:\nSYS\n\nUser:\nData:"));
    }

    #[test]
    fn test_recreate_appends_instruction() {
        let prompts = PromptSet::default();
        let input = AiPromptInput::new(&order(), &[]);
        let fresh = prompts.render(&input, Regeneration::Fresh).unwrap();
        let recreate = prompts.render(&input, Regeneration::Recreate).unwrap();
        let preserve = prompts
            .render(&input, Regeneration::RecreatePreservingText)
            .unwrap();

        assert!(recreate.system.starts_with(&fresh.system));
        assert!(recreate.system.len() > fresh.system.len());
        assert_ne!(recreate.system, preserve.system);
        assert_eq!(
            Regeneration::from_flags(false, true),
            Regeneration::Fresh
        );
    }

    #[test]
    fn test_builtin_template_has_placeholder() {
        assert!(PromptSet::default().user_template.contains(INPUT_PLACEHOLDER));
    }

    #[test]
    fn test_load_without_overrides_is_builtin() {
        let prompts = PromptSet::load(&PromptConfig::default()).unwrap();
        assert_eq!(prompts, PromptSet::default());
    }
}
