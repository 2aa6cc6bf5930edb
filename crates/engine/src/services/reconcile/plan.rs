//! Turning resolved personalizations into task upserts.

use printline_core::{DataSource, PrintTaskStatus};

use crate::ai::{AiOrderResponse, ItemPersonalizationResult, item_key};
use crate::customization::Resolved;
use crate::models::print_task::{SHORTHAND_NAME_MAX, join_review_reasons, truncate_chars};
use crate::models::{LineItem, Order, PrintTask, TaskFields, TaskLinkage, TaskUpsert};

/// Text written to tasks nothing could be resolved for.
pub const PLACEHOLDER_TEXT: &str = "Placeholder - Review Needed";

/// Outcome of the fallback chain for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemResolution {
    Deterministic(Resolved),
    Ai(ItemPersonalizationResult),
    Placeholder { reason: String },
}

impl ItemResolution {
    #[must_use]
    pub const fn source(&self) -> DataSource {
        match self {
            Self::Deterministic(resolved) => resolved.source,
            Self::Ai(_) => DataSource::Ai,
            Self::Placeholder { .. } => DataSource::Placeholder,
        }
    }

    /// Pick an item's entry out of the order-wide AI reply.
    #[must_use]
    pub fn from_ai(response: &AiOrderResponse, line: &LineItem) -> Self {
        match response.item_personalizations.get(&item_key(line)) {
            None => Self::Placeholder {
                reason: "No AI data for item".to_string(),
            },
            Some(result) if result.personalizations.is_empty() => Self::Placeholder {
                reason: "AI returned zero personalizations".to_string(),
            },
            Some(result) => Self::Ai(result.clone()),
        }
    }
}

/// One item's resolution plus anything noted on the way.
#[derive(Debug, Clone)]
pub struct ItemPlan<'a> {
    pub line: &'a LineItem,
    pub resolution: ItemResolution,
    /// A deterministic source that failed (not merely missed) for this item.
    pub fallback_note: Option<String>,
}

struct Draft {
    custom_text: Option<String>,
    color_1: Option<String>,
    color_2: Option<String>,
    quantity: i32,
    needs_review: bool,
    review_reason: Option<String>,
    annotation: Option<String>,
}

impl ItemPlan<'_> {
    /// Tasks for this item, indexed from 0 in personalization order.
    ///
    /// With `preserve_text`, a task that already exists at the same index
    /// keeps its custom text; everything else is refreshed.
    #[must_use]
    pub fn upserts(&self, order: &Order, existing: &[PrintTask], preserve_text: bool) -> Vec<TaskUpsert> {
        let linkage = TaskLinkage {
            order_id: order.id,
            product_id: self.line.item.product_id,
            customer_id: order.customer_id,
            shorthand_product_name: Some(truncate_chars(&self.line.product.name, SHORTHAND_NAME_MAX)),
            marketplace_order_number: Some(order.shipstation_order_number.clone()),
        };

        self.drafts()
            .into_iter()
            .zip(0_i32..)
            .map(|(mut draft, task_index)| {
                if preserve_text {
                    let previous = existing
                        .iter()
                        .find(|t| t.order_item_id == self.line.item.id && t.task_index == task_index)
                        .and_then(|t| t.custom_text.clone());
                    if let Some(previous) = previous {
                        self.preserve(&mut draft, previous, task_index);
                    }
                }
                if let Some(note) = &self.fallback_note {
                    draft.annotation = append_annotation(draft.annotation, note);
                }

                TaskUpsert {
                    order_item_id: self.line.item.id,
                    task_index,
                    linkage: linkage.clone(),
                    fields: TaskFields {
                        custom_text: draft.custom_text,
                        color_1: draft.color_1,
                        color_2: draft.color_2,
                        quantity: draft.quantity,
                        status: PrintTaskStatus::Pending,
                        needs_review: draft.needs_review,
                        review_reason: draft.review_reason,
                        annotation: draft.annotation,
                        ship_by_date: order.ship_by_date,
                    },
                }
            })
            .collect()
    }

    fn drafts(&self) -> Vec<Draft> {
        let quantity = self.line.item.quantity;
        match &self.resolution {
            ItemResolution::Deterministic(resolved) => vec![Draft {
                custom_text: resolved.custom_text.clone(),
                color_1: resolved.color_1.clone(),
                color_2: resolved.color_2.clone(),
                quantity,
                needs_review: resolved.needs_review,
                review_reason: join_review_reasons(resolved.review_reason.as_deref()),
                annotation: Some(resolved.annotation.clone()),
            }],
            ItemResolution::Ai(result) => result
                .personalizations
                .iter()
                .map(|detail| {
                    let needs_review = result.overall_needs_review || detail.needs_review;
                    let detail_reason = detail.review_reason.as_deref().filter(|_| detail.needs_review);
                    let annotation_reason = detail
                        .annotation
                        .as_deref()
                        .filter(|_| needs_review)
                        .map(|a| format!("Annotation: {a}"));
                    let review_reason = join_review_reasons(
                        result
                            .overall_review_reason
                            .as_deref()
                            .into_iter()
                            .chain(detail_reason)
                            .chain(annotation_reason.as_deref()),
                    );
                    Draft {
                        custom_text: detail.custom_text.clone(),
                        color_1: detail.color_1.clone(),
                        color_2: detail.color_2.clone(),
                        quantity: detail.quantity,
                        needs_review,
                        review_reason,
                        annotation: detail.annotation.clone(),
                    }
                })
                .collect(),
            ItemResolution::Placeholder { reason } => vec![Draft {
                custom_text: Some(PLACEHOLDER_TEXT.to_string()),
                color_1: None,
                color_2: None,
                quantity,
                needs_review: true,
                review_reason: join_review_reasons([reason.as_str()]),
                annotation: Some(format!("Placeholder created: {reason}")),
            }],
        }
    }

    fn preserve(&self, draft: &mut Draft, previous: String, task_index: i32) {
        let message = if matches!(self.resolution, ItemResolution::Placeholder { .. }) {
            Some(format!("Preserving existing text for placeholder: \"{previous}\""))
        } else if draft.custom_text.as_deref() == Some(previous.as_str()) {
            None
        } else {
            Some(format!(
                "Preserved original text: \"{previous}\" instead of {}: \"{}\"",
                self.resolution.source(),
                draft.custom_text.as_deref().unwrap_or_default()
            ))
        };
        if let Some(message) = message {
            tracing::info!(item_id = %self.line.item.id, task_index, "{message}");
            draft.annotation = append_annotation(draft.annotation.take(), &message);
        }
        draft.custom_text = Some(previous);
    }
}

fn append_annotation(annotation: Option<String>, extra: &str) -> Option<String> {
    match annotation {
        Some(existing) if !existing.is_empty() => Some(format!("{existing}; {extra}")),
        _ => Some(extra.to_string()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use chrono::Utc;
    use printline_core::{OrderId, OrderItemId, OrderStatus, PrintTaskId, ProductId};
    use rust_decimal::Decimal;

    use super::*;
    use crate::ai::PersonalizationDetail;
    use crate::customization::FILE_ANNOTATION;
    use crate::models::{OrderItem, PrintSettings, Product};

    fn order() -> Order {
        Order {
            id: OrderId::new(7),
            shipstation_order_id: 700,
            shipstation_order_number: "114-1234567-1234567".to_string(),
            order_key: None,
            order_status: OrderStatus::AwaitingShipment,
            marketplace: Some("Amazon".to_string()),
            customer_id: None,
            customer_name: None,
            customer_notes: None,
            internal_notes: None,
            order_date: None,
            ship_by_date: None,
            shipstation_modified_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn line(quantity: i32) -> LineItem {
        LineItem {
            item: OrderItem {
                id: OrderItemId::new(11),
                order_id: OrderId::new(7),
                product_id: ProductId::new(3),
                shipstation_line_item_key: Some("li-11".to_string()),
                quantity,
                unit_price: Decimal::ONE,
                print_settings: PrintSettings::default(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            product: Product {
                id: ProductId::new(3),
                sku: Some("KEY-1".to_string()),
                shipstation_product_id: None,
                name: "N".repeat(150),
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

    fn detail(text: &str, quantity: i32) -> PersonalizationDetail {
        PersonalizationDetail {
            custom_text: Some(text.to_string()),
            color_1: Some("Red".to_string()),
            color_2: None,
            quantity,
            needs_review: false,
            review_reason: None,
            annotation: None,
        }
    }

    fn existing(task_index: i32, text: &str) -> PrintTask {
        PrintTask {
            id: PrintTaskId::new(100 + task_index),
            order_id: OrderId::new(7),
            order_item_id: OrderItemId::new(11),
            task_index,
            product_id: ProductId::new(3),
            customer_id: None,
            shorthand_product_name: None,
            marketplace_order_number: None,
            custom_text: Some(text.to_string()),
            color_1: Some("Old".to_string()),
            color_2: None,
            quantity: 1,
            status: PrintTaskStatus::Pending,
            needs_review: false,
            review_reason: None,
            annotation: None,
            ship_by_date: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn file_resolution() -> ItemResolution {
        ItemResolution::Deterministic(Resolved {
            source: DataSource::CustomizationFile,
            custom_text: Some("HELLO".to_string()),
            color_1: Some("RED".to_string()),
            color_2: Some("BLUE".to_string()),
            annotation: FILE_ANNOTATION.to_string(),
            needs_review: false,
            review_reason: None,
        })
    }

    #[test]
    fn test_deterministic_item_yields_one_task() {
        let line = line(2);
        let plan = ItemPlan {
            line: &line,
            resolution: file_resolution(),
            fallback_note: None,
        };
        let upserts = plan.upserts(&order(), &[], false);
        assert_eq!(upserts.len(), 1);
        let task = &upserts[0];
        assert_eq!(task.task_index, 0);
        assert_eq!(task.fields.custom_text.as_deref(), Some("HELLO"));
        assert_eq!(task.fields.quantity, 2);
        assert!(!task.fields.needs_review);
        assert_eq!(task.fields.annotation.as_deref(), Some(FILE_ANNOTATION));
        assert_eq!(
            task.linkage.shorthand_product_name.as_ref().map(|n| n.chars().count()),
            Some(SHORTHAND_NAME_MAX)
        );
        assert_eq!(
            task.linkage.marketplace_order_number.as_deref(),
            Some("114-1234567-1234567")
        );
    }

    #[test]
    fn test_ai_personalizations_are_indexed_in_order() {
        let line = line(3);
        let plan = ItemPlan {
            line: &line,
            resolution: ItemResolution::Ai(ItemPersonalizationResult {
                personalizations: vec![detail("A", 1), detail("B", 1), detail("C", 1)],
                overall_needs_review: false,
                overall_review_reason: None,
            }),
            fallback_note: None,
        };
        let upserts = plan.upserts(&order(), &[], false);
        let indexes: Vec<i32> = upserts.iter().map(|u| u.task_index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        assert_eq!(upserts[2].fields.custom_text.as_deref(), Some("C"));
    }

    #[test]
    fn test_item_review_spreads_to_every_task() {
        let line = line(2);
        let mut flagged = detail("B", 1);
        flagged.needs_review = true;
        flagged.review_reason = Some("Spelling unclear".to_string());
        flagged.annotation = Some("Guessed from notes".to_string());
        let plan = ItemPlan {
            line: &line,
            resolution: ItemResolution::Ai(ItemPersonalizationResult {
                personalizations: vec![detail("A", 1), flagged],
                overall_needs_review: true,
                overall_review_reason: Some("Qty Mismatch (AI Total: 2, Order Item: 3)".to_string()),
            }),
            fallback_note: None,
        };
        let upserts = plan.upserts(&order(), &[], false);
        assert!(upserts.iter().all(|u| u.fields.needs_review));
        assert_eq!(
            upserts[0].fields.review_reason.as_deref(),
            Some("Qty Mismatch (AI Total: 2, Order Item: 3)")
        );
        assert_eq!(
            upserts[1].fields.review_reason.as_deref(),
            Some("Qty Mismatch (AI Total: 2, Order Item: 3); Spelling unclear; Annotation: Guessed from notes")
        );
    }

    #[test]
    fn test_missing_ai_entry_becomes_placeholder() {
        let line = line(4);
        let response = AiOrderResponse {
            item_personalizations: std::collections::BTreeMap::new(),
        };
        let resolution = ItemResolution::from_ai(&response, &line);
        assert_eq!(resolution.source(), DataSource::Placeholder);

        let plan = ItemPlan {
            line: &line,
            resolution,
            fallback_note: Some("Amazon URL Error: HTTP 404".to_string()),
        };
        let upserts = plan.upserts(&order(), &[], false);
        assert_eq!(upserts.len(), 1);
        let fields = &upserts[0].fields;
        assert_eq!(fields.custom_text.as_deref(), Some(PLACEHOLDER_TEXT));
        assert_eq!(fields.quantity, 4);
        assert!(fields.needs_review);
        assert_eq!(fields.review_reason.as_deref(), Some("No AI data for item"));
        assert_eq!(
            fields.annotation.as_deref(),
            Some("Placeholder created: No AI data for item; Amazon URL Error: HTTP 404")
        );
    }

    #[test]
    fn test_preserve_text_keeps_old_text_and_new_colors() {
        let line = line(1);
        let plan = ItemPlan {
            line: &line,
            resolution: file_resolution(),
            fallback_note: None,
        };
        let upserts = plan.upserts(&order(), &[existing(0, "Grandma")], true);
        let fields = &upserts[0].fields;
        assert_eq!(fields.custom_text.as_deref(), Some("Grandma"));
        assert_eq!(fields.color_1.as_deref(), Some("RED"));
        let annotation = fields.annotation.as_deref().unwrap();
        assert!(annotation.starts_with(FILE_ANNOTATION));
        assert!(annotation.contains("Preserved original text: \"Grandma\" instead of AmazonURL: \"HELLO\""));
    }

    #[test]
    fn test_preserve_text_ignores_other_indexes() {
        let line = line(1);
        let plan = ItemPlan {
            line: &line,
            resolution: file_resolution(),
            fallback_note: None,
        };
        let upserts = plan.upserts(&order(), &[existing(1, "Grandma")], true);
        assert_eq!(upserts[0].fields.custom_text.as_deref(), Some("HELLO"));
        assert_eq!(upserts[0].fields.annotation.as_deref(), Some(FILE_ANNOTATION));
    }

    #[test]
    fn test_preserve_text_off_overwrites() {
        let line = line(1);
        let plan = ItemPlan {
            line: &line,
            resolution: file_resolution(),
            fallback_note: None,
        };
        let upserts = plan.upserts(&order(), &[existing(0, "Grandma")], false);
        assert_eq!(upserts[0].fields.custom_text.as_deref(), Some("HELLO"));
    }
}
