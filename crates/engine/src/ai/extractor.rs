//! One AI extraction per order, with its audit record.

use std::sync::Arc;
use std::time::Instant;

use tracing::instrument;

use super::prompt::{AiPromptInput, PromptSet, Regeneration, item_key};
use super::schema::{AiOrderResponse, parse_response};
use super::{AiError, CompletionProvider};
use crate::models::ai_call_log::AI_PROVIDER;
use crate::models::print_task::join_review_reasons;
use crate::models::{LineItem, NewAiCallLog, Order};

/// Component name written to the audit log by the print queue run.
pub const QUEUE_SCRIPT_NAME: &str = "populate-print-queue";

/// Outcome of one call, together with what was sent and received.
#[derive(Debug)]
pub struct AiExtraction {
    pub outcome: Result<AiOrderResponse, AiError>,
    /// Full prompt, see [`super::RenderedPrompt::transcript`].
    pub prompt: String,
    pub raw_response: Option<String>,
    /// Audit record; the caller decides whether to persist it.
    pub log: NewAiCallLog,
}

impl AiExtraction {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Builds prompts, calls the provider and checks the reply.
#[derive(Clone)]
pub struct AiExtractor {
    provider: Arc<dyn CompletionProvider>,
    prompts: PromptSet,
    script_name: String,
}

impl AiExtractor {
    #[must_use]
    pub fn new(provider: Arc<dyn CompletionProvider>, prompts: PromptSet) -> Self {
        Self {
            provider,
            prompts,
            script_name: QUEUE_SCRIPT_NAME.to_string(),
        }
    }

    /// Override the component name recorded in the audit log.
    #[must_use]
    pub fn with_script_name(mut self, name: impl Into<String>) -> Self {
        self.script_name = name.into();
        self
    }

    #[must_use]
    pub fn model(&self) -> &str {
        self.provider.model()
    }

    /// Extract personalizations for `items` of `order`.
    ///
    /// Never returns early: every call, failed or not, yields an audit
    /// record.
    #[instrument(skip_all, fields(order_id = %order.id, items = items.len()))]
    pub async fn extract(
        &self,
        order: &Order,
        items: &[&LineItem],
        regeneration: Regeneration,
    ) -> AiExtraction {
        let started = Instant::now();
        let input = AiPromptInput::new(order, items);

        let (outcome, prompt, raw_response) = match self.prompts.render(&input, regeneration) {
            Ok(rendered) => {
                let prompt = rendered.transcript();
                tracing::info!(model = self.model(), "Calling AI for order");
                match self.provider.complete(&rendered.system, &rendered.user).await {
                    Ok(raw) => {
                        let outcome =
                            parse_response(&raw).map(|response| reconcile_quantities(response, items));
                        (outcome, prompt, Some(raw))
                    }
                    Err(e) => (Err(e), prompt, None),
                }
            }
            Err(e) => (Err(e), String::new(), None),
        };

        let elapsed_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
        match &outcome {
            Ok(response) => tracing::info!(
                elapsed_ms,
                tasks = response.task_count(),
                needs_review = response.needs_review_count(),
                "AI response validated"
            ),
            Err(e) => tracing::error!(elapsed_ms, error = %e, "AI extraction failed"),
        }

        let log = self.audit_record(order, &outcome, &prompt, raw_response.as_deref(), elapsed_ms);
        AiExtraction {
            outcome,
            prompt,
            raw_response,
            log,
        }
    }

    fn audit_record(
        &self,
        order: &Order,
        outcome: &Result<AiOrderResponse, AiError>,
        prompt: &str,
        raw_response: Option<&str>,
        processing_time_ms: i64,
    ) -> NewAiCallLog {
        let (tasks_generated, needs_review_count) = outcome.as_ref().map_or((0, 0), |r| {
            (
                i32::try_from(r.task_count()).unwrap_or(i32::MAX),
                i32::try_from(r.needs_review_count()).unwrap_or(i32::MAX),
            )
        });
        NewAiCallLog {
            script_name: self.script_name.clone(),
            order_id: i64::from(order.id.as_i32()),
            order_number: order.shipstation_order_number.clone(),
            marketplace: order.marketplace.clone(),
            ai_provider: AI_PROVIDER.to_string(),
            model_used: self.model().to_string(),
            prompt_sent: prompt.to_string(),
            raw_response: raw_response.map(str::to_owned),
            processing_time_ms,
            success: outcome.is_ok(),
            error_message: outcome.as_ref().err().map(ToString::to_string),
            tasks_generated,
            needs_review_count,
        }
    }
}

/// Flag items whose personalization quantities do not add up.
///
/// The model's own reasons are kept; the mismatch is appended to the
/// item's overall reason.
#[must_use]
pub fn reconcile_quantities(mut response: AiOrderResponse, items: &[&LineItem]) -> AiOrderResponse {
    for line in items {
        let key = item_key(line);
        let Some(result) = response.item_personalizations.get_mut(&key) else {
            continue;
        };
        let total: i64 = result
            .personalizations
            .iter()
            .map(|p| i64::from(p.quantity))
            .sum();
        let ordered = i64::from(line.item.quantity);
        if total == ordered {
            continue;
        }

        let mismatch = format!("Qty Mismatch (AI Total: {total}, Order Item: {ordered})");
        tracing::warn!(item = %key, total, ordered, "AI quantities do not match order");
        result.overall_needs_review = true;
        result.overall_review_reason = join_review_reasons(
            result
                .overall_review_reason
                .as_deref()
                .into_iter()
                .chain(std::iter::once(mismatch.as_str())),
        );
    }
    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;
    use printline_core::{OrderId, OrderItemId, OrderStatus, ProductId};
    use rust_decimal::Decimal;

    use super::*;
    use crate::models::{OrderItem, PrintSettings, Product};

    struct ScriptedProvider {
        reply: Result<String, u16>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        fn model(&self) -> &str {
            "test-model"
        }

        async fn complete(&self, _system: &str, user: &str) -> Result<String, AiError> {
            self.prompts.lock().unwrap().push(user.to_string());
            self.reply.clone().map_err(|status| AiError::Api {
                status,
                message: "boom".to_string(),
            })
        }
    }

    fn order() -> Order {
        Order {
            id: OrderId::new(42),
            shipstation_order_id: 9000,
            shipstation_order_number: "1001".to_string(),
            order_key: None,
            order_status: OrderStatus::AwaitingShipment,
            marketplace: Some("Etsy".to_string()),
            customer_id: None,
            customer_name: None,
            customer_notes: Some("Names: Ava, Ben, Cal".to_string()),
            internal_notes: None,
            order_date: None,
            ship_by_date: None,
            shipstation_modified_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn line(key: &str, quantity: i32) -> LineItem {
        LineItem {
            item: OrderItem {
                id: OrderItemId::new(1),
                order_id: OrderId::new(42),
                product_id: ProductId::new(2),
                shipstation_line_item_key: Some(key.to_string()),
                quantity,
                unit_price: Decimal::ONE,
                print_settings: PrintSettings::default(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            product: Product {
                id: ProductId::new(2),
                sku: Some("KEY-1".to_string()),
                shipstation_product_id: None,
                name: "Keyring".to_string(),
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

    fn reply(quantities: &[i32]) -> String {
        let personalizations: Vec<_> = quantities
            .iter()
            .enumerate()
            .map(|(i, q)| {
                serde_json::json!({
                    "customText": format!("Name {i}"),
                    "color1": "Red",
                    "quantity": q,
                    "reviewReason": null
                })
            })
            .collect();
        serde_json::json!({
            "itemPersonalizations": {
                "li-1": {
                    "personalizations": personalizations,
                    "overallNeedsReview": false,
                    "overallReviewReason": null
                }
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_matching_quantities_need_no_review() {
        let provider = ScriptedProvider::replying(&reply(&[1, 1, 1]));
        let extractor = AiExtractor::new(provider.clone(), PromptSet::default());
        let item = line("li-1", 3);

        let extraction = extractor.extract(&order(), &[&item], Regeneration::Fresh).await;
        let response = extraction.outcome.unwrap();
        assert!(!response.item_personalizations["li-1"].overall_needs_review);
        assert_eq!(extraction.log.tasks_generated, 3);
        assert_eq!(extraction.log.needs_review_count, 0);
        assert!(extraction.log.success);
        assert_eq!(extraction.log.model_used, "test-model");
        assert_eq!(extraction.log.script_name, QUEUE_SCRIPT_NAME);
        assert!(provider.prompts.lock().unwrap()[0].contains("li-1"));
    }

    #[tokio::test]
    async fn test_quantity_mismatch_forces_review() {
        let provider = ScriptedProvider::replying(&reply(&[1, 1]));
        let extractor = AiExtractor::new(provider, PromptSet::default());
        let item = line("li-1", 3);

        let extraction = extractor.extract(&order(), &[&item], Regeneration::Fresh).await;
        let response = extraction.outcome.unwrap();
        let result = &response.item_personalizations["li-1"];
        assert!(result.overall_needs_review);
        assert_eq!(
            result.overall_review_reason.as_deref(),
            Some("Qty Mismatch (AI Total: 2, Order Item: 3)")
        );
        assert_eq!(extraction.log.needs_review_count, 1);
    }

    #[test]
    fn test_mismatch_keeps_model_reason() {
        let mut response = parse_response(&reply(&[2])).unwrap();
        response
            .item_personalizations
            .get_mut("li-1")
            .unwrap()
            .overall_review_reason = Some("Spelling unclear".to_string());
        let item = line("li-1", 1);

        let reconciled = reconcile_quantities(response, &[&item]);
        assert_eq!(
            reconciled.item_personalizations["li-1"]
                .overall_review_reason
                .as_deref(),
            Some("Spelling unclear; Qty Mismatch (AI Total: 2, Order Item: 1)")
        );
    }

    #[tokio::test]
    async fn test_invalid_reply_is_logged_as_failure() {
        let provider = ScriptedProvider::replying("not json at all");
        let extractor = AiExtractor::new(provider, PromptSet::default()).with_script_name("manual");
        let item = line("li-1", 1);

        let extraction = extractor.extract(&order(), &[&item], Regeneration::Fresh).await;
        assert!(!extraction.is_success());
        assert!(!extraction.log.success);
        assert_eq!(extraction.log.script_name, "manual");
        assert_eq!(extraction.log.raw_response.as_deref(), Some("not json at all"));
        assert!(extraction.log.error_message.unwrap().contains("parse"));
        assert_eq!(extraction.log.tasks_generated, 0);
        assert!(extraction.log.prompt_sent.starts_with("System:\n"));
    }

    #[tokio::test]
    async fn test_provider_error_has_no_raw_response() {
        let provider = Arc::new(ScriptedProvider {
            reply: Err(500),
            prompts: Mutex::new(Vec::new()),
        });
        let extractor = AiExtractor::new(provider, PromptSet::default());
        let item = line("li-1", 1);

        let extraction = extractor.extract(&order(), &[&item], Regeneration::Fresh).await;
        assert!(matches!(extraction.outcome, Err(AiError::Api { status: 500, .. })));
        assert_eq!(extraction.raw_response, None);
        assert_eq!(extraction.log.order_id, 42);
    }
}
