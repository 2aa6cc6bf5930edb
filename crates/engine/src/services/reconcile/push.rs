//! Writing resolved personalizations back to ShipStation item options.

use chrono::{DateTime, SecondsFormat, Utc};

use super::plan::{ItemPlan, ItemResolution};
use crate::models::print_task::truncate_chars;
use crate::models::{LineItem, Order, PrintTask};
use crate::shipstation::{ItemOption, ItemOptionsPatch};

pub const TEXT_OPTION: &str = "Name or Text";
pub const COLOR_1_OPTION: &str = "Colour 1";
pub const COLOR_2_OPTION: &str = "Colour 2";
pub const DETAILS_OPTION: &str = "Personalized Details";

/// Maximum length of the details option value, suffix included.
pub const DETAILS_MAX: usize = 200;
const DETAILS_SUFFIX: &str = "... (See Packing List)";

const NO_NOTES: &str = "No customer notes provided.";
const NO_TASKS: &str = "No specific personalizations found in tasks.";

/// Options to post for one order and the audit reason for each item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushPlan {
    pub patch: ItemOptionsPatch,
    pub reasons: Vec<String>,
}

impl PushPlan {
    /// Options for every resolved item that has a line item key.
    ///
    /// Deterministic results and single AI personalizations are written as
    /// text and color options; several AI personalizations are summarised in
    /// one details option. Placeholders are never pushed.
    #[must_use]
    pub fn from_plans(plans: &[ItemPlan<'_>]) -> Self {
        let mut push = Self::default();
        for plan in plans {
            let Some(key) = plan.line.item.shipstation_line_item_key.as_deref() else {
                tracing::warn!(item_id = %plan.line.item.id, "No line item key, not pushing options");
                continue;
            };
            let (options, tag) = match &plan.resolution {
                ItemResolution::Deterministic(resolved) => (
                    value_options(
                        resolved.custom_text.as_deref(),
                        resolved.color_1.as_deref(),
                        resolved.color_2.as_deref(),
                    ),
                    resolved.source.to_string(),
                ),
                ItemResolution::Ai(result) => match result.personalizations.as_slice() {
                    [] => continue,
                    [single] => (
                        value_options(
                            single.custom_text.as_deref(),
                            single.color_1.as_deref(),
                            single.color_2.as_deref(),
                        ),
                        plan.resolution.source().to_string(),
                    ),
                    many => (
                        vec![ItemOption::new(
                            DETAILS_OPTION,
                            personalized_details(many.iter().map(|p| {
                                (p.custom_text.as_deref(), p.color_1.as_deref(), p.color_2.as_deref())
                            })),
                        )],
                        "AI-PD".to_string(),
                    ),
                },
                ItemResolution::Placeholder { .. } => continue,
            };
            push.insert(key, options, &tag);
        }
        push
    }

    /// Details options rebuilt from stored tasks, for pushing without
    /// re-extracting.
    #[must_use]
    pub fn from_tasks(items: &[LineItem], tasks: &[PrintTask]) -> Self {
        let mut push = Self::default();
        for line in items {
            let Some(key) = line.item.shipstation_line_item_key.as_deref() else {
                tracing::warn!(item_id = %line.item.id, "No line item key, not pushing options");
                continue;
            };
            let item_tasks: Vec<&PrintTask> = tasks
                .iter()
                .filter(|t| t.order_item_id == line.item.id)
                .collect();
            if item_tasks.is_empty() {
                continue;
            }
            let details = personalized_details(item_tasks.iter().map(|t| {
                (t.custom_text.as_deref(), t.color_1.as_deref(), t.color_2.as_deref())
            }));
            push.insert(key, vec![ItemOption::new(DETAILS_OPTION, details)], "PD-Sync");
        }
        push
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patch.is_empty()
    }

    fn insert(&mut self, key: &str, options: Vec<ItemOption>, tag: &str) {
        if options.is_empty() {
            return;
        }
        self.patch.insert(key.to_owned(), options);
        self.reasons.push(format!("{key}({tag})"));
    }

    /// Internal note recording what was pushed, with a packing list of the
    /// order's tasks.
    #[must_use]
    pub fn audit_note(&self, order: &Order, tasks: &[PrintTask], at: DateTime<Utc>) -> String {
        let packing_list = if tasks.is_empty() {
            NO_TASKS.to_string()
        } else {
            tasks
                .iter()
                .zip(1..)
                .map(|(task, n)| {
                    format!(
                        "{n}. {}",
                        describe(task.custom_text.as_deref(), task.color_1.as_deref(), task.color_2.as_deref())
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        };
        format!(
            "PACKING LIST (Order #{}):\n{packing_list}\n---\nOriginal Customer Notes:\n{}\n---\nTask sync {} -> {}",
            order.shipstation_order_number,
            order.note().unwrap_or(NO_NOTES),
            at.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.reasons.join(", ")
        )
    }
}

fn value_options(text: Option<&str>, color_1: Option<&str>, color_2: Option<&str>) -> Vec<ItemOption> {
    [(TEXT_OPTION, text), (COLOR_1_OPTION, color_1), (COLOR_2_OPTION, color_2)]
        .into_iter()
        .filter_map(|(name, value)| {
            value
                .filter(|v| !v.trim().is_empty())
                .map(|v| ItemOption::new(name, v))
        })
        .collect()
}

fn describe(text: Option<&str>, color_1: Option<&str>, color_2: Option<&str>) -> String {
    let secondary = color_2.map(|c| format!(" / {c}")).unwrap_or_default();
    format!(
        "{} ({}{secondary})",
        text.unwrap_or("N/A"),
        color_1.unwrap_or("N/A")
    )
}

/// `text (color1 / color2)` per personalization, joined by `, ` and capped
/// at [`DETAILS_MAX`] characters.
pub fn personalized_details<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (Option<&'a str>, Option<&'a str>, Option<&'a str>)>,
{
    let joined = entries
        .into_iter()
        .map(|(text, color_1, color_2)| describe(text, color_1, color_2))
        .collect::<Vec<_>>()
        .join(", ");
    if joined.chars().count() <= DETAILS_MAX {
        return joined;
    }
    let keep = DETAILS_MAX - DETAILS_SUFFIX.chars().count();
    format!("{}{DETAILS_SUFFIX}", truncate_chars(&joined, keep))
}
