//! eBay buyer note parsing.
//!
//! Buyers are asked to type one block per personalized item:
//!
//! ```text
//! Item ID: 395107128418 Color=Light Blue
//! Text: Happy Birthday
//! ```
//!
//! eBay SKUs look like `wi_<item id>_<variant>`; a block belongs to a line
//! item when its item ID matches the SKU and its color matches the SKU's
//! variant or one of the item's options.

use std::sync::LazyLock;

use printline_core::DataSource;
use regex::Regex;

use super::{Miss, NOTE_ANNOTATION, Resolved};
use crate::models::LineItem;

static ITEM_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Item ID:\s*(\d+)").expect("Invalid regex"));
static COLOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Color=([^,\n]+)").expect("Invalid regex"));
static VARIATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Variation:\s*(\d+)").expect("Invalid regex"));

/// One `Item ID` block from a buyer note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteBlock {
    pub item_id: String,
    pub color: Option<String>,
    pub text: String,
}

/// Color implied by an eBay listing variant number.
#[must_use]
pub fn variant_color(variant: &str) -> Option<&'static str> {
    match variant {
        "6" => Some("Light Blue"),
        "15" => Some("Rose Gold"),
        _ => None,
    }
}

/// Split the note into blocks, in document order.
///
/// A block starts at a line beginning `Item ID:` and takes the following
/// `Text:` line. Blocks without both an item ID and text are dropped.
#[must_use]
pub fn parse_blocks(note: &str) -> Vec<NoteBlock> {
    let mut blocks = Vec::new();
    let mut current: Option<(String, Option<String>)> = None;
    let mut text = String::new();

    for line in note.lines().map(str::trim) {
        if line.starts_with("Item ID:") {
            if let Some((item_id, color)) = current.take() {
                push_block(&mut blocks, item_id, color, &text);
            }
            current = Some((capture(&ITEM_ID, line).unwrap_or_default(), block_color(line)));
            text.clear();
        } else if let Some(rest) = line.strip_prefix("Text:") {
            rest.trim().clone_into(&mut text);
        }
    }
    if let Some((item_id, color)) = current {
        push_block(&mut blocks, item_id, color, &text);
    }

    blocks
}

fn push_block(blocks: &mut Vec<NoteBlock>, item_id: String, color: Option<String>, text: &str) {
    if !item_id.is_empty() && !text.is_empty() {
        blocks.push(NoteBlock {
            item_id,
            color,
            text: text.to_owned(),
        });
    }
}

/// Explicit `Color=` wins; otherwise a known `Variation:` number.
fn block_color(line: &str) -> Option<String> {
    capture(&COLOR, line)
        .map(|c| c.trim().to_owned())
        .filter(|c| !c.is_empty())
        .or_else(|| {
            capture(&VARIATION, line)
                .and_then(|v| variant_color(&v))
                .map(str::to_owned)
        })
}

fn capture(pattern: &Regex, line: &str) -> Option<String> {
    pattern
        .captures(line)?
        .get(1)
        .map(|m| m.as_str().to_owned())
}

/// Resolve a line item from the order's buyer note.
///
/// Both the item ID and the color must match; there is no partial match.
/// When the item's quantity exceeds the number of blocks in the note the
/// result is flagged for review.
pub fn resolve_from_note(note: &str, line: &LineItem) -> Result<Resolved, Miss> {
    let mut parts = line.sku().split('_');
    let sku_item_id = parts.nth(1).unwrap_or_default();
    let sku_variant = parts.next().unwrap_or_default();
    let implied_color = variant_color(sku_variant);

    let blocks = parse_blocks(note);
    tracing::debug!(
        sku = line.sku(),
        blocks = blocks.len(),
        "Parsed customer note blocks"
    );

    let matched = blocks.iter().find(|block| {
        let Some(color) = block.color.as_deref() else {
            return false;
        };
        let color_matches = implied_color.is_some_and(|c| c.eq_ignore_ascii_case(color))
            || line.item.print_settings.contains_value(color);
        !sku_item_id.is_empty() && block.item_id == sku_item_id && color_matches
    });
    let Some(block) = matched else {
        return Err(Miss::NoMatchingBlock);
    };

    let quantity = line.item.quantity;
    let short = quantity > 1 && usize::try_from(quantity).is_ok_and(|q| blocks.len() < q);
    let review_reason = short.then(|| {
        format!(
            "QUANTITY_MISMATCH: OrderQty={quantity}, ParsedTotalQty={}",
            blocks.len()
        )
    });

    Ok(Resolved {
        source: DataSource::CustomerNote,
        custom_text: Some(block.text.clone()),
        color_1: block.color.clone(),
        color_2: None,
        annotation: NOTE_ANNOTATION.to_string(),
        needs_review: short,
        review_reason,
    })
}
