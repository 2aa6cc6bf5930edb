//! Clean-up of model output before parsing.
//!
//! Repair of truncated replies is lossy: any item after the last complete
//! entry is dropped, and the order then fails validation if that leaves an
//! item without an answer upstream.

/// Strip a surrounding Markdown code fence.
#[must_use]
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .map_or(trimmed, |rest| rest.strip_prefix('\n').unwrap_or(rest));
    without_open
        .strip_suffix("```")
        .map_or(without_open, |rest| rest.strip_suffix('\n').unwrap_or(rest))
}

/// Cut a truncated reply back to its last complete item entry.
///
/// Items are the objects directly inside `itemPersonalizations`, i.e. at
/// nesting depth three. Returns `None` when the text already ends with a
/// closing brace or no item entry was completed.
#[must_use]
pub fn repair_truncated(text: &str) -> Option<String> {
    let text = text.trim_end();
    if text.ends_with('}') {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut last_item_end = None;

    for (pos, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                if ch == '}' && depth == 3 {
                    last_item_end = Some(pos);
                }
                depth = depth.saturating_sub(1);
            }
            _ => {}
        }
    }

    let end = last_item_end?;
    text.get(..=end).map(|complete| format!("{complete}}}}}"))
}
