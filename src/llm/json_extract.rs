//! Robust JSON extraction from free-text LLM responses.
//!
//! Models wrap JSON in prose, markdown fences, or trailing commentary.
//! Extraction tries progressively weaker strategies and never fails: the
//! caller receives `None` and decides how to degrade.

use serde_json::Value;

/// Extract the most plausible JSON object from `text`.
///
/// Strategies, in order: whole-body parse, first balanced `{...}` block,
/// last balanced block, markdown-fence stripping, innermost-object regex.
pub fn extract_json(text: &str) -> Option<Value> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(text) {
        if value.is_object() {
            return Some(value);
        }
    }

    if let Some(candidate) = first_balanced_block(text) {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            return Some(value);
        }
    }

    if let Some(candidate) = last_balanced_block(text) {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            return Some(value);
        }
    }

    let cleaned = text
        .replace("```json", "")
        .replace("```", "");
    let cleaned = cleaned.trim();
    if let Ok(value) = serde_json::from_str::<Value>(cleaned) {
        if value.is_object() {
            return Some(value);
        }
    }
    if let Some(candidate) = first_balanced_block(cleaned) {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            return Some(value);
        }
    }

    // Last resort: innermost braces with no nesting.
    innermost_object(text)
        .and_then(|candidate| serde_json::from_str::<Value>(candidate).ok())
}

/// First `{...}` block with balanced braces, respecting string literals.
fn first_balanced_block(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        let c = b as char;
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Last balanced `{...}` block, scanning backwards from the final `}`.
fn last_balanced_block(text: &str) -> Option<&str> {
    let end = text.rfind('}')?;
    let bytes = text.as_bytes();
    let mut depth = 0isize;
    let mut idx = end;
    loop {
        match bytes[idx] as char {
            '}' => depth += 1,
            '{' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[idx..=end]);
                }
            }
            _ => {}
        }
        if idx == 0 {
            return None;
        }
        idx -= 1;
    }
}

/// Innermost object: a brace pair containing no nested braces.
fn innermost_object(text: &str) -> Option<&str> {
    let mut best = None;
    let bytes = text.as_bytes();
    let mut open: Option<usize> = None;
    for (idx, &b) in bytes.iter().enumerate() {
        match b as char {
            '{' => open = Some(idx),
            '}' => {
                if let Some(start) = open.take() {
                    best = Some(&text[start..=idx]);
                }
            }
            _ => {}
        }
    }
    best
}
