//! Minimal fixups to coerce a model response into valid JSON.

/// Attempt to repair `input` into parseable JSON: trim whitespace, strip
/// markdown code fences (optionally tagged `json`), and slice out the
/// outermost object or array. Returns the possibly repaired text and
/// whether it differs from the input.
pub fn repair_json(input: &str) -> (String, bool) {
    let mut text = input.trim().to_string();

    if text.starts_with("```") && text.ends_with("```") && text.len() >= 6 {
        text = text[3..text.len() - 3].trim().to_string();
        if text
            .get(..4)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("json"))
        {
            text = text[4..].trim().to_string();
        }
    }

    let start = match (text.find('{'), text.find('[')) {
        (Some(obj), Some(arr)) => Some(obj.min(arr)),
        (Some(obj), None) => Some(obj),
        (None, Some(arr)) => Some(arr),
        (None, None) => None,
    };
    if let Some(start) = start {
        text.drain(..start);
        // Conservative trim: cut anything after the last closing brace or
        // bracket, whichever comes later.
        let end = match (text.rfind('}'), text.rfind(']')) {
            (Some(obj), Some(arr)) => Some(obj.max(arr) + 1),
            (Some(obj), None) => Some(obj + 1),
            (None, Some(arr)) => Some(arr + 1),
            (None, None) => None,
        };
        if let Some(end) = end {
            text.truncate(end);
        }
    }

    let modified = text != input;
    (text, modified)
}
