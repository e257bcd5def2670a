//! Small text helpers shared by the prompt-building modules.

/// Truncate to at most `max_chars` characters, respecting char boundaries.
/// Prompt samples routinely contain CJK text, so byte slicing is not safe.
pub(crate) fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Best-effort recovery of a JSON object from a chatty model response:
/// the slice from the first `{` to the last `}`.
pub(crate) fn extract_json_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    (end > start).then(|| &s[start..=end])
}

/// Same recovery for a JSON array response.
pub(crate) fn extract_json_array(s: &str) -> Option<&str> {
    let start = s.find('[')?;
    let end = s.rfind(']')?;
    (end > start).then(|| &s[start..=end])
}
