//! Codepoint-safe text helpers.
//!
//! Every offset the engine exposes is counted in Unicode scalar values
//! (codepoints). Browsers hand us UTF-16 code unit offsets and Rust strings
//! index by UTF-8 bytes, so all conversions between the three spaces go
//! through here. Astral characters (emoji, CJK extension B, ...) take two
//! UTF-16 units and four bytes but only ever count as one codepoint.

/// Length of `s` in codepoints.
pub fn codepoint_len(s: &str) -> usize {
    s.chars().count()
}

/// Convert a codepoint index into a byte index.
///
/// Indices past the end clamp to `s.len()`.
pub fn codepoint_to_byte(s: &str, cp: usize) -> usize {
    s.char_indices().nth(cp).map(|(b, _)| b).unwrap_or(s.len())
}

/// Convert a UTF-16 code unit index into a codepoint index.
///
/// An index that splits a surrogate pair rounds down to the pair's start;
/// indices past the end clamp to the codepoint length.
pub fn utf16_to_codepoint(s: &str, utf16: usize) -> usize {
    let mut units = 0;
    for (cp, c) in s.chars().enumerate() {
        let next = units + c.len_utf16();
        if next > utf16 {
            return cp;
        }
        units = next;
    }
    codepoint_len(s)
}

/// Convert a UTF-16 code unit index into a byte index.
pub fn utf16_to_byte(s: &str, utf16: usize) -> usize {
    codepoint_to_byte(s, utf16_to_codepoint(s, utf16))
}

/// Convert a codepoint index into a UTF-16 code unit index.
pub fn codepoint_to_utf16(s: &str, cp: usize) -> usize {
    s.chars().take(cp).map(char::len_utf16).sum()
}

/// Slice `s` by codepoint range, clamping both ends.
pub fn slice_codepoints(s: &str, start: usize, end: usize) -> &str {
    let start_byte = codepoint_to_byte(s, start);
    let end_byte = codepoint_to_byte(s, end.max(start));
    &s[start_byte..end_byte]
}

/// Count leading and trailing whitespace codepoints of `s`.
pub fn whitespace_margins(s: &str) -> (usize, usize) {
    let leading = s.chars().take_while(|c| c.is_whitespace()).count();
    if leading == codepoint_len(s) {
        return (leading, 0);
    }
    let trailing = s.chars().rev().take_while(|c| c.is_whitespace()).count();
    (leading, trailing)
}
