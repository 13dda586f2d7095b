//! Bound truncation for string and binary columns.
//!
//! Lower bounds are plain prefixes. Upper bounds must stay greater than or
//! equal to every value in the column, so after truncation the last unit is
//! incremented; when no unit can be incremented the bound is dropped.

/// Shorten a string lower bound to at most `length` characters.
pub fn truncate_string_min(value: &str, length: usize) -> String {
    value.chars().take(length).collect()
}

/// Shorten a string upper bound to at most `length` characters, keeping it an
/// upper bound. `None` when every retained character is already `char::MAX`.
pub fn truncate_string_max(value: &str, length: usize) -> Option<String> {
    if value.chars().count() <= length {
        return Some(value.to_string());
    }

    let mut chars: Vec<char> = value.chars().take(length).collect();
    while let Some(last) = chars.pop() {
        if let Some(next) = next_char(last) {
            chars.push(next);
            return Some(chars.into_iter().collect());
        }
    }
    None
}

/// Shorten a binary lower bound to at most `length` bytes.
pub fn truncate_binary_min(value: &[u8], length: usize) -> Vec<u8> {
    value[..value.len().min(length)].to_vec()
}

/// Shorten a binary upper bound to at most `length` bytes, keeping it an
/// upper bound. `None` when every retained byte is `0xFF`.
pub fn truncate_binary_max(value: &[u8], length: usize) -> Option<Vec<u8>> {
    if value.len() <= length {
        return Some(value.to_vec());
    }

    let mut bytes = value[..length].to_vec();
    while let Some(last) = bytes.pop() {
        if last < u8::MAX {
            bytes.push(last + 1);
            return Some(bytes);
        }
    }
    None
}

fn next_char(c: char) -> Option<char> {
    let mut code = u32::from(c) + 1;
    // Skip the surrogate block.
    if (0xD800..=0xDFFF).contains(&code) {
        code = 0xE000;
    }
    char::from_u32(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_values_are_unchanged() {
        assert_eq!(truncate_string_min("alice", 16), "alice");
        assert_eq!(truncate_string_max("alice", 16).as_deref(), Some("alice"));
        assert_eq!(truncate_binary_max(b"ab", 2), Some(b"ab".to_vec()));
    }

    #[test]
    fn string_upper_bound_increments_last_char() {
        assert_eq!(truncate_string_min("abcdef", 3), "abc");
        assert_eq!(truncate_string_max("abcdef", 3).as_deref(), Some("abd"));
    }

    #[test]
    fn string_truncation_counts_characters_not_bytes() {
        assert_eq!(truncate_string_min("héllo", 2), "hé");
        assert_eq!(truncate_string_max("héllo", 2).as_deref(), Some("hê"));
    }

    #[test]
    fn string_upper_bound_carries_past_max_char() {
        let value = format!("a{}{}z", char::MAX, char::MAX);
        assert_eq!(truncate_string_max(&value, 3).as_deref(), Some("b"));

        let all_max = format!("{}{}z", char::MAX, char::MAX);
        assert_eq!(truncate_string_max(&all_max, 2), None);
    }

    #[test]
    fn string_upper_bound_skips_surrogates() {
        let value = "\u{D7FF}x";
        assert_eq!(truncate_string_max(value, 1).as_deref(), Some("\u{E000}"));
    }

    #[test]
    fn binary_upper_bound_carries() {
        assert_eq!(truncate_binary_min(&[1, 2, 3], 2), vec![1, 2]);
        assert_eq!(truncate_binary_max(&[1, 2, 3], 2), Some(vec![1, 3]));
        assert_eq!(truncate_binary_max(&[1, 0xFF, 3], 2), Some(vec![2]));
        assert_eq!(truncate_binary_max(&[0xFF, 0xFF, 3], 2), None);
    }
}
