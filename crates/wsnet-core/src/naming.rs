//! Name validation shared by handler URLs and SEP route names.

/// Returns `true` when `name` is non-empty and consists only of alphanumeric
/// characters, `-`, and `_`.
///
/// Both handler URL segments (`ws://host/<segment>`) and SEP route names use
/// this charset, so a route name can never contain the `:` id separator or
/// the space that separates a content-type tag.
///
/// # Examples
///
/// ```rust
/// use wsnet_core::is_valid_segment;
///
/// assert!(is_valid_segment("chat-room_1"));
/// assert!(!is_valid_segment("chat room"));
/// assert!(!is_valid_segment(""));
/// ```
pub fn is_valid_segment(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_letters_digits_dash_underscore() {
        assert!(is_valid_segment("abc"));
        assert!(is_valid_segment("ABC-123_x"));
        assert!(is_valid_segment("ünïcode"));
    }

    #[test]
    fn test_rejects_empty() {
        assert!(!is_valid_segment(""));
    }

    #[test]
    fn test_rejects_separators_and_whitespace() {
        for bad in ["a:b", "a b", "a/b", "a\\b", "a.b", "a\n"] {
            assert!(!is_valid_segment(bad), "{bad:?} must be rejected");
        }
    }
}
