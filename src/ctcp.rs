//! CTCP quoting and extraction.
//!
//! CTCP payloads travel inside `PRIVMSG`/`NOTICE` text, wrapped in the
//! delimiter byte `0x01`. Inside the payload, characters the line protocol
//! cannot carry are quoted with `0x10`:
//!
//! | payload byte | on the wire |
//! |---|---|
//! | `0x00` | `0x10` `'0'` |
//! | `\n` | `0x10` `'n'` |
//! | `\r` | `0x10` `'r'` |
//! | `0x10` | `0x10` `0x10` |
//!
//! A literal `0x01` cannot be represented at all and is removed.

/// The CTCP delimiter wrapping a CTCP payload.
pub const CTCP_DELIMITER: char = '\u{1}';

const CTCP_QUOTE: char = '\u{10}';

/// Quote a payload for transmission inside a CTCP message.
///
/// Embedded delimiter characters are dropped, everything else is preserved
/// through [`unescape`].
pub fn escape(payload: &str) -> String {
    let mut out = String::with_capacity(payload.len());
    for c in payload.chars() {
        match c {
            '\u{0}' => {
                out.push(CTCP_QUOTE);
                out.push('0');
            }
            '\n' => {
                out.push(CTCP_QUOTE);
                out.push('n');
            }
            '\r' => {
                out.push(CTCP_QUOTE);
                out.push('r');
            }
            CTCP_QUOTE => {
                out.push(CTCP_QUOTE);
                out.push(CTCP_QUOTE);
            }
            CTCP_DELIMITER => {}
            c => out.push(c),
        }
    }
    out
}

/// Reverse [`escape`].
///
/// An unrecognised quoted character yields that character literally; a
/// trailing lone quote character is dropped.
pub fn unescape(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        if c != CTCP_QUOTE {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('\u{0}'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(CTCP_QUOTE) => out.push(CTCP_QUOTE),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Wrap a payload in CTCP delimiters, quoting as needed.
pub fn wrap(payload: &str) -> String {
    format!("{}{}{}", CTCP_DELIMITER, escape(payload), CTCP_DELIMITER)
}

/// Extract and unquote a CTCP payload from message text.
///
/// Returns `None` when the text is not CTCP-wrapped. The trailing delimiter
/// is optional, some clients omit it.
pub fn extract(text: &str) -> Option<String> {
    let inner = text.strip_prefix(CTCP_DELIMITER)?;
    let inner = inner.strip_suffix(CTCP_DELIMITER).unwrap_or(inner);
    Some(unescape(inner))
}

/// True when message text is a CTCP message.
pub fn is_ctcp(text: &str) -> bool {
    text.starts_with(CTCP_DELIMITER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_specials() {
        assert_eq!(escape("a\u{0}b"), "a\u{10}0b");
        assert_eq!(escape("a\nb"), "a\u{10}nb");
        assert_eq!(escape("a\rb"), "a\u{10}rb");
        assert_eq!(escape("a\u{10}b"), "a\u{10}\u{10}b");
    }

    #[test]
    fn test_escape_removes_delimiter() {
        assert_eq!(escape("a\u{1}b"), "ab");
    }

    #[test]
    fn test_unescape_inverts_escape() {
        let payload = "VERSION slirc\r\nnull:\u{0} quote:\u{10} end";
        assert_eq!(unescape(&escape(payload)), payload);
    }

    #[test]
    fn test_unescape_unknown_quote() {
        assert_eq!(unescape("a\u{10}xb"), "axb");
        assert_eq!(unescape("tail\u{10}"), "tail");
    }

    #[test]
    fn test_wrap_and_extract() {
        let wrapped = wrap("PING 12345");
        assert_eq!(wrapped, "\u{1}PING 12345\u{1}");
        assert_eq!(extract(&wrapped).as_deref(), Some("PING 12345"));
    }

    #[test]
    fn test_extract_without_trailing_delimiter() {
        assert_eq!(extract("\u{1}ACTION waves").as_deref(), Some("ACTION waves"));
    }

    #[test]
    fn test_extract_non_ctcp() {
        assert!(extract("just text").is_none());
        assert!(!is_ctcp("just text"));
        assert!(is_ctcp("\u{1}VERSION\u{1}"));
    }
}
