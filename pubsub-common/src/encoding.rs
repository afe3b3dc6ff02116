//! Percent-encoding as the service expects it in paths and query strings.
//!
//! Everything except RFC 3986 unreserved characters (`A-Z a-z 0-9 - _ . ~`) is encoded,
//! so a channel named `a/b?c` can never alter routing once placed in a path segment.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode a single path segment or query component.
pub fn encode_component(raw: &str) -> String {
    utf8_percent_encode(raw, UNRESERVED).to_string()
}

/// Percent-encode every item and join them with `,`.
///
/// Used for multi-channel path segments, where the comma is the separator the service
/// splits on and therefore must stay literal.
pub fn encode_list<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|item| encode_component(item.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Render `key=value` pairs in the given order, both sides encoded.
pub fn encode_query<'a, I>(params: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    params
        .into_iter()
        .map(|(key, value)| format!("{}={}", encode_component(key), encode_component(value)))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_characters_are_encoded() {
        assert_eq!(encode_component("a/b?c#d"), "a%2Fb%3Fc%23d");
        assert_eq!(encode_component("with space"), "with%20space");
        assert_eq!(encode_component("plus+comma,"), "plus%2Bcomma%2C");
    }

    #[test]
    fn unreserved_characters_pass_through() {
        assert_eq!(encode_component("Az09-_.~"), "Az09-_.~");
    }

    #[test]
    fn unicode_is_utf8_encoded() {
        assert_eq!(encode_component("é"), "%C3%A9");
    }

    #[test]
    fn list_keeps_separator_literal() {
        assert_eq!(encode_list(&["a,b", "c"]), "a%2Cb,c");
    }

    #[test]
    fn query_preserves_order() {
        let rendered = encode_query([("b", "1"), ("a", "x y")]);
        assert_eq!(rendered, "b=1&a=x%20y");
    }
}
