//! HTML-entity escaping for text interpolated into Telegram HTML captions.
//!
//! The outbound delivery protocol accepts an HTML subset (bold, blockquote,
//! expandable blockquote, anchor). Every interpolated string (titles,
//! descriptions, tag names) must pass through here before embedding.

/// Escape `&`, `<` and `>` for embedding inside Telegram HTML.
///
/// The ampersand is replaced first so already-produced entities are not
/// double-escaped.
pub fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_angle_brackets() {
        assert_eq!(html_escape("<b>hi</b>"), "&lt;b&gt;hi&lt;/b&gt;");
    }

    #[test]
    fn escapes_ampersand_first() {
        assert_eq!(html_escape("a & b < c"), "a &amp; b &lt; c");
        // No double escaping of the produced entities
        assert_eq!(html_escape("&lt;"), "&amp;lt;");
    }

    #[test]
    fn passes_plain_text_through() {
        assert_eq!(html_escape("明星ヒマリ"), "明星ヒマリ");
    }
}
