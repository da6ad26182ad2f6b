/**
 * HTML Sanitization Primitive
 * Denylist-then-strip-all: output is plain text, never markup.
 */
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// <script> blocks are removed together with their inner content.
    static ref SCRIPT_BLOCK: Regex =
        Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").unwrap();

    /// Dangling <script> open tags without a closing tag.
    static ref SCRIPT_OPEN: Regex = Regex::new(r"(?i)<script\b[^>]*>").unwrap();

    /// Dangerous embedding/form tags, open or closing or self-closing.
    /// Only the tags are removed; their text content is kept.
    static ref DANGEROUS_TAG: Regex =
        Regex::new(r"(?i)</?(?:iframe|object|embed|form|input|textarea|button)\b[^>]*/?>").unwrap();

    /// javascript: URI scheme, with optional whitespace smuggled in.
    static ref JS_URI: Regex = Regex::new(r"(?i)j\s*a\s*v\s*a\s*s\s*c\s*r\s*i\s*p\s*t\s*:").unwrap();

    /// Inline event handler attributes (onload=, onclick=, ...).
    static ref ON_ATTR: Regex = Regex::new(r#"(?i)\bon\w+\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]*)"#).unwrap();

    /// Any remaining tag.
    static ref ANY_TAG: Regex = Regex::new(r"</?[^>]*>").unwrap();
}

/// Strip markup from untrusted text. The result is safe to render as-is:
/// no tags, no javascript: URIs, no inline event handlers survive.
pub fn strip_html(input: &str) -> String {
    let s = SCRIPT_BLOCK.replace_all(input, "");
    let s = SCRIPT_OPEN.replace_all(&s, "");
    let s = DANGEROUS_TAG.replace_all(&s, "");
    let s = JS_URI.replace_all(&s, "");
    let s = ON_ATTR.replace_all(&s, "");
    let s = ANY_TAG.replace_all(&s, "");
    s.trim().to_string()
}

/// Truncate to at most `max` characters (not bytes, so multi-byte text
/// never splits mid-character).
pub fn clamp(input: &str, max: usize) -> String {
    input.chars().take(max).collect()
}

/// strip_html followed by clamp; the usual treatment for free-text fields.
pub fn clean_text(input: &str, max: usize) -> String {
    clamp(&strip_html(input), max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_tag_and_content_removed() {
        let out = strip_html("before<script>alert('xss')</script>after");
        assert_eq!(out, "beforeafter");
        assert!(!out.contains("alert"));
    }

    #[test]
    fn test_script_case_insensitive_with_attributes() {
        let out = strip_html(r#"<SCRIPT type="text/javascript">evil()</SCRIPT>ok"#);
        assert_eq!(out, "ok");
    }

    #[test]
    fn test_unclosed_script_open_tag_removed() {
        let out = strip_html("<script src=\"x.js\">payload");
        assert!(!out.contains("<script"));
    }

    #[test]
    fn test_dangerous_tags_removed_content_kept() {
        let out = strip_html("<iframe src=\"x\">inner</iframe><form>f</form>");
        assert_eq!(out, "innerf");
    }

    #[test]
    fn test_self_closing_input_removed() {
        assert_eq!(strip_html("a<input type=\"text\"/>b"), "ab");
        assert_eq!(strip_html("a<embed src=\"x\" />b"), "ab");
    }

    #[test]
    fn test_javascript_uri_stripped() {
        let out = strip_html("javascript:alert(1)");
        assert!(!out.to_lowercase().contains("javascript:"));
    }

    #[test]
    fn test_javascript_uri_with_whitespace_stripped() {
        let out = strip_html("java\tscript:alert(1)");
        assert!(!out.to_lowercase().replace(char::is_whitespace, "").contains("javascript:"));
    }

    #[test]
    fn test_event_handler_attributes_stripped() {
        let out = strip_html("<div onclick=\"steal()\">hi</div>");
        assert_eq!(out, "hi");
        assert!(!out.contains("onclick"));
    }

    #[test]
    fn test_all_remaining_tags_stripped() {
        assert_eq!(strip_html("<b>bold</b> and <em>italic</em>"), "bold and italic");
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(strip_html("plain text, 2 > 1"), "plain text, 2 > 1");
    }

    #[test]
    fn test_clamp_respects_char_boundaries() {
        assert_eq!(clamp("héllo", 2), "hé");
        assert_eq!(clamp("abc", 10), "abc");
    }

    #[test]
    fn test_clean_text_strips_then_clamps() {
        let input = format!("<b>{}</b>", "x".repeat(300));
        assert_eq!(clean_text(&input, 10), "x".repeat(10));
    }
}
