//! Markup normalization and Telegram HTML sanitization.
//!
//! Generated text arrives with loose HTML. Before it is shown to users it is
//! normalized (list markup becomes plain bullets) and reduced to the tag
//! subset Telegram's HTML parse mode accepts; any other tag is unwrapped,
//! keeping its inner text.

use once_cell::sync::Lazy;
use regex::Regex;

/// Tags Telegram's HTML parse mode accepts.
pub const ALLOWED_TAGS: &[&str] = &[
    "b", "strong", "i", "em", "u", "ins", "s", "strike", "del", "code", "pre", "a", "span",
];

/// Prefix that replaces `<li>`.
pub const BULLET: &str = "• ";

static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</?([A-Za-z][A-Za-z0-9-]*)\b[^<>]*/?>").unwrap());

static ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^&(#[0-9]+|#[xX][0-9a-fA-F]+|[A-Za-z][A-Za-z0-9]*);").unwrap());

static ANY_ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[A-Za-z][A-Za-z0-9]*);").unwrap());

/// Flatten list markup: `<ul>`/`</ul>`/`</li>` are removed and `<li>` becomes
/// a bullet prefix.
///
/// # Example
/// ```
/// use ailex::utils::sanitize::normalize_markup;
///
/// let text = normalize_markup("<ul><li>one</li><li>two</li></ul>");
/// assert_eq!(text, "• one• two");
/// ```
pub fn normalize_markup(text: &str) -> String {
    text.replace("<ul>", "")
        .replace("</ul>", "")
        .replace("<li>", BULLET)
        .replace("</li>", "")
}

fn is_allowed(tag: &str) -> bool {
    let lower = tag.to_ascii_lowercase();
    ALLOWED_TAGS.contains(&lower.as_str())
}

/// Escape text that sits between tags: stray `<`/`>` and any `&` that does not
/// start an entity.
fn escape_text(segment: &str, out: &mut String) {
    for (idx, ch) in segment.char_indices() {
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' if !ENTITY_RE.is_match(&segment[idx..]) => out.push_str("&amp;"),
            _ => out.push(ch),
        }
    }
}

/// Reduce `html` to the Telegram-safe tag subset.
///
/// Tags outside [`ALLOWED_TAGS`] are unwrapped (their content is kept).
/// Stray angle brackets and ampersands in text are escaped.
///
/// # Example
/// ```
/// use ailex::utils::sanitize::sanitize_telegram_html;
///
/// let html = "<p>Hello <b>world</b></p><div>!</div>";
/// assert_eq!(sanitize_telegram_html(html), "Hello <b>world</b>!");
/// ```
pub fn sanitize_telegram_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut last = 0;

    for caps in TAG_RE.captures_iter(html) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        escape_text(&html[last..whole.start()], &mut out);
        if is_allowed(name.as_str()) {
            out.push_str(whole.as_str());
        }
        last = whole.end();
    }
    escape_text(&html[last..], &mut out);

    out
}

/// Remove every tag, keeping only text.
pub fn strip_tags(html: &str) -> String {
    TAG_RE.replace_all(html, "").into_owned()
}

/// Decode character references in one pass. Unknown named entities are
/// left as they are.
pub fn unescape_entities(text: &str) -> String {
    ANY_ENTITY_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let body = &caps[1];
            let decoded = if let Some(hex) = body.strip_prefix("#x").or(body.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = body.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match body {
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "amp" => Some('&'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some('\u{a0}'),
                    _ => None,
                }
            };
            match decoded {
                Some(ch) => ch.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Plain-text rendering of sanitized HTML, for when a platform rejects the
/// markup: tags removed, entities decoded.
///
/// # Example
/// ```
/// use ailex::utils::sanitize::html_to_plain;
///
/// assert_eq!(html_to_plain("<b>R&amp;D</b> 1 &lt; 2"), "R&D 1 < 2");
/// ```
pub fn html_to_plain(html: &str) -> String {
    unescape_entities(&strip_tags(html))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_markup_lists() {
        let text = "Tips:<ul>\n<li>Automate</li>\n<li>Delegate</li>\n</ul>";
        assert_eq!(normalize_markup(text), "Tips:\n• Automate\n• Delegate\n");
    }

    #[test]
    fn test_normalize_markup_leaves_other_tags() {
        assert_eq!(normalize_markup("<b>bold</b>"), "<b>bold</b>");
    }

    #[test]
    fn test_sanitize_keeps_allowed_tags() {
        let html = r#"<b>a</b> <i>b</i> <a href="https://example.com">c</a> <code>d</code>"#;
        assert_eq!(sanitize_telegram_html(html), html);
    }

    #[test]
    fn test_sanitize_unwraps_disallowed_tags() {
        let html = "<h1>Title</h1><p>Body <strong>text</strong></p><br/>";
        assert_eq!(sanitize_telegram_html(html), "TitleBody <strong>text</strong>");
    }

    #[test]
    fn test_sanitize_is_case_insensitive_on_tag_names() {
        assert_eq!(sanitize_telegram_html("<B>x</B><P>y</P>"), "<B>x</B>y");
    }

    #[test]
    fn test_sanitize_escapes_stray_brackets() {
        assert_eq!(sanitize_telegram_html("1 < 2 > 0"), "1 &lt; 2 &gt; 0");
    }

    #[test]
    fn test_sanitize_escapes_bare_ampersand_only() {
        assert_eq!(
            sanitize_telegram_html("R&D &amp; AI &#128512;"),
            "R&amp;D &amp; AI &#128512;"
        );
    }

    #[test]
    fn test_sanitize_plain_text_unchanged() {
        let text = "Привет! 👋 Я — AIlex.";
        assert_eq!(sanitize_telegram_html(text), text);
    }

    #[test]
    fn test_html_to_plain_decodes_escaped_text() {
        let html = sanitize_telegram_html("<p>Tom & Jerry: 1 < 2</p>");
        assert_eq!(html, "Tom &amp; Jerry: 1 &lt; 2");
        assert_eq!(html_to_plain(&html), "Tom & Jerry: 1 < 2");
    }

    #[test]
    fn test_unescape_entities_single_pass() {
        assert_eq!(unescape_entities("&amp;lt; &#128512; &#x41; &copy;"), "&lt; 😀 A &copy;");
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!(strip_tags("<b>bold</b> and <i>it</i>"), "bold and it");
    }
}
