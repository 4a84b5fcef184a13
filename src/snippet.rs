use once_cell::sync::Lazy;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

pub const SNIPPET_MAX_CHARS: usize = 100;
pub const EMPTY_SNIPPET: &str = "No additional text";
const ELLIPSIS: &str = "...";

static COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid comment pattern"));
static BLOCK_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)</?(?:p|div|br|li|ul|ol|h[1-6]|blockquote|pre|tr|td|th|hr)\b[^<>]*>")
        .expect("valid block tag pattern")
});
static ANY_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</?[A-Za-z][^<>]*>").expect("valid tag pattern"));
static ENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(?:nbsp|amp|lt|gt|quot|apos|#39|#x27);").expect("valid entity pattern")
});

/// Plain text of a rich-text body: entities decoded, tags dropped, whitespace
/// collapsed. Block-level tags separate words, inline tags do not.
pub fn strip_markup(content: &str) -> String {
    let decoded = ENTITY.replace_all(content, |caps: &regex::Captures<'_>| {
        match &caps[0] {
            "&nbsp;" => " ",
            "&amp;" => "&",
            "&lt;" => "<",
            "&gt;" => ">",
            "&quot;" => "\"",
            _ => "'",
        }
    });
    let without_comments = COMMENT.replace_all(&decoded, "");
    let spaced = BLOCK_TAG.replace_all(&without_comments, " ");
    let text = ANY_TAG.replace_all(&spaced, "");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn snippet(content: &str) -> String {
    snippet_with_limit(content, SNIPPET_MAX_CHARS)
}

pub fn snippet_with_limit(content: &str, max_chars: usize) -> String {
    let text = strip_markup(content);
    if text.is_empty() {
        return EMPTY_SNIPPET.to_string();
    }
    let mut graphemes = text.graphemes(true);
    let head: String = graphemes.by_ref().take(max_chars).collect();
    if graphemes.next().is_none() {
        return head;
    }
    let mut truncated = head.trim_end().to_string();
    truncated.push_str(ELLIPSIS);
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_inline_markup_without_splitting_words() {
        assert_eq!(snippet("<p>Hello <b>world</b></p>"), "Hello world");
        assert_eq!(strip_markup("<b>wor</b>ld"), "world");
    }

    #[test]
    fn block_tags_separate_paragraphs() {
        assert_eq!(strip_markup("<p>one</p><p>two</p><ul><li>three</li></ul>"), "one two three");
        assert_eq!(strip_markup("line<br/>break"), "line break");
    }

    #[test]
    fn decodes_common_entities() {
        assert_eq!(strip_markup("Fish &amp; chips&nbsp;&quot;today&quot;"), "Fish & chips \"today\"");
        assert_eq!(strip_markup("a &lt; b"), "a < b");
    }

    #[test]
    fn empty_content_uses_fallback_text() {
        assert_eq!(snippet(""), EMPTY_SNIPPET);
        assert_eq!(snippet("<p>   </p><!-- note -->"), EMPTY_SNIPPET);
    }

    #[test]
    fn long_content_is_truncated_with_ellipsis() {
        let body = format!("<p>{}</p>", "a".repeat(150));
        let preview = snippet(&body);
        assert_eq!(preview, format!("{}...", "a".repeat(100)));

        let exact = "b".repeat(100);
        assert_eq!(snippet(&exact), exact);
    }

    #[test]
    fn snippet_matches_snippet_of_stripped_content() {
        let samples = [
            "<h1>Title</h1><p>Body with <i>style</i> &amp; more</p>",
            "<div>plain</div>",
            "",
            "no markup at all",
        ];
        for sample in samples {
            assert_eq!(snippet(&strip_markup(sample)), snippet(sample), "sample {sample:?}");
            assert_eq!(strip_markup(&strip_markup(sample)), strip_markup(sample));
        }
    }

    #[test]
    fn truncation_respects_grapheme_clusters() {
        let body = "e\u{301}".repeat(120);
        let preview = snippet_with_limit(&body, 3);
        assert_eq!(preview, format!("{}...", "e\u{301}".repeat(3)));
    }
}
