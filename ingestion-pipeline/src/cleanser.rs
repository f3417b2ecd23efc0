use std::sync::OnceLock;

use regex::Regex;

fn template_token_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{%.*?%\}").expect("static template token pattern"))
}

fn html_tag_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("static html tag pattern"))
}

fn whitespace_run_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static whitespace run pattern"))
}

/// Strip templating placeholders and markup, normalize whitespace (spec.md §4.2).
///
/// Operations run in the fixed order the spec prescribes: templated tokens,
/// then HTML-like tags, then whitespace collapse, then trim. Returns an empty
/// string iff the result is empty after trimming (property 8: idempotent).
pub fn cleanse(input: &str) -> String {
    let without_templates = template_token_pattern().replace_all(input, " ");
    let without_tags = html_tag_pattern().replace_all(&without_templates, " ");
    let collapsed = whitespace_run_pattern().replace_all(&without_tags, " ");
    collapsed.trim().to_string()
}

/// `true` when `cleanse` would drop this field entirely (spec.md §4.2: "the
/// pipeline skips items whose cleansed content is empty").
pub fn is_empty_after_cleanse(input: &str) -> bool {
    cleanse(input).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_template_tokens() {
        assert_eq!(cleanse("Hello {%nbsp%}world"), "Hello world");
    }

    #[test]
    fn strips_html_tags() {
        assert_eq!(cleanse("<b>Hello</b> <i>world</i>"), "Hello world");
    }

    #[test]
    fn collapses_whitespace_including_newlines() {
        assert_eq!(cleanse("Hello\n\n  world\t!"), "Hello world !");
    }

    #[test]
    fn trims_leading_and_trailing_whitespace() {
        assert_eq!(cleanse("   Hello world   "), "Hello world");
    }

    #[test]
    fn whitespace_only_input_cleanses_to_empty() {
        assert_eq!(cleanse("   {% nbsp %}  <br/> "), "");
        assert!(is_empty_after_cleanse("   {% nbsp %}  <br/> "));
    }

    #[test]
    fn cleanse_is_idempotent() {
        let input = "Hello {%nbsp%}<b>world</b>\n\nfoo";
        let once = cleanse(input);
        let twice = cleanse(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn operations_run_in_fixed_order() {
        // A template token that itself looks like it contains a tag-ish
        // fragment must be removed by the template pass before the tag pass
        // ever sees it, so no stray `<` survives the cleanse.
        let input = "before {%<br>%} after";
        let cleansed = cleanse(input);
        assert!(!cleansed.contains('<'));
        assert_eq!(cleansed, "before after");
    }
}
