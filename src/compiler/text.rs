//! Interpolation parsing for text nodes.
//!
//! Extracts `{{ expr }}` segments (or a custom delimiter pair) from a text
//! slice into a token stream: literals JSON-encoded, expressions run through
//! the filter transform and wrapped `_s(...)`. A parallel raw-token list
//! keeps the structured `@binding` form for downstream consumers.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::LazyLock;

use regex::Regex;
use rustc_hash::FxHashMap;

use crate::compiler::filter::parse_filters;

static DEFAULT_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{((?:.|\r?\n)+?)\}\}").unwrap());

thread_local! {
    static DELIMITER_CACHE: RefCell<FxHashMap<String, Rc<Regex>>> =
        RefCell::new(FxHashMap::default());
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextToken {
    Literal(String),
    /// The `{'@binding': expr}` form.
    Binding(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedText {
    /// The concatenation expression, e.g. `"hello "+_s(name)`.
    pub expression: String,
    pub tokens: Vec<TextToken>,
}

fn delimiter_regex(open: &str, close: &str) -> Rc<Regex> {
    let key = format!("{open}\u{0}{close}");
    DELIMITER_CACHE.with(|cache| {
        if let Some(re) = cache.borrow().get(&key) {
            return re.clone();
        }
        let pattern = format!(
            "{}((?:.|\\r?\\n)+?){}",
            regex::escape(open),
            regex::escape(close)
        );
        let re = Rc::new(Regex::new(&pattern).expect("escaped delimiters always compile"));
        cache.borrow_mut().insert(key, re.clone());
        re
    })
}

fn encode_literal(literal: &str) -> String {
    serde_json::to_string(literal).unwrap_or_else(|_| format!("{literal:?}"))
}

/// Parse interpolations out of a text slice. `None` when the text contains
/// no interpolation.
pub fn parse_text(text: &str, delimiters: Option<(&str, &str)>) -> Option<ParsedText> {
    let re: Rc<Regex> = match delimiters {
        Some((open, close)) => delimiter_regex(open, close),
        None => Rc::new(DEFAULT_TAG_RE.clone()),
    };
    if !re.is_match(text) {
        return None;
    }

    let mut pieces: Vec<String> = Vec::new();
    let mut raw_tokens: Vec<TextToken> = Vec::new();
    let mut last_index = 0usize;

    for caps in re.captures_iter(text) {
        let whole = caps.get(0).expect("group 0 always present");
        if whole.start() > last_index {
            let literal = &text[last_index..whole.start()];
            raw_tokens.push(TextToken::Literal(literal.to_string()));
            pieces.push(encode_literal(literal));
        }
        let exp = parse_filters(caps.get(1).map(|m| m.as_str()).unwrap_or("").trim());
        pieces.push(format!("_s({exp})"));
        raw_tokens.push(TextToken::Binding(exp));
        last_index = whole.end();
    }
    if last_index < text.len() {
        let literal = &text[last_index..];
        raw_tokens.push(TextToken::Literal(literal.to_string()));
        pieces.push(encode_literal(literal));
    }

    Some(ParsedText {
        expression: pieces.join("+"),
        tokens: raw_tokens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_plain_text_yields_none() {
        assert!(parse_text("hello", None).is_none());
    }

    #[test]
    fn test_single_interpolation() {
        let parsed = parse_text("{{ msg }}", None).unwrap();
        assert_eq!(parsed.expression, "_s(msg)");
        assert_eq!(parsed.tokens, vec![TextToken::Binding("msg".into())]);
    }

    #[test]
    fn test_mixed_literals_and_filters() {
        let parsed = parse_text("hello {{ a }} {{ b|f }}", None).unwrap();
        assert_eq!(
            parsed.expression,
            "\"hello \"+_s(a)+\" \"+_s(_f(\"f\")(b))"
        );
        assert_eq!(parsed.tokens.len(), 4);
        let bindings: Vec<_> = parsed
            .tokens
            .iter()
            .filter(|t| matches!(t, TextToken::Binding(_)))
            .collect();
        assert_eq!(bindings.len(), 2);
    }

    #[test]
    fn test_tail_literal() {
        let parsed = parse_text("{{ n }} items", None).unwrap();
        assert_eq!(parsed.expression, "_s(n)+\" items\"");
        assert_eq!(
            parsed.tokens,
            vec![
                TextToken::Binding("n".into()),
                TextToken::Literal(" items".into())
            ]
        );
    }

    #[rstest]
    #[case("[[", "]]", "[[ x ]]", "_s(x)")]
    #[case("${", "}", "pre ${x}", "\"pre \"+_s(x)")]
    #[case("{%", "%}", "{% a|f %}", "_s(_f(\"f\")(a))")]
    fn test_custom_delimiters(
        #[case] open: &str,
        #[case] close: &str,
        #[case] input: &str,
        #[case] expected: &str,
    ) {
        let parsed = parse_text(input, Some((open, close))).unwrap();
        assert_eq!(parsed.expression, expected);
    }

    #[test]
    fn test_newline_inside_interpolation() {
        let parsed = parse_text("{{ a +\n b }}", None).unwrap();
        assert_eq!(parsed.expression, "_s(a +\n b)");
    }
}
