//! Streaming HTML scanner.
//!
//! A single pass over the template string with a cursor and a stack of
//! unclosed start tags, dispatching on the current prefix: comment,
//! downlevel conditional, doctype, end tag, start tag, else text. The
//! scanner never throws: anything unparseable is consumed as text, with a
//! warning when a pass cannot advance at all.

use std::cell::RefCell;
use std::sync::LazyLock;

use regex::Regex;
use rustc_hash::FxHashMap;

use crate::compiler::CompileWarning;
use crate::util::element::UNICODE_LETTERS;
use crate::util::{
    can_be_left_open_tag, is_ignore_newline_tag, is_non_phrasing_tag, is_plain_text_element,
    is_unary_tag,
};

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*([^\s"'<>/=]+)(?:\s*(=)\s*(?:"([^"]*)"+|'([^']*)'+|([^\s"'=<>`]+)))?"#)
        .unwrap()
});

static DYNAMIC_ARG_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^\s*((?:v-[\w-]+:|@|:|#)\[[^=]+?\][^\s"'<>/=]*)(?:\s*(=)\s*(?:"([^"]*)"+|'([^']*)'+|([^\s"'=<>`]+)))?"#,
    )
    .unwrap()
});

fn ncname() -> String {
    format!("[a-zA-Z_][\\-\\.0-9_{UNICODE_LETTERS}]*")
}

static START_TAG_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    let nc = ncname();
    Regex::new(&format!("^<((?:{nc}:)?{nc})")).unwrap()
});

static START_TAG_CLOSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*(/?)>").unwrap());

static END_TAG: LazyLock<Regex> = LazyLock::new(|| {
    let nc = ncname();
    Regex::new(&format!("^</((?:{nc}:)?{nc})[^>]*>")).unwrap()
});

static DOCTYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^(?i)<!DOCTYPE [^>]+>").unwrap());

static ENCODED_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("&(?:lt|gt|quot|amp|#39);").unwrap());

static ENCODED_ATTR_WITH_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("&(?:lt|gt|quot|amp|#39|#10|#9);").unwrap());

thread_local! {
    // per-tag regex for raw-text element contents
    static PLAIN_TEXT_RE_CACHE: RefCell<FxHashMap<String, Regex>> =
        RefCell::new(FxHashMap::default());
}

/// An attribute as scanned from a start tag, value already entity-decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlAttr {
    pub name: String,
    pub value: String,
    pub start: usize,
    pub end: usize,
}

/// Receives the scanner's event stream.
pub trait ParseHandler {
    fn start(&mut self, tag: &str, attrs: Vec<HtmlAttr>, unary: bool, start: usize, end: usize);
    fn end(&mut self, tag: &str, start: usize, end: usize);
    fn chars(&mut self, text: &str, start: usize, end: usize);
    fn comment(&mut self, text: &str, start: usize, end: usize);
    fn warn(&mut self, warning: CompileWarning) {
        crate::util::warn(&warning.to_string(), None);
    }
}

#[derive(Debug, Clone)]
pub struct HtmlParseOptions {
    /// Apply HTML auto-close rules (`<p>` before non-phrasing content,
    /// repeated left-open tags).
    pub expect_html: bool,
    pub should_keep_comments: bool,
    pub should_decode_newlines: bool,
    pub should_decode_newlines_for_href: bool,
}

impl Default for HtmlParseOptions {
    fn default() -> Self {
        Self {
            expect_html: true,
            should_keep_comments: false,
            should_decode_newlines: false,
            should_decode_newlines_for_href: false,
        }
    }
}

struct StackFrame {
    tag: String,
    lower_tag: String,
    start: usize,
    end: usize,
}

struct StartTagMatch {
    tag_name: String,
    attrs: Vec<RawAttr>,
    start: usize,
    end: usize,
    unary_slash: bool,
}

struct RawAttr {
    name: String,
    value: Option<String>,
    start: usize,
    end: usize,
}

struct Parser<'a, H: ParseHandler> {
    html: &'a str,
    index: usize,
    stack: Vec<StackFrame>,
    last_tag: Option<String>,
    options: &'a HtmlParseOptions,
    handler: &'a mut H,
}

/// Scan a template, emitting start/end/chars/comment events on the handler.
pub fn parse_html(html: &str, options: &HtmlParseOptions, handler: &mut impl ParseHandler) {
    let mut parser = Parser {
        html,
        index: 0,
        stack: Vec::new(),
        last_tag: None,
        options,
        handler,
    };
    parser.run();
}

impl<H: ParseHandler> Parser<'_, H> {
    fn run(&mut self) {
        while self.index < self.html.len() {
            let last = self.index;
            let in_plain_text = self
                .last_tag
                .as_deref()
                .is_some_and(is_plain_text_element);

            if in_plain_text {
                self.consume_plain_text_content();
            } else {
                self.scan_markup();
            }

            if self.index == last {
                // no handler advanced: the remainder is text
                let rest = &self.html[self.index..];
                self.handler.chars(rest, self.index, self.html.len());
                if self.stack.is_empty() {
                    self.handler
                        .warn(CompileWarning::MalformedTag(rest.to_string()));
                }
                break;
            }
        }
        // close anything left open
        self.parse_end_tag(None, None, None);
    }

    fn scan_markup(&mut self) {
        let rest = &self.html[self.index..];
        let text_end = rest.find('<');

        if text_end == Some(0) {
            if rest.starts_with("<!--") {
                if let Some(comment_end) = rest.find("-->") {
                    if self.options.should_keep_comments {
                        let text = &self.html[self.index + 4..self.index + comment_end];
                        self.handler
                            .comment(text, self.index, self.index + comment_end + 3);
                    }
                    self.index += comment_end + 3;
                    return;
                }
            }
            if rest.starts_with("<![") {
                if let Some(cond_end) = rest.find("]>") {
                    self.index += cond_end + 2;
                    return;
                }
            }
            if let Some(m) = DOCTYPE.find(rest) {
                self.index += m.end();
                return;
            }
            if let Some(caps) = END_TAG.captures(rest) {
                let start = self.index;
                let tag = caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
                self.index += caps.get(0).map(|m| m.end()).unwrap_or(0);
                self.parse_end_tag(Some(&tag), Some(start), Some(self.index));
                return;
            }
            if let Some(start_tag) = self.try_parse_start_tag(self.index) {
                let tag_name = start_tag.tag_name.clone();
                self.index = start_tag.end;
                self.handle_start_tag(start_tag);
                if is_ignore_newline_tag(&tag_name) && self.html[self.index..].starts_with('\n') {
                    self.index += 1;
                }
                return;
            }
        }

        // text: run to the next `<` that begins a recognizable construct
        let text_len = match text_end {
            None => rest.len(),
            Some(mut at) => {
                while at < rest.len() {
                    if self.begins_construct(self.index + at) {
                        break;
                    }
                    // `<` in plain text: be forgiving and skip past it
                    match rest[at + 1..].find('<') {
                        Some(next) => at += 1 + next,
                        None => break,
                    }
                }
                at
            }
        };
        if text_len > 0 {
            let text = &self.html[self.index..self.index + text_len];
            self.handler
                .chars(text, self.index, self.index + text_len);
            self.index += text_len;
        }
    }

    fn begins_construct(&self, at: usize) -> bool {
        let rest = &self.html[at..];
        END_TAG.is_match(rest)
            || rest.starts_with("<!--")
            || rest.starts_with("<![")
            || self.try_parse_start_tag(at).is_some()
    }

    /// Pure lookahead: parse a full start tag at `at` without consuming.
    fn try_parse_start_tag(&self, at: usize) -> Option<StartTagMatch> {
        let open = START_TAG_OPEN.captures(&self.html[at..])?;
        let tag_name = open.get(1)?.as_str().to_string();
        let mut pos = at + open.get(0)?.end();
        let mut attrs = Vec::new();
        loop {
            let rest = &self.html[pos..];
            if let Some(close) = START_TAG_CLOSE.captures(rest) {
                let unary_slash = close.get(1).is_some_and(|m| !m.as_str().is_empty());
                pos += close.get(0)?.end();
                return Some(StartTagMatch {
                    tag_name,
                    attrs,
                    start: at,
                    end: pos,
                    unary_slash,
                });
            }
            let caps = DYNAMIC_ARG_ATTRIBUTE
                .captures(rest)
                .or_else(|| ATTRIBUTE.captures(rest))?;
            let whole = caps.get(0)?;
            let name = caps.get(1)?.as_str().to_string();
            let value = caps
                .get(3)
                .or_else(|| caps.get(4))
                .or_else(|| caps.get(5))
                .map(|m| m.as_str().to_string());
            attrs.push(RawAttr {
                name,
                value,
                start: pos + caps.get(1)?.start(),
                end: pos + whole.end(),
            });
            pos += whole.end();
        }
    }

    fn handle_start_tag(&mut self, m: StartTagMatch) {
        if self.options.expect_html {
            if self.last_tag.as_deref() == Some("p") && is_non_phrasing_tag(&m.tag_name) {
                self.parse_end_tag(Some("p"), None, None);
            }
            if can_be_left_open_tag(&m.tag_name) && self.last_tag.as_deref() == Some(&m.tag_name)
            {
                self.parse_end_tag(Some(&m.tag_name), None, None);
            }
        }

        let unary = is_unary_tag(&m.tag_name) || m.unary_slash;
        let attrs: Vec<HtmlAttr> = m
            .attrs
            .into_iter()
            .map(|attr| {
                let should_decode_newlines =
                    if m.tag_name == "a" && attr.name == "href" {
                        self.options.should_decode_newlines_for_href
                    } else {
                        self.options.should_decode_newlines
                    };
                HtmlAttr {
                    value: decode_attr(
                        attr.value.as_deref().unwrap_or(""),
                        should_decode_newlines,
                    ),
                    name: attr.name,
                    start: attr.start,
                    end: attr.end,
                }
            })
            .collect();

        if !unary {
            self.stack.push(StackFrame {
                tag: m.tag_name.clone(),
                lower_tag: m.tag_name.to_ascii_lowercase(),
                start: m.start,
                end: m.end,
            });
            self.last_tag = Some(m.tag_name.clone());
        }
        self.handler
            .start(&m.tag_name, attrs, unary, m.start, m.end);
    }

    fn parse_end_tag(&mut self, tag_name: Option<&str>, start: Option<usize>, end: Option<usize>) {
        let start = start.unwrap_or(self.index);
        let end = end.unwrap_or(self.index);
        let lower = tag_name.map(str::to_ascii_lowercase);

        // closest matching open frame; 0 when closing everything at EOF
        let pos: isize = match &lower {
            Some(lower) => self
                .stack
                .iter()
                .rposition(|frame| frame.lower_tag == *lower)
                .map(|p| p as isize)
                .unwrap_or(-1),
            None => 0,
        };

        if pos >= 0 {
            for i in (pos as usize..self.stack.len()).rev() {
                if i as isize > pos || tag_name.is_none() {
                    self.handler.warn(CompileWarning::UnmatchedEndTag(
                        self.stack[i].tag.clone(),
                    ));
                }
                let tag = self.stack[i].tag.clone();
                self.handler.end(&tag, start, end);
            }
            self.stack.truncate(pos as usize);
            self.last_tag = if pos > 0 {
                Some(self.stack[pos as usize - 1].tag.clone())
            } else {
                None
            };
        } else if lower.as_deref() == Some("br") {
            // </br> is rewritten to <br>
            if let Some(tag) = tag_name {
                self.handler.start(tag, Vec::new(), true, start, end);
            }
        } else if lower.as_deref() == Some("p") {
            // a stray </p> autogenerates both tags
            if let Some(tag) = tag_name {
                self.handler.start(tag, Vec::new(), false, start, end);
                self.handler.end(tag, start, end);
            }
        }
    }

    /// Everything up to a raw-text element's closing tag is one text chunk.
    fn consume_plain_text_content(&mut self) {
        let Some(stacked_tag) = self.last_tag.clone() else {
            return;
        };
        let stacked_lower = stacked_tag.to_ascii_lowercase();
        let rest = &self.html[self.index..];

        let captured = PLAIN_TEXT_RE_CACHE.with(|cache| {
            let mut cache = cache.borrow_mut();
            let re = cache.entry(stacked_lower.clone()).or_insert_with(|| {
                Regex::new(&format!(
                    "(?is)([\\s\\S]*?)(</{}[^>]*>)",
                    regex::escape(&stacked_lower)
                ))
                .expect("escaped tag names always compile")
            });
            re.captures(rest).map(|caps| {
                let full_len = caps.get(0).map(|m| m.end()).unwrap_or(0);
                let end_tag_len = caps.get(2).map(|m| m.as_str().len()).unwrap_or(0);
                let text = caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
                (text, full_len, end_tag_len)
            })
        });

        let Some((mut text, full_len, end_tag_len)) = captured else {
            // unclosed raw-text element: the no-advance check takes over
            return;
        };

        if !is_plain_text_element(&stacked_lower) && stacked_lower != "noscript" {
            text = strip_cdata_and_comments(&text);
        }
        if is_ignore_newline_tag(&stacked_lower) && text.starts_with('\n') {
            text = text[1..].to_string();
        }

        let text_start = self.index;
        self.index += full_len;
        self.handler
            .chars(&text, text_start, self.index - end_tag_len);
        self.parse_end_tag(
            Some(&stacked_tag),
            Some(self.index - end_tag_len),
            Some(self.index),
        );
    }
}

fn strip_cdata_and_comments(text: &str) -> String {
    static COMMENT_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<!\--([\s\S]*?)-->").unwrap());
    static CDATA_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<!\[CDATA\[([\s\S]*?)]]>").unwrap());
    let text = COMMENT_RE.replace_all(text, "$1");
    CDATA_RE.replace_all(&text, "$1").into_owned()
}

/// Decode the attribute entity table: `&lt; &gt; &quot; &amp; &#39;` always,
/// plus `&#10; &#9;` when newline decoding is requested.
fn decode_attr(value: &str, should_decode_newlines: bool) -> String {
    let re: &Regex = if should_decode_newlines {
        &ENCODED_ATTR_WITH_NEWLINES
    } else {
        &ENCODED_ATTR
    };
    re.replace_all(value, |caps: &regex::Captures<'_>| {
        match caps.get(0).map(|m| m.as_str()).unwrap_or("") {
            "&lt;" => "<",
            "&gt;" => ">",
            "&quot;" => "\"",
            "&amp;" => "&",
            "&#39;" => "'",
            "&#10;" => "\n",
            "&#9;" => "\t",
            other => other,
        }
        .to_string()
    })
    .into_owned()
}
