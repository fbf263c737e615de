//! The attributed element tree and its builder.
//!
//! The builder sits on the scanner's event stream and produces an
//! arena-allocated tree: element nodes with raw and processed attribute
//! views, `v-for`/`v-if`/`v-pre`/`v-once` extraction, and text nodes with
//! interpolation tokens lifted by the text parser. Code generation is
//! downstream and out of scope; the tree here is what the optimizer runs on.

use std::rc::Rc;
use std::sync::LazyLock;

use regex::Regex;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::compiler::html::{HtmlAttr, ParseHandler};
use crate::compiler::text::{parse_text, ParsedText, TextToken};
use crate::compiler::CompileWarning;
use crate::types::Str;

pub type NodeId = usize;

static FOR_ALIAS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([\s\S]*?)\s+(?:in|of)\s+([\s\S]*)").unwrap());
static FOR_ITERATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",([^,\}\]]*)(?:,([^,\}\]]*))?$").unwrap());
static STRIP_PARENS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\(|\)$").unwrap());
static DIRECTIVE_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^v-|^@|^:|^#").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub name: Str,
    pub value: Str,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForBinding {
    /// The iterated expression.
    pub for_exp: Str,
    pub alias: Str,
    pub iterator1: Option<Str>,
    pub iterator2: Option<Str>,
}

#[derive(Debug, Clone)]
pub struct IfCondition {
    /// `None` for a plain `v-else` branch.
    pub exp: Option<Str>,
    pub block: NodeId,
}

#[derive(Debug, Clone)]
pub struct ElementNode {
    pub tag: Str,
    pub attrs_list: SmallVec<[Attr; 4]>,
    pub attrs_map: FxHashMap<Str, Str>,
    pub raw_attrs_map: FxHashMap<Str, Attr>,
    /// Plain (non-directive) attributes.
    pub attrs: SmallVec<[Attr; 4]>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub start: usize,
    pub end: usize,
    /// No attributes at all: candidates for fast-path rendering.
    pub plain: bool,
    /// Any directive-shaped attribute was present.
    pub has_bindings: bool,
    pub pre: bool,
    pub once: bool,
    pub if_exp: Option<Str>,
    pub else_if_exp: Option<Str>,
    pub is_else: bool,
    pub if_conditions: Vec<IfCondition>,
    pub for_binding: Option<ForBinding>,
    pub static_: Option<bool>,
    pub static_root: bool,
    pub static_in_for: bool,
}

#[derive(Debug, Clone)]
pub struct TextNode {
    pub text: Str,
    /// Present on interpolated text.
    pub expression: Option<String>,
    pub tokens: Option<Vec<TextToken>>,
    pub start: usize,
    pub end: usize,
    pub static_: Option<bool>,
}

#[derive(Debug, Clone)]
pub enum AstNode {
    Element(ElementNode),
    Text(TextNode),
}

impl AstNode {
    /// The classic node type discriminant: 1 element, 2 interpolated text,
    /// 3 plain text.
    pub fn node_type(&self) -> u8 {
        match self {
            AstNode::Element(_) => 1,
            AstNode::Text(t) if t.expression.is_some() => 2,
            AstNode::Text(_) => 3,
        }
    }

    pub fn as_element(&self) -> Option<&ElementNode> {
        match self {
            AstNode::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut ElementNode> {
        match self {
            AstNode::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&TextNode> {
        match self {
            AstNode::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_static(&self) -> bool {
        match self {
            AstNode::Element(el) => el.static_.unwrap_or(false),
            AstNode::Text(t) => t.static_.unwrap_or(false),
        }
    }
}

/// Arena holding every node of one compiled template.
#[derive(Debug, Default)]
pub struct AstArena {
    nodes: Vec<AstNode>,
}

impl AstArena {
    pub fn new() -> AstArena {
        AstArena::default()
    }

    pub fn alloc(&mut self, node: AstNode) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn get(&self, id: NodeId) -> Option<&AstNode> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut AstNode> {
        self.nodes.get_mut(id)
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementNode> {
        self.get(id).and_then(AstNode::as_element)
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementNode> {
        self.get_mut(id).and_then(AstNode::as_element_mut)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// `v-for` expression parsing: `(item, i) in list` and friends.
pub fn parse_for(exp: &str) -> Option<ForBinding> {
    let caps = FOR_ALIAS.captures(exp)?;
    let for_exp: Str = Rc::from(caps.get(2)?.as_str().trim());
    let raw_alias = caps.get(1)?.as_str().trim().to_string();
    let alias_body = STRIP_PARENS.replace_all(&raw_alias, "").into_owned();

    let (alias, iterator1, iterator2) = match FOR_ITERATOR.captures(&alias_body) {
        Some(iter) => {
            let alias = FOR_ITERATOR.replace(&alias_body, "").trim().to_string();
            let iterator1 = iter.get(1).map(|m| Rc::from(m.as_str().trim()));
            let iterator2 = iter.get(2).map(|m| Rc::from(m.as_str().trim()));
            (alias, iterator1, iterator2)
        }
        None => (alias_body, None, None),
    };

    Some(ForBinding {
        for_exp,
        alias: Rc::from(alias.as_str()),
        iterator1,
        iterator2,
    })
}

// =============================================================================
// Tree builder
// =============================================================================

pub struct BuilderOptions {
    pub delimiters: Option<(String, String)>,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self { delimiters: None }
    }
}

/// Builds the element tree from scanner events.
pub struct TreeBuilder {
    arena: AstArena,
    root: Option<NodeId>,
    stack: Vec<NodeId>,
    pre_depth: usize,
    delimiters: Option<(String, String)>,
    warnings: Vec<CompileWarning>,
}

impl TreeBuilder {
    pub fn new(options: &BuilderOptions) -> TreeBuilder {
        TreeBuilder {
            arena: AstArena::new(),
            root: None,
            stack: Vec::new(),
            pre_depth: 0,
            delimiters: options.delimiters.clone(),
            warnings: Vec::new(),
        }
    }

    pub fn finish(self) -> (AstArena, Option<NodeId>, Vec<CompileWarning>) {
        (self.arena, self.root, self.warnings)
    }

    fn current_parent(&self) -> Option<NodeId> {
        self.stack.last().copied()
    }

    fn make_element(
        &mut self,
        tag: &str,
        attrs: Vec<HtmlAttr>,
        start: usize,
        end: usize,
    ) -> ElementNode {
        let mut attrs_list: SmallVec<[Attr; 4]> = SmallVec::new();
        let mut attrs_map = FxHashMap::default();
        let mut raw_attrs_map = FxHashMap::default();
        for attr in attrs {
            let converted = Attr {
                name: Rc::from(attr.name.as_str()),
                value: Rc::from(attr.value.as_str()),
                start: attr.start,
                end: attr.end,
            };
            attrs_map.insert(converted.name.clone(), converted.value.clone());
            raw_attrs_map.insert(converted.name.clone(), converted.clone());
            attrs_list.push(converted);
        }
        let mut el = ElementNode {
            tag: Rc::from(tag),
            plain: attrs_list.is_empty(),
            attrs_list,
            attrs_map,
            raw_attrs_map,
            attrs: SmallVec::new(),
            parent: self.current_parent(),
            children: Vec::new(),
            start,
            end,
            has_bindings: false,
            pre: false,
            once: false,
            if_exp: None,
            else_if_exp: None,
            is_else: false,
            if_conditions: Vec::new(),
            for_binding: None,
            static_: None,
            static_root: false,
            static_in_for: false,
        };
        self.process_attrs(&mut el);
        el
    }

    fn process_attrs(&mut self, el: &mut ElementNode) {
        if el.attrs_map.contains_key("v-pre") {
            el.pre = true;
        }
        let inside_pre = self.pre_depth > 0 || el.pre;
        for attr in el.attrs_list.clone() {
            let name = &*attr.name;
            if inside_pre || !DIRECTIVE_NAME.is_match(name) {
                if name != "v-pre" {
                    el.attrs.push(attr);
                }
                continue;
            }
            // v-once is a passive marker: it never counts as a binding
            if name == "v-once" {
                el.once = true;
                continue;
            }
            el.has_bindings = true;
            match name {
                "v-for" => match parse_for(&attr.value) {
                    Some(binding) => el.for_binding = Some(binding),
                    None => self
                        .warnings
                        .push(CompileWarning::InvalidFor(attr.value.to_string())),
                },
                "v-if" => {
                    el.if_exp = Some(attr.value.clone());
                }
                "v-else-if" => {
                    el.else_if_exp = Some(attr.value.clone());
                }
                "v-else" => {
                    el.is_else = true;
                }
                _ => {}
            }
        }
    }

    fn attach(&mut self, id: NodeId) {
        let (is_else_branch, else_exp, tag) = {
            let el = self.arena.element(id).expect("just allocated");
            (
                el.is_else || el.else_if_exp.is_some(),
                el.else_if_exp.clone(),
                el.tag.clone(),
            )
        };

        if is_else_branch {
            let prev = self.find_prev_element();
            let prev_has_if = prev
                .and_then(|p| self.arena.element(p))
                .is_some_and(|p| p.if_exp.is_some());
            if prev_has_if {
                if let Some(prev_el) = prev.and_then(|p| self.arena.element_mut(p)) {
                    prev_el.if_conditions.push(IfCondition {
                        exp: else_exp,
                        block: id,
                    });
                }
            } else {
                self.warnings
                    .push(CompileWarning::DanglingElse(tag.to_string()));
            }
            return;
        }

        // a v-if element heads its own condition chain
        if let Some(if_exp) = {
            let el = self.arena.element(id).expect("just allocated");
            el.if_exp.clone()
        } {
            if let Some(el) = self.arena.element_mut(id) {
                el.if_conditions.push(IfCondition {
                    exp: Some(if_exp),
                    block: id,
                });
            }
        }

        match self.current_parent() {
            Some(parent) => {
                if let Some(parent_el) = self.arena.element_mut(parent) {
                    parent_el.children.push(id);
                }
            }
            None => {
                if self.root.is_none() {
                    self.root = Some(id);
                } else {
                    self.warnings.push(CompileWarning::MultipleRoots);
                }
            }
        }
    }

    /// The previous element sibling of the node being attached. Text nodes
    /// sitting between the branches of one condition chain (condensed
    /// whitespace, usually) are dropped along the way; non-whitespace text
    /// there is dropped with a warning.
    fn find_prev_element(&mut self) -> Option<NodeId> {
        let Some(parent) = self.current_parent() else {
            return self.root;
        };
        loop {
            let last = self
                .arena
                .element(parent)
                .and_then(|p| p.children.last().copied())?;
            if matches!(self.arena.get(last), Some(AstNode::Element(_))) {
                return Some(last);
            }
            let ignored = self
                .arena
                .get(last)
                .and_then(AstNode::as_text)
                .map(|t| t.text.trim().to_string())
                .unwrap_or_default();
            if !ignored.is_empty() {
                self.warnings
                    .push(CompileWarning::TextBetweenBranches(ignored));
            }
            if let Some(el) = self.arena.element_mut(parent) {
                el.children.pop();
            }
        }
    }

    fn close_element(&mut self, id: NodeId) {
        // drop trailing whitespace text children
        if self.pre_depth == 0 {
            let trailing: Vec<NodeId> = {
                let Some(el) = self.arena.element(id) else {
                    return;
                };
                el.children
                    .iter()
                    .rev()
                    .take_while(|child| {
                        self.arena
                            .get(**child)
                            .and_then(AstNode::as_text)
                            .is_some_and(|t| t.expression.is_none() && t.text.trim().is_empty())
                    })
                    .copied()
                    .collect()
            };
            if !trailing.is_empty() {
                if let Some(el) = self.arena.element_mut(id) {
                    el.children.retain(|c| !trailing.contains(c));
                }
            }
        }
    }
}

impl ParseHandler for TreeBuilder {
    fn start(&mut self, tag: &str, attrs: Vec<HtmlAttr>, unary: bool, start: usize, end: usize) {
        let el = self.make_element(tag, attrs, start, end);
        let pre = el.pre;
        let id = self.arena.alloc(AstNode::Element(el));
        self.attach(id);
        if unary {
            self.close_element(id);
        } else {
            if pre {
                self.pre_depth += 1;
            }
            self.stack.push(id);
        }
    }

    fn end(&mut self, _tag: &str, _start: usize, end: usize) {
        if let Some(id) = self.stack.pop() {
            if let Some(el) = self.arena.element_mut(id) {
                el.end = end;
            }
            let was_pre = self
                .arena
                .element(id)
                .is_some_and(|el| el.pre);
            self.close_element(id);
            if was_pre && self.pre_depth > 0 {
                self.pre_depth -= 1;
            }
        }
    }

    fn chars(&mut self, text: &str, start: usize, end: usize) {
        let Some(parent) = self.current_parent() else {
            if !text.trim().is_empty() {
                self.warnings
                    .push(CompileWarning::TextOutsideRoot(text.trim().to_string()));
            }
            return;
        };

        let in_pre = self.pre_depth > 0;
        let trimmed_empty = text.trim().is_empty();
        let text_value: Option<String> = if in_pre || !trimmed_empty {
            Some(text.to_string())
        } else {
            let has_siblings = self
                .arena
                .element(parent)
                .is_some_and(|el| !el.children.is_empty());
            if !has_siblings {
                None
            } else if text.contains('\n') {
                // condense whitespace spanning lines away entirely
                None
            } else {
                Some(" ".to_string())
            }
        };

        let Some(text_value) = text_value else { return };

        let parsed: Option<ParsedText> = if in_pre {
            None
        } else {
            parse_text(
                &text_value,
                self.delimiters
                    .as_ref()
                    .map(|(open, close)| (open.as_str(), close.as_str())),
            )
        };
        let node = TextNode {
            text: Rc::from(text_value.as_str()),
            expression: parsed.as_ref().map(|p| p.expression.clone()),
            tokens: parsed.map(|p| p.tokens),
            start,
            end,
            static_: None,
        };
        let id = self.arena.alloc(AstNode::Text(node));
        if let Some(el) = self.arena.element_mut(parent) {
            el.children.push(id);
        }
    }

    fn comment(&mut self, _text: &str, _start: usize, _end: usize) {
        // comment nodes don't participate in the static analysis
    }

    fn warn(&mut self, warning: CompileWarning) {
        crate::util::warn(&warning.to_string(), None);
        self.warnings.push(warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_for_shapes() {
        let simple = parse_for("item in list").unwrap();
        assert_eq!(&*simple.alias, "item");
        assert_eq!(&*simple.for_exp, "list");
        assert!(simple.iterator1.is_none());

        let pair = parse_for("(item, i) in list").unwrap();
        assert_eq!(&*pair.alias, "item");
        assert_eq!(pair.iterator1.as_deref(), Some("i"));

        let triple = parse_for("(value, key, index) of object").unwrap();
        assert_eq!(&*triple.alias, "value");
        assert_eq!(triple.iterator1.as_deref(), Some("key"));
        assert_eq!(triple.iterator2.as_deref(), Some("index"));

        assert!(parse_for("garbage").is_none());
    }
}
