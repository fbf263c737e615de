//! The template compiler front-end.
//!
//! `html` scans the template into start/end/chars/comment events, `ast`
//! builds the attributed element tree from them (lifting interpolations via
//! `text` and `filter`), and `optimizer` marks static subtrees. Render
//! function generation consumes the result downstream.

pub mod ast;
pub mod filter;
pub mod html;
pub mod optimizer;
pub mod text;

use thiserror::Error;

pub use ast::{AstArena, AstNode, Attr, ElementNode, ForBinding, NodeId, TextNode, TreeBuilder};
pub use filter::parse_filters;
pub use html::{parse_html, HtmlAttr, HtmlParseOptions, ParseHandler};
pub use optimizer::optimize;
pub use text::{parse_text, ParsedText, TextToken};

/// A recoverable template problem. The compiler never fails: it warns and
/// keeps going, consuming unparseable input as text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileWarning {
    #[error("tag <{0}> has no matching end tag.")]
    UnmatchedEndTag(String),
    #[error("Mal-formatted tag at end of template: \"{0}\"")]
    MalformedTag(String),
    #[error("Component template should contain exactly one root element.")]
    MultipleRoots,
    #[error("v-else(-if) used on element <{0}> without corresponding v-if.")]
    DanglingElse(String),
    #[error("text \"{0}\" between v-if and v-else(-if) will be ignored.")]
    TextBetweenBranches(String),
    #[error("text \"{0}\" outside root element will be ignored.")]
    TextOutsideRoot(String),
    #[error("Invalid v-for expression: \"{0}\"")]
    InvalidFor(String),
}

#[derive(Debug, Clone, Default)]
pub struct CompilerOptions {
    pub html: HtmlParseOptions,
    pub delimiters: Option<(String, String)>,
}

pub struct CompileResult {
    pub arena: AstArena,
    pub root: Option<NodeId>,
    pub warnings: Vec<CompileWarning>,
}

/// Parse a template into an optimized element tree.
pub fn compile_to_ast(template: &str, options: &CompilerOptions) -> CompileResult {
    let mut builder = TreeBuilder::new(&ast::BuilderOptions {
        delimiters: options.delimiters.clone(),
    });
    parse_html(template, &options.html, &mut builder);
    let (mut arena, root, warnings) = builder.finish();
    optimize(&mut arena, root);
    CompileResult {
        arena,
        root,
        warnings,
    }
}
