//! Shared utilities: the warning channel, tag tables, and string helpers.

pub mod element;
pub mod lang;
pub mod warn;

pub use element::{
    can_be_left_open_tag, is_built_in_tag, is_html_tag, is_ignore_newline_tag,
    is_non_phrasing_tag, is_plain_text_element, is_reserved_tag, is_svg_tag, is_unary_tag,
    validate_component_name,
};
pub use lang::{camelize, capitalize, hyphenate, is_reserved, parse_path};
pub use warn::{reset_warn_state, set_silent, set_warn_handler, tip, warn};
