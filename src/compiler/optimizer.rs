//! Static subtree marking.
//!
//! Two passes over the element tree. The first marks every node static or
//! not: plain text is static, interpolated text is not, and an element is
//! static only when nothing about it can change between renders. The second
//! promotes static subtrees to static roots, except when the subtree is a
//! lone plain-text child (hoisting would cost more than it saves), and
//! records which static nodes sit inside a `v-for` body.

use crate::compiler::ast::{AstArena, AstNode, NodeId};
use crate::util::{is_built_in_tag, is_reserved_tag};

pub fn optimize(arena: &mut AstArena, root: Option<NodeId>) {
    let Some(root) = root else { return };
    mark_static(arena, root);
    mark_static_roots(arena, root, false);
}

fn mark_static(arena: &mut AstArena, id: NodeId) {
    let static_ = is_static(arena, id);
    match arena.get_mut(id) {
        Some(AstNode::Element(el)) => el.static_ = Some(static_),
        Some(AstNode::Text(t)) => {
            t.static_ = Some(static_);
            return;
        }
        None => return,
    }

    let (tag, has_inline_template, children, condition_blocks) = {
        let Some(el) = arena.element(id) else { return };
        (
            el.tag.clone(),
            el.attrs_map.contains_key("inline-template"),
            el.children.clone(),
            el.if_conditions
                .iter()
                .skip(1)
                .map(|c| c.block)
                .collect::<Vec<_>>(),
        )
    };

    // never promote component slot contents into static subtrees
    if !is_reserved_tag(&tag) && &*tag != "slot" && !has_inline_template {
        return;
    }

    for child in children {
        mark_static(arena, child);
        if !arena.get(child).is_some_and(AstNode::is_static) {
            if let Some(el) = arena.element_mut(id) {
                el.static_ = Some(false);
            }
        }
    }
    for block in condition_blocks {
        mark_static(arena, block);
        if !arena.get(block).is_some_and(AstNode::is_static) {
            if let Some(el) = arena.element_mut(id) {
                el.static_ = Some(false);
            }
        }
    }
}

fn is_static(arena: &AstArena, id: NodeId) -> bool {
    let Some(node) = arena.get(id) else {
        return false;
    };
    match node {
        // interpolated text
        AstNode::Text(t) if t.expression.is_some() => false,
        // plain text
        AstNode::Text(_) => true,
        AstNode::Element(el) => {
            el.pre
                || (!el.has_bindings
                    && el.if_exp.is_none()
                    && el.else_if_exp.is_none()
                    && !el.is_else
                    && el.for_binding.is_none()
                    && !is_built_in_tag(&el.tag)
                    && is_reserved_tag(&el.tag)
                    && !is_direct_child_of_template_for(arena, id))
        }
    }
}

fn is_direct_child_of_template_for(arena: &AstArena, id: NodeId) -> bool {
    let mut parent = arena.element(id).and_then(|el| el.parent);
    while let Some(p) = parent {
        let Some(el) = arena.element(p) else {
            return false;
        };
        if &*el.tag != "template" {
            return false;
        }
        if el.for_binding.is_some() {
            return true;
        }
        parent = el.parent;
    }
    false
}

fn mark_static_roots(arena: &mut AstArena, id: NodeId, is_in_for: bool) {
    let Some(el) = arena.element(id) else { return };
    let el_static = el.static_.unwrap_or(false);
    let el_once = el.once;
    let children = el.children.clone();
    let condition_blocks: Vec<NodeId> =
        el.if_conditions.iter().skip(1).map(|c| c.block).collect();
    let has_for = el.for_binding.is_some();

    if el_static || el_once {
        if let Some(el) = arena.element_mut(id) {
            el.static_in_for = is_in_for;
        }
    }

    // a static root needs children beyond one lone plain-text node
    let single_text_child = children.len() == 1
        && arena
            .get(children[0])
            .is_some_and(|n| n.node_type() == 3);
    if el_static && !children.is_empty() && !single_text_child {
        if let Some(el) = arena.element_mut(id) {
            el.static_root = true;
        }
        return;
    }
    if let Some(el) = arena.element_mut(id) {
        el.static_root = false;
    }

    for child in children {
        mark_static_roots(arena, child, is_in_for || has_for);
    }
    for block in condition_blocks {
        mark_static_roots(arena, block, is_in_for);
    }
}
