//! Reconciliation of a Doc tree against the live DOM.
//!
//! A patch walks the tree from the mount point down. Attributes are synced
//! on every element; the children of an element are only re-linked when
//! an embedded View below it (without an element in between) has swapped
//! its Doc. Re-linking removes live children the Doc no longer places and
//! inserts the rest back to front, skipping nodes already in position.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::anim::Animation;
use crate::concurrency::{host, Async};
use crate::config;
use crate::dom::Node;

use super::attr::Attr;
use super::node::{DocNode, ElemNode, TemplateNode};
use super::node_set::{DomNodes, NodeSet};

/// Where the next node goes.
#[derive(Debug, Clone)]
pub(crate) enum InsertPos {
    AtEnd,
    BeforeNode(Node),
}

/// Insert `node` under `parent` at `pos` unless it is already there.
pub(crate) fn insert_at(parent: &Node, pos: &InsertPos, node: &Node) {
    let in_place = match (node.parent(), pos) {
        (Some(p), InsertPos::AtEnd) => p.ptr_eq(parent) && node.next_sibling().is_none(),
        (Some(p), InsertPos::BeforeNode(before)) => {
            p.ptr_eq(parent) && node.next_sibling().is_some_and(|n| n.ptr_eq(before))
        }
        (None, _) => false,
    };
    if !in_place {
        match pos {
            InsertPos::AtEnd => parent.append_child(node),
            InsertPos::BeforeNode(before) => parent.insert_before(node, Some(before)),
        }
    }
}

fn insert_node(parent: &Node, node: &Node, pos: InsertPos) -> InsertPos {
    insert_at(parent, &pos, node);
    InsertPos::BeforeNode(node.clone())
}

fn insert_template(parent: &Node, t: &TemplateNode, pos: InsertPos) -> InsertPos {
    t.els
        .iter()
        .rev()
        .fold(pos, |pos, el| insert_node(parent, el, pos))
}

/// Insert every DOM node of `doc` before `pos`, last first. Returns the
/// position in front of the first inserted node.
pub(crate) fn insert_doc(parent: &Node, doc: &DocNode, pos: InsertPos) -> InsertPos {
    match doc {
        DocNode::Append(a, b) => {
            let pos = insert_doc(parent, b, pos);
            insert_doc(parent, a, pos)
        }
        DocNode::Element(el) => insert_node(parent, &el.element, pos),
        DocNode::EmbedView(embed) => {
            embed.dirty.set(false);
            let current = embed.current.borrow().clone();
            insert_doc(parent, &current, pos)
        }
        DocNode::Empty => pos,
        DocNode::Text(t) => insert_node(parent, &t.node, pos),
        DocNode::StaticDomNode(node) => insert_node(parent, node, pos),
        DocNode::TemplateInstance(t) => insert_template(parent, t, pos),
    }
}

/// Append the DOM nodes of `children` to `element`.
pub(crate) fn link_element(element: &Node, children: &DocNode) {
    insert_doc(element, children, InsertPos::AtEnd);
}

/// Re-link the children of `el` against its current Doc.
fn do_sync_element(el: &ElemNode) {
    let parent = &el.element;
    let wanted = DomNodes::doc_children(&el.children);
    for stale in DomNodes::children(parent).except(&wanted).iter() {
        parent.remove_child(stale);
    }

    fn ins(parent: &Node, doc: &DocNode, pos: InsertPos) -> InsertPos {
        match doc {
            DocNode::Append(a, b) => {
                let pos = ins(parent, b, pos);
                ins(parent, a, pos)
            }
            DocNode::Element(e) => InsertPos::BeforeNode(e.element.clone()),
            DocNode::EmbedView(embed) => {
                let current = embed.current.borrow().clone();
                if embed.dirty.replace(false) {
                    insert_doc(parent, &current, pos)
                } else {
                    ins(parent, &current, pos)
                }
            }
            DocNode::Empty => pos,
            DocNode::Text(t) => InsertPos::BeforeNode(t.node.clone()),
            DocNode::StaticDomNode(node) => InsertPos::BeforeNode(node.clone()),
            DocNode::TemplateInstance(t) => match t.els.first() {
                Some(first) => InsertPos::BeforeNode(first.clone()),
                None => pos,
            },
        }
    }
    ins(parent, &el.children, InsertPos::AtEnd);
}

/// True if an embedded View directly under this level swapped its Doc.
fn has_dirty_children(doc: &DocNode) -> bool {
    match doc {
        DocNode::Append(a, b) => has_dirty_children(a) || has_dirty_children(b),
        DocNode::EmbedView(embed) => {
            embed.dirty.get() || has_dirty_children(&embed.current.borrow().clone())
        }
        _ => false,
    }
}

fn sync_element(el: &ElemNode) {
    el.attr.sync();
    if has_dirty_children(&el.children) {
        do_sync_element(el);
    }
    sync(&el.children);
    el.attr.fire_after_render();
}

fn sync(doc: &DocNode) {
    match doc {
        DocNode::Append(a, b) => {
            sync(a);
            sync(b);
        }
        DocNode::Element(el) => sync_element(el),
        DocNode::EmbedView(embed) => {
            let current = embed.current.borrow().clone();
            sync(&current);
        }
        DocNode::Empty | DocNode::StaticDomNode(_) => {}
        DocNode::Text(t) => {
            if t.dirty.replace(false) {
                t.node.set_node_value(&t.value.borrow());
            }
        }
        DocNode::TemplateInstance(t) => {
            for hole in &t.holes {
                sync_element(hole);
            }
            for attr in &t.attrs {
                attr.sync();
                attr.fire_after_render();
            }
        }
    }
}

/// Patch `el` and everything below it.
pub(crate) fn sync_elem_node(el: &ElemNode) {
    sync_element(el);
}

fn compute_exit_anim(previous: &NodeSet, current: &NodeSet) -> Animation {
    Animation::concat(
        previous
            .except(current)
            .filter(|n| n.attr.has_exit_anim())
            .to_vec()
            .iter()
            .map(|n| n.attr.exit_anim()),
    )
}

fn compute_enter_anim(previous: &NodeSet, current: &NodeSet) -> Animation {
    Animation::concat(
        current
            .except(previous)
            .filter(|n| n.attr.has_enter_anim())
            .to_vec()
            .iter()
            .map(|n| n.attr.enter_anim()),
    )
}

fn compute_change_anim(previous: &NodeSet, current: &NodeSet) -> Animation {
    Animation::concat(
        previous
            .intersect(current)
            .filter(|n| n.attr.has_change_anim())
            .to_vec()
            .iter()
            .map(|n| n.attr.change_anim()),
    )
}

/// A Doc mounted into a container element.
pub struct RunState {
    previous_nodes: RefCell<NodeSet>,
    top: Rc<ElemNode>,
}

impl RunState {
    /// Link `doc` into `container` and wrap both as the root element node.
    pub(crate) fn new(container: &Node, doc: DocNode) -> Rc<Self> {
        Rc::new(Self {
            previous_nodes: RefCell::new(NodeSet::empty()),
            top: ElemNode::create(container.clone(), &Attr::empty(), doc),
        })
    }

    pub fn container(&self) -> &Node {
        &self.top.element
    }

    /// Element nodes seen by the last completed patch.
    pub fn previous_nodes(&self) -> NodeSet {
        self.previous_nodes.borrow().clone()
    }

    fn current_nodes(&self) -> NodeSet {
        NodeSet::find_all(&self.top.children)
    }

    /// Patch the DOM now, without animations.
    pub fn perform_sync_update(&self) {
        let current = self.current_nodes();
        sync_elem_node(&self.top);
        tracing::trace!(nodes = current.len(), "reconciled");
        *self.previous_nodes.borrow_mut() = current;
    }

    /// Play change and exit animations, patch on the next animation frame,
    /// then play enter animations.
    pub fn perform_animated_update(self: &Rc<Self>) -> Async<()> {
        let st = Rc::clone(self);
        Async::delay(move || {
            if !config::animations_enabled() {
                let st = Rc::clone(&st);
                return Async::from_fn(move || st.perform_sync_update());
            }
            let current = st.current_nodes();
            let (change, enter, exit) = {
                let previous = st.previous_nodes.borrow();
                (
                    compute_change_anim(&previous, &current),
                    compute_enter_anim(&previous, &current),
                    compute_exit_anim(&previous, &current),
                )
            };
            tracing::trace!(
                nodes = current.len(),
                change = change.len(),
                enter = enter.len(),
                exit = exit.len(),
                "reconcile cycle"
            );

            let patch = {
                let st = Rc::clone(&st);
                Async::from_continuations(move |resolver| {
                    let st = Rc::clone(&st);
                    host::request_animation_frame(Box::new(move |_| {
                        sync_elem_node(&st.top);
                        if let Err(error) = resolver.resolve(()) {
                            tracing::error!(%error, "patch frame settled twice");
                        }
                    }));
                })
            };
            let commit = {
                let st = Rc::clone(&st);
                let current = current.clone();
                Async::from_fn(move || *st.previous_nodes.borrow_mut() = current.clone())
            };
            change
                .append(exit)
                .play()
                .then(patch)
                .then(enter.play())
                .then(commit)
        })
    }
}

impl fmt::Debug for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunState")
            .field("container", &self.top.element)
            .field("previous_nodes", &self.previous_nodes.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom;

    #[test]
    fn insert_at_skips_nodes_in_place() {
        let parent = dom::create_element("div");
        let a = dom::create_text_node("a");
        let b = dom::create_text_node("b");
        parent.append_child(&a);
        parent.append_child(&b);

        let before = dom::stats();
        insert_at(&parent, &InsertPos::BeforeNode(b.clone()), &a);
        insert_at(&parent, &InsertPos::AtEnd, &b);
        assert_eq!(dom::stats().since(&before).structural(), 0);

        insert_at(&parent, &InsertPos::AtEnd, &a);
        assert_eq!(parent.text_content(), "ba");
    }

    #[test]
    fn insert_doc_keeps_order() {
        let parent = dom::create_element("p");
        let doc = DocNode::Append(
            Rc::new(DocNode::StaticDomNode(dom::create_text_node("x"))),
            Rc::new(DocNode::Append(
                Rc::new(DocNode::Empty),
                Rc::new(DocNode::StaticDomNode(dom::create_text_node("y"))),
            )),
        );
        link_element(&parent, &doc);
        assert_eq!(parent.text_content(), "xy");
    }
}
