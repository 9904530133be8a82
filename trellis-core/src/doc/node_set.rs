//! Sets of element nodes and DOM nodes.

use std::collections::HashSet;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::dom::Node;

use super::node::{DocNode, ElemNode};

/// A deduplicated set of element nodes, keyed by element key.
#[derive(Clone, Default)]
pub struct NodeSet(IndexMap<u64, Rc<ElemNode>>);

impl NodeSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every element node reachable in `doc`, descending into embedded
    /// Views and template holes.
    pub fn find_all(doc: &DocNode) -> Self {
        let mut set = IndexMap::new();
        collect(doc, &mut set);
        Self(set)
    }

    pub fn filter(&self, f: impl Fn(&ElemNode) -> bool) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(_, n)| f(n))
                .map(|(k, n)| (*k, Rc::clone(n)))
                .collect(),
        )
    }

    /// Members not in `other`.
    pub fn except(&self, other: &NodeSet) -> Self {
        self.filter(|n| !other.0.contains_key(&n.key))
    }

    /// Members also in `other`.
    pub fn intersect(&self, other: &NodeSet) -> Self {
        self.filter(|n| other.0.contains_key(&n.key))
    }

    pub fn contains(&self, node: &ElemNode) -> bool {
        self.0.contains_key(&node.key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_vec(&self) -> Vec<Rc<ElemNode>> {
        self.0.values().cloned().collect()
    }

    pub fn keys(&self) -> Vec<u64> {
        self.0.keys().copied().collect()
    }
}

fn collect(doc: &DocNode, set: &mut IndexMap<u64, Rc<ElemNode>>) {
    match doc {
        DocNode::Append(a, b) => {
            collect(a, set);
            collect(b, set);
        }
        DocNode::Element(el) => {
            set.insert(el.key, Rc::clone(el));
            collect(&el.children, set);
        }
        DocNode::EmbedView(embed) => collect(&embed.current.borrow(), set),
        DocNode::TemplateInstance(t) => {
            for hole in &t.holes {
                set.insert(hole.key, Rc::clone(hole));
                collect(&hole.children, set);
            }
        }
        DocNode::Empty | DocNode::Text(_) | DocNode::StaticDomNode(_) => {}
    }
}

/// An ordered list of DOM nodes compared by identity.
#[derive(Debug, Clone, Default)]
pub struct DomNodes(Vec<Node>);

impl DomNodes {
    /// Live children of `parent`.
    pub fn children(parent: &Node) -> Self {
        Self(parent.children())
    }

    /// DOM nodes that `doc` places directly under its parent element.
    pub fn doc_children(doc: &DocNode) -> Self {
        let mut out = Vec::new();
        collect_dom(doc, &mut out);
        Self(out)
    }

    /// Members not in `other`.
    pub fn except(&self, other: &DomNodes) -> Self {
        let excluded: HashSet<&Node> = other.0.iter().collect();
        Self(
            self.0
                .iter()
                .filter(|n| !excluded.contains(n))
                .cloned()
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn collect_dom(doc: &DocNode, out: &mut Vec<Node>) {
    match doc {
        DocNode::Append(a, b) => {
            collect_dom(a, out);
            collect_dom(b, out);
        }
        DocNode::Element(el) => out.push(el.element.clone()),
        DocNode::EmbedView(embed) => collect_dom(&embed.current.borrow(), out),
        DocNode::Text(t) => out.push(t.node.clone()),
        DocNode::StaticDomNode(n) => out.push(n.clone()),
        DocNode::TemplateInstance(t) => out.extend(t.els.iter().cloned()),
        DocNode::Empty => {}
    }
}
