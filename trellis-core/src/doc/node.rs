//! Doc tree nodes.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::dom::Node;

use super::attr::{Attr, Dyn};
use super::reconcile;

/// Counter for element node keys.
static ELEM_KEY_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_elem_key() -> u64 {
    ELEM_KEY_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Structure of a Doc.
#[derive(Clone, Default)]
pub enum DocNode {
    #[default]
    Empty,
    Append(Rc<DocNode>, Rc<DocNode>),
    Element(Rc<ElemNode>),
    EmbedView(Rc<EmbedNode>),
    Text(Rc<TextNode>),
    StaticDomNode(Node),
    TemplateInstance(Rc<TemplateNode>),
}

/// An element with its attributes and child Doc.
pub struct ElemNode {
    pub(crate) attr: Dyn,
    pub(crate) children: DocNode,
    pub(crate) element: Node,
    pub(crate) key: u64,
}

impl ElemNode {
    /// Link `children` into `element` and instantiate `attr` on it.
    pub(crate) fn create(element: Node, attr: &Attr, children: DocNode) -> Rc<Self> {
        reconcile::link_element(&element, &children);
        let attr = Dyn::insert(&element, attr);
        Rc::new(Self {
            attr,
            children,
            element,
            key: next_elem_key(),
        })
    }

    pub fn element(&self) -> &Node {
        &self.element
    }

    /// Process-unique key of this element node.
    pub fn key(&self) -> u64 {
        self.key
    }

    pub fn attr(&self) -> &Dyn {
        &self.attr
    }
}

impl fmt::Debug for ElemNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElemNode")
            .field("key", &self.key)
            .field("element", &self.element)
            .finish()
    }
}

/// The slot filled by the current Doc of a View.
#[derive(Default)]
pub struct EmbedNode {
    pub(crate) current: RefCell<DocNode>,
    pub(crate) dirty: Cell<bool>,
}

impl EmbedNode {
    pub(crate) fn update(&self, doc: DocNode) {
        *self.current.borrow_mut() = doc;
        self.dirty.set(true);
    }
}

/// A text node with a pending value.
pub struct TextNode {
    pub(crate) node: Node,
    pub(crate) value: RefCell<String>,
    pub(crate) dirty: Cell<bool>,
}

impl TextNode {
    pub(crate) fn new(node: Node) -> Self {
        let value = node.node_value();
        Self {
            node,
            value: RefCell::new(value),
            dirty: Cell::new(false),
        }
    }

    /// Record a new value; the DOM is written on the next sync.
    pub(crate) fn update(&self, value: String) {
        if *self.value.borrow() != value {
            *self.value.borrow_mut() = value;
            self.dirty.set(true);
        }
    }
}

/// A cloned template fragment with its filled placeholders.
pub struct TemplateNode {
    /// Top-level nodes of the fragment, in order.
    pub(crate) els: Vec<Node>,
    /// Placeholder elements whose children come from a Doc.
    pub(crate) holes: Vec<Rc<ElemNode>>,
    /// Elements carrying attribute fills.
    pub(crate) attrs: Vec<Dyn>,
}

impl fmt::Debug for DocNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocNode::Empty => f.write_str("Empty"),
            DocNode::Append(a, b) => f.debug_tuple("Append").field(a).field(b).finish(),
            DocNode::Element(e) => f.debug_tuple("Element").field(&e.key).finish(),
            DocNode::EmbedView(e) => f.debug_tuple("EmbedView").field(&*e.current.borrow()).finish(),
            DocNode::Text(t) => f.debug_tuple("Text").field(&*t.value.borrow()).finish(),
            DocNode::StaticDomNode(n) => f.debug_tuple("StaticDomNode").field(n).finish(),
            DocNode::TemplateInstance(t) => f
                .debug_struct("TemplateInstance")
                .field("roots", &t.els.len())
                .field("holes", &t.holes.len())
                .finish(),
        }
    }
}
