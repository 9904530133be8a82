//! DOM nodes.
//!
//! A [`Node`] is a shared handle to an element or a text node. Children are
//! owned by their parent; the parent link is weak.

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use super::record;

/// Counter for generating unique DOM node IDs.
static NODE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_node_id() -> u64 {
    NODE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Event listener callback.
pub type Listener = Rc<dyn Fn(&Event)>;

/// An event delivered to listeners.
#[derive(Debug, Clone)]
pub struct Event {
    pub name: String,
    pub target: Node,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeKind {
    Element { tag: String },
    Text,
}

struct NodeData {
    id: u64,
    kind: NodeKind,
    text: RefCell<String>,
    attributes: RefCell<IndexMap<String, String>>,
    styles: RefCell<IndexMap<String, String>>,
    listeners: RefCell<Vec<(String, Listener)>>,
    children: RefCell<Vec<Node>>,
    parent: RefCell<Weak<NodeData>>,
}

/// A node in the in-memory document.
#[derive(Clone)]
pub struct Node(Rc<NodeData>);

impl Node {
    fn with_kind(kind: NodeKind, text: String) -> Self {
        Self(Rc::new(NodeData {
            id: next_node_id(),
            kind,
            text: RefCell::new(text),
            attributes: RefCell::new(IndexMap::new()),
            styles: RefCell::new(IndexMap::new()),
            listeners: RefCell::new(Vec::new()),
            children: RefCell::new(Vec::new()),
            parent: RefCell::new(Weak::new()),
        }))
    }

    pub(crate) fn element(tag: &str) -> Self {
        Self::with_kind(
            NodeKind::Element {
                tag: tag.to_ascii_lowercase(),
            },
            String::new(),
        )
    }

    pub(crate) fn text(value: &str) -> Self {
        Self::with_kind(NodeKind::Text, value.to_string())
    }

    /// Process-unique node id.
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn is_element(&self) -> bool {
        matches!(self.0.kind, NodeKind::Element { .. })
    }

    pub fn is_text(&self) -> bool {
        self.0.kind == NodeKind::Text
    }

    /// Lowercase tag name, `None` for text nodes.
    pub fn tag_name(&self) -> Option<&str> {
        match &self.0.kind {
            NodeKind::Element { tag } => Some(tag),
            NodeKind::Text => None,
        }
    }

    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    // ---- text ----

    /// The value of a text node. Empty for elements.
    pub fn node_value(&self) -> String {
        self.0.text.borrow().clone()
    }

    pub fn set_node_value(&self, value: &str) {
        *self.0.text.borrow_mut() = value.to_string();
        record(|s| s.text_writes += 1);
    }

    /// Concatenated text of this node and its descendants.
    pub fn text_content(&self) -> String {
        match self.0.kind {
            NodeKind::Text => self.node_value(),
            NodeKind::Element { .. } => self
                .0
                .children
                .borrow()
                .iter()
                .map(Node::text_content)
                .collect(),
        }
    }

    // ---- attributes ----

    pub fn get_attribute(&self, name: &str) -> Option<String> {
        self.0.attributes.borrow().get(name).cloned()
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.0.attributes.borrow().contains_key(name)
    }

    pub fn set_attribute(&self, name: &str, value: &str) {
        self.0
            .attributes
            .borrow_mut()
            .insert(name.to_string(), value.to_string());
        record(|s| s.attribute_writes += 1);
    }

    pub fn remove_attribute(&self, name: &str) {
        if self.0.attributes.borrow_mut().shift_remove(name).is_some() {
            record(|s| s.attribute_writes += 1);
        }
    }

    /// All attributes in insertion order.
    pub fn attributes(&self) -> Vec<(String, String)> {
        self.0
            .attributes
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    // ---- classes ----

    pub fn class_list(&self) -> Vec<String> {
        self.get_attribute("class")
            .map(|c| c.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.class_list().iter().any(|c| c == class)
    }

    pub fn add_class(&self, class: &str) {
        let mut classes = self.class_list();
        if !classes.iter().any(|c| c == class) {
            classes.push(class.to_string());
            self.set_attribute("class", &classes.join(" "));
        }
    }

    pub fn remove_class(&self, class: &str) {
        let classes = self.class_list();
        if classes.iter().any(|c| c == class) {
            let kept: Vec<String> = classes.into_iter().filter(|c| c != class).collect();
            self.set_attribute("class", &kept.join(" "));
        }
    }

    // ---- styles ----

    pub fn style(&self, name: &str) -> Option<String> {
        self.0.styles.borrow().get(name).cloned()
    }

    pub fn set_style(&self, name: &str, value: &str) {
        self.0
            .styles
            .borrow_mut()
            .insert(name.to_string(), value.to_string());
        record(|s| s.attribute_writes += 1);
    }

    pub fn remove_style(&self, name: &str) {
        if self.0.styles.borrow_mut().shift_remove(name).is_some() {
            record(|s| s.attribute_writes += 1);
        }
    }

    // ---- events ----

    pub fn add_event_listener(&self, name: &str, listener: Listener) {
        self.0
            .listeners
            .borrow_mut()
            .push((name.to_string(), listener));
    }

    /// Deliver an event to this node's listeners for `name`, in
    /// registration order. Returns the number of listeners invoked.
    pub fn dispatch_event(&self, name: &str) -> usize {
        let listeners: Vec<Listener> = self
            .0
            .listeners
            .borrow()
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, l)| Rc::clone(l))
            .collect();
        let event = Event {
            name: name.to_string(),
            target: self.clone(),
        };
        for listener in &listeners {
            listener(&event);
        }
        listeners.len()
    }

    // ---- tree ----

    pub fn parent(&self) -> Option<Node> {
        self.0.parent.borrow().upgrade().map(Node)
    }

    pub fn children(&self) -> Vec<Node> {
        self.0.children.borrow().clone()
    }

    pub fn child_count(&self) -> usize {
        self.0.children.borrow().len()
    }

    pub fn first_child(&self) -> Option<Node> {
        self.0.children.borrow().first().cloned()
    }

    pub fn next_sibling(&self) -> Option<Node> {
        let parent = self.parent()?;
        let siblings = parent.0.children.borrow();
        let index = siblings.iter().position(|c| c.ptr_eq(self))?;
        siblings.get(index + 1).cloned()
    }

    fn index_in_parent(&self) -> Option<(Node, usize)> {
        let parent = self.parent()?;
        let index = parent.0.children.borrow().iter().position(|c| c.ptr_eq(self))?;
        Some((parent, index))
    }

    fn detach(&self) {
        if let Some((parent, index)) = self.index_in_parent() {
            parent.0.children.borrow_mut().remove(index);
        }
        *self.0.parent.borrow_mut() = Weak::new();
    }

    /// Insert `child` before `reference`, or at the end when `reference` is
    /// `None` or not a child of this node. A child that already has a parent
    /// is moved.
    pub fn insert_before(&self, child: &Node, reference: Option<&Node>) {
        if reference.is_some_and(|r| r.ptr_eq(child)) {
            return;
        }
        child.detach();
        let mut children = self.0.children.borrow_mut();
        let index = reference
            .and_then(|r| children.iter().position(|c| c.ptr_eq(r)))
            .unwrap_or(children.len());
        children.insert(index, child.clone());
        *child.0.parent.borrow_mut() = Rc::downgrade(&self.0);
        record(|s| s.insertions += 1);
    }

    pub fn append_child(&self, child: &Node) {
        self.insert_before(child, None)
    }

    /// Remove `child`. Returns false if it is not a child of this node.
    pub fn remove_child(&self, child: &Node) -> bool {
        let index = self
            .0
            .children
            .borrow()
            .iter()
            .position(|c| c.ptr_eq(child));
        match index {
            Some(index) => {
                self.0.children.borrow_mut().remove(index);
                *child.0.parent.borrow_mut() = Weak::new();
                record(|s| s.removals += 1);
                true
            }
            None => false,
        }
    }

    /// Copy this node. Listeners are not copied; children are copied when
    /// `deep` is set.
    pub fn clone_node(&self, deep: bool) -> Node {
        let copy = Self::with_kind(self.0.kind.clone(), self.node_value());
        *copy.0.attributes.borrow_mut() = self.0.attributes.borrow().clone();
        *copy.0.styles.borrow_mut() = self.0.styles.borrow().clone();
        if deep {
            for child in self.children() {
                let child_copy = child.clone_node(true);
                *child_copy.0.parent.borrow_mut() = Rc::downgrade(&copy.0);
                copy.0.children.borrow_mut().push(child_copy);
            }
        }
        copy
    }

    /// Depth-first search for a descendant (or self) with the given `id`
    /// attribute.
    pub fn find_by_id(&self, id: &str) -> Option<Node> {
        if self.get_attribute("id").as_deref() == Some(id) {
            return Some(self.clone());
        }
        self.children().iter().find_map(|c| c.find_by_id(id))
    }

    /// Descendants (and self) carrying attribute `name`, in document order.
    pub fn find_all_with_attribute(&self, name: &str) -> Vec<Node> {
        let mut found = Vec::new();
        self.collect_with_attribute(name, &mut found);
        found
    }

    fn collect_with_attribute(&self, name: &str, found: &mut Vec<Node>) {
        if self.has_attribute(name) {
            found.push(self.clone());
        }
        for child in self.children() {
            child.collect_with_attribute(name, found);
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.kind {
            NodeKind::Element { tag } => f
                .debug_struct("Element")
                .field("id", &self.0.id)
                .field("tag", tag)
                .field("children", &self.child_count())
                .finish(),
            NodeKind::Text => f
                .debug_struct("Text")
                .field("id", &self.0.id)
                .field("value", &*self.0.text.borrow())
                .finish(),
        }
    }
}
