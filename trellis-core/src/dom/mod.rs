//! In-Memory Document
//!
//! The reconciler targets this module instead of a browser DOM. It offers the
//! handful of operations the engine needs (element and text creation,
//! `insert_before` / `remove_child`, attributes, classes, inline styles,
//! listeners, lookup by id, deep clone) and counts every mutation so that the
//! cost of a patch can be measured.
//!
//! Each thread has its own document with a `<body>` root:
//!
//! ```rust,ignore
//! let host = dom::create_element("div");
//! host.set_attribute("id", "app");
//! dom::body().append_child(&host);
//! assert!(dom::get_element_by_id("app").is_some());
//! ```

mod node;

use std::cell::Cell;

pub use node::{Event, Listener, Node};

/// Mutation counters for this thread's document.
///
/// Counters only grow; compare two snapshots to measure a span of work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DomStats {
    pub insertions: u64,
    pub removals: u64,
    pub text_writes: u64,
    pub attribute_writes: u64,
}

impl DomStats {
    /// Counter increments since `earlier`.
    pub fn since(&self, earlier: &DomStats) -> DomStats {
        DomStats {
            insertions: self.insertions - earlier.insertions,
            removals: self.removals - earlier.removals,
            text_writes: self.text_writes - earlier.text_writes,
            attribute_writes: self.attribute_writes - earlier.attribute_writes,
        }
    }

    /// Insertions plus removals.
    pub fn structural(&self) -> u64 {
        self.insertions + self.removals
    }
}

/// A document: a `<body>` element to mount into.
#[derive(Debug, Clone)]
pub struct Document {
    body: Node,
}

impl Document {
    fn new() -> Self {
        Self {
            body: Node::element("body"),
        }
    }

    pub fn body(&self) -> Node {
        self.body.clone()
    }

    pub fn get_element_by_id(&self, id: &str) -> Option<Node> {
        self.body.find_by_id(id)
    }
}

thread_local! {
    static DOCUMENT: Document = Document::new();
    static STATS: Cell<DomStats> = Cell::new(DomStats::default());
}

pub(crate) fn record(f: impl FnOnce(&mut DomStats)) {
    STATS.with(|cell| {
        let mut stats = cell.get();
        f(&mut stats);
        cell.set(stats);
    });
}

/// This thread's document.
pub fn document() -> Document {
    DOCUMENT.with(Document::clone)
}

pub fn body() -> Node {
    document().body()
}

pub fn create_element(tag: &str) -> Node {
    Node::element(tag)
}

pub fn create_text_node(value: &str) -> Node {
    Node::text(value)
}

/// Find an element attached under this thread's `<body>`.
pub fn get_element_by_id(id: &str) -> Option<Node> {
    document().get_element_by_id(id)
}

/// Mutation counters of this thread's document.
pub fn stats() -> DomStats {
    STATS.with(Cell::get)
}
