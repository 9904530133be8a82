//! Attributes
//!
//! An [`Attr`] is a description of what to do to an element: set a static
//! attribute, attach a listener, keep an attribute in step with a View, or
//! animate one. Attrs compose with [`Attr::append`] into a tree.
//!
//! When an element is created the tree is instantiated into a [`Dyn`]:
//!
//! - one-off initializers (static attributes, classes, styles, handlers) run
//!   immediately against the element;
//! - dynamic nodes are collected into a flat list, synced on every patch;
//! - post-render callbacks are kept until the element's first patch.
//!
//! # Flags
//!
//! Each node advertises whether it has enter, exit or change animations.
//! The flags of an appended tree are the union of its parts, computed when
//! the tree is built, so the reconciler can skip elements with nothing to
//! animate without walking their attributes.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::anim::{Anim, Animation, Trans, TransFlags};
use crate::dom::{Event, Node};
use crate::reactive::View;

bitflags::bitflags! {
    /// Animation capabilities of an attribute tree.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AttrFlags: u8 {
        const HAS_ENTER_ANIM = 1 << 0;
        const HAS_EXIT_ANIM = 1 << 1;
        const HAS_CHANGE_ANIM = 1 << 2;
    }
}

/// A dynamic attribute, instantiated once per Attr value.
pub trait AttrNode {
    /// Fires whenever the node has something new to write.
    fn changed(&self) -> View<()>;

    /// Write pending state to the element.
    fn sync(&self, element: &Node);

    fn enter_anim(&self, _element: &Node) -> Animation {
        Animation::empty()
    }

    fn exit_anim(&self, _element: &Node) -> Animation {
        Animation::empty()
    }

    fn change_anim(&self, _element: &Node) -> Animation {
        Animation::empty()
    }

    fn flags(&self) -> AttrFlags {
        AttrFlags::empty()
    }
}

type ElementFn = Rc<dyn Fn(&Node)>;

#[derive(Clone)]
enum AttrTree {
    Empty,
    Node(Rc<dyn AttrNode>),
    Append {
        left: Rc<AttrTree>,
        right: Rc<AttrTree>,
        flags: AttrFlags,
    },
    Init(ElementFn),
    AfterRender(ElementFn),
}

impl AttrTree {
    fn flags(&self) -> AttrFlags {
        match self {
            AttrTree::Node(node) => node.flags(),
            AttrTree::Append { flags, .. } => *flags,
            AttrTree::Empty | AttrTree::Init(_) | AttrTree::AfterRender(_) => AttrFlags::empty(),
        }
    }
}

/// A composable element attribute.
#[derive(Clone)]
pub struct Attr(AttrTree);

impl Default for Attr {
    fn default() -> Self {
        Self::empty()
    }
}

impl Attr {
    pub fn empty() -> Self {
        Self(AttrTree::Empty)
    }

    pub fn append(a: Attr, b: Attr) -> Self {
        match (a.0, b.0) {
            (AttrTree::Empty, other) | (other, AttrTree::Empty) => Self(other),
            (left, right) => {
                let flags = left.flags() | right.flags();
                Self(AttrTree::Append {
                    left: Rc::new(left),
                    right: Rc::new(right),
                    flags,
                })
            }
        }
    }

    pub fn concat(attrs: impl IntoIterator<Item = Attr>) -> Self {
        attrs.into_iter().fold(Self::empty(), Self::append)
    }

    pub fn flags(&self) -> AttrFlags {
        self.0.flags()
    }

    /// Run `init` against the element when it is created.
    pub fn init(init: impl Fn(&Node) + 'static) -> Self {
        Self(AttrTree::Init(Rc::new(init)))
    }

    /// A static attribute.
    pub fn create(name: &str, value: &str) -> Self {
        let (name, value) = (name.to_string(), value.to_string());
        Self::init(move |el| el.set_attribute(&name, &value))
    }

    pub fn class(name: &str) -> Self {
        let name = name.to_string();
        Self::init(move |el| el.add_class(&name))
    }

    /// A static inline style.
    pub fn style(name: &str, value: &str) -> Self {
        let (name, value) = (name.to_string(), value.to_string());
        Self::init(move |el| el.set_style(&name, &value))
    }

    /// An event listener. `factory` is called once with the element and
    /// returns the callback to register.
    pub fn handler<F>(event: &str, factory: impl Fn(&Node) -> F + 'static) -> Self
    where
        F: Fn(&Event) + 'static,
    {
        let event = event.to_string();
        Self::init(move |el| el.add_event_listener(&event, Rc::new(factory(el))))
    }

    /// Keep an attribute equal to the current value of `view`.
    pub fn dynamic(name: &str, view: View<String>) -> Self {
        let name = name.to_string();
        Self::dynamic_with(view, move |el, value: &String| el.set_attribute(&name, value))
    }

    /// Toggle a class with a boolean View.
    pub fn dynamic_class(name: &str, view: View<bool>) -> Self {
        let name = name.to_string();
        Self::dynamic_with(view, move |el, on: &bool| {
            if *on {
                el.add_class(&name)
            } else {
                el.remove_class(&name)
            }
        })
    }

    pub fn dynamic_style(name: &str, view: View<String>) -> Self {
        let name = name.to_string();
        Self::dynamic_with(view, move |el, value: &String| el.set_style(&name, value))
    }

    /// Push every value of `view` to the element with `set`.
    pub fn dynamic_with<T: Clone + 'static>(
        view: View<T>,
        set: impl Fn(&Node, &T) + 'static,
    ) -> Self {
        Self(AttrTree::Node(DynamicAttrNode::new(view, set)))
    }

    /// An attribute that moves between values with the animations of `trans`.
    pub fn animated<T: Clone + 'static>(
        name: &str,
        trans: Trans<T>,
        view: View<T>,
        format: impl Fn(&T) -> String + 'static,
    ) -> Self {
        let name = name.to_string();
        let push = move |el: &Node, value: &T| el.set_attribute(&name, &format(value));
        Self(AttrTree::Node(Rc::new(AnimatedHandle(
            AnimatedAttrNode::new(trans, view, push),
        ))))
    }

    /// Call `f` with the element right after its first patch.
    pub fn on_after_render(f: impl Fn(&Node) + 'static) -> Self {
        Self(AttrTree::AfterRender(Rc::new(f)))
    }
}

impl fmt::Debug for Attr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attr").field("flags", &self.flags()).finish()
    }
}

/// Attribute tree instantiated on an element.
pub struct Dyn {
    element: Node,
    flags: AttrFlags,
    nodes: SmallVec<[Rc<dyn AttrNode>; 4]>,
    updates: View<()>,
    after_render: RefCell<Vec<ElementFn>>,
}

impl Dyn {
    /// Instantiate `attr` on `element`, running its initializers now.
    pub fn insert(element: &Node, attr: &Attr) -> Self {
        let mut nodes = SmallVec::new();
        let mut after_render = Vec::new();
        let mut stack = vec![&attr.0];
        while let Some(tree) = stack.pop() {
            match tree {
                AttrTree::Empty => {}
                AttrTree::Node(node) => nodes.push(Rc::clone(node)),
                AttrTree::Append { left, right, .. } => {
                    stack.push(right);
                    stack.push(left);
                }
                AttrTree::Init(init) => init(element),
                AttrTree::AfterRender(f) => after_render.push(Rc::clone(f)),
            }
        }

        let updates = nodes
            .iter()
            .map(|n: &Rc<dyn AttrNode>| n.changed())
            .reduce(|a, b| View::map2_unit(&a, &b))
            .unwrap_or_else(|| View::constant(()));

        Self {
            element: element.clone(),
            flags: attr.flags(),
            nodes,
            updates,
            after_render: RefCell::new(after_render),
        }
    }

    pub fn element(&self) -> &Node {
        &self.element
    }

    pub fn flags(&self) -> AttrFlags {
        self.flags
    }

    pub fn has_enter_anim(&self) -> bool {
        self.flags.contains(AttrFlags::HAS_ENTER_ANIM)
    }

    pub fn has_exit_anim(&self) -> bool {
        self.flags.contains(AttrFlags::HAS_EXIT_ANIM)
    }

    pub fn has_change_anim(&self) -> bool {
        self.flags.contains(AttrFlags::HAS_CHANGE_ANIM)
    }

    /// Fires whenever any dynamic node has something to write.
    pub fn updates(&self) -> View<()> {
        self.updates.clone()
    }

    pub fn sync(&self) {
        for node in &self.nodes {
            node.sync(&self.element);
        }
    }

    pub fn enter_anim(&self) -> Animation {
        Animation::concat(self.nodes.iter().map(|n| n.enter_anim(&self.element)))
    }

    pub fn exit_anim(&self) -> Animation {
        Animation::concat(self.nodes.iter().map(|n| n.exit_anim(&self.element)))
    }

    pub fn change_anim(&self) -> Animation {
        Animation::concat(self.nodes.iter().map(|n| n.change_anim(&self.element)))
    }

    /// Run the post-render callbacks, once.
    pub(crate) fn fire_after_render(&self) {
        let callbacks = std::mem::take(&mut *self.after_render.borrow_mut());
        for f in callbacks {
            f(&self.element);
        }
    }
}

impl fmt::Debug for Dyn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dyn")
            .field("element", &self.element)
            .field("flags", &self.flags)
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

/// Pushes the latest value of a View to the element on sync.
struct DynamicAttrNode<T> {
    value: RefCell<Option<T>>,
    dirty: Cell<bool>,
    updates: View<()>,
    push: Box<dyn Fn(&Node, &T)>,
}

impl<T: Clone + 'static> DynamicAttrNode<T> {
    fn new(view: View<T>, push: impl Fn(&Node, &T) + 'static) -> Rc<Self> {
        Rc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let updates = view.map(move |value| {
                if let Some(node) = weak.upgrade() {
                    *node.value.borrow_mut() = Some(value);
                    node.dirty.set(true);
                }
            });
            Self {
                value: RefCell::new(None),
                dirty: Cell::new(false),
                updates,
                push: Box::new(push),
            }
        })
    }
}

impl<T: Clone + 'static> AttrNode for DynamicAttrNode<T> {
    fn changed(&self) -> View<()> {
        self.updates.clone()
    }

    fn sync(&self, element: &Node) {
        if self.dirty.replace(false) {
            if let Some(value) = self.value.borrow().as_ref() {
                (self.push)(element, value);
            }
        }
    }
}

/// A dynamic attribute whose visible value trails its logical value through
/// transition animations.
struct AnimatedAttrNode<T> {
    trans: Trans<T>,
    logical: RefCell<Option<T>>,
    visible: RefCell<Option<T>>,
    dirty: Cell<bool>,
    updates: View<()>,
    push: Rc<dyn Fn(&Node, &T)>,
}

impl<T: Clone + 'static> AnimatedAttrNode<T> {
    fn new(trans: Trans<T>, view: View<T>, push: impl Fn(&Node, &T) + 'static) -> Rc<Self> {
        Rc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let updates = view.map(move |value| {
                if let Some(node) = weak.upgrade() {
                    *node.logical.borrow_mut() = Some(value);
                    node.dirty.set(true);
                }
            });
            Self {
                trans,
                logical: RefCell::new(None),
                visible: RefCell::new(None),
                dirty: Cell::new(true),
                updates,
                push: Rc::new(push),
            }
        })
    }

    /// Write the logical value and make it the visible one.
    fn settle(&self, element: &Node) {
        if self.dirty.replace(false) {
            let logical = self.logical.borrow().clone();
            if let Some(value) = &logical {
                (self.push)(element, value);
            }
            *self.visible.borrow_mut() = logical;
        }
    }

    /// Play `anim` on the element, then settle on the logical value.
    fn animate(self: &Rc<Self>, element: &Node, anim: Option<Anim<T>>) -> Animation {
        let this = Rc::clone(self);
        let el = element.clone();
        let played = match anim {
            Some(anim) => {
                let push = Rc::clone(&self.push);
                let frames = Rc::clone(self);
                let target = element.clone();
                Animation::pack(anim.map(move |value| {
                    push(&target, &value);
                    *frames.visible.borrow_mut() = Some(value);
                    frames.dirty.set(true);
                }))
            }
            None => Animation::empty(),
        };
        played.when_done(move || this.settle(&el))
    }
}

/// Animated nodes need an `Rc` receiver to hand themselves to finalizers.
struct AnimatedHandle<T>(Rc<AnimatedAttrNode<T>>);

impl<T: Clone + 'static> AttrNode for AnimatedHandle<T> {
    fn changed(&self) -> View<()> {
        self.0.updates.clone()
    }

    fn sync(&self, element: &Node) {
        self.0.settle(element)
    }

    fn enter_anim(&self, element: &Node) -> Animation {
        let node = &self.0;
        let visible = node.visible.borrow().clone();
        let logical = node.logical.borrow().clone();
        let anim = match (visible, logical) {
            (Some(v), Some(l)) if node.dirty.get() => Some(node.trans.change(&v, &l)),
            (None, Some(l)) => Some(node.trans.enter(&l)),
            _ => None,
        };
        node.animate(element, anim)
    }

    fn exit_anim(&self, element: &Node) -> Animation {
        let node = &self.0;
        let visible = node.visible.borrow().clone();
        match visible {
            Some(v) => node.animate(element, Some(node.trans.exit(&v))),
            None => Animation::empty(),
        }
    }

    fn change_anim(&self, element: &Node) -> Animation {
        let node = &self.0;
        let visible = node.visible.borrow().clone();
        let logical = node.logical.borrow().clone();
        let anim = match (visible, logical) {
            (Some(v), Some(l)) if node.dirty.get() => Some(node.trans.change(&v, &l)),
            _ => None,
        };
        node.animate(element, anim)
    }

    fn flags(&self) -> AttrFlags {
        let trans = self.0.trans.flags();
        let mut flags = AttrFlags::empty();
        if trans.contains(TransFlags::ENTER) {
            flags |= AttrFlags::HAS_ENTER_ANIM;
        }
        if trans.contains(TransFlags::EXIT) {
            flags |= AttrFlags::HAS_EXIT_ANIM;
        }
        if trans.contains(TransFlags::CHANGE) {
            flags |= AttrFlags::HAS_CHANGE_ANIM;
        }
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anim::{DoubleInterpolation, Easing};
    use crate::dom;
    use crate::reactive::Var;

    #[test]
    fn initializers_run_at_insert() {
        let el = dom::create_element("div");
        let attr = Attr::concat([
            Attr::create("title", "hello"),
            Attr::class("card"),
            Attr::style("color", "red"),
        ]);
        let dyn_ = Dyn::insert(&el, &attr);

        assert_eq!(el.get_attribute("title").as_deref(), Some("hello"));
        assert!(el.has_class("card"));
        assert_eq!(el.style("color").as_deref(), Some("red"));
        assert!(dyn_.updates().snap().is_forever());
    }

    #[test]
    fn dynamic_attr_writes_only_when_dirty() {
        let el = dom::create_element("a");
        let href = Var::create("/one".to_string());
        let dyn_ = Dyn::insert(&el, &Attr::dynamic("href", href.view()));

        // Pulling the update view records the value.
        dyn_.updates().try_get();
        dyn_.sync();
        assert_eq!(el.get_attribute("href").as_deref(), Some("/one"));

        let before = dom::stats();
        dyn_.sync();
        assert_eq!(dom::stats().since(&before).attribute_writes, 0);

        href.set("/two".to_string()).unwrap();
        dyn_.updates().try_get();
        dyn_.sync();
        assert_eq!(el.get_attribute("href").as_deref(), Some("/two"));
    }

    #[test]
    fn dynamic_class_toggles() {
        let el = dom::create_element("li");
        let active = Var::create(true);
        let dyn_ = Dyn::insert(&el, &Attr::dynamic_class("active", active.view()));
        dyn_.updates().try_get();
        dyn_.sync();
        assert!(el.has_class("active"));

        active.set(false).unwrap();
        dyn_.updates().try_get();
        dyn_.sync();
        assert!(!el.has_class("active"));
    }

    #[test]
    fn flags_are_unioned_on_append() {
        let fade = Trans::create(|a: &f64, b: &f64| {
            Anim::simple(DoubleInterpolation, Easing::linear(), 100.0, *a, *b)
        })
        .with_exit(|x| Anim::constant(*x));
        let animated = Attr::animated("opacity", fade, View::constant(1.0), |v| v.to_string());
        let attr = Attr::append(Attr::create("id", "x"), animated);

        assert!(attr.flags().contains(AttrFlags::HAS_CHANGE_ANIM));
        assert!(attr.flags().contains(AttrFlags::HAS_EXIT_ANIM));
        assert!(!attr.flags().contains(AttrFlags::HAS_ENTER_ANIM));
    }

    #[test]
    fn after_render_fires_once() {
        let el = dom::create_element("canvas");
        let count = Rc::new(Cell::new(0));
        let counter = Rc::clone(&count);
        let dyn_ = Dyn::insert(
            &el,
            &Attr::on_after_render(move |_| counter.set(counter.get() + 1)),
        );
        dyn_.fire_after_render();
        dyn_.fire_after_render();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn handler_factory_sees_element() {
        let el = dom::create_element("button");
        let clicked = Rc::new(Cell::new(0u64));
        let sink = Rc::clone(&clicked);
        Dyn::insert(
            &el,
            &Attr::handler("click", move |node: &Node| {
                let id = node.id();
                let sink = Rc::clone(&sink);
                move |_: &Event| sink.set(id)
            }),
        );
        el.dispatch_event("click");
        assert_eq!(clicked.get(), el.id());
    }
}
