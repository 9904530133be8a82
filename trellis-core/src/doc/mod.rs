//! Documents
//!
//! A [`Doc`] is a tree of DOM nodes to be, paired with a `View<()>` that
//! fires whenever something in the tree needs patching. Docs are built
//! from elements, text, static nodes, templates and embedded Views, and
//! mounted into a container with [`Doc::run`].
//!
//! # Update cycle
//!
//! Mounting links the tree into the container once, then sinks the Doc's
//! update View into a [`Mailbox`]. Each message runs one reconcile pass:
//! change and exit animations, the DOM patch on the next animation frame,
//! enter animations. Updates posted while a pass is running coalesce into
//! a single follow-up pass.
//!
//! ```rust,ignore
//! let name = Var::create("world".to_string());
//! let doc = Doc::element("p", Attr::class("greeting"), [
//!     Doc::text_node("hello "),
//!     Doc::text_view(name.view()),
//! ]);
//! Doc::run_by_id("app", doc)?;
//! name.set("trellis".to_string())?;
//! ```

mod attr;
mod node;
mod node_set;
mod reconcile;
mod template;

use std::hash::Hash;
use std::rc::Rc;

use crate::concurrency::Mailbox;
use crate::dom::{self, Node};
use crate::error::{Error, Result};
use crate::reactive::View;

pub use attr::{Attr, AttrFlags, AttrNode, Dyn};
pub use node::{DocNode, ElemNode, EmbedNode, TemplateNode, TextNode};
pub use node_set::{DomNodes, NodeSet};
pub use reconcile::RunState;
pub use template::{Template, TemplateHole};

#[derive(Clone)]
pub struct Doc {
    pub(crate) node: DocNode,
    pub(crate) updates: View<()>,
}

impl Default for Doc {
    fn default() -> Self {
        Self {
            node: DocNode::Empty,
            updates: View::constant(()),
        }
    }
}

impl Doc {
    pub fn node(&self) -> &DocNode {
        &self.node
    }

    pub fn updates(&self) -> View<()> {
        self.updates.clone()
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn append(a: Doc, b: Doc) -> Self {
        Self {
            updates: View::map2_unit(&a.updates, &b.updates),
            node: DocNode::Append(Rc::new(a.node), Rc::new(b.node)),
        }
    }

    /// Append a sequence of Docs as a balanced tree.
    pub fn concat(docs: impl IntoIterator<Item = Doc>) -> Self {
        let docs: Vec<Doc> = docs.into_iter().collect();
        tree_reduce(docs)
    }

    /// A new `tag` element.
    pub fn element(tag: &str, attr: Attr, children: impl IntoIterator<Item = Doc>) -> Self {
        Self::element_with(dom::create_element(tag), attr, children)
    }

    /// Adopt an existing element, replacing nothing already inside it.
    pub fn element_with(element: Node, attr: Attr, children: impl IntoIterator<Item = Doc>) -> Self {
        let children = Self::concat(children);
        let el = ElemNode::create(element, &attr, children.node);
        Self {
            updates: View::map2_unit(&el.attr.updates(), &children.updates),
            node: DocNode::Element(el),
        }
    }

    pub fn text_node(value: &str) -> Self {
        Self {
            node: DocNode::Text(Rc::new(TextNode::new(dom::create_text_node(value)))),
            updates: View::constant(()),
        }
    }

    /// A text node following `view`.
    pub fn text_view(view: View<String>) -> Self {
        let text = Rc::new(TextNode::new(dom::create_text_node("")));
        let updates = {
            let text = Rc::clone(&text);
            view.map(move |value| text.update(value))
        };
        Self {
            node: DocNode::Text(text),
            updates,
        }
    }

    /// A slot showing whichever Doc `view` currently holds.
    pub fn embed_view(view: View<Doc>) -> Self {
        let embed = Rc::new(EmbedNode::default());
        let updates = {
            let embed = Rc::clone(&embed);
            view.bind(move |doc: Doc| {
                embed.update(doc.node);
                doc.updates
            })
        };
        Self {
            node: DocNode::EmbedView(embed),
            updates,
        }
    }

    pub fn bind_view<T: Clone + 'static>(view: &View<T>, render: impl Fn(T) -> Doc + 'static) -> Self {
        Self::embed_view(view.map(render))
    }

    /// Render a list, reusing the Doc of every key seen in the previous
    /// version. Later values of a kept item arrive through its View.
    pub fn convert_seq_by<T, K>(
        view: &View<Vec<T>>,
        key: impl Fn(&T) -> K + 'static,
        render: impl Fn(&K, View<T>) -> Doc + 'static,
    ) -> Self
    where
        T: Clone + 'static,
        K: Hash + Eq + Clone + 'static,
    {
        Self::embed_view(view.map_seq_cached_by(key, render).map(Doc::concat))
    }

    /// Render a list, reusing the Doc of every item seen in the previous
    /// version.
    pub fn convert_seq<T>(view: &View<Vec<T>>, render: impl Fn(&T) -> Doc + 'static) -> Self
    where
        T: Clone + Hash + Eq + 'static,
    {
        Self::embed_view(view.map_seq_cached(render).map(Doc::concat))
    }

    /// Wrap a DOM node the reconciler moves but never patches.
    pub fn static_node(node: Node) -> Self {
        Self {
            node: DocNode::StaticDomNode(node),
            updates: View::constant(()),
        }
    }

    /// Mount `doc` into `container` with animated updates.
    pub fn run(container: &Node, doc: Doc) -> Rc<RunState> {
        let st = RunState::new(container, doc.node);
        let mailbox = {
            let st = Rc::clone(&st);
            Mailbox::new(move |()| st.perform_animated_update())
        };
        doc.updates.sink(move |()| mailbox.post(()));
        tracing::debug!(container = container.id(), "doc mounted");
        st
    }

    /// Mount `doc` into the element with the given `id`.
    pub fn run_by_id(id: &str, doc: Doc) -> Result<Rc<RunState>> {
        match dom::get_element_by_id(id) {
            Some(container) => Ok(Self::run(&container, doc)),
            None => Err(Error::MountTargetNotFound { id: id.to_string() }),
        }
    }

    /// Mount `doc` into `container`, patching synchronously on every update.
    pub fn run_immediate(container: &Node, doc: Doc) -> Rc<RunState> {
        let st = RunState::new(container, doc.node);
        {
            let st = Rc::clone(&st);
            doc.updates.sink(move |()| st.perform_sync_update());
        }
        tracing::debug!(container = container.id(), "doc mounted without animations");
        st
    }
}

fn tree_reduce(mut docs: Vec<Doc>) -> Doc {
    match docs.len() {
        0 => Doc::empty(),
        1 => docs.remove(0),
        n => {
            let right = docs.split_off(n / 2);
            Doc::append(tree_reduce(docs), tree_reduce(right))
        }
    }
}

impl std::fmt::Debug for Doc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Doc").field("node", &self.node).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anim::{Anim, DoubleInterpolation, Easing, Trans};
    use crate::concurrency::host;
    use crate::reactive::Var;
    use std::cell::{Cell, RefCell};

    fn mount() -> Node {
        host::run_until_idle();
        dom::create_element("div")
    }

    #[test]
    fn element_links_children_eagerly() {
        let doc = Doc::element(
            "ul",
            Attr::empty(),
            [Doc::text_node("a"), Doc::text_node("b")],
        );
        let DocNode::Element(el) = doc.node() else {
            panic!("expected an element");
        };
        assert_eq!(el.element().child_count(), 2);
        assert_eq!(el.element().text_content(), "ab");
    }

    #[test]
    fn concat_is_balanced() {
        fn depth(node: &DocNode) -> usize {
            match node {
                DocNode::Append(a, b) => 1 + depth(a).max(depth(b)),
                _ => 0,
            }
        }
        let docs = (0..8).map(|i| Doc::text_node(&i.to_string()));
        assert_eq!(depth(Doc::concat(docs).node()), 3);
        assert!(matches!(Doc::concat([]).node(), DocNode::Empty));
    }

    #[test]
    fn text_view_updates_in_place() {
        let container = mount();
        let name = Var::create("one".to_string());
        Doc::run(&container, Doc::element("p", Attr::empty(), [Doc::text_view(name.view())]));
        host::run_until_idle();

        let p = container.first_child().unwrap();
        let text = p.first_child().unwrap();
        assert_eq!(text.node_value(), "one");

        let before = dom::stats();
        name.set("two".to_string()).unwrap();
        host::run_until_idle();

        assert!(p.first_child().unwrap().ptr_eq(&text));
        assert_eq!(text.node_value(), "two");
        let delta = dom::stats().since(&before);
        assert_eq!(delta.structural(), 0);
        assert_eq!(delta.text_writes, 1);
    }

    #[test]
    fn embed_view_swaps_children() {
        let container = mount();
        let show = Var::create(true);
        let doc = Doc::bind_view(&show.view(), |show| {
            if show {
                Doc::element("b", Attr::empty(), [Doc::text_node("on")])
            } else {
                Doc::text_node("off")
            }
        });
        Doc::run(&container, doc);
        host::run_until_idle();
        assert_eq!(container.text_content(), "on");

        show.set(false).unwrap();
        host::run_until_idle();
        assert_eq!(container.text_content(), "off");
        assert_eq!(container.child_count(), 1);
    }

    #[test]
    fn keyed_sequence_reuses_elements() {
        let container = mount();
        let items = Var::create(vec!["a", "b", "c"]);
        let renders = Rc::new(Cell::new(0));
        let counter = Rc::clone(&renders);
        let doc = Doc::convert_seq_by(
            &items.view(),
            |s: &&str| s.to_string(),
            move |k, _| {
                counter.set(counter.get() + 1);
                Doc::element("li", Attr::create("data-key", k), [Doc::text_node(k)])
            },
        );
        Doc::run(&container, doc);
        host::run_until_idle();
        let b = container.children()[1].clone();

        items.set(vec!["b", "c", "d"]).unwrap();
        host::run_until_idle();

        assert_eq!(container.text_content(), "bcd");
        assert_eq!(renders.get(), 4);
        assert!(container.children()[0].ptr_eq(&b));
    }

    #[test]
    fn run_by_id_reports_missing_target() {
        let err = Doc::run_by_id("no-such-mount", Doc::empty()).unwrap_err();
        assert!(matches!(err, Error::MountTargetNotFound { ref id } if id == "no-such-mount"));
    }

    #[test]
    fn run_by_id_finds_body_descendant() {
        host::run_until_idle();
        let target = dom::create_element("section");
        target.set_attribute("id", "doc-mount-test");
        dom::body().append_child(&target);
        Doc::run_by_id("doc-mount-test", Doc::text_node("hi")).unwrap();
        host::run_until_idle();
        assert_eq!(target.text_content(), "hi");
        dom::body().remove_child(&target);
    }

    #[test]
    fn after_render_fires_once_after_mount() {
        let container = mount();
        let fired = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&fired);
        let label = Var::create("x".to_string());
        let doc = Doc::element(
            "canvas",
            Attr::on_after_render(move |el| log.borrow_mut().push(el.parent().is_some())),
            [Doc::text_view(label.view())],
        );
        Doc::run_immediate(&container, doc);
        host::run_until_idle();
        label.set("y".to_string()).unwrap();
        host::run_until_idle();

        assert_eq!(*fired.borrow(), vec![true]);
    }

    #[test]
    fn exit_animation_runs_before_removal() {
        let container = mount();
        let shown = Var::create(true);
        let attached = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&attached);
        let watched = container.clone();

        let fade = Trans::create(|a: &f64, b: &f64| {
            Anim::simple(DoubleInterpolation, Easing::linear(), 50.0, *a, *b)
        })
        .with_exit(move |from: &f64| {
            let log = Rc::clone(&log);
            let watched = watched.clone();
            let from = *from;
            Anim::new(50.0, move |t| {
                log.borrow_mut().push(watched.child_count());
                from * (1.0 - t / 50.0)
            })
        });
        let doc = Doc::bind_view(&shown.view(), move |shown| {
            if shown {
                let opacity = Attr::animated("opacity", fade.clone(), View::constant(1.0), |v| {
                    format!("{v:.2}")
                });
                Doc::element("div", opacity, [])
            } else {
                Doc::empty()
            }
        });
        Doc::run(&container, doc);
        host::run_until_idle();
        let el = container.first_child().unwrap();
        assert_eq!(el.get_attribute("opacity").as_deref(), Some("1.00"));

        shown.set(false).unwrap();
        host::run_until_idle();

        let attached = attached.borrow();
        assert!(attached.len() >= 2);
        assert!(attached.iter().all(|&n| n == 1));
        assert_eq!(container.child_count(), 0);
    }

    #[test]
    fn enter_and_change_animations_write_intermediate_values() {
        let container = mount();
        let width = Var::create(50.0);
        let written = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&written);

        let grow = Trans::create(|a: &f64, b: &f64| {
            Anim::simple(DoubleInterpolation, Easing::linear(), 100.0, *a, *b)
        })
        .with_enter(|x: &f64| Anim::simple(DoubleInterpolation, Easing::linear(), 100.0, 0.0, *x));
        let attr = Attr::animated("width", grow, width.view(), move |v: &f64| {
            log.borrow_mut().push(*v);
            format!("{v:.0}")
        });
        Doc::run(&container, Doc::element("div", attr, []));
        host::run_until_idle();

        let el = container.first_child().unwrap();
        let entered = written.borrow_mut().split_off(0);
        assert!(entered.iter().any(|v| *v > 0.0 && *v < 50.0));
        assert_eq!(entered.last().copied(), Some(50.0));
        assert_eq!(el.get_attribute("width").as_deref(), Some("50"));

        width.set(100.0).unwrap();
        host::run_until_idle();

        let changed = written.borrow().clone();
        assert!(changed.iter().any(|v| *v > 50.0 && *v < 100.0));
        assert!(changed.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(changed.last().copied(), Some(100.0));
        assert_eq!(el.get_attribute("width").as_deref(), Some("100"));
    }
}
