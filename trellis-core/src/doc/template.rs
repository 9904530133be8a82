//! Templates
//!
//! A [`Template`] holds a static DOM fragment. Each instantiation deep-clones
//! the fragment and fills its placeholders:
//!
//! - `data-hole="name"`: children come from a [`Doc`];
//! - `data-text="name"`: text comes from a `View<String>`;
//! - `data-attr="name"`: an [`Attr`] is applied to the element.
//!
//! A fill naming a placeholder that does not exist is logged and dropped.
//! A placeholder nobody fills stays empty.

use std::rc::Rc;

use crate::dom::Node;
use crate::reactive::View;

use super::attr::{Attr, Dyn};
use super::node::{DocNode, ElemNode, TemplateNode};
use super::Doc;

const HOLE: &str = "data-hole";
const TEXT: &str = "data-text";
const ATTR: &str = "data-attr";

/// A fill for one named placeholder.
pub enum TemplateHole {
    Elt(String, Doc),
    Text(String, View<String>),
    Attr(String, Attr),
}

impl TemplateHole {
    pub fn name(&self) -> &str {
        match self {
            TemplateHole::Elt(name, _) | TemplateHole::Text(name, _) | TemplateHole::Attr(name, _) => {
                name
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Template {
    roots: Vec<Node>,
}

impl Template {
    pub fn new(roots: impl IntoIterator<Item = Node>) -> Self {
        Self {
            roots: roots.into_iter().collect(),
        }
    }

    pub fn roots(&self) -> &[Node] {
        &self.roots
    }

    /// Clone the fragment and fill its placeholders.
    pub fn instantiate(&self, holes: impl IntoIterator<Item = TemplateHole>) -> Doc {
        let els: Vec<Node> = self.roots.iter().map(|n| n.clone_node(true)).collect();
        for placeholder in els
            .iter()
            .flat_map(|root| [root.find_all_with_attribute(HOLE), root.find_all_with_attribute(TEXT)])
            .flatten()
        {
            for child in placeholder.children() {
                placeholder.remove_child(&child);
            }
        }
        let find = |attr: &str, name: &str| {
            els.iter()
                .flat_map(|root| root.find_all_with_attribute(attr))
                .find(|n| n.get_attribute(attr).as_deref() == Some(name))
        };

        let mut elem_holes = Vec::new();
        let mut attrs = Vec::new();
        let mut updates = View::constant(());

        for hole in holes {
            let (placeholder, children) = match hole {
                TemplateHole::Elt(name, doc) => match find(HOLE, &name) {
                    Some(el) => (el, doc),
                    None => {
                        tracing::warn!(hole = %name, "template has no such hole");
                        continue;
                    }
                },
                TemplateHole::Text(name, view) => match find(TEXT, &name) {
                    Some(el) => (el, Doc::text_view(view)),
                    None => {
                        tracing::warn!(hole = %name, "template has no such text hole");
                        continue;
                    }
                },
                TemplateHole::Attr(name, attr) => {
                    match find(ATTR, &name) {
                        Some(el) => {
                            let dyn_ = Dyn::insert(&el, &attr);
                            updates = View::map2_unit(&updates, &dyn_.updates());
                            attrs.push(dyn_);
                        }
                        None => tracing::warn!(hole = %name, "template has no such attribute hole"),
                    }
                    continue;
                }
            };

            updates = View::map2_unit(&updates, &children.updates);
            elem_holes.push(ElemNode::create(placeholder, &Attr::empty(), children.node));
        }

        Doc {
            node: DocNode::TemplateInstance(Rc::new(TemplateNode {
                els,
                holes: elem_holes,
                attrs,
            })),
            updates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::host;
    use crate::dom;
    use crate::reactive::Var;

    fn card() -> Template {
        let root = dom::create_element("div");
        let title = dom::create_element("h2");
        title.set_attribute(TEXT, "title");
        title.append_child(&dom::create_text_node("placeholder"));
        let body = dom::create_element("section");
        body.set_attribute(HOLE, "body");
        root.append_child(&title);
        root.append_child(&body);
        root.set_attribute(ATTR, "root");
        Template::new([root])
    }

    #[test]
    fn instantiate_fills_holes() {
        host::run_until_idle();
        let container = dom::create_element("main");
        let title = Var::create("Hello".to_string());
        let doc = card().instantiate([
            TemplateHole::Text("title".into(), title.view()),
            TemplateHole::Elt("body".into(), Doc::text_node("content")),
            TemplateHole::Attr("root".into(), Attr::class("card")),
        ]);
        Doc::run(&container, doc);
        host::run_until_idle();

        let root = container.first_child().expect("template root");
        assert!(root.has_class("card"));
        assert_eq!(root.text_content(), "Hellocontent");

        title.set("Bye".to_string()).unwrap();
        host::run_until_idle();
        assert_eq!(root.text_content(), "Byecontent");
    }

    #[test]
    fn missing_holes_are_tolerated() {
        host::run_until_idle();
        let container = dom::create_element("main");
        let doc = card().instantiate([TemplateHole::Elt("nowhere".into(), Doc::text_node("x"))]);
        Doc::run(&container, doc);
        host::run_until_idle();

        // The unfilled text hole is emptied; the stray fill is dropped.
        assert_eq!(container.text_content(), "");
        assert_eq!(container.child_count(), 1);
    }

    #[test]
    fn instances_do_not_share_nodes() {
        let template = card();
        let a = template.instantiate([]);
        let b = template.instantiate([]);
        let (DocNode::TemplateInstance(a), DocNode::TemplateInstance(b)) = (a.node(), b.node()) else {
            panic!("expected template instances");
        };
        assert!(!a.els[0].ptr_eq(&b.els[0]));
        assert!(!a.els[0].ptr_eq(&template.roots()[0]));
    }
}
