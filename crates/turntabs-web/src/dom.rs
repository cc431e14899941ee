#![forbid(unsafe_code)]

//! Browser DOM as a [`HostTree`], and `MutationObserver` as a
//! [`ChangeSubscription`].
//!
//! Selectors are rendered to CSS with [`Selector::to_css`] and evaluated by
//! the browser. Nodes are `web_sys::Node` handles; equality is JS identity.

use turntabs_core::gate::{ChangeSubscription, ObserveOptions};
use turntabs_tree::{HostTree, MutationKind, MutationRecord, Selector, TreeError};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Document, Element, HtmlElement, MutationObserver, MutationObserverInit, Node};

pub(crate) fn host_error(err: JsValue) -> TreeError {
    TreeError::Host(err.as_string().unwrap_or_else(|| format!("{err:?}")))
}

fn element(node: &Node) -> Result<&Element, TreeError> {
    node.dyn_ref::<Element>().ok_or(TreeError::NotAnElement)
}

/// The live document.
#[derive(Debug, Clone)]
pub struct WebTree {
    document: Document,
}

impl WebTree {
    #[must_use]
    pub fn new(document: Document) -> Self {
        Self { document }
    }

    #[must_use]
    pub fn document(&self) -> &Document {
        &self.document
    }
}

impl HostTree for WebTree {
    type Node = Node;

    fn root(&self) -> Option<Node> {
        self.document.body().map(Into::into)
    }

    fn query_first(&self, scope: Option<&Node>, selector: &Selector) -> Option<Node> {
        let css = selector.to_css();
        let found = match scope {
            Some(node) => node.dyn_ref::<Element>()?.query_selector(&css),
            None => self.document.query_selector(&css),
        };
        found.ok().flatten().map(Into::into)
    }

    fn query_all(&self, scope: Option<&Node>, selector: &Selector) -> Vec<Node> {
        let css = selector.to_css();
        let list = match scope {
            Some(node) => match node.dyn_ref::<Element>() {
                Some(el) => el.query_selector_all(&css),
                None => return Vec::new(),
            },
            None => self.document.query_selector_all(&css),
        };
        let Ok(list) = list else {
            return Vec::new();
        };
        (0..list.length()).filter_map(|i| list.item(i)).collect()
    }

    fn parent(&self, node: &Node) -> Option<Node> {
        node.parent_element().map(Into::into)
    }

    fn children(&self, node: &Node) -> Vec<Node> {
        let Some(el) = node.dyn_ref::<Element>() else {
            return Vec::new();
        };
        let children = el.children();
        (0..children.length())
            .filter_map(|i| children.item(i))
            .map(Into::into)
            .collect()
    }

    fn matches(&self, node: &Node, selector: &Selector) -> bool {
        node.dyn_ref::<Element>()
            .and_then(|el| el.matches(&selector.to_css()).ok())
            .unwrap_or(false)
    }

    fn contains(&self, ancestor: &Node, node: &Node) -> bool {
        ancestor.contains(Some(node))
    }

    fn is_connected(&self, node: &Node) -> bool {
        node.is_connected()
    }

    fn text_content(&self, node: &Node) -> String {
        node.text_content().unwrap_or_default()
    }

    fn attribute(&self, node: &Node, name: &str) -> Option<String> {
        node.dyn_ref::<Element>()?.get_attribute(name)
    }

    fn has_class(&self, node: &Node, class: &str) -> bool {
        node.dyn_ref::<Element>()
            .is_some_and(|el| el.class_list().contains(class))
    }

    fn closest(&self, node: &Node, selector: &Selector) -> Option<Node> {
        let start = match node.dyn_ref::<Element>() {
            Some(el) => el.clone(),
            None => node.parent_element()?,
        };
        start
            .closest(&selector.to_css())
            .ok()
            .flatten()
            .map(Into::into)
    }

    fn create_element(&mut self, tag: &str) -> Result<Node, TreeError> {
        self.document
            .create_element(tag)
            .map(Into::into)
            .map_err(host_error)
    }

    fn set_attribute(&mut self, node: &Node, name: &str, value: &str) -> Result<(), TreeError> {
        element(node)?
            .set_attribute(name, value)
            .map_err(host_error)
    }

    fn set_text(&mut self, node: &Node, text: &str) -> Result<(), TreeError> {
        node.set_text_content(Some(text));
        Ok(())
    }

    fn add_class(&mut self, node: &Node, class: &str) -> Result<(), TreeError> {
        element(node)?
            .class_list()
            .add_1(class)
            .map_err(host_error)
    }

    fn remove_class(&mut self, node: &Node, class: &str) -> Result<(), TreeError> {
        element(node)?
            .class_list()
            .remove_1(class)
            .map_err(host_error)
    }

    fn set_style(
        &mut self,
        node: &Node,
        property: &str,
        value: Option<&str>,
    ) -> Result<(), TreeError> {
        let style = node
            .dyn_ref::<HtmlElement>()
            .ok_or(TreeError::NotAnElement)?
            .style();
        let result = match value {
            Some(value) => style.set_property(property, value),
            None => style.remove_property(property).map(|_| ()),
        };
        result.map_err(host_error)
    }

    fn insert_before(
        &mut self,
        parent: &Node,
        child: &Node,
        reference: Option<&Node>,
    ) -> Result<(), TreeError> {
        parent
            .insert_before(child, reference)
            .map(|_| ())
            .map_err(host_error)
    }

    fn clear_children(&mut self, node: &Node) -> Result<(), TreeError> {
        node.set_text_content(None);
        Ok(())
    }
}

/// Convert a browser change record. Unknown record types are skipped.
#[must_use]
pub fn convert_record(record: &web_sys::MutationRecord) -> Option<MutationRecord<Node>> {
    Some(MutationRecord {
        kind: MutationKind::from_dom(&record.type_())?,
        target: record.target()?,
        attribute_name: record.attribute_name(),
    })
}

/// `MutationObserver` bound to a root node.
#[derive(Debug)]
pub struct WebSubscription {
    observer: MutationObserver,
    root: Node,
}

impl WebSubscription {
    #[must_use]
    pub fn new(observer: MutationObserver, root: Node) -> Self {
        Self { observer, root }
    }
}

impl ChangeSubscription for WebSubscription {
    fn attach(&mut self, options: ObserveOptions) -> Result<(), TreeError> {
        let init = MutationObserverInit::new();
        init.set_child_list(options.contains(ObserveOptions::CHILD_LIST));
        init.set_subtree(options.contains(ObserveOptions::SUBTREE));
        init.set_attributes(options.contains(ObserveOptions::ATTRIBUTES));
        init.set_character_data(options.contains(ObserveOptions::CHARACTER_DATA));
        self.observer
            .observe_with_options(&self.root, &init)
            .map_err(host_error)
    }

    fn detach(&mut self) {
        self.observer.disconnect();
    }
}
