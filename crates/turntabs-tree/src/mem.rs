#![forbid(unsafe_code)]

//! Arena-backed in-memory [`HostTree`].
//!
//! `MemTree` behaves like a small DOM: a `#document` node with an
//! `html > body` skeleton, element and text nodes, class lists, inline style
//! properties, and a change log shaped like `MutationObserver` output.
//!
//! # Observation
//!
//! Mutations are only logged while the tree is observed. [`MemObserver`]
//! shares the observing flag with the tree, so detaching the observer drops
//! records exactly like `MutationObserver::disconnect` does in a browser.
//!
//! # Fault injection
//!
//! [`MemTree::inject_fault`] and [`MemTree::inject_panic`] make the n-th call
//! of a write operation fail, which lets tests drive every recovery path of
//! the engine deterministically. Builder helpers ([`MemTree::element`],
//! [`MemTree::text`], [`MemTree::remove`]) stand in for the host page and are
//! never subject to injected faults.
//!
//! ```
//! use turntabs_tree::HostTree;
//! use turntabs_tree::mem::MemTree;
//!
//! let mut tree = MemTree::new();
//! let body = tree.body();
//! let main = tree.element(body, "main", &[]);
//! let msg = tree.element(main, "div", &[("data-message-author-role", "user")]);
//! tree.text(msg, "hello");
//!
//! assert_eq!(tree.text_content(&main), "hello");
//! assert!(tree.contains(&body, &msg));
//! ```

use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::{HostTree, MutationRecord, Selector, TreeError};

/// Handle to a node of a [`MemTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// Raw arena index.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// Write operations that can be targeted by fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteOp {
    CreateElement,
    SetAttribute,
    SetText,
    AddClass,
    RemoveClass,
    SetStyle,
    InsertBefore,
    ClearChildren,
}

impl WriteOp {
    /// Operation name used in error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::CreateElement => "create_element",
            Self::SetAttribute => "set_attribute",
            Self::SetText => "set_text",
            Self::AddClass => "add_class",
            Self::RemoveClass => "remove_class",
            Self::SetStyle => "set_style",
            Self::InsertBefore => "insert_before",
            Self::ClearChildren => "clear_children",
        }
    }
}

#[derive(Debug, Clone)]
struct Fault {
    op: WriteOp,
    skip: usize,
    panic: bool,
}

#[derive(Debug, Clone)]
enum NodeKind {
    Document,
    Element {
        tag: String,
        attrs: BTreeMap<String, String>,
        styles: BTreeMap<String, String>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Observation handle sharing the logging flag of a [`MemTree`].
#[derive(Debug, Clone)]
pub struct MemObserver {
    observing: Rc<Cell<bool>>,
}

impl MemObserver {
    /// Start logging mutations.
    pub fn observe(&self) {
        self.observing.set(true);
    }

    /// Stop logging mutations.
    pub fn disconnect(&self) {
        self.observing.set(false);
    }

    /// Whether mutations are currently logged.
    #[must_use]
    pub fn is_observing(&self) -> bool {
        self.observing.get()
    }
}

/// In-memory document tree.
#[derive(Debug)]
pub struct MemTree {
    nodes: Vec<NodeData>,
    document: NodeId,
    body: NodeId,
    writes: usize,
    log: Vec<MutationRecord<NodeId>>,
    observing: Rc<Cell<bool>>,
    faults: Vec<Fault>,
}

impl Default for MemTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MemTree {
    /// Create a document with an empty `html > body` skeleton.
    #[must_use]
    pub fn new() -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            document: NodeId(0),
            body: NodeId(0),
            writes: 0,
            log: Vec::new(),
            observing: Rc::new(Cell::new(false)),
            faults: Vec::new(),
        };
        let document = tree.alloc(NodeKind::Document);
        let html = tree.alloc(element_kind("html"));
        tree.link(document, html, None);
        let body = tree.alloc(element_kind("body"));
        tree.link(html, body, None);
        tree.document = document;
        tree.body = body;
        tree
    }

    /// The `#document` node.
    #[must_use]
    pub const fn document(&self) -> NodeId {
        self.document
    }

    /// The `body` element.
    #[must_use]
    pub const fn body(&self) -> NodeId {
        self.body
    }

    /// Observation handle for this tree.
    #[must_use]
    pub fn observer(&self) -> MemObserver {
        MemObserver {
            observing: Rc::clone(&self.observing),
        }
    }

    // ── Host-side builders ──────────────────────────────────────────────

    /// Append a new element under `parent` with the given attributes.
    pub fn element(&mut self, parent: NodeId, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let mut kind = element_kind(tag);
        if let NodeKind::Element { attrs: map, .. } = &mut kind {
            for (name, value) in attrs {
                map.insert((*name).to_string(), (*value).to_string());
            }
        }
        let id = self.alloc(kind);
        self.link(parent, id, None);
        self.record(MutationRecord::child_list(parent));
        id
    }

    /// Append a text node under `parent`.
    pub fn text(&mut self, parent: NodeId, text: &str) -> NodeId {
        let id = self.alloc(NodeKind::Text(text.to_string()));
        self.link(parent, id, None);
        self.record(MutationRecord::child_list(parent));
        id
    }

    /// Detach `node` from its parent, as a host re-render would.
    pub fn remove(&mut self, node: NodeId) {
        if let Some(parent) = self.unlink(node) {
            self.record(MutationRecord::child_list(parent));
        }
    }

    /// Replace the data of a text node.
    pub fn edit_text(&mut self, node: NodeId, text: &str) {
        if let Some(NodeData {
            kind: NodeKind::Text(data),
            ..
        }) = self.nodes.get_mut(node.0 as usize)
        {
            *data = text.to_string();
            self.record(MutationRecord::character_data(node));
        }
    }

    // ── Inspection ──────────────────────────────────────────────────────

    /// Tag name of an element.
    #[must_use]
    pub fn tag(&self, node: NodeId) -> Option<&str> {
        match &self.data(node)?.kind {
            NodeKind::Element { tag, .. } => Some(tag.as_str()),
            _ => None,
        }
    }

    /// Inline style property of an element.
    #[must_use]
    pub fn style(&self, node: NodeId, property: &str) -> Option<&str> {
        match &self.data(node)?.kind {
            NodeKind::Element { styles, .. } => styles.get(property).map(String::as_str),
            _ => None,
        }
    }

    /// Number of successful write-API calls since creation or the last reset.
    #[must_use]
    pub const fn write_count(&self) -> usize {
        self.writes
    }

    /// Reset the write counter.
    pub fn reset_write_count(&mut self) {
        self.writes = 0;
    }

    /// Drain the mutation log.
    pub fn take_mutations(&mut self) -> Vec<MutationRecord<NodeId>> {
        std::mem::take(&mut self.log)
    }

    // ── Fault injection ─────────────────────────────────────────────────

    /// Make the `(skip + 1)`-th call of `op` fail with [`TreeError::Injected`].
    pub fn inject_fault(&mut self, op: WriteOp, skip: usize) {
        self.faults.push(Fault {
            op,
            skip,
            panic: false,
        });
    }

    /// Make the `(skip + 1)`-th call of `op` panic.
    pub fn inject_panic(&mut self, op: WriteOp, skip: usize) {
        self.faults.push(Fault {
            op,
            skip,
            panic: true,
        });
    }

    /// Remove all pending faults.
    pub fn clear_faults(&mut self) {
        self.faults.clear();
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    fn data(&self, node: NodeId) -> Option<&NodeData> {
        self.nodes.get(node.0 as usize)
    }

    fn data_mut(&mut self, node: NodeId) -> Result<&mut NodeData, TreeError> {
        self.nodes
            .get_mut(node.0 as usize)
            .ok_or(TreeError::Detached)
    }

    fn is_element(&self, node: NodeId) -> bool {
        matches!(
            self.data(node).map(|d| &d.kind),
            Some(NodeKind::Element { .. })
        )
    }

    fn link(&mut self, parent: NodeId, child: NodeId, before: Option<usize>) {
        self.nodes[child.0 as usize].parent = Some(parent);
        let children = &mut self.nodes[parent.0 as usize].children;
        match before {
            Some(pos) if pos <= children.len() => children.insert(pos, child),
            _ => children.push(child),
        }
    }

    fn unlink(&mut self, node: NodeId) -> Option<NodeId> {
        let parent = self.data(node)?.parent?;
        self.nodes[parent.0 as usize].children.retain(|c| *c != node);
        self.nodes[node.0 as usize].parent = None;
        Some(parent)
    }

    fn record(&mut self, record: MutationRecord<NodeId>) {
        if self.observing.get() {
            self.log.push(record);
        }
    }

    fn check_fault(&mut self, op: WriteOp) -> Result<(), TreeError> {
        let Some(pos) = self.faults.iter().position(|f| f.op == op) else {
            return Ok(());
        };
        if self.faults[pos].skip > 0 {
            self.faults[pos].skip -= 1;
            return Ok(());
        }
        let fault = self.faults.remove(pos);
        if fault.panic {
            panic!("injected panic in {}", op.name());
        }
        Err(TreeError::Injected { op: op.name() })
    }

    fn attrs_mut(&mut self, node: NodeId) -> Result<&mut BTreeMap<String, String>, TreeError> {
        match &mut self.data_mut(node)?.kind {
            NodeKind::Element { attrs, .. } => Ok(attrs),
            _ => Err(TreeError::NotAnElement),
        }
    }

    fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        match &self.data(node)?.kind {
            NodeKind::Element { attrs, .. } => attrs.get(name).map(String::as_str),
            _ => None,
        }
    }

    fn descendants(&self, scope: NodeId, out: &mut Vec<NodeId>) {
        if let Some(data) = self.data(scope) {
            for child in &data.children {
                out.push(*child);
                self.descendants(*child, out);
            }
        }
    }

    fn write_text(&self, node: NodeId, out: &mut String) {
        let Some(data) = self.data(node) else {
            return;
        };
        match &data.kind {
            NodeKind::Text(text) => out.push_str(text),
            _ => {
                for child in &data.children {
                    self.write_text(*child, out);
                }
            }
        }
    }

    fn edit_classes(
        &mut self,
        node: NodeId,
        op: WriteOp,
        edit: impl FnOnce(&mut Vec<String>),
    ) -> Result<(), TreeError> {
        self.check_fault(op)?;
        let attrs = self.attrs_mut(node)?;
        let mut tokens: Vec<String> = attrs
            .get("class")
            .map(|list| list.split_ascii_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        edit(&mut tokens);
        attrs.insert("class".to_string(), tokens.join(" "));
        self.writes += 1;
        self.record(MutationRecord::attribute(node, "class"));
        Ok(())
    }
}

fn element_kind(tag: &str) -> NodeKind {
    NodeKind::Element {
        tag: tag.to_ascii_lowercase(),
        attrs: BTreeMap::new(),
        styles: BTreeMap::new(),
    }
}

impl HostTree for MemTree {
    type Node = NodeId;

    fn root(&self) -> Option<NodeId> {
        Some(self.body)
    }

    fn query_first(&self, scope: Option<&NodeId>, selector: &Selector) -> Option<NodeId> {
        let mut all = Vec::new();
        self.descendants(scope.copied().unwrap_or(self.document), &mut all);
        all.into_iter().find(|node| self.matches(node, selector))
    }

    fn query_all(&self, scope: Option<&NodeId>, selector: &Selector) -> Vec<NodeId> {
        let mut all = Vec::new();
        self.descendants(scope.copied().unwrap_or(self.document), &mut all);
        all.retain(|node| self.matches(node, selector));
        all
    }

    fn parent(&self, node: &NodeId) -> Option<NodeId> {
        let parent = self.data(*node)?.parent?;
        self.is_element(parent).then_some(parent)
    }

    fn children(&self, node: &NodeId) -> Vec<NodeId> {
        self.data(*node)
            .map(|d| {
                d.children
                    .iter()
                    .copied()
                    .filter(|c| self.is_element(*c))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn matches(&self, node: &NodeId, selector: &Selector) -> bool {
        match self.data(*node).map(|d| &d.kind) {
            Some(NodeKind::Element { tag, attrs, .. }) => {
                selector.matches_with(tag, |name: &str| attrs.get(name).map(String::as_str))
            }
            _ => false,
        }
    }

    fn contains(&self, ancestor: &NodeId, node: &NodeId) -> bool {
        let mut current = Some(*node);
        while let Some(candidate) = current {
            if candidate == *ancestor {
                return true;
            }
            current = self.data(candidate).and_then(|d| d.parent);
        }
        false
    }

    fn is_connected(&self, node: &NodeId) -> bool {
        self.contains(&self.document, node)
    }

    fn text_content(&self, node: &NodeId) -> String {
        let mut out = String::new();
        self.write_text(*node, &mut out);
        out
    }

    fn attribute(&self, node: &NodeId, name: &str) -> Option<String> {
        self.attr(*node, name).map(str::to_string)
    }

    fn has_class(&self, node: &NodeId, class: &str) -> bool {
        self.attr(*node, "class")
            .is_some_and(|list| list.split_ascii_whitespace().any(|t| t == class))
    }

    fn create_element(&mut self, tag: &str) -> Result<NodeId, TreeError> {
        self.check_fault(WriteOp::CreateElement)?;
        self.writes += 1;
        Ok(self.alloc(element_kind(tag)))
    }

    fn set_attribute(&mut self, node: &NodeId, name: &str, value: &str) -> Result<(), TreeError> {
        self.check_fault(WriteOp::SetAttribute)?;
        self.attrs_mut(*node)?
            .insert(name.to_string(), value.to_string());
        self.writes += 1;
        self.record(MutationRecord::attribute(*node, name));
        Ok(())
    }

    fn set_text(&mut self, node: &NodeId, text: &str) -> Result<(), TreeError> {
        self.check_fault(WriteOp::SetText)?;
        if !self.is_element(*node) {
            return Err(TreeError::NotAnElement);
        }
        for child in std::mem::take(&mut self.data_mut(*node)?.children) {
            self.nodes[child.0 as usize].parent = None;
        }
        let text_node = self.alloc(NodeKind::Text(text.to_string()));
        self.link(*node, text_node, None);
        self.writes += 1;
        self.record(MutationRecord::child_list(*node));
        Ok(())
    }

    fn add_class(&mut self, node: &NodeId, class: &str) -> Result<(), TreeError> {
        self.edit_classes(*node, WriteOp::AddClass, |tokens| {
            if !tokens.iter().any(|t| t == class) {
                tokens.push(class.to_string());
            }
        })
    }

    fn remove_class(&mut self, node: &NodeId, class: &str) -> Result<(), TreeError> {
        self.edit_classes(*node, WriteOp::RemoveClass, |tokens| {
            tokens.retain(|t| t != class);
        })
    }

    fn set_style(
        &mut self,
        node: &NodeId,
        property: &str,
        value: Option<&str>,
    ) -> Result<(), TreeError> {
        self.check_fault(WriteOp::SetStyle)?;
        match &mut self.data_mut(*node)?.kind {
            NodeKind::Element { styles, .. } => match value {
                Some(value) => {
                    styles.insert(property.to_string(), value.to_string());
                }
                None => {
                    styles.remove(property);
                }
            },
            _ => return Err(TreeError::NotAnElement),
        }
        self.writes += 1;
        self.record(MutationRecord::attribute(*node, "style"));
        Ok(())
    }

    fn insert_before(
        &mut self,
        parent: &NodeId,
        child: &NodeId,
        reference: Option<&NodeId>,
    ) -> Result<(), TreeError> {
        self.check_fault(WriteOp::InsertBefore)?;
        let (parent, child) = (*parent, *child);
        if self.data(parent).is_none() || self.data(child).is_none() {
            return Err(TreeError::Detached);
        }
        if matches!(self.data(parent).map(|d| &d.kind), Some(NodeKind::Text(_)))
            || self.contains(&child, &parent)
        {
            return Err(TreeError::HierarchyRequest);
        }
        let mut reference = reference.copied();
        if let Some(r) = reference
            && self.data(r).and_then(|d| d.parent) != Some(parent)
        {
            return Err(TreeError::HierarchyRequest);
        }
        if reference == Some(child) {
            let siblings = &self.nodes[parent.0 as usize].children;
            let pos = siblings.iter().position(|c| *c == child);
            reference = pos.and_then(|p| siblings.get(p + 1)).copied();
        }
        if let Some(old_parent) = self.unlink(child) {
            self.record(MutationRecord::child_list(old_parent));
        }
        let pos = reference.and_then(|r| {
            self.nodes[parent.0 as usize]
                .children
                .iter()
                .position(|c| *c == r)
        });
        self.link(parent, child, pos);
        self.writes += 1;
        self.record(MutationRecord::child_list(parent));
        Ok(())
    }

    fn clear_children(&mut self, node: &NodeId) -> Result<(), TreeError> {
        self.check_fault(WriteOp::ClearChildren)?;
        for child in std::mem::take(&mut self.data_mut(*node)?.children) {
            self.nodes[child.0 as usize].parent = None;
        }
        self.writes += 1;
        self.record(MutationRecord::child_list(*node));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> (MemTree, NodeId, NodeId, NodeId) {
        let mut tree = MemTree::new();
        let body = tree.body();
        let main = tree.element(body, "main", &[]);
        let a = tree.element(main, "article", &[("class", "turn")]);
        let b = tree.element(main, "article", &[("class", "turn")]);
        (tree, main, a, b)
    }

    #[test]
    fn skeleton_has_body_under_html() {
        let tree = MemTree::new();
        let body = tree.body();
        assert_eq!(tree.tag(body), Some("body"));
        assert!(tree.is_connected(&body));
        assert_eq!(tree.parent(&body).and_then(|p| tree.tag(p)), Some("html"));
    }

    #[test]
    fn queries_follow_tree_order() {
        let (tree, main, a, b) = sample();
        assert_eq!(tree.query_all(Some(&main), &Selector::tag("article")), vec![a, b]);
        assert_eq!(tree.query_first(None, &Selector::class("turn")), Some(a));
        assert_eq!(tree.query_first(Some(&a), &Selector::class("turn")), None);
    }

    #[test]
    fn children_skip_text_nodes() {
        let (mut tree, main, a, b) = sample();
        tree.text(main, "loose text");
        assert_eq!(tree.children(&main), vec![a, b]);
    }

    #[test]
    fn class_edits_keep_other_tokens() {
        let (mut tree, _, a, _) = sample();
        tree.add_class(&a, "hidden").unwrap();
        tree.add_class(&a, "hidden").unwrap();
        assert_eq!(tree.attribute(&a, "class").as_deref(), Some("turn hidden"));
        tree.remove_class(&a, "hidden").unwrap();
        assert_eq!(tree.attribute(&a, "class").as_deref(), Some("turn"));
        assert_eq!(tree.write_count(), 3);
    }

    #[test]
    fn insert_before_moves_and_orders() {
        let (mut tree, main, a, b) = sample();
        let nav = tree.create_element("div").unwrap();
        let first = tree.first_child(&main);
        tree.insert_before(&main, &nav, first.as_ref()).unwrap();
        assert_eq!(tree.children(&main), vec![nav, a, b]);
        tree.insert_before(&main, &nav, Some(&b)).unwrap();
        assert_eq!(tree.children(&main), vec![a, nav, b]);
        tree.insert_before(&main, &nav, Some(&nav)).unwrap();
        assert_eq!(tree.children(&main), vec![a, nav, b]);
    }

    #[test]
    fn insert_rejects_cycles_and_foreign_references() {
        let (mut tree, main, a, b) = sample();
        assert_eq!(
            tree.insert_before(&a, &main, None),
            Err(TreeError::HierarchyRequest)
        );
        let body = tree.body();
        assert_eq!(
            tree.insert_before(&body, &a, Some(&b)),
            Err(TreeError::HierarchyRequest)
        );
    }

    #[test]
    fn removed_nodes_are_disconnected() {
        let (mut tree, main, a, _) = sample();
        tree.remove(a);
        assert!(!tree.is_connected(&a));
        assert!(!tree.contains(&main, &a));
    }

    #[test]
    fn mutations_only_logged_while_observed() {
        let (mut tree, main, a, _) = sample();
        assert!(tree.take_mutations().is_empty());
        let observer = tree.observer();
        observer.observe();
        tree.add_class(&a, "x").unwrap();
        tree.element(main, "div", &[]);
        observer.disconnect();
        tree.add_class(&a, "y").unwrap();
        assert_eq!(
            tree.take_mutations(),
            vec![
                MutationRecord::attribute(a, "class"),
                MutationRecord::child_list(main),
            ]
        );
    }

    #[test]
    fn injected_fault_hits_requested_call() {
        let (mut tree, _, a, b) = sample();
        tree.inject_fault(WriteOp::AddClass, 1);
        assert!(tree.add_class(&a, "x").is_ok());
        assert_eq!(
            tree.add_class(&b, "x"),
            Err(TreeError::Injected { op: "add_class" })
        );
        assert!(tree.add_class(&b, "x").is_ok());
    }

    #[test]
    #[should_panic(expected = "injected panic in set_text")]
    fn injected_panic_unwinds() {
        let (mut tree, _, a, _) = sample();
        tree.inject_panic(WriteOp::SetText, 0);
        let _ = tree.set_text(&a, "boom");
    }

    #[test]
    fn set_text_replaces_children() {
        let (mut tree, main, a, b) = sample();
        tree.set_text(&main, "only text").unwrap();
        assert!(tree.children(&main).is_empty());
        assert_eq!(tree.text_content(&main), "only text");
        assert!(!tree.is_connected(&a));
        assert!(!tree.is_connected(&b));
    }

    #[test]
    fn style_properties_round_trip() {
        let (mut tree, main, _, _) = sample();
        tree.set_style(&main, "display", Some("none")).unwrap();
        assert_eq!(tree.style(main, "display"), Some("none"));
        tree.set_style(&main, "display", None).unwrap();
        assert_eq!(tree.style(main, "display"), None);
    }
}
