#![forbid(unsafe_code)]

//! Host document tree abstraction for turntabs.
//!
//! The reconciliation engine never owns the tree it works on. Everything it
//! needs from the host page goes through [`HostTree`]: a handful of read
//! queries, a handful of fallible writes, and a change stream described by
//! [`MutationRecord`].
//!
//! Two implementations exist in the workspace:
//! - [`mem::MemTree`], an arena-backed tree used for headless runs and tests.
//! - `turntabs-web`, which binds the trait to the browser DOM.

pub mod mem;
pub mod mutation;
pub mod selector;

use core::fmt;

pub use mutation::{MutationKind, MutationRecord};
pub use selector::Selector;

/// Errors raised by tree writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// The node is no longer part of the tree.
    Detached,
    /// The operation requires an element but got a text node (or similar).
    NotAnElement,
    /// The insertion would create a cycle or used a reference node that is
    /// not a child of the parent.
    HierarchyRequest,
    /// Error reported by the host environment.
    Host(String),
    /// Failure injected by a test harness.
    Injected {
        /// Name of the operation that was made to fail.
        op: &'static str,
    },
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Detached => write!(f, "node is detached from the tree"),
            Self::NotAnElement => write!(f, "node is not an element"),
            Self::HierarchyRequest => write!(f, "invalid hierarchy request"),
            Self::Host(msg) => write!(f, "host error: {msg}"),
            Self::Injected { op } => write!(f, "injected failure in {op}"),
        }
    }
}

impl std::error::Error for TreeError {}

/// Read/write access to a host document tree.
///
/// `Node` is a cheap handle; equality is identity. Queries with a `scope` of
/// `None` search the whole document. `children` only yields element
/// children, matching the DOM's `Element.children`.
pub trait HostTree {
    /// Node handle type.
    type Node: Clone + PartialEq + fmt::Debug;

    /// Root ancestor the change stream is attached to (the document body).
    fn root(&self) -> Option<Self::Node>;

    /// First node in tree order under `scope` (exclusive) matching `selector`.
    fn query_first(&self, scope: Option<&Self::Node>, selector: &Selector) -> Option<Self::Node>;

    /// All nodes in tree order under `scope` (exclusive) matching `selector`.
    fn query_all(&self, scope: Option<&Self::Node>, selector: &Selector) -> Vec<Self::Node>;

    /// Parent element, if any.
    fn parent(&self, node: &Self::Node) -> Option<Self::Node>;

    /// Element children in tree order.
    fn children(&self, node: &Self::Node) -> Vec<Self::Node>;

    /// Whether `node` matches `selector`.
    fn matches(&self, node: &Self::Node, selector: &Selector) -> bool;

    /// Whether `node` is `ancestor` or one of its descendants.
    fn contains(&self, ancestor: &Self::Node, node: &Self::Node) -> bool;

    /// Whether `node` is reachable from the document root.
    fn is_connected(&self, node: &Self::Node) -> bool;

    /// Concatenated text of `node` and its descendants.
    fn text_content(&self, node: &Self::Node) -> String;

    /// Attribute value, if present.
    fn attribute(&self, node: &Self::Node, name: &str) -> Option<String>;

    /// Whether the class list of `node` contains `class`.
    fn has_class(&self, node: &Self::Node, class: &str) -> bool;

    /// Nearest inclusive ancestor matching `selector`.
    fn closest(&self, node: &Self::Node, selector: &Selector) -> Option<Self::Node> {
        let mut current = Some(node.clone());
        while let Some(candidate) = current {
            if self.matches(&candidate, selector) {
                return Some(candidate);
            }
            current = self.parent(&candidate);
        }
        None
    }

    /// First element child, if any.
    fn first_child(&self, node: &Self::Node) -> Option<Self::Node> {
        self.children(node).into_iter().next()
    }

    /// Create a detached element.
    fn create_element(&mut self, tag: &str) -> Result<Self::Node, TreeError>;

    /// Set (or replace) an attribute.
    fn set_attribute(&mut self, node: &Self::Node, name: &str, value: &str)
    -> Result<(), TreeError>;

    /// Replace all children of `node` with a single text node.
    fn set_text(&mut self, node: &Self::Node, text: &str) -> Result<(), TreeError>;

    /// Add a class token. Adding a present token is a no-op.
    fn add_class(&mut self, node: &Self::Node, class: &str) -> Result<(), TreeError>;

    /// Remove a class token. Removing an absent token is a no-op.
    fn remove_class(&mut self, node: &Self::Node, class: &str) -> Result<(), TreeError>;

    /// Set an inline style property, or remove it with `None`.
    fn set_style(
        &mut self,
        node: &Self::Node,
        property: &str,
        value: Option<&str>,
    ) -> Result<(), TreeError>;

    /// Insert `child` under `parent` before `reference` (append when `None`).
    ///
    /// A child that already has a parent is moved.
    fn insert_before(
        &mut self,
        parent: &Self::Node,
        child: &Self::Node,
        reference: Option<&Self::Node>,
    ) -> Result<(), TreeError>;

    /// Append `child` as the last child of `parent`.
    fn append_child(&mut self, parent: &Self::Node, child: &Self::Node) -> Result<(), TreeError> {
        self.insert_before(parent, child, None)
    }

    /// Remove every child of `node`.
    fn clear_children(&mut self, node: &Self::Node) -> Result<(), TreeError>;
}
