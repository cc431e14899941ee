//! Shared transcript fixtures for integration tests.

#![allow(dead_code)]

use turntabs_core::EngineConfig;
use turntabs_tree::HostTree;
use turntabs_tree::Selector;
use turntabs_tree::mem::{MemTree, NodeId};

pub const HIDDEN: &str = "turntabs-hidden";

/// A chat page: `body > main > div.thread > article*`.
pub struct Page {
    pub tree: MemTree,
    pub main: NodeId,
    pub list: NodeId,
    /// User wrapper of every turn, in order.
    pub user_wrappers: Vec<NodeId>,
    /// Assistant wrapper of every turn, in order.
    pub replies: Vec<NodeId>,
}

impl Page {
    pub fn new(titles: &[&str]) -> Self {
        let mut tree = MemTree::new();
        let body = tree.body();
        let main = tree.element(body, "main", &[]);
        let list = tree.element(main, "div", &[("class", "thread")]);
        let mut page = Self {
            tree,
            main,
            list,
            user_wrappers: Vec::new(),
            replies: Vec::new(),
        };
        for title in titles {
            page.push_turn(title);
        }
        page
    }

    /// Append a user message and its reply.
    pub fn push_turn(&mut self, title: &str) {
        let user = self.tree.element(self.list, "article", &[]);
        let msg = self
            .tree
            .element(user, "div", &[("data-message-author-role", "user")]);
        if !title.is_empty() {
            self.tree.text(msg, title);
        }
        let reply = self.tree.element(self.list, "article", &[]);
        let body = self
            .tree
            .element(reply, "div", &[("data-message-author-role", "assistant")]);
        self.tree.text(body, "reply");
        self.user_wrappers.push(user);
        self.replies.push(reply);
    }

    /// Append a non-message sibling to the turn list.
    pub fn push_trailing(&mut self) -> NodeId {
        self.tree
            .element(self.list, "div", &[("class", "composer-spacer")])
    }
}

pub fn config() -> EngineConfig {
    EngineConfig::default()
}

/// Every node carrying the hidden annotation.
pub fn hidden_nodes(tree: &MemTree) -> Vec<NodeId> {
    tree.query_all(None, &Selector::class(HIDDEN))
}

/// The injected surface container, found by id.
pub fn surface(tree: &MemTree) -> Option<NodeId> {
    tree.query_first(None, &Selector::id("turntabs-container"))
}

/// Tab buttons in order.
pub fn tabs(tree: &MemTree) -> Vec<NodeId> {
    tree.query_all(None, &Selector::class("turntabs-tab"))
}

/// Index of the tab button carrying the active class.
pub fn active_tabs(tree: &MemTree) -> Vec<usize> {
    tabs(tree)
        .iter()
        .enumerate()
        .filter(|(_, tab)| tree.has_class(tab, "active"))
        .map(|(i, _)| i)
        .collect()
}
