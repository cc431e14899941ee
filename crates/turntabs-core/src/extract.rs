#![forbid(unsafe_code)]

//! Turn extraction.
//!
//! A transcript is a flat list of sibling wrappers under one container. The
//! extractor finds that container starting from any user-authored message,
//! then walks its children in order: every child holding a user message opens
//! a new [`Turn`], every other child joins the open turn. Children before the
//! first user message belong to no turn and are never hidden.
//!
//! # Wrapper resolution
//!
//! Hosts change their markup. The wrapper of a user message is found with an
//! ordered list of [`WrapperStrategy`] values, each a pure lookup; the first
//! one that yields a node wins. The wrapper's parent is the container.
//!
//! # Fingerprint
//!
//! Titles joined with `|`. Cheap, order-sensitive, and collision-tolerant:
//! it only serves to skip passes that would re-render the same tabs.

use serde::{Deserialize, Serialize};
use turntabs_tree::{HostTree, Selector};
use unicode_segmentation::UnicodeSegmentation;

use crate::config::EngineConfig;

/// Separator between titles in a fingerprint.
pub const FINGERPRINT_SEPARATOR: &str = "|";

/// One way of finding the wrapper of a user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "selector", rename_all = "snake_case")]
pub enum WrapperStrategy {
    /// Nearest inclusive ancestor matching the selector.
    Closest(Selector),
    /// The parent element.
    Parent,
}

impl WrapperStrategy {
    /// Semantic turn container, class-based groups, then the parent.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::Closest(Selector::tag("article")),
            Self::Closest(Selector::class("group")),
            Self::Closest(Selector::all([
                Selector::tag("div"),
                Selector::class_contains("group"),
            ])),
            Self::Parent,
        ]
    }

    /// Apply this strategy to a user message node.
    pub fn locate<T: HostTree>(&self, tree: &T, sample: &T::Node) -> Option<T::Node> {
        match self {
            Self::Closest(selector) => tree.closest(sample, selector),
            Self::Parent => tree.parent(sample),
        }
    }
}

/// One conversational exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn<N> {
    /// Position in the turn sequence.
    pub index: usize,
    /// Trimmed user message text, or the ordinal fallback.
    pub title: String,
    /// Container children belonging to this turn, in tree order.
    pub members: Vec<N>,
}

/// Result of one extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction<N> {
    pub turns: Vec<Turn<N>>,
    pub fingerprint: String,
}

impl<N> Extraction<N> {
    /// No user message among the container's children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Number of turns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }
}

/// The wrapper of a sample user message and the container of all wrappers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnList<N> {
    pub wrapper: N,
    pub container: N,
}

/// Find any user message, preferring the injection target as search scope.
pub fn locate_sample<T: HostTree>(tree: &T, config: &EngineConfig) -> Option<T::Node> {
    let scope = tree.query_first(None, &config.injection_target);
    tree.query_first(scope.as_ref(), &config.user_message)
        .or_else(|| tree.query_first(scope.as_ref(), &config.user_message_alt))
        .or_else(|| {
            scope.as_ref()?;
            tree.query_first(None, &config.user_message)
                .or_else(|| tree.query_first(None, &config.user_message_alt))
        })
}

/// Resolve the turn list container from a sample user message.
pub fn resolve_turn_list<T: HostTree>(
    tree: &T,
    sample: &T::Node,
    strategies: &[WrapperStrategy],
) -> Option<TurnList<T::Node>> {
    let wrapper = strategies
        .iter()
        .find_map(|strategy| strategy.locate(tree, sample))?;
    let container = tree.parent(&wrapper)?;
    Some(TurnList { wrapper, container })
}

/// User message marker at or below `node`.
fn user_marker<T: HostTree>(tree: &T, node: &T::Node, config: &EngineConfig) -> Option<T::Node> {
    if tree.matches(node, &config.user_message) || tree.matches(node, &config.user_message_alt) {
        return Some(node.clone());
    }
    tree.query_first(Some(node), &config.user_message)
        .or_else(|| tree.query_first(Some(node), &config.user_message_alt))
}

/// Partition the children of `container` into turns.
pub fn extract<T: HostTree>(
    tree: &T,
    container: &T::Node,
    config: &EngineConfig,
    surface: Option<&T::Node>,
) -> Extraction<T::Node> {
    let mut turns: Vec<Turn<T::Node>> = Vec::new();

    for child in tree.children(container) {
        if surface == Some(&child)
            || tree.attribute(&child, "id").as_deref() == Some(config.surface_id.as_str())
        {
            continue;
        }
        match user_marker(tree, &child, config) {
            Some(marker) => {
                let text = tree.text_content(&marker);
                let text = text.trim();
                let title = if text.is_empty() {
                    format!("{} {}", config.fallback_label, turns.len() + 1)
                } else {
                    text.to_string()
                };
                turns.push(Turn {
                    index: turns.len(),
                    title,
                    members: vec![child],
                });
            }
            None => {
                if let Some(open) = turns.last_mut() {
                    open.members.push(child);
                }
            }
        }
    }

    let fingerprint = fingerprint(&turns);
    Extraction { turns, fingerprint }
}

/// Titles joined with [`FINGERPRINT_SEPARATOR`].
#[must_use]
pub fn fingerprint<N>(turns: &[Turn<N>]) -> String {
    turns
        .iter()
        .map(|turn| turn.title.as_str())
        .collect::<Vec<_>>()
        .join(FINGERPRINT_SEPARATOR)
}

/// Tab label for a title.
///
/// Counts grapheme clusters so emoji and combining sequences are never split.
/// Titles longer than `cap` keep their first `cap` clusters plus `ellipsis`;
/// an empty title becomes `fallback`.
#[must_use]
pub fn truncate_title(title: &str, cap: usize, ellipsis: &str, fallback: &str) -> String {
    if title.is_empty() {
        return fallback.to_string();
    }
    match title.grapheme_indices(true).nth(cap) {
        Some((cut, _)) => {
            let mut label = String::with_capacity(cut + ellipsis.len());
            label.push_str(&title[..cut]);
            label.push_str(ellipsis);
            label
        }
        None => title.to_string(),
    }
}
