#![forbid(unsafe_code)]

//! Node selectors.
//!
//! A deliberately small subset of CSS: enough to express the markers and
//! landmarks the engine looks for, interpretable without a CSS engine by
//! in-memory trees and renderable to a CSS string for browser hosts.
//!
//! ```
//! use turntabs_tree::Selector;
//!
//! let group = Selector::all([Selector::tag("div"), Selector::class_contains("group")]);
//! assert_eq!(group.to_css(), r#"div[class*="group"]"#);
//! ```

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A node selector.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(tag = "kind", content = "value", rename_all = "snake_case")
)]
pub enum Selector {
    /// Element tag name (ASCII case-insensitive).
    Tag(String),
    /// Exact `id` attribute.
    Id(String),
    /// Class token (`[class~="x"]`).
    Class(String),
    /// Substring of the class attribute (`[class*="x"]`).
    ClassContains(String),
    /// Attribute presence, or exact value when `value` is set.
    Attr {
        /// Attribute name.
        name: String,
        /// Required value, if any.
        value: Option<String>,
    },
    /// Every part must match (compound selector).
    All(Vec<Selector>),
}

impl Selector {
    /// Tag selector.
    #[must_use]
    pub fn tag(tag: impl Into<String>) -> Self {
        Self::Tag(tag.into())
    }

    /// Id selector.
    #[must_use]
    pub fn id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }

    /// Class-token selector.
    #[must_use]
    pub fn class(class: impl Into<String>) -> Self {
        Self::Class(class.into())
    }

    /// Class-substring selector.
    #[must_use]
    pub fn class_contains(fragment: impl Into<String>) -> Self {
        Self::ClassContains(fragment.into())
    }

    /// `[name="value"]` selector.
    #[must_use]
    pub fn attr_eq(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Attr {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    /// `[name]` selector.
    #[must_use]
    pub fn has_attr(name: impl Into<String>) -> Self {
        Self::Attr {
            name: name.into(),
            value: None,
        }
    }

    /// Compound selector.
    #[must_use]
    pub fn all(parts: impl IntoIterator<Item = Selector>) -> Self {
        Self::All(parts.into_iter().collect())
    }

    /// Evaluate against an element described by its tag and an attribute
    /// lookup.
    pub fn matches_with<'a, F>(&self, tag: &str, attr: F) -> bool
    where
        F: Fn(&str) -> Option<&'a str> + Copy,
    {
        match self {
            Self::Tag(t) => t.eq_ignore_ascii_case(tag),
            Self::Id(id) => attr("id") == Some(id.as_str()),
            Self::Class(class) => attr("class")
                .is_some_and(|list| list.split_ascii_whitespace().any(|token| token == class)),
            Self::ClassContains(fragment) => {
                attr("class").is_some_and(|list| list.contains(fragment.as_str()))
            }
            Self::Attr { name, value } => match (attr(name), value) {
                (Some(_), None) => true,
                (Some(actual), Some(expected)) => actual == expected,
                (None, _) => false,
            },
            Self::All(parts) => parts.iter().all(|part| part.matches_with(tag, attr)),
        }
    }

    /// Render as a CSS selector string.
    #[must_use]
    pub fn to_css(&self) -> String {
        let mut tags = String::new();
        let mut rest = String::new();
        self.write_css(&mut tags, &mut rest);
        if tags.is_empty() && rest.is_empty() {
            return "*".to_string();
        }
        tags.push_str(&rest);
        tags
    }

    fn write_css(&self, tags: &mut String, rest: &mut String) {
        match self {
            Self::Tag(t) => tags.push_str(t),
            Self::Id(id) => push_attr(rest, "id", "=", id),
            Self::Class(class) => push_attr(rest, "class", "~=", class),
            Self::ClassContains(fragment) => push_attr(rest, "class", "*=", fragment),
            Self::Attr { name, value: None } => {
                rest.push('[');
                rest.push_str(name);
                rest.push(']');
            }
            Self::Attr {
                name,
                value: Some(value),
            } => push_attr(rest, name, "=", value),
            Self::All(parts) => {
                for part in parts {
                    part.write_css(tags, rest);
                }
            }
        }
    }
}

fn push_attr(out: &mut String, name: &str, op: &str, value: &str) {
    out.push('[');
    out.push_str(name);
    out.push_str(op);
    out.push('"');
    for ch in value.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push_str("\"]");
}
