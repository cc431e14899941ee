#![forbid(unsafe_code)]

//! Change records delivered by a host tree's notification stream.

/// Kind of change carried by a [`MutationRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    /// Children were added to or removed from the target.
    ChildList,
    /// An attribute of the target changed.
    Attributes,
    /// Text content of a text node changed.
    CharacterData,
}

impl MutationKind {
    /// Parse the DOM `MutationRecord.type` string.
    #[must_use]
    pub fn from_dom(kind: &str) -> Option<Self> {
        match kind {
            "childList" => Some(Self::ChildList),
            "attributes" => Some(Self::Attributes),
            "characterData" => Some(Self::CharacterData),
            _ => None,
        }
    }

    /// DOM name of this kind.
    #[must_use]
    pub const fn as_dom(self) -> &'static str {
        match self {
            Self::ChildList => "childList",
            Self::Attributes => "attributes",
            Self::CharacterData => "characterData",
        }
    }
}

/// One change reported by the host tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord<N> {
    /// What changed.
    pub kind: MutationKind,
    /// Node the change applies to.
    pub target: N,
    /// Changed attribute name (attribute changes only).
    pub attribute_name: Option<String>,
}

impl<N> MutationRecord<N> {
    /// A child-list change on `target`.
    #[must_use]
    pub fn child_list(target: N) -> Self {
        Self {
            kind: MutationKind::ChildList,
            target,
            attribute_name: None,
        }
    }

    /// An attribute change on `target`.
    #[must_use]
    pub fn attribute(target: N, name: impl Into<String>) -> Self {
        Self {
            kind: MutationKind::Attributes,
            target,
            attribute_name: Some(name.into()),
        }
    }

    /// A text change on `target`.
    #[must_use]
    pub fn character_data(target: N) -> Self {
        Self {
            kind: MutationKind::CharacterData,
            target,
            attribute_name: None,
        }
    }

    /// Whether this is an attribute change of `name`.
    #[must_use]
    pub fn is_attribute(&self, name: &str) -> bool {
        self.kind == MutationKind::Attributes && self.attribute_name.as_deref() == Some(name)
    }
}
