#![forbid(unsafe_code)]

//! Engine errors.
//!
//! Every error carries the name of the operation that failed so diagnostics
//! can be tagged with it (`op` field on the emitted tracing event).

use core::fmt;

use turntabs_tree::TreeError;

/// Failure inside a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A tree write failed.
    Tree {
        /// Engine operation that issued the write.
        op: &'static str,
        /// Underlying tree error.
        source: TreeError,
    },
    /// The navigation surface lost its tab row.
    MissingTabRow,
    /// The pass panicked; carries the panic message.
    Panicked(String),
}

impl EngineError {
    /// Name of the failing operation.
    #[must_use]
    pub fn op(&self) -> &'static str {
        match self {
            Self::Tree { op, .. } => op,
            Self::MissingTabRow => "render_tabs",
            Self::Panicked(_) => "reconcile",
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tree { op, source } => write!(f, "{op}: {source}"),
            Self::MissingTabRow => write!(f, "navigation surface has no tab row"),
            Self::Panicked(msg) => write!(f, "panic during reconcile: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Tree { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Attach an operation name to tree results.
pub(crate) trait TreeResultExt<T> {
    fn during(self, op: &'static str) -> Result<T, EngineError>;
}

impl<T> TreeResultExt<T> for Result<T, TreeError> {
    fn during(self, op: &'static str) -> Result<T, EngineError> {
        self.map_err(|source| EngineError::Tree { op, source })
    }
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
