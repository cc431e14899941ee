#![forbid(unsafe_code)]

//! Session state owned by one [`Reconciler`](crate::Reconciler).

/// Phase of a reconciliation pass.
///
/// Only [`Idle`](PassPhase::Idle) is observable between passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PassPhase {
    #[default]
    Idle,
    Guarding,
    Validating,
    Extracting,
    Rendering,
    Failed,
    Recovering,
}

/// Whether the tabbed view is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TabMode {
    #[default]
    Enabled,
    /// Turned off by the user; permanent for the session.
    Disabled,
}

/// Engine-owned navigation surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavSurface<N> {
    /// Injected container.
    pub container: N,
    /// Row holding the tab buttons.
    pub tab_row: N,
}

/// Mutable state carried across passes.
#[derive(Debug, Clone)]
pub struct SessionState<N> {
    pub(crate) active_index: usize,
    pub(crate) explicit_selection_pending: bool,
    pub(crate) reconciling: bool,
    pub(crate) last_fingerprint: String,
    pub(crate) surface: Option<NavSurface<N>>,
    pub(crate) surface_visible: bool,
    pub(crate) phase: PassPhase,
}

impl<N> Default for SessionState<N> {
    fn default() -> Self {
        Self {
            active_index: 0,
            explicit_selection_pending: false,
            reconciling: false,
            last_fingerprint: String::new(),
            surface: None,
            surface_visible: false,
            phase: PassPhase::Idle,
        }
    }
}

impl<N> SessionState<N> {
    /// Currently selected turn.
    #[must_use]
    pub const fn active_index(&self) -> usize {
        self.active_index
    }

    /// Whether a tab click is waiting to be applied.
    #[must_use]
    pub const fn explicit_selection_pending(&self) -> bool {
        self.explicit_selection_pending
    }

    /// Whether a pass is in progress.
    #[must_use]
    pub const fn is_reconciling(&self) -> bool {
        self.reconciling
    }

    /// Fingerprint of the last rendered turn sequence.
    #[must_use]
    pub fn last_fingerprint(&self) -> &str {
        &self.last_fingerprint
    }

    /// The navigation surface, if built.
    #[must_use]
    pub const fn surface(&self) -> Option<&NavSurface<N>> {
        self.surface.as_ref()
    }

    /// Whether the engine last showed the surface.
    #[must_use]
    pub const fn surface_visible(&self) -> bool {
        self.surface_visible
    }

    /// Current pass phase.
    #[must_use]
    pub const fn phase(&self) -> PassPhase {
        self.phase
    }

    /// Record a tab click for the next pass.
    pub fn request_selection(&mut self, index: usize) {
        self.active_index = index;
        self.explicit_selection_pending = true;
    }

    /// Whether a pass over `fingerprint` has to render.
    #[must_use]
    pub fn needs_render(&self, fingerprint: &str) -> bool {
        self.explicit_selection_pending || self.last_fingerprint != fingerprint
    }

    /// Resolve and store the active index for `turn_count` turns, consuming
    /// any pending explicit selection.
    ///
    /// `turn_count` must be non-zero.
    pub fn resolve_active(&mut self, turn_count: usize) -> usize {
        let last = turn_count.saturating_sub(1);
        let index = if self.explicit_selection_pending && self.active_index < turn_count {
            self.active_index
        } else {
            last
        };
        self.explicit_selection_pending = false;
        self.active_index = index;
        index
    }

    /// Forget the last rendered fingerprint so the next pass renders.
    pub fn invalidate(&mut self) {
        self.last_fingerprint.clear();
    }
}
