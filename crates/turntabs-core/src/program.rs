#![forbid(unsafe_code)]

//! Host-driven runner for the tab engine.
//!
//! [`TabProgram`] owns a tree and a [`Reconciler`] and does nothing on its
//! own. The host controls every step:
//!
//! 1. Call [`TabProgram::start`] once the page is ready.
//! 2. Push change batches via [`TabProgram::on_mutations`].
//! 3. Advance time via [`TabProgram::advance`]; a pass runs when the
//!    debounce deadline has passed.
//! 4. Forward clicks via [`TabProgram::click`].
//!
//! Time is a plain monotonic [`Duration`], so runs are deterministic.
//!
//! # Example
//!
//! ```
//! use core::time::Duration;
//! use turntabs_core::{EngineConfig, TabProgram};
//! use turntabs_tree::mem::MemTree;
//!
//! let mut tree = MemTree::new();
//! let body = tree.body();
//! let main = tree.element(body, "main", &[]);
//! let list = tree.element(main, "div", &[]);
//! let turn = tree.element(list, "article", &[]);
//! let msg = tree.element(turn, "div", &[("data-message-author-role", "user")]);
//! tree.text(msg, "hello");
//!
//! let observer = tree.observer();
//! let mut prog = TabProgram::new(tree, observer, EngineConfig::default());
//! assert!(prog.start().rendered());
//!
//! let records = prog.tree_mut().take_mutations();
//! prog.on_mutations(&records, Duration::ZERO);
//! assert_eq!(prog.advance(Duration::from_millis(300)), None);
//! ```

use core::time::Duration;

use tracing::trace;
use turntabs_tree::{HostTree, MutationRecord};

use crate::config::EngineConfig;
use crate::gate::{ChangeSubscription, GateSignal};
use crate::reconcile::{PassOutcome, Reconciler};
use crate::session::SessionState;

/// Deterministic runner over an owned tree.
pub struct TabProgram<T: HostTree, S> {
    tree: T,
    reconciler: Reconciler<T::Node, S>,
    now: Duration,
    started: bool,
    passes: u64,
}

impl<T: HostTree, S: ChangeSubscription> TabProgram<T, S> {
    /// Create a program. No pass runs until [`start`](Self::start).
    #[must_use]
    pub fn new(tree: T, subscription: S, config: EngineConfig) -> Self {
        Self {
            tree,
            reconciler: Reconciler::new(config, subscription),
            now: Duration::ZERO,
            started: false,
            passes: 0,
        }
    }

    /// Run the initial pass. The change subscription is attached afterwards.
    pub fn start(&mut self) -> PassOutcome {
        self.started = true;
        self.run_now()
    }

    /// Run a pass immediately, ignoring the debounce window.
    pub fn run_now(&mut self) -> PassOutcome {
        self.passes += 1;
        self.reconciler.run(&mut self.tree)
    }

    /// Feed a batch of change records observed at `now`.
    pub fn on_mutations(&mut self, records: &[MutationRecord<T::Node>], now: Duration) -> GateSignal {
        self.now = self.now.max(now);
        if !self.started {
            return GateSignal::Suppressed;
        }
        self.reconciler.observe(&self.tree, records, now)
    }

    /// Move the clock to `now` and run a pass if the debounce deadline has
    /// passed.
    pub fn advance(&mut self, now: Duration) -> Option<PassOutcome> {
        self.now = self.now.max(now);
        if !self.reconciler.gate_mut().poll(self.now) {
            return None;
        }
        trace!(now = ?self.now, "debounce window elapsed");
        Some(self.run_now())
    }

    /// Move the clock forward by `dt`. See [`advance`](Self::advance).
    pub fn advance_by(&mut self, dt: Duration) -> Option<PassOutcome> {
        self.advance(self.now.saturating_add(dt))
    }

    /// Run the pending pass now, if any.
    pub fn flush_pending(&mut self) -> Option<PassOutcome> {
        if !self.reconciler.gate_mut().take_pending() {
            return None;
        }
        Some(self.run_now())
    }

    /// Forward a click on `target`.
    pub fn click(&mut self, target: &T::Node) -> Option<PassOutcome> {
        let outcome = self.reconciler.handle_click(&mut self.tree, target)?;
        self.passes += 1;
        Some(outcome)
    }

    /// Turn tab mode off.
    pub fn disable(&mut self) -> PassOutcome {
        self.reconciler.disable(&mut self.tree)
    }

    /// Leave the page as it was found: turn tab mode off, then stop
    /// listening for changes. No pass runs afterwards.
    pub fn shutdown(&mut self) -> PassOutcome {
        let outcome = self.reconciler.disable(&mut self.tree);
        self.reconciler.gate_mut().detach();
        self.started = false;
        outcome
    }

    /// Current clock.
    #[must_use]
    pub const fn now(&self) -> Duration {
        self.now
    }

    /// Whether [`start`](Self::start) was called.
    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.started
    }

    /// Passes run so far.
    #[must_use]
    pub const fn passes(&self) -> u64 {
        self.passes
    }

    /// Debounce deadline of the pending pass.
    #[must_use]
    pub fn pending_deadline(&self) -> Option<Duration> {
        self.reconciler.gate().deadline()
    }

    #[must_use]
    pub const fn tree(&self) -> &T {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut T {
        &mut self.tree
    }

    #[must_use]
    pub const fn reconciler(&self) -> &Reconciler<T::Node, S> {
        &self.reconciler
    }

    pub fn reconciler_mut(&mut self) -> &mut Reconciler<T::Node, S> {
        &mut self.reconciler
    }

    #[must_use]
    pub fn session(&self) -> &SessionState<T::Node> {
        self.reconciler.session()
    }

    /// Consume the program and return the tree.
    pub fn into_tree(self) -> T {
        self.tree
    }
}
