#![forbid(unsafe_code)]

//! Reconciliation: bring the navigation surface and the hidden-state
//! annotations in line with the transcript currently in the tree.
//!
//! # Design
//!
//! A pass is a straight line of early exits. Structural mismatches (no
//! conversation, unknown markup, nowhere to inject) stop the pass without
//! touching visibility; the next mutation batch retries. Anything that goes
//! wrong while writing (a tree error or a panic) ends in an emergency unhide,
//! so a failed pass never leaves turns hidden.
//!
//! # Invariants
//!
//! - At most one pass runs at a time. A nested [`Reconciler::run`] returns
//!   [`PassOutcome::Reentrant`] without side effects.
//! - The change subscription is detached for the whole pass and reattached
//!   afterwards, on every exit path.
//! - An unchanged transcript with no pending selection produces zero writes.
//! - The engine touches only the hidden class of host nodes. Everything else
//!   it writes lives inside the navigation surface.

use std::panic::{AssertUnwindSafe, catch_unwind};

use core::time::Duration;

use tracing::{debug, debug_span, error, info, warn};
use turntabs_tree::{HostTree, MutationRecord, Selector};

use crate::config::EngineConfig;
use crate::error::{EngineError, TreeResultExt, panic_message};
use crate::extract::{Turn, extract, locate_sample, resolve_turn_list};
use crate::gate::{ChangeSubscription, GateSignal, MutationGate, NoiseFilter};
use crate::nav::{self, NavAction};
use crate::session::{NavSurface, PassPhase, SessionState, TabMode};

/// How a pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Another pass was in progress; nothing happened.
    Reentrant,
    /// Tab mode is off.
    Disabled,
    /// No user message anywhere in the tree.
    NoConversation,
    /// A user message exists but its turn list could not be resolved.
    UnknownShape,
    /// The surface could not be placed.
    NoInjectionPoint,
    /// The turn list holds no user message.
    NoTurns { revealed: usize },
    /// Same turns as last time and no pending selection.
    Unchanged { turns: usize },
    /// Tabs rebuilt and visibility applied.
    Rendered {
        turns: usize,
        active: usize,
        hidden: usize,
    },
    /// The pass failed; every hidden node was revealed.
    Recovered { revealed: usize },
}

impl PassOutcome {
    /// Whether the pass wrote tabs.
    #[must_use]
    pub const fn rendered(&self) -> bool {
        matches!(self, Self::Rendered { .. })
    }
}

/// Reconciliation engine bound to one change subscription.
#[derive(Debug)]
pub struct Reconciler<N, S> {
    config: EngineConfig,
    session: SessionState<N>,
    mode: TabMode,
    gate: MutationGate<S>,
}

impl<N, S> Reconciler<N, S>
where
    N: Clone + PartialEq + core::fmt::Debug,
    S: ChangeSubscription,
{
    /// Create an enabled engine. The subscription stays detached until the
    /// first pass completes.
    #[must_use]
    pub fn new(config: EngineConfig, subscription: S) -> Self {
        let gate = MutationGate::new(subscription, config.observe_options(), config.debounce());
        Self {
            config,
            session: SessionState::default(),
            mode: TabMode::Enabled,
            gate,
        }
    }

    /// Run one reconciliation pass.
    pub fn run<T: HostTree<Node = N>>(&mut self, tree: &mut T) -> PassOutcome {
        if self.session.reconciling {
            debug!("pass already in progress, skipping");
            return PassOutcome::Reentrant;
        }
        let _span = debug_span!("reconcile").entered();
        self.session.reconciling = true;
        self.session.phase = PassPhase::Guarding;
        self.gate.detach();

        let result = catch_unwind(AssertUnwindSafe(|| self.pass(tree)))
            .unwrap_or_else(|payload| Err(EngineError::Panicked(panic_message(payload))));
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => self.recover(tree, &err),
        };

        self.session.reconciling = false;
        self.session.phase = PassPhase::Idle;
        self.gate.attach();
        outcome
    }

    /// Activate the turn at `index` and run a pass.
    pub fn select_tab<T: HostTree<Node = N>>(&mut self, tree: &mut T, index: usize) -> PassOutcome {
        if self.session.reconciling {
            return PassOutcome::Reentrant;
        }
        self.session.request_selection(index);
        self.run(tree)
    }

    /// Turn tab mode off for the rest of the session: hide the surface and
    /// reveal every turn.
    pub fn disable<T: HostTree<Node = N>>(&mut self, tree: &mut T) -> PassOutcome {
        if self.session.reconciling {
            return PassOutcome::Reentrant;
        }
        self.mode = TabMode::Disabled;
        self.session.reconciling = true;
        self.gate.detach();

        let hidden_class = self.config.hidden_class.clone();
        let result = catch_unwind(AssertUnwindSafe(|| {
            self.hide_surface(tree)?;
            reveal_all(tree, &hidden_class)
        }))
        .unwrap_or_else(|payload| Err(EngineError::Panicked(panic_message(payload))));
        let outcome = match result {
            Ok(revealed) => {
                info!(revealed, "tab mode disabled");
                self.session.invalidate();
                PassOutcome::Disabled
            }
            Err(err) => self.recover(tree, &err),
        };

        self.session.reconciling = false;
        self.session.phase = PassPhase::Idle;
        self.gate.attach();
        outcome
    }

    /// Dispatch a click. Returns `None` when `target` is not a surface
    /// control.
    pub fn handle_click<T: HostTree<Node = N>>(
        &mut self,
        tree: &mut T,
        target: &N,
    ) -> Option<PassOutcome> {
        let surface = self.session.surface.clone()?;
        match nav::resolve_action(tree, &surface, target)? {
            NavAction::Select(index) => Some(self.select_tab(tree, index)),
            NavAction::Disable => Some(self.disable(tree)),
        }
    }

    /// Feed a batch of change records observed at `now` to the gate.
    pub fn observe<T: HostTree<Node = N>>(
        &mut self,
        tree: &T,
        records: &[MutationRecord<N>],
        now: Duration,
    ) -> GateSignal {
        let filter = NoiseFilter {
            hidden_class: &self.config.hidden_class,
            surface_id: &self.config.surface_id,
            surface: self.session.surface.as_ref().map(|s| &s.container),
        };
        self.gate.observe(tree, records, &filter, now)
    }

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Session state.
    #[must_use]
    pub const fn session(&self) -> &SessionState<N> {
        &self.session
    }

    /// Whether tab mode is on.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.mode == TabMode::Enabled
    }

    /// The mutation gate.
    #[must_use]
    pub const fn gate(&self) -> &MutationGate<S> {
        &self.gate
    }

    /// The mutation gate, mutably.
    pub fn gate_mut(&mut self) -> &mut MutationGate<S> {
        &mut self.gate
    }

    fn pass<T: HostTree<Node = N>>(&mut self, tree: &mut T) -> Result<PassOutcome, EngineError> {
        self.session.phase = PassPhase::Validating;
        if self.mode == TabMode::Disabled {
            self.hide_surface(tree)?;
            return Ok(PassOutcome::Disabled);
        }

        let Some(sample) = locate_sample(tree, &self.config) else {
            self.hide_surface(tree)?;
            self.session.invalidate();
            debug!("no user message in the tree");
            return Ok(PassOutcome::NoConversation);
        };
        let Some(list) = resolve_turn_list(tree, &sample, &self.config.wrapper_strategies) else {
            debug!("user message found but turn list unresolved");
            return Ok(PassOutcome::UnknownShape);
        };
        let Some(surface) = self.ensure_surface(tree, &list.container)? else {
            warn!(op = "inject_surface", "no injection point for the navigation surface");
            return Ok(PassOutcome::NoInjectionPoint);
        };

        self.session.phase = PassPhase::Extracting;
        let extraction = extract(tree, &list.container, &self.config, Some(&surface.container));
        if extraction.is_empty() {
            let revealed = reveal_all(tree, &self.config.hidden_class)?;
            self.hide_surface(tree)?;
            self.session.invalidate();
            debug!(revealed, "turn list holds no user message");
            return Ok(PassOutcome::NoTurns { revealed });
        }
        if !self.session.surface_visible {
            nav::set_surface_visible(tree, &surface, true)?;
            self.session.surface_visible = true;
        }

        let turns = extraction.len();
        if !self.session.needs_render(&extraction.fingerprint) {
            return Ok(PassOutcome::Unchanged { turns });
        }

        self.session.phase = PassPhase::Rendering;
        let active = self.session.resolve_active(turns);
        self.session.last_fingerprint = extraction.fingerprint;
        nav::render_tabs(tree, &surface, &extraction.turns, active, &self.config)?;
        let hidden = apply_visibility(
            tree,
            &list.container,
            &extraction.turns,
            active,
            &self.config.hidden_class,
        )?;
        debug!(turns, active, hidden, "tabs rendered");
        Ok(PassOutcome::Rendered {
            turns,
            active,
            hidden,
        })
    }

    /// Return the mounted surface, building and mounting a new one if the
    /// old one is gone. `None` when there is no place to put it.
    fn ensure_surface<T: HostTree<Node = N>>(
        &mut self,
        tree: &mut T,
        container: &N,
    ) -> Result<Option<NavSurface<N>>, EngineError> {
        if let Some(surface) = &self.session.surface
            && tree.is_connected(&surface.container)
        {
            return Ok(Some(surface.clone()));
        }
        self.session.surface = None;
        self.session.surface_visible = false;

        let Some(point) = nav::mount_point(tree, container, &self.config) else {
            return Ok(None);
        };
        let surface = nav::build_surface(tree, &self.config)?;
        nav::mount_surface(tree, &surface, &point)?;
        debug!("navigation surface injected");
        self.session.surface = Some(surface.clone());
        self.session.surface_visible = true;
        self.session.invalidate();
        Ok(Some(surface))
    }

    fn hide_surface<T: HostTree<Node = N>>(&mut self, tree: &mut T) -> Result<(), EngineError> {
        if let Some(surface) = &self.session.surface
            && self.session.surface_visible
        {
            if tree.is_connected(&surface.container) {
                nav::set_surface_visible(tree, surface, false)?;
            }
            self.session.surface_visible = false;
        }
        Ok(())
    }

    fn recover<T: HostTree<Node = N>>(&mut self, tree: &mut T, err: &EngineError) -> PassOutcome {
        self.session.phase = PassPhase::Failed;
        error!(op = err.op(), error = %err, "reconcile pass failed, revealing all turns");

        self.session.phase = PassPhase::Recovering;
        let hidden_class = self.config.hidden_class.clone();
        let revealed = catch_unwind(AssertUnwindSafe(|| emergency_unhide(tree, &hidden_class)))
            .unwrap_or_else(|payload| {
                error!(
                    op = "emergency_unhide",
                    panic = %panic_message(payload),
                    "emergency unhide panicked"
                );
                0
            });
        self.session.invalidate();
        PassOutcome::Recovered { revealed }
    }
}

/// Show members of the active turn, hide all others. Only nodes whose
/// annotation is wrong are written. Returns the number of hidden members.
///
/// Annotations on nodes that are not turn members are cleared: container
/// children outside every turn, and anything outside the container.
fn apply_visibility<T: HostTree>(
    tree: &mut T,
    container: &T::Node,
    turns: &[Turn<T::Node>],
    active: usize,
    hidden_class: &str,
) -> Result<usize, EngineError> {
    let mut hidden = 0;
    for turn in turns {
        let selected = turn.index == active;
        for member in &turn.members {
            match (selected, tree.has_class(member, hidden_class)) {
                (true, true) => tree
                    .remove_class(member, hidden_class)
                    .during("show_member")?,
                (false, false) => tree
                    .add_class(member, hidden_class)
                    .during("hide_member")?,
                _ => {}
            }
            if !selected {
                hidden += 1;
            }
        }
    }

    // Members are a tree-order subsequence of the container's children.
    let mut members = turns.iter().flat_map(|turn| turn.members.iter()).peekable();
    for child in tree.children(container) {
        if members.peek() == Some(&&child) {
            members.next();
            continue;
        }
        if tree.has_class(&child, hidden_class) {
            tree.remove_class(&child, hidden_class)
                .during("show_member")?;
        }
    }
    for stale in tree.query_all(None, &Selector::class(hidden_class)) {
        if tree.parent(&stale).as_ref() != Some(container) {
            tree.remove_class(&stale, hidden_class)
                .during("show_member")?;
        }
    }
    Ok(hidden)
}

/// Remove the hidden annotation from every node carrying it.
fn reveal_all<T: HostTree>(tree: &mut T, hidden_class: &str) -> Result<usize, EngineError> {
    let nodes = tree.query_all(None, &Selector::class(hidden_class));
    for node in &nodes {
        tree.remove_class(node, hidden_class)
            .during("reveal_all")?;
    }
    Ok(nodes.len())
}

/// Best-effort [`reveal_all`]: keeps going past individual failures.
fn emergency_unhide<T: HostTree>(tree: &mut T, hidden_class: &str) -> usize {
    let mut revealed = 0;
    for node in tree.query_all(None, &Selector::class(hidden_class)) {
        match tree.remove_class(&node, hidden_class) {
            Ok(()) => revealed += 1,
            Err(err) => warn!(op = "emergency_unhide", error = %err, "node stays hidden"),
        }
    }
    revealed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::NullSubscription;
    use pretty_assertions::assert_eq;
    use turntabs_tree::mem::{MemTree, NodeId};

    fn transcript(titles: &[&str]) -> (MemTree, NodeId) {
        let mut tree = MemTree::new();
        let body = tree.body();
        let main = tree.element(body, "main", &[]);
        let list = tree.element(main, "div", &[]);
        for title in titles {
            let user = tree.element(list, "article", &[]);
            let msg = tree.element(user, "div", &[("data-message-author-role", "user")]);
            tree.text(msg, title);
            tree.element(list, "article", &[]);
        }
        (tree, list)
    }

    fn reconciler() -> Reconciler<NodeId, NullSubscription> {
        Reconciler::new(EngineConfig::default(), NullSubscription)
    }

    #[test]
    fn nested_run_is_a_no_op() {
        let (mut tree, _) = transcript(&["A", "B"]);
        let mut engine = reconciler();
        engine.session.reconciling = true;

        assert_eq!(engine.run(&mut tree), PassOutcome::Reentrant);
        assert_eq!(engine.select_tab(&mut tree, 0), PassOutcome::Reentrant);
        assert_eq!(tree.write_count(), 0);
        assert!(engine.session().surface().is_none());
        assert!(!engine.session().explicit_selection_pending());

        engine.session.reconciling = false;
        assert!(engine.run(&mut tree).rendered());
        assert!(!engine.session().is_reconciling());
        assert_eq!(engine.session().phase(), PassPhase::Idle);
    }

    #[test]
    fn gate_is_reattached_after_every_pass() {
        let mut tree = MemTree::new();
        let mut engine = reconciler();
        assert!(!engine.gate().is_attached());
        assert_eq!(engine.run(&mut tree), PassOutcome::NoConversation);
        assert!(engine.gate().is_attached());
    }

    #[test]
    fn unknown_shape_stops_the_pass() {
        let mut tree = MemTree::new();
        let body = tree.body();
        tree.element(body, "div", &[("data-message-author-role", "user")]);
        let mut config = EngineConfig::default();
        config.wrapper_strategies = vec![crate::extract::WrapperStrategy::Closest(
            Selector::tag("article"),
        )];
        let mut engine: Reconciler<NodeId, _> = Reconciler::new(config, NullSubscription);
        assert_eq!(engine.run(&mut tree), PassOutcome::UnknownShape);
        assert_eq!(tree.write_count(), 0);
    }

    #[test]
    fn stale_annotations_are_cleared() {
        let (mut tree, list) = transcript(&["A", "B"]);
        let body = tree.body();
        let stray = tree.element(body, "aside", &[("class", "turntabs-hidden")]);
        let mut engine = reconciler();
        engine.run(&mut tree);
        assert!(!tree.has_class(&stray, "turntabs-hidden"));
        let first = tree.children(&list)[1];
        assert!(tree.has_class(&first, "turntabs-hidden"));
    }

    #[test]
    fn empty_turn_list_reveals_and_hides_surface() {
        let mut tree = MemTree::new();
        let body = tree.body();
        let main = tree.element(body, "main", &[]);
        let list = tree.element(main, "div", &[]);
        // Only user message sits inside a stale copy of the surface.
        let stale = tree.element(list, "div", &[("id", "turntabs-container")]);
        tree.element(stale, "div", &[("data-message-author-role", "user")]);
        let stray = tree.element(list, "div", &[("class", "turntabs-hidden")]);

        let mut engine = reconciler();
        assert_eq!(engine.run(&mut tree), PassOutcome::NoTurns { revealed: 1 });
        assert!(!tree.has_class(&stray, "turntabs-hidden"));
        let surface = engine.session().surface().unwrap().container;
        assert_eq!(tree.style(surface, "display"), Some("none"));
        assert!(!engine.session().surface_visible());
        assert_eq!(engine.session().last_fingerprint(), "");
    }

    #[test]
    fn annotated_non_members_inside_the_list_are_cleared() {
        let (mut tree, list) = transcript(&["A", "B"]);
        let first = tree.first_child(&list);
        let banner = tree.create_element("div").unwrap();
        tree.insert_before(&list, &banner, first.as_ref()).unwrap();
        tree.add_class(&banner, "turntabs-hidden").unwrap();

        let mut engine = reconciler();
        assert_eq!(
            engine.run(&mut tree),
            PassOutcome::Rendered {
                turns: 2,
                active: 1,
                hidden: 2,
            }
        );
        assert!(!tree.has_class(&banner, "turntabs-hidden"));
        assert_eq!(tree.query_all(None, &Selector::class("turntabs-hidden")).len(), 2);
    }

    #[test]
    fn missing_mount_point_builds_nothing() {
        let mut tree = MemTree::new();
        let body = tree.body();
        let msg = tree.element(body, "div", &[("data-message-author-role", "user")]);
        tree.text(msg, "A");
        let mut config = EngineConfig::default();
        config.wrapper_strategies = vec![crate::extract::WrapperStrategy::Closest(
            Selector::tag("body"),
        )];
        let mut engine: Reconciler<NodeId, _> = Reconciler::new(config, NullSubscription);

        for _ in 0..2 {
            assert_eq!(engine.run(&mut tree), PassOutcome::NoInjectionPoint);
            assert_eq!(tree.write_count(), 0);
        }
        assert!(engine.session().surface().is_none());
    }

    #[test]
    fn nested_disable_changes_nothing() {
        let (mut tree, _) = transcript(&["A", "B"]);
        let mut engine = reconciler();
        engine.run(&mut tree);
        engine.session.reconciling = true;

        assert_eq!(engine.disable(&mut tree), PassOutcome::Reentrant);
        assert!(engine.is_enabled());

        engine.session.reconciling = false;
        assert_eq!(engine.disable(&mut tree), PassOutcome::Disabled);
        assert!(tree.query_all(None, &Selector::class("turntabs-hidden")).is_empty());
    }

    #[test]
    fn disable_reveals_and_sticks() {
        let (mut tree, _) = transcript(&["A", "B", "C"]);
        let mut engine = reconciler();
        engine.run(&mut tree);
        assert_eq!(engine.disable(&mut tree), PassOutcome::Disabled);
        assert!(!engine.is_enabled());
        assert!(tree.query_all(None, &Selector::class("turntabs-hidden")).is_empty());
        let surface = engine.session().surface().unwrap().container;
        assert_eq!(tree.style(surface, "display"), Some("none"));

        tree.reset_write_count();
        assert_eq!(engine.run(&mut tree), PassOutcome::Disabled);
        assert_eq!(tree.write_count(), 0);
    }
}
