#![forbid(unsafe_code)]

//! Mutation gate: noise filtering and debouncing of the host change stream.
//!
//! The engine's own writes show up in the host's change stream. Two layers
//! keep them from re-triggering reconciliation:
//!
//! - the subscription is detached for the duration of every pass, so records
//!   produced by the pass are never delivered;
//! - records that still arrive are filtered by [`is_relevant`]: class changes
//!   on nodes carrying the hidden annotation and anything inside the
//!   navigation surface are noise.
//!
//! Relevant batches arm a single deadline one quiescence window in the
//! future. Further relevant batches push the deadline out ("latest wins");
//! there is never more than one pending callback.
//!
//! # Time
//!
//! The gate does not read a clock. Callers pass a monotonic `now` and either
//! [`poll`](MutationGate::poll) it (deterministic hosts, tests) or consume the
//! pending callback with [`take_pending`](MutationGate::take_pending) when
//! their own timer fired (browser hosts).

use core::time::Duration;

use bitflags::bitflags;
use tracing::{trace, warn};
use turntabs_tree::mem::MemObserver;
use turntabs_tree::{HostTree, MutationRecord, Selector, TreeError};

bitflags! {
    /// What the change subscription observes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ObserveOptions: u8 {
        /// Child additions and removals.
        const CHILD_LIST = 0b0001;
        /// The whole subtree below the root, not only the root.
        const SUBTREE = 0b0010;
        /// Attribute changes.
        const ATTRIBUTES = 0b0100;
        /// Text changes.
        const CHARACTER_DATA = 0b1000;
    }
}

/// A host change stream that can be attached and detached.
pub trait ChangeSubscription {
    /// Start (or resume) delivering change records.
    fn attach(&mut self, options: ObserveOptions) -> Result<(), TreeError>;

    /// Stop delivering change records. Records produced while detached are
    /// dropped.
    fn detach(&mut self);
}

impl ChangeSubscription for MemObserver {
    fn attach(&mut self, _options: ObserveOptions) -> Result<(), TreeError> {
        self.observe();
        Ok(())
    }

    fn detach(&mut self) {
        self.disconnect();
    }
}

/// Subscription that delivers nothing, for hosts without a change stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSubscription;

impl ChangeSubscription for NullSubscription {
    fn attach(&mut self, _options: ObserveOptions) -> Result<(), TreeError> {
        Ok(())
    }

    fn detach(&mut self) {}
}

/// What the filter needs to know about engine-owned state.
#[derive(Debug, Clone, Copy)]
pub struct NoiseFilter<'a, N> {
    /// Reserved hidden-state class.
    pub hidden_class: &'a str,
    /// Id of the navigation surface.
    pub surface_id: &'a str,
    /// Current navigation surface, if one was built.
    pub surface: Option<&'a N>,
}

/// Whether a single record warrants a reconciliation pass.
pub fn is_relevant<T: HostTree>(
    tree: &T,
    record: &MutationRecord<T::Node>,
    filter: &NoiseFilter<'_, T::Node>,
) -> bool {
    if record.is_attribute("class") && tree.has_class(&record.target, filter.hidden_class) {
        return false;
    }
    if let Some(surface) = filter.surface
        && tree.contains(surface, &record.target)
    {
        return false;
    }
    tree.closest(&record.target, &Selector::id(filter.surface_id))
        .is_none()
}

/// Whether at least one record of a batch is relevant.
pub fn batch_is_relevant<T: HostTree>(
    tree: &T,
    records: &[MutationRecord<T::Node>],
    filter: &NoiseFilter<'_, T::Node>,
) -> bool {
    records.iter().any(|record| is_relevant(tree, record, filter))
}

/// Result of feeding a batch to the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateSignal {
    /// Only noise in the batch.
    Ignored,
    /// The gate is detached; the batch was dropped.
    Suppressed,
    /// A callback is pending at `deadline`.
    Scheduled { deadline: Duration },
}

/// Gate counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateStats {
    /// Batches seen.
    pub batches: u64,
    /// Batches that (re)armed the deadline.
    pub relevant: u64,
    /// Batches dropped while detached.
    pub suppressed: u64,
    /// Callbacks delivered.
    pub fired: u64,
}

/// Debouncing adapter over a [`ChangeSubscription`].
#[derive(Debug)]
pub struct MutationGate<S> {
    source: S,
    options: ObserveOptions,
    window: Duration,
    attached: bool,
    deadline: Option<Duration>,
    stats: GateStats,
}

impl<S: ChangeSubscription> MutationGate<S> {
    /// Create a detached gate.
    #[must_use]
    pub fn new(source: S, options: ObserveOptions, window: Duration) -> Self {
        Self {
            source,
            options,
            window,
            attached: false,
            deadline: None,
            stats: GateStats::default(),
        }
    }

    /// Attach the underlying subscription. Failures are logged; the gate
    /// stays detached until the next attempt.
    pub fn attach(&mut self) {
        match self.source.attach(self.options) {
            Ok(()) => self.attached = true,
            Err(err) => {
                self.attached = false;
                warn!(op = "attach_observer", error = %err, "change subscription failed to attach");
            }
        }
    }

    /// Detach the underlying subscription.
    pub fn detach(&mut self) {
        self.source.detach();
        self.attached = false;
    }

    /// Whether batches are currently accepted.
    #[must_use]
    pub const fn is_attached(&self) -> bool {
        self.attached
    }

    /// Feed a batch of records observed at `now`.
    pub fn observe<T: HostTree>(
        &mut self,
        tree: &T,
        records: &[MutationRecord<T::Node>],
        filter: &NoiseFilter<'_, T::Node>,
        now: Duration,
    ) -> GateSignal {
        self.stats.batches += 1;
        if !self.attached {
            self.stats.suppressed += 1;
            return GateSignal::Suppressed;
        }
        if !batch_is_relevant(tree, records, filter) {
            trace!(records = records.len(), "mutation batch ignored");
            return GateSignal::Ignored;
        }
        let deadline = now.saturating_add(self.window);
        self.deadline = Some(deadline);
        self.stats.relevant += 1;
        trace!(records = records.len(), ?deadline, "reconcile scheduled");
        GateSignal::Scheduled { deadline }
    }

    /// Deliver the pending callback if its deadline has passed.
    pub fn poll(&mut self, now: Duration) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                self.stats.fired += 1;
                true
            }
            _ => false,
        }
    }

    /// Deliver the pending callback regardless of time.
    pub fn take_pending(&mut self) -> bool {
        if self.deadline.take().is_some() {
            self.stats.fired += 1;
            true
        } else {
            false
        }
    }

    /// Deadline of the pending callback.
    #[must_use]
    pub const fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Quiescence window.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Counters.
    #[must_use]
    pub const fn stats(&self) -> GateStats {
        self.stats
    }

    /// Underlying subscription.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Underlying subscription, mutably.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}
