#![forbid(unsafe_code)]

//! Diagnostics tests: failure boundaries emit structured events tagged with
//! the failing operation.

mod support;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use support::{Page, config};
use turntabs_core::gate::NullSubscription;
use turntabs_core::{PassOutcome, Reconciler};
use turntabs_tree::mem::{NodeId, WriteOp};

use tracing_subscriber::layer::SubscriberExt;

// ============================================================================
// Test Infrastructure
// ============================================================================

/// A captured event with its level and fields.
#[derive(Debug, Clone)]
struct CapturedEvent {
    level: tracing::Level,
    fields: HashMap<String, String>,
}

/// A tracing Layer that records every event.
struct EventCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl EventCapture {
    fn new() -> (Self, Arc<Mutex<Vec<CapturedEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                events: events.clone(),
            },
            events,
        )
    }
}

/// Visitor that extracts event fields.
struct FieldVisitor(Vec<(String, String)>);

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0
            .push((field.name().to_string(), format!("{value:?}")));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.push((field.name().to_string(), value.to_string()));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.push((field.name().to_string(), value.to_string()));
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for EventCapture {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut visitor = FieldVisitor(Vec::new());
        event.record(&mut visitor);
        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            fields: visitor.0.into_iter().collect(),
        });
    }
}

fn capture<R>(f: impl FnOnce() -> R) -> (R, Vec<CapturedEvent>) {
    let (layer, events) = EventCapture::new();
    let subscriber = tracing_subscriber::registry().with(layer);
    let result = tracing::subscriber::with_default(subscriber, f);
    let events = events.lock().unwrap().clone();
    (result, events)
}

fn errors(events: &[CapturedEvent]) -> Vec<&CapturedEvent> {
    events
        .iter()
        .filter(|e| e.level == tracing::Level::ERROR)
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn failed_pass_logs_the_failing_op() {
    let mut page = Page::new(&["A", "B"]);
    page.tree.inject_fault(WriteOp::CreateElement, 0);
    let mut engine: Reconciler<NodeId, _> = Reconciler::new(config(), NullSubscription);

    let (outcome, events) = capture(|| engine.run(&mut page.tree));
    assert!(matches!(outcome, PassOutcome::Recovered { .. }));

    let errors = errors(&events);
    assert_eq!(errors.len(), 1, "events: {events:?}");
    assert_eq!(errors[0].fields.get("op").map(String::as_str), Some("build_surface"));
    assert!(
        errors[0]
            .fields
            .get("error")
            .is_some_and(|e| e.contains("create_element"))
    );
}

#[test]
fn panic_is_logged_under_reconcile() {
    let mut page = Page::new(&["A", "B"]);
    page.tree.inject_panic(WriteOp::InsertBefore, 0);
    let mut engine: Reconciler<NodeId, _> = Reconciler::new(config(), NullSubscription);

    let (_, events) = capture(|| engine.run(&mut page.tree));
    let errors = errors(&events);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].fields.get("op").map(String::as_str), Some("reconcile"));
    assert!(errors[0].fields["error"].contains("injected panic in insert_before"));
}

#[test]
fn successful_pass_logs_no_errors() {
    let mut page = Page::new(&["A", "B", "C"]);
    let mut engine: Reconciler<NodeId, _> = Reconciler::new(config(), NullSubscription);

    let (outcome, events) = capture(|| engine.run(&mut page.tree));
    assert!(outcome.rendered());
    assert!(errors(&events).is_empty());
    let rendered = events
        .iter()
        .find(|e| e.fields.get("message").is_some_and(|m| m == "tabs rendered"))
        .expect("render event");
    assert_eq!(rendered.fields.get("turns").map(String::as_str), Some("3"));
    assert_eq!(rendered.fields.get("active").map(String::as_str), Some("2"));
}
