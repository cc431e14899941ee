#![forbid(unsafe_code)]

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::OnceLock;

use core::time::Duration;

use tracing::{debug, info, warn};
use tracing_subscriber::prelude::*;
use turntabs_core::bootstrap::{BootstrapWait, WaitError, WaitStep};
use turntabs_core::gate::GateSignal;
use turntabs_core::{PassOutcome, TabProgram};
use turntabs_tree::HostTree;
use wasm_bindgen::prelude::*;
use web_sys::{Document, Event, MutationObserver, Node, Window};
use web_time::Instant;

use crate::dom::{WebSubscription, WebTree, convert_record};
use crate::logging::{ConsoleSink, LOG_PREFIX, LineLayer, LogLevel};
use crate::options::WebOptions;
use crate::style::{STYLE_ELEMENT_ID, stylesheet};

type Program = TabProgram<WebTree, WebSubscription>;

/// Class the panic hook strips from the page before the module dies.
static REVEAL_CLASS: OnceLock<String> = OnceLock::new();

fn install_panic_hook(hidden_class: &str) {
    static HOOK: OnceLock<()> = OnceLock::new();
    let _ = REVEAL_CLASS.set(hidden_class.to_string());
    HOOK.get_or_init(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let message = format!("{LOG_PREFIX} panic: {info}");
            web_sys::console::error_1(&JsValue::from_str(&message));
            reveal_everything();
            previous(info);
        }));
    });
}

/// Strip the hidden class from every node. Runs inside the panic hook, so it
/// ignores every error.
fn reveal_everything() {
    let Some(class) = REVEAL_CLASS.get() else {
        return;
    };
    let Some(document) = web_sys::window().and_then(|w| w.document()) else {
        return;
    };
    let Ok(nodes) = document.query_selector_all(&format!(".{class}")) else {
        return;
    };
    for i in 0..nodes.length() {
        if let Some(el) = nodes.item(i).and_then(|n| n.dyn_into::<web_sys::Element>().ok()) {
            let _ = el.class_list().remove_1(class);
        }
    }
}

fn install_logging(level: LogLevel) {
    static LOGGING: OnceLock<()> = OnceLock::new();
    LOGGING.get_or_init(|| {
        let layer = LineLayer::new(ConsoleSink).with_filter(level.filter());
        let _ = tracing::subscriber::set_global_default(tracing_subscriber::registry().with(layer));
    });
}

/// Add the stylesheet to `<head>` unless a previous instance did.
fn inject_styles(document: &Document, css: &str) -> Result<(), JsValue> {
    if document.get_element_by_id(STYLE_ELEMENT_ID).is_some() {
        return Ok(());
    }
    let Some(head) = document.head() else {
        warn!(op = "inject_styles", "document has no head");
        return Ok(());
    };
    let style = document.create_element("style")?;
    style.set_id(STYLE_ELEMENT_ID);
    style.set_text_content(Some(css));
    head.append_child(&style)?;
    Ok(())
}

fn js_error(err: impl core::fmt::Display) -> JsValue {
    JsValue::from_str(&format!("{LOG_PREFIX} {err}"))
}

async fn sleep(window: &Window, delay: Duration) -> Result<(), JsValue> {
    let millis = i32::try_from(delay.as_millis()).unwrap_or(i32::MAX);
    let promise = js_sys::Promise::new(&mut |resolve, _reject| {
        let _ = window.set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, millis);
    });
    wasm_bindgen_futures::JsFuture::from(promise).await.map(|_| ())
}

/// JS callbacks kept alive for the lifetime of the engine.
struct Callbacks {
    observer: Closure<dyn FnMut(js_sys::Array, MutationObserver)>,
    flush: Closure<dyn FnMut()>,
    click: Closure<dyn FnMut(Event)>,
}

struct State {
    window: Window,
    document: Document,
    epoch: Instant,
    program: Option<Program>,
    callbacks: Option<Callbacks>,
    timer: Option<i32>,
    destroyed: bool,
}

impl State {
    fn on_records(&mut self, records: &js_sys::Array) {
        let Some(program) = self.program.as_mut() else {
            return;
        };
        let batch: Vec<_> = records
            .iter()
            .filter_map(|value| value.dyn_into::<web_sys::MutationRecord>().ok())
            .filter_map(|record| convert_record(&record))
            .collect();
        let now = self.epoch.elapsed();
        let signal = program.on_mutations(&batch, now);
        let window = program.reconciler().gate().window();
        if let GateSignal::Scheduled { .. } = signal {
            self.schedule_flush(window);
        }
    }

    /// Re-arm the single debounce timer.
    fn schedule_flush(&mut self, delay: Duration) {
        let Some(callbacks) = &self.callbacks else {
            return;
        };
        if let Some(id) = self.timer.take() {
            self.window.clear_timeout_with_handle(id);
        }
        let millis = i32::try_from(delay.as_millis()).unwrap_or(i32::MAX);
        match self
            .window
            .set_timeout_with_callback_and_timeout_and_arguments_0(
                callbacks.flush.as_ref().unchecked_ref(),
                millis,
            ) {
            Ok(id) => self.timer = Some(id),
            Err(err) => warn!(op = "schedule_flush", error = ?err, "debounce timer not armed"),
        }
    }

    fn on_flush(&mut self) {
        self.timer = None;
        if let Some(program) = self.program.as_mut()
            && let Some(outcome) = program.flush_pending()
        {
            debug!(?outcome, "debounced pass");
        }
    }

    fn on_click(&mut self, event: &Event) {
        let Some(program) = self.program.as_mut() else {
            return;
        };
        let Some(target) = event.target().and_then(|t| t.dyn_into::<Node>().ok()) else {
            return;
        };
        if let Some(outcome) = program.click(&target) {
            debug!(?outcome, "surface click");
        }
    }

    fn teardown(&mut self) {
        self.destroyed = true;
        if let Some(id) = self.timer.take() {
            self.window.clear_timeout_with_handle(id);
        }
        if let Some(program) = self.program.as_mut() {
            let outcome = program.shutdown();
            debug!(?outcome, "turntabs detached");
        }
        if let Some(callbacks) = self.callbacks.take() {
            let _ = self
                .document
                .remove_event_listener_with_callback("click", callbacks.click.as_ref().unchecked_ref());
        }
        self.program = None;
    }
}

fn callbacks(weak: &Weak<RefCell<State>>) -> Callbacks {
    let on_records = weak.clone();
    let observer = Closure::<dyn FnMut(js_sys::Array, MutationObserver)>::new(
        move |records: js_sys::Array, _observer: MutationObserver| {
            if let Some(state) = on_records.upgrade()
                && let Ok(mut state) = state.try_borrow_mut()
            {
                state.on_records(&records);
            }
        },
    );

    let on_flush = weak.clone();
    let flush = Closure::<dyn FnMut()>::new(move || {
        if let Some(state) = on_flush.upgrade()
            && let Ok(mut state) = state.try_borrow_mut()
        {
            state.on_flush();
        }
    });

    let on_click = weak.clone();
    let click = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
        if let Some(state) = on_click.upgrade()
            && let Ok(mut state) = state.try_borrow_mut()
        {
            state.on_click(&event);
        }
    });

    Callbacks {
        observer,
        flush,
        click,
    }
}

/// Tabbed view over the chat transcript of the current page.
#[wasm_bindgen]
pub struct TurnTabsWeb {
    options: WebOptions,
    state: Rc<RefCell<State>>,
}

#[wasm_bindgen]
impl TurnTabsWeb {
    /// Create an engine from a JSON options string (`JSON.stringify` of the
    /// options object). Nothing touches the page until [`init`](Self::init).
    #[wasm_bindgen(constructor)]
    pub fn new(options: Option<String>) -> Result<TurnTabsWeb, JsValue> {
        let options = WebOptions::from_json(options.as_deref().unwrap_or_default())
            .map_err(js_error)?;
        install_logging(options.log_level);
        install_panic_hook(&options.engine.hidden_class);

        let window = web_sys::window().ok_or_else(|| js_error("no window"))?;
        let document = window.document().ok_or_else(|| js_error("no document"))?;
        let state = State {
            window,
            document,
            epoch: Instant::now(),
            program: None,
            callbacks: None,
            timer: None,
            destroyed: false,
        };
        Ok(Self {
            options,
            state: Rc::new(RefCell::new(state)),
        })
    }

    /// Wait for the page, install the observer and click handler, and run
    /// the first pass.
    pub async fn init(&self) -> Result<(), JsValue> {
        let (window, document) = {
            let state = self.state.borrow();
            (state.window.clone(), state.document.clone())
        };
        let tree = WebTree::new(document.clone());

        let engine = &self.options.engine;
        let mut wait = BootstrapWait::new(engine.bootstrap.clone(), engine.injection_target.clone());
        loop {
            if self.state.borrow().destroyed {
                wait.cancel();
            }
            match wait.poll(&tree) {
                Ok(WaitStep::Ready) => break,
                Ok(WaitStep::RetryAfter(delay)) => sleep(&window, delay).await?,
                Err(err @ WaitError::NotReady { .. }) => {
                    warn!(op = "bootstrap", error = %err, "giving up");
                    return Err(js_error(err));
                }
                Err(err @ WaitError::Cancelled) => return Err(js_error(err)),
            }
        }

        if self.options.inject_styles {
            inject_styles(&document, &stylesheet(engine))?;
        }
        let root = tree.root().ok_or_else(|| js_error("document has no body"))?;
        let callbacks = callbacks(&Rc::downgrade(&self.state));
        let observer = MutationObserver::new(callbacks.observer.as_ref().unchecked_ref())?;
        document.add_event_listener_with_callback("click", callbacks.click.as_ref().unchecked_ref())?;

        let mut program = TabProgram::new(tree, WebSubscription::new(observer, root), engine.clone());
        let outcome = program.start();
        info!(?outcome, "turntabs started");

        let mut state = self.state.borrow_mut();
        state.program = Some(program);
        state.callbacks = Some(callbacks);
        Ok(())
    }

    /// Run a pass now. Returns whether tabs were rendered.
    pub fn refresh(&self) -> bool {
        let Ok(mut state) = self.state.try_borrow_mut() else {
            return false;
        };
        state
            .program
            .as_mut()
            .is_some_and(|program| program.run_now().rendered())
    }

    /// Turn tab mode off: hide the tabs and show every turn.
    pub fn disable(&self) {
        if let Ok(mut state) = self.state.try_borrow_mut()
            && let Some(program) = state.program.as_mut()
        {
            let outcome = program.disable();
            if outcome != PassOutcome::Disabled {
                warn!(?outcome, "disable did not complete cleanly");
            }
        }
    }

    /// Detach from the page, showing every turn and hiding the tabs. Also
    /// cancels a pending [`init`](Self::init).
    pub fn destroy(&self) {
        if let Ok(mut state) = self.state.try_borrow_mut() {
            state.teardown();
        }
    }
}
