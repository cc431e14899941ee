#![forbid(unsafe_code)]

//! Tracing layer that formats events as single lines for a log sink.
//!
//! In the browser the sink is the devtools console ([`ConsoleSink`] on
//! `wasm32`), with the level mapped to `console.error` / `warn` / `info` /
//! `debug`. Native builds and tests use [`MemorySink`].
//!
//! ```
//! use tracing_subscriber::prelude::*;
//! use turntabs_web::logging::{LineLayer, LogLevel, MemorySink};
//!
//! let sink = MemorySink::default();
//! let layer = LineLayer::new(sink.clone()).with_filter(LogLevel::Info.filter());
//! let subscriber = tracing_subscriber::registry().with(layer);
//! tracing::subscriber::with_default(subscriber, || {
//!     tracing::info!(turns = 3, "tabs rendered");
//!     tracing::debug!("dropped by the filter");
//! });
//! assert_eq!(sink.lines().len(), 1);
//! ```

use std::fmt::{self, Write as FmtWrite};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::Context;

/// Prefix of every formatted line.
pub const LOG_PREFIX: &str = "[turntabs]";

/// Verbosity accepted in the options object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Matching subscriber filter.
    #[must_use]
    pub const fn filter(self) -> LevelFilter {
        match self {
            Self::Off => LevelFilter::OFF,
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

/// Destination of formatted lines.
pub trait LogSink: Send + Sync + 'static {
    fn write_line(&self, level: Level, line: &str);
}

/// Sink that keeps lines in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<(Level, String)>>>,
}

impl MemorySink {
    /// Lines written so far.
    #[must_use]
    pub fn lines(&self) -> Vec<(Level, String)> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl LogSink for MemorySink {
    fn write_line(&self, level: Level, line: &str) {
        let mut lines = match self.lines.lock() {
            Ok(lines) => lines,
            Err(poisoned) => poisoned.into_inner(),
        };
        lines.push((level, line.to_string()));
    }
}

/// Devtools console.
#[cfg(target_arch = "wasm32")]
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink;

#[cfg(target_arch = "wasm32")]
impl LogSink for ConsoleSink {
    fn write_line(&self, level: Level, line: &str) {
        let line = wasm_bindgen::JsValue::from_str(line);
        match level {
            Level::ERROR => web_sys::console::error_1(&line),
            Level::WARN => web_sys::console::warn_1(&line),
            Level::INFO => web_sys::console::info_1(&line),
            _ => web_sys::console::debug_1(&line),
        }
    }
}

#[derive(Default)]
struct EventVisitor {
    message: Option<String>,
    fields: Vec<(&'static str, String)>,
}

impl Visit for EventVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        } else {
            self.fields.push((field.name(), format!("{value:?}")));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.push((field.name(), value.to_string()));
        }
    }
}

/// Layer writing `"[turntabs] LEVEL message key=value ..."` lines.
pub struct LineLayer<W> {
    sink: W,
}

impl<W: LogSink> LineLayer<W> {
    pub fn new(sink: W) -> Self {
        Self { sink }
    }

    fn format(event: &Event<'_>) -> String {
        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        let mut line = format!("{LOG_PREFIX} {}", event.metadata().level());
        if let Some(message) = visitor.message {
            let _ = write!(line, " {message}");
        }
        for (key, value) in visitor.fields {
            let _ = write!(line, " {key}={value}");
        }
        line
    }
}

impl<S, W> Layer<S> for LineLayer<W>
where
    S: Subscriber,
    W: LogSink,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.sink
            .write_line(*event.metadata().level(), &Self::format(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tracing_subscriber::prelude::*;

    fn capture(level: LogLevel, f: impl FnOnce()) -> Vec<(Level, String)> {
        let sink = MemorySink::default();
        let layer = LineLayer::new(sink.clone()).with_filter(level.filter());
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, f);
        sink.lines()
    }

    #[test]
    fn fields_follow_the_message() {
        let lines = capture(LogLevel::Trace, || {
            tracing::error!(op = "hide_member", error = %"boom", "pass failed");
        });
        assert_eq!(
            lines,
            vec![(
                Level::ERROR,
                "[turntabs] ERROR pass failed op=hide_member error=boom".to_string()
            )]
        );
    }

    #[test]
    fn default_level_is_warn() {
        let lines = capture(LogLevel::default(), || {
            tracing::info!("hidden");
            tracing::warn!("shown");
        });
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].0, Level::WARN);
    }

    #[test]
    fn off_drops_everything() {
        let lines = capture(LogLevel::Off, || tracing::error!("nothing"));
        assert!(lines.is_empty());
    }

    #[test]
    fn level_names_parse_lowercase() {
        let level: LogLevel = serde_json::from_str("\"debug\"").unwrap();
        assert_eq!(level, LogLevel::Debug);
    }
}
