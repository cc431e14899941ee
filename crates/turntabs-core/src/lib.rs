#![forbid(unsafe_code)]

//! Core: turn extraction, mutation gating, and reconciliation of a tabbed
//! view over a chat transcript the engine does not own.
//!
//! The pieces, leaf first:
//! - [`gate`]: filters the host's change stream and debounces it.
//! - [`extract`]: partitions the transcript into [`extract::Turn`]s.
//! - [`reconcile`]: owns session state and writes the navigation surface and
//!   visibility annotations back into the tree.
//!
//! [`program::TabProgram`] wires them together for hosts that push mutation
//! batches, time, and clicks in from the outside. [`bootstrap`] waits for the
//! host page to be ready before the first pass.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod extract;
pub mod gate;
pub mod nav;
pub mod program;
pub mod reconcile;
pub mod session;

pub use config::EngineConfig;
pub use error::EngineError;
pub use program::TabProgram;
pub use reconcile::{PassOutcome, Reconciler};
