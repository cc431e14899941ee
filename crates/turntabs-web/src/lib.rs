#![forbid(unsafe_code)]

//! Browser binding for turntabs.
//!
//! The `wasm32` build exports [`TurnTabsWeb`] through `wasm-bindgen`:
//!
//! ```js
//! const tabs = new TurnTabsWeb(JSON.stringify({ logLevel: "info" }));
//! await tabs.init();
//! // later
//! tabs.destroy();
//! ```
//!
//! Everything engine-related lives in `turntabs-core`; this crate binds the
//! DOM to [`turntabs_tree::HostTree`], wraps `MutationObserver`, and routes
//! `tracing` output to the devtools console.

pub mod logging;
pub mod options;
pub mod style;

#[cfg(target_arch = "wasm32")]
pub mod dom;
#[cfg(target_arch = "wasm32")]
mod wasm;

#[cfg(target_arch = "wasm32")]
pub use wasm::TurnTabsWeb;

pub use options::WebOptions;

/// Native builds compile this crate as a stub so `cargo check --workspace` stays
/// green on non-wasm targets.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Default)]
pub struct TurnTabsWeb {
    options: WebOptions,
}

#[cfg(not(target_arch = "wasm32"))]
impl TurnTabsWeb {
    /// Parse options the same way the browser build does.
    pub fn new(options: Option<&str>) -> Result<Self, turntabs_core::config::ConfigError> {
        let options = WebOptions::from_json(options.unwrap_or_default())?;
        Ok(Self { options })
    }

    #[must_use]
    pub fn options(&self) -> &WebOptions {
        &self.options
    }
}
