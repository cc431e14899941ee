#![forbid(unsafe_code)]

//! Stylesheet injected next to the navigation surface.
//!
//! The engine only toggles classes; what they look like is decided here.
//! The hidden class must collapse the node, everything else is cosmetic.

use turntabs_core::EngineConfig;

/// Id of the injected `<style>` element.
pub const STYLE_ELEMENT_ID: &str = "turntabs-style";

/// Render the stylesheet for a configuration.
#[must_use]
pub fn stylesheet(config: &EngineConfig) -> String {
    let EngineConfig {
        hidden_class,
        surface_id,
        tab_row_class,
        tab_class,
        active_class,
        close_class,
        ..
    } = config;
    format!(
        ".{hidden_class} {{ display: none !important; }}
#{surface_id} {{ position: sticky; top: 0; z-index: 10; display: flex; align-items: center; gap: 4px; padding: 6px 8px; background: var(--main-surface-primary, #fff); border-bottom: 1px solid rgba(0, 0, 0, 0.1); }}
#{surface_id} .{tab_row_class} {{ display: flex; flex: 1; gap: 4px; overflow-x: auto; }}
#{surface_id} .{tab_class} {{ flex: none; padding: 4px 10px; border: 1px solid transparent; border-radius: 6px; background: transparent; cursor: pointer; white-space: nowrap; font: inherit; }}
#{surface_id} .{tab_class}.{active_class} {{ border-color: currentColor; font-weight: 600; }}
#{surface_id} .{close_class} {{ flex: none; border: none; background: transparent; cursor: pointer; opacity: 0.6; }}
"
    )
}
