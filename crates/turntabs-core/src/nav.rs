#![forbid(unsafe_code)]

//! Navigation surface: construction, placement, tab rendering, and click
//! dispatch.
//!
//! The surface is a container holding a row of tab buttons and a disable
//! button. Buttons carry their meaning in data attributes instead of
//! per-button callbacks, so a single delegated click handler on the host can
//! route any click through [`resolve_action`].

use turntabs_tree::{HostTree, Selector};

use crate::config::EngineConfig;
use crate::error::{EngineError, TreeResultExt};
use crate::extract::{Turn, truncate_title};
use crate::session::NavSurface;

/// Data attribute holding a tab's turn index.
pub const TAB_INDEX_ATTR: &str = "data-turntabs-index";
/// Data attribute naming a surface action.
pub const ACTION_ATTR: &str = "data-turntabs-action";
/// Value of [`ACTION_ATTR`] on the disable button.
pub const DISABLE_ACTION: &str = "disable";

/// User intent resolved from a click inside the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavAction {
    /// Activate the turn at this index.
    Select(usize),
    /// Turn the tabbed view off.
    Disable,
}

/// Build a detached surface.
pub fn build_surface<T: HostTree>(
    tree: &mut T,
    config: &EngineConfig,
) -> Result<NavSurface<T::Node>, EngineError> {
    let container = tree.create_element("div").during("build_surface")?;
    tree.set_attribute(&container, "id", &config.surface_id)
        .during("build_surface")?;

    let tab_row = tree.create_element("div").during("build_surface")?;
    tree.add_class(&tab_row, &config.tab_row_class)
        .during("build_surface")?;
    tree.append_child(&container, &tab_row)
        .during("build_surface")?;

    let close = tree.create_element("button").during("build_surface")?;
    tree.add_class(&close, &config.close_class)
        .during("build_surface")?;
    tree.set_attribute(&close, ACTION_ATTR, DISABLE_ACTION)
        .during("build_surface")?;
    tree.set_attribute(&close, "title", &config.close_title)
        .during("build_surface")?;
    tree.set_text(&close, &config.close_label)
        .during("build_surface")?;
    tree.append_child(&container, &close)
        .during("build_surface")?;

    Ok(NavSurface { container, tab_row })
}

/// Where the surface goes: under `parent`, before `before` (or appended).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPoint<N> {
    pub parent: N,
    pub before: Option<N>,
}

/// Resolve where the surface belongs.
///
/// First inside the injection target when the target holds the turn list
/// container, otherwise right before the container. `None` when neither
/// placement is possible.
pub fn mount_point<T: HostTree>(
    tree: &T,
    container: &T::Node,
    config: &EngineConfig,
) -> Option<MountPoint<T::Node>> {
    if let Some(target) = tree.query_first(None, &config.injection_target)
        && tree.contains(&target, container)
    {
        let before = tree.first_child(&target);
        return Some(MountPoint {
            parent: target,
            before,
        });
    }
    Some(MountPoint {
        parent: tree.parent(container)?,
        before: Some(container.clone()),
    })
}

/// Insert the surface at `point`.
pub fn mount_surface<T: HostTree>(
    tree: &mut T,
    surface: &NavSurface<T::Node>,
    point: &MountPoint<T::Node>,
) -> Result<(), EngineError> {
    tree.insert_before(&point.parent, &surface.container, point.before.as_ref())
        .during("inject_surface")
}

/// Show or hide the surface.
pub fn set_surface_visible<T: HostTree>(
    tree: &mut T,
    surface: &NavSurface<T::Node>,
    visible: bool,
) -> Result<(), EngineError> {
    let value = if visible { None } else { Some("none") };
    tree.set_style(&surface.container, "display", value)
        .during(if visible { "show_surface" } else { "hide_surface" })
}

/// Rebuild the tab row from scratch.
pub fn render_tabs<T: HostTree>(
    tree: &mut T,
    surface: &NavSurface<T::Node>,
    turns: &[Turn<T::Node>],
    active: usize,
    config: &EngineConfig,
) -> Result<(), EngineError> {
    if !tree.contains(&surface.container, &surface.tab_row) {
        return Err(EngineError::MissingTabRow);
    }
    tree.clear_children(&surface.tab_row)
        .during("render_tabs")?;

    for turn in turns {
        let tab = tree.create_element("button").during("render_tab")?;
        tree.add_class(&tab, &config.tab_class)
            .during("render_tab")?;
        if turn.index == active {
            tree.add_class(&tab, &config.active_class)
                .during("render_tab")?;
        }
        let label = truncate_title(
            &turn.title,
            config.title_cap,
            &config.ellipsis,
            &config.fallback_label,
        );
        tree.set_text(&tab, &label).during("render_tab")?;
        tree.set_attribute(&tab, "title", &turn.title)
            .during("render_tab")?;
        tree.set_attribute(&tab, TAB_INDEX_ATTR, &turn.index.to_string())
            .during("render_tab")?;
        tree.append_child(&surface.tab_row, &tab)
            .during("render_tab")?;
    }
    Ok(())
}

/// Resolve a click target to an action, if it landed on a surface control.
pub fn resolve_action<T: HostTree>(
    tree: &T,
    surface: &NavSurface<T::Node>,
    target: &T::Node,
) -> Option<NavAction> {
    if !tree.contains(&surface.container, target) {
        return None;
    }
    if let Some(tab) = tree.closest(target, &Selector::has_attr(TAB_INDEX_ATTR))
        && tree.contains(&surface.container, &tab)
    {
        return tree
            .attribute(&tab, TAB_INDEX_ATTR)?
            .parse()
            .ok()
            .map(NavAction::Select);
    }
    let control = tree.closest(target, &Selector::attr_eq(ACTION_ATTR, DISABLE_ACTION))?;
    tree.contains(&surface.container, &control)
        .then_some(NavAction::Disable)
}
