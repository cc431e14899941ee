#![forbid(unsafe_code)]

//! Engine configuration.
//!
//! Defaults target the markup of the chat host the engine was built for;
//! every field can be overridden from JSON (camelCase keys, missing keys keep
//! their default).
//!
//! ```
//! use turntabs_core::EngineConfig;
//!
//! let config = EngineConfig::from_json(r#"{ "titleCap": 12, "debounceMs": 150 }"#).unwrap();
//! assert_eq!(config.title_cap, 12);
//! assert_eq!(config.hidden_class, "turntabs-hidden");
//! ```

use core::fmt;
use core::time::Duration;

use serde::{Deserialize, Serialize};
use turntabs_tree::Selector;

use crate::bootstrap::BootstrapConfig;
use crate::extract::WrapperStrategy;
use crate::gate::ObserveOptions;

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// JSON could not be parsed.
    Parse(String),
    /// A field holds an unusable value.
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(msg) => write!(f, "invalid config: {msg}"),
            Self::Invalid { field, reason } => write!(f, "invalid config field `{field}`: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Reconciliation engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Primary marker of a user-authored message.
    pub user_message: Selector,
    /// Alternate marker of a user-authored message.
    pub user_message_alt: Selector,
    /// Landmark the navigation surface is injected into.
    pub injection_target: Selector,
    /// Ordered strategies for finding the turn wrapper of a user message.
    pub wrapper_strategies: Vec<WrapperStrategy>,
    /// Reserved class marking nodes outside the active turn.
    pub hidden_class: String,
    /// Id of the injected navigation container.
    pub surface_id: String,
    /// Class of the row holding the tab buttons.
    pub tab_row_class: String,
    /// Class of each tab button.
    pub tab_class: String,
    /// Extra class on the selected tab button.
    pub active_class: String,
    /// Class of the disable button.
    pub close_class: String,
    /// Label of the disable button.
    pub close_label: String,
    /// Hover text of the disable button.
    pub close_title: String,
    /// Maximum grapheme count of a tab label before truncation.
    pub title_cap: usize,
    /// Suffix appended to truncated tab labels.
    pub ellipsis: String,
    /// Label for turns whose user message has no text.
    pub fallback_label: String,
    /// Quiescence window of the mutation gate, in milliseconds.
    pub debounce_ms: u64,
    /// Also observe attribute changes.
    pub observe_attributes: bool,
    /// Also observe text changes.
    pub observe_character_data: bool,
    /// Timings of the startup wait.
    pub bootstrap: BootstrapConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            user_message: Selector::attr_eq("data-message-author-role", "user"),
            user_message_alt: Selector::attr_eq("data-message-role", "user"),
            injection_target: Selector::tag("main"),
            wrapper_strategies: WrapperStrategy::defaults(),
            hidden_class: "turntabs-hidden".to_string(),
            surface_id: "turntabs-container".to_string(),
            tab_row_class: "turntabs-nav".to_string(),
            tab_class: "turntabs-tab".to_string(),
            active_class: "active".to_string(),
            close_class: "turntabs-close".to_string(),
            close_label: "\u{2715}".to_string(),
            close_title: "Disable tab mode".to_string(),
            title_cap: 20,
            ellipsis: "...".to_string(),
            fallback_label: "Question".to_string(),
            debounce_ms: 300,
            observe_attributes: false,
            observe_character_data: false,
            bootstrap: BootstrapConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hidden_class.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "hiddenClass",
                reason: "must not be empty",
            });
        }
        if self.hidden_class.contains(char::is_whitespace) {
            return Err(ConfigError::Invalid {
                field: "hiddenClass",
                reason: "must be a single class token",
            });
        }
        if self.surface_id.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "surfaceId",
                reason: "must not be empty",
            });
        }
        if self.title_cap == 0 {
            return Err(ConfigError::Invalid {
                field: "titleCap",
                reason: "must be at least 1",
            });
        }
        if self.wrapper_strategies.is_empty() {
            return Err(ConfigError::Invalid {
                field: "wrapperStrategies",
                reason: "needs at least one strategy",
            });
        }
        Ok(())
    }

    /// Quiescence window as a duration.
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Observation flags for the change subscription.
    #[must_use]
    pub fn observe_options(&self) -> ObserveOptions {
        let mut options = ObserveOptions::CHILD_LIST | ObserveOptions::SUBTREE;
        options.set(ObserveOptions::ATTRIBUTES, self.observe_attributes);
        options.set(ObserveOptions::CHARACTER_DATA, self.observe_character_data);
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.debounce(), Duration::from_millis(300));
        assert_eq!(
            config.observe_options(),
            ObserveOptions::CHILD_LIST | ObserveOptions::SUBTREE
        );
    }

    #[test]
    fn empty_json_yields_defaults() {
        assert_eq!(EngineConfig::from_json("{}").unwrap(), EngineConfig::default());
    }

    #[test]
    fn selectors_deserialize_from_tagged_json() {
        let config = EngineConfig::from_json(
            r#"{
                "userMessage": { "kind": "attr", "value": { "name": "data-role", "value": "me" } },
                "injectionTarget": { "kind": "id", "value": "thread" },
                "observeAttributes": true
            }"#,
        )
        .unwrap();
        assert_eq!(config.user_message, Selector::attr_eq("data-role", "me"));
        assert_eq!(config.injection_target, Selector::id("thread"));
        assert!(config.observe_options().contains(ObserveOptions::ATTRIBUTES));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert_eq!(
            EngineConfig::from_json(r#"{ "titleCap": 0 }"#),
            Err(ConfigError::Invalid {
                field: "titleCap",
                reason: "must be at least 1",
            })
        );
        assert!(matches!(
            EngineConfig::from_json(r#"{ "hiddenClass": "a b" }"#),
            Err(ConfigError::Invalid { field: "hiddenClass", .. })
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{ "wrapperStrategies": [] }"#),
            Err(ConfigError::Invalid { field: "wrapperStrategies", .. })
        ));
        assert!(matches!(
            EngineConfig::from_json("not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
