#![forbid(unsafe_code)]

//! Options object accepted by the JS constructor.
//!
//! The object is the engine configuration plus two binding keys, `logLevel`
//! and `injectStyles`. JS callers pass it through `JSON.stringify`; every
//! key is optional.

use serde::{Deserialize, Serialize};
use turntabs_core::EngineConfig;
use turntabs_core::config::ConfigError;

use crate::logging::LogLevel;

/// Parsed constructor options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WebOptions {
    /// Console verbosity.
    pub log_level: LogLevel,
    /// Add the default stylesheet to the page.
    pub inject_styles: bool,
    /// Engine configuration.
    #[serde(flatten)]
    pub engine: EngineConfig,
}

impl Default for WebOptions {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            inject_styles: true,
            engine: EngineConfig::default(),
        }
    }
}

impl WebOptions {
    /// Parse and validate an options string. Empty input yields defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        let options: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        options.engine.validate()?;
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_input_is_default() {
        assert_eq!(WebOptions::from_json("").unwrap(), WebOptions::default());
        assert_eq!(WebOptions::from_json("{}").unwrap(), WebOptions::default());
    }

    #[test]
    fn engine_keys_sit_next_to_log_level() {
        let options =
            WebOptions::from_json(r#"{ "logLevel": "debug", "debounceMs": 120, "titleCap": 30 }"#)
                .unwrap();
        assert_eq!(options.log_level, LogLevel::Debug);
        assert_eq!(options.engine.debounce_ms, 120);
        assert_eq!(options.engine.title_cap, 30);
        assert_eq!(options.engine.hidden_class, "turntabs-hidden");
        assert!(options.inject_styles);

        let options = WebOptions::from_json(r#"{ "injectStyles": false }"#).unwrap();
        assert!(!options.inject_styles);
    }

    #[test]
    fn invalid_engine_values_are_rejected() {
        assert!(matches!(
            WebOptions::from_json(r#"{ "surfaceId": "" }"#),
            Err(ConfigError::Invalid { field: "surfaceId", .. })
        ));
        assert!(matches!(
            WebOptions::from_json(r#"{ "logLevel": "loud" }"#),
            Err(ConfigError::Parse(_))
        ));
    }
}
