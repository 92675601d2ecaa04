//! Engine configuration.
//!
//! Provides [`MiniDynConfig`]. Values are loaded from environment variables
//! with [`MiniDynConfig::from_env`] or assembled with the typed builder.

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Which interpreter handles condition and update expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpreterKind {
    /// The full expression-language interpreter.
    #[default]
    Language,
    /// Registered per-table handlers keyed by exact expression text.
    Native,
}

impl InterpreterKind {
    /// Parse `language` or `native` (case-insensitive).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("language") {
            Some(Self::Language)
        } else if value.eq_ignore_ascii_case("native") {
            Some(Self::Native)
        } else {
            None
        }
    }
}

/// Engine configuration.
///
/// # Examples
///
/// ```
/// use minidyn_core::config::{InterpreterKind, MiniDynConfig};
///
/// let config = MiniDynConfig::default();
/// assert_eq!(config.default_region, "us-east-1");
/// assert_eq!(config.interpreter, InterpreterKind::Language);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct MiniDynConfig {
    /// Region used when building table ARNs.
    #[builder(default = String::from("us-east-1"))]
    pub default_region: String,

    /// Interpreter active when the engine starts.
    #[builder(default)]
    pub interpreter: InterpreterKind,

    /// Log every parsed expression at debug level.
    #[builder(default = false)]
    pub debug: bool,

    /// Start with every data-plane operation failing.
    #[builder(default = false)]
    pub force_failure: bool,

    /// Start with batch writes reporting every request as unprocessed.
    #[builder(default = false)]
    pub return_unprocessed_items: bool,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,
}

impl Default for MiniDynConfig {
    fn default() -> Self {
        Self {
            default_region: String::from("us-east-1"),
            interpreter: InterpreterKind::Language,
            debug: false,
            force_failure: false,
            return_unprocessed_items: false,
            log_level: String::from("info"),
        }
    }
}

impl MiniDynConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `DEFAULT_REGION` | `us-east-1` |
    /// | `MINIDYN_INTERPRETER` | `language` |
    /// | `MINIDYN_DEBUG` | `false` |
    /// | `MINIDYN_FORCE_FAILURE` | `false` |
    /// | `MINIDYN_RETURN_UNPROCESSED_ITEMS` | `false` |
    /// | `LOG_LEVEL` | `info` |
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("DEFAULT_REGION") {
            config.default_region = v;
        }
        if let Ok(v) = std::env::var("MINIDYN_INTERPRETER") {
            if let Some(kind) = InterpreterKind::parse(&v) {
                config.interpreter = kind;
            }
        }
        if let Ok(v) = std::env::var("MINIDYN_DEBUG") {
            config.debug = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("MINIDYN_FORCE_FAILURE") {
            config.force_failure = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("MINIDYN_RETURN_UNPROCESSED_ITEMS") {
            config.return_unprocessed_items = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            config.log_level = v;
        }

        config
    }
}

/// Parse a string as a boolean, accepting `"1"` and `"true"` (case-insensitive).
fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}
