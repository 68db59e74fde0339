//! Broker configuration loading and validation.
//!
//! Reads `broker.yaml` and resolves environment variables. Every field has a
//! default, so a missing file yields a working local-only broker.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::agent_core::router::Category;
use crate::tool_host::types::LaunchSpec;

/// Config file name searched for upward from the working directory.
pub const CONFIG_FILE_NAME: &str = "broker.yaml";

/// Env var naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "AMPHIBIAN_CONFIG";

/// Env var supplying the session token when the file leaves it empty.
pub const AUTH_TOKEN_ENV_VAR: &str = "AMPHIBIAN_AUTH_TOKEN";

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse config: {reason}")]
    Parse { reason: String },

    #[error("invalid config: {reason}")]
    Invalid { reason: String },
}

// ─── Public Types ────────────────────────────────────────────────────────────

/// Top-level broker configuration (mirrors `broker.yaml`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Address the session server listens on.
    pub bind: String,
    /// Shared secret clients must present. Empty means "resolve at startup".
    pub auth_token: String,
    pub memory_capacity: usize,
    /// Forward local-model tokens to the client as thought logs.
    pub stream_thoughts: bool,
    pub tool_call_timeout_ms: u64,
    pub handshake_timeout_ms: u64,
    pub inference: InferenceConfig,
    pub providers: BTreeMap<String, ProviderConfig>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
            auth_token: String::new(),
            memory_capacity: crate::agent_core::memory::DEFAULT_CAPACITY,
            stream_thoughts: false,
            tool_call_timeout_ms: crate::tool_host::host::DEFAULT_CALL_TIMEOUT_MS,
            handshake_timeout_ms: crate::tool_host::host::DEFAULT_HANDSHAKE_TIMEOUT_MS,
            inference: InferenceConfig::default(),
            providers: BTreeMap::new(),
        }
    }
}

/// Local model endpoint settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// When `false`, no bridge is built and local requests fail fast.
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://127.0.0.1:8080/v1".to_string(),
            model: "local".to_string(),
            temperature: 0.7,
            max_tokens: 1024,
        }
    }
}

/// One tool provider process.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment for the child (credentials go here).
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub cwd: Option<String>,
    /// Broker env vars that must all be set for the provider to launch.
    #[serde(default)]
    pub required_env: Vec<String>,
    /// Router category this provider serves as a brain.
    #[serde(default)]
    pub brain: Option<Category>,
    /// Tool invoked when the provider is routed to.
    #[serde(default)]
    pub tool: Option<String>,
}

impl ProviderConfig {
    pub fn launch_spec(&self) -> LaunchSpec {
        LaunchSpec {
            command: self.command.clone(),
            args: self.args.clone(),
            env: self.env.clone(),
            cwd: self.cwd.clone(),
        }
    }

    /// `required_env` entries not set (or empty) in the broker's environment.
    pub fn missing_env(&self) -> Vec<&str> {
        self.required_env
            .iter()
            .filter(|var| std::env::var(var.as_str()).map(|v| v.is_empty()).unwrap_or(true))
            .map(String::as_str)
            .collect()
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Locate the config file.
///
/// Order: `explicit`, then `AMPHIBIAN_CONFIG`, then `broker.yaml` searched
/// upward from `start`. Returns `None` when nothing is found.
pub fn find_config_path(explicit: Option<&Path>, start: &Path) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(expand_tilde(&path)));
        }
    }

    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

impl BrokerConfig {
    /// Load and validate a config file.
    ///
    /// Performs environment-variable interpolation on `${VAR_NAME}` and
    /// `${VAR_NAME:-default}` before parsing.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_yaml(&raw)
    }

    /// Parse and validate YAML text.
    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let interpolated = interpolate_env_vars(raw);
        // An empty or comment-only file means "all defaults".
        let config: BrokerConfig = if interpolated.trim().is_empty() {
            BrokerConfig::default()
        } else {
            serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::Parse {
                reason: e.to_string(),
            })?
        };
        config.validate()?;
        Ok(config)
    }

    /// Find and load the config, falling back to defaults when no file exists.
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        match find_config_path(explicit, &cwd) {
            Some(path) => Ok((Self::load(&path)?, Some(path))),
            None => Ok((Self::default(), None)),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| Err(ConfigError::Invalid { reason });

        if self.bind.trim().is_empty() {
            return invalid("bind address must not be empty".into());
        }
        if self.memory_capacity == 0 {
            return invalid("memory_capacity must be at least 1".into());
        }
        if self.tool_call_timeout_ms == 0 || self.handshake_timeout_ms == 0 {
            return invalid("timeouts must be greater than zero".into());
        }
        for (id, provider) in &self.providers {
            if provider.command.trim().is_empty() {
                return invalid(format!("provider '{id}' has no command"));
            }
            if let Some(category) = provider.brain {
                if provider.tool.as_deref().map_or(true, |t| t.trim().is_empty()) {
                    return invalid(format!(
                        "provider '{id}' is bound to the {} brain but names no tool",
                        category.as_str()
                    ));
                }
            }
        }
        Ok(())
    }

    /// Fill an empty `auth_token` from the environment, or generate one.
    ///
    /// Returns `true` when a token was generated.
    pub fn resolve_auth_token(&mut self) -> bool {
        if !self.auth_token.is_empty() {
            return false;
        }
        if let Ok(token) = std::env::var(AUTH_TOKEN_ENV_VAR) {
            if !token.is_empty() {
                self.auth_token = token;
                return false;
            }
        }
        self.auth_token = uuid::Uuid::new_v4().to_string();
        true
    }
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve a variable expression like `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((var_name, default)) => std::env::var(var_name)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| expand_tilde(default)),
        None => std::env::var(expr).unwrap_or_default(),
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BrokerConfig::default();
        assert_eq!(config.bind, "127.0.0.1:3000");
        assert_eq!(config.memory_capacity, 20);
        assert!(!config.stream_thoughts);
        assert_eq!(config.tool_call_timeout_ms, 30_000);
        assert!(config.inference.enabled);
        assert_eq!(config.inference.base_url, "http://127.0.0.1:8080/v1");
        assert!(config.providers.is_empty());
    }

    #[test]
    fn test_empty_file_is_default() {
        let config = BrokerConfig::from_yaml("# nothing here\n").unwrap();
        assert_eq!(config.memory_capacity, 20);
    }

    #[test]
    fn test_full_config_parses() {
        let yaml = r#"
            bind: "0.0.0.0:4000"
            auth_token: "s3cret"
            memory_capacity: 8
            stream_thoughts: true
            inference:
              base_url: "http://localhost:11434/v1"
              model: "qwen2.5:3b"
            providers:
              jules:
                command: npx
                args: ["-y", "jules-mcp"]
                env:
                  JULES_API_KEY: "abc"
                required_env: [JULES_API_KEY]
                brain: coding
                tool: create_coding_session
              stitch:
                command: stitch-mcp
                brain: ui
                tool: generate_ui
        "#;
        let config = BrokerConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.bind, "0.0.0.0:4000");
        assert_eq!(config.memory_capacity, 8);
        assert!(config.stream_thoughts);
        assert_eq!(config.inference.model, "qwen2.5:3b");
        assert_eq!(config.inference.max_tokens, 1024, "unset fields keep defaults");

        let jules = &config.providers["jules"];
        assert_eq!(jules.brain, Some(Category::Coding));
        assert_eq!(jules.tool.as_deref(), Some("create_coding_session"));
        let spec = jules.launch_spec();
        assert_eq!(spec.args, vec!["-y", "jules-mcp"]);
        assert_eq!(spec.env["JULES_API_KEY"], "abc");

        assert_eq!(config.providers["stitch"].brain, Some(Category::Ui));
    }

    #[test]
    fn test_validation_errors() {
        let cases = [
            "memory_capacity: 0",
            "providers:\n  p:\n    command: \"\"",
            "providers:\n  p:\n    command: run\n    brain: coding",
            "tool_call_timeout_ms: 0",
        ];
        for yaml in cases {
            assert!(
                matches!(BrokerConfig::from_yaml(yaml), Err(ConfigError::Invalid { .. })),
                "should reject: {yaml}"
            );
        }
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            BrokerConfig::from_yaml("providers: [not, a, map]"),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_interpolation_in_config() {
        std::env::set_var("__AMPHIBIAN_TEST_TOKEN__", "from-env");
        std::env::remove_var("__AMPHIBIAN_TEST_UNSET__");
        let yaml = r#"
            auth_token: "${__AMPHIBIAN_TEST_TOKEN__}"
            bind: "${__AMPHIBIAN_TEST_UNSET__:-127.0.0.1:3999}"
        "#;
        let config = BrokerConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.auth_token, "from-env");
        assert_eq!(config.bind, "127.0.0.1:3999");
        std::env::remove_var("__AMPHIBIAN_TEST_TOKEN__");
    }

    #[test]
    fn test_interpolate_no_vars() {
        let input = "plain text with no variables";
        assert_eq!(interpolate_env_vars(input), input);
    }

    #[test]
    fn test_expand_tilde() {
        let result = expand_tilde("~/models");
        assert!(!result.starts_with('~'), "tilde should be expanded");
        assert!(result.ends_with("/models"));
    }

    #[test]
    fn test_missing_env() {
        std::env::set_var("__AMPHIBIAN_TEST_PRESENT__", "1");
        std::env::remove_var("__AMPHIBIAN_TEST_ABSENT__");
        let provider = ProviderConfig {
            command: "x".into(),
            args: vec![],
            env: HashMap::new(),
            cwd: None,
            required_env: vec![
                "__AMPHIBIAN_TEST_PRESENT__".into(),
                "__AMPHIBIAN_TEST_ABSENT__".into(),
            ],
            brain: None,
            tool: None,
        };
        assert_eq!(provider.missing_env(), vec!["__AMPHIBIAN_TEST_ABSENT__"]);
        std::env::remove_var("__AMPHIBIAN_TEST_PRESENT__");
    }

    #[test]
    fn test_resolve_auth_token_keeps_configured() {
        let mut config = BrokerConfig {
            auth_token: "fixed".into(),
            ..BrokerConfig::default()
        };
        assert!(!config.resolve_auth_token());
        assert_eq!(config.auth_token, "fixed");
    }

    #[test]
    fn test_load_and_find_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "memory_capacity: 3\n").unwrap();

        let found = find_config_path(None, &nested);
        // AMPHIBIAN_CONFIG in the developer's env would take precedence.
        if std::env::var(CONFIG_ENV_VAR).is_err() {
            let found = found.unwrap();
            assert_eq!(found, dir.path().join(CONFIG_FILE_NAME));
            assert_eq!(BrokerConfig::load(&found).unwrap().memory_capacity, 3);
        }

        let explicit = dir.path().join("other.yaml");
        std::fs::write(&explicit, "stream_thoughts: true\n").unwrap();
        assert_eq!(find_config_path(Some(&explicit), &nested), Some(explicit.clone()));
        assert!(BrokerConfig::load(&explicit).unwrap().stream_thoughts);

        assert!(matches!(
            BrokerConfig::load(&dir.path().join("missing.yaml")),
            Err(ConfigError::Read { .. })
        ));
    }
}
