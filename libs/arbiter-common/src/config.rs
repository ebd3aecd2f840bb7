// Engine configuration for Arbiter
use crate::types::Language;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Environment variable naming an alternative configuration file
pub const CONFIG_ENV: &str = "ARBITER_CONFIG";

/// Configuration file looked up when `ARBITER_CONFIG` is not set
pub const DEFAULT_CONFIG_PATH: &str = "config/engine.json";

/// How produced output is compared with expected output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonMode {
    /// Byte-for-byte equality
    Exact,
    /// Equality after trimming surrounding whitespace
    #[default]
    Textual,
    /// JSON value equality when both sides parse, textual otherwise
    Structural,
}

/// How to launch the runtime of one language
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub command: String,
    /// Arguments placed before the harness script
    pub args: Vec<String>,
    /// Extra environment for the child; everything except PATH is cleared
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Module specifier handed to `require` for TypeScript transpilation
    #[serde(default)]
    pub typescript_module: Option<String>,
}

impl RuntimeConfig {
    fn node() -> Self {
        Self {
            command: "node".to_string(),
            args: vec!["-e".to_string()],
            env: BTreeMap::new(),
            typescript_module: None,
        }
    }

    fn python() -> Self {
        Self {
            command: "python3".to_string(),
            args: vec!["-I".to_string(), "-c".to_string()],
            env: BTreeMap::new(),
            typescript_module: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimesConfig {
    pub javascript: Option<RuntimeConfig>,
    pub typescript: Option<RuntimeConfig>,
    pub python: Option<RuntimeConfig>,
}

impl Default for RuntimesConfig {
    fn default() -> Self {
        let mut typescript = RuntimeConfig::node();
        typescript.typescript_module = Some("typescript".to_string());
        Self {
            javascript: Some(RuntimeConfig::node()),
            typescript: Some(typescript),
            python: Some(RuntimeConfig::python()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub runtimes: RuntimesConfig,
    pub comparison: ComparisonMode,
    pub max_source_bytes: usize,
    pub max_output_bytes: usize,
    pub max_time_limit_ms: u64,
    /// Limit for the one-off transpile step, separate from any test's limit
    pub compile_time_limit_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            runtimes: RuntimesConfig::default(),
            comparison: ComparisonMode::default(),
            max_source_bytes: 1024 * 1024,
            max_output_bytes: 8 * 1024 * 1024,
            max_time_limit_ms: 30_000,
            compile_time_limit_ms: 10_000,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Engine config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: EngineConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load from `ARBITER_CONFIG`, else `config/engine.json`, else built-in defaults
    ///
    /// An explicit `ARBITER_CONFIG` path must exist; the default path is optional.
    pub fn load_default() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::load(Path::new(&path));
        }

        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        if default_path.exists() {
            Self::load(default_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Runtime for a language, `None` when the language is disabled
    pub fn runtime(&self, language: Language) -> Option<&RuntimeConfig> {
        match language {
            Language::JavaScript => self.runtimes.javascript.as_ref(),
            Language::TypeScript => self.runtimes.typescript.as_ref(),
            Language::Python => self.runtimes.python.as_ref(),
        }
    }

    /// List all enabled languages
    pub fn enabled_languages(&self) -> Vec<Language> {
        Language::ALL
            .into_iter()
            .filter(|language| self.runtime(*language).is_some())
            .collect()
    }

    fn validate(&self) -> Result<()> {
        if self.enabled_languages().is_empty() {
            bail!("No languages configured");
        }
        for language in self.enabled_languages() {
            if let Some(runtime) = self.runtime(language) {
                if runtime.command.trim().is_empty() {
                    bail!("Runtime command for {} is empty", language);
                }
            }
        }
        if self.max_time_limit_ms == 0 {
            bail!("max_time_limit_ms must be positive");
        }
        if self.max_output_bytes == 0 {
            bail!("max_output_bytes must be positive");
        }
        if self.compile_time_limit_ms == 0 {
            bail!("compile_time_limit_ms must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_enable_all_languages() {
        let config = EngineConfig::default();
        assert_eq!(config.enabled_languages(), Language::ALL.to_vec());
        assert_eq!(config.comparison, ComparisonMode::Textual);
        assert_eq!(
            config.runtime(Language::TypeScript).and_then(|r| r.typescript_module.as_deref()),
            Some("typescript")
        );
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: EngineConfig = serde_json::from_str(
            r#"{
                "comparison": "structural",
                "runtimes": {
                    "javascript": {"command": "/usr/bin/node", "args": ["-e"]},
                    "typescript": null,
                    "python": {"command": "python3.12", "args": ["-c"], "env": {"PYTHONHASHSEED": "0"}}
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.comparison, ComparisonMode::Structural);
        assert_eq!(config.max_time_limit_ms, 30_000);
        assert_eq!(config.compile_time_limit_ms, 10_000);
        assert!(config.runtime(Language::TypeScript).is_none());
        assert_eq!(
            config.enabled_languages(),
            vec![Language::JavaScript, Language::Python]
        );
        let python = config.runtime(Language::Python).unwrap();
        assert_eq!(python.env.get("PYTHONHASHSEED").map(String::as_str), Some("0"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_runtime_set() {
        let config = EngineConfig {
            runtimes: RuntimesConfig {
                javascript: None,
                typescript: None,
                python: None,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let result = EngineConfig::load(Path::new("/nonexistent/arbiter/engine.json"));
        assert!(result.is_err());
    }
}
