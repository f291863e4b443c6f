//! Configuration loading
//!
//! Settings come from a TOML file, searched in a fixed order, with a few
//! environment overrides applied on top.

use crate::aggregate::ScoringPolicy;
use crate::error::{AnalysisError, Result};
use crate::workspace::TEMP_DIR_ENV;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable supplying the classifier credential
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArxConfig {
    /// Print full per-package reports instead of the compact summary
    pub verbose: bool,
    /// Directory under which per-package workspaces are created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_root: Option<PathBuf>,
    /// Directory of extra `*.toml` rule files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules_dir: Option<PathBuf>,
    /// Number of packages analyzed at once
    pub parallelism: usize,
    pub classifier: ClassifierConfig,
    pub scoring: ScoringPolicy,
    pub names: NameConfig,
}

impl Default for ArxConfig {
    fn default() -> Self {
        Self {
            verbose: true,
            scratch_root: None,
            rules_dir: None,
            parallelism: 1,
            classifier: ClassifierConfig::default(),
            scoring: ScoringPolicy::default(),
            names: NameConfig::default(),
        }
    }
}

/// Semantic classifier settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Base URL of an OpenAI-compatible API
    pub endpoint: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Upper bound on a single classifier call
    pub timeout_secs: u64,
    /// Retry once after a timeout, connection failure, 429 or 5xx
    pub retry_transient: bool,
    /// Recipes longer than this are truncated in the prompt
    pub max_recipe_bytes: usize,
    pub temperature: f64,
    /// Confidence attached to fallback verdicts
    pub fallback_confidence: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            timeout_secs: 30,
            retry_transient: true,
            max_recipe_bytes: 48 * 1024,
            temperature: 0.1,
            fallback_confidence: 0.5,
        }
    }
}

/// Name heuristic settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NameConfig {
    pub min_length: usize,
    pub max_length: usize,
    pub max_non_alpha_ratio: f64,
    /// Names added to the built-in reference list
    pub extra_reference: Vec<String>,
}

impl Default for NameConfig {
    fn default() -> Self {
        Self {
            min_length: 2,
            max_length: 64,
            max_non_alpha_ratio: 0.5,
            extra_reference: Vec::new(),
        }
    }
}

impl ArxConfig {
    /// Locations searched for a config file, most specific first
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("arx.toml")];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("arx").join("config.toml"));
        }
        paths.push(PathBuf::from("/etc/arx/config.toml"));
        paths
    }

    /// First existing config file, if any
    pub fn find() -> Option<PathBuf> {
        Self::search_paths().into_iter().find(|p| p.is_file())
    }

    /// Path new settings are written to when no file exists yet
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("arx").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("arx.toml"))
    }

    /// Load the first config file found, or defaults when there is none
    pub fn load() -> Result<Self> {
        match Self::find() {
            Some(path) => Self::from_file(&path),
            None => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading config from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `ARX_TEMP_DIR` and `OPENAI_API_KEY`.
    ///
    /// The temp dir override always wins; the key only fills a missing one.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup(TEMP_DIR_ENV).filter(|d| !d.is_empty()) {
            self.scratch_root = Some(PathBuf::from(dir));
        }
        if self.classifier.api_key.is_none() {
            self.classifier.api_key = lookup(API_KEY_ENV).filter(|k| !k.is_empty());
        }
        self
    }

    /// Reject values no analysis could run with
    pub fn validate(&self) -> Result<()> {
        if self.parallelism == 0 {
            return Err(AnalysisError::Config("parallelism must be at least 1".into()));
        }
        if self.classifier.timeout_secs == 0 {
            return Err(AnalysisError::Config("classifier.timeout_secs must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.classifier.fallback_confidence) {
            return Err(AnalysisError::Config(
                "classifier.fallback_confidence must be within [0, 1]".into(),
            ));
        }
        self.scoring.validate()?;
        if self.names.min_length > self.names.max_length {
            return Err(AnalysisError::Config(
                "names.min_length exceeds names.max_length".into(),
            ));
        }
        Ok(())
    }

    /// Write the config as TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
